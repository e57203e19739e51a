use tree_sitter::Node;

use super::{
    block_doc_lines, field_text, first_paragraph, leading_comments, normalize_ws, parse_tree,
    SymbolBuilder,
};
use crate::error::Result;
use crate::index::{Language, Parser, Symbol, SymbolKind};

// Java parser using tree-sitter
pub struct JavaParser;

const TYPE_DECLARATIONS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
    "annotation_type_declaration",
];

impl JavaParser {
    pub fn new() -> Self {
        Self
    }

    fn walk_members(
        &self,
        body: Node,
        content: &str,
        builder: &SymbolBuilder,
        class: Option<&str>,
        symbols: &mut Vec<Symbol>,
    ) {
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            let kind = member.kind();
            if TYPE_DECLARATIONS.contains(&kind) {
                let Some(name) = field_text(member, "name", content) else {
                    continue;
                };
                symbols.push(builder.build(
                    member,
                    name,
                    SymbolKind::Class,
                    declaration_header(member, content),
                    javadoc(member, content),
                    class,
                ));
                if let Some(members) = member.child_by_field_name("body") {
                    self.walk_members(members, content, builder, Some(name), symbols);
                }
            } else if kind == "method_declaration" || kind == "constructor_declaration" {
                let Some(name) = field_text(member, "name", content) else {
                    continue;
                };
                // methods only exist inside types
                symbols.push(builder.build(
                    member,
                    name,
                    SymbolKind::Method,
                    declaration_header(member, content),
                    javadoc(member, content),
                    class,
                ));
            } else if kind == "enum_body_declarations" {
                self.walk_members(member, content, builder, class, symbols);
            }
        }
    }
}

impl Default for JavaParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Declaration text between the modifiers (annotations included) and the body
fn declaration_header(node: Node, content: &str) -> String {
    let start = match node.named_child(0) {
        Some(first) if first.kind() == "modifiers" => first.end_byte(),
        _ => node.start_byte(),
    };
    let end = node
        .child_by_field_name("body")
        .map(|body| body.start_byte())
        .unwrap_or_else(|| node.end_byte());
    let header = content.get(start..end).unwrap_or("");
    normalize_ws(header.trim_end_matches(|c: char| c == ';' || c.is_whitespace()))
}

/// Summary paragraph of the `/** */` block directly above a declaration
fn javadoc(node: Node, content: &str) -> String {
    let comments = leading_comments(node, content, &["block_comment", "line_comment"], &[]);
    let Some(doc) = comments.into_iter().rev().find(|c| c.starts_with("/**")) else {
        return String::new();
    };
    first_paragraph(
        block_doc_lines(doc)
            .into_iter()
            .take_while(|line| !line.starts_with('@')),
    )
}

impl Parser for JavaParser {
    fn language(&self) -> Language {
        Language::Java
    }

    fn parse(&self, content: &str, file_path: &str) -> Result<Vec<Symbol>> {
        let tree = parse_tree(tree_sitter_java::LANGUAGE.into(), content, file_path)?;
        let builder = SymbolBuilder {
            file_path,
            language: Language::Java,
        };

        let mut symbols = Vec::new();
        self.walk_members(tree.root_node(), content, &builder, None, &mut symbols);
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"package com.example;

import java.util.List;

/**
 * Handles user auth.
 *
 * @author someone
 */
@Service
public class AuthService extends Base implements Auth {
    private final List<String> users;

    /** Create the service. */
    public AuthService(List<String> users) {
        this.users = users;
    }

    @Override
    public boolean login(String user,
                         String password) throws AuthException {
        return users.contains(user);
    }

    static class Token {
    }

    enum Level {
        LOW, HIGH;

        int weight() { return 1; }
    }
}

interface Auth {
    boolean login(String user, String password);
}
"#;

    fn parse() -> Vec<Symbol> {
        JavaParser::new()
            .parse(SOURCE, "src/com/example/AuthService.java")
            .unwrap()
    }

    fn find<'a>(symbols: &'a [Symbol], name: &str, parent: &str) -> &'a Symbol {
        symbols
            .iter()
            .find(|s| s.name == name && s.parent == parent)
            .unwrap()
    }

    #[test]
    fn test_extracts_types_and_methods() {
        let symbols = parse();
        let names: Vec<String> = symbols.iter().map(|s| s.full_name()).collect();
        assert_eq!(
            names,
            vec![
                "AuthService",
                "AuthService.AuthService",
                "AuthService.login",
                "AuthService.Token",
                "AuthService.Level",
                "Level.weight",
                "Auth",
                "Auth.login",
            ]
        );
        assert_eq!(find(&symbols, "Token", "AuthService").kind, SymbolKind::Class);
        assert_eq!(find(&symbols, "weight", "Level").kind, SymbolKind::Method);
    }

    #[test]
    fn test_signatures_skip_modifiers() {
        let symbols = parse();
        assert_eq!(
            find(&symbols, "AuthService", "").signature,
            "class AuthService extends Base implements Auth"
        );
        assert_eq!(
            find(&symbols, "login", "AuthService").signature,
            "boolean login(String user, String password) throws AuthException"
        );
        assert_eq!(
            find(&symbols, "login", "Auth").signature,
            "boolean login(String user, String password)"
        );
    }

    #[test]
    fn test_javadoc() {
        let symbols = parse();
        let service = find(&symbols, "AuthService", "");
        assert_eq!(service.docstring, "Handles user auth.");
        assert_eq!(service.line_number, 10);
        assert_eq!(
            find(&symbols, "AuthService", "AuthService").docstring,
            "Create the service."
        );
        assert_eq!(find(&symbols, "login", "AuthService").docstring, "");
    }
}
