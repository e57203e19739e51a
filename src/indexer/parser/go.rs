use tree_sitter::Node;

use super::{
    field_text, first_paragraph, header_text, leading_comments, node_text, normalize_ws,
    parse_tree, SymbolBuilder,
};
use crate::error::Result;
use crate::index::{Language, Parser, Symbol, SymbolKind};

// Go parser using tree-sitter
pub struct GoParser;

impl GoParser {
    pub fn new() -> Self {
        Self
    }

    fn extract(&self, root: Node, content: &str, builder: &SymbolBuilder) -> Vec<Symbol> {
        let mut symbols = Vec::new();
        let mut cursor = root.walk();

        for decl in root.named_children(&mut cursor) {
            match decl.kind() {
                "function_declaration" => {
                    if let Some(name) = field_text(decl, "name", content) {
                        symbols.push(builder.build(
                            decl,
                            name,
                            SymbolKind::Function,
                            header_text(decl, "body", content),
                            doc_comment(decl, content),
                            None,
                        ));
                    }
                }
                "method_declaration" => {
                    if let Some(name) = field_text(decl, "name", content) {
                        let receiver = receiver_type(decl, content);
                        symbols.push(builder.build(
                            decl,
                            name,
                            SymbolKind::Method,
                            header_text(decl, "body", content),
                            doc_comment(decl, content),
                            receiver,
                        ));
                    }
                }
                "type_declaration" => self.extract_types(decl, content, builder, &mut symbols),
                _ => {}
            }
        }

        symbols
    }

    fn extract_types(
        &self,
        decl: Node,
        content: &str,
        builder: &SymbolBuilder,
        symbols: &mut Vec<Symbol>,
    ) {
        let single = decl.named_child_count() == 1;
        let mut cursor = decl.walk();

        for spec in decl.named_children(&mut cursor) {
            if spec.kind() != "type_spec" && spec.kind() != "type_alias" {
                continue;
            }
            let Some(name) = field_text(spec, "name", content) else {
                continue;
            };
            let type_params = field_text(spec, "type_parameters", content).unwrap_or("");
            let ty = spec.child_by_field_name("type");

            let (kind, signature) = match ty.map(|t| t.kind()) {
                Some("struct_type") => (
                    SymbolKind::Class,
                    format!("type {}{} struct", name, type_params),
                ),
                Some("interface_type") => (
                    SymbolKind::Class,
                    format!("type {}{} interface", name, type_params),
                ),
                _ => (
                    SymbolKind::Other,
                    normalize_ws(&format!("type {}", node_text(spec, content))),
                ),
            };

            // a lone spec owns the whole `type X ...` declaration and its doc comment
            let anchor = if single { decl } else { spec };
            symbols.push(builder.build(
                anchor,
                name,
                kind,
                signature,
                doc_comment(anchor, content),
                None,
            ));
        }
    }
}

impl Default for GoParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver base type: `Server` for `(s *Server)` or `(l List[T])`
fn receiver_type<'a>(method: Node, content: &'a str) -> Option<&'a str> {
    let receiver = method.child_by_field_name("receiver")?;
    let mut cursor = receiver.walk();
    let param = receiver
        .named_children(&mut cursor)
        .find(|n| n.kind() == "parameter_declaration")?;

    let mut ty = param.child_by_field_name("type")?;
    loop {
        match ty.kind() {
            "pointer_type" => ty = ty.named_child(0)?,
            "generic_type" => ty = ty.child_by_field_name("type")?,
            _ => return Some(node_text(ty, content)),
        }
    }
}

/// `//` or `/* */` comment block directly above a declaration
fn doc_comment(decl: Node, content: &str) -> String {
    let comments = leading_comments(decl, content, &["comment"], &[]);

    let mut lines = Vec::new();
    for comment in comments {
        if let Some(line) = comment.strip_prefix("//") {
            lines.push(line.trim());
        } else if let Some(block) = comment.strip_prefix("/*") {
            lines.extend(block.trim_end_matches("*/").lines().map(str::trim));
        }
    }
    first_paragraph(lines)
}

impl Parser for GoParser {
    fn language(&self) -> Language {
        Language::Go
    }

    fn parse(&self, content: &str, file_path: &str) -> Result<Vec<Symbol>> {
        let tree = parse_tree(tree_sitter_go::LANGUAGE.into(), content, file_path)?;
        let builder = SymbolBuilder {
            file_path,
            language: Language::Go,
        };
        Ok(self.extract(tree.root_node(), content, &builder))
    }
}
