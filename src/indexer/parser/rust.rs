use tree_sitter::Node;

use super::{
    block_doc_lines, field_text, first_paragraph, header_text, leading_comments, node_text,
    normalize_ws, parse_tree, SymbolBuilder,
};
use crate::error::Result;
use crate::index::{Language, Parser, Symbol, SymbolKind};

// Rust parser using tree-sitter
pub struct RustParser;

impl RustParser {
    pub fn new() -> Self {
        Self
    }

    /// Visit the items of a source file, module, impl or trait body.
    /// `owner` is the impl/trait type whose body this is.
    fn walk_items(
        &self,
        list: Node,
        content: &str,
        builder: &SymbolBuilder,
        owner: Option<&str>,
        symbols: &mut Vec<Symbol>,
    ) {
        let mut cursor = list.walk();
        for item in list.named_children(&mut cursor) {
            match item.kind() {
                "function_item" | "function_signature_item" => {
                    let kind = if owner.is_some() {
                        SymbolKind::Method
                    } else {
                        SymbolKind::Function
                    };
                    self.push(item, kind, header_text(item, "body", content), content, builder, owner, symbols);
                }
                "struct_item" | "enum_item" | "union_item" => {
                    self.push(item, SymbolKind::Class, header_text(item, "body", content), content, builder, owner, symbols);
                }
                "trait_item" => {
                    self.push(item, SymbolKind::Class, header_text(item, "body", content), content, builder, owner, symbols);
                    if let (Some(name), Some(body)) = (
                        field_text(item, "name", content),
                        item.child_by_field_name("body"),
                    ) {
                        self.walk_items(body, content, builder, Some(name), symbols);
                    }
                }
                "impl_item" => {
                    let ty = item.child_by_field_name("type").map(|t| base_type_name(t, content));
                    if let (Some(ty), Some(body)) = (ty, item.child_by_field_name("body")) {
                        self.walk_items(body, content, builder, Some(ty), symbols);
                    }
                }
                "mod_item" => {
                    self.push(item, SymbolKind::Other, header_text(item, "body", content), content, builder, owner, symbols);
                    if let Some(body) = item.child_by_field_name("body") {
                        self.walk_items(body, content, builder, None, symbols);
                    }
                }
                "const_item" | "static_item" => {
                    self.push(item, SymbolKind::Other, header_text(item, "value", content), content, builder, owner, symbols);
                }
                "type_item" => {
                    self.push(item, SymbolKind::Other, normalize_ws(node_text(item, content).trim_end_matches(';')), content, builder, owner, symbols);
                }
                "macro_definition" => {
                    if let Some(name) = field_text(item, "name", content) {
                        let signature = format!("macro_rules! {}", name);
                        self.push(item, SymbolKind::Other, signature, content, builder, owner, symbols);
                    }
                }
                _ => {}
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        &self,
        item: Node,
        kind: SymbolKind,
        signature: String,
        content: &str,
        builder: &SymbolBuilder,
        owner: Option<&str>,
        symbols: &mut Vec<Symbol>,
    ) {
        let Some(name) = field_text(item, "name", content) else {
            return;
        };
        symbols.push(builder.build(item, name, kind, signature, doc_comment(item, content), owner));
    }
}

impl Default for RustParser {
    fn default() -> Self {
        Self::new()
    }
}

/// `Wrapper` for `Wrapper<T>`, `&mut Wrapper` or `crate::x::Wrapper`
fn base_type_name<'a>(ty: Node, content: &'a str) -> &'a str {
    match ty.kind() {
        "generic_type" | "reference_type" | "pointer_type" => ty
            .child_by_field_name("type")
            .map(|inner| base_type_name(inner, content))
            .unwrap_or_else(|| node_text(ty, content)),
        "scoped_type_identifier" => field_text(ty, "name", content).unwrap_or_else(|| node_text(ty, content)),
        _ => node_text(ty, content),
    }
}

/// Outer doc comments (`///` or `/** */`) above an item, attributes skipped
fn doc_comment(item: Node, content: &str) -> String {
    let comments = leading_comments(item, content, &["line_comment", "block_comment"], &["attribute_item"]);

    let mut lines = Vec::new();
    for comment in comments {
        if let Some(line) = comment.strip_prefix("///") {
            if !line.starts_with('/') {
                lines.push(line.trim_end());
            }
        } else if comment.starts_with("/**") && !comment.starts_with("/***") {
            lines.extend(block_doc_lines(comment));
        }
    }
    first_paragraph(lines)
}

impl Parser for RustParser {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn parse(&self, content: &str, file_path: &str) -> Result<Vec<Symbol>> {
        let tree = parse_tree(tree_sitter_rust::LANGUAGE.into(), content, file_path)?;
        let builder = SymbolBuilder {
            file_path,
            language: Language::Rust,
        };

        let mut symbols = Vec::new();
        self.walk_items(tree.root_node(), content, &builder, None, &mut symbols);
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"use std::fmt;

/// Handles user auth.
///
/// More detail.
#[derive(Debug, Clone)]
pub struct Foo {
    name: String,
}

// plain comment
pub const MAX_USERS: usize = 10;

impl<T> Wrapper<T> {
    /// Build a wrapper.
    pub fn new(
        value: T,
    ) -> Self {
        Self { value }
    }
}

pub trait Store {
    fn get(&self, key: &str) -> Option<String>;
}

pub enum Mode { A, B }

mod inner {
    pub fn helper() {}
}
"#;

    fn parse() -> Vec<Symbol> {
        RustParser::new().parse(SOURCE, "src/lib.rs").unwrap()
    }

    fn find<'a>(symbols: &'a [Symbol], name: &str) -> &'a Symbol {
        symbols.iter().find(|s| s.name == name).unwrap()
    }

    #[test]
    fn test_extracts_items() {
        let symbols = parse();
        let names: Vec<&str> = symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Foo", "MAX_USERS", "new", "Store", "get", "Mode", "inner", "helper"]
        );

        assert_eq!(find(&symbols, "Foo").kind, SymbolKind::Class);
        assert_eq!(find(&symbols, "Mode").kind, SymbolKind::Class);
        assert_eq!(find(&symbols, "MAX_USERS").kind, SymbolKind::Other);
        assert_eq!(find(&symbols, "helper").kind, SymbolKind::Function);
        assert_eq!(find(&symbols, "helper").parent, "");
    }

    #[test]
    fn test_methods_carry_owner() {
        let symbols = parse();
        let new = find(&symbols, "new");
        assert_eq!(new.kind, SymbolKind::Method);
        assert_eq!(new.parent, "Wrapper");
        assert_eq!(new.signature, "pub fn new(value: T) -> Self");

        let get = find(&symbols, "get");
        assert_eq!(get.kind, SymbolKind::Method);
        assert_eq!(get.parent, "Store");
        assert_eq!(get.signature, "fn get(&self, key: &str) -> Option<String>");
    }

    #[test]
    fn test_doc_comments() {
        let symbols = parse();
        let foo = find(&symbols, "Foo");
        assert_eq!(foo.docstring, "Handles user auth.");
        assert_eq!(foo.signature, "pub struct Foo");
        assert_eq!(foo.line_number, 7);
        assert_eq!(find(&symbols, "MAX_USERS").docstring, "");
        assert_eq!(find(&symbols, "new").docstring, "Build a wrapper.");
    }

    #[test]
    fn test_syntax_error() {
        assert!(RustParser::new().parse("fn broken( {", "bad.rs").is_err());
    }
}
