use tree_sitter::Node;

use super::{field_text, first_paragraph, node_text, normalize_ws, parse_tree_strict, SymbolBuilder};
use crate::error::Result;
use crate::index::{Language, Parser, Symbol, SymbolKind};

/// Python parser using tree-sitter
pub struct PythonParser;

impl PythonParser {
    pub fn new() -> Self {
        Self
    }

    /// Visit the statements of a module or block.
    ///
    /// `class` is the immediately enclosing class, `in_class_body` is true when
    /// `block` is that class's own body (functions there are methods).
    fn walk_block(
        &self,
        block: Node,
        content: &str,
        builder: &SymbolBuilder,
        class: Option<&str>,
        in_class_body: bool,
        symbols: &mut Vec<Symbol>,
    ) {
        let mut cursor = block.walk();
        for child in block.named_children(&mut cursor) {
            let def = if child.kind() == "decorated_definition" {
                match child.child_by_field_name("definition") {
                    Some(def) => def,
                    None => continue,
                }
            } else {
                child
            };

            match def.kind() {
                "function_definition" => {
                    let Some(name) = field_text(def, "name", content) else {
                        continue;
                    };
                    let kind = if in_class_body {
                        SymbolKind::Method
                    } else {
                        SymbolKind::Function
                    };
                    let parent = if in_class_body { class } else { None };
                    symbols.push(builder.build(
                        def,
                        name,
                        kind,
                        self.function_signature(def, name, content),
                        self.docstring(def, content),
                        parent,
                    ));
                    // function bodies are private scope, nothing inside is indexed
                }
                "class_definition" => {
                    let Some(name) = field_text(def, "name", content) else {
                        continue;
                    };
                    let signature = match def.child_by_field_name("superclasses") {
                        Some(bases) => format!("{}{}", name, normalize_ws(node_text(bases, content))),
                        None => name.to_string(),
                    };
                    symbols.push(builder.build(
                        def,
                        name,
                        SymbolKind::Class,
                        signature,
                        self.docstring(def, content),
                        class,
                    ));
                    if let Some(body) = def.child_by_field_name("body") {
                        self.walk_block(body, content, builder, Some(name), true, symbols);
                    }
                }
                // if/try/with blocks at the same scope level
                _ => self.walk_block(def, content, builder, class, in_class_body, symbols),
            }
        }
    }

    /// `name(params) -> return`, with default values dropped
    fn function_signature(&self, node: Node, name: &str, content: &str) -> String {
        let mut params = Vec::new();
        if let Some(parameters) = node.child_by_field_name("parameters") {
            let mut cursor = parameters.walk();
            for param in parameters.named_children(&mut cursor) {
                let rendered = match param.kind() {
                    "comment" => continue,
                    "default_parameter" => field_text(param, "name", content)
                        .unwrap_or_default()
                        .to_string(),
                    "typed_default_parameter" => {
                        let pname = field_text(param, "name", content).unwrap_or_default();
                        match field_text(param, "type", content) {
                            Some(ty) => format!("{}: {}", pname, normalize_ws(ty)),
                            None => pname.to_string(),
                        }
                    }
                    _ => normalize_ws(node_text(param, content)),
                };
                if !rendered.is_empty() {
                    params.push(rendered);
                }
            }
        }

        let mut signature = format!("{}({})", name, params.join(", "));
        if let Some(ret) = field_text(node, "return_type", content) {
            signature.push_str(" -> ");
            signature.push_str(&normalize_ws(ret));
        }
        signature
    }

    /// The string literal opening a function or class body
    fn docstring(&self, node: Node, content: &str) -> String {
        let Some(body) = node.child_by_field_name("body") else {
            return String::new();
        };
        let mut cursor = body.walk();
        let first = body
            .named_children(&mut cursor)
            .find(|child| child.kind() != "comment");

        let Some(stmt) = first.filter(|s| s.kind() == "expression_statement") else {
            return String::new();
        };
        match stmt.named_child(0) {
            Some(string) if string.kind() == "string" => {
                first_paragraph(unquote(node_text(string, content)).lines())
            }
            _ => String::new(),
        }
    }
}

impl Default for PythonParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip the prefix and quotes from a Python string literal
fn unquote(literal: &str) -> &str {
    let body = literal.trim_start_matches(|c: char| "rRbBuUfF".contains(c));
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if body.len() >= 2 * quote.len() && body.starts_with(quote) && body.ends_with(quote) {
            return &body[quote.len()..body.len() - quote.len()];
        }
    }
    body
}

impl Parser for PythonParser {
    fn language(&self) -> Language {
        Language::Python
    }

    fn parse(&self, content: &str, file_path: &str) -> Result<Vec<Symbol>> {
        let tree = parse_tree_strict(tree_sitter_python::LANGUAGE.into(), content, file_path)?;
        let builder = SymbolBuilder {
            file_path,
            language: Language::Python,
        };

        let mut symbols = Vec::new();
        self.walk_block(tree.root_node(), content, &builder, None, false, &mut symbols);
        Ok(symbols)
    }
}
