use tree_sitter::Node;

use super::{
    block_doc_lines, field_text, first_paragraph, header_text, leading_comments, node_text,
    normalize_ws, parse_tree, SymbolBuilder,
};
use crate::error::Result;
use crate::index::{Language, Parser, Symbol, SymbolKind};

// C++ parser using tree-sitter
pub struct CppParser;

const TYPE_SPECIFIERS: &[&str] = &[
    "class_specifier",
    "struct_specifier",
    "union_specifier",
    "enum_specifier",
];

/// Declarators that wrap the function declarator, e.g. `T* f()` or `T& f()`
const WRAPPING_DECLARATORS: &[&str] = &[
    "pointer_declarator",
    "reference_declarator",
    "parenthesized_declarator",
    "attributed_declarator",
];

impl CppParser {
    pub fn new() -> Self {
        Self
    }

    /// Visit a translation unit, namespace body or class body.
    /// `class` is set when `list` is the member list of that class.
    fn walk(
        &self,
        list: Node,
        content: &str,
        builder: &SymbolBuilder,
        class: Option<&str>,
        symbols: &mut Vec<Symbol>,
    ) {
        let mut cursor = list.walk();
        for item in list.named_children(&mut cursor) {
            match item.kind() {
                "namespace_definition" | "linkage_specification" => {
                    if let Some(body) = item.child_by_field_name("body") {
                        self.walk(body, content, builder, None, symbols);
                    }
                }
                // include guards and #if blocks around declarations
                "template_declaration" | "preproc_ifdef" | "preproc_if" | "preproc_else"
                | "preproc_elif" => self.walk(item, content, builder, class, symbols),
                kind if TYPE_SPECIFIERS.contains(&kind) => {
                    self.push_type(item, content, builder, class, symbols);
                }
                "function_definition" => {
                    self.push_function(item, content, builder, class, symbols);
                }
                "field_declaration" | "declaration" => {
                    if let Some(ty) = item.child_by_field_name("type") {
                        if TYPE_SPECIFIERS.contains(&ty.kind()) {
                            self.push_type(ty, content, builder, class, symbols);
                        }
                    }
                    // member prototypes; free prototypes repeat their definitions
                    if let (Some(owner), Some(declarator)) = (class, function_declarator(item)) {
                        if let Some(name) = declarator.child_by_field_name("declarator") {
                            let (_, name) = split_name(name, content);
                            let signature = normalize_ws(node_text(item, content).trim_end_matches(';'));
                            symbols.push(builder.build(
                                item,
                                name,
                                SymbolKind::Method,
                                signature,
                                doc_comment(item, content),
                                Some(owner),
                            ));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn push_type(
        &self,
        node: Node,
        content: &str,
        builder: &SymbolBuilder,
        class: Option<&str>,
        symbols: &mut Vec<Symbol>,
    ) {
        // forward declarations and anonymous types are skipped
        let (Some(name), Some(body)) = (node.child_by_field_name("name"), node.child_by_field_name("body")) else {
            return;
        };
        let name = type_name(name, content);
        symbols.push(builder.build(
            node,
            name,
            SymbolKind::Class,
            header_text(node, "body", content),
            doc_comment(node, content),
            class,
        ));
        if node.kind() != "enum_specifier" {
            self.walk(body, content, builder, Some(name), symbols);
        }
    }

    fn push_function(
        &self,
        node: Node,
        content: &str,
        builder: &SymbolBuilder,
        class: Option<&str>,
        symbols: &mut Vec<Symbol>,
    ) {
        let Some(name) = function_declarator(node).and_then(|d| d.child_by_field_name("declarator")) else {
            return;
        };
        let (scope, name) = split_name(name, content);

        // `Shape::area` defined outside its class is still a method of Shape
        let parent = class.or(scope);
        let kind = if parent.is_some() {
            SymbolKind::Method
        } else {
            SymbolKind::Function
        };
        symbols.push(builder.build(
            node,
            name,
            kind,
            header_text(node, "body", content),
            doc_comment(node, content),
            parent,
        ));
    }
}

impl Default for CppParser {
    fn default() -> Self {
        Self::new()
    }
}

/// The `function_declarator` under a definition or declaration, if it declares a function
fn function_declarator(node: Node) -> Option<Node> {
    let mut current = node.child_by_field_name("declarator")?;
    loop {
        match current.kind() {
            "function_declarator" => return Some(current),
            kind if WRAPPING_DECLARATORS.contains(&kind) => {
                current = match current.child_by_field_name("declarator") {
                    Some(inner) => inner,
                    None => last_named_child(current)?,
                };
            }
            _ => return None,
        }
    }
}

fn last_named_child(node: Node) -> Option<Node> {
    let mut cursor = node.walk();
    let last = node.named_children(&mut cursor).last();
    last
}

/// Innermost scope and plain name of `f`, `A::f` or `ns::A<T>::f`
fn split_name<'a>(node: Node, content: &'a str) -> (Option<&'a str>, &'a str) {
    let mut scope = None;
    let mut current = node;
    while current.kind() == "qualified_identifier" {
        scope = current
            .child_by_field_name("scope")
            .map(|s| type_name(s, content))
            .filter(|s| !s.is_empty());
        match current.child_by_field_name("name") {
            Some(name) => current = name,
            None => break,
        }
    }

    let name = match current.kind() {
        "template_function" => field_text(current, "name", content).unwrap_or_else(|| node_text(current, content)),
        _ => node_text(current, content),
    };
    (scope, name)
}

/// `Box` for `Box<T>`, otherwise the text as written
fn type_name<'a>(node: Node, content: &'a str) -> &'a str {
    match node.kind() {
        "template_type" => field_text(node, "name", content).unwrap_or_else(|| node_text(node, content)),
        "qualified_identifier" => node
            .child_by_field_name("name")
            .map(|name| type_name(name, content))
            .unwrap_or_else(|| node_text(node, content)),
        _ => node_text(node, content),
    }
}

/// `///`, `//!` or `/** */` comments directly above a declaration
fn doc_comment(node: Node, content: &str) -> String {
    let mut anchor = node;
    while let Some(parent) = anchor.parent() {
        if !matches!(parent.kind(), "template_declaration" | "field_declaration" | "declaration") {
            break;
        }
        anchor = parent;
    }

    let mut lines = Vec::new();
    for comment in leading_comments(anchor, content, &["comment"], &[]) {
        if let Some(line) = comment.strip_prefix("///").or_else(|| comment.strip_prefix("//!")) {
            lines.push(line.trim_end());
        } else if comment.starts_with("/**") {
            lines.extend(block_doc_lines(comment));
        }
    }
    first_paragraph(lines)
}

impl Parser for CppParser {
    fn language(&self) -> Language {
        Language::Cpp
    }

    fn parse(&self, content: &str, file_path: &str) -> Result<Vec<Symbol>> {
        let tree = parse_tree(tree_sitter_cpp::LANGUAGE.into(), content, file_path)?;
        let builder = SymbolBuilder {
            file_path,
            language: Language::Cpp,
        };

        let mut symbols = Vec::new();
        self.walk(tree.root_node(), content, &builder, None, &mut symbols);
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = r#"#ifndef GEO_SHAPES_H
#define GEO_SHAPES_H

#include <string>

namespace geo {

/// A point in the plane.
struct Point {
    double x;
    double y;
};

/**
 * Base shape.
 *
 * Subclasses provide the area.
 */
class Shape : public Base {
public:
    virtual ~Shape();
    /// Area of the shape.
    virtual double area() const = 0;
    std::string name() const { return name_; }

    struct Style {
        int width;
    };

private:
    std::string name_;
};

template <typename T>
class Box {
    T value;
};

}  // namespace geo

#endif
"#;

    const SOURCE: &str = r#"#include "shapes.h"

/// Always zero for the base.
double geo::Shape::area() const { return 0.0; }

Shape::~Shape() {}

/// Distance between two points.
double distance(const Point& a, const Point& b) {
    return 0.0;
}

static int helper(int x) { return x; }

int& counter() {
    static int c = 0;
    return c;
}
"#;

    fn parse(source: &str, file: &str) -> Vec<Symbol> {
        CppParser::new().parse(source, file).unwrap()
    }

    fn find<'a>(symbols: &'a [Symbol], name: &str, parent: &str) -> &'a Symbol {
        symbols
            .iter()
            .find(|s| s.name == name && s.parent == parent)
            .unwrap()
    }

    #[test]
    fn test_header_types_and_members() {
        let symbols = parse(HEADER, "include/shapes.h");
        let names: Vec<String> = symbols.iter().map(|s| s.full_name()).collect();
        assert_eq!(
            names,
            vec!["Point", "Shape", "Shape.~Shape", "Shape.area", "Shape.name", "Shape.Style", "Box"]
        );

        assert_eq!(find(&symbols, "Point", "").kind, SymbolKind::Class);
        assert_eq!(find(&symbols, "Box", "").kind, SymbolKind::Class);
        assert_eq!(find(&symbols, "Style", "Shape").kind, SymbolKind::Class);
        assert_eq!(find(&symbols, "area", "Shape").kind, SymbolKind::Method);
        assert!(symbols.iter().all(|s| s.language == Language::Cpp));
    }

    #[test]
    fn test_header_docs_and_signatures() {
        let symbols = parse(HEADER, "include/shapes.h");
        let shape = find(&symbols, "Shape", "");
        assert_eq!(shape.docstring, "Base shape.");
        assert_eq!(shape.signature, "class Shape : public Base");
        assert_eq!(find(&symbols, "Point", "").docstring, "A point in the plane.");
        assert_eq!(find(&symbols, "area", "Shape").docstring, "Area of the shape.");
        assert_eq!(find(&symbols, "name", "Shape").docstring, "");
    }

    #[test]
    fn test_out_of_line_definitions_and_free_functions() {
        let symbols = parse(SOURCE, "src/shapes.cpp");
        let names: Vec<String> = symbols.iter().map(|s| s.full_name()).collect();
        assert_eq!(
            names,
            vec!["Shape.area", "Shape.~Shape", "distance", "helper", "counter"]
        );

        let area = find(&symbols, "area", "Shape");
        assert_eq!(area.kind, SymbolKind::Method);
        assert_eq!(area.signature, "double geo::Shape::area() const");
        assert_eq!(area.docstring, "Always zero for the base.");

        let distance = find(&symbols, "distance", "");
        assert_eq!(distance.kind, SymbolKind::Function);
        assert_eq!(distance.signature, "double distance(const Point& a, const Point& b)");
        assert_eq!(distance.docstring, "Distance between two points.");
        assert_eq!((distance.line_number, distance.end_line_number), (9, 11));

        assert_eq!(find(&symbols, "counter", "").kind, SymbolKind::Function);
    }
}
