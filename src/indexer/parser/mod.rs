// Language parsers

pub mod cpp;
pub mod go;
pub mod java;
pub mod python;
pub mod rust;

use tracing::debug;
use tree_sitter::{Node, Parser as TreeParser, Tree};

use crate::error::{IndexError, Result};
use crate::index::{Language, Parser, Symbol, SymbolKind};

pub use cpp::CppParser;
pub use go::GoParser;
pub use java::JavaParser;
pub use python::PythonParser;
pub use rust::RustParser;

/// Bumped whenever extraction output changes shape. Invalidates every cached file.
pub const CACHE_SCHEMA_VERSION: i64 = 4;

/// The enabled parsers, selected by file extension
pub struct ParserRegistry {
    parsers: Vec<Box<dyn Parser>>,
}

impl ParserRegistry {
    pub fn new(enabled: &[Language]) -> Self {
        let parsers = enabled
            .iter()
            .map(|lang| -> Box<dyn Parser> {
                match lang {
                    Language::Python => Box::new(PythonParser::new()),
                    Language::Rust => Box::new(RustParser::new()),
                    Language::Go => Box::new(GoParser::new()),
                    Language::Java => Box::new(JavaParser::new()),
                    Language::Cpp => Box::new(CppParser::new()),
                }
            })
            .collect();
        Self { parsers }
    }

    pub fn with_all() -> Self {
        Self::new(&Language::ALL)
    }

    pub fn get_parser_for_file(&self, file_path: &str) -> Option<&dyn Parser> {
        self.parsers
            .iter()
            .find(|p| p.can_parse(file_path))
            .map(|p| p.as_ref())
    }

    pub fn can_index_file(&self, file_path: &str) -> bool {
        self.get_parser_for_file(file_path).is_some()
    }

    pub fn languages(&self) -> Vec<Language> {
        self.parsers.iter().map(|p| p.language()).collect()
    }
}

/// Parse `content`, keeping whatever tree-sitter recovers around syntax errors.
pub(crate) fn parse_tree(
    language: tree_sitter::Language,
    content: &str,
    file_path: &str,
) -> Result<Tree> {
    let mut parser = TreeParser::new();
    parser
        .set_language(&language)
        .map_err(|e| IndexError::parse(file_path, e.to_string()))?;

    let tree = parser
        .parse(content, None)
        .ok_or_else(|| IndexError::parse(file_path, "parser produced no tree"))?;

    if let Some(line) = error_line(&tree) {
        debug!("{}: syntax error near line {}, extracting recovered symbols", file_path, line);
    }
    Ok(tree)
}

/// Parse `content`, rejecting any tree that contains syntax errors.
pub(crate) fn parse_tree_strict(
    language: tree_sitter::Language,
    content: &str,
    file_path: &str,
) -> Result<Tree> {
    let tree = parse_tree(language, content, file_path)?;
    match error_line(&tree) {
        Some(line) => Err(IndexError::parse(
            file_path,
            format!("syntax error near line {}", line),
        )),
        None => Ok(tree),
    }
}

/// 1-indexed line of the first syntax error, if any
fn error_line(tree: &Tree) -> Option<usize> {
    let root = tree.root_node();
    if !root.has_error() {
        return None;
    }
    Some(first_error(root).map(|n| n.start_position().row + 1).unwrap_or(1))
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error())
        .find_map(first_error)
}

pub(crate) fn node_text<'a>(node: Node, content: &'a str) -> &'a str {
    node.utf8_text(content.as_bytes()).unwrap_or("")
}

pub(crate) fn field_text<'a>(node: Node, field: &str, content: &'a str) -> Option<&'a str> {
    node.child_by_field_name(field)
        .map(|n| node_text(n, content))
        .filter(|s| !s.is_empty())
}

/// Source text of `node` up to the start of its `body` field, whitespace-normalized.
pub(crate) fn header_text(node: Node, body_field: &str, content: &str) -> String {
    let end = node
        .child_by_field_name(body_field)
        .map(|body| body.start_byte())
        .unwrap_or_else(|| node.end_byte());
    let start = node.start_byte();
    let header = content.get(start..end).unwrap_or("");
    normalize_ws(header.trim_end_matches(|c: char| matches!(c, ':' | ';' | '=') || c.is_whitespace()))
}

/// Collapse whitespace runs to one space and tighten bracket padding.
pub fn normalize_ws(text: &str) -> String {
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    joined
        .replace("( ", "(")
        .replace(" )", ")")
        .replace("[ ", "[")
        .replace(" ]", "]")
        .replace(" ,", ",")
        .replace(",)", ")")
}

/// First paragraph of a documentation block, joined into one line.
pub fn first_paragraph<'a>(lines: impl IntoIterator<Item = &'a str>) -> String {
    let mut paragraph = Vec::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            if paragraph.is_empty() {
                continue;
            }
            break;
        }
        paragraph.push(line);
    }
    paragraph.join(" ")
}

/// Body lines of a `/** ... */` comment with the leading `*` gutter removed
pub(crate) fn block_doc_lines(comment: &str) -> Vec<&str> {
    let inner = comment
        .trim()
        .trim_start_matches("/**")
        .trim_end_matches("*/");
    inner
        .lines()
        .map(|line| {
            let line = line.trim();
            line.strip_prefix('*').map(str::trim_start).unwrap_or(line)
        })
        .collect()
}

/// 1-indexed (start, end) lines of a node
pub(crate) fn line_span(node: Node) -> (u32, u32) {
    let start = node.start_position().row as u32 + 1;
    let end = node.end_position().row as u32 + 1;
    (start, end.max(start))
}

/// Comment nodes directly above `node`, top to bottom.
///
/// Walks back over siblings of the given comment kinds (and over `skip`
/// kinds such as attributes) as long as each one ends on the line right
/// before the next.
pub(crate) fn leading_comments<'a>(
    node: Node,
    content: &'a str,
    comment_kinds: &[&str],
    skip: &[&str],
) -> Vec<&'a str> {
    let mut comments = Vec::new();
    let mut next_row = node.start_position().row;
    let mut current = node.prev_sibling();

    while let Some(prev) = current {
        let end = prev.end_position();
        // line comments may own their trailing newline
        let end_row = if end.column == 0 && end.row > prev.start_position().row {
            end.row - 1
        } else {
            end.row
        };
        let adjacent = end_row + 1 >= next_row;
        if !adjacent {
            break;
        }
        if comment_kinds.contains(&prev.kind()) {
            comments.push(node_text(prev, content));
        } else if !skip.contains(&prev.kind()) {
            break;
        }
        next_row = prev.start_position().row;
        current = prev.prev_sibling();
    }

    comments.reverse();
    comments
}

pub(crate) struct SymbolBuilder<'a> {
    pub file_path: &'a str,
    pub language: Language,
}

impl SymbolBuilder<'_> {
    pub fn build(
        &self,
        node: Node,
        name: &str,
        kind: SymbolKind,
        signature: String,
        docstring: String,
        parent: Option<&str>,
    ) -> Symbol {
        let (line_number, end_line_number) = line_span(node);
        Symbol {
            name: name.to_string(),
            kind,
            signature,
            docstring,
            file_path: self.file_path.to_string(),
            line_number,
            end_line_number,
            parent: parent.unwrap_or("").to_string(),
            language: self.language,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_dispatch() {
        let registry = ParserRegistry::with_all();
        assert_eq!(
            registry.get_parser_for_file("pkg/a.py").map(|p| p.language()),
            Some(Language::Python)
        );
        assert_eq!(
            registry.get_parser_for_file("main.go").map(|p| p.language()),
            Some(Language::Go)
        );
        assert_eq!(
            registry.get_parser_for_file("include/shapes.h").map(|p| p.language()),
            Some(Language::Cpp)
        );
        assert!(!registry.can_index_file("notes.txt"));

        let python_only = ParserRegistry::new(&[Language::Python]);
        assert!(!python_only.can_index_file("lib.rs"));
        assert_eq!(python_only.languages(), vec![Language::Python]);
    }

    #[test]
    fn test_normalize_ws() {
        assert_eq!(normalize_ws("fn  a(\n    x: u32,\n    y: u32,\n)"), "fn a(x: u32, y: u32)");
        assert_eq!(normalize_ws("\tdef  f( a ,b )"), "def f(a,b)");
    }

    #[test]
    fn test_first_paragraph() {
        let doc = "\n  Handles user auth.\n  Second line.\n\n  Details here.";
        assert_eq!(first_paragraph(doc.lines()), "Handles user auth. Second line.");
        assert_eq!(first_paragraph("".lines()), "");
    }

    #[test]
    fn test_block_doc_lines() {
        let lines = block_doc_lines("/**\n * Handles auth.\n *\n * @param x\n */");
        assert_eq!(first_paragraph(lines), "Handles auth.");
    }

    #[test]
    fn test_syntax_error_is_parse_error() {
        let err = parse_tree_strict(tree_sitter_python::LANGUAGE.into(), "def broken(:\n", "x.py")
            .unwrap_err();
        assert!(matches!(err, IndexError::Parse { ref file, .. } if file == "x.py"));
    }

    #[test]
    fn test_recovering_parse_keeps_the_rest_of_the_file() {
        let source = "pub fn before() {}\n\nfn broken( {\n\npub struct After {\n    id: u32,\n}\n";
        let tree = parse_tree(tree_sitter_rust::LANGUAGE.into(), source, "lib.rs").unwrap();
        assert!(tree.root_node().has_error());

        let symbols = RustParser::new().parse(source, "lib.rs").unwrap();
        assert!(symbols.iter().any(|s| s.name == "before"));
    }
}
