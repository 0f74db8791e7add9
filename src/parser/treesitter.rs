//! Tree-sitter based tokenizer.
//!
//! Tokens are the leaf nodes of the concrete syntax tree, with comment
//! subtrees skipped. `first_syntax_error` locates the first ERROR or
//! MISSING node so the rule engine can report unparseable files.

use tree_sitter::{Language as Grammar, Node, Parser as TsParser, Tree};

use super::{SyntaxError, Token, Tokenizer};
use crate::language::Language;

/// Tree-sitter backed tokenizer.
pub struct TreeSitterTokenizer {
    language: Language,
    grammar: Grammar,
}

impl TreeSitterTokenizer {
    /// Create a new tokenizer for the given language and grammar.
    pub fn new(language: Language, grammar: Grammar) -> Self {
        Self { language, grammar }
    }

    /// Parse source code and return the tree.
    pub fn parse(&self, source: &[u8]) -> anyhow::Result<Tree> {
        let mut parser = TsParser::new();
        parser.set_language(&self.grammar)?;
        parser
            .parse(source, None)
            .ok_or_else(|| anyhow::anyhow!("failed to parse source"))
    }
}

impl Tokenizer for TreeSitterTokenizer {
    fn tokenize(&self, source: &str) -> anyhow::Result<Vec<Token>> {
        let bytes = source.as_bytes();
        let tree = self.parse(bytes)?;

        let mut tokens = Vec::new();
        collect_leaves(tree.root_node(), bytes, &mut tokens);
        Ok(tokens)
    }

    fn language(&self) -> Language {
        self.language
    }
}

fn is_comment(node: &Node) -> bool {
    node.kind().contains("comment")
}

/// Depth-first walk collecting non-empty leaf tokens.
fn collect_leaves(root: Node, source: &[u8], out: &mut Vec<Token>) {
    let mut cursor = root.walk();
    let mut descend = true;

    loop {
        let node = cursor.node();
        if descend && !is_comment(&node) {
            if node.child_count() == 0 {
                push_token(node, source, out);
            } else if cursor.goto_first_child() {
                continue;
            }
        }

        if cursor.goto_next_sibling() {
            descend = true;
            continue;
        }
        if !cursor.goto_parent() {
            break;
        }
        descend = false;
    }
}

fn push_token(node: Node, source: &[u8], out: &mut Vec<Token>) {
    let text = node.utf8_text(source).unwrap_or("");
    if text.trim().is_empty() {
        return;
    }
    let start = node.start_position();
    let end = node.end_position();
    // end_position is exclusive; a token never ends at column 0 of a line
    // unless it spans a trailing newline, which trimmed leaves don't.
    out.push(Token {
        image: text.to_string(),
        start_line: start.row + 1,
        start_col: start.column + 1,
        end_line: end.row + 1,
        end_col: end.column.max(1),
    });
}

/// Locate the first ERROR or MISSING node in document order.
pub fn first_syntax_error(root: Node) -> Option<SyntaxError> {
    if !root.has_error() {
        return None;
    }

    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            let pos = node.start_position();
            let message = if node.is_missing() {
                format!("missing \"{}\"", node.kind())
            } else {
                "unexpected input".to_string()
            };
            return Some(SyntaxError {
                line: pos.row + 1,
                col: pos.column + 1,
                message,
            });
        }

        // Only descend into subtrees that contain the error.
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                // has_error() was true on the root, so an error node exists;
                // fall back to reporting the root position.
                let pos = root.start_position();
                return Some(SyntaxError {
                    line: pos.row + 1,
                    col: pos.column + 1,
                    message: "unexpected input".to_string(),
                });
            }
        }
    }
}
