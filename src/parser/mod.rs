//! Language-agnostic tokenization for the analysis engines.
//!
//! This module provides:
//! - `Tokenizer` trait: turns source text into positioned tokens
//! - A tree-sitter implementation for languages with a compiled-in grammar
//! - A regex lexer used for markup languages and when tree-sitter is disabled

pub mod lexer;

#[cfg(feature = "tree-sitter")]
pub mod treesitter;

use crate::language::Language;

/// A single lexical token with its source span.
///
/// Lines and columns are 1-indexed; `end_col` is inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub image: String,
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

/// The first syntax error found while parsing a file with tree-sitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub line: usize,
    pub col: usize,
    pub message: String,
}

/// Tokenizer trait for turning source text into tokens.
pub trait Tokenizer: Send + Sync {
    /// Tokenize source code, skipping whitespace and comments.
    fn tokenize(&self, source: &str) -> anyhow::Result<Vec<Token>>;

    /// Return the language this tokenizer handles.
    fn language(&self) -> Language;
}

/// Get a tokenizer for a language, preferring tree-sitter when a grammar
/// is compiled in.
pub fn for_language(language: Language) -> anyhow::Result<Box<dyn Tokenizer>> {
    #[cfg(feature = "tree-sitter")]
    if let Some(grammar) = language.grammar() {
        return Ok(Box::new(treesitter::TreeSitterTokenizer::new(
            language, grammar,
        )));
    }
    Ok(Box::new(lexer::RegexLexer::new(language)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markup_uses_lexer() {
        let tokenizer = for_language(Language::Xml).unwrap();
        assert_eq!(tokenizer.language(), Language::Xml);
        let tokens = tokenizer.tokenize("<a>x</a>").unwrap();
        assert!(!tokens.is_empty());
    }

    #[test]
    #[cfg(feature = "tree-sitter")]
    fn test_java_uses_tree_sitter() {
        let tokenizer = for_language(Language::Java).unwrap();
        let tokens = tokenizer
            .tokenize("class A { void f() { int x = 1; } }")
            .unwrap();
        assert!(tokens.iter().any(|t| t.image == "class"));
    }
}
