//! Regex based lexer.
//!
//! Used for languages without a tree-sitter grammar (XML, HTML) and for
//! every language when the `tree-sitter` feature is disabled. It recognises
//! comments, string literals, identifiers, numbers and single punctuation
//! characters, which is enough to find copy/paste blocks.

use regex::Regex;

use super::{Token, Tokenizer};
use crate::language::Language;

/// Capture group used for tokens that are kept.
const TOKEN_GROUP: &str = "tok";

/// Regex lexer configured from a language's comment syntax.
pub struct RegexLexer {
    language: Language,
    regex: Regex,
}

impl RegexLexer {
    /// Build a lexer for the given language.
    pub fn new(language: Language) -> anyhow::Result<Self> {
        let syntax = language.comment_syntax();
        let mut skip = vec![r"\s+".to_string()];
        if let Some(line) = syntax.line {
            skip.push(format!(r"{}[^\n]*", regex::escape(line)));
        }
        if let Some((open, close)) = syntax.block {
            skip.push(format!(
                r"(?s:{}.*?{})",
                regex::escape(open),
                regex::escape(close)
            ));
        }

        let keep = [
            r#""(?:\\.|[^"\\\n])*""#,
            r"'(?:\\.|[^'\\\n])*'",
            r"[A-Za-z_][A-Za-z0-9_]*",
            r"[0-9][0-9A-Za-z_.]*",
            r"\S",
        ]
        .join("|");

        let pattern = format!("(?:{})|(?P<{}>{})", skip.join("|"), TOKEN_GROUP, keep);
        let regex = Regex::new(&pattern)
            .map_err(|e| anyhow::anyhow!("building lexer for {}: {}", language, e))?;

        Ok(Self { language, regex })
    }
}

impl Tokenizer for RegexLexer {
    fn tokenize(&self, source: &str) -> anyhow::Result<Vec<Token>> {
        let line_starts = line_starts(source);
        let mut tokens = Vec::new();

        for caps in self.regex.captures_iter(source) {
            let Some(m) = caps.name(TOKEN_GROUP) else {
                continue;
            };
            let (start_line, start_col) = position(&line_starts, m.start());
            let (end_line, end_col) = position(&line_starts, m.end() - 1);
            tokens.push(Token {
                image: m.as_str().to_string(),
                start_line,
                start_col,
                end_line,
                end_col,
            });
        }

        Ok(tokens)
    }

    fn language(&self) -> Language {
        self.language
    }
}

/// Byte offsets at which each line starts.
pub(crate) fn line_starts(source: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(source.match_indices('\n').map(|(i, _)| i + 1))
        .collect()
}

/// Convert a byte offset into a 1-indexed (line, column) pair.
pub(crate) fn position(line_starts: &[usize], offset: usize) -> (usize, usize) {
    let line_idx = match line_starts.binary_search(&offset) {
        Ok(i) => i,
        Err(i) => i - 1,
    };
    (line_idx + 1, offset - line_starts[line_idx] + 1)
}
