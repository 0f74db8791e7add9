//! Analyzer language identifiers.
//!
//! Batch requests name languages as strings. Every key must resolve to one
//! of the identifiers below before any analysis starts.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Error;

/// A language the analyzers know how to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    C,
    Cpp,
    Go,
    Html,
    Java,
    JavaScript,
    Python,
    Rust,
    Scala,
    Swift,
    TypeScript,
    Xml,
}

/// Comment delimiters used by the fallback lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentSyntax {
    pub line: Option<&'static str>,
    pub block: Option<(&'static str, &'static str)>,
}

const C_STYLE: CommentSyntax = CommentSyntax {
    line: Some("//"),
    block: Some(("/*", "*/")),
};

const HASH_STYLE: CommentSyntax = CommentSyntax {
    line: Some("#"),
    block: None,
};

const MARKUP_STYLE: CommentSyntax = CommentSyntax {
    line: None,
    block: Some(("<!--", "-->")),
};

/// Map from file extension (without dot) to language.
static EXTENSION_TO_LANGUAGE: phf::Map<&'static str, Language> = phf::phf_map! {
    "c" => Language::C,
    "h" => Language::C,
    "cpp" => Language::Cpp,
    "cc" => Language::Cpp,
    "cxx" => Language::Cpp,
    "hpp" => Language::Cpp,
    "hh" => Language::Cpp,
    "go" => Language::Go,
    "html" => Language::Html,
    "htm" => Language::Html,
    "xhtml" => Language::Html,
    "java" => Language::Java,
    "js" => Language::JavaScript,
    "mjs" => Language::JavaScript,
    "cjs" => Language::JavaScript,
    "jsx" => Language::JavaScript,
    "py" => Language::Python,
    "rs" => Language::Rust,
    "scala" => Language::Scala,
    "sc" => Language::Scala,
    "swift" => Language::Swift,
    "ts" => Language::TypeScript,
    "mts" => Language::TypeScript,
    "cts" => Language::TypeScript,
    "xml" => Language::Xml,
};

impl Language {
    /// All languages, in identifier order.
    pub const ALL: [Language; 12] = [
        Language::C,
        Language::Cpp,
        Language::Go,
        Language::Html,
        Language::Java,
        Language::JavaScript,
        Language::Python,
        Language::Rust,
        Language::Scala,
        Language::Swift,
        Language::TypeScript,
        Language::Xml,
    ];

    /// Canonical identifier used in requests, rule-sets and results.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Go => "go",
            Language::Html => "html",
            Language::Java => "java",
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::Rust => "rust",
            Language::Scala => "scala",
            Language::Swift => "swift",
            Language::TypeScript => "typescript",
            Language::Xml => "xml",
        }
    }

    /// Resolve an identifier. `ecmascript` is accepted as an alias for
    /// `javascript`.
    pub fn from_id(id: &str) -> Option<Self> {
        if id == "ecmascript" {
            return Some(Language::JavaScript);
        }
        Self::ALL.iter().copied().find(|l| l.as_str() == id)
    }

    /// Resolve an identifier, failing with a structural error that names
    /// the offending string.
    pub fn resolve(id: &str) -> Result<Self, Error> {
        Self::from_id(id).ok_or_else(|| Error::UnknownLanguage {
            language: id.to_string(),
            supported: Self::supported_ids(),
        })
    }

    /// Comma separated list of accepted identifiers.
    pub fn supported_ids() -> String {
        Self::ALL
            .iter()
            .map(|l| l.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Determine the language of a file from its extension.
    pub fn for_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        EXTENSION_TO_LANGUAGE.get(ext.as_str()).copied()
    }

    pub fn comment_syntax(&self) -> CommentSyntax {
        match self {
            Language::Python => HASH_STYLE,
            Language::Html | Language::Xml => MARKUP_STYLE,
            _ => C_STYLE,
        }
    }

    /// Whether a tree-sitter grammar is compiled in for this language.
    pub fn has_grammar(&self) -> bool {
        self.grammar().is_some()
    }

    /// The tree-sitter grammar for this language, if one is available.
    #[cfg(feature = "tree-sitter")]
    pub fn grammar(&self) -> Option<tree_sitter::Language> {
        let grammar = match self {
            Language::C => tree_sitter_c::LANGUAGE.into(),
            Language::Cpp => tree_sitter_cpp::LANGUAGE.into(),
            Language::Go => tree_sitter_go::LANGUAGE.into(),
            Language::Java => tree_sitter_java::LANGUAGE.into(),
            Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Language::Python => tree_sitter_python::LANGUAGE.into(),
            Language::Rust => tree_sitter_rust::LANGUAGE.into(),
            Language::Scala => tree_sitter_scala::LANGUAGE.into(),
            Language::Swift => tree_sitter_swift::LANGUAGE.into(),
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Language::Html | Language::Xml => return None,
        };
        Some(grammar)
    }

    /// No grammars without the `tree-sitter` feature.
    #[cfg(not(feature = "tree-sitter"))]
    pub fn grammar(&self) -> Option<()> {
        None
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_id_round_trips() {
        for lang in Language::ALL {
            assert_eq!(Language::from_id(lang.as_str()), Some(lang));
        }
    }

    #[test]
    fn test_ecmascript_alias() {
        assert_eq!(Language::from_id("ecmascript"), Some(Language::JavaScript));
    }

    #[test]
    fn test_unknown_language_is_structural_error() {
        let err = Language::resolve("Java").unwrap_err();
        assert!(err.to_string().contains("\"Java\""));
        assert!(matches!(err, crate::error::Error::UnknownLanguage { .. }));
    }

    #[test]
    fn test_for_path() {
        assert_eq!(Language::for_path(Path::new("/a/B.java")), Some(Language::Java));
        assert_eq!(Language::for_path(Path::new("index.HTML")), Some(Language::Html));
        assert_eq!(Language::for_path(Path::new("README.md")), None);
        assert_eq!(Language::for_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_serde_uses_ids() {
        let json = serde_json::to_string(&Language::JavaScript).unwrap();
        assert_eq!(json, "\"javascript\"");
    }

    #[test]
    #[cfg(feature = "tree-sitter")]
    fn test_markup_languages_have_no_grammar() {
        assert!(!Language::Xml.has_grammar());
        assert!(Language::Java.has_grammar());
    }
}
