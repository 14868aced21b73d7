//! Reader: lexer and parser for submission source text.
//!
//! Turns source text into the statement list consumed by the compiler, or a
//! non-empty diagnostic set. The parser recovers at statement boundaries so
//! one submission can report multiple diagnostics.

pub mod lexer;
pub mod parser;
pub mod token;

pub use lexer::Lexer;
pub use parser::Parser;
pub use token::{SourceLoc, Token, TokenWithLoc};

use crate::compiler::ast::Stmt;
use crate::error::Diagnostic;

/// Lex and parse a submission into its statement list.
pub fn parse_source(source: &str) -> Result<Vec<Stmt>, Vec<Diagnostic>> {
    let tokens = Lexer::new(source).tokenize().map_err(|d| vec![d])?;
    Parser::new(tokens).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source_ok() {
        let stmts = parse_source("let x = 1; x + 1").unwrap();
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn test_parse_source_empty() {
        assert!(parse_source("").unwrap().is_empty());
        assert!(parse_source("  // nothing\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_source_lex_error() {
        let diags = parse_source("let $ = 1;").unwrap_err();
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("unexpected character"));
    }
}
