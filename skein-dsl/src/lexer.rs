//! Token definitions for the pipeline DSL.
//!
//! The DSL is line-oriented: newlines terminate statements, so they are
//! real tokens rather than trivia. `#` comments run to end of line.

use logos::Logos;
use skein_core::error::Diagnostic;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r]+")]
pub enum TokenKind {
    #[token("\n")]
    Newline,

    #[regex(r"#[^\n]*", allow_greedy = true)]
    Comment,

    // ── Keywords ──
    #[token("in")]
    KwIn,
    #[token("let")]
    KwLet,
    #[token("out")]
    KwOut,
    #[token("true")]
    KwTrue,
    #[token("false")]
    KwFalse,

    // ── Literals and identifiers ──
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,
    #[regex(r"[0-9]+\.[0-9]+")]
    FloatLit,
    #[regex(r"[0-9]+")]
    IntLit,
    #[regex(r#""([^"\\\n]|\\.)*""#)]
    StringLit,

    // ── Punctuation ──
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    // ── Operators (longest first where prefixes overlap) ──
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("=")]
    Assign,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("|")]
    Pipe,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("!")]
    Bang,
}

/// A token with its source text and 1-based position.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
    pub column: u32,
}

/// Lex `source` into tokens, dropping comments. Lex errors are collected
/// as diagnostics (code `E001`) rather than aborting, so the parser can
/// still report everything it finds on other lines.
pub fn lex(source: &str) -> (Vec<Token>, Vec<Diagnostic>) {
    let line_starts = line_starts(source);
    let mut tokens = Vec::new();
    let mut diagnostics = Vec::new();

    let mut lexer = TokenKind::lexer(source);
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let (line, column) = position(&line_starts, span.start);
        match result {
            Ok(TokenKind::Comment) => {}
            Ok(kind) => tokens.push(Token {
                kind,
                text: lexer.slice().to_string(),
                line,
                column,
            }),
            Err(()) => diagnostics.push(Diagnostic::new(
                line,
                column,
                "E001",
                format!("unexpected character `{}`", lexer.slice()),
            )),
        }
    }

    (tokens, diagnostics)
}

fn line_starts(source: &str) -> Vec<usize> {
    let mut starts = vec![0];
    for (i, b) in source.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

fn position(line_starts: &[usize], offset: usize) -> (u32, u32) {
    let line_idx = match line_starts.binary_search(&offset) {
        Ok(i) => i,
        Err(i) => i - 1,
    };
    let column = offset - line_starts[line_idx];
    (line_idx as u32 + 1, column as u32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, diags) = lex(source);
        assert!(diags.is_empty(), "unexpected lex errors: {diags:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_declaration_tokens() {
        assert_eq!(
            kinds("in x: Int"),
            vec![
                TokenKind::KwIn,
                TokenKind::Ident,
                TokenKind::Colon,
                TokenKind::Ident
            ]
        );
    }

    #[test]
    fn test_newlines_are_tokens() {
        assert_eq!(
            kinds("out x\nout y"),
            vec![
                TokenKind::KwOut,
                TokenKind::Ident,
                TokenKind::Newline,
                TokenKind::KwOut,
                TokenKind::Ident
            ]
        );
    }

    #[test]
    fn test_comments_dropped() {
        assert_eq!(
            kinds("# header\nin x: Int # trailing"),
            vec![
                TokenKind::Newline,
                TokenKind::KwIn,
                TokenKind::Ident,
                TokenKind::Colon,
                TokenKind::Ident
            ]
        );
    }

    #[test]
    fn test_operator_maximal_munch() {
        assert_eq!(
            kinds("a <= b == c"),
            vec![
                TokenKind::Ident,
                TokenKind::Le,
                TokenKind::Ident,
                TokenKind::EqEq,
                TokenKind::Ident
            ]
        );
        assert_eq!(
            kinds("a = b < c"),
            vec![
                TokenKind::Ident,
                TokenKind::Assign,
                TokenKind::Ident,
                TokenKind::Lt,
                TokenKind::Ident
            ]
        );
    }

    #[test]
    fn test_record_type_tokens() {
        assert_eq!(
            kinds("in u: {age: Int}"),
            vec![
                TokenKind::KwIn,
                TokenKind::Ident,
                TokenKind::Colon,
                TokenKind::LBrace,
                TokenKind::Ident,
                TokenKind::Colon,
                TokenKind::Ident,
                TokenKind::RBrace
            ]
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            kinds(r#"1 2.5 true false "hi""#),
            vec![
                TokenKind::IntLit,
                TokenKind::FloatLit,
                TokenKind::KwTrue,
                TokenKind::KwFalse,
                TokenKind::StringLit
            ]
        );
    }

    #[test]
    fn test_positions_are_one_based() {
        let (tokens, _) = lex("in x: Int\nout x");
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (1, 4));
        let out = tokens.iter().find(|t| t.kind == TokenKind::KwOut).unwrap();
        assert_eq!((out.line, out.column), (2, 1));
    }

    #[test]
    fn test_lex_error_reported_with_position() {
        let (_, diags) = lex("in x: Int\nout @");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "E001");
        assert_eq!(diags[0].line, 2);
    }
}
