// Lexer for .sp mod source files.
//
// Tokenizes the HCL subset used by mod definitions: identifiers, literals,
// heredocs, structural symbols, and significant newlines.
//
// Preconditions: input is valid UTF-8.
// Postconditions: every token carries its byte range.
// Failure modes: unmatched input becomes a `LexError`; lexing continues.
// Side effects: none.

use logos::Logos;
use std::fmt;

/// Byte range of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Input that matched no token.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Tokens of one file, plus whatever could not be lexed.
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// Tokens of the HCL subset. Strings, heredocs, numbers and identifiers
/// carry their decoded values.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip r"#[^\n]*")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    // ── Keywords ──
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    // ── Symbols ──
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("=")]
    Equals,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,

    // ── Literals ──
    /// Numeric literal (int, float, exponent, negative).
    #[regex(r"-?[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", parse_number)]
    Number(f64),

    /// String literal with `\"`, `\\`, `\n`, `\t` and `\r` escapes.
    #[regex(r#""([^"\\\n]|\\.)*""#, parse_string)]
    StringLit(String),

    /// Heredoc (`<<EOQ` or indented `<<-EOQ`). The callback consumes the
    /// body up to and including the closing marker.
    #[regex(r"<<-?[A-Za-z_][A-Za-z0-9_]*\n", lex_heredoc)]
    Heredoc(String),

    // ── Identifier ──
    //
    // logos prioritises fixed `#[token]` matches over regex for the same
    // length, so `true` matches True, not Ident.
    /// Identifier: `[A-Za-z_][A-Za-z0-9_-]*`
    #[regex(r"[A-Za-z_][A-Za-z0-9_-]*", |lex| lex.slice().to_string())]
    Ident(String),

    // ── Structure ──
    /// One or more newlines; separates body items.
    #[regex(r"\n+")]
    Newline,

    /// `/* ... */`. Never emitted: the callback skips the whole comment.
    #[token("/*", skip_block_comment)]
    BlockComment,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Equals => write!(f, "="),
            Token::Colon => write!(f, ":"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::Number(v) => write!(f, "{v}"),
            Token::StringLit(s) => write!(f, "\"{s}\""),
            Token::Heredoc(_) => write!(f, "<heredoc>"),
            Token::Ident(name) => write!(f, "{name}"),
            Token::Newline => write!(f, "<newline>"),
            Token::BlockComment => write!(f, "<comment>"),
        }
    }
}

// ── Callbacks ──

fn skip_block_comment(lex: &mut logos::Lexer<'_, Token>) -> logos::FilterResult<(), ()> {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            logos::FilterResult::Skip
        }
        None => {
            // Unterminated: swallow the rest so it is one error, not many.
            lex.bump(lex.remainder().len());
            logos::FilterResult::Error(())
        }
    }
}

fn parse_number(lex: &mut logos::Lexer<'_, Token>) -> Option<f64> {
    lex.slice().parse().ok()
}

fn parse_string(lex: &mut logos::Lexer<'_, Token>) -> Option<String> {
    let slice = lex.slice();
    let inner = &slice[1..slice.len() - 1]; // strip quotes
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next()? {
                '"' => result.push('"'),
                '\\' => result.push('\\'),
                'n' => result.push('\n'),
                't' => result.push('\t'),
                'r' => result.push('\r'),
                _ => return None,
            }
        } else {
            result.push(c);
        }
    }
    Some(result)
}

fn lex_heredoc(lex: &mut logos::Lexer<'_, Token>) -> Option<String> {
    let opener = lex.slice().trim_end();
    let indented = opener.starts_with("<<-");
    let marker = opener.trim_start_matches("<<-").trim_start_matches("<<");

    let rest = lex.remainder();
    let mut consumed = 0;
    let mut lines: Vec<&str> = Vec::new();
    for line in rest.split_inclusive('\n') {
        let content = line.trim_end_matches(|c| c == '\n' || c == '\r');
        if content.trim() == marker {
            // Leave the newline after the closing marker for the Newline token.
            lex.bump(consumed + content.len());
            return Some(heredoc_body(&lines, indented));
        }
        lines.push(content);
        consumed += line.len();
    }
    // Unterminated heredoc.
    None
}

fn heredoc_body(lines: &[&str], indented: bool) -> String {
    let strip = if indented {
        lines
            .iter()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.len() - l.trim_start().len())
            .min()
            .unwrap_or(0)
    } else {
        0
    };
    let mut body = String::new();
    for line in lines {
        let cut = strip.min(line.len() - line.trim_start().len());
        body.push_str(&line[cut..]);
        body.push('\n');
    }
    body
}

// ── Public API ──

/// Tokenize one source file. Bad input is recorded in `errors` and skipped,
/// so the parser always sees the rest of the file.
pub fn lex(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unexpected input: {:?}", &source[span.start..span.end]),
            }),
        }
    }

    LexResult { tokens, errors }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_ok(source: &str) -> Vec<Token> {
        let result = lex(source);
        assert!(
            result.errors.is_empty(),
            "unexpected lex errors: {:?}",
            result.errors
        );
        result.tokens.into_iter().map(|(t, _)| t).collect()
    }

    fn lex_all(source: &str) -> (Vec<Token>, Vec<LexError>) {
        let result = lex(source);
        let tokens = result.tokens.into_iter().map(|(t, _)| t).collect();
        (tokens, result.errors)
    }

    fn ident(name: &str) -> Token {
        Token::Ident(name.to_string())
    }

    // ── Keywords ──

    #[test]
    fn keywords() {
        let tokens = lex_ok("true false null");
        assert_eq!(tokens, vec![Token::True, Token::False, Token::Null]);
    }

    #[test]
    fn keyword_vs_ident() {
        // `truthy` is an identifier, not keyword `true` + `hy`
        let tokens = lex_ok("true truthy");
        assert_eq!(tokens, vec![Token::True, ident("truthy")]);
    }

    // ── Symbols ──

    #[test]
    fn symbols() {
        let tokens = lex_ok("{ } [ ] ( ) = : , .");
        assert_eq!(
            tokens,
            vec![
                Token::LBrace,
                Token::RBrace,
                Token::LBracket,
                Token::RBracket,
                Token::LParen,
                Token::RParen,
                Token::Equals,
                Token::Colon,
                Token::Comma,
                Token::Dot,
            ]
        );
    }

    // ── Number literals ──

    #[test]
    fn number_integer() {
        assert_eq!(lex_ok("42"), vec![Token::Number(42.0)]);
    }

    #[test]
    fn number_float_and_negative() {
        assert_eq!(lex_ok("-1.5"), vec![Token::Number(-1.5)]);
    }

    #[test]
    fn number_exponent() {
        assert_eq!(lex_ok("1e-3"), vec![Token::Number(0.001)]);
    }

    // ── String literals ──

    #[test]
    fn string_simple() {
        assert_eq!(lex_ok(r#""hello""#), vec![Token::StringLit("hello".into())]);
    }

    #[test]
    fn string_escapes() {
        let tokens = lex_ok(r#""say \"hi\"\n""#);
        assert_eq!(tokens, vec![Token::StringLit("say \"hi\"\n".into())]);
    }

    #[test]
    fn string_unknown_escape_is_error() {
        let (_, errors) = lex_all(r#""bad \q""#);
        assert!(!errors.is_empty());
    }

    // ── Heredocs ──

    #[test]
    fn heredoc_plain() {
        let tokens = lex_ok("sql = <<EOQ\nselect 1\nEOQ\n");
        assert_eq!(
            tokens,
            vec![
                ident("sql"),
                Token::Equals,
                Token::Heredoc("select 1\n".into()),
                Token::Newline,
            ]
        );
    }

    #[test]
    fn heredoc_indented_strips_common_indent() {
        let tokens = lex_ok("sql = <<-EOQ\n    select *\n      from t\n  EOQ");
        assert_eq!(
            tokens,
            vec![
                ident("sql"),
                Token::Equals,
                Token::Heredoc("select *\n  from t\n".into()),
            ]
        );
    }

    #[test]
    fn heredoc_unterminated_is_error() {
        let (_, errors) = lex_all("sql = <<EOQ\nselect 1\n");
        assert!(!errors.is_empty());
    }

    // ── Identifiers ──

    #[test]
    fn identifiers_allow_dashes() {
        let tokens = lex_ok("foo _bar baz-123");
        assert_eq!(tokens, vec![ident("foo"), ident("_bar"), ident("baz-123")]);
    }

    // ── Newlines and comments ──

    #[test]
    fn multiple_newlines_collapsed() {
        assert_eq!(
            lex_ok("a\n\n\nb"),
            vec![ident("a"), Token::Newline, ident("b")]
        );
    }

    #[test]
    fn comments_skipped() {
        let tokens = lex_ok("a # hash\nb // slashes\n/* block\ncomment */ c");
        assert_eq!(
            tokens,
            vec![
                ident("a"),
                Token::Newline,
                ident("b"),
                Token::Newline,
                ident("c")
            ]
        );
    }

    #[test]
    fn block_comment_between_tokens() {
        let tokens = lex_ok("a /* one */ b /** two **/ c");
        assert_eq!(tokens, vec![ident("a"), ident("b"), ident("c")]);
    }

    #[test]
    fn unterminated_block_comment_is_one_error() {
        let (tokens, errors) = lex_all("a /* never closed\nb");
        assert_eq!(tokens, vec![ident("a")]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].span.start, 2);
    }

    // ── Spans ──

    #[test]
    fn spans_correct() {
        let result = lex("query q1");
        assert!(result.errors.is_empty());
        assert_eq!(result.tokens[0].1, Span { start: 0, end: 5 });
        assert_eq!(result.tokens[1].1, Span { start: 6, end: 8 });
    }

    // ── Traversal ──

    #[test]
    fn traversal_tokens() {
        let tokens = lex_ok(r#"local.tags["env"]"#);
        assert_eq!(
            tokens,
            vec![
                ident("local"),
                Token::Dot,
                ident("tags"),
                Token::LBracket,
                Token::StringLit("env".into()),
                Token::RBracket,
            ]
        );
    }

    // ── Error recovery ──

    #[test]
    fn error_recovery() {
        let (tokens, errors) = lex_all("foo ~ bar");
        assert_eq!(tokens, vec![ident("foo"), ident("bar")]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].span, Span { start: 4, end: 5 });
    }
}
