// Parser for .sp mod source files.
//
// Parses a token stream (from the lexer) into a list of top-level blocks.
// Uses chumsky combinators. Expressions cover literals, tuples, objects,
// function calls and traversals; there are no operators.
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns blocks plus any parse errors (non-fatal).
// Failure modes: syntax errors produce `Rich` diagnostics; parsing continues.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::*;
use crate::lexer::Token;

/// Result of parsing one file: blocks plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub blocks: Option<Vec<Block>>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Result of parsing a standalone expression.
#[derive(Debug)]
pub struct ExprParseResult {
    pub expr: Option<Expr>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse a mod source file. Lexes then parses.
///
/// Every block (nested ones included) is tagged with `file`.
pub fn parse(source: &str, file: FileId) -> ParseResult {
    let (stream_tokens, mut errors) = lex_to_chumsky(source);
    let len = source.len();
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(stream_tokens).map(eoi, |(t, s): (_, _)| (t, s));

    let (blocks, parse_errors) = file_parser(file).parse(stream).into_output_errors();
    errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult { blocks, errors }
}

/// Parse a single expression, e.g. the value half of `--var name=value`.
pub fn parse_expression(source: &str) -> ExprParseResult {
    let (stream_tokens, mut errors) = lex_to_chumsky(source);
    let len = source.len();
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(stream_tokens).map(eoi, |(t, s): (_, _)| (t, s));

    let nl = just(Token::Newline).repeated();
    let parser = nl
        .clone()
        .ignore_then(expr_parser())
        .then_ignore(nl)
        .then_ignore(end());
    let (expr, parse_errors) = parser.parse(stream).into_output_errors();
    errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ExprParseResult { expr, errors }
}

type SpannedTokens = Vec<(Token, SimpleSpan)>;

fn lex_to_chumsky(source: &str) -> (SpannedTokens, Vec<Rich<'static, Token, SimpleSpan>>) {
    let lex_result = crate::lexer::lex(source);
    let tokens = lex_result
        .tokens
        .into_iter()
        .map(|(tok, span)| {
            let cspan: SimpleSpan = (span.start..span.end).into();
            (tok, cspan)
        })
        .collect();
    let errors = lex_result
        .errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect();
    (tokens, errors)
}

// ── Expressions ──

fn expr_parser<'tokens, I>(
) -> impl Parser<'tokens, I, Expr, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    recursive(|expr| {
        let nl = just(Token::Newline).repeated().ignored();

        let ident = select! {
            Token::Ident(name) = e => Ident { name, span: e.span() },
        };

        // ── Literals ──

        let literal = select! {
            Token::True => ExprKind::Bool(true),
            Token::False => ExprKind::Bool(false),
            Token::Null => ExprKind::Null,
            Token::Number(n) => ExprKind::Number(n),
            Token::StringLit(s) => ExprKind::String(s),
            Token::Heredoc(s) => ExprKind::String(s),
        }
        .map_with(|kind, e| Expr {
            kind,
            span: e.span(),
        });

        // ── Tuple: '[' (expr (',' expr)* ','?)? ']' ──

        let tuple = expr
            .clone()
            .padded_by(nl.clone())
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .then_ignore(nl.clone())
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
            .map_with(|items, e| Expr {
                kind: ExprKind::Tuple(items),
                span: e.span(),
            });

        // ── Object: '{' (key ('='|':') expr) separated by ',' or newlines '}' ──

        let object_key = select! {
            Token::Ident(key) = e => (key, e.span()),
            Token::StringLit(key) = e => (key, e.span()),
        };

        let object_item = object_key
            .then_ignore(just(Token::Equals).or(just(Token::Colon)))
            .then(expr.clone())
            .map(|((key, key_span), value)| ObjectItem {
                key,
                key_span,
                value,
            });

        let item_sep = just(Token::Comma)
            .then_ignore(nl.clone())
            .ignored()
            .or(just(Token::Newline).repeated().at_least(1).ignored());

        let object = nl
            .clone()
            .ignore_then(
                object_item
                    .separated_by(item_sep)
                    .allow_trailing()
                    .collect::<Vec<_>>(),
            )
            .then_ignore(nl.clone())
            .delimited_by(just(Token::LBrace), just(Token::RBrace))
            .map_with(|items, e| Expr {
                kind: ExprKind::Object(items),
                span: e.span(),
            });

        // ── Function call: IDENT '(' args ')' ──

        let call = ident
            .clone()
            .then(
                expr.clone()
                    .padded_by(nl.clone())
                    .separated_by(just(Token::Comma))
                    .allow_trailing()
                    .collect::<Vec<_>>()
                    .then_ignore(nl.clone())
                    .delimited_by(just(Token::LParen), just(Token::RParen)),
            )
            .map_with(|(name, args), e| Expr {
                kind: ExprKind::Call(Call { name, args }),
                span: e.span(),
            });

        // ── Traversal: IDENT ('.' IDENT | '[' expr ']')* ──

        let step = just(Token::Dot)
            .ignore_then(ident.clone())
            .map(Step::Attr)
            .or(expr
                .clone()
                .padded_by(nl.clone())
                .delimited_by(just(Token::LBracket), just(Token::RBracket))
                .map(|index| Step::Index(Box::new(index))));

        let traversal = ident
            .then(step.repeated().collect::<Vec<_>>())
            .map_with(|(root, steps), e| Expr {
                kind: ExprKind::Traversal(Traversal { root, steps }),
                span: e.span(),
            });

        // ── Parenthesised ──

        let paren = expr
            .padded_by(nl)
            .delimited_by(just(Token::LParen), just(Token::RParen));

        choice((literal, tuple, object, call, traversal, paren))
    })
}

// ── Blocks ──
//
// Attributes and blocks both start with an identifier; an attribute is
// tried first and the parser backtracks to a block when no `=` follows.

fn file_parser<'tokens, I>(
    file: FileId,
) -> impl Parser<'tokens, I, Vec<Block>, extra::Err<Rich<'tokens, Token, SimpleSpan>>>
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let nl = just(Token::Newline).repeated().ignored();

    let ident = select! {
        Token::Ident(name) = e => Ident { name, span: e.span() },
    };

    let label = select! {
        Token::StringLit(value) = e => Label { value, span: e.span() },
        Token::Ident(value) = e => Label { value, span: e.span() },
    };

    let attribute = ident
        .clone()
        .then_ignore(just(Token::Equals))
        .then(expr_parser())
        .map_with(|(name, expr), e| BodyItem::Attribute(Attribute {
            name,
            expr,
            span: e.span(),
        }));

    let block = recursive(move |block| {
        let nl = just(Token::Newline).repeated().ignored();
        let item = attribute.or(block.map(BodyItem::Block));

        let body = nl
            .clone()
            .ignore_then(
                item.separated_by(just(Token::Newline).repeated().at_least(1))
                    .allow_trailing()
                    .collect::<Vec<_>>(),
            )
            .then_ignore(nl)
            .delimited_by(just(Token::LBrace), just(Token::RBrace))
            .map_with(|items, e| body_from_items(items, e.span()));

        ident
            .then(label.repeated().collect::<Vec<_>>())
            .then(body)
            .map_with(move |((block_type, labels), body), e| Block {
                block_type,
                labels,
                body,
                range: SourceRange::new(file, e.span()),
            })
    });

    nl.clone()
        .ignore_then(
            block
                .separated_by(just(Token::Newline).repeated().at_least(1))
                .allow_trailing()
                .collect::<Vec<_>>(),
        )
        .then_ignore(nl)
}

#[derive(Debug, Clone)]
enum BodyItem {
    Attribute(Attribute),
    Block(Block),
}

fn body_from_items(items: Vec<BodyItem>, span: Span) -> Body {
    let mut attributes = Vec::new();
    let mut blocks = Vec::new();
    for item in items {
        match item {
            BodyItem::Attribute(a) => attributes.push(a),
            BodyItem::Block(b) => blocks.push(b),
        }
    }
    Body {
        attributes,
        blocks,
        span,
    }
}

// ── Tests ──
