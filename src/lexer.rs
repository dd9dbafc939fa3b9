//! Source text → token stream.
//!
//! Tokens, precedence, and the comment/newline handling follow `spec.md`
//! §4.1. String literals are tokenized as a single raw span; splitting them
//! into literal chunks and `$var`/`${expr}` interpolations is the parser's
//! job (`parser.rs::parse_string_literal`), since an embedded `${expr}` can
//! itself contain arbitrary expressions and needs the full expression
//! grammar, not just a lexer rule.

use std::collections::VecDeque;

use logos::Logos;

use crate::error::{Err, Location};

fn string_body<'s>(lex: &mut logos::Lexer<'s, Token<'s>>) -> &'s str {
    let s = lex.slice();
    &s[1..s.len() - 1]
}

fn ident<'s>(lex: &mut logos::Lexer<'s, Token<'s>>) -> &'s str {
    lex.slice()
}

fn integer<'s>(lex: &mut logos::Lexer<'s, Token<'s>>) -> Option<i64> {
    lex.slice().parse().ok()
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Logos)]
#[logos(skip(r"[ \t]+"))]
#[logos(error(LexError))]
pub enum Token<'s> {
    #[regex(r"\r?\n")]
    Newline,

    #[regex(r"#[^\n]*", |lex| lex.slice())]
    Comment(&'s str),

    #[token("if", priority = 10)]
    If,
    #[token("else", priority = 10)]
    Else,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", ident)]
    Identifier(&'s str),

    #[regex(r"[0-9]+", integer)]
    Integer(i64),

    #[regex(r#""(?:\\.|[^"\\])*""#, string_body)]
    String(&'s str),

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
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,

    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("=")]
    Eq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
}

impl<'s> Token<'s> {
    pub fn describe(&self) -> String {
        format!("{self:?}")
    }
}

/// A lightweight error the `Logos` derive can construct with `Default`;
/// converted into the crate-wide [`Err`] once the lexer knows the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LexError {
    #[default]
    UnrecognizedToken,
}

pub struct Lexer<'s> {
    source: &'s str,
    inner: logos::Lexer<'s, Token<'s>>,
    buffer: VecDeque<(Token<'s>, Location, usize)>,
    at_eof: bool,
    /// `(line, col)` of the last token actually consumed via `next`, and the
    /// byte offset right after it; used as the EOF location and as the
    /// starting point for computing the next token's line/column.
    last_end: (Location, usize),
}

impl<'s> Lexer<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            inner: Token::lexer(source),
            buffer: VecDeque::new(),
            at_eof: false,
            last_end: (Location::new(1, 1), 0),
        }
    }

    fn location_at(&self, byte_offset: usize) -> Location {
        let prefix = &self.source[..byte_offset];
        let line = 1 + prefix.bytes().filter(|&b| b == b'\n').count();
        let col = match prefix.rfind('\n') {
            Some(idx) => byte_offset - idx,
            None => byte_offset + 1,
        };
        Location::new(line, col)
    }

    /// 1-based `(line, column)` of the token about to be returned by `next`.
    pub fn location(&mut self) -> Location {
        match self.peek_nth(0) {
            Ok(Some(_)) => self.buffer[0].1,
            _ => self.last_end.0,
        }
    }

    pub fn peek(&mut self) -> Result<Option<Token<'s>>, Err> {
        self.peek_nth(0)
    }

    /// Peek `n` tokens ahead (0 = the next token), filling the lookahead
    /// buffer as needed. Used by the parser to disambiguate assignment from
    /// call statements without backtracking.
    pub fn peek_nth(&mut self, n: usize) -> Result<Option<Token<'s>>, Err> {
        while self.buffer.len() <= n {
            match self.advance()? {
                Some(entry) => self.buffer.push_back(entry),
                None => return Ok(None),
            }
        }
        Ok(Some(self.buffer[n].0))
    }

    pub fn next(&mut self) -> Result<Option<Token<'s>>, Err> {
        if let Some((tok, loc, end)) = self.buffer.pop_front() {
            self.last_end = (loc, end);
            return Ok(Some(tok));
        }
        match self.advance()? {
            Some((tok, loc, end)) => {
                self.last_end = (loc, end);
                Ok(Some(tok))
            }
            None => Ok(None),
        }
    }

    fn advance(&mut self) -> Result<Option<(Token<'s>, Location, usize)>, Err> {
        if self.at_eof {
            return Ok(None);
        }
        match self.inner.next() {
            None => {
                self.at_eof = true;
                self.last_end = (self.location_at(self.source.len()), self.source.len());
                Ok(None)
            }
            Some(Ok(tok)) => {
                let span = self.inner.span();
                Ok(Some((tok, self.location_at(span.start), span.end)))
            }
            Some(Err(_)) => {
                let span = self.inner.span();
                Err(Err::syntax(format!(
                    "unrecognized token `{}`",
                    self.inner.slice()
                ))
                .at(self.location_at(span.start)))
            }
        }
    }

    pub fn expect(&mut self, expected: Token<'s>) -> Result<(), Err> {
        let loc = self.location();
        match self.next()? {
            Some(tok) if tok == expected => Ok(()),
            Some(tok) => {
                Err(Err::syntax(format!("expected {:?}, found {:?}", expected, tok)).at(loc))
            }
            None => Err(Err::syntax(format!("expected {expected:?}, found end of file")).at(loc)),
        }
    }

    pub fn unexpected<T>(&mut self) -> Result<T, Err> {
        let loc = self.location();
        match self.next()? {
            Some(tok) => Err(Err::syntax(format!("unexpected token {tok:?}")).at(loc)),
            None => Err(Err::syntax("unexpected end of file").at(loc)),
        }
    }

    /// Skip over blank and comment-only lines, returning the comment text of
    /// the last comment line seen (candidate doc comment for whatever
    /// declaration follows), if any.
    pub fn skip_newlines_collecting_doc(&mut self) -> Result<Option<&'s str>, Err> {
        let mut doc = None;
        loop {
            match self.peek()? {
                Some(Token::Newline) => {
                    self.next()?;
                }
                Some(Token::Comment(text)) => {
                    self.next()?;
                    doc = Some(text.trim_start_matches('#').trim());
                }
                _ => break,
            }
        }
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(src: &str) -> Vec<Token<'_>> {
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        while let Some(tok) = lexer.next().unwrap() {
            out.push(tok);
        }
        out
    }

    #[test]
    fn tokenizes_assignment() {
        let toks = collect("a = 1\n");
        assert_eq!(
            toks,
            vec![
                Token::Identifier("a"),
                Token::Eq,
                Token::Integer(1),
                Token::Newline,
            ]
        );
    }

    #[test]
    fn distinguishes_eq_and_eqeq() {
        let toks = collect("a == b");
        assert_eq!(
            toks,
            vec![Token::Identifier("a"), Token::EqEq, Token::Identifier("b")]
        );
    }

    #[test]
    fn keywords_are_not_identifiers() {
        let toks = collect("if (x) { } else { }");
        assert_eq!(toks[0], Token::If);
        assert!(toks.contains(&Token::Else));
    }

    #[test]
    fn string_body_excludes_quotes() {
        let toks = collect(r#""hello $name""#);
        assert_eq!(toks, vec![Token::String("hello $name")]);
    }

    #[test]
    fn tracks_line_and_column() {
        let mut lexer = Lexer::new("a = 1\nb = 2\n");
        lexer.next().unwrap();
        lexer.next().unwrap();
        lexer.next().unwrap();
        lexer.next().unwrap(); // Newline
        let loc = lexer.location();
        assert_eq!(loc.line, 2);
        assert_eq!(loc.column, 1);
    }
}
