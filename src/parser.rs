//! Tokens → AST (`spec.md` §4.1).
//!
//! A recursive-descent, operator-precedence parser in the shape of
//! `n2o5`'s ninja parser (`cli/src/ninja/parser.rs`): one function per
//! grammar rule, each threading a `&mut Lexer` and returning
//! `Result<_, Err>`, erroring out on the first malformed construct rather
//! than attempting recovery (`spec.md` §4.1 "Errors").

use smol_str::SmolStr;

use crate::ast::{Accessor, AssignOp, BinaryOp, Block, Expr, Program, Spanned, Stmt, StringChunk, UnaryOp};
use crate::error::{Err, Span};
use crate::lexer::{Lexer, Token};

pub fn parse_program(source: &str) -> Result<Program, Err> {
    let mut parser = Parser {
        lexer: Lexer::new(source),
    };
    parser.parse_program()
}

/// Parse a single expression out of a standalone snippet, used to evaluate
/// a `${expr}` interpolation embedded in a string literal.
pub(crate) fn parse_expr_snippet(source: &str) -> Result<Spanned<Expr>, Err> {
    let mut parser = Parser {
        lexer: Lexer::new(source),
    };
    parser.skip_statement_breaks()?;
    let expr = parser.parse_expr()?;
    Ok(expr)
}

struct Parser<'s> {
    lexer: Lexer<'s>,
}

impl<'s> Parser<'s> {
    fn parse_program(&mut self) -> Result<Program, Err> {
        let mut statements = Vec::new();
        self.skip_statement_breaks()?;
        while self.lexer.peek()?.is_some() {
            statements.push(self.parse_statement()?);
            self.skip_statement_breaks()?;
        }
        Ok(Program { statements })
    }

    fn skip_statement_breaks(&mut self) -> Result<(), Err> {
        self.lexer.skip_newlines_collecting_doc()?;
        Ok(())
    }

    fn parse_block(&mut self) -> Result<Block, Err> {
        self.lexer.expect(Token::LBrace)?;
        let mut statements = Vec::new();
        self.skip_statement_breaks()?;
        while !matches!(self.lexer.peek()?, Some(Token::RBrace) | None) {
            statements.push(self.parse_statement()?);
            self.skip_statement_breaks()?;
        }
        self.lexer.expect(Token::RBrace)?;
        Ok(Block { statements })
    }

    fn parse_statement(&mut self) -> Result<Spanned<Stmt>, Err> {
        let start = self.lexer.location();
        match self.lexer.peek()? {
            Some(Token::If) => self.parse_if(start),
            Some(Token::Identifier(name)) => {
                let name = SmolStr::new(name);
                match self.lexer.peek_nth(1)? {
                    Some(Token::LParen) if name == "foreach" => self.parse_foreach(start),
                    Some(Token::LParen) => {
                        let expr = self.parse_expr()?;
                        let end = expr.span.end;
                        Ok(Spanned::new(Stmt::Expr(expr), Span::new(start, end)))
                    }
                    Some(Token::Eq) | Some(Token::PlusEq) | Some(Token::MinusEq) => {
                        self.parse_assignment(start, name)
                    }
                    _ => {
                        let expr = self.parse_expr()?;
                        let end = expr.span.end;
                        Ok(Spanned::new(Stmt::Expr(expr), Span::new(start, end)))
                    }
                }
            }
            _ => self.lexer.unexpected(),
        }
    }

    fn parse_assignment(&mut self, start: crate::error::Location, name: SmolStr) -> Result<Spanned<Stmt>, Err> {
        self.lexer.next()?; // identifier
        let op_tok = self.lexer.next()?.unwrap();
        let op = match op_tok {
            Token::Eq => AssignOp::Set,
            Token::PlusEq => AssignOp::Add,
            Token::MinusEq => AssignOp::Sub,
            _ => unreachable!("guarded by caller"),
        };
        let value = self.parse_expr()?;
        let end = value.span.end;
        Ok(Spanned::new(
            Stmt::Assign {
                target: name,
                target_location: start,
                op,
                value,
            },
            Span::new(start, end),
        ))
    }

    fn parse_foreach(&mut self, start: crate::error::Location) -> Result<Spanned<Stmt>, Err> {
        self.lexer.next()?; // `foreach`
        self.lexer.expect(Token::LParen)?;
        let binding = match self.lexer.next()? {
            Some(Token::Identifier(name)) => SmolStr::new(name),
            _ => return self.lexer.unexpected(),
        };
        self.lexer.expect(Token::Comma)?;
        let list = self.parse_expr()?;
        self.lexer.expect(Token::RParen)?;
        let body = self.parse_block()?;
        let end = self.lexer.location();
        Ok(Spanned::new(
            Stmt::Foreach { binding, list, body },
            Span::new(start, end),
        ))
    }

    fn parse_if(&mut self, start: crate::error::Location) -> Result<Spanned<Stmt>, Err> {
        let mut branches = Vec::new();
        let mut else_branch = None;
        loop {
            self.lexer.expect(Token::If)?;
            self.lexer.expect(Token::LParen)?;
            let cond = self.parse_expr()?;
            self.lexer.expect(Token::RParen)?;
            let body = self.parse_block()?;
            branches.push((cond, body));
            if self.lexer.peek()? == Some(Token::Else) {
                self.lexer.next()?;
                if self.lexer.peek()? == Some(Token::If) {
                    continue;
                } else {
                    else_branch = Some(self.parse_block()?);
                    break;
                }
            }
            break;
        }
        let end = self.lexer.location();
        Ok(Spanned::new(
            Stmt::If { branches, else_branch },
            Span::new(start, end),
        ))
    }

    fn parse_expr(&mut self) -> Result<Spanned<Expr>, Err> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Spanned<Expr>, Err> {
        let mut lhs = self.parse_and()?;
        while self.lexer.peek()? == Some(Token::OrOr) {
            self.lexer.next()?;
            let rhs = self.parse_and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Spanned<Expr>, Err> {
        let mut lhs = self.parse_equality()?;
        while self.lexer.peek()? == Some(Token::AndAnd) {
            self.lexer.next()?;
            let rhs = self.parse_equality()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Spanned<Expr>, Err> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.lexer.peek()? {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::Ne,
                _ => break,
            };
            self.lexer.next()?;
            let rhs = self.parse_comparison()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Spanned<Expr>, Err> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.lexer.peek()? {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::LtEq) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::GtEq) => BinaryOp::Ge,
                _ => break,
            };
            self.lexer.next()?;
            let rhs = self.parse_additive()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Spanned<Expr>, Err> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.lexer.peek()? {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.lexer.next()?;
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Spanned<Expr>, Err> {
        if self.lexer.peek()? == Some(Token::Bang) {
            let start = self.lexer.location();
            self.lexer.next()?;
            let operand = self.parse_unary()?;
            let end = operand.span.end;
            return Ok(Spanned::new(
                Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                Span::new(start, end),
            ));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Spanned<Expr>, Err> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.lexer.peek()? {
                Some(Token::Dot) => {
                    self.lexer.next()?;
                    let field = match self.lexer.next()? {
                        Some(Token::Identifier(name)) => SmolStr::new(name),
                        _ => return self.lexer.unexpected(),
                    };
                    let end = self.lexer.location();
                    let start = expr.span.start;
                    expr = Spanned::new(
                        Expr::Accessor {
                            base: Box::new(expr),
                            accessor: Accessor::Field(field),
                        },
                        Span::new(start, end),
                    );
                }
                Some(Token::LBracket) => {
                    self.lexer.next()?;
                    let index = self.parse_expr()?;
                    self.lexer.expect(Token::RBracket)?;
                    let end = self.lexer.location();
                    let start = expr.span.start;
                    expr = Spanned::new(
                        Expr::Accessor {
                            base: Box::new(expr),
                            accessor: Accessor::Index(Box::new(index)),
                        },
                        Span::new(start, end),
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Spanned<Expr>, Err> {
        let start = self.lexer.location();
        match self.lexer.peek()? {
            Some(Token::Integer(v)) => {
                self.lexer.next()?;
                Ok(Spanned::new(Expr::Integer(v), Span::point(start)))
            }
            Some(Token::String(raw)) => {
                self.lexer.next()?;
                let chunks = parse_string_literal(raw)?;
                Ok(Spanned::new(Expr::StringLiteral(chunks), Span::point(start)))
            }
            Some(Token::LBracket) => {
                self.lexer.next()?;
                let mut items = Vec::new();
                self.skip_statement_breaks()?;
                while self.lexer.peek()? != Some(Token::RBracket) {
                    items.push(self.parse_expr()?);
                    self.skip_statement_breaks()?;
                    if self.lexer.peek()? == Some(Token::Comma) {
                        self.lexer.next()?;
                        self.skip_statement_breaks()?;
                    } else {
                        break;
                    }
                }
                self.skip_statement_breaks()?;
                self.lexer.expect(Token::RBracket)?;
                let end = self.lexer.location();
                Ok(Spanned::new(Expr::List(items), Span::new(start, end)))
            }
            Some(Token::LBrace) => {
                let block = self.parse_block()?;
                let end = self.lexer.location();
                Ok(Spanned::new(Expr::ScopeLiteral(block), Span::new(start, end)))
            }
            Some(Token::LParen) => {
                self.lexer.next()?;
                let inner = self.parse_expr()?;
                self.lexer.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Identifier(name)) => {
                let name = SmolStr::new(name);
                self.lexer.next()?;
                if self.lexer.peek()? == Some(Token::LParen) {
                    self.parse_call(start, name)
                } else if name.as_str() == "true" {
                    Ok(Spanned::new(Expr::Boolean(true), Span::point(start)))
                } else if name.as_str() == "false" {
                    Ok(Spanned::new(Expr::Boolean(false), Span::point(start)))
                } else {
                    Ok(Spanned::new(Expr::Identifier(name), Span::point(start)))
                }
            }
            _ => self.lexer.unexpected(),
        }
    }

    fn parse_call(&mut self, start: crate::error::Location, name: SmolStr) -> Result<Spanned<Expr>, Err> {
        self.lexer.expect(Token::LParen)?;
        let mut args = Vec::new();
        self.skip_statement_breaks()?;
        while self.lexer.peek()? != Some(Token::RParen) {
            args.push(self.parse_expr()?);
            self.skip_statement_breaks()?;
            if self.lexer.peek()? == Some(Token::Comma) {
                self.lexer.next()?;
                self.skip_statement_breaks()?;
            } else {
                break;
            }
        }
        self.skip_statement_breaks()?;
        self.lexer.expect(Token::RParen)?;
        let block = if self.lexer.peek()? == Some(Token::LBrace) {
            Some(self.parse_block()?)
        } else {
            None
        };
        let end = self.lexer.location();
        Ok(Spanned::new(Expr::Call { name, args, block }, Span::new(start, end)))
    }
}

fn binary(op: BinaryOp, lhs: Spanned<Expr>, rhs: Spanned<Expr>) -> Spanned<Expr> {
    let span = Span::new(lhs.span.start, rhs.span.end);
    Spanned::new(
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    )
}

/// Split a raw (still-escaped, quotes already stripped) string literal body
/// into literal chunks and `$var`/`${expr}` interpolations, per `spec.md`
/// §4.1.
fn parse_string_literal(raw: &str) -> Result<Vec<StringChunk>, Err> {
    let mut chunks = Vec::new();
    let mut literal = String::new();
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if i + 1 < bytes.len() => {
                let escaped = bytes[i + 1] as char;
                literal.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    '"' => '"',
                    '\\' => '\\',
                    '$' => '$',
                    other => other,
                });
                i += 2;
            }
            b'$' if i + 1 < bytes.len()
                && ((bytes[i + 1] as char).is_alphabetic() || bytes[i + 1] == b'_') =>
            {
                if !literal.is_empty() {
                    chunks.push(StringChunk::Literal(SmolStr::new(std::mem::take(&mut literal))));
                }
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() {
                    let c = bytes[end] as char;
                    if c.is_alphanumeric() || c == '_' {
                        end += 1;
                    } else {
                        break;
                    }
                }
                chunks.push(StringChunk::Var(SmolStr::new(&raw[start..end])));
                i = end;
            }
            b'$' if i + 1 < bytes.len() && bytes[i + 1] == b'{' => {
                if !literal.is_empty() {
                    chunks.push(StringChunk::Literal(SmolStr::new(std::mem::take(&mut literal))));
                }
                let mut depth = 1usize;
                let mut j = i + 2;
                while j < bytes.len() && depth > 0 {
                    match bytes[j] {
                        b'{' => depth += 1,
                        b'}' => depth -= 1,
                        _ => {}
                    }
                    if depth == 0 {
                        break;
                    }
                    j += 1;
                }
                if depth != 0 {
                    return Err(Err::syntax("unterminated ${...} interpolation"));
                }
                let inner = &raw[i + 2..j];
                let expr = parse_expr_snippet(inner)?;
                chunks.push(StringChunk::Expr(Box::new(expr)));
                i = j + 1;
            }
            b => {
                literal.push(b as char);
                i += 1;
            }
        }
    }
    if !literal.is_empty() || chunks.is_empty() {
        chunks.push(StringChunk::Literal(SmolStr::new(literal)));
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Stmt;

    #[test]
    fn parses_simple_assignment() {
        let program = parse_program("a = 1\n").unwrap();
        assert_eq!(program.statements.len(), 1);
        assert!(matches!(program.statements[0].node, Stmt::Assign { .. }));
    }

    #[test]
    fn parses_binary_precedence() {
        let program = parse_program("b = a + 2\n").unwrap();
        let Stmt::Assign { value, .. } = &program.statements[0].node else {
            panic!("expected assignment");
        };
        assert!(matches!(value.node, Expr::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn parses_call_with_block() {
        let program = parse_program("executable(\"foo\") {\n  sources = [\"a.cc\"]\n}\n").unwrap();
        let Stmt::Expr(expr) = &program.statements[0].node else {
            panic!("expected call statement");
        };
        let Expr::Call { name, block, .. } = &expr.node else {
            panic!("expected call");
        };
        assert_eq!(name.as_str(), "executable");
        assert!(block.is_some());
    }

    #[test]
    fn parses_foreach_loop() {
        let program = parse_program("foreach(i, [1, 2]) {\n  print(i)\n}\n").unwrap();
        assert!(matches!(program.statements[0].node, Stmt::Foreach { .. }));
    }

    #[test]
    fn parses_if_else() {
        let program = parse_program("if (a == 1) {\n  b = 1\n} else {\n  b = 2\n}\n").unwrap();
        let Stmt::If { branches, else_branch } = &program.statements[0].node else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 1);
        assert!(else_branch.is_some());
    }

    #[test]
    fn string_interpolation_splits_chunks() {
        let program = parse_program("a = \"x=$x y=${1+2}\"\n").unwrap();
        let Stmt::Assign { value, .. } = &program.statements[0].node else {
            panic!("expected assignment");
        };
        let Expr::StringLiteral(chunks) = &value.node else {
            panic!("expected string literal");
        };
        assert!(matches!(chunks[0], StringChunk::Literal(_)));
        assert!(chunks.iter().any(|c| matches!(c, StringChunk::Var(n) if n == "x")));
        assert!(chunks.iter().any(|c| matches!(c, StringChunk::Expr(_))));
    }
}
