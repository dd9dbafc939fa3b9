//! A canonical-form pretty-printer for the build-description language,
//! kept as its own crate so the core `tenjin` crate never needs to pull in
//! formatting-only code (`spec.md` §1 explicitly excludes "the Ninja-file
//! emitter's textual formatting" from the core; the same boundary applies
//! here, mirroring how the teacher pack keeps backend adapter crates like
//! `n2o5-redb`/`n2o5-heed` outside the core `n2o5` crate).
//!
//! Reformats from the AST, not the source text, so output is independent of
//! the input's original whitespace. Doc comments are discarded by the
//! parser before the AST is built (see `DESIGN.md`), so this printer cannot
//! round-trip them; that loss is accepted the same way `gn format`-style
//! tools accept it for language subsets whose comment handling lives only
//! in the tokenizer.

use tenjin::ast::{Accessor, AssignOp, BinaryOp, Block, Expr, Program, Spanned, Stmt, StringChunk, UnaryOp};
use tenjin::Err;

const INDENT: &str = "  ";

/// Parses `source` and reformats it into canonical form.
pub fn format_source(source: &str) -> Result<String, Err> {
    let program = tenjin::parser::parse_program(source)?;
    Ok(format_program(&program))
}

pub fn format_program(program: &Program) -> String {
    let mut out = String::new();
    write_statements(&mut out, &program.statements, 0);
    out
}

fn write_statements(out: &mut String, stmts: &[Spanned<Stmt>], depth: usize) {
    for stmt in stmts {
        write_stmt(out, &stmt.node, depth);
    }
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

fn write_stmt(out: &mut String, stmt: &Stmt, depth: usize) {
    push_indent(out, depth);
    match stmt {
        Stmt::Assign { target, op, value, .. } => {
            let op_str = match op {
                AssignOp::Set => "=",
                AssignOp::Add => "+=",
                AssignOp::Sub => "-=",
            };
            out.push_str(target);
            out.push(' ');
            out.push_str(op_str);
            out.push(' ');
            write_expr(out, &value.node);
            out.push('\n');
        }
        Stmt::Expr(expr) => {
            write_expr(out, &expr.node);
            out.push('\n');
        }
        Stmt::If { branches, else_branch } => {
            for (i, (cond, body)) in branches.iter().enumerate() {
                if i == 0 {
                    out.push_str("if (");
                } else {
                    out.push_str("} else if (");
                }
                write_expr(out, &cond.node);
                out.push_str(") {\n");
                write_statements(out, &body.statements, depth + 1);
                push_indent(out, depth);
            }
            if let Some(body) = else_branch {
                out.push_str("} else {\n");
                write_statements(out, &body.statements, depth + 1);
                push_indent(out, depth);
            }
            out.push_str("}\n");
        }
        Stmt::Foreach { binding, list, body } => {
            out.push_str("foreach(");
            out.push_str(binding);
            out.push_str(", ");
            write_expr(out, &list.node);
            out.push_str(") {\n");
            write_statements(out, &body.statements, depth + 1);
            push_indent(out, depth);
            out.push_str("}\n");
        }
    }
}

fn write_block_literal(out: &mut String, block: &Block, depth: usize) {
    out.push_str("{\n");
    write_statements(out, &block.statements, depth + 1);
    push_indent(out, depth);
    out.push('}');
}

fn write_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::None => out.push_str("none"),
        Expr::Integer(v) => out.push_str(&v.to_string()),
        Expr::Boolean(v) => out.push_str(if *v { "true" } else { "false" }),
        Expr::StringLiteral(chunks) => write_string_literal(out, chunks),
        Expr::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, &item.node);
            }
            out.push(']');
        }
        Expr::ScopeLiteral(block) => write_block_literal(out, block, 0),
        Expr::Identifier(name) => out.push_str(name),
        Expr::Unary { op, operand } => {
            match op {
                UnaryOp::Not => out.push('!'),
            }
            write_expr(out, &operand.node);
        }
        Expr::Binary { op, lhs, rhs } => {
            write_expr(out, &lhs.node);
            out.push(' ');
            out.push_str(binary_op_str(*op));
            out.push(' ');
            write_expr(out, &rhs.node);
        }
        Expr::Accessor { base, accessor } => {
            write_expr(out, &base.node);
            match accessor {
                Accessor::Field(name) => {
                    out.push('.');
                    out.push_str(name);
                }
                Accessor::Index(index) => {
                    out.push('[');
                    write_expr(out, &index.node);
                    out.push(']');
                }
            }
        }
        Expr::Call { name, args, block } => {
            out.push_str(name);
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, &arg.node);
            }
            out.push(')');
            if let Some(block) = block {
                out.push(' ');
                write_block_literal(out, block, 0);
            }
        }
    }
}

fn binary_op_str(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
    }
}

fn write_string_literal(out: &mut String, chunks: &[StringChunk]) {
    out.push('"');
    for chunk in chunks {
        match chunk {
            StringChunk::Literal(s) => {
                for ch in s.chars() {
                    match ch {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '$' => out.push_str("\\$"),
                        other => out.push(other),
                    }
                }
            }
            StringChunk::Var(name) => {
                out.push('$');
                out.push_str(name);
            }
            StringChunk::Expr(expr) => {
                out.push_str("${");
                write_expr(out, &expr.node);
                out.push('}');
            }
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reindents_nested_blocks() {
        let source = "executable(\"app\") {\nsources=[\"a.cc\"]\nif(true){\nx=1\n}\n}\n";
        let formatted = format_source(source).unwrap();
        assert_eq!(
            formatted,
            "executable(\"app\") {\n  sources = [\"a.cc\"]\n  if (true) {\n    x = 1\n  }\n}\n"
        );
    }

    #[test]
    fn formats_operators_and_lists() {
        let formatted = format_source("a = 1 + 2\nb = [1, 2, 3] - [2]\n").unwrap();
        assert_eq!(formatted, "a = 1 + 2\nb = [1, 2, 3] - [2]\n");
    }

    #[test]
    fn preserves_string_interpolation() {
        let formatted = format_source("a = \"hello $name, ${1 + 1}\"\n").unwrap();
        assert_eq!(formatted, "a = \"hello $name, ${1 + 1}\"\n");
    }
}
