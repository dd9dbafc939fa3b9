//! Built-in functions (`spec.md` §4.4, `SPEC_FULL.md` §2).
//!
//! Grounded on `n2o5`'s rule-table dispatch in `cli/src/ninja/parser.rs`
//! (`expand_build` switching on a handful of known rule names before
//! falling through to a user rule): [`dispatch`] tries every known built-in
//! name first and returns `None` for anything it doesn't recognize, letting
//! [`crate::eval::Evaluator::eval_call`] fall through to a user template.
//!
//! Most built-ins evaluate their arguments eagerly like any other call. The
//! exception is [`defined`], which must inspect the *unevaluated* argument
//! expression so that `defined(x)` can answer "is `x` bound?" without the
//! side effect of marking `x` used (`spec.md` §4.2).

use std::path::Path;

use smol_str::SmolStr;

use crate::ast::{Accessor, Block, Expr, Spanned};
use crate::error::{Err, Location};
use crate::eval::Evaluator;
use crate::scope::{Scope, ScopeKind, ScopeRef, SetOptions};
use crate::target::{Label, PendingTarget, TargetType, ToolchainDecl};
use crate::value::{Value, ValueKind};

pub fn dispatch(
    eval: &mut Evaluator<'_>,
    name: &str,
    args: &[Spanned<Expr>],
    block: Option<&Block>,
    scope: &ScopeRef,
    loc: Location,
) -> Option<Result<Value, Err>> {
    if let Some(target_type) = TargetType::from_builtin_name(name) {
        return Some(declare_target(eval, target_type, args, block, scope, loc));
    }

    Some(match name {
        "import" => import(eval, args, scope, loc),
        "template" => template(eval, args, block, scope, loc),
        "declare_args" => declare_args(eval, block, scope, loc),
        "set_defaults" => set_defaults(eval, args, block, scope, loc),
        "toolchain" => toolchain(eval, args, block, scope, loc),
        "print" => print_fn(eval, args, scope, loc),
        "defined" => defined(eval, args, scope, loc),
        "assert" => assert_fn(eval, args, scope, loc),
        "not_needed" => not_needed(eval, args, scope, loc),
        "forward_variables_from" => forward_variables_from(eval, args, scope, loc),
        "get_path_info" => get_path_info(eval, args, scope, loc),
        "rebase_path" => rebase_path(eval, args, scope, loc),
        "get_target_outputs" => get_target_outputs(eval, args, scope, loc),
        "read_file" => read_file(eval, args, scope, loc),
        "write_file" => write_file(eval, args, scope, loc),
        "exec_script" => exec_script(eval, args, scope, loc),
        _ => return None,
    })
}

fn eval_all(eval: &mut Evaluator<'_>, args: &[Spanned<Expr>], scope: &ScopeRef) -> Result<Vec<Value>, Err> {
    args.iter().map(|a| eval.eval_expr(a, scope)).collect()
}

fn expect_args(args: &[Value], count: usize, name: &str, loc: Location) -> Result<(), Err> {
    if args.len() != count {
        return Err(Err::type_error(format!(
            "{name}() takes {count} argument(s), got {}",
            args.len()
        ))
        .at(loc));
    }
    Ok(())
}

fn as_string_list(v: &Value) -> Result<Vec<SmolStr>, Err> {
    v.as_list()?
        .iter()
        .map(|item| item.as_str().map(SmolStr::new))
        .collect()
}

// ---------------------------------------------------------------------
// import / template / declare_args / set_defaults
// ---------------------------------------------------------------------

fn import(eval: &mut Evaluator<'_>, args: &[Spanned<Expr>], scope: &ScopeRef, loc: Location) -> Result<Value, Err> {
    let values = eval_all(eval, args, scope)?;
    expect_args(&values, 1, "import", loc)?;
    let path = values[0].as_str()?.to_string();
    let from_dir = eval.host.current_dir();
    let imported = eval.host.import(&path, &from_dir, loc)?;
    Scope::import_from(scope, &imported)?;
    Ok(Value::none(loc))
}

fn template(
    eval: &mut Evaluator<'_>,
    args: &[Spanned<Expr>],
    block: Option<&Block>,
    scope: &ScopeRef,
    loc: Location,
) -> Result<Value, Err> {
    let values = eval_all(eval, args, scope)?;
    expect_args(&values, 1, "template", loc)?;
    let name = SmolStr::new(values[0].as_str()?);
    let body = block
        .cloned()
        .ok_or_else(|| Err::syntax("template() requires a block body").at(loc))?;
    let decl = std::rc::Rc::new(crate::ast::Template {
        name: name.clone(),
        body,
        defining_scope: scope.clone(),
        location: loc,
    });
    Scope::define_template(scope, &name, decl);
    Ok(Value::none(loc))
}

fn declare_args(eval: &mut Evaluator<'_>, block: Option<&Block>, scope: &ScopeRef, loc: Location) -> Result<Value, Err> {
    let block = block.ok_or_else(|| Err::syntax("declare_args() requires a block body").at(loc))?;
    for stmt in &block.statements {
        let crate::ast::Stmt::Assign { target, target_location, op: crate::ast::AssignOp::Set, value } = &stmt.node
        else {
            return Err(Err::syntax("declare_args() body may only contain `name = default` assignments")
                .at(stmt.location()));
        };
        let default = eval.eval_expr(value, scope)?;
        let resolved = match eval.host.declared_arg_override(target) {
            Some(override_value) => {
                eval.host.mark_arg_consumed(target);
                override_value
            }
            None => default,
        };
        Scope::set(scope, target, resolved, *target_location, SetOptions::Default)?;
    }
    Ok(Value::none(loc))
}

fn set_defaults(
    eval: &mut Evaluator<'_>,
    args: &[Spanned<Expr>],
    block: Option<&Block>,
    scope: &ScopeRef,
    loc: Location,
) -> Result<Value, Err> {
    let values = eval_all(eval, args, scope)?;
    expect_args(&values, 1, "set_defaults", loc)?;
    let target_type = values[0].as_str()?.to_string();
    let block = block.ok_or_else(|| Err::syntax("set_defaults() requires a block body").at(loc))?;
    let defaults_scope = Scope::child_with_kind(scope, ScopeKind::TemplateDefinition);
    eval.eval_block(block, &defaults_scope, crate::eval::AssignDiscipline::Default)?;
    eval.host.register_default_scope(&target_type, defaults_scope);
    Ok(Value::none(loc))
}

// ---------------------------------------------------------------------
// toolchain
// ---------------------------------------------------------------------

fn toolchain(
    eval: &mut Evaluator<'_>,
    args: &[Spanned<Expr>],
    block: Option<&Block>,
    scope: &ScopeRef,
    loc: Location,
) -> Result<Value, Err> {
    let (name, decl_scope) = eval.eval_declaration_body(args, block, scope, loc, |_, _| Ok(()))?;
    let dir = eval.host.current_dir();
    let label: Label = eval.host.intern_label(&dir, &name, "");

    let mut settings = Vec::new();
    for binding_name in Scope::binding_names(&decl_scope) {
        let value = Scope::get(&decl_scope, &binding_name).expect("just enumerated");
        settings.push((binding_name, SmolStr::new(value.coerce_to_string()?)));
    }
    Scope::check_for_unused_vars(&decl_scope)?;

    eval.host.commit_toolchain(ToolchainDecl { label, location: loc, settings })?;
    Ok(Value::none(loc))
}

// ---------------------------------------------------------------------
// print / defined / assert / not_needed / forward_variables_from
// ---------------------------------------------------------------------

fn print_fn(eval: &mut Evaluator<'_>, args: &[Spanned<Expr>], scope: &ScopeRef, loc: Location) -> Result<Value, Err> {
    let values = eval_all(eval, args, scope)?;
    let mut parts = Vec::with_capacity(values.len());
    for v in &values {
        parts.push(v.coerce_to_string()?);
    }
    println!("{}", parts.join(" "));
    Ok(Value::none(loc))
}

fn defined(eval: &mut Evaluator<'_>, args: &[Spanned<Expr>], scope: &ScopeRef, loc: Location) -> Result<Value, Err> {
    if args.len() != 1 {
        return Err(Err::type_error("defined() takes exactly one argument").at(loc));
    }
    let present = match &args[0].node {
        Expr::Identifier(name) => Scope::is_defined(scope, name),
        Expr::Accessor { base, accessor: Accessor::Field(name) } => {
            let base_val = eval.eval_expr(base, scope)?;
            let base_scope = base_val.as_scope()?;
            Scope::is_defined(base_scope, name)
        }
        _ => return Err(Err::type_error("defined() expects an identifier or `scope.field`").at(loc)),
    };
    Ok(Value::boolean(present, loc))
}

fn assert_fn(eval: &mut Evaluator<'_>, args: &[Spanned<Expr>], scope: &ScopeRef, loc: Location) -> Result<Value, Err> {
    if args.is_empty() || args.len() > 2 {
        return Err(Err::type_error("assert() takes a condition and an optional message").at(loc));
    }
    let cond = eval.eval_expr(&args[0], scope)?.as_boolean()?;
    if cond {
        return Ok(Value::none(loc));
    }
    let message = if args.len() == 2 {
        eval.eval_expr(&args[1], scope)?.coerce_to_string()?
    } else {
        "assertion failed".to_string()
    };
    Err(Err::generator(message).at(loc))
}

fn not_needed(eval: &mut Evaluator<'_>, args: &[Spanned<Expr>], scope: &ScopeRef, loc: Location) -> Result<Value, Err> {
    match args.len() {
        1 => {
            let names = as_string_list(&eval.eval_expr(&args[0], scope)?)?;
            for name in names {
                Scope::mark_used(scope, &name);
            }
        }
        2 => {
            let target_scope = eval.eval_expr(&args[0], scope)?.as_scope()?.clone();
            let selector = eval.eval_expr(&args[1], scope)?;
            let names = resolve_name_selector(&target_scope, &selector)?;
            for name in names {
                Scope::mark_used(&target_scope, &name);
            }
        }
        _ => return Err(Err::type_error("not_needed() takes one or two arguments").at(loc)),
    }
    Ok(Value::none(loc))
}

fn forward_variables_from(
    eval: &mut Evaluator<'_>,
    args: &[Spanned<Expr>],
    scope: &ScopeRef,
    loc: Location,
) -> Result<Value, Err> {
    if args.len() != 2 {
        return Err(Err::type_error("forward_variables_from() takes exactly two arguments").at(loc));
    }
    let from_scope = eval.eval_expr(&args[0], scope)?.as_scope()?.clone();
    let selector = eval.eval_expr(&args[1], scope)?;
    let names = resolve_name_selector(&from_scope, &selector)?;
    for name in names {
        if let Some(value) = Scope::get(&from_scope, &name) {
            Scope::set(scope, &name, value, loc, SetOptions::Default)?;
        }
    }
    Ok(Value::none(loc))
}

fn resolve_name_selector(target: &ScopeRef, selector: &Value) -> Result<Vec<SmolStr>, Err> {
    if let Ok(s) = selector.as_str() {
        if s == "*" {
            return Ok(Scope::binding_names(target));
        }
    }
    as_string_list(selector)
}

// ---------------------------------------------------------------------
// filesystem-adjacent surface
// ---------------------------------------------------------------------

fn get_path_info(eval: &mut Evaluator<'_>, args: &[Spanned<Expr>], scope: &ScopeRef, loc: Location) -> Result<Value, Err> {
    let values = eval_all(eval, args, scope)?;
    expect_args(&values, 2, "get_path_info", loc)?;
    let path = values[0].as_str()?;
    let what = values[1].as_str()?;
    let p = Path::new(path);
    let result = match what {
        "file" => p.file_name().map(|s| s.to_string_lossy().to_string()).unwrap_or_default(),
        "name" => p.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default(),
        "extension" => p.extension().map(|s| s.to_string_lossy().to_string()).unwrap_or_default(),
        "dir" => p
            .parent()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| ".".to_string()),
        "abspath" => {
            if path.starts_with("//") {
                path.to_string()
            } else {
                format!("//{path}")
            }
        }
        other => return Err(Err::generator(format!("unknown get_path_info query `{other}`")).at(loc)),
    };
    Ok(Value::string(result, loc))
}

fn rebase_path(eval: &mut Evaluator<'_>, args: &[Spanned<Expr>], scope: &ScopeRef, loc: Location) -> Result<Value, Err> {
    let values = eval_all(eval, args, scope)?;
    if values.is_empty() || values.len() > 2 {
        return Err(Err::type_error("rebase_path() takes a path and an optional new base").at(loc));
    }
    let path = values[0].as_str()?;
    let current_dir = eval.host.current_dir();
    let new_base = if values.len() == 2 {
        values[1].as_str()?.to_string()
    } else {
        eval.host.build_dir().to_string()
    };
    Ok(Value::string(rebase_path_str(path, &new_base, &current_dir), loc))
}

fn split_root_relative(path: &str, current_dir: &str) -> Vec<String> {
    let raw = if let Some(rest) = path.strip_prefix("//") {
        rest.to_string()
    } else if path.is_empty() {
        current_dir.to_string()
    } else {
        format!("{current_dir}/{path}")
    };
    normalize_components(&raw)
}

fn normalize_components(path: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other.to_string()),
        }
    }
    out
}

fn rebase_path_str(path: &str, new_base: &str, current_dir: &str) -> String {
    let path_parts = split_root_relative(path, current_dir);
    let base_parts = split_root_relative(new_base, current_dir);
    let common = path_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut result: Vec<String> = Vec::new();
    for _ in common..base_parts.len() {
        result.push("..".to_string());
    }
    result.extend(path_parts[common..].iter().cloned());
    if result.is_empty() {
        ".".to_string()
    } else {
        result.join("/")
    }
}

fn get_target_outputs(eval: &mut Evaluator<'_>, args: &[Spanned<Expr>], scope: &ScopeRef, loc: Location) -> Result<Value, Err> {
    let values = eval_all(eval, args, scope)?;
    expect_args(&values, 1, "get_target_outputs", loc)?;
    let label = values[0].as_str()?;
    let outputs = eval
        .host
        .target_outputs(label)
        .ok_or_else(|| Err::dependency(format!("target `{label}` has not been committed yet")).at(loc))?;
    Ok(Value::list(
        outputs.into_iter().map(|o| Value::string(o, loc)).collect(),
        loc,
    ))
}

fn read_file(eval: &mut Evaluator<'_>, args: &[Spanned<Expr>], scope: &ScopeRef, loc: Location) -> Result<Value, Err> {
    let values = eval_all(eval, args, scope)?;
    if values.is_empty() || values.len() > 2 {
        return Err(Err::type_error("read_file() takes a path and an optional format").at(loc));
    }
    let path = values[0].as_str()?.to_string();
    let processor = if values.len() == 2 { values[1].as_str()?.to_string() } else { "string".to_string() };
    let raw = eval.host.read_file(&path, loc)?;
    process_result(eval, &raw, &processor, loc)
}

fn write_file(eval: &mut Evaluator<'_>, args: &[Spanned<Expr>], scope: &ScopeRef, loc: Location) -> Result<Value, Err> {
    let values = eval_all(eval, args, scope)?;
    expect_args(&values, 2, "write_file", loc)?;
    let path = values[0].as_str()?.to_string();
    let content = values[1].coerce_to_string()?;
    eval.host.write_file(&path, &content, loc)?;
    Ok(Value::none(loc))
}

fn exec_script(eval: &mut Evaluator<'_>, args: &[Spanned<Expr>], scope: &ScopeRef, loc: Location) -> Result<Value, Err> {
    let values = eval_all(eval, args, scope)?;
    if values.is_empty() || values.len() > 4 {
        return Err(Err::type_error(
            "exec_script() takes (script, arguments, result_processor, input_files)",
        )
        .at(loc));
    }
    let script = values[0].as_str()?.to_string();
    let script_args: Vec<String> = if values.len() > 1 {
        as_string_list(&values[1])?.iter().map(|s| s.to_string()).collect()
    } else {
        Vec::new()
    };
    let processor = if values.len() > 2 { values[2].as_str()?.to_string() } else { "string".to_string() };
    let input_files: Vec<String> = if values.len() > 3 {
        as_string_list(&values[3])?.iter().map(|s| s.to_string()).collect()
    } else {
        Vec::new()
    };
    let raw = eval.host.exec_script(&script, &script_args, &input_files, loc)?;
    process_result(eval, &raw, &processor, loc)
}

/// Shared by `exec_script` and `read_file`: interpret raw text per the named
/// result-processor contract (`SPEC_FULL.md` §2).
fn process_result(eval: &mut Evaluator<'_>, raw: &str, processor: &str, loc: Location) -> Result<Value, Err> {
    match processor {
        "string" => Ok(Value::string(raw, loc)),
        "trim string" => Ok(Value::string(raw.trim(), loc)),
        "list lines" => Ok(Value::list(raw.lines().map(|l| Value::string(l, loc)).collect(), loc)),
        "trim list lines" => Ok(Value::list(
            raw.lines().map(|l| Value::string(l.trim(), loc)).collect(),
            loc,
        )),
        "value" => {
            let expr = crate::parser::parse_expr_snippet(raw.trim())?;
            let root = Scope::root(scope_settings_from(eval));
            eval.eval_expr(&expr, &root)
        }
        "scope" => {
            let program = crate::parser::parse_program(raw)?;
            let result_scope = Scope::root(scope_settings_from(eval));
            eval.eval_program(&program, &result_scope)?;
            Scope::mark_all_used(&result_scope);
            Ok(Value::scope(result_scope, loc))
        }
        "json" => {
            let value = json::parse(raw, loc, scope_settings_from(eval))?;
            Ok(value)
        }
        other => Err(Err::generator(format!("unknown result processor `{other}`")).at(loc)),
    }
}

fn scope_settings_from(eval: &Evaluator<'_>) -> std::rc::Rc<crate::scope::Settings> {
    std::rc::Rc::new(crate::scope::Settings {
        source_root: eval.host.source_root().to_path_buf(),
        toolchain: eval.host.current_toolchain(),
        build_dir: eval.host.build_dir(),
    })
}

mod json {
    use super::*;

    /// A small hand-rolled JSON reader feeding straight into [`Value`]:
    /// objects become `scope` values, arrays become `list` values. There is
    /// no dependency on a JSON crate; the grammar needed here is a handful
    /// of productions and pulling in a crate for it would be the opposite
    /// of keeping the dependency stack aligned with what the rest of the
    /// evaluator already needs.
    pub fn parse(raw: &str, loc: Location, settings: std::rc::Rc<crate::scope::Settings>) -> Result<Value, Err> {
        let mut p = Parser { bytes: raw.as_bytes(), pos: 0, loc, settings };
        p.skip_ws();
        let v = p.parse_value()?;
        p.skip_ws();
        if p.pos != p.bytes.len() {
            return Err(Err::generator("trailing data after JSON value").at(loc));
        }
        Ok(v)
    }

    struct Parser<'a> {
        bytes: &'a [u8],
        pos: usize,
        loc: Location,
        settings: std::rc::Rc<crate::scope::Settings>,
    }

    impl<'a> Parser<'a> {
        fn peek(&self) -> Option<u8> {
            self.bytes.get(self.pos).copied()
        }

        fn bump(&mut self) -> Option<u8> {
            let b = self.peek();
            if b.is_some() {
                self.pos += 1;
            }
            b
        }

        fn skip_ws(&mut self) {
            while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
                self.pos += 1;
            }
        }

        fn expect_byte(&mut self, expected: u8) -> Result<(), Err> {
            if self.bump() == Some(expected) {
                Ok(())
            } else {
                Err(Err::generator(format!("expected `{}` in JSON input", expected as char)).at(self.loc))
            }
        }

        fn expect_literal(&mut self, lit: &str) -> Result<(), Err> {
            for b in lit.bytes() {
                self.expect_byte(b)?;
            }
            Ok(())
        }

        fn parse_value(&mut self) -> Result<Value, Err> {
            self.skip_ws();
            match self.peek() {
                Some(b'{') => self.parse_object(),
                Some(b'[') => self.parse_array(),
                Some(b'"') => self.parse_string().map(|s| Value::string(s, self.loc)),
                Some(b't') => {
                    self.expect_literal("true")?;
                    Ok(Value::boolean(true, self.loc))
                }
                Some(b'f') => {
                    self.expect_literal("false")?;
                    Ok(Value::boolean(false, self.loc))
                }
                Some(b'n') => {
                    self.expect_literal("null")?;
                    Ok(Value::none(self.loc))
                }
                Some(b'-') | Some(b'0'..=b'9') => self.parse_number(),
                _ => Err(Err::generator("unexpected character in JSON input").at(self.loc)),
            }
        }

        fn parse_string(&mut self) -> Result<String, Err> {
            self.expect_byte(b'"')?;
            let mut out = String::new();
            loop {
                match self.bump() {
                    None => return Err(Err::generator("unterminated JSON string").at(self.loc)),
                    Some(b'"') => return Ok(out),
                    Some(b'\\') => match self.bump() {
                        Some(b'"') => out.push('"'),
                        Some(b'\\') => out.push('\\'),
                        Some(b'/') => out.push('/'),
                        Some(b'n') => out.push('\n'),
                        Some(b't') => out.push('\t'),
                        Some(b'r') => out.push('\r'),
                        Some(b'u') => {
                            let mut code = 0u32;
                            for _ in 0..4 {
                                let b = self.bump().ok_or_else(|| Err::generator("truncated \\u escape").at(self.loc))?;
                                let digit = (b as char)
                                    .to_digit(16)
                                    .ok_or_else(|| Err::generator("invalid \\u escape").at(self.loc))?;
                                code = code * 16 + digit;
                            }
                            out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                        }
                        _ => return Err(Err::generator("invalid JSON escape").at(self.loc)),
                    },
                    Some(b) => out.push(b as char),
                }
            }
        }

        fn parse_number(&mut self) -> Result<Value, Err> {
            let start = self.pos;
            if self.peek() == Some(b'-') {
                self.pos += 1;
            }
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
            let mut is_float = false;
            if self.peek() == Some(b'.') {
                is_float = true;
                self.pos += 1;
                while matches!(self.peek(), Some(b'0'..=b'9')) {
                    self.pos += 1;
                }
            }
            if matches!(self.peek(), Some(b'e' | b'E')) {
                is_float = true;
                self.pos += 1;
                if matches!(self.peek(), Some(b'+' | b'-')) {
                    self.pos += 1;
                }
                while matches!(self.peek(), Some(b'0'..=b'9')) {
                    self.pos += 1;
                }
            }
            let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
            if is_float {
                return Err(Err::generator(format!(
                    "exec_script json processor does not support non-integer number `{text}`"
                ))
                .at(self.loc));
            }
            let n: i64 = text
                .parse()
                .map_err(|_| Err::generator(format!("invalid JSON number `{text}`")).at(self.loc))?;
            Ok(Value::integer(n, self.loc))
        }

        fn parse_array(&mut self) -> Result<Value, Err> {
            self.expect_byte(b'[')?;
            let mut items = Vec::new();
            self.skip_ws();
            if self.peek() == Some(b']') {
                self.pos += 1;
                return Ok(Value::list(items, self.loc));
            }
            loop {
                items.push(self.parse_value()?);
                self.skip_ws();
                match self.bump() {
                    Some(b',') => continue,
                    Some(b']') => break,
                    _ => return Err(Err::generator("expected `,` or `]` in JSON array").at(self.loc)),
                }
            }
            Ok(Value::list(items, self.loc))
        }

        fn parse_object(&mut self) -> Result<Value, Err> {
            self.expect_byte(b'{')?;
            let result_scope = Scope::root(self.settings.clone());
            self.skip_ws();
            if self.peek() == Some(b'}') {
                self.pos += 1;
                Scope::mark_all_used(&result_scope);
                return Ok(Value::scope(result_scope, self.loc));
            }
            loop {
                self.skip_ws();
                let key = self.parse_string()?;
                self.skip_ws();
                self.expect_byte(b':')?;
                let value = self.parse_value()?;
                Scope::set(&result_scope, &key, value, self.loc, SetOptions::Overwrite)?;
                self.skip_ws();
                match self.bump() {
                    Some(b',') => continue,
                    Some(b'}') => break,
                    _ => return Err(Err::generator("expected `,` or `}` in JSON object").at(self.loc)),
                }
            }
            Scope::mark_all_used(&result_scope);
            Ok(Value::scope(result_scope, self.loc))
        }
    }
}

// ---------------------------------------------------------------------
// Target-declaring functions
// ---------------------------------------------------------------------

fn declare_target(
    eval: &mut Evaluator<'_>,
    target_type: TargetType,
    args: &[Spanned<Expr>],
    block: Option<&Block>,
    scope: &ScopeRef,
    loc: Location,
) -> Result<Value, Err> {
    let build_dir = eval.host.build_dir();
    let current_dir = eval.host.current_dir();
    let current_toolchain = eval.host.current_toolchain();
    let defaults = eval.host.default_scope(target_type.as_builtin_name());

    let (name, decl_scope) = eval.eval_declaration_body(args, block, scope, loc, |decl_scope, inst_name| {
        if let Some(defaults) = &defaults {
            for binding_name in Scope::binding_names(defaults) {
                let value = Scope::get(defaults, &binding_name).expect("just enumerated");
                Scope::set(decl_scope, &binding_name, value, loc, SetOptions::Overwrite)?;
            }
        }
        let gen_dir = Value::string(format!("{build_dir}/gen/{current_dir}"), loc);
        let out_dir = Value::string(format!("{build_dir}/obj/{current_dir}"), loc);
        let toolchain_val = Value::string(current_toolchain.clone(), loc);
        let name_val = Value::string(inst_name, loc);
        for (key, value) in [
            ("target_gen_dir", gen_dir),
            ("target_out_dir", out_dir),
            ("current_toolchain", toolchain_val),
            ("target_name", name_val),
        ] {
            Scope::set(decl_scope, key, value, loc, SetOptions::Overwrite)?;
            Scope::mark_used(decl_scope, key);
        }
        Ok(())
    })?;

    let label = eval.host.intern_label(&current_dir, &name, &current_toolchain);

    let mut target = PendingTarget::new(label, target_type, current_toolchain, loc);
    target.sources = read_list(&decl_scope, "sources")?;
    target.inputs = read_list(&decl_scope, "inputs")?;
    target.outputs = read_list(&decl_scope, "outputs")?;
    target.public_headers = read_list(&decl_scope, "public_headers")?;
    target.public_configs = read_list(&decl_scope, "public_configs")?;
    target.all_dependent_configs = read_list(&decl_scope, "all_dependent_configs")?;
    target.configs = read_list(&decl_scope, "configs")?;
    target.private_deps = read_list(&decl_scope, "deps")?;
    target.private_deps.extend(read_list(&decl_scope, "private_deps")?);
    target.public_deps = read_list(&decl_scope, "public_deps")?;
    target.data_deps = read_list(&decl_scope, "data_deps")?;
    target.args = read_list(&decl_scope, "args")?;
    target.libs = read_list(&decl_scope, "libs")?;
    target.lib_dirs = read_list(&decl_scope, "lib_dirs")?;
    target.frameworks = read_list(&decl_scope, "frameworks")?;
    target.visibility = read_list(&decl_scope, "visibility")?;
    target.assert_no_deps = read_list(&decl_scope, "assert_no_deps")?;
    target.script = read_optional_string(&decl_scope, "script")?;
    target.depfile = read_optional_string(&decl_scope, "depfile")?;
    target.pool = read_optional_string(&decl_scope, "pool")?;

    Scope::check_for_unused_vars(&decl_scope)?;

    eval.host.commit_target(target)?;
    Ok(Value::none(loc))
}

fn read_list(scope: &ScopeRef, field: &str) -> Result<Vec<SmolStr>, Err> {
    if !scope_owns(scope, field) {
        return Ok(Vec::new());
    }
    let value = Scope::get(scope, field).expect("scope_owns confirmed the binding exists");
    as_string_list(&value)
}

fn read_optional_string(scope: &ScopeRef, field: &str) -> Result<Option<SmolStr>, Err> {
    if !scope_owns(scope, field) {
        return Ok(None);
    }
    let value = Scope::get(scope, field).expect("scope_owns confirmed the binding exists");
    if matches!(value.kind, ValueKind::None) {
        return Ok(None);
    }
    Ok(Some(SmolStr::new(value.as_str()?)))
}

/// Whether `field` is declared directly in `scope` (not inherited from an
/// enclosing scope) — target field readers must not reach through to
/// unrelated outer bindings that happen to share a name.
fn scope_owns(scope: &ScopeRef, field: &str) -> bool {
    Scope::binding_names(scope).iter().any(|n| n.as_str() == field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::EvalHost;
    use crate::parser::parse_program;
    use crate::scope::Settings;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::rc::Rc;

    struct TestHost {
        settings: Rc<Settings>,
        labels: crate::target::LabelTable,
        overrides: HashMap<String, Value>,
        consumed: RefCell<Vec<String>>,
        committed_targets: RefCell<Vec<PendingTarget>>,
        committed_toolchains: RefCell<Vec<ToolchainDecl>>,
        default_scopes: RefCell<HashMap<String, ScopeRef>>,
        exec_output: String,
    }

    impl TestHost {
        fn new() -> Self {
            Self {
                settings: Rc::new(Settings {
                    source_root: PathBuf::from("/src"),
                    toolchain: SmolStr::new("//toolchain:default"),
                    build_dir: SmolStr::new("out/Default"),
                }),
                labels: crate::target::LabelTable::new(),
                overrides: HashMap::new(),
                consumed: RefCell::new(Vec::new()),
                committed_targets: RefCell::new(Vec::new()),
                committed_toolchains: RefCell::new(Vec::new()),
                default_scopes: RefCell::new(HashMap::new()),
                exec_output: String::new(),
            }
        }
    }

    impl EvalHost for TestHost {
        fn import(&mut self, _path: &str, _from_dir: &str, at: Location) -> Result<ScopeRef, Err> {
            Err(Err::generator("import not supported in test host").at(at))
        }
        fn source_root(&self) -> &std::path::Path {
            &self.settings.source_root
        }
        fn current_dir(&self) -> SmolStr {
            SmolStr::new("lib/widget")
        }
        fn current_toolchain(&self) -> SmolStr {
            self.settings.toolchain.clone()
        }
        fn build_dir(&self) -> SmolStr {
            self.settings.build_dir.clone()
        }
        fn intern_label(&mut self, dir: &str, name: &str, toolchain: &str) -> Label {
            self.labels.intern(dir, name, toolchain)
        }
        fn commit_target(&mut self, target: PendingTarget) -> Result<(), Err> {
            self.committed_targets.borrow_mut().push(target);
            Ok(())
        }
        fn commit_toolchain(&mut self, toolchain: ToolchainDecl) -> Result<(), Err> {
            self.committed_toolchains.borrow_mut().push(toolchain);
            Ok(())
        }
        fn register_default_scope(&mut self, target_type: &str, scope: ScopeRef) {
            self.default_scopes.borrow_mut().insert(target_type.to_string(), scope);
        }
        fn default_scope(&self, target_type: &str) -> Option<ScopeRef> {
            self.default_scopes.borrow().get(target_type).cloned()
        }
        fn declared_arg_override(&self, name: &str) -> Option<Value> {
            self.overrides.get(name).cloned()
        }
        fn mark_arg_consumed(&mut self, name: &str) {
            self.consumed.borrow_mut().push(name.to_string());
        }
        fn target_outputs(&self, label: &str) -> Option<Vec<SmolStr>> {
            if label == "//lib/widget:known" {
                Some(vec![SmolStr::new("out/Default/known.a")])
            } else {
                None
            }
        }
        fn read_file(&mut self, _path: &str, at: Location) -> Result<String, Err> {
            Err(Err::io("read_file not supported in test host").at(at))
        }
        fn write_file(&mut self, _path: &str, _content: &str, at: Location) -> Result<(), Err> {
            Err(Err::io("write_file not supported in test host").at(at))
        }
        fn exec_script(&mut self, _s: &str, _a: &[String], _i: &[String], _at: Location) -> Result<String, Err> {
            Ok(self.exec_output.clone())
        }
    }

    fn run(host: &mut TestHost, src: &str) -> Result<ScopeRef, Err> {
        let program = parse_program(src).unwrap();
        let root = Scope::root(host.settings.clone());
        let mut eval = Evaluator::new(host);
        eval.eval_program(&program, &root)?;
        Ok(root)
    }

    #[test]
    fn declare_args_uses_external_override() {
        let mut host = TestHost::new();
        host.overrides.insert("is_debug".to_string(), Value::boolean(false, Location::new(1, 1)));
        let scope = run(&mut host, "declare_args() {\n  is_debug = true\n}\nused = is_debug\n").unwrap();
        let v = Scope::get(&scope, "used").unwrap();
        assert!(!v.as_boolean().unwrap());
        assert_eq!(*host.consumed.borrow(), vec!["is_debug".to_string()]);
    }

    #[test]
    fn declare_args_keeps_default_without_override() {
        let mut host = TestHost::new();
        let scope = run(&mut host, "declare_args() {\n  level = 3\n}\nused = level\n").unwrap();
        let v = Scope::get(&scope, "used").unwrap();
        assert_eq!(v.as_integer().unwrap(), 3);
    }

    #[test]
    fn not_needed_exempts_listed_variables() {
        let mut host = TestHost::new();
        let scope = run(&mut host, "a = 1\nb = 2\nnot_needed([\"a\", \"b\"])\n").unwrap();
        assert!(Scope::check_for_unused_vars(&scope).is_ok());
    }

    #[test]
    fn forward_variables_from_copies_and_marks_used() {
        let mut host = TestHost::new();
        let scope = run(
            &mut host,
            "template(\"t\") {\n  forward_variables_from(invoker, \"*\")\n  assert(cflags[0] == \"-O2\")\n}\nt(\"x\") {\n  cflags = [\"-O2\"]\n}\n",
        )
        .unwrap();
        assert!(Scope::check_for_unused_vars(&scope).is_ok());
    }

    #[test]
    fn defined_does_not_mark_use() {
        let mut host = TestHost::new();
        let scope = run(&mut host, "a = 1\nb = defined(a)\nassert(b)\n").unwrap();
        // `defined()` answers without marking `a` used, so the hygiene check
        // still reports it as unread.
        let err = Scope::check_for_unused_vars(&scope).unwrap_err();
        assert!(format!("{err}").contains("unused variable"));
    }

    #[test]
    fn get_path_info_extracts_file_parts() {
        let mut host = TestHost::new();
        let scope = run(
            &mut host,
            "f = get_path_info(\"src/foo.cc\", \"file\")\nn = get_path_info(\"src/foo.cc\", \"name\")\ne = get_path_info(\"src/foo.cc\", \"extension\")\n",
        )
        .unwrap();
        assert_eq!(Scope::get(&scope, "f").unwrap().as_str().unwrap(), "foo.cc");
        assert_eq!(Scope::get(&scope, "n").unwrap().as_str().unwrap(), "foo");
        assert_eq!(Scope::get(&scope, "e").unwrap().as_str().unwrap(), "cc");
    }

    #[test]
    fn rebase_path_computes_relative_path() {
        let mut host = TestHost::new();
        let scope = run(
            &mut host,
            "r = rebase_path(\"//lib/widget/foo.cc\", \"//lib/other\")\n",
        )
        .unwrap();
        assert_eq!(Scope::get(&scope, "r").unwrap().as_str().unwrap(), "../widget/foo.cc");
    }

    #[test]
    fn exec_script_json_processor_builds_scope() {
        let mut host = TestHost::new();
        host.exec_output = r#"{"name": "widget", "count": 3, "tags": ["a", "b"]}"#.to_string();
        let scope = run(
            &mut host,
            "r = exec_script(\"gen.py\", [], \"json\")\nname = r.name\ncount = r.count\ntags = r.tags\n",
        )
        .unwrap();
        assert_eq!(Scope::get(&scope, "name").unwrap().as_str().unwrap(), "widget");
        assert_eq!(Scope::get(&scope, "count").unwrap().as_integer().unwrap(), 3);
        assert_eq!(Scope::get(&scope, "tags").unwrap().as_list().unwrap().len(), 2);
    }

    #[test]
    fn toolchain_commits_flattened_settings() {
        let mut host = TestHost::new();
        run(&mut host, "toolchain(\"gcc\") {\n  cc = \"gcc\"\n  cxx = \"g++\"\n}\n").unwrap();
        let toolchains = host.committed_toolchains.borrow();
        assert_eq!(toolchains.len(), 1);
        let names: Vec<&str> = toolchains[0].settings.iter().map(|(k, _)| k.as_str()).collect();
        assert!(names.contains(&"cc"));
        assert!(names.contains(&"cxx"));
    }

    #[test]
    fn executable_commits_target_with_sources_and_deps() {
        let mut host = TestHost::new();
        run(
            &mut host,
            "executable(\"widget\") {\n  sources = [\"a.cc\", \"b.cc\"]\n  deps = [\"//lib/other:other\"]\n}\n",
        )
        .unwrap();
        let targets = host.committed_targets.borrow();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].sources.len(), 2);
        assert_eq!(targets[0].private_deps.len(), 1);
        assert_eq!(targets[0].target_type, TargetType::Executable);
    }

    #[test]
    fn unrecognized_target_field_is_reported_unused() {
        let mut host = TestHost::new();
        let err = run(&mut host, "executable(\"widget\") {\n  typo_field = 1\n}\n").unwrap_err();
        assert!(format!("{err}").contains("unused variable"));
    }

    #[test]
    fn set_defaults_lands_on_a_bare_target_invocation() {
        let mut host = TestHost::new();
        run(
            &mut host,
            "set_defaults(\"static_library\") {\n  configs = [\"//build:warnings\"]\n}\nstatic_library(\"widget\") {}\n",
        )
        .unwrap();
        let targets = host.committed_targets.borrow();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].target_type, TargetType::StaticLibrary);
        assert_eq!(targets[0].configs, vec![SmolStr::new("//build:warnings")]);
    }

    #[test]
    fn set_defaults_can_be_extended_with_compound_assignment() {
        let mut host = TestHost::new();
        run(
            &mut host,
            "set_defaults(\"static_library\") {\n  configs = [\"//build:warnings\"]\n}\nstatic_library(\"widget\") {\n  configs += [\"//build:custom\"]\n}\n",
        )
        .unwrap();
        let targets = host.committed_targets.borrow();
        assert_eq!(
            targets[0].configs,
            vec![SmolStr::new("//build:warnings"), SmolStr::new("//build:custom")]
        );
    }
}
