//! Tree-walking evaluator (`spec.md` §4.3).
//!
//! Mirrors the shape of `n2o5`'s ninja-value expansion (`expand_build`/
//! `expand_phony` in `cli/src/ninja/parser.rs`): one function per AST node
//! kind producing a `Value`, threaded through a scope. Everything the
//! evaluator needs from the outside world (loading another file, writing a
//! target into the graph, touching the filesystem) goes through the
//! [`EvalHost`] trait so this module stays ignorant of the loader and
//! resolver it runs inside of.

use std::path::Path;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::ast::{Accessor, AssignOp, BinaryOp, Block, Expr, Program, Spanned, Stmt, StringChunk, Template, UnaryOp};
use crate::builtins;
use crate::error::{Err, Location};
use crate::scope::{Scope, ScopeKind, ScopeRef, SetOptions};
use crate::target::{Label, PendingTarget, ToolchainDecl};
use crate::value::Value;

/// Everything the evaluator needs from its environment. Implemented by the
/// loader (`loader.rs`), which owns the label table, the target graph, and
/// file I/O.
pub trait EvalHost {
    /// Resolve `path` (absolute `//`-rooted or relative to `from_dir`),
    /// ensure it is loaded exactly once, and return its top-level scope.
    fn import(&mut self, path: &str, from_dir: &str, at: Location) -> Result<ScopeRef, Err>;

    fn source_root(&self) -> &Path;
    fn current_dir(&self) -> SmolStr;
    fn current_toolchain(&self) -> SmolStr;
    fn build_dir(&self) -> SmolStr;

    fn intern_label(&mut self, dir: &str, name: &str, toolchain: &str) -> Label;

    fn commit_target(&mut self, target: PendingTarget) -> Result<(), Err>;
    fn commit_toolchain(&mut self, toolchain: ToolchainDecl) -> Result<(), Err>;
    fn register_default_scope(&mut self, target_type: &str, scope: ScopeRef);
    fn default_scope(&self, target_type: &str) -> Option<ScopeRef>;

    /// An externally-supplied override for a `declare_args()` value (from
    /// `--args=<kv>` or the dotfile), if any.
    fn declared_arg_override(&self, name: &str) -> Option<Value>;

    /// Record that `declare_args()` consumed an override for `name`, so an
    /// override that is never declared anywhere can be flagged at emission
    /// time (`spec.md` §4.4).
    fn mark_arg_consumed(&mut self, name: &str);

    /// The `outputs` of an already-committed target, for
    /// `get_target_outputs()`. `None` if `label` has not been committed yet.
    fn target_outputs(&self, label: &str) -> Option<Vec<SmolStr>>;

    fn read_file(&mut self, path: &str, at: Location) -> Result<String, Err>;
    fn write_file(&mut self, path: &str, content: &str, at: Location) -> Result<(), Err>;
    fn exec_script(
        &mut self,
        script: &str,
        args: &[String],
        input_files: &[String],
        at: Location,
    ) -> Result<String, Err>;
}

/// Controls what `=` does to a name that is already bound in an enclosing
/// scope. `spec.md` §4.3: "`if`/`else`... each branch runs in a fresh child
/// scope that shares writes through the `SET_TO_ENCLOSING` discipline."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignDiscipline {
    Default,
    SetToEnclosing,
}

pub struct Evaluator<'h> {
    pub host: &'h mut dyn EvalHost,
}

impl<'h> Evaluator<'h> {
    pub fn new(host: &'h mut dyn EvalHost) -> Self {
        Self { host }
    }

    pub fn eval_program(&mut self, program: &Program, scope: &ScopeRef) -> Result<(), Err> {
        self.eval_stmts(&program.statements, scope, AssignDiscipline::Default)
    }

    pub fn eval_block(&mut self, block: &Block, scope: &ScopeRef, discipline: AssignDiscipline) -> Result<(), Err> {
        self.eval_stmts(&block.statements, scope, discipline)
    }

    fn eval_stmts(&mut self, stmts: &[Spanned<Stmt>], scope: &ScopeRef, discipline: AssignDiscipline) -> Result<(), Err> {
        for stmt in stmts {
            self.eval_stmt(stmt, scope, discipline)?;
        }
        Ok(())
    }

    fn eval_stmt(&mut self, stmt: &Spanned<Stmt>, scope: &ScopeRef, discipline: AssignDiscipline) -> Result<(), Err> {
        match &stmt.node {
            Stmt::Assign { target, target_location, op, value } => {
                let val = self.eval_expr(value, scope)?;
                match op {
                    AssignOp::Set => {
                        let opts = match discipline {
                            AssignDiscipline::Default => SetOptions::Default,
                            AssignDiscipline::SetToEnclosing => SetOptions::SetToEnclosing,
                        };
                        Scope::set(scope, target, val, *target_location, opts)
                    }
                    AssignOp::Add | AssignOp::Sub => {
                        let current = Scope::get(scope, target).ok_or_else(|| {
                            Err::name(format!("`{target}` is not defined")).at(*target_location)
                        })?;
                        let combined = if *op == AssignOp::Add {
                            current.add(&val, *target_location)?
                        } else {
                            current.sub(&val, *target_location)?
                        };
                        Scope::set(scope, target, combined, *target_location, SetOptions::SetToEnclosing)
                    }
                }
            }
            Stmt::Expr(expr) => self.eval_expr(expr, scope).map(|_| ()),
            Stmt::If { branches, else_branch } => {
                for (cond, body) in branches {
                    let cond_val = self.eval_expr(cond, scope)?;
                    let taken = cond_val.as_boolean().map_err(|_| {
                        Err::type_error("if condition must be a boolean").at(cond.location())
                    })?;
                    if taken {
                        let child = Scope::child(scope);
                        self.eval_block(body, &child, AssignDiscipline::SetToEnclosing)?;
                        return Scope::check_for_unused_vars(&child);
                    }
                }
                if let Some(body) = else_branch {
                    let child = Scope::child(scope);
                    self.eval_block(body, &child, AssignDiscipline::SetToEnclosing)?;
                    Scope::check_for_unused_vars(&child)?;
                }
                Ok(())
            }
            Stmt::Foreach { binding, list, body } => {
                let list_val = self.eval_expr(list, scope)?;
                let items = list_val.as_list()?.to_vec();
                for item in items {
                    let child = Scope::child(scope);
                    Scope::set(&child, binding, item, list.location(), SetOptions::Overwrite)?;
                    // The loop cursor is control flow, not a user declaration
                    // the hygiene check should chase; see DESIGN.md.
                    Scope::mark_used(&child, binding);
                    self.eval_block(body, &child, AssignDiscipline::Default)?;
                    Scope::check_for_unused_vars(&child)?;
                }
                Ok(())
            }
        }
    }

    pub fn eval_expr(&mut self, expr: &Spanned<Expr>, scope: &ScopeRef) -> Result<Value, Err> {
        let loc = expr.location();
        match &expr.node {
            Expr::None => Ok(Value::none(loc)),
            Expr::Integer(v) => Ok(Value::integer(*v, loc)),
            Expr::Boolean(v) => Ok(Value::boolean(*v, loc)),
            Expr::StringLiteral(chunks) => self.eval_string(chunks, scope, loc),
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval_expr(item, scope)?);
                }
                Ok(Value::list(out, loc))
            }
            Expr::ScopeLiteral(block) => {
                let child = Scope::child(scope);
                self.eval_block(block, &child, AssignDiscipline::Default)?;
                Scope::check_for_unused_vars(&child)?;
                Ok(Value::scope(child, loc))
            }
            Expr::Identifier(name) => Scope::get(scope, name)
                .ok_or_else(|| Err::name(format!("undefined identifier `{name}`")).at(loc)),
            Expr::Unary { op, operand } => {
                let v = self.eval_expr(operand, scope)?;
                match op {
                    UnaryOp::Not => Ok(Value::boolean(!v.as_boolean()?, loc)),
                }
            }
            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, scope, loc),
            Expr::Accessor { base, accessor } => self.eval_accessor(base, accessor, scope, loc),
            Expr::Call { name, args, block } => self.eval_call(name, args, block.as_ref(), scope, loc),
        }
    }

    fn eval_string(&mut self, chunks: &[StringChunk], scope: &ScopeRef, loc: Location) -> Result<Value, Err> {
        let mut out = String::new();
        for chunk in chunks {
            match chunk {
                StringChunk::Literal(s) => out.push_str(s),
                StringChunk::Var(name) => {
                    let v = Scope::get(scope, name)
                        .ok_or_else(|| Err::name(format!("undefined identifier `{name}`")).at(loc))?;
                    out.push_str(&v.coerce_to_string()?);
                }
                StringChunk::Expr(expr) => {
                    let v = self.eval_expr(expr, scope)?;
                    out.push_str(&v.coerce_to_string()?);
                }
            }
        }
        Ok(Value::string(out, loc))
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Spanned<Expr>,
        rhs: &Spanned<Expr>,
        scope: &ScopeRef,
        loc: Location,
    ) -> Result<Value, Err> {
        match op {
            BinaryOp::And => {
                let l = self.eval_expr(lhs, scope)?;
                if !l.as_boolean()? {
                    return Ok(Value::boolean(false, loc));
                }
                let r = self.eval_expr(rhs, scope)?;
                Ok(Value::boolean(r.as_boolean()?, loc))
            }
            BinaryOp::Or => {
                let l = self.eval_expr(lhs, scope)?;
                if l.as_boolean()? {
                    return Ok(Value::boolean(true, loc));
                }
                let r = self.eval_expr(rhs, scope)?;
                Ok(Value::boolean(r.as_boolean()?, loc))
            }
            BinaryOp::Add => {
                let l = self.eval_expr(lhs, scope)?;
                let r = self.eval_expr(rhs, scope)?;
                l.add(&r, loc)
            }
            BinaryOp::Sub => {
                let l = self.eval_expr(lhs, scope)?;
                let r = self.eval_expr(rhs, scope)?;
                l.sub(&r, loc)
            }
            BinaryOp::Eq => {
                let l = self.eval_expr(lhs, scope)?;
                let r = self.eval_expr(rhs, scope)?;
                Ok(Value::boolean(l.value_eq(&r), loc))
            }
            BinaryOp::Ne => {
                let l = self.eval_expr(lhs, scope)?;
                let r = self.eval_expr(rhs, scope)?;
                Ok(Value::boolean(!l.value_eq(&r), loc))
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let l = self.eval_expr(lhs, scope)?.as_integer()?;
                let r = self.eval_expr(rhs, scope)?.as_integer()?;
                let result = match op {
                    BinaryOp::Lt => l < r,
                    BinaryOp::Le => l <= r,
                    BinaryOp::Gt => l > r,
                    BinaryOp::Ge => l >= r,
                    _ => unreachable!(),
                };
                Ok(Value::boolean(result, loc))
            }
        }
    }

    fn eval_accessor(
        &mut self,
        base: &Spanned<Expr>,
        accessor: &Accessor,
        scope: &ScopeRef,
        loc: Location,
    ) -> Result<Value, Err> {
        match accessor {
            Accessor::Field(name) => {
                let base_val = self.eval_expr(base, scope)?;
                let base_scope = base_val.as_scope()?;
                Scope::get(base_scope, name)
                    .ok_or_else(|| Err::name(format!("undefined field `{name}`")).at(loc))
            }
            Accessor::Index(index_expr) => {
                let base_val = self.eval_expr(base, scope)?;
                let list = base_val.as_list()?;
                let index = self.eval_expr(index_expr, scope)?.as_integer()?;
                if index < 0 || index as usize >= list.len() {
                    return Err(Err::generator(format!(
                        "list index {index} out of range (length {})",
                        list.len()
                    ))
                    .at(loc));
                }
                Ok(list[index as usize].clone())
            }
        }
    }

    fn eval_call(
        &mut self,
        name: &str,
        args: &[Spanned<Expr>],
        block: Option<&Block>,
        scope: &ScopeRef,
        loc: Location,
    ) -> Result<Value, Err> {
        if let Some(result) = builtins::dispatch(self, name, args, block, scope, loc) {
            return result;
        }
        if let Some(template) = Scope::lookup_template(scope, name) {
            return self.invoke_template(&template, args, block, scope, loc);
        }
        Err(Err::name(format!("undefined function or template `{name}`")).at(loc))
    }

    /// `name("inst") { block }`: `spec.md` §4.4. Creates a fresh scope whose
    /// parent is the template's capture scope, pre-binds `target_name` and
    /// the `invoker` pseudo-scope, then runs the body.
    fn invoke_template(
        &mut self,
        template: &Rc<Template>,
        args: &[Spanned<Expr>],
        block: Option<&Block>,
        caller_scope: &ScopeRef,
        loc: Location,
    ) -> Result<Value, Err> {
        if args.len() != 1 {
            return Err(Err::type_error(format!(
                "template `{}` takes exactly one argument (the instance name), got {}",
                template.name,
                args.len()
            ))
            .at(loc));
        }
        let instance_name = self.eval_expr(&args[0], caller_scope)?;
        let instance_name_str = instance_name.as_str()?.to_string();

        let invoker = Scope::child(caller_scope);
        if let Some(block) = block {
            self.eval_block(block, &invoker, AssignDiscipline::Default)?;
        }
        Scope::mark_all_used(&invoker);

        let instance = Scope::child_with_kind(&template.defining_scope, ScopeKind::Normal);
        Scope::set(
            &instance,
            "target_name",
            Value::string(instance_name_str, loc),
            loc,
            SetOptions::Overwrite,
        )?;
        Scope::set(&instance, "invoker", Value::scope(invoker, loc), loc, SetOptions::Overwrite)?;
        Scope::mark_used(&instance, "invoker");
        Scope::mark_used(&instance, "target_name");

        self.eval_block(&template.body, &instance, AssignDiscipline::Default)?;
        Scope::check_for_unused_vars(&instance)?;
        Ok(Value::none(loc))
    }

    /// Target-declaring functions (`executable`, `action`, ...) and
    /// `toolchain(...)` share this shape: take one string argument (the
    /// instance name), enter a fresh scope pre-bound with the location
    /// context, run the body, and hand the finished scope to a caller-
    /// supplied commit function. Used by `builtins.rs`.
    pub fn eval_declaration_body(
        &mut self,
        args: &[Spanned<Expr>],
        block: Option<&Block>,
        caller_scope: &ScopeRef,
        loc: Location,
        prebind: impl FnOnce(&ScopeRef, &str) -> Result<(), Err>,
    ) -> Result<(String, ScopeRef), Err> {
        if args.len() != 1 {
            return Err(Err::type_error("expected exactly one argument: the instance name").at(loc));
        }
        let name_val = self.eval_expr(&args[0], caller_scope)?;
        let name = name_val.as_str()?.to_string();
        let decl_scope = Scope::child(caller_scope);
        prebind(&decl_scope, &name)?;
        if let Some(block) = block {
            self.eval_block(block, &decl_scope, AssignDiscipline::Default)?;
        }
        Ok((name, decl_scope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;
    use crate::scope::Settings;
    use std::cell::RefCell;
    use std::path::PathBuf;

    struct NullHost {
        settings: std::rc::Rc<Settings>,
        labels: crate::target::LabelTable,
        stdout: RefCell<String>,
    }

    impl NullHost {
        fn new() -> Self {
            Self {
                settings: std::rc::Rc::new(Settings {
                    source_root: PathBuf::from("/src"),
                    toolchain: SmolStr::new("//toolchain:default"),
                    build_dir: SmolStr::new("out/Default"),
                }),
                labels: crate::target::LabelTable::new(),
                stdout: RefCell::new(String::new()),
            }
        }
    }

    impl EvalHost for NullHost {
        fn import(&mut self, _path: &str, _from_dir: &str, at: Location) -> Result<ScopeRef, Err> {
            Err(Err::generator("import not supported in test host").at(at))
        }
        fn source_root(&self) -> &Path {
            &self.settings.source_root
        }
        fn current_dir(&self) -> SmolStr {
            SmolStr::new("")
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
        fn commit_target(&mut self, _target: PendingTarget) -> Result<(), Err> {
            Ok(())
        }
        fn commit_toolchain(&mut self, _toolchain: ToolchainDecl) -> Result<(), Err> {
            Ok(())
        }
        fn register_default_scope(&mut self, _target_type: &str, _scope: ScopeRef) {}
        fn default_scope(&self, _target_type: &str) -> Option<ScopeRef> {
            None
        }
        fn declared_arg_override(&self, _name: &str) -> Option<Value> {
            None
        }
        fn mark_arg_consumed(&mut self, _name: &str) {}
        fn target_outputs(&self, _label: &str) -> Option<Vec<SmolStr>> {
            None
        }
        fn read_file(&mut self, _path: &str, at: Location) -> Result<String, Err> {
            Err(Err::io("read_file not supported in test host").at(at))
        }
        fn write_file(&mut self, _path: &str, _content: &str, at: Location) -> Result<(), Err> {
            Err(Err::io("write_file not supported in test host").at(at))
        }
        fn exec_script(&mut self, _s: &str, _a: &[String], _i: &[String], at: Location) -> Result<String, Err> {
            Err(Err::io("exec_script not supported in test host").at(at))
        }
    }

    fn run(src: &str) -> Result<ScopeRef, Err> {
        let mut host = NullHost::new();
        let program = parse_program(src).unwrap();
        let root = Scope::root(host.settings.clone());
        {
            let mut eval = Evaluator::new(&mut host);
            eval.eval_program(&program, &root)?;
        }
        Ok(root)
    }

    #[test]
    fn simple_assign_and_read() {
        let scope = run("a = 1\nb = a + 2\n").unwrap();
        let b = Scope::get(&scope, "b").unwrap();
        assert_eq!(b.as_integer().unwrap(), 3);
    }

    #[test]
    fn unused_declaration_is_an_error() {
        let mut host = NullHost::new();
        let program = parse_program("a = 1\nb = 2\nc = b\n").unwrap();
        let root = Scope::root(host.settings.clone());
        {
            let mut eval = Evaluator::new(&mut host);
            eval.eval_program(&program, &root).unwrap();
        }
        let err = Scope::check_for_unused_vars(&root).unwrap_err();
        assert!(format!("{err}").contains("a"));
    }

    #[test]
    fn template_hides_internal_variable() {
        let scope = run("a = 1\ntemplate(\"t\") {\n  b = a\n}\nt(\"x\") {}\n").unwrap();
        assert!(Scope::check_for_unused_vars(&scope).is_ok());
    }

    #[test]
    fn if_else_writes_through_to_enclosing_scope() {
        let scope = run("cond = true\nif (cond) {\n  x = 1\n} else {\n  x = 2\n}\ny = x\n").unwrap();
        let y = Scope::get(&scope, "y").unwrap();
        assert_eq!(y.as_integer().unwrap(), 1);
    }

    #[test]
    fn condition_requires_boolean() {
        let mut host = NullHost::new();
        let program = parse_program("if (1) { x = 1 }\n").unwrap();
        let root = Scope::root(host.settings.clone());
        let mut eval = Evaluator::new(&mut host);
        let err = eval.eval_program(&program, &root).unwrap_err();
        assert!(format!("{err}").contains("boolean"));
    }
}
