//! Lexical environments (`spec.md` §3 "Scope", §4.2).
//!
//! Grounded on `n2o5`'s `Scope`/`ExpansionScope` lookup-chain
//! (`cli/src/ninja/model.rs`), generalized from Ninja's flat string-only
//! scope to a full parent-chain environment with per-variable usage
//! tracking. Parent links are `Weak`: a child scope never keeps its parent
//! alive, which is how `spec.md` §9 "Cyclic scope references" breaks the
//! scope → value → scope cycle that templates and captured closures would
//! otherwise create.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::ast::Template;
use crate::error::{Err, Location};
use crate::value::Value;

pub type ScopeRef = Rc<RefCell<Scope>>;

/// Settings shared by every scope descended from a given root: the project
/// source root, the toolchain this scope is being evaluated under, and the
/// build directory. `spec.md` §3 "Scope" lists these as a reference each
/// scope carries rather than recomputing.
#[derive(Debug, Clone)]
pub struct Settings {
    pub source_root: PathBuf,
    pub toolchain: SmolStr,
    pub build_dir: SmolStr,
}

#[derive(Debug, Clone)]
struct Binding {
    value: Value,
    used: bool,
    declared_at: Location,
    /// Set by `mark_used`/`not_needed`/import-whitelisting; bypasses the
    /// unused-variable check independent of `used`.
    exempt: bool,
}

/// Why a scope is exempt from (or defers) the unused-variable check,
/// per `spec.md` §4.2 "Usage checking".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Normal,
    /// Body of a `template(...) { ... }` declaration: checking is deferred
    /// to the instantiation site.
    TemplateDefinition,
    /// Top-level scope of a file reached through `import()`: every name is
    /// implicitly whitelisted since the importer decides what it needs.
    Imported,
}

/// Controls how `Scope::set` resolves which frame a write lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOptions {
    /// Write into the current scope, shadowing rules applied normally.
    Default,
    /// Write into the nearest enclosing scope that already defines the
    /// name, used by `+=`/`-=` so accumulation targets the binding site
    /// rather than creating a new shadow in the current block.
    SetToEnclosing,
    /// Bypass the shadowing-of-non-`none` check (used for `set_defaults`
    /// copy-in and template parameter pre-binding).
    Overwrite,
}

#[derive(Debug)]
pub struct Scope {
    bindings: IndexMap<SmolStr, Binding>,
    parent: Option<Weak<RefCell<Scope>>>,
    templates: IndexMap<SmolStr, Rc<Template>>,
    settings: Rc<Settings>,
    is_root: bool,
    kind: ScopeKind,
}

impl Scope {
    pub fn root(settings: Rc<Settings>) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            bindings: IndexMap::new(),
            parent: None,
            templates: IndexMap::new(),
            settings,
            is_root: true,
            kind: ScopeKind::Normal,
        }))
    }

    pub fn child(parent: &ScopeRef) -> ScopeRef {
        Self::child_with_kind(parent, ScopeKind::Normal)
    }

    pub fn child_with_kind(parent: &ScopeRef, kind: ScopeKind) -> ScopeRef {
        let settings = parent.borrow().settings.clone();
        Rc::new(RefCell::new(Scope {
            bindings: IndexMap::new(),
            parent: Some(Rc::downgrade(parent)),
            templates: IndexMap::new(),
            settings,
            is_root: false,
            kind,
        }))
    }

    pub fn settings(&self) -> &Rc<Settings> {
        &self.settings
    }

    pub fn is_root_scope(&self) -> bool {
        self.is_root
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    fn parent_scope(&self) -> Option<ScopeRef> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// `Get(name)`: walks the enclosing chain, marking the found binding
    /// used as a side effect (lookup *is* use, per `spec.md` §4.2).
    pub fn get(this: &ScopeRef, name: &str) -> Option<Value> {
        if let Some(binding) = this.borrow_mut().bindings.get_mut(name) {
            binding.used = true;
            return Some(binding.value.clone());
        }
        let parent = this.borrow().parent_scope();
        parent.and_then(|p| Scope::get(&p, name))
    }

    /// `defined(name)`: presence test without marking use.
    pub fn is_defined(this: &ScopeRef, name: &str) -> bool {
        if this.borrow().bindings.contains_key(name) {
            return true;
        }
        match this.borrow().parent_scope() {
            Some(p) => Scope::is_defined(&p, name),
            None => false,
        }
    }

    pub fn declared_at(this: &ScopeRef, name: &str) -> Option<Location> {
        if let Some(b) = this.borrow().bindings.get(name) {
            return Some(b.declared_at);
        }
        match this.borrow().parent_scope() {
            Some(p) => Scope::declared_at(&p, name),
            None => None,
        }
    }

    /// `Set(name, value, options)`. Re-declaring a name already bound in an
    /// enclosing scope is an error unless the existing value is `none` or
    /// `options` is `Overwrite` (`spec.md` §4.2 "Shadowing rule").
    pub fn set(
        this: &ScopeRef,
        name: &str,
        value: Value,
        declared_at: Location,
        options: SetOptions,
    ) -> Result<(), Err> {
        if options == SetOptions::SetToEnclosing {
            if let Some(target) = find_defining_scope(this, name) {
                target.borrow_mut().bindings.insert(
                    SmolStr::new(name),
                    Binding {
                        value,
                        used: false,
                        declared_at,
                        exempt: false,
                    },
                );
                return Ok(());
            }
            // No enclosing definition yet: fall through to a plain define.
        }

        if options != SetOptions::Overwrite {
            if let Some(existing_loc) = Scope::declared_at(this, name) {
                let shadows_enclosing = !this.borrow().bindings.contains_key(name);
                let existing_is_none = this
                    .borrow()
                    .bindings
                    .get(name)
                    .map(|b| b.value.is_none())
                    .unwrap_or_else(|| {
                        find_defining_scope(this, name)
                            .map(|s| s.borrow().bindings[name].value.is_none())
                            .unwrap_or(true)
                    });
                if shadows_enclosing && !existing_is_none {
                    return Err(Err::name(format!(
                        "cannot redeclare `{name}`, already defined"
                    ))
                    .at(declared_at)
                    .with_sub_message(Some(existing_loc), "previously defined here"));
                }
                if !shadows_enclosing && !existing_is_none {
                    return Err(Err::name(format!(
                        "cannot redeclare `{name}`, already defined"
                    ))
                    .at(declared_at)
                    .with_sub_message(Some(existing_loc), "previously defined here"));
                }
            }
        }

        this.borrow_mut().bindings.insert(
            SmolStr::new(name),
            Binding {
                value,
                used: false,
                declared_at,
                exempt: false,
            },
        );
        Ok(())
    }

    pub fn mark_used(this: &ScopeRef, name: &str) {
        if let Some(b) = this.borrow_mut().bindings.get_mut(name) {
            b.exempt = true;
        }
    }

    pub fn mark_all_used(this: &ScopeRef) {
        for b in this.borrow_mut().bindings.values_mut() {
            b.exempt = true;
        }
    }

    /// Every name directly declared in this scope (not its ancestors), in
    /// declaration order. Used by `forward_variables_from(from, "*")` and by
    /// the toolchain builtin, which flattens a declared scope's string
    /// bindings into settings.
    pub fn binding_names(this: &ScopeRef) -> Vec<SmolStr> {
        this.borrow().bindings.keys().cloned().collect()
    }

    pub fn define_template(this: &ScopeRef, name: &str, template: Rc<Template>) {
        this.borrow_mut()
            .templates
            .insert(SmolStr::new(name), template);
    }

    pub fn lookup_template(this: &ScopeRef, name: &str) -> Option<Rc<Template>> {
        if let Some(t) = this.borrow().templates.get(name) {
            return Some(t.clone());
        }
        match this.borrow().parent_scope() {
            Some(p) => Scope::lookup_template(&p, name),
            None => None,
        }
    }

    /// Copy every top-level binding and template of `source` into `this`,
    /// used by `import()`. Imported bindings are pre-marked `exempt` in the
    /// *importing* scope's bookkeeping sense: they came from a scope whose
    /// own usage was already checked when it was first loaded.
    pub fn import_from(this: &ScopeRef, source: &ScopeRef) -> Result<(), Err> {
        let (bindings, templates): (Vec<_>, Vec<_>) = {
            let src = source.borrow();
            (
                src.bindings
                    .iter()
                    .map(|(k, v)| (k.clone(), v.value.clone(), v.declared_at))
                    .collect(),
                src.templates
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            )
        };
        for (name, value, declared_at) in bindings {
            Scope::set(this, &name, value, declared_at, SetOptions::Overwrite)?;
            Scope::mark_used(this, &name);
        }
        for (name, template) in templates {
            Scope::define_template(this, &name, template);
        }
        Ok(())
    }

    /// `CheckForUnusedVars`: called when a scope is about to be destroyed.
    /// Returns every unused, non-exempt, user-declared binding.
    pub fn check_for_unused_vars(this: &ScopeRef) -> Result<(), Err> {
        let this_ref = this.borrow();
        if matches!(this_ref.kind, ScopeKind::TemplateDefinition | ScopeKind::Imported) {
            return Ok(());
        }
        for (name, binding) in this_ref.bindings.iter() {
            if !binding.used && !binding.exempt {
                return Err(Err::usage(format!("unused variable `{name}`")).at(binding.declared_at));
            }
        }
        Ok(())
    }
}

fn find_defining_scope(this: &ScopeRef, name: &str) -> Option<ScopeRef> {
    if this.borrow().bindings.contains_key(name) {
        return Some(this.clone());
    }
    let parent = this.borrow().parent_scope()?;
    find_defining_scope(&parent, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn settings() -> Rc<Settings> {
        Rc::new(Settings {
            source_root: PathBuf::from("/src"),
            toolchain: SmolStr::new("//toolchain:default"),
            build_dir: SmolStr::new("out/Default"),
        })
    }

    fn loc() -> Location {
        Location::new(1, 1)
    }

    #[test]
    fn unused_variable_is_reported() {
        let root = Scope::root(settings());
        Scope::set(&root, "a", Value::integer(1, loc()), loc(), SetOptions::Default).unwrap();
        let err = Scope::check_for_unused_vars(&root).unwrap_err();
        assert!(format!("{err}").contains("a"));
    }

    #[test]
    fn reading_marks_used() {
        let root = Scope::root(settings());
        Scope::set(&root, "a", Value::integer(1, loc()), loc(), SetOptions::Default).unwrap();
        let _ = Scope::get(&root, "a");
        assert!(Scope::check_for_unused_vars(&root).is_ok());
    }

    #[test]
    fn child_scope_reads_parent() {
        let root = Scope::root(settings());
        Scope::set(&root, "a", Value::integer(5, loc()), loc(), SetOptions::Default).unwrap();
        let child = Scope::child(&root);
        let v = Scope::get(&child, "a").unwrap();
        assert_eq!(v.as_integer().unwrap(), 5);
    }

    #[test]
    fn redeclaring_non_none_is_an_error() {
        let root = Scope::root(settings());
        Scope::set(&root, "a", Value::integer(1, loc()), loc(), SetOptions::Default).unwrap();
        let err = Scope::set(&root, "a", Value::integer(2, loc()), loc(), SetOptions::Default)
            .unwrap_err();
        assert!(format!("{err}").contains("redeclare"));
    }

    #[test]
    fn template_definition_scope_defers_usage_check() {
        let root = Scope::root(settings());
        let body = Scope::child_with_kind(&root, ScopeKind::TemplateDefinition);
        Scope::set(&body, "unused", Value::integer(1, loc()), loc(), SetOptions::Default).unwrap();
        assert!(Scope::check_for_unused_vars(&body).is_ok());
    }
}
