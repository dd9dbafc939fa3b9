//! The tagged value representation (`spec.md` §3 "Value").
//!
//! Grounded on `n2o5`'s `Segment`/`Expandable` approach to cheaply-shared
//! string data (`cli/src/ninja/model.rs`), generalized from Ninja's
//! string-only variable scope to the full `none`/`integer`/`boolean`/
//! `string`/`list`/`scope` value tree this language needs. Lists and scopes
//! use `Rc` so that copy-on-assign semantics are cheap: assigning a list
//! shares the backing storage until something actually mutates it, at which
//! point `Rc::make_mut` gives an owned copy.

use std::rc::Rc;

use smol_str::SmolStr;

use crate::error::{Err, Location};
use crate::scope::ScopeRef;

#[derive(Debug, Clone)]
pub struct Value {
    pub kind: ValueKind,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub enum ValueKind {
    None,
    Integer(i64),
    Boolean(bool),
    String(SmolStr),
    List(Rc<Vec<Value>>),
    Scope(ScopeRef),
}

impl Value {
    pub fn new(kind: ValueKind, location: Location) -> Self {
        Self { kind, location }
    }

    pub fn none(location: Location) -> Self {
        Self::new(ValueKind::None, location)
    }

    pub fn integer(v: i64, location: Location) -> Self {
        Self::new(ValueKind::Integer(v), location)
    }

    pub fn boolean(v: bool, location: Location) -> Self {
        Self::new(ValueKind::Boolean(v), location)
    }

    pub fn string(v: impl Into<SmolStr>, location: Location) -> Self {
        Self::new(ValueKind::String(v.into()), location)
    }

    pub fn list(v: Vec<Value>, location: Location) -> Self {
        Self::new(ValueKind::List(Rc::new(v)), location)
    }

    pub fn scope(v: ScopeRef, location: Location) -> Self {
        Self::new(ValueKind::Scope(v), location)
    }

    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            ValueKind::None => "none",
            ValueKind::Integer(_) => "integer",
            ValueKind::Boolean(_) => "boolean",
            ValueKind::String(_) => "string",
            ValueKind::List(_) => "list",
            ValueKind::Scope(_) => "scope",
        }
    }

    fn type_error(&self, expected: &str) -> Err {
        Err::type_error(format!(
            "expected {expected}, got {} value",
            self.type_name()
        ))
        .at(self.location)
    }

    pub fn as_integer(&self) -> Result<i64, Err> {
        match self.kind {
            ValueKind::Integer(v) => Ok(v),
            _ => Err(self.type_error("integer")),
        }
    }

    pub fn as_boolean(&self) -> Result<bool, Err> {
        match self.kind {
            ValueKind::Boolean(v) => Ok(v),
            _ => Err(self.type_error("boolean")),
        }
    }

    pub fn as_str(&self) -> Result<&str, Err> {
        match &self.kind {
            ValueKind::String(v) => Ok(v.as_str()),
            _ => Err(self.type_error("string")),
        }
    }

    pub fn as_list(&self) -> Result<&[Value], Err> {
        match &self.kind {
            ValueKind::List(v) => Ok(v.as_slice()),
            _ => Err(self.type_error("list")),
        }
    }

    pub fn as_scope(&self) -> Result<&ScopeRef, Err> {
        match &self.kind {
            ValueKind::Scope(v) => Ok(v),
            _ => Err(self.type_error("scope")),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self.kind, ValueKind::None)
    }

    /// Coerce a value to its string representation for use inside a `$`
    /// interpolation, per `spec.md` §4.1: integers decimal, booleans
    /// `true`/`false`, lists get their debug bracketed form, scopes are
    /// rejected.
    pub fn coerce_to_string(&self) -> Result<String, Err> {
        match &self.kind {
            ValueKind::None => Ok(String::new()),
            ValueKind::Integer(v) => Ok(v.to_string()),
            ValueKind::Boolean(v) => Ok(v.to_string()),
            ValueKind::String(v) => Ok(v.to_string()),
            ValueKind::List(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items.iter() {
                    parts.push(item.coerce_to_string()?);
                }
                Ok(format!("[{}]", parts.join(", ")))
            }
            ValueKind::Scope(_) => {
                Err(Err::type_error("cannot interpolate a scope value").at(self.location))
            }
        }
    }

    /// `+`: string concatenation, list append-all, or list+scalar append.
    pub fn add(&self, other: &Value, location: Location) -> Result<Value, Err> {
        match (&self.kind, &other.kind) {
            (ValueKind::Integer(a), ValueKind::Integer(b)) => {
                Ok(Value::integer(a + b, location))
            }
            (ValueKind::String(a), ValueKind::String(b)) => {
                Ok(Value::string(format!("{a}{b}"), location))
            }
            (ValueKind::List(a), ValueKind::List(b)) => {
                let mut out = (**a).clone();
                out.extend(b.iter().cloned());
                Ok(Value::list(out, location))
            }
            (ValueKind::List(a), _) => {
                let mut out = (**a).clone();
                out.push(other.clone());
                Ok(Value::list(out, location))
            }
            _ => Err(Err::type_error(format!(
                "cannot add {} and {} values",
                self.type_name(),
                other.type_name()
            ))
            .at(location)),
        }
    }

    /// `-`: list element removal. Every element of `other` (or `other`
    /// itself, for a scalar) must appear in `self`, preserving hygiene per
    /// `spec.md` §4.3.
    pub fn sub(&self, other: &Value, location: Location) -> Result<Value, Err> {
        match (&self.kind, &other.kind) {
            (ValueKind::Integer(a), ValueKind::Integer(b)) => {
                Ok(Value::integer(a - b, location))
            }
            (ValueKind::List(a), ValueKind::List(b)) => {
                let mut out = (**a).clone();
                for needle in b.iter() {
                    remove_one(&mut out, needle, location)?;
                }
                Ok(Value::list(out, location))
            }
            (ValueKind::List(a), _) => {
                let mut out = (**a).clone();
                remove_one(&mut out, other, location)?;
                Ok(Value::list(out, location))
            }
            _ => Err(Err::type_error(format!(
                "cannot subtract {} from {} values",
                other.type_name(),
                self.type_name()
            ))
            .at(location)),
        }
    }

    pub fn value_eq(&self, other: &Value) -> bool {
        match (&self.kind, &other.kind) {
            (ValueKind::None, ValueKind::None) => true,
            (ValueKind::Integer(a), ValueKind::Integer(b)) => a == b,
            (ValueKind::Boolean(a), ValueKind::Boolean(b)) => a == b,
            (ValueKind::String(a), ValueKind::String(b)) => a == b,
            (ValueKind::List(a), ValueKind::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.value_eq(y))
            }
            (ValueKind::Scope(a), ValueKind::Scope(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn remove_one(out: &mut Vec<Value>, needle: &Value, location: Location) -> Result<(), Err> {
    let pos = out.iter().position(|v| v.value_eq(needle));
    match pos {
        Some(idx) => {
            out.remove(idx);
            Ok(())
        }
        None => Err(Err::generator(format!(
            "value not in list: {}",
            needle.coerce_to_string().unwrap_or_default()
        ))
        .at(location)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> Location {
        Location::new(1, 1)
    }

    #[test]
    fn list_subtraction_removes_matching_element() {
        let l = Value::list(
            vec![
                Value::integer(1, loc()),
                Value::integer(2, loc()),
                Value::integer(3, loc()),
            ],
            loc(),
        );
        let rhs = Value::list(vec![Value::integer(2, loc())], loc());
        let result = l.sub(&rhs, loc()).unwrap();
        let items = result.as_list().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_integer().unwrap(), 1);
        assert_eq!(items[1].as_integer().unwrap(), 3);
    }

    #[test]
    fn list_subtraction_missing_element_errors() {
        let l = Value::list(vec![Value::integer(1, loc())], loc());
        let rhs = Value::list(vec![Value::integer(4, loc())], loc());
        let err = l.sub(&rhs, loc()).unwrap_err();
        assert!(format!("{err}").contains("not in list"));
    }

    #[test]
    fn string_concatenation() {
        let a = Value::string("foo", loc());
        let b = Value::string("bar", loc());
        let result = a.add(&b, loc()).unwrap();
        assert_eq!(result.as_str().unwrap(), "foobar");
    }
}
