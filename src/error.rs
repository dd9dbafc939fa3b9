//! Structured diagnostics.
//!
//! Errors are values, not exceptions: every fallible function in this crate
//! returns `Result<T, Err>` and the evaluator bubbles the first error out of
//! its current statement, per `spec.md` §7.

use std::fmt;

/// A `(line, column)` position in some source text. Both are 1-based to
/// match the caret-range reports users actually read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A contiguous source range, used to underline offending tokens in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: Location,
    pub end: Location,
}

impl Span {
    pub fn new(start: Location, end: Location) -> Self {
        Self { start, end }
    }

    pub fn point(loc: Location) -> Self {
        Self {
            start: loc,
            end: loc,
        }
    }
}

/// The seven error kinds named in `spec.md` §7.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    #[error("{0}")]
    Syntax(String),
    #[error("{0}")]
    Type(String),
    #[error("{0}")]
    Name(String),
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Dependency(String),
    #[error("{0}")]
    Io(String),
    #[error("{0}")]
    Generator(String),
}

/// A structured error: a primary message, a source location, optional
/// ranges, and optional sub-messages (`spec.md` §3).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}")]
pub struct Err {
    pub kind: ErrorKind,
    pub location: Option<Location>,
    pub ranges: Vec<Span>,
    pub sub_messages: Vec<(Option<Location>, String)>,
}

macro_rules! kind_ctor {
    ($name:ident, $variant:ident) => {
        pub fn $name(message: impl Into<String>) -> Self {
            Self {
                kind: ErrorKind::$variant(message.into()),
                location: None,
                ranges: Vec::new(),
                sub_messages: Vec::new(),
            }
        }
    };
}

impl Err {
    kind_ctor!(syntax, Syntax);
    kind_ctor!(type_error, Type);
    kind_ctor!(name, Name);
    kind_ctor!(usage, Usage);
    kind_ctor!(dependency, Dependency);
    kind_ctor!(io, Io);
    kind_ctor!(generator, Generator);

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_range(mut self, span: Span) -> Self {
        self.ranges.push(span);
        self
    }

    pub fn with_sub_message(mut self, location: Option<Location>, message: impl Into<String>) -> Self {
        self.sub_messages.push((location, message.into()));
        self
    }

    /// Format the single user-visible error report: source snippet + caret
    /// range, per `spec.md` §7 "User-visible behavior".
    pub fn report(&self, file_name: &str, source: &str) -> String {
        let mut out = String::new();
        let loc = self.location.unwrap_or_default();
        out.push_str(&format!("error: {}\n", self.kind));
        out.push_str(&format!("  --> {file_name}:{loc}\n"));
        if let Some(line_text) = source.lines().nth(loc.line.saturating_sub(1)) {
            out.push_str(&format!("   | {line_text}\n"));
            let caret_col = loc.column.saturating_sub(1);
            out.push_str(&format!("   | {}^\n", " ".repeat(caret_col)));
        }
        for (sub_loc, msg) in &self.sub_messages {
            match sub_loc {
                Some(l) => out.push_str(&format!("note: {msg} ({file_name}:{l})\n")),
                None => out.push_str(&format!("note: {msg}\n")),
            }
        }
        out
    }
}

pub type Result<T> = std::result::Result<T, Err>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_includes_caret_at_column() {
        let err = Err::name("undefined identifier `a`").at(Location::new(2, 5));
        let report = err.report("BUILD.tj", "x = 1\nb = a + 2\n");
        assert!(report.contains("BUILD.tj:2:5"));
        assert!(report.contains("b = a + 2"));
        assert!(report.contains("    ^"));
    }

    #[test]
    fn sub_messages_are_appended() {
        let err = Err::name("duplicate definition of `x`")
            .at(Location::new(3, 1))
            .with_sub_message(Some(Location::new(1, 1)), "first defined here");
        let report = err.report("f", "x = 1\ny = 2\nx = 3\n");
        assert!(report.contains("first defined here"));
    }
}
