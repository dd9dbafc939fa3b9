//! The post-evaluation target data model (`spec.md` §3 "Target", "Label").
//!
//! Grounded on `n2o5`'s `BuildNode`/`BuildMethod` construction-from-scope
//! shape (`src/graph.rs`): a builder reads recognized fields out of a
//! completed scope and produces an immutable record. `Label` interning
//! mirrors the same file's use of a compact interned-id graph node instead
//! of storing paths inline everywhere.

use indexmap::IndexSet;
use smol_str::SmolStr;

use crate::error::Location;

/// A fully-qualified target identifier: `//dir:name(toolchain)`. Interned by
/// a [`LabelTable`]; equality is identity after interning (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(u32);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelData {
    pub dir: SmolStr,
    pub name: SmolStr,
    pub toolchain: SmolStr,
}

impl std::fmt::Display for LabelData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "//{}:{}({})", self.dir, self.name, self.toolchain)
    }
}

/// The interner backing [`Label`]. Owned by whatever drives evaluation (the
/// loader); `eval`/`builtins` only ever see the opaque `Label` handle.
#[derive(Debug, Default)]
pub struct LabelTable {
    entries: IndexSet<LabelData>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, dir: impl Into<SmolStr>, name: impl Into<SmolStr>, toolchain: impl Into<SmolStr>) -> Label {
        let data = LabelData {
            dir: dir.into(),
            name: name.into(),
            toolchain: toolchain.into(),
        };
        let (idx, _) = self.entries.insert_full(data);
        Label(idx as u32)
    }

    pub fn data(&self, label: Label) -> &LabelData {
        &self.entries[label.0 as usize]
    }

    pub fn lookup(&self, dir: &str, name: &str, toolchain: &str) -> Option<Label> {
        let probe = LabelData {
            dir: SmolStr::new(dir),
            name: SmolStr::new(name),
            toolchain: SmolStr::new(toolchain),
        };
        self.entries.get_index_of(&probe).map(|i| Label(i as u32))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Label> + '_ {
        (0..self.entries.len()).map(|i| Label(i as u32))
    }
}

/// The closed set of target types named in `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetType {
    Group,
    Executable,
    StaticLibrary,
    SharedLibrary,
    LoadableModule,
    SourceSet,
    Action,
    ActionForeach,
    BundleData,
    Copy,
}

impl TargetType {
    pub fn from_builtin_name(name: &str) -> Option<Self> {
        Some(match name {
            "group" => Self::Group,
            "executable" => Self::Executable,
            "static_library" => Self::StaticLibrary,
            "shared_library" => Self::SharedLibrary,
            "loadable_module" => Self::LoadableModule,
            "source_set" => Self::SourceSet,
            "action" => Self::Action,
            "action_foreach" => Self::ActionForeach,
            "bundle_data" => Self::BundleData,
            "copy" => Self::Copy,
            _ => return None,
        })
    }

    /// Inverse of [`Self::from_builtin_name`]: the name `set_defaults()` was
    /// called with to register defaults for this type.
    pub fn as_builtin_name(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Executable => "executable",
            Self::StaticLibrary => "static_library",
            Self::SharedLibrary => "shared_library",
            Self::LoadableModule => "loadable_module",
            Self::SourceSet => "source_set",
            Self::Action => "action",
            Self::ActionForeach => "action_foreach",
            Self::BundleData => "bundle_data",
            Self::Copy => "copy",
        }
    }

    /// Whether this target type links its dependents' `libs`/`lib_dirs`
    /// (`spec.md` §4.6 item 4): source sets pass the union through rather
    /// than consuming it themselves.
    pub fn is_linkable(&self) -> bool {
        !matches!(self, Self::Group | Self::SourceSet | Self::Action | Self::ActionForeach | Self::Copy | Self::BundleData)
    }
}

/// A committed-but-not-yet-resolved target: exactly the fields a
/// target-declaring built-in can read straight off a finished scope.
/// Dependency labels are still plain path strings; the resolver (§4.6)
/// interns and validates them once every file has loaded.
#[derive(Debug, Clone)]
pub struct PendingTarget {
    pub label: Label,
    pub target_type: TargetType,
    pub location: Location,

    pub sources: Vec<SmolStr>,
    pub inputs: Vec<SmolStr>,
    pub outputs: Vec<SmolStr>,
    pub public_headers: Vec<SmolStr>,

    pub public_configs: Vec<SmolStr>,
    pub all_dependent_configs: Vec<SmolStr>,
    pub configs: Vec<SmolStr>,

    pub private_deps: Vec<SmolStr>,
    pub public_deps: Vec<SmolStr>,
    pub data_deps: Vec<SmolStr>,

    pub args: Vec<SmolStr>,
    pub script: Option<SmolStr>,
    pub depfile: Option<SmolStr>,
    pub pool: Option<SmolStr>,

    pub libs: Vec<SmolStr>,
    pub lib_dirs: Vec<SmolStr>,
    pub frameworks: Vec<SmolStr>,

    pub visibility: Vec<SmolStr>,
    pub assert_no_deps: Vec<SmolStr>,

    pub toolchain: SmolStr,
}

impl PendingTarget {
    pub fn new(label: Label, target_type: TargetType, toolchain: SmolStr, location: Location) -> Self {
        Self {
            label,
            target_type,
            location,
            sources: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            public_headers: Vec::new(),
            public_configs: Vec::new(),
            all_dependent_configs: Vec::new(),
            configs: Vec::new(),
            private_deps: Vec::new(),
            public_deps: Vec::new(),
            data_deps: Vec::new(),
            args: Vec::new(),
            script: None,
            depfile: None,
            pool: None,
            libs: Vec::new(),
            lib_dirs: Vec::new(),
            frameworks: Vec::new(),
            visibility: Vec::new(),
            assert_no_deps: Vec::new(),
            toolchain,
        }
    }
}

/// A `toolchain(name) { ... }` declaration (`SPEC_FULL.md` §2). Flattened to
/// its string-valued settings (`cc = "clang"`, `lib_switch = "-l"`, ...)
/// rather than a nested `tool("cc") { ... }` structure: the resolver and
/// emitter covered here only need compiler/linker command strings, not the
/// full per-tool substitution grammar.
#[derive(Debug, Clone)]
pub struct ToolchainDecl {
    pub label: Label,
    pub location: Location,
    pub settings: Vec<(SmolStr, SmolStr)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_identity_after_first_insert() {
        let mut table = LabelTable::new();
        let a = table.intern("foo/bar", "baz", "//toolchain:default");
        let b = table.intern("foo/bar", "baz", "//toolchain:default");
        assert_eq!(a, b);
        let c = table.intern("foo/bar", "qux", "//toolchain:default");
        assert_ne!(a, c);
    }

    #[test]
    fn lookup_finds_interned_label() {
        let mut table = LabelTable::new();
        let a = table.intern("foo", "bar", "//toolchain:default");
        assert_eq!(table.lookup("foo", "bar", "//toolchain:default"), Some(a));
        assert_eq!(table.lookup("foo", "nope", "//toolchain:default"), None);
    }
}
