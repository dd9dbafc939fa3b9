//! Post-evaluation target resolution (`spec.md` §4.6).
//!
//! Grounded on `n2o5`'s `GraphBuilder`/`BuildGraph` split (`src/graph.rs`):
//! loose, mutable construction followed by an immutable, index-addressed
//! graph. Cycle detection keeps that file's `petgraph::algo::is_cyclic_directed`
//! idea, but `spec.md` §8 scenario 5 wants an actual witness path, so this
//! module threads its own three-color DFS instead of calling straight into
//! petgraph for that step; `petgraph::algo::toposort` still drives the
//! dependency-first processing order for config/library propagation.

use indexmap::{IndexMap, IndexSet};
use petgraph::prelude::DiGraphMap;
use smol_str::SmolStr;

use crate::error::{Err, Location};
use crate::target::{Label, LabelTable, PendingTarget, TargetType, ToolchainDecl};

/// A `visibility`/`assert_no_deps` pattern (`SPEC_FULL.md` §2 "Label
/// patterns"): an exact label, a directory wildcard (direct targets only),
/// or a recursive wildcard (the directory and everything under it).
#[derive(Debug, Clone)]
enum LabelPattern {
    Exact(SmolStr, SmolStr),
    DirWildcard(SmolStr),
    RecursiveWildcard(SmolStr),
}

impl LabelPattern {
    fn parse(raw: &str, current_dir: &str) -> Result<Self, Err> {
        if let Some(dir) = raw.strip_prefix("//").and_then(|s| s.strip_suffix("/**")) {
            return Ok(Self::RecursiveWildcard(SmolStr::new(dir)));
        }
        if let Some(dir) = raw.strip_prefix("//").and_then(|s| s.strip_suffix("/*")) {
            return Ok(Self::DirWildcard(SmolStr::new(dir)));
        }
        let (dir, name, _toolchain) = parse_label_parts(raw, current_dir)?;
        Ok(Self::Exact(SmolStr::new(dir), SmolStr::new(name)))
    }

    fn admits(&self, dir: &str, name: &str) -> bool {
        match self {
            Self::Exact(d, n) => d.as_str() == dir && n.as_str() == name,
            Self::DirWildcard(d) => d.as_str() == dir,
            Self::RecursiveWildcard(d) => dir == d.as_str() || dir.starts_with(&format!("{}/", d.as_str())),
        }
    }
}

fn patterns_admit(patterns: &[LabelPattern], dir: &str, name: &str) -> bool {
    patterns.is_empty() || patterns.iter().any(|p| p.admits(dir, name))
}

/// Splits a label reference into `(dir, name, toolchain_text)`. The
/// toolchain piece is `None` when the reference carries no `(...)` suffix;
/// callers default it to the referencing target's own toolchain.
pub(crate) fn parse_label_parts(raw: &str, current_dir: &str) -> Result<(String, String, Option<String>), Err> {
    let mut s = raw.trim();
    let mut toolchain = None;
    if let Some(open) = s.rfind('(') {
        if s.ends_with(')') {
            toolchain = Some(s[open + 1..s.len() - 1].to_string());
            s = &s[..open];
        }
    }
    if let Some(rest) = s.strip_prefix("//") {
        match rest.rsplit_once(':') {
            Some((dir, name)) => Ok((dir.to_string(), name.to_string(), toolchain)),
            None => Err(Err::syntax(format!("label `{raw}` is missing `:name`"))),
        }
    } else if let Some(name) = s.strip_prefix(':') {
        Ok((current_dir.to_string(), name.to_string(), toolchain))
    } else {
        Err(Err::syntax(format!("label `{raw}` must start with `//` or `:`")))
    }
}

/// A target after label interning, dependency resolution, and propagation
/// (`spec.md` §3 "Target", "Computed fields filled during resolution").
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub label: Label,
    pub target_type: TargetType,
    pub location: Location,

    pub sources: Vec<SmolStr>,
    pub inputs: Vec<SmolStr>,
    pub outputs: Vec<SmolStr>,
    pub public_headers: Vec<SmolStr>,

    pub configs: Vec<SmolStr>,
    pub public_configs: Vec<SmolStr>,
    pub all_dependent_configs: Vec<SmolStr>,
    /// Own + inherited configs in first-occurrence order (`spec.md` §4.6
    /// item 3).
    pub resolved_configs: Vec<SmolStr>,

    pub private_deps: Vec<Label>,
    pub public_deps: Vec<Label>,
    pub data_deps: Vec<Label>,
    /// Transitive closure over `private_deps`/`public_deps` only.
    pub hard_dep_closure: Vec<Label>,

    pub args: Vec<SmolStr>,
    pub script: Option<SmolStr>,
    pub depfile: Option<SmolStr>,
    pub pool: Option<SmolStr>,

    pub libs: Vec<SmolStr>,
    pub lib_dirs: Vec<SmolStr>,
    pub frameworks: Vec<SmolStr>,
    pub resolved_libs: Vec<SmolStr>,
    pub resolved_lib_dirs: Vec<SmolStr>,
    pub resolved_frameworks: Vec<SmolStr>,

    pub visibility: Vec<SmolStr>,
    pub assert_no_deps: Vec<SmolStr>,

    pub toolchain: SmolStr,
}

/// The resolved graph: every committed target after propagation, plus the
/// committed toolchains and the output-path index the loader's
/// unknown-generated-input filter consumes (`spec.md` §4.6 item 7).
#[derive(Debug, Default)]
pub struct ResolvedGraph {
    pub targets: IndexMap<Label, ResolvedTarget>,
    pub toolchains: IndexMap<Label, ToolchainDecl>,
    pub unknown_generated_inputs: IndexMap<SmolStr, Label>,
}

impl ResolvedGraph {
    pub fn get(&self, label: Label) -> Option<&ResolvedTarget> {
        self.targets.get(&label)
    }
}

/// Intermediate per-target state carried between label resolution and
/// propagation. Kept separate from `ResolvedTarget` so propagation can read
/// partially-built fields (`configs`, `public_deps`, ...) without fighting
/// the borrow checker over the output map it is populating.
struct Resolving {
    pending: PendingTarget,
    private_deps: Vec<Label>,
    public_deps: Vec<Label>,
    data_deps: Vec<Label>,
    visibility: Vec<LabelPattern>,
    assert_no_deps: Vec<LabelPattern>,
}

impl Resolving {
    fn all_deps_in_order(&self) -> impl Iterator<Item = Label> + '_ {
        self.private_deps
            .iter()
            .chain(self.public_deps.iter())
            .chain(self.data_deps.iter())
            .copied()
    }

    fn hard_deps_in_order(&self) -> impl Iterator<Item = Label> + '_ {
        self.private_deps.iter().chain(self.public_deps.iter()).copied()
    }
}

pub struct Resolver<'a> {
    labels: &'a LabelTable,
}

impl<'a> Resolver<'a> {
    pub fn new(labels: &'a LabelTable) -> Self {
        Self { labels }
    }

    fn format(&self, label: Label) -> String {
        self.labels.data(label).to_string()
    }

    fn resolve_dep(&self, raw: &str, current_dir: &str, current_toolchain: &str, loc: Location) -> Result<Label, Err> {
        let (dir, name, toolchain_text) = parse_label_parts(raw, current_dir)?;
        let toolchain = match toolchain_text {
            Some(tc) => {
                let (tdir, tname, _) = parse_label_parts(&tc, current_dir)?;
                format!("//{tdir}:{tname}")
            }
            None => current_toolchain.to_string(),
        };
        self.labels
            .lookup(&dir, &name, &toolchain)
            .ok_or_else(|| Err::dependency(format!("target `//{dir}:{name}({toolchain})` referenced from `{raw}` was not found")).at(loc))
    }

    /// Runs the full `spec.md` §4.6 pipeline: label resolution, cycle
    /// detection, config/library propagation, visibility, and
    /// `assert_no_deps`.
    pub fn resolve(&self, pending: Vec<PendingTarget>, toolchains: Vec<ToolchainDecl>) -> Result<ResolvedGraph, Err> {
        let mut by_label: IndexMap<Label, Resolving> = IndexMap::new();
        for target in pending {
            let data = self.labels.data(target.label);
            let current_dir = data.dir.clone();
            let current_toolchain = target.toolchain.clone();
            let loc = target.location;

            let resolve_all = |raw: &[SmolStr]| -> Result<Vec<Label>, Err> {
                raw.iter().map(|r| self.resolve_dep(r, &current_dir, &current_toolchain, loc)).collect()
            };

            let private_deps = resolve_all(&target.private_deps)?;
            let public_deps = resolve_all(&target.public_deps)?;
            let data_deps = resolve_all(&target.data_deps)?;
            let visibility = target
                .visibility
                .iter()
                .map(|raw| LabelPattern::parse(raw, &current_dir))
                .collect::<Result<Vec<_>, _>>()?;
            let assert_no_deps = target
                .assert_no_deps
                .iter()
                .map(|raw| LabelPattern::parse(raw, &current_dir))
                .collect::<Result<Vec<_>, _>>()?;

            let label = target.label;
            let resolving = Resolving {
                pending: target,
                private_deps,
                public_deps,
                data_deps,
                visibility,
                assert_no_deps,
            };
            if let Some(prev) = by_label.insert(label, resolving) {
                return Err(Err::generator(format!("duplicate target `{}`", self.format(label)))
                    .at(prev.pending.location)
                    .with_sub_message(Some(loc), "also declared here"));
            }
        }

        let mut graph: DiGraphMap<Label, ()> = DiGraphMap::new();
        for (&label, resolving) in &by_label {
            graph.add_node(label);
            for dep in resolving.all_deps_in_order() {
                graph.add_edge(label, dep, ());
            }
        }

        if let Some(witness) = self.find_cycle(&graph) {
            let path = witness.iter().map(|l| self.format(*l)).collect::<Vec<_>>().join(" -> ");
            return Err(Err::dependency(format!("dependency cycle: {path}")).at(by_label[&witness[0]].pending.location));
        }

        let order = petgraph::algo::toposort(&graph, None).expect("acyclic: cycle already checked");

        let mut all_dependent_push: IndexMap<Label, IndexSet<SmolStr>> = IndexMap::new();
        let mut public_push: IndexMap<Label, IndexSet<SmolStr>> = IndexMap::new();
        let mut lib_push: IndexMap<Label, IndexSet<SmolStr>> = IndexMap::new();
        let mut lib_dir_push: IndexMap<Label, IndexSet<SmolStr>> = IndexMap::new();
        let mut framework_push: IndexMap<Label, IndexSet<SmolStr>> = IndexMap::new();
        let mut hard_closure: IndexMap<Label, IndexSet<Label>> = IndexMap::new();
        let mut full_closure: IndexMap<Label, IndexSet<Label>> = IndexMap::new();
        let mut resolved: IndexMap<Label, ResolvedTarget> = IndexMap::new();

        for label in order.into_iter().rev() {
            let resolving = &by_label[&label];
            let own = &resolving.pending;

            let mut adc = IndexSet::new();
            adc.extend(own.all_dependent_configs.iter().cloned());
            for dep in resolving.all_deps_in_order() {
                if let Some(pushed) = all_dependent_push.get(&dep) {
                    adc.extend(pushed.iter().cloned());
                }
            }
            all_dependent_push.insert(label, adc.clone());

            let mut pubc = IndexSet::new();
            pubc.extend(own.public_configs.iter().cloned());
            for dep in &resolving.public_deps {
                if let Some(pushed) = public_push.get(dep) {
                    pubc.extend(pushed.iter().cloned());
                }
            }
            public_push.insert(label, pubc.clone());

            let mut resolved_configs = IndexSet::new();
            resolved_configs.extend(own.configs.iter().cloned());
            resolved_configs.extend(own.public_configs.iter().cloned());
            resolved_configs.extend(own.all_dependent_configs.iter().cloned());
            for dep in resolving.all_deps_in_order() {
                if let Some(pushed) = all_dependent_push.get(&dep) {
                    resolved_configs.extend(pushed.iter().cloned());
                }
            }
            for dep in &resolving.public_deps {
                if let Some(pushed) = public_push.get(dep) {
                    resolved_configs.extend(pushed.iter().cloned());
                }
            }

            let mut libs = IndexSet::new();
            libs.extend(own.libs.iter().cloned());
            let mut lib_dirs = IndexSet::new();
            lib_dirs.extend(own.lib_dirs.iter().cloned());
            let mut frameworks = IndexSet::new();
            frameworks.extend(own.frameworks.iter().cloned());
            for dep in &resolving.public_deps {
                if let Some(p) = lib_push.get(dep) {
                    libs.extend(p.iter().cloned());
                }
                if let Some(p) = lib_dir_push.get(dep) {
                    lib_dirs.extend(p.iter().cloned());
                }
                if let Some(p) = framework_push.get(dep) {
                    frameworks.extend(p.iter().cloned());
                }
            }
            lib_push.insert(label, libs.clone());
            lib_dir_push.insert(label, lib_dirs.clone());
            framework_push.insert(label, frameworks.clone());

            let mut hard = IndexSet::new();
            for dep in resolving.hard_deps_in_order() {
                hard.insert(dep);
                if let Some(c) = hard_closure.get(&dep) {
                    hard.extend(c.iter().copied());
                }
            }
            hard_closure.insert(label, hard.clone());

            let mut full = IndexSet::new();
            for dep in resolving.all_deps_in_order() {
                full.insert(dep);
                if let Some(c) = full_closure.get(&dep) {
                    full.extend(c.iter().copied());
                }
            }
            full_closure.insert(label, full.clone());

            resolved.insert(
                label,
                ResolvedTarget {
                    label,
                    target_type: own.target_type,
                    location: own.location,
                    sources: own.sources.clone(),
                    inputs: own.inputs.clone(),
                    outputs: own.outputs.clone(),
                    public_headers: own.public_headers.clone(),
                    configs: own.configs.clone(),
                    public_configs: own.public_configs.clone(),
                    all_dependent_configs: own.all_dependent_configs.clone(),
                    resolved_configs: resolved_configs.into_iter().collect(),
                    private_deps: resolving.private_deps.clone(),
                    public_deps: resolving.public_deps.clone(),
                    data_deps: resolving.data_deps.clone(),
                    hard_dep_closure: hard.into_iter().collect(),
                    args: own.args.clone(),
                    script: own.script.clone(),
                    depfile: own.depfile.clone(),
                    pool: own.pool.clone(),
                    libs: own.libs.clone(),
                    lib_dirs: own.lib_dirs.clone(),
                    frameworks: own.frameworks.clone(),
                    resolved_libs: libs.into_iter().collect(),
                    resolved_lib_dirs: lib_dirs.into_iter().collect(),
                    resolved_frameworks: frameworks.into_iter().collect(),
                    visibility: own.visibility.clone(),
                    assert_no_deps: own.assert_no_deps.clone(),
                    toolchain: own.toolchain.clone(),
                },
            );
        }

        for (&label, resolving) in &by_label {
            let (dir, name) = {
                let data = self.labels.data(label);
                (data.dir.clone(), data.name.clone())
            };
            for dep in resolving.all_deps_in_order() {
                let dep_visibility = &by_label[&dep].visibility;
                if !patterns_admit(dep_visibility, &dir, &name) {
                    return Err(Err::dependency(format!("target `{}` is not visible to `{}`", self.format(dep), self.format(label)))
                        .at(resolving.pending.location)
                        .with_sub_message(Some(by_label[&dep].pending.location), "visibility declared here"));
                }
            }

            if !resolving.assert_no_deps.is_empty() {
                let closure = &full_closure[&label];
                for dep in closure {
                    let data = self.labels.data(*dep);
                    if patterns_admit(&resolving.assert_no_deps, &data.dir, &data.name) {
                        return Err(Err::dependency(format!(
                            "target `{}` has a forbidden transitive dependency on `{}`",
                            self.format(label),
                            self.format(*dep)
                        ))
                        .at(resolving.pending.location));
                    }
                }
            }
        }

        let mut unknown_generated_inputs = IndexMap::new();
        for (&label, resolving) in &by_label {
            for output in &resolving.pending.outputs {
                unknown_generated_inputs.entry(output.clone()).or_insert(label);
            }
        }

        let mut toolchain_map = IndexMap::new();
        for decl in toolchains {
            toolchain_map.insert(decl.label, decl);
        }

        Ok(ResolvedGraph {
            targets: resolved,
            toolchains: toolchain_map,
            unknown_generated_inputs,
        })
    }

    /// Three-color DFS cycle search. Returns the witness path (first label
    /// repeated at the end) on the first cycle found, per `spec.md` §4.6
    /// item 2 and the "Resolver invariants: DAG property" testable property.
    fn find_cycle(&self, graph: &DiGraphMap<Label, ()>) -> Option<Vec<Label>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut color: IndexMap<Label, Color> = graph.nodes().map(|n| (n, Color::White)).collect();
        let mut stack: Vec<Label> = Vec::new();

        fn visit(
            node: Label,
            graph: &DiGraphMap<Label, ()>,
            color: &mut IndexMap<Label, Color>,
            stack: &mut Vec<Label>,
        ) -> Option<Vec<Label>> {
            color.insert(node, Color::Gray);
            stack.push(node);
            for dep in graph.neighbors(node) {
                match color[&dep] {
                    Color::White => {
                        if let Some(witness) = visit(dep, graph, color, stack) {
                            return Some(witness);
                        }
                    }
                    Color::Gray => {
                        let start = stack.iter().position(|&l| l == dep).expect("gray node must be on stack");
                        let mut witness: Vec<Label> = stack[start..].to_vec();
                        witness.push(dep);
                        return Some(witness);
                    }
                    Color::Black => {}
                }
            }
            stack.pop();
            color.insert(node, Color::Black);
            None
        }

        let nodes: Vec<Label> = graph.nodes().collect();
        for node in nodes {
            if color[&node] == Color::White {
                if let Some(witness) = visit(node, graph, &mut color, &mut stack) {
                    return Some(witness);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Location;

    fn loc() -> Location {
        Location::new(1, 1)
    }

    fn smol_vec(items: &[&str]) -> Vec<SmolStr> {
        items.iter().map(|s| SmolStr::new(*s)).collect()
    }

    fn make(label: Label, target_type: TargetType, toolchain: &str) -> PendingTarget {
        PendingTarget::new(label, target_type, SmolStr::new(toolchain), loc())
    }

    #[test]
    fn resolves_simple_dependency_chain() {
        let mut table = LabelTable::new();
        let a = table.intern("app", "a", "//toolchain:default");
        let b = table.intern("app", "b", "//toolchain:default");

        let mut t_a = make(a, TargetType::Executable, "//toolchain:default");
        t_a.private_deps = smol_vec(&[":b"]);
        let t_b = make(b, TargetType::StaticLibrary, "//toolchain:default");

        let resolver = Resolver::new(&table);
        let graph = resolver.resolve(vec![t_a, t_b], vec![]).unwrap();
        assert_eq!(graph.targets.len(), 2);
        assert_eq!(graph.targets[&a].private_deps, vec![b]);
    }

    #[test]
    fn detects_cycle_with_witness() {
        let mut table = LabelTable::new();
        let a = table.intern("app", "a", "//toolchain:default");
        let b = table.intern("app", "b", "//toolchain:default");

        let mut t_a = make(a, TargetType::Group, "//toolchain:default");
        t_a.private_deps = smol_vec(&[":b"]);
        let mut t_b = make(b, TargetType::Group, "//toolchain:default");
        t_b.private_deps = smol_vec(&[":a"]);

        let resolver = Resolver::new(&table);
        let err = resolver.resolve(vec![t_a, t_b], vec![]).unwrap_err();
        match err.kind {
            crate::error::ErrorKind::Dependency(msg) => assert!(msg.contains("cycle")),
            other => panic!("expected dependency error, got {other:?}"),
        }
    }

    #[test]
    fn missing_dependency_is_fatal() {
        let mut table = LabelTable::new();
        let a = table.intern("app", "a", "//toolchain:default");
        let mut t_a = make(a, TargetType::Executable, "//toolchain:default");
        t_a.private_deps = smol_vec(&[":missing"]);

        let resolver = Resolver::new(&table);
        let err = resolver.resolve(vec![t_a], vec![]).unwrap_err();
        assert!(matches!(err.kind, crate::error::ErrorKind::Dependency(_)));
    }

    #[test]
    fn visibility_rejects_unlisted_dependent() {
        let mut table = LabelTable::new();
        let allowed = table.intern("app", "allowed", "//toolchain:default");
        let a = table.intern("app", "a", "//toolchain:default");
        let other = table.intern("app", "other", "//toolchain:default");

        let mut t_a = make(a, TargetType::StaticLibrary, "//toolchain:default");
        t_a.visibility = smol_vec(&["//app:allowed"]);
        let mut t_allowed = make(allowed, TargetType::Executable, "//toolchain:default");
        t_allowed.private_deps = smol_vec(&[":a"]);
        let mut t_other = make(other, TargetType::Executable, "//toolchain:default");
        t_other.private_deps = smol_vec(&[":a"]);

        let resolver = Resolver::new(&table);
        let err = resolver.resolve(vec![t_a, t_allowed, t_other], vec![]).unwrap_err();
        assert!(matches!(err.kind, crate::error::ErrorKind::Dependency(_)));
    }

    #[test]
    fn all_dependent_configs_propagate_through_private_edge() {
        let mut table = LabelTable::new();
        let a = table.intern("app", "a", "//toolchain:default");
        let b = table.intern("app", "b", "//toolchain:default");
        let c = table.intern("app", "c", "//toolchain:default");

        let mut t_a = make(a, TargetType::Executable, "//toolchain:default");
        t_a.private_deps = smol_vec(&[":b"]);
        let mut t_b = make(b, TargetType::StaticLibrary, "//toolchain:default");
        t_b.private_deps = smol_vec(&[":c"]);
        let mut t_c = make(c, TargetType::StaticLibrary, "//toolchain:default");
        t_c.all_dependent_configs = smol_vec(&["//app:warnings"]);

        let resolver = Resolver::new(&table);
        let graph = resolver.resolve(vec![t_a, t_b, t_c], vec![]).unwrap();
        assert!(graph.targets[&a].resolved_configs.contains(&SmolStr::new("//app:warnings")));
        assert!(graph.targets[&b].resolved_configs.contains(&SmolStr::new("//app:warnings")));
    }

    #[test]
    fn public_configs_require_public_edge() {
        let mut table = LabelTable::new();
        let a = table.intern("app", "a", "//toolchain:default");
        let b = table.intern("app", "b", "//toolchain:default");

        let mut t_a = make(a, TargetType::Executable, "//toolchain:default");
        t_a.private_deps = smol_vec(&[":b"]);
        let mut t_b = make(b, TargetType::StaticLibrary, "//toolchain:default");
        t_b.public_configs = smol_vec(&["//app:api"]);

        let resolver = Resolver::new(&table);
        let graph = resolver.resolve(vec![t_a, t_b], vec![]).unwrap();
        assert!(!graph.targets[&a].resolved_configs.contains(&SmolStr::new("//app:api")));

        let mut table2 = LabelTable::new();
        let a2 = table2.intern("app", "a", "//toolchain:default");
        let b2 = table2.intern("app", "b", "//toolchain:default");
        let mut t_a2 = make(a2, TargetType::Executable, "//toolchain:default");
        t_a2.public_deps = smol_vec(&[":b"]);
        let mut t_b2 = make(b2, TargetType::StaticLibrary, "//toolchain:default");
        t_b2.public_configs = smol_vec(&["//app:api"]);
        let resolver2 = Resolver::new(&table2);
        let graph2 = resolver2.resolve(vec![t_a2, t_b2], vec![]).unwrap();
        assert!(graph2.targets[&a2].resolved_configs.contains(&SmolStr::new("//app:api")));
    }

    #[test]
    fn libs_propagate_through_public_closure() {
        let mut table = LabelTable::new();
        let a = table.intern("app", "a", "//toolchain:default");
        let b = table.intern("app", "b", "//toolchain:default");

        let mut t_a = make(a, TargetType::Executable, "//toolchain:default");
        t_a.public_deps = smol_vec(&[":b"]);
        let mut t_b = make(b, TargetType::StaticLibrary, "//toolchain:default");
        t_b.libs = smol_vec(&["m"]);

        let resolver = Resolver::new(&table);
        let graph = resolver.resolve(vec![t_a, t_b], vec![]).unwrap();
        assert_eq!(graph.targets[&a].resolved_libs, vec![SmolStr::new("m")]);
    }

    #[test]
    fn assert_no_deps_catches_transitive_violation() {
        let mut table = LabelTable::new();
        let a = table.intern("app", "a", "//toolchain:default");
        let b = table.intern("app", "b", "//toolchain:default");
        let banned = table.intern("third_party", "banned", "//toolchain:default");

        let mut t_a = make(a, TargetType::Executable, "//toolchain:default");
        t_a.private_deps = smol_vec(&[":b"]);
        t_a.assert_no_deps = smol_vec(&["//third_party/**"]);
        let mut t_b = make(b, TargetType::StaticLibrary, "//toolchain:default");
        t_b.private_deps = smol_vec(&["//third_party:banned"]);
        let t_banned = make(banned, TargetType::StaticLibrary, "//toolchain:default");

        let resolver = Resolver::new(&table);
        let err = resolver.resolve(vec![t_a, t_b, t_banned], vec![]).unwrap_err();
        assert!(matches!(err.kind, crate::error::ErrorKind::Dependency(_)));
    }

    #[test]
    fn duplicate_target_declaration_is_an_error() {
        let mut table = LabelTable::new();
        let a = table.intern("app", "a", "//toolchain:default");
        let t1 = make(a, TargetType::Executable, "//toolchain:default");
        let t2 = make(a, TargetType::Executable, "//toolchain:default");
        let resolver = Resolver::new(&table);
        let err = resolver.resolve(vec![t1, t2], vec![]).unwrap_err();
        assert!(matches!(err.kind, crate::error::ErrorKind::Generator(_)));
    }
}
