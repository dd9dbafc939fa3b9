//! On-demand file loading, worker pool, and the [`EvalHost`] the evaluator
//! runs against (`spec.md` §4.5).
//!
//! Grounded on `n2o5`'s `Executor`/`SharedState` (`src/exec.rs`): a rayon
//! thread pool plus an `mpsc::channel` draining into a single main-thread
//! loop that owns all mutable state. The adaptation here is narrower than
//! that file's build-execution loop: only *parsing* runs on worker threads.
//! `ScopeRef` is `Rc<RefCell<_>>`, not `Send`, so every `Scope`/`Value`
//! touch — all of evaluation, including reentrant `import()` calls — stays
//! on the thread that owns the `Loader`. Workers read file text and turn it
//! into a `Program`, which carries no `Rc`/`RefCell` and crosses the
//! channel safely.
//!
//! Two loading paths follow from that split:
//! - `import(path)` is synchronous and reentrant: it is called from deep
//!   inside an `eval_expr` call stack and must hand back a `ScopeRef`
//!   immediately, so it reads, parses, and evaluates inline rather than
//!   going through the worker queue.
//! - Cross-directory discovery — a target's `deps`/`public_deps`/`data_deps`
//!   naming a directory nothing has loaded yet — is asynchronous: after each
//!   file's top-level evaluation commits its targets, the loader scans the
//!   newly committed dependency strings for unvisited directories and
//!   dispatches their conventional build file to the worker pool.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use smol_str::SmolStr;
use tracing::{debug, info, instrument};

use crate::ast::Program;
use crate::error::{Err, Location};
use crate::eval::{EvalHost, Evaluator};
use crate::resolver::{self, ResolvedGraph, Resolver};
use crate::scope::{Scope, ScopeKind, ScopeRef, Settings};
use crate::target::{Label, LabelTable, PendingTarget, ToolchainDecl};
use crate::value::Value;
use crate::world::World;

/// The conventional build file name within every directory, including the
/// source root itself (`spec.md` §6: "a designated root build file
/// (conventionally `BUILD.<suffix>`)").
const BUILD_FILE_NAME: &str = "BUILD.tenjin";

/// Cycle guard and cache for the synchronous `import()` path. `Loading`
/// catches `import` cycles (`a` imports `b` imports `a`); `Loaded` makes
/// re-import a no-op lookup (`spec.md` §4.4 "Imports are idempotent").
enum ImportState {
    Loading,
    Loaded(ScopeRef),
}

/// Drives the whole generator run: loads the root build file, discovers and
/// loads every directory transitively referenced by a dependency list,
/// implements [`EvalHost`] for the evaluator, and hands the finished target
/// list to the [`Resolver`].
pub struct Loader<'w> {
    world: &'w dyn World,
    source_root: PathBuf,
    build_dir: SmolStr,
    default_toolchain: SmolStr,
    /// Path of the configured script interpreter (`--script-executable`);
    /// when unset, `exec_script` runs the target script directly.
    script_executable: Option<PathBuf>,

    labels: LabelTable,
    root_scope: ScopeRef,
    import_cache: HashMap<PathBuf, ImportState>,

    pending_targets: Vec<PendingTarget>,
    /// Index into `pending_targets` already scanned for cross-directory
    /// discovery; avoids rescanning the whole list after every file loads.
    scanned_targets: usize,
    toolchains: Vec<ToolchainDecl>,
    committed_outputs: HashMap<Label, Vec<SmolStr>>,
    default_scopes: HashMap<String, ScopeRef>,

    arg_overrides: HashMap<String, Value>,
    consumed_args: HashSet<String>,

    loaded_dirs: HashSet<SmolStr>,
    queue: VecDeque<SmolStr>,
    generator_deps: Vec<SmolStr>,

    /// Directory and toolchain of whatever file is currently being
    /// evaluated; `EvalHost::current_dir`/`current_toolchain` read these.
    current_dir: SmolStr,
    current_toolchain: SmolStr,
}

impl<'w> Loader<'w> {
    pub fn new(
        world: &'w dyn World,
        source_root: PathBuf,
        build_dir: impl Into<SmolStr>,
        default_toolchain: impl Into<SmolStr>,
        arg_overrides: HashMap<String, Value>,
        script_executable: Option<PathBuf>,
    ) -> Self {
        let build_dir = build_dir.into();
        let default_toolchain = default_toolchain.into();
        let settings = std::rc::Rc::new(Settings {
            source_root: source_root.clone(),
            toolchain: default_toolchain.clone(),
            build_dir: build_dir.clone(),
        });
        Self {
            world,
            source_root,
            build_dir,
            default_toolchain: default_toolchain.clone(),
            script_executable,
            labels: LabelTable::new(),
            root_scope: Scope::root(settings),
            import_cache: HashMap::new(),
            pending_targets: Vec::new(),
            scanned_targets: 0,
            toolchains: Vec::new(),
            committed_outputs: HashMap::new(),
            default_scopes: HashMap::new(),
            arg_overrides,
            consumed_args: HashSet::new(),
            loaded_dirs: HashSet::new(),
            queue: VecDeque::new(),
            generator_deps: Vec::new(),
            current_dir: SmolStr::new(""),
            current_toolchain: default_toolchain,
        }
    }

    pub fn generator_deps(&self) -> &[SmolStr] {
        &self.generator_deps
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    fn build_file_path(&self, dir: &str) -> PathBuf {
        if dir.is_empty() {
            self.source_root.join(BUILD_FILE_NAME)
        } else {
            self.source_root.join(dir).join(BUILD_FILE_NAME)
        }
    }

    /// Runs the full pipeline: load the root build file, follow every
    /// directory transitively reachable through a dependency list, then
    /// resolve the committed target graph (`spec.md` §4.5, §4.6).
    pub fn generate(&mut self) -> Result<ResolvedGraph, Err> {
        self.queue.push_back(SmolStr::new(""));
        let pool = rayon::ThreadPoolBuilder::new()
            .build()
            .map_err(|e| Err::generator(format!("failed to start worker pool: {e}")).at(Location::default()))?;
        pool.in_place_scope(|scope| self.run_loop(scope))?;

        self.check_unconsumed_overrides()?;

        let pending = std::mem::take(&mut self.pending_targets);
        let toolchains = std::mem::take(&mut self.toolchains);
        Resolver::new(&self.labels).resolve(pending, toolchains)
    }

    /// The main-thread event loop (`spec.md` §4.5 "Loading protocol"):
    /// dispatch every queued directory's build file to the worker pool,
    /// then drain completions one at a time, evaluating each on the main
    /// thread before looking for newly discovered directories. Terminates
    /// when the queue is empty and no worker task is outstanding.
    fn run_loop(&mut self, scope: &rayon::Scope<'w>) -> Result<(), Err> {
        let (tx, rx) = mpsc::channel::<(SmolStr, PathBuf, Result<Program, Err>)>();
        let mut in_flight = 0usize;

        loop {
            while let Some(dir) = self.queue.pop_front() {
                if !self.loaded_dirs.insert(dir.clone()) {
                    continue;
                }
                let path = self.build_file_path(&dir);
                let world = self.world;
                let tx = tx.clone();
                in_flight += 1;
                debug!(%dir, path = %path.display(), "dispatching parse task");
                scope.spawn(move |_| {
                    let result = world
                        .read_to_string(&path)
                        .map_err(|e| Err::io(format!("{}: {e}", path.display())).at(Location::default()))
                        .and_then(|text| crate::parser::parse_program(&text));
                    let _ = tx.send((dir, path, result));
                });
            }

            if in_flight == 0 {
                break;
            }

            let (dir, path, result) = rx.recv().expect("a worker holds tx while in_flight > 0");
            in_flight -= 1;
            self.generator_deps.push(SmolStr::new(path.to_string_lossy().into_owned()));
            let program = result?;
            self.eval_loaded_file(&dir, &program)?;
            self.discover_new_directories();
        }

        info!(dirs = self.loaded_dirs.len(), targets = self.pending_targets.len(), "load frontier drained");
        Ok(())
    }

    /// Evaluates one directory's build file into a fresh child of the
    /// project root scope, then enforces its hygiene invariant (`spec.md`
    /// §4.2): nothing the top level declared may go unread.
    #[instrument(skip(self, program), fields(dir = %dir))]
    fn eval_loaded_file(&mut self, dir: &str, program: &Program) -> Result<(), Err> {
        self.current_dir = SmolStr::new(dir);
        self.current_toolchain = self.default_toolchain.clone();
        let file_scope = Scope::child(&self.root_scope);
        {
            let mut eval = Evaluator::new(self);
            eval.eval_program(program, &file_scope)?;
        }
        Scope::check_for_unused_vars(&file_scope)
    }

    /// Scans targets committed since the last scan for dependency strings
    /// naming a directory nothing has queued or loaded yet, and enqueues
    /// that directory's build file. Malformed label strings are left for
    /// the resolver to report properly; discovery only needs the directory.
    fn discover_new_directories(&mut self) {
        let start = self.scanned_targets;
        self.scanned_targets = self.pending_targets.len();
        let mut discovered = Vec::new();
        for target in &self.pending_targets[start..] {
            let owner_dir = self.labels.data(target.label).dir.clone();
            let deps = target
                .private_deps
                .iter()
                .chain(target.public_deps.iter())
                .chain(target.data_deps.iter());
            for raw in deps {
                if let Ok((dep_dir, _, _)) = resolver::parse_label_parts(raw, &owner_dir) {
                    let dep_dir = SmolStr::new(dep_dir);
                    if !self.loaded_dirs.contains(&dep_dir) && !self.queue.contains(&dep_dir) {
                        discovered.push(dep_dir);
                    }
                }
            }
        }
        for dir in discovered {
            debug!(%dir, "discovered build file via dependency reference");
            self.queue.push_back(dir);
        }
    }

    /// Resolves an `import()`/`read_file()`/`exec_script()` path argument
    /// (absolute `//`-rooted, or relative to `from_dir`) to a filesystem
    /// path under the source root.
    fn resolve_source_path(&self, path: &str, from_dir: &str, at: Location) -> Result<PathBuf, Err> {
        let rel = if let Some(rest) = path.strip_prefix("//") {
            rest.to_string()
        } else if from_dir.is_empty() {
            path.to_string()
        } else {
            format!("{from_dir}/{path}")
        };
        if rel.is_empty() {
            return Err(Err::generator("path must not be empty").at(at));
        }
        Ok(self.source_root.join(rel))
    }

    fn resolve_build_path(&self, path: &str) -> PathBuf {
        self.source_root.join(self.build_dir.as_str()).join(path)
    }

    fn check_unconsumed_overrides(&self) -> Result<(), Err> {
        let mut unconsumed: Vec<&String> =
            self.arg_overrides.keys().filter(|k| !self.consumed_args.contains(k.as_str())).collect();
        unconsumed.sort();
        if let Some(name) = unconsumed.first() {
            return Err(Err::generator(format!("argument override `{name}` was never declared by declare_args()")).at(Location::default()));
        }
        Ok(())
    }
}

impl<'w> EvalHost for Loader<'w> {
    fn import(&mut self, path: &str, from_dir: &str, at: Location) -> Result<ScopeRef, Err> {
        let resolved = self.resolve_source_path(path, from_dir, at)?;
        match self.import_cache.get(&resolved) {
            Some(ImportState::Loading) => {
                return Err(Err::generator(format!("import cycle involving `{path}`")).at(at));
            }
            Some(ImportState::Loaded(scope)) => return Ok(scope.clone()),
            None => {}
        }
        self.import_cache.insert(resolved.clone(), ImportState::Loading);

        let text = self
            .world
            .read_to_string(&resolved)
            .map_err(|e| Err::io(format!("{}: {e}", resolved.display())).at(at))?;
        self.generator_deps.push(SmolStr::new(resolved.to_string_lossy().into_owned()));
        let program = crate::parser::parse_program(&text)?;

        let import_dir = resolved
            .strip_prefix(&self.source_root)
            .ok()
            .and_then(|p| p.parent())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        // Imported files evaluate as their own file, not a child of the
        // importer: `current_dir` follows the file being read, and the
        // destination scope hangs off the shared project root so the
        // importer's local bindings stay invisible to it.
        let saved_dir = std::mem::replace(&mut self.current_dir, SmolStr::new(import_dir));
        let file_scope = Scope::child_with_kind(&self.root_scope, ScopeKind::Imported);
        let result = {
            let mut eval = Evaluator::new(self);
            eval.eval_program(&program, &file_scope)
        };
        self.current_dir = saved_dir;
        result?;

        self.import_cache.insert(resolved, ImportState::Loaded(file_scope.clone()));
        Ok(file_scope)
    }

    fn source_root(&self) -> &Path {
        &self.source_root
    }

    fn current_dir(&self) -> SmolStr {
        self.current_dir.clone()
    }

    fn current_toolchain(&self) -> SmolStr {
        self.current_toolchain.clone()
    }

    fn build_dir(&self) -> SmolStr {
        self.build_dir.clone()
    }

    fn intern_label(&mut self, dir: &str, name: &str, toolchain: &str) -> Label {
        self.labels.intern(dir, name, toolchain)
    }

    fn commit_target(&mut self, target: PendingTarget) -> Result<(), Err> {
        if !target.outputs.is_empty() {
            self.committed_outputs.insert(target.label, target.outputs.clone());
        }
        debug!(label = %self.labels.data(target.label), "committed target");
        self.pending_targets.push(target);
        Ok(())
    }

    fn commit_toolchain(&mut self, toolchain: ToolchainDecl) -> Result<(), Err> {
        debug!(label = %self.labels.data(toolchain.label), "committed toolchain");
        self.toolchains.push(toolchain);
        Ok(())
    }

    fn register_default_scope(&mut self, target_type: &str, scope: ScopeRef) {
        self.default_scopes.insert(target_type.to_string(), scope);
    }

    fn default_scope(&self, target_type: &str) -> Option<ScopeRef> {
        self.default_scopes.get(target_type).cloned()
    }

    fn declared_arg_override(&self, name: &str) -> Option<Value> {
        self.arg_overrides.get(name).cloned()
    }

    fn mark_arg_consumed(&mut self, name: &str) {
        self.consumed_args.insert(name.to_string());
    }

    fn target_outputs(&self, label: &str) -> Option<Vec<SmolStr>> {
        let (dir, name, toolchain_text) = resolver::parse_label_parts(label, &self.current_dir).ok()?;
        let toolchain = toolchain_text.unwrap_or_else(|| self.current_toolchain.to_string());
        let resolved = self.labels.lookup(&dir, &name, &toolchain)?;
        self.committed_outputs.get(&resolved).cloned()
    }

    fn read_file(&mut self, path: &str, at: Location) -> Result<String, Err> {
        let current_dir = self.current_dir.clone();
        let resolved = self.resolve_source_path(path, &current_dir, at)?;
        let text = self
            .world
            .read_to_string(&resolved)
            .map_err(|e| Err::io(format!("{}: {e}", resolved.display())).at(at))?;
        self.generator_deps.push(SmolStr::new(resolved.to_string_lossy().into_owned()));
        Ok(text)
    }

    fn write_file(&mut self, path: &str, content: &str, at: Location) -> Result<(), Err> {
        let resolved = self.resolve_build_path(path);
        self.world.write(&resolved, content).map_err(|e| Err::io(format!("{}: {e}", resolved.display())).at(at))
    }

    fn exec_script(&mut self, script: &str, args: &[String], input_files: &[String], at: Location) -> Result<String, Err> {
        let current_dir = self.current_dir.clone();
        let script_path = self.resolve_source_path(script, &current_dir, at)?;
        if !self.world.exists(&script_path) {
            return Err(Err::io(format!("script not found: {}", script_path.display())).at(at));
        }
        self.generator_deps.push(SmolStr::new(script_path.to_string_lossy().into_owned()));
        for input in input_files {
            let input_path = self.resolve_source_path(input, &current_dir, at)?;
            self.generator_deps.push(SmolStr::new(input_path.to_string_lossy().into_owned()));
        }

        let (executable, full_args) = match &self.script_executable {
            Some(exe) => {
                let mut a = vec![script_path.to_string_lossy().into_owned()];
                a.extend(args.iter().cloned());
                (exe.clone(), a)
            }
            None => (script_path.clone(), args.to_vec()),
        };

        let output = self
            .world
            .run_script(&executable, &full_args)
            .map_err(|e| Err::io(format!("{}: {e}", executable.display())).at(at))?;
        if !output.status.success() {
            return Err(Err::generator(format!(
                "exec_script(`{script}`) exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ))
            .at(at));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::test_support::MemoryWorld;

    fn loader(world: &MemoryWorld) -> Loader<'_> {
        Loader::new(
            world,
            PathBuf::from("/src"),
            "out/Default",
            "//toolchain:default",
            HashMap::new(),
            None,
        )
    }

    #[test]
    fn loads_root_build_file_and_commits_a_target() {
        let world = MemoryWorld::new([("/src/BUILD.tenjin", "group(\"all\") {}\n")]);
        let mut l = loader(&world);
        let graph = l.generate().unwrap();
        assert_eq!(graph.targets.len(), 1);
    }

    #[test]
    fn discovers_and_loads_a_referenced_subdirectory() {
        let world = MemoryWorld::new([
            ("/src/BUILD.tenjin", "executable(\"app\") {\n  deps = [\"//lib:thing\"]\n}\n"),
            ("/src/lib/BUILD.tenjin", "static_library(\"thing\") {}\n"),
        ]);
        let mut l = loader(&world);
        let graph = l.generate().unwrap();
        assert_eq!(graph.targets.len(), 2);
    }

    #[test]
    fn import_is_synchronous_and_idempotent() {
        let world = MemoryWorld::new([
            ("/src/BUILD.tenjin", "import(\"//common.tenjin\")\nimport(\"//common.tenjin\")\nprint(shared)\n"),
            ("/src/common.tenjin", "shared = 1\n"),
        ]);
        let mut l = loader(&world);
        let graph = l.generate().unwrap();
        assert_eq!(graph.targets.len(), 0);
    }

    #[test]
    fn import_cycle_is_an_error() {
        let world = MemoryWorld::new([
            ("/src/BUILD.tenjin", "import(\"//a.tenjin\")\n"),
            ("/src/a.tenjin", "import(\"//b.tenjin\")\n"),
            ("/src/b.tenjin", "import(\"//a.tenjin\")\n"),
        ]);
        let mut l = loader(&world);
        let err = l.generate().unwrap_err();
        assert!(matches!(err.kind, crate::error::ErrorKind::Generator(_)));
    }

    #[test]
    fn undeclared_argument_override_is_an_error() {
        let world = MemoryWorld::new([("/src/BUILD.tenjin", "group(\"all\") {}\n")]);
        let mut overrides = HashMap::new();
        overrides.insert("is_debug".to_string(), Value::boolean(true, Location::default()));
        let mut l = Loader::new(&world, PathBuf::from("/src"), "out/Default", "//toolchain:default", overrides, None);
        let err = l.generate().unwrap_err();
        assert!(matches!(err.kind, crate::error::ErrorKind::Generator(_)));
    }

    #[test]
    fn get_target_outputs_sees_already_committed_targets() {
        let world = MemoryWorld::new([(
            "/src/BUILD.tenjin",
            "action(\"gen\") {\n  script = \"gen.py\"\n  outputs = [\"out.h\"]\n}\naction(\"use\") {\n  script = \"gen.py\"\n  inputs = get_target_outputs(\":gen\")\n}\n",
        )]);
        let mut l = loader(&world);
        let graph = l.generate().unwrap();
        assert_eq!(graph.targets.len(), 2);
    }
}
