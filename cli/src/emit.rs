//! Ninja-file emitter: formatting only, per `spec.md` §1 ("the Ninja-file
//! emitter's textual formatting ... is explicitly out of scope" for the
//! core crate). The graph walk, label resolution, and propagation already
//! happened in `tenjin::resolver`; this module turns the finished
//! [`ResolvedGraph`] into lines of Ninja syntax.
//!
//! Grounded on `n2o5`'s `BuildMethod::write_human_readable` (`src/graph.rs`):
//! write straight into a `String`, shlex-quoting anything that becomes a
//! shell word.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use tenjin::target::{Label, LabelTable, TargetType};
use tenjin::{ResolvedGraph, ResolvedTarget};

/// One `.ninja` file's text per toolchain, plus the root `build.ninja` that
/// includes them (`spec.md` §6 "Output").
pub struct EmittedFiles {
    pub toolchain_files: BTreeMap<String, String>,
    pub root_file: String,
}

pub fn emit(graph: &ResolvedGraph, labels: &LabelTable) -> EmittedFiles {
    let mut by_toolchain: BTreeMap<String, Vec<&ResolvedTarget>> = BTreeMap::new();
    for target in graph.targets.values() {
        by_toolchain.entry(toolchain_file_stem(&target.toolchain)).or_default().push(target);
    }

    let mut toolchain_files = BTreeMap::new();
    for (stem, targets) in &by_toolchain {
        toolchain_files.insert(stem.clone(), emit_toolchain_file(graph, labels, targets));
    }

    let mut root_file = String::new();
    root_file.push_str("# Generated by tenjin. Do not edit.\n\n");
    for stem in toolchain_files.keys() {
        let _ = writeln!(root_file, "include {stem}.ninja");
    }
    root_file.push('\n');
    if let Some(default_target) = graph.targets.values().find(|t| t.target_type == TargetType::Executable) {
        let _ = writeln!(root_file, "default {}", build_name(labels, default_target));
    }

    EmittedFiles { toolchain_files, root_file }
}

fn toolchain_file_stem(toolchain: &str) -> String {
    let cleaned = toolchain.trim_start_matches("//").replace([':', '/'], "_");
    format!("toolchain_{cleaned}")
}

fn emit_toolchain_file(graph: &ResolvedGraph, labels: &LabelTable, targets: &[&ResolvedTarget]) -> String {
    let mut out = String::new();
    out.push_str("# Generated by tenjin. Do not edit.\n\n");
    for rule in ["cc", "cxx", "ar", "link", "stamp", "copy", "action"] {
        write_rule(&mut out, rule);
    }
    out.push('\n');
    for target in targets {
        write_build_statement(&mut out, graph, labels, target);
    }
    out
}

fn write_rule(out: &mut String, name: &str) {
    let command = match name {
        "cc" => "$cc -c $in -o $out $cflags",
        "cxx" => "$cxx -c $in -o $out $cxxflags",
        "ar" => "$ar rcs $out $in",
        "link" => "$ld -o $out $in $ldflags $libs",
        "stamp" => "touch $out",
        "copy" => "cp $in $out",
        "action" => "$script $args",
        _ => unreachable!(),
    };
    let _ = writeln!(out, "rule {name}\n  command = {command}\n");
}

fn rule_for(target_type: TargetType) -> &'static str {
    match target_type {
        TargetType::Group | TargetType::SourceSet => "stamp",
        TargetType::Executable | TargetType::SharedLibrary | TargetType::LoadableModule => "link",
        TargetType::StaticLibrary => "ar",
        TargetType::Action | TargetType::ActionForeach | TargetType::BundleData => "action",
        TargetType::Copy => "copy",
    }
}

/// The Ninja-visible name for a target's primary output: its first declared
/// output when one exists, otherwise a phony name derived from its label
/// (`group`/aggregating targets have no file output of their own).
fn build_name(labels: &LabelTable, target: &ResolvedTarget) -> String {
    match target.outputs.first() {
        Some(output) => output.to_string(),
        None => phony_name(labels, target.label),
    }
}

fn phony_name(labels: &LabelTable, label: Label) -> String {
    let data = labels.data(label);
    format!("{}/{}.stamp", data.dir, data.name)
}

/// The name a dependent should list in its `build` edge's order-only inputs:
/// the dependency's own resolved build name, looked up by label rather than
/// re-derived, so a dependency with an explicit `outputs` list is referenced
/// by the file it actually produces.
fn dep_build_name(graph: &ResolvedGraph, labels: &LabelTable, label: Label) -> String {
    match graph.get(label) {
        Some(target) => build_name(labels, target),
        None => phony_name(labels, label),
    }
}

fn write_build_statement(out: &mut String, graph: &ResolvedGraph, labels: &LabelTable, target: &ResolvedTarget) {
    let rule = rule_for(target.target_type);
    let outputs: Vec<String> = if target.outputs.is_empty() {
        vec![phony_name(labels, target.label)]
    } else {
        target.outputs.iter().map(|s| s.to_string()).collect()
    };
    let mut inputs: Vec<String> = target.sources.iter().map(|s| s.to_string()).collect();
    inputs.extend(target.inputs.iter().map(|s| s.to_string()));

    let deps: Vec<String> =
        target.private_deps.iter().chain(target.public_deps.iter()).map(|dep| dep_build_name(graph, labels, *dep)).collect();

    let _ = write!(out, "build {}: {}", outputs.join(" "), rule);
    for i in &inputs {
        let _ = write!(out, " {i}");
    }
    if !deps.is_empty() {
        let _ = write!(out, " | {}", deps.join(" "));
    }
    out.push('\n');

    if let Some(script) = &target.script {
        let quoted_script = shlex::try_quote(script).map(|c| c.into_owned()).unwrap_or_else(|_| script.to_string());
        let args: Vec<String> =
            target.args.iter().map(|a| shlex::try_quote(a).map(|c| c.into_owned()).unwrap_or_else(|_| a.to_string())).collect();
        let _ = writeln!(out, "  script = {quoted_script}");
        let _ = writeln!(out, "  args = {}", args.join(" "));
    }
    if !target.resolved_libs.is_empty() {
        let _ =
            writeln!(out, "  libs = {}", target.resolved_libs.iter().map(|l| format!("-l{l}")).collect::<Vec<_>>().join(" "));
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenjin::error::Location;
    use tenjin::target::PendingTarget;
    use tenjin::Resolver;

    fn loc() -> Location {
        Location::new(1, 1)
    }

    #[test]
    fn emits_a_build_edge_with_explicit_outputs() {
        let mut table = LabelTable::new();
        let label = table.intern("app", "main", "//toolchain:default");
        let mut pending = PendingTarget::new(label, TargetType::Executable, smol_str::SmolStr::new("//toolchain:default"), loc());
        pending.sources = vec![smol_str::SmolStr::new("main.cc")];
        pending.outputs = vec![smol_str::SmolStr::new("app/main")];

        let graph = Resolver::new(&table).resolve(vec![pending], vec![]).unwrap();
        let emitted = emit(&graph, &table);

        assert_eq!(emitted.toolchain_files.len(), 1);
        let text = emitted.toolchain_files.values().next().unwrap();
        assert!(text.contains("build app/main: link main.cc"));
        assert!(emitted.root_file.contains("default app/main"));
    }

    #[test]
    fn quotes_action_script_arguments() {
        let mut table = LabelTable::new();
        let label = table.intern("gen", "run", "//toolchain:default");
        let mut pending = PendingTarget::new(label, TargetType::Action, smol_str::SmolStr::new("//toolchain:default"), loc());
        pending.script = Some(smol_str::SmolStr::new("gen.py"));
        pending.args = vec![smol_str::SmolStr::new("--name"), smol_str::SmolStr::new("has space")];

        let graph = Resolver::new(&table).resolve(vec![pending], vec![]).unwrap();
        let emitted = emit(&graph, &table);
        let text = emitted.toolchain_files.values().next().unwrap();
        assert!(text.contains("args = --name 'has space'"));
    }
}
