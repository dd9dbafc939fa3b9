//! Snapshots individual lines of the Ninja text the emitter produces,
//! mirroring the teacher's own `cli/tests/` snapshot suite but over this
//! crate's textual output (the user-visible contract) rather than an AST
//! `Debug` dump.

use expect_test::expect;
use tenjin::error::Location;
use tenjin::target::{LabelTable, PendingTarget, TargetType};
use tenjin::Resolver;
use tenjin_cli::emit;

fn loc() -> Location {
    Location::new(1, 1)
}

fn find_line<'a>(text: &'a str, prefix: &str) -> &'a str {
    text.lines().find(|line| line.starts_with(prefix)).unwrap_or_else(|| panic!("no line starting with `{prefix}` in:\n{text}"))
}

#[test]
fn emits_an_executable_linked_against_a_static_library() {
    let mut table = LabelTable::new();
    let app = table.intern("app", "app", "//toolchain:default");
    let lib = table.intern("lib", "thing", "//toolchain:default");

    let mut app_target = PendingTarget::new(app, TargetType::Executable, smol_str::SmolStr::new("//toolchain:default"), loc());
    app_target.sources = vec![smol_str::SmolStr::new("app/main.cc")];
    app_target.outputs = vec![smol_str::SmolStr::new("app/app")];
    app_target.private_deps = vec![smol_str::SmolStr::new("//lib:thing")];

    let lib_target = PendingTarget::new(lib, TargetType::StaticLibrary, smol_str::SmolStr::new("//toolchain:default"), loc());

    let graph = Resolver::new(&table).resolve(vec![app_target, lib_target], vec![]).unwrap();
    let emitted = emit::emit(&graph, &table);

    assert_eq!(emitted.toolchain_files.len(), 1);
    let text = emitted.toolchain_files.values().next().unwrap();

    expect!["build app/app: link app/main.cc | lib/thing.stamp"].assert_eq(find_line(text, "build app/app"));
    expect!["build lib/thing.stamp: ar"].assert_eq(find_line(text, "build lib/thing.stamp"));
    expect!["include toolchain_toolchain_default.ninja"].assert_eq(find_line(&emitted.root_file, "include"));
    expect!["default app/app"].assert_eq(find_line(&emitted.root_file, "default"));
}

#[test]
fn emits_action_rule_with_quoted_script_and_args() {
    let mut table = LabelTable::new();
    let gen_label = table.intern("gen", "run", "//toolchain:default");
    let mut target = PendingTarget::new(gen_label, TargetType::Action, smol_str::SmolStr::new("//toolchain:default"), loc());
    target.script = Some(smol_str::SmolStr::new("gen.py"));
    target.args = vec![smol_str::SmolStr::new("--out"), smol_str::SmolStr::new("needs space")];

    let graph = Resolver::new(&table).resolve(vec![target], vec![]).unwrap();
    let emitted = emit::emit(&graph, &table);
    let text = emitted.toolchain_files.values().next().unwrap();

    expect!["  script = gen.py"].assert_eq(find_line(text, "  script ="));
    expect!["  args = --out 'needs space'"].assert_eq(find_line(text, "  args ="));
}
