//! End-to-end scenarios driving the whole `Loader` -> `Resolver` pipeline
//! against an in-memory `World`, one per concrete scenario in `spec.md` §8.
//!
//! `print()` writes straight to process stdout (`src/builtins.rs`) with no
//! capture seam, so these assert success/failure and error content rather
//! than literal stdout text; see `DESIGN.md`.

use std::collections::HashMap;
use std::path::PathBuf;

use tenjin::error::ErrorKind;
use tenjin::world::test_support::MemoryWorld;
use tenjin::Loader;

fn generate(files: impl IntoIterator<Item = (&'static str, &'static str)>) -> Result<tenjin::ResolvedGraph, tenjin::Err> {
    let world = MemoryWorld::new(files);
    let mut loader = Loader::new(&world, PathBuf::from("/src"), "out/Default", "//toolchain:default", HashMap::new(), None);
    loader.generate()
}

#[test]
fn simple_assign_and_read_succeeds() {
    let graph = generate([("/src/BUILD.tenjin", "a = 1\nb = a + 2\nprint(b)\n")]).unwrap();
    assert_eq!(graph.targets.len(), 0);
}

#[test]
fn unused_declaration_names_its_location() {
    let err = generate([("/src/BUILD.tenjin", "a = 1\nb = 2\nprint(b)\n")]).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Usage(ref msg) if msg.contains("`a`")));
    assert!(err.location.is_some());
}

#[test]
fn template_hides_its_locals_from_the_unused_check() {
    let graph = generate([(
        "/src/BUILD.tenjin",
        "a = 1\ntemplate(\"t\") {\n  print(a)\n}\nt(\"x\") {}\n",
    )])
    .unwrap();
    assert_eq!(graph.targets.len(), 0);
}

#[test]
fn list_subtraction_rejects_a_missing_element() {
    let err = generate([("/src/BUILD.tenjin", "l = [1, 2, 3]\nprint(l - [4])\n")]).unwrap_err();
    match err.kind {
        ErrorKind::Generator(msg) => assert!(msg.contains("not in list")),
        other => panic!("expected a generator error, got {other:?}"),
    }
}

#[test]
fn dependency_cycle_names_the_full_witness_path() {
    let err = generate([(
        "/src/BUILD.tenjin",
        "group(\"a\") {\n  deps = [\":b\"]\n}\ngroup(\"b\") {\n  deps = [\":a\"]\n}\n",
    )])
    .unwrap_err();
    match err.kind {
        ErrorKind::Dependency(msg) => assert!(msg.contains("cycle")),
        other => panic!("expected a dependency error, got {other:?}"),
    }
}

#[test]
fn visibility_rejects_an_unlisted_dependent() {
    let err = generate([(
        "/src/BUILD.tenjin",
        "static_library(\"a\") {\n  visibility = [\":allowed\"]\n}\nexecutable(\"allowed\") {\n  deps = [\":a\"]\n}\nexecutable(\"other\") {\n  deps = [\":a\"]\n}\n",
    )])
    .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Dependency(_)));
}

#[test]
fn import_twice_is_equivalent_to_once() {
    let graph = generate([
        ("/src/BUILD.tenjin", "import(\"//common.tenjin\")\nimport(\"//common.tenjin\")\nprint(shared)\n"),
        ("/src/common.tenjin", "shared = 1\n"),
    ])
    .unwrap();
    assert_eq!(graph.targets.len(), 0);
}

#[test]
fn generating_the_same_program_twice_yields_the_same_graph() {
    let files: Vec<(&'static str, &'static str)> = vec![
        ("/src/BUILD.tenjin", "executable(\"app\") {\n  deps = [\"//lib:thing\"]\n}\n"),
        ("/src/lib/BUILD.tenjin", "static_library(\"thing\") {}\n"),
    ];
    let first = generate(files.clone()).unwrap();
    let second = generate(files).unwrap();
    assert_eq!(first.targets.len(), second.targets.len());
    for (label, target) in first.targets.iter() {
        let other = second.targets.get(label).expect("same labels resolved both runs");
        assert_eq!(target.private_deps, other.private_deps);
        assert_eq!(target.public_deps, other.public_deps);
    }
}
