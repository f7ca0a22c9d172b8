//! Fixture tests
//!
//! Resolves each fixtures/*.hcl and fixtures/*.json file on its own and compares the rendered
//! document with the sibling `<name>.expected.json`.

use bake::context::VersionControl;
use bake::{File, Options};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::path::Path;

struct NoVcs;

impl VersionControl for NoVcs {
    fn run(&self, _args: &[&str]) -> Result<String, String> {
        Err("not a git repository".to_string())
    }
}

fn expected_path(path: &Path) -> std::path::PathBuf {
    let stem = path.file_stem().unwrap().to_str().unwrap();
    path.with_file_name(format!("{stem}.expected.json"))
}

fn check(path: &Path) {
    if path.to_string_lossy().ends_with(".expected.json") {
        return;
    }

    let options = Options::default()
        .with_environment(HashMap::<String, String>::new())
        .with_version_control(NoVcs)
        .with_builtin("BAKE_CMD_CONTEXT", ".");

    let name = path.file_name().unwrap().to_string_lossy().to_string();
    let file = File::new(name, std::fs::read(path).unwrap());
    let document = bake::parse_files(&[file], &options)
        .unwrap_or_else(|err| panic!("{}: {err}", path.display()));

    let expected: serde_json::Value =
        serde_json::from_slice(&std::fs::read(expected_path(path)).unwrap()).unwrap();
    assert_eq!(serde_json::to_value(&document).unwrap(), expected, "{}", path.display());
}

#[test]
fn hcl_fixtures() {
    insta::glob!("fixtures/*.hcl", |path| check(path));
}

#[test]
fn json_fixtures() {
    insta::glob!("fixtures/*.json", |path| check(path));
}
