//! Resolution through the public api
//!
//! Every test runs against a fake environment and a scripted version control, never the real
//! process.

use bake::context::VersionControl;
use bake::{Document, ErrorKind, File, Options, Value};
use pretty_assertions::assert_eq;
use std::collections::HashMap;

/// Answers version control queries by subcommand, failing unknown ones
#[derive(Default)]
struct ScriptedVcs {
    answers: HashMap<String, Result<String, String>>,
}

impl ScriptedVcs {
    fn answer(mut self, subcommand: &str, answer: Result<&str, &str>) -> Self {
        self.answers.insert(
            subcommand.to_string(),
            answer.map(str::to_string).map_err(str::to_string),
        );
        self
    }
}

impl VersionControl for ScriptedVcs {
    fn run(&self, args: &[&str]) -> Result<String, String> {
        let subcommand = args.iter().find(|arg| !arg.starts_with('-')).copied().unwrap_or_default();
        self.answers
            .get(subcommand)
            .cloned()
            .unwrap_or_else(|| Err(format!("unexpected query {args:?}")))
    }
}

fn options(env: &[(&str, &str)]) -> Options {
    let env: HashMap<String, String> = env
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Options::default()
        .with_environment(env)
        .with_version_control(ScriptedVcs::default().answer("tag", Err("not a git repository")))
}

fn resolve(files: &[(&str, &str)], options: &Options) -> bake::Result<Document> {
    let files: Vec<File> = files
        .iter()
        .map(|(name, data)| File::new(name.to_string(), data.as_bytes().to_vec()))
        .collect();
    bake::parse_files(&files, options)
}

fn hcl(source: &str, env: &[(&str, &str)]) -> bake::Result<Document> {
    resolve(&[("docker-bake.hcl", source)], &options(env))
}

fn json(document: &Document) -> serde_json::Value {
    serde_json::to_value(document).unwrap()
}

#[test]
fn variable_cycle() {
    let err = hcl(
        r#"
        variable "FOO" { default = BAR }
        variable "BAR" { default = FOO }
        target "app" { args = { v = FOO } }
        "#,
        &[],
    )
    .unwrap_err();

    assert!(matches!(err.kind(), ErrorKind::Cycle(_)));
    insta::assert_snapshot!(err.kind().to_string(), @r###"variable cycle not allowed for "FOO""###);
}

#[test]
fn number_from_environment() {
    let source = r#"
    variable "FOO" { default = 3 }
    target "app" {
      args = { v = FOO + 5 }
    }
    "#;

    let document = hcl(source, &[("FOO", "5.1")]).unwrap();
    assert_eq!(document.target("app").unwrap().args()["v"], "10.1");

    let err = hcl(source, &[("FOO", "NaN")]).unwrap_err();
    insta::assert_snapshot!(err.kind().to_string(), @"failed to parse FOO as number");
}

#[test]
fn bool_from_environment() {
    let source = r#"
    variable "PUSH" { default = false }
    target "app" {
      tags = [PUSH ? "pushed" : "local"]
    }
    "#;

    let cases = [
        ("1", "pushed"),
        ("true", "pushed"),
        ("F", "local"),
        ("False", "local"),
    ];
    for (raw, expected) in cases {
        let document = hcl(source, &[("PUSH", raw)]).unwrap();
        assert_eq!(document.target("app").unwrap().tags(), vec![expected], "PUSH={raw}");
    }

    let err = hcl(source, &[("PUSH", "yes")]).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::TypeCoercion { .. }));
    insta::assert_snapshot!(err.kind().to_string(), @"failed to parse PUSH as bool");
}

#[test]
fn environment_only_overrides_declared_variables() {
    let source = r#"
    FOO = "from-file"
    target "app" { args = { v = FOO } }
    "#;

    let document = hcl(source, &[("FOO", "from-env")]).unwrap();
    assert_eq!(document.target("app").unwrap().args()["v"], "from-file");
}

#[test]
fn dotted_environment_names_are_ignored() {
    let source = r#"
    variable "FOO" { default = "abc" }
    target "app" { args = { v = FOO } }
    "#;

    let document = hcl(source, &[("FOO.example.com", "nope")]).unwrap();
    assert_eq!(document.target("app").unwrap().args()["v"], "abc");
}

#[test]
fn args_union_across_files() {
    let files = [
        ("docker-bake.hcl", r#"target "app" { args = { v1 = "foo" } }"#),
        ("docker-bake.override.hcl", r#"target "app" { args = { v2 = "bar" } }"#),
    ];

    let document = resolve(&files, &options(&[])).unwrap();
    assert_eq!(
        json(&document)["target"]["app"]["args"],
        serde_json::json!({"v1": "foo", "v2": "bar"})
    );
}

#[test]
fn inherited_lists_are_replaced() {
    let document = hcl(
        r#"
        target "base" {
          tags = ["base:latest"]
          platforms = ["linux/amd64"]
        }
        target "app" {
          inherits = ["base"]
          tags = ["app:latest"]
        }
        "#,
        &[],
    )
    .unwrap();

    let app = document.target("app").unwrap();
    assert_eq!(app.tags(), vec!["app:latest"]);
    assert_eq!(app.platforms(), vec!["linux/amd64"]);
}

#[test]
fn files_merge_before_inheritance() {
    let files = [
        (
            "docker-bake.hcl",
            r#"
            target "base" {
              args = { A = "base", B = "base" }
              tags = ["base:latest"]
            }
            target "app" {
              inherits = ["base"]
              args = { C = "first" }
            }
            "#,
        ),
        (
            "docker-bake.override.hcl",
            r#"
            target "app" {
              args = { D = "second" }
            }
            target "worker" {
              args = { E = "override" }
            }
            "#,
        ),
        (
            "docker-bake.extra.hcl",
            r#"target "worker" { inherits = ["base"] }"#,
        ),
    ];

    let document = json(&resolve(&files, &options(&[])).unwrap());
    assert_eq!(
        document["target"]["app"],
        serde_json::json!({"args": {"C": "first", "D": "second"}, "tags": ["base:latest"]})
    );
    assert_eq!(
        document["target"]["worker"],
        serde_json::json!({"args": {"E": "override"}, "tags": ["base:latest"]})
    );
}

#[test]
fn user_functions() {
    let document = hcl(
        r#"
        function "inc" {
          params = [x]
          result = x + 1
        }
        function "greeting" {
          params = []
          result = "hello"
        }
        target "app" {
          args = {
            n = inc(123)
            g = greeting()
          }
        }
        "#,
        &[],
    )
    .unwrap();

    let app = document.target("app").unwrap();
    assert_eq!(app.args()["n"], "124");
    assert_eq!(app.args()["g"], "hello");
}

#[test]
fn function_without_result() {
    let err = hcl(r#"function "f" { params = [] }"#, &[]).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Arity(_)));
    insta::assert_snapshot!(
        err.kind().to_string(),
        @r###"function "f" is missing required attribute "result""###
    );
}

#[test]
fn json_documents() {
    let source = r#"{
      "variable": {
        "NAME": { "default": "world" }
      },
      "function": {
        "hello": { "params": ["inp"], "result": "hello ${inp}" }
      },
      "group": {
        "default": { "targets": ["app"] }
      },
      "target": {
        "app": {
          "tags": ["${hello(NAME)}", "plain"],
          "args": { "A": "${upper(NAME)}" }
        }
      }
    }"#;

    let document = resolve(&[("docker-bake.json", source)], &options(&[])).unwrap();
    assert_eq!(
        json(&document),
        serde_json::json!({
            "group": { "default": { "targets": ["app"] } },
            "target": { "app": { "tags": ["hello world", "plain"], "args": { "A": "WORLD" } } }
        })
    );
}

#[test]
fn hcl_and_json_merge() {
    let files = [
        ("docker-bake.json", r#"{"target": {"app": {"context": "json", "tags": ["a"]}}}"#),
        ("docker-bake.hcl", r#"target "app" { context = "hcl" }"#),
    ];

    let document = resolve(&files, &options(&[])).unwrap();
    let app = document.target("app").unwrap();
    assert_eq!(app.context(), Some("hcl"));
    assert_eq!(app.tags(), vec!["a"]);
}

#[test]
fn builtins_are_injected() {
    let options =
        options(&[("BAKE_CMD_CONTEXT", "from-env")]).with_builtin("BAKE_CMD_CONTEXT", "cwd://");
    let document = resolve(
        &[(
            "docker-bake.hcl",
            r#"
            variable "BAKE_CMD_CONTEXT" { default = "ignored" }
            target "app" { context = BAKE_CMD_CONTEXT }
            "#,
        )],
        &options,
    )
    .unwrap();

    assert_eq!(document.target("app").unwrap().context(), Some("cwd://"));
}

#[test]
fn gittag_from_ci_variable() {
    let document = hcl(
        r#"target "app" { tags = ["app:${gittag()}"] }"#,
        &[("GITHUB_REF", "refs/tags/v1.2.3")],
    )
    .unwrap();

    assert_eq!(document.target("app").unwrap().tags(), vec!["app:v1.2.3"]);
}

#[test]
fn gittag_from_version_control() {
    let options = Options::default()
        .with_environment(HashMap::<String, String>::new())
        .with_version_control(
            ScriptedVcs::default()
                .answer("tag", Ok(""))
                .answer("describe", Ok("v0.9.0")),
        );

    let document = resolve(
        &[("docker-bake.hcl", r#"target "app" { tags = ["app:${gittag()}"] }"#)],
        &options,
    )
    .unwrap();
    assert_eq!(document.target("app").unwrap().tags(), vec!["app:v0.9.0"]);
}

#[test]
fn gittag_failure() {
    let err = hcl(r#"target "app" { tags = [gittag()] }"#, &[]).unwrap_err();
    assert!(err.kind().to_string().starts_with("gittag(): "), "{err}");
}

#[test]
fn target_references_across_targets() {
    let document = hcl(
        r#"
        target "base" {
          tags = ["base:1"]
        }
        target "app" {
          args = { BASE = target.base.tags[0] }
        }
        "#,
        &[],
    )
    .unwrap();

    assert_eq!(document.target("app").unwrap().args()["BASE"], "base:1");
}

#[test]
fn selection() {
    let document = hcl(
        r#"
        group "default" { targets = ["a", "all"] }
        group "all" { targets = ["a", "b"] }
        target "a" {}
        target "b" {}
        target "c" {}
        "#,
        &[],
    )
    .unwrap();

    let names: Vec<&str> = document.expand(&[]).unwrap().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);

    let selected = document.select(&["c"]).unwrap();
    assert_eq!(json(&selected), serde_json::json!({"group": {}, "target": {"c": {}}}));

    let err = document.select(&["missing"]).unwrap_err();
    insta::assert_snapshot!(err.kind().to_string(), @r###"unknown target or group "missing""###);
}

#[test]
fn errors_point_at_source() {
    let err = hcl("target \"app\" {\n  context = NOPE\n}\n", &[]).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::UndefinedReference(_)));

    let location = err.location().unwrap();
    assert_eq!(location.file, "docker-bake.hcl");
    assert_eq!(location.range.unwrap().start.line, 2);
}

#[test]
fn resolution_is_repeatable() {
    let source = r#"
    variable "TAG" { default = "1.0" }
    function "image" {
      params = [name]
      result = "example/${name}:${TAG}"
    }
    target "base" { platforms = ["linux/amd64", "linux/arm64"] }
    target "app" {
      inherits = ["base"]
      tags = [for t in ["app", "worker"] : image(t)]
      args = { TAG = TAG }
    }
    "#;

    let first = json(&hcl(source, &[("TAG", "2.0")]).unwrap());
    let second = json(&hcl(source, &[("TAG", "2.0")]).unwrap());
    assert_eq!(first, second);
}

#[test]
fn parse_file_defaults() {
    let document =
        bake::parse_file(br#"target "app" { context = "." }"#, "docker-bake.hcl").unwrap();
    assert_eq!(
        document.target("app").unwrap().attribute("context"),
        Some(&Value::String(".".into()))
    );
}
