//! shared evaluation context
//!
//! A [Context] is built once per resolution pass. It holds
//! - resolved variables (injected built-ins first, then every `variable`/root attribute in
//!   dependency order)
//! - user defined functions (see [crate::userfunc])
//! - access to the build environment through [Environment] and [VersionControl]
//!
//! Process-wide state is read through those two seams only, so resolution can be driven by fakes in
//! tests.
use crate::error::ErrorKind;
use crate::userfunc::UserFunction;
use crate::value::Value;
use indexmap::IndexMap;
use std::cell::OnceCell;
use std::collections::HashMap;
use std::path::PathBuf;

/// Default limit for nested user function calls
pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

/// Read-only view of environment variables
pub trait Environment {
    fn get(&self, name: &str) -> Option<String>;
}

impl<S: std::hash::BuildHasher> Environment for HashMap<String, String, S> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).cloned()
    }
}

impl Environment for IndexMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        IndexMap::get(self, name).cloned()
    }
}

/// Snapshot of the process environment
///
/// Captured once so every lookup within a resolution pass sees the same values.
#[derive(Debug, Clone, Default)]
pub struct ProcessEnvironment {
    vars: HashMap<String, String>,
}

impl ProcessEnvironment {
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars_os()
                .filter_map(|(key, value)| {
                    Some((key.into_string().ok()?, value.into_string().ok()?))
                })
                .collect(),
        }
    }
}

impl Environment for ProcessEnvironment {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

/// Version control queries used by `gittag()`
pub trait VersionControl {
    /// Run a query and return the first line of its output
    fn run(&self, args: &[&str]) -> Result<String, String>;
}

/// The `git` binary, run in `dir` (or the current directory)
#[derive(Debug, Clone, Default)]
pub struct Git {
    pub dir: Option<PathBuf>,
}

impl VersionControl for Git {
    #[tracing::instrument(level = "debug", skip(self))]
    fn run(&self, args: &[&str]) -> Result<String, String> {
        let mut command = std::process::Command::new("git");
        command.args(["-c", "log.showSignature=false"]).args(args);
        if let Some(dir) = &self.dir {
            command.current_dir(dir);
        }

        let output = command.output().map_err(|err| err.to_string())?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim_end().to_string());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().replace('\'', ""))
    }
}

/// Settings for one resolution pass
pub struct Options {
    /// Pre-resolved variables, taking precedence over `variable` blocks of the same name
    pub builtins: IndexMap<String, String>,
    pub environment: Box<dyn Environment>,
    pub version_control: Box<dyn VersionControl>,
    pub max_call_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            builtins: IndexMap::new(),
            environment: Box::new(ProcessEnvironment::capture()),
            version_control: Box::new(Git::default()),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl Options {
    pub fn with_builtin(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.builtins.insert(name.into(), value.into());
        self
    }

    pub fn with_environment(mut self, environment: impl Environment + 'static) -> Self {
        self.environment = Box::new(environment);
        self
    }

    pub fn with_version_control(mut self, version_control: impl VersionControl + 'static) -> Self {
        self.version_control = Box::new(version_control);
        self
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("builtins", &self.builtins)
            .field("max_call_depth", &self.max_call_depth)
            .finish_non_exhaustive()
    }
}

pub struct Context<'o> {
    variables: IndexMap<String, Value>,
    pub(crate) functions: IndexMap<String, UserFunction>,
    options: &'o Options,
    git_tag: OnceCell<Result<String, String>>,
}

impl<'o> Context<'o> {
    pub fn new(options: &'o Options) -> Self {
        Self {
            variables: IndexMap::new(),
            functions: IndexMap::new(),
            options,
            git_tag: OnceCell::new(),
        }
    }

    pub fn declare_var(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn variables(&self) -> &IndexMap<String, Value> {
        &self.variables
    }

    pub fn function(&self, name: &str) -> Option<&UserFunction> {
        self.functions.get(name)
    }

    pub fn builtins(&self) -> &IndexMap<String, String> {
        &self.options.builtins
    }

    pub fn env(&self, name: &str) -> Option<String> {
        self.options.environment.get(name)
    }

    pub fn max_call_depth(&self) -> usize {
        self.options.max_call_depth
    }

    /// Tag of the current build, looked up at most once per pass
    pub fn git_tag(&self) -> Result<String, ErrorKind> {
        self.git_tag
            .get_or_init(|| {
                lookup_git_tag(
                    self.options.environment.as_ref(),
                    self.options.version_control.as_ref(),
                )
            })
            .clone()
            .map_err(|err| ErrorKind::TypeMismatch(format!("gittag(): {err}")))
    }
}

/// CI variables holding the tag being built, in priority order
///
/// The second element marks variables holding a full ref (`refs/tags/...`).
const CI_TAG_VARIABLES: &[(&str, bool)] = &[
    ("BUILDKITE_TAG", false),
    ("CIRCLE_TAG", false),
    ("GITHUB_REF", true),
    ("SEMAPHORE_GIT_REF", true),
    ("TRAVIS_TAG", false),
];

fn lookup_git_tag(
    environment: &dyn Environment,
    version_control: &dyn VersionControl,
) -> Result<String, String> {
    for (name, is_ref) in CI_TAG_VARIABLES {
        let Some(value) = environment.get(name) else {
            continue;
        };

        let tag = if *is_ref {
            value.strip_prefix("refs/tags/").unwrap_or_default().to_string()
        } else {
            value
        };

        if !tag.is_empty() {
            tracing::debug!(source = name, %tag, "tag from ci environment");
            return Ok(tag);
        }
    }

    let queries: [&[&str]; 2] = [
        &["tag", "--points-at", "HEAD", "--sort", "-version:creatordate"],
        &["describe", "--tags", "--abbrev=0"],
    ];

    let mut last_error = None;
    for query in queries {
        match version_control.run(query) {
            Ok(tag) if !tag.is_empty() => return Ok(tag),
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(?query, %err, "tag query failed");
                last_error = Some(err);
            }
        }
    }

    match last_error {
        Some(err) => Err(err),
        None => Ok(String::new()),
    }
}
