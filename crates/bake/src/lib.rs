//! # bake - build definition resolution
//!
//! Turns one or more bake files into a fully resolved list of build targets and groups.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `bake` works internally.
//!
//! ### Input
//!
//! Bake files come in two syntaxes. HCL:
//! ```hcl
//! variable "TAG" {
//!   default = "latest"
//! }
//!
//! function "image" {
//!   params = [name]
//!   result = "example/${name}:${TAG}"
//! }
//!
//! group "default" {
//!   targets = ["app"]
//! }
//!
//! target "app" {
//!   context = "."
//!   tags    = [image("app")]
//! }
//! ```
//! ...and the equivalent JSON (module `json`). The syntax is chosen by file extension, see
//! [documents::Documents::load].
//!
//! ### Loading files
//!
//! Each file is parsed into syntax-neutral items: root attributes and
//! `variable`/`function`/`target`/`group` blocks ([documents::RawBlock]). Every attribute keeps its
//! unevaluated [hcl::Expression] and the [error::Location] it was declared at, so errors can point
//! at the source. [documents::Documents] keeps all files in load order.
//!
//! Nothing is evaluated while loading.
//!
//! ### Resolution
//!
//! One pass over the loaded documents ([resolve]):
//!
//! 1. **functions** ([userfunc]) - `function` blocks become callable units. Their bodies are
//!    evaluated at call time.
//! 2. **variables** ([variables]) - `variable` blocks and root attributes form a dependency graph
//!    which is walked depth-first (cycles are errors). Values are taken from injected built-ins,
//!    the environment, root attributes or defaults, in that order.
//! 3. **targets and groups** ([document]) - same-named blocks from different files are merged,
//!    `inherits` is applied and every attribute is evaluated lazily, exactly once.
//!
//! Evaluation itself ([eval]) walks the expression tree against a [context::Context] holding
//! resolved variables, user functions and the built-in function library (module `stdlib`).
//!
//! The environment and version control (for `gittag()`) are only reached through
//! [context::Environment] and [context::VersionControl], which are part of [Options].
//!
//! ### Output
//!
//! A [Document] with ordered groups and targets. Attribute values are [value::Value]s which
//! serialize via [serde].
//!
pub mod context;
pub mod document;
pub mod documents;
pub mod error;
pub mod eval;
mod json;
mod stdlib;
pub mod userfunc;
pub mod value;
pub mod variables;
mod visit;

pub use context::Options;
pub use document::{Document, Group, Target};
pub use documents::File;
pub use error::{Error, ErrorKind, Location, Result};
pub use value::Value;

use context::Context;
use documents::Documents;

/// Load and resolve files in the given order
pub fn parse_files(files: &[File], options: &Options) -> Result<Document> {
    let mut documents = Documents::default();
    for file in files {
        documents.load(file)?;
    }
    resolve(&documents, options)
}

/// Resolve a single in-memory file with default [Options]
pub fn parse_file(data: &[u8], name: &str) -> Result<Document> {
    parse_files(&[File::new(name.to_string(), data.to_vec())], &Options::default())
}

/// Resolve already loaded documents
pub fn resolve(documents: &Documents, options: &Options) -> Result<Document> {
    let mut ctx = Context::new(options);
    ctx.functions = userfunc::registry(documents)?;
    variables::resolve(documents, &mut ctx)?;
    document::resolve(documents, &ctx)
}
