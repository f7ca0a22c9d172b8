//! collection of parsed bake files
//!
//! [Documents] tracks
//! - the source name and text of every loaded file
//! - the root blocks (`variable`, `function`, `target`, `group`)
//! - the root attributes
//! and defines a numeric index for each. Once added those indices are stable (removal is not
//! possible).
//!
//! Nothing is evaluated here. Each attribute keeps its unevaluated [hcl::Expression] together with
//! the [Location] it was declared at.
use crate::error::{ErrorKind, Location, Position, Range, Result};
use hcl_edit::structure::{Body, Structure};
use hcl_edit::Span;
use indexmap::IndexMap;
use std::path::Path;

/// A named input file
#[derive(derive_new::new, Debug, Clone)]
pub struct File {
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Variable,
    Function,
    Target,
    Group,
}

impl BlockKind {
    pub fn from_ident(ident: &str) -> Option<Self> {
        match ident {
            "variable" => Some(BlockKind::Variable),
            "function" => Some(BlockKind::Function),
            "target" => Some(BlockKind::Target),
            "group" => Some(BlockKind::Group),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Variable => "variable",
            BlockKind::Function => "function",
            BlockKind::Target => "target",
            BlockKind::Group => "group",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RawAttribute {
    pub key: String,
    pub expr: hcl::Expression,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct RawBlock {
    pub kind: BlockKind,
    pub name: String,
    pub attributes: IndexMap<String, RawAttribute>,
    pub location: Location,
}

/// Syntax-neutral root element of a single file
#[derive(Debug, Clone)]
pub enum Item {
    Attribute(RawAttribute),
    Block(RawBlock),
}

#[derive(Default, Debug)]
pub struct Documents {
    sources: Vec<String>,
    root_attributes: Vec<(usize, RawAttribute)>,
    root_blocks: Vec<(usize, RawBlock)>,
}

impl Documents {
    /// Inserts and indexes the items of one file
    pub fn insert(&mut self, name: impl Into<String>, items: Vec<Item>) {
        let source_index = self.sources.len();
        self.sources.push(name.into());

        for item in items {
            match item {
                Item::Block(block) => self.root_blocks.push((source_index, block)),
                Item::Attribute(attribute) => self.root_attributes.push((source_index, attribute)),
            }
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = (usize, &RawAttribute)> {
        self.root_attributes
            .iter()
            .map(|(source_index, attribute)| (*source_index, attribute))
    }

    pub fn blocks(&self) -> impl Iterator<Item = (usize, &RawBlock)> {
        self.root_blocks
            .iter()
            .map(|(source_index, block)| (*source_index, block))
    }

    pub fn blocks_of(&self, kind: BlockKind) -> impl Iterator<Item = &RawBlock> {
        self.root_blocks
            .iter()
            .map(|(_, block)| block)
            .filter(move |block| block.kind == kind)
    }

    /// Name of the file an item came from, by the index paired with it in
    /// [Self::attributes]/[Self::blocks]
    pub fn source_name(&self, index: usize) -> Option<&str> {
        self.sources.get(index).map(String::as_str)
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}

impl Documents {
    /// Load one file, selecting the syntax by file extension
    ///
    /// `.json` is read as JSON, `.hcl` as HCL. Any other name is tried as HCL first and then as
    /// JSON; when both fail the HCL error is returned.
    pub fn load(&mut self, file: &File) -> Result<()> {
        tracing::info!(name = %file.name, "loading file");

        let text = std::str::from_utf8(&file.data).map_err(|err| {
            crate::Error::new(ErrorKind::Parse(format!("file is not valid utf-8: {err}")))
                .at(Some(&Location::new(file.name.clone(), None)))
        })?;

        let items = if file.name.ends_with(".json") {
            crate::json::parse(text, &file.name)?
        } else if file.name.ends_with(".hcl") {
            parse_hcl(text, &file.name)?
        } else {
            match parse_hcl(text, &file.name) {
                Ok(items) => items,
                Err(hcl_error) => match crate::json::parse(text, &file.name) {
                    Ok(items) => {
                        tracing::debug!(name = %file.name, "loaded as json after hcl parse failed");
                        items
                    }
                    Err(_) => return Err(hcl_error),
                },
            }
        };

        self.insert(file.name.clone(), items);
        Ok(())
    }

    pub fn load_path(&mut self, path: &Path) -> std::result::Result<(), LoadError> {
        let data = std::fs::read(path)?;
        self.load(&File::new(path.display().to_string(), data))?;
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    Bake(#[from] crate::Error),
}

/// Parse HCL block syntax into syntax-neutral items
pub(crate) fn parse_hcl(text: &str, file: &str) -> Result<Vec<Item>> {
    let body = hcl_edit::parser::parse_body(text).map_err(|err| {
        let position = Position {
            line: err.location().line(),
            column: err.location().column(),
        };
        crate::Error::new(ErrorKind::Parse(err.message().to_string())).at(Some(&Location::new(
            file.to_string(),
            Some(Range {
                start: position,
                end: position,
            }),
        )))
    })?;

    let locate = |span: Option<std::ops::Range<usize>>| {
        Location::new(
            file.to_string(),
            span.map(|span| Range::from_span(text, span)),
        )
    };

    let mut items = vec![];
    for structure in body {
        match structure {
            Structure::Attribute(attribute) => items.push(Item::Attribute(RawAttribute {
                key: attribute.key.as_str().to_string(),
                location: locate(attribute.span()),
                expr: attribute.value.into(),
            })),
            Structure::Block(block) => {
                let location = locate(block.span());
                let kind = BlockKind::from_ident(block.ident.as_str()).ok_or_else(|| {
                    parse_error(
                        format!("unsupported block type {:?}", block.ident.as_str()),
                        &location,
                    )
                })?;

                let name = match block.labels.as_slice() {
                    [label] => label.as_str().to_string(),
                    [] => {
                        return Err(parse_error(
                            format!("{} block requires a name label", kind.as_str()),
                            &location,
                        ))
                    }
                    _ => {
                        return Err(parse_error(
                            format!("{} block takes exactly one label", kind.as_str()),
                            &location,
                        ))
                    }
                };

                let attributes = block_attributes(block.body, kind, &name, &locate)?;
                items.push(Item::Block(RawBlock {
                    kind,
                    name,
                    attributes,
                    location,
                }));
            }
        }
    }

    Ok(items)
}

fn block_attributes(
    body: Body,
    kind: BlockKind,
    name: &str,
    locate: &dyn Fn(Option<std::ops::Range<usize>>) -> Location,
) -> Result<IndexMap<String, RawAttribute>> {
    let mut attributes = IndexMap::new();
    for structure in body {
        match structure {
            Structure::Attribute(attribute) => {
                let location = locate(attribute.span());
                let key = attribute.key.as_str().to_string();
                if attributes.contains_key(&key) {
                    return Err(parse_error(
                        format!("duplicate attribute {key:?} in {} {name:?}", kind.as_str()),
                        &location,
                    ));
                }
                attributes.insert(
                    key.clone(),
                    RawAttribute {
                        key,
                        expr: attribute.value.into(),
                        location,
                    },
                );
            }
            Structure::Block(nested) => {
                return Err(parse_error(
                    format!(
                        "unsupported nested block {:?} in {} {name:?}",
                        nested.ident.as_str(),
                        kind.as_str()
                    ),
                    &locate(nested.span()),
                ))
            }
        }
    }
    Ok(attributes)
}

pub(crate) fn parse_error(message: String, location: &Location) -> crate::Error {
    crate::Error::new(ErrorKind::Parse(message)).at(Some(location))
}

/// Utility macro to create [Documents] from in-memory files
///
/// Create from a single HCL document (named `docker-bake.hcl`)
/// ```
/// # use bake::documents;
/// documents!("target \"app\" {}");
/// ```
///
/// Create from multiple documents (name selects the syntax)
/// ```
/// # use bake::documents;
/// documents! {
///   "one.hcl" => "FOO = 1",
///   "two.json" => r#"{"BAR": 2}"#
/// };
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use bake::documents;
/// documents!("not = valid = hcl");
/// ```
#[macro_export]
macro_rules! documents {
    // single document
    { $expr:expr } => {
        $crate::documents! { "docker-bake.hcl" => $expr }
    };
    // multi document with names
    { $($name:expr => $expr:expr),+ } => {{
        let mut docs = $crate::documents::Documents::default();
        $(
            docs.load(&$crate::documents::File::new($name.into(), $expr.as_bytes().to_vec()))
                .expect("document must parse");
        )+

        docs
    }};
}
