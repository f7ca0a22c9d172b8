//! targets and groups
//!
//! Every `target`/`group` block is a contribution to the entry of its name. Contributions are kept
//! in file order and combined attribute by attribute when a value is needed:
//! - maps are unioned, later keys replacing earlier ones
//! - everything else (strings, lists, bools) is replaced by the later contribution
//!
//! Inheritance is applied on top of the merged contributions. `inherits = [a, b]` starts from `a`,
//! lets `b` replace whole attributes and finally lets the target's own attributes replace whole
//! attributes again.
//!
//! Attribute expressions are evaluated lazily and memoized per (block, attribute). Target
//! attributes can reference each other through `target.NAME.ATTR`; such references are cycle
//! checked.
use crate::context::Context;
use crate::documents::{BlockKind, Documents, RawAttribute, RawBlock};
use crate::error::{ErrorKind, Location, Result};
use crate::eval::{Evaluator, TargetLookup};
use crate::value::Value;
use indexmap::{IndexMap, IndexSet};
use serde::ser::{SerializeMap, Serializer};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub name: String,
    pub targets: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub name: String,
    /// Targets this one inherits from, already applied to `attributes`
    pub inherits: Vec<String>,
    pub attributes: IndexMap<String, Value>,
}

impl Target {
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.attribute(name).and_then(Value::as_str)
    }

    pub fn list(&self, name: &str) -> Vec<&str> {
        self.attribute(name)
            .and_then(Value::as_array)
            .map(|elements| elements.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn map(&self, name: &str) -> IndexMap<&str, &str> {
        self.attribute(name)
            .and_then(Value::as_object)
            .map(|object| {
                object
                    .iter()
                    .filter_map(|(key, value)| Some((key.as_str(), value.as_str()?)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn context(&self) -> Option<&str> {
        self.string("context")
    }

    pub fn dockerfile(&self) -> Option<&str> {
        self.string("dockerfile")
    }

    /// Build stage
    pub fn target(&self) -> Option<&str> {
        self.string("target")
    }

    pub fn args(&self) -> IndexMap<&str, &str> {
        self.map("args")
    }

    pub fn labels(&self) -> IndexMap<&str, &str> {
        self.map("labels")
    }

    pub fn tags(&self) -> Vec<&str> {
        self.list("tags")
    }

    pub fn platforms(&self) -> Vec<&str> {
        self.list("platforms")
    }
}

/// Fully resolved groups and targets, in first declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    groups: IndexMap<String, Group>,
    targets: IndexMap<String, Target>,
}

impl Document {
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.get(name)
    }

    /// Targets named directly or through (nested) groups, de-duplicated in first-seen order
    ///
    /// Without names the `default` group is expanded.
    pub fn expand(&self, names: &[&str]) -> Result<Vec<&Target>> {
        let names = match names {
            [] => &["default"][..],
            names => names,
        };

        let mut found = IndexSet::new();
        let mut stack = vec![];
        for name in names {
            self.expand_name(name, &mut stack, &mut found)?;
        }

        Ok(found.into_iter().filter_map(|name| self.targets.get(name)).collect())
    }

    fn expand_name<'s>(
        &'s self,
        name: &str,
        stack: &mut Vec<String>,
        found: &mut IndexSet<&'s str>,
    ) -> Result<()> {
        if let Some(group) = self.groups.get(name) {
            if stack.iter().any(|entry| entry == name) {
                return Err(ErrorKind::Cycle(format!("group cycle through {name:?}")).into());
            }
            stack.push(name.to_string());
            for member in &group.targets {
                self.expand_name(member, stack, found)?;
            }
            stack.pop();
            return Ok(());
        }

        match self.targets.get_key_value(name) {
            Some((key, _)) => {
                found.insert(key.as_str());
                Ok(())
            }
            None => Err(ErrorKind::UndefinedReference(format!(
                "unknown target or group {name:?}"
            ))
            .into()),
        }
    }

    /// Sub-document holding the requested groups (including nested ones) and the targets they
    /// expand to
    pub fn select(&self, names: &[&str]) -> Result<Document> {
        let targets = self.expand(names)?;

        let mut groups = IndexMap::new();
        let mut pending: Vec<&str> = match names {
            [] => vec!["default"],
            names => names.to_vec(),
        };
        while let Some(name) = pending.pop() {
            if let Some(group) = self.groups.get(name) {
                if groups.insert(name.to_string(), group.clone()).is_none() {
                    pending.extend(group.targets.iter().map(String::as_str));
                }
            }
        }

        Ok(Document {
            groups: self
                .groups
                .iter()
                .filter(|(name, _)| groups.contains_key(*name))
                .map(|(name, group)| (name.clone(), group.clone()))
                .collect(),
            targets: targets
                .into_iter()
                .map(|target| (target.name.clone(), target.clone()))
                .collect(),
        })
    }
}

impl serde::ser::Serialize for Group {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut ser = serializer.serialize_map(None)?;
        if let Some(description) = &self.description {
            ser.serialize_entry("description", description)?;
        }
        ser.serialize_entry("targets", &self.targets)?;
        ser.end()
    }
}

impl serde::ser::Serialize for Target {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serde::Serialize::serialize(&self.attributes, serializer)
    }
}

impl serde::ser::Serialize for Document {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut ser = serializer.serialize_map(Some(2))?;
        ser.serialize_entry("group", &self.groups)?;
        ser.serialize_entry("target", &self.targets)?;
        ser.end()
    }
}

/// Expected shape of well known target attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    String,
    List,
    Map,
    Bool,
}

fn shape(attribute: &str) -> Option<Shape> {
    match attribute {
        "context" | "dockerfile" | "dockerfile-inline" | "target" | "network" | "shm-size"
        | "description" => Some(Shape::String),
        "tags" | "platforms" | "cache-from" | "cache-to" | "secret" | "ssh" | "output" | "attest"
        | "annotations" | "no-cache-filter" | "ulimits" | "entitlements" | "inherits"
        | "targets" => Some(Shape::List),
        "args" | "labels" | "contexts" => Some(Shape::Map),
        "pull" | "no-cache" => Some(Shape::Bool),
        _ => None,
    }
}

fn shape_error(attribute: &str, expected: &str, value: &Value) -> ErrorKind {
    ErrorKind::TypeMismatch(format!(
        "{attribute} must be {expected}, got {}",
        value.type_name()
    ))
}

fn scalar_string(attribute: &str, expected: &str, value: Value) -> Result<String, ErrorKind> {
    match value {
        Value::Array(_) | Value::Object(_) | Value::Null => {
            Err(shape_error(attribute, expected, &value))
        }
        scalar => scalar.to_template_string(),
    }
}

/// Bring an evaluated attribute into its canonical shape, `None` when it is unset
fn normalize(attribute: &str, value: Value) -> Result<Option<Value>, ErrorKind> {
    if value.is_null() {
        return Ok(None);
    }

    let normalized = match (shape(attribute), value) {
        (Some(Shape::String), value) => Value::String(scalar_string(attribute, "a string", value)?),
        (Some(Shape::List), Value::Array(elements)) => Value::Array(
            elements
                .into_iter()
                .filter(|element| !element.is_null())
                .map(|element| {
                    scalar_string(attribute, "a list of strings", element).map(Value::String)
                })
                .collect::<Result<_, _>>()?,
        ),
        (Some(Shape::Map), Value::Object(object)) => Value::Object(
            object
                .into_iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(key, value)| {
                    let value = scalar_string(attribute, "a map of strings", value)?;
                    Ok((key, Value::String(value)))
                })
                .collect::<Result<_, ErrorKind>>()?,
        ),
        (Some(Shape::Bool), value) => Value::Boolean(
            value
                .to_bool()
                .map_err(|_| shape_error(attribute, "a bool", &value))?,
        ),
        (Some(Shape::List), value) => {
            return Err(shape_error(attribute, "a list of strings", &value))
        }
        (Some(Shape::Map), value) => {
            return Err(shape_error(attribute, "a map of strings", &value))
        }
        (None, value) => drop_nulls(value),
    };

    Ok(Some(normalized))
}

fn drop_nulls(value: Value) -> Value {
    match value {
        Value::Object(object) => Value::Object(
            object
                .into_iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(key, value)| (key, drop_nulls(value)))
                .collect(),
        ),
        Value::Array(elements) => Value::Array(elements.into_iter().map(drop_nulls).collect()),
        other => other,
    }
}

/// `[a-zA-Z0-9_-]+`
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// One block declaring a target or group
#[derive(Clone, Copy)]
struct Contribution<'d> {
    /// Position among all root blocks, identifies the block in the memo table
    id: usize,
    block: &'d RawBlock,
}

struct Merger<'d, 'c, 'o> {
    ctx: &'c Context<'o>,
    targets: IndexMap<&'d str, Vec<Contribution<'d>>>,
    groups: IndexMap<&'d str, Vec<Contribution<'d>>>,
    /// Evaluated expressions, by (block id, attribute)
    memo: HashMap<(usize, &'d str), Value>,
    /// Merged and inherited target attributes
    resolved: HashMap<(String, String), Option<Value>>,
    /// Target attributes currently being resolved
    stack: Vec<(String, String)>,
    parents: HashMap<String, Vec<String>>,
}

impl<'d, 'c, 'o> Merger<'d, 'c, 'o> {
    fn new(documents: &'d Documents, ctx: &'c Context<'o>) -> Result<Self> {
        let mut targets: IndexMap<&str, Vec<Contribution>> = IndexMap::new();
        let mut groups: IndexMap<&str, Vec<Contribution>> = IndexMap::new();

        for (id, (source, block)) in documents.blocks().enumerate() {
            let (own, other) = match block.kind {
                BlockKind::Target => (&mut targets, &groups),
                BlockKind::Group => (&mut groups, &targets),
                BlockKind::Variable | BlockKind::Function => continue,
            };

            if !is_valid_name(&block.name) {
                return Err(crate::Error::new(ErrorKind::Parse(format!(
                    "invalid {} name {:?}, only [a-zA-Z0-9_-] are allowed",
                    block.kind.as_str(),
                    block.name
                )))
                .at(Some(&block.location)));
            }

            if other.contains_key(block.name.as_str()) {
                return Err(crate::Error::new(ErrorKind::Merge(format!(
                    "{:?} is declared as both a target and a group",
                    block.name
                )))
                .at(Some(&block.location)));
            }

            let contributions = own.entry(block.name.as_str()).or_default();
            if !contributions.is_empty() {
                tracing::debug!(
                    kind = block.kind.as_str(),
                    name = %block.name,
                    file = documents.source_name(source).unwrap_or_default(),
                    "merging repeated declaration"
                );
            }
            contributions.push(Contribution { id, block });
        }

        Ok(Self {
            ctx,
            targets,
            groups,
            memo: HashMap::new(),
            resolved: HashMap::new(),
            stack: vec![],
            parents: HashMap::new(),
        })
    }

    fn evaluate(
        &mut self,
        contribution: Contribution<'d>,
        attribute: &'d RawAttribute,
    ) -> Result<Value> {
        let key = (contribution.id, attribute.key.as_str());
        if let Some(value) = self.memo.get(&key) {
            return Ok(value.clone());
        }

        let ctx = self.ctx;
        let value = Evaluator::new(ctx, self)
            .evaluate(&attribute.expr)
            .map_err(|err| err.at(Some(&attribute.location)))?;
        self.memo.insert(key, value.clone());
        Ok(value)
    }

    /// Fold all contributions of `name` that declare `attribute`
    fn merged(
        &mut self,
        contributions: &[Contribution<'d>],
        attribute: &str,
    ) -> Result<Option<Value>> {
        let mut merged: Option<Value> = None;
        for &contribution in contributions {
            let block = contribution.block;
            let Some(raw) = block.attributes.get(attribute) else {
                continue;
            };

            let value = self.evaluate(contribution, raw)?;
            let Some(value) = normalize(attribute, value)
                .map_err(|kind| crate::Error::new(kind).at(Some(&raw.location)))?
            else {
                continue;
            };

            merged = Some(match (merged, value) {
                (Some(Value::Object(mut base)), Value::Object(overlay)) => {
                    base.extend(overlay);
                    Value::Object(base)
                }
                (previous, value) => {
                    if previous.is_some() {
                        tracing::debug!(
                            name = %block.name,
                            %attribute,
                            "later declaration replaces attribute"
                        );
                    }
                    value
                }
            });
        }
        Ok(merged)
    }

    fn contributions(&self, target: &str) -> Vec<Contribution<'d>> {
        self.targets.get(target).cloned().unwrap_or_default()
    }

    /// Direct parents of a target
    fn parents(&mut self, target: &str) -> Result<Vec<String>> {
        if let Some(parents) = self.parents.get(target) {
            return Ok(parents.clone());
        }

        let contributions = self.contributions(target);
        let parents: Vec<String> = match self.merged(&contributions, "inherits")? {
            Some(Value::Array(elements)) => elements
                .into_iter()
                .filter_map(|element| element.as_str().map(str::to_string))
                .collect(),
            _ => vec![],
        };

        for parent in &parents {
            if !self.targets.contains_key(parent.as_str()) {
                let location = contributions
                    .iter()
                    .rev()
                    .find_map(|contribution| contribution.block.attributes.get("inherits"))
                    .map(|attribute| &attribute.location);
                return Err(crate::Error::new(ErrorKind::UndefinedReference(format!(
                    "target {target:?} inherits from unknown target {parent:?}"
                )))
                .at(location));
            }
        }

        self.parents.insert(target.to_string(), parents.clone());
        Ok(parents)
    }

    /// Reject inheritance cycles before any attribute is resolved through them
    fn check_inheritance(&mut self) -> Result<()> {
        fn visit(
            merger: &mut Merger,
            target: &str,
            path: &mut Vec<String>,
            done: &mut IndexSet<String>,
        ) -> Result<()> {
            if done.contains(target) {
                return Ok(());
            }
            if let Some(start) = path.iter().position(|entry| entry == target) {
                let cycle = path[start..]
                    .iter()
                    .map(String::as_str)
                    .chain([target])
                    .collect::<Vec<_>>()
                    .join(" -> ");
                let location = merger.block_location(target);
                return Err(
                    crate::Error::new(ErrorKind::Cycle(format!("inheritance cycle: {cycle}")))
                        .at(location.as_ref()),
                );
            }

            path.push(target.to_string());
            for parent in merger.parents(target)? {
                visit(merger, &parent, path, done)?;
            }
            path.pop();
            done.insert(target.to_string());
            Ok(())
        }

        let names: Vec<&str> = self.targets.keys().copied().collect();
        let mut done = IndexSet::new();
        for name in names {
            visit(self, name, &mut vec![], &mut done)?;
        }
        Ok(())
    }

    fn block_location(&self, target: &str) -> Option<Location> {
        self.targets
            .get(target)
            .and_then(|contributions| contributions.first())
            .map(|contribution| contribution.block.location.clone())
    }

    /// Merged and inherited value of one target attribute
    fn attribute(&mut self, target: &str, attribute: &str) -> Result<Option<Value>> {
        let key = (target.to_string(), attribute.to_string());
        if let Some(value) = self.resolved.get(&key) {
            return Ok(value.clone());
        }

        if self.stack.contains(&key) {
            return Err(ErrorKind::Cycle(format!(
                "reference cycle through target.{target}.{attribute}"
            ))
            .into());
        }

        tracing::trace!(%target, %attribute, "resolving target attribute");
        self.stack.push(key.clone());
        let result = self.resolve_attribute(target, attribute);
        self.stack.pop();

        let value = result?;
        self.resolved.insert(key, value.clone());
        Ok(value)
    }

    fn resolve_attribute(&mut self, target: &str, attribute: &str) -> Result<Option<Value>> {
        let contributions = self.contributions(target);
        if let Some(own) = self.merged(&contributions, attribute)? {
            return Ok(Some(own));
        }

        let mut inherited = None;
        for parent in self.parents(target)? {
            if let Some(value) = self.attribute(&parent, attribute)? {
                inherited = Some(value);
            }
        }
        Ok(inherited)
    }

    /// Attribute names of a target: inherited ones first, then its own
    fn attribute_names(&mut self, target: &str, names: &mut IndexSet<String>) -> Result<()> {
        for parent in self.parents(target)? {
            self.attribute_names(&parent, names)?;
        }
        for contribution in self.contributions(target) {
            names.extend(
                contribution
                    .block
                    .attributes
                    .keys()
                    .filter(|key| key.as_str() != "inherits")
                    .cloned(),
            );
        }
        Ok(())
    }

    fn target(&mut self, name: &str) -> Result<Target> {
        let mut names = IndexSet::new();
        self.attribute_names(name, &mut names)?;

        let mut attributes = IndexMap::new();
        for attribute in names {
            if let Some(value) = self.attribute(name, &attribute)? {
                attributes.insert(attribute, value);
            }
        }

        Ok(Target {
            name: name.to_string(),
            inherits: self.parents(name)?,
            attributes,
        })
    }

    fn group(&mut self, name: &str) -> Result<Group> {
        let contributions = self.groups.get(name).cloned().unwrap_or_default();

        let mut targets: Vec<String> = vec![];
        let mut description = None;
        for contribution in contributions {
            let block = contribution.block;
            for (key, raw) in &block.attributes {
                let value = self.evaluate(contribution, raw)?;
                let value = normalize(key, value)
                    .map_err(|kind| crate::Error::new(kind).at(Some(&raw.location)))?;

                match (key.as_str(), value) {
                    (_, None) => {}
                    ("targets", Some(Value::Array(members))) => {
                        for member in members.iter().filter_map(Value::as_str) {
                            if !targets.iter().any(|target| target == member) {
                                targets.push(member.to_string());
                            }
                        }
                    }
                    ("description", Some(Value::String(text))) => description = Some(text),
                    (key, _) => {
                        return Err(crate::Error::new(ErrorKind::Parse(format!(
                            "unsupported attribute {key:?} in group {name:?}"
                        )))
                        .at(Some(&raw.location)))
                    }
                }
            }
        }

        Ok(Group {
            name: name.to_string(),
            targets,
            description,
        })
    }
}

impl TargetLookup for Merger<'_, '_, '_> {
    fn target_attribute(&mut self, target: &str, attribute: &str) -> Result<Value> {
        if !self.targets.contains_key(target) {
            return Err(ErrorKind::UndefinedReference(format!("unknown target {target:?}")).into());
        }

        self.attribute(target, attribute)?.ok_or_else(|| {
            ErrorKind::UndefinedReference(format!(
                "target {target:?} has no attribute {attribute:?}"
            ))
            .into()
        })
    }
}

/// Merge and resolve all targets and groups
#[tracing::instrument(level = "trace", skip_all)]
pub fn resolve(documents: &Documents, ctx: &Context) -> Result<Document> {
    let mut merger = Merger::new(documents, ctx)?;
    merger.check_inheritance()?;

    let mut document = Document::default();

    let group_names: Vec<&str> = merger.groups.keys().copied().collect();
    for name in group_names {
        document.groups.insert(name.to_string(), merger.group(name)?);
    }

    let target_names: Vec<&str> = merger.targets.keys().copied().collect();
    for name in target_names {
        document.targets.insert(name.to_string(), merger.target(name)?);
    }

    tracing::info!(
        groups = document.groups.len(),
        targets = document.targets.len(),
        "resolved document"
    );
    Ok(document)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::Options;
    use crate::documents;
    use crate::{userfunc, variables};
    use pretty_assertions::assert_eq;

    fn resolve_documents(documents: &Documents) -> Result<Document> {
        let options = Options::default().with_environment(HashMap::<String, String>::new());
        let mut ctx = Context::new(&options);
        ctx.functions = userfunc::registry(documents)?;
        variables::resolve(documents, &mut ctx)?;
        resolve(documents, &ctx)
    }

    #[test]
    fn maps_union_across_files() {
        let documents = documents! {
            "a.hcl" => r#"target "app" {
              args = { v1 = "x" }
              tags = ["a"]
            }"#,
            "b.hcl" => r#"target "app" {
              args = { v2 = "y" }
              tags = ["b"]
            }"#
        };

        let document = resolve_documents(&documents).unwrap();
        let app = document.target("app").unwrap();
        assert_eq!(app.args(), IndexMap::from([("v1", "x"), ("v2", "y")]));
        assert_eq!(app.tags(), vec!["b"]);
    }

    #[test]
    fn inheritance_replaces_whole_fields() {
        let documents = documents! {r#"
        target "webapp" {
          args = { buildno = "123" }
          dockerfile = "webapp.Dockerfile"
        }
        target "plus" {
          inherits = ["webapp"]
          args = { other = "true" }
        }
        "#};

        let document = resolve_documents(&documents).unwrap();
        let plus = document.target("plus").unwrap();
        assert_eq!(plus.args(), IndexMap::from([("other", "true")]));
        assert_eq!(plus.dockerfile(), Some("webapp.Dockerfile"));
        assert_eq!(plus.inherits, vec!["webapp"]);
    }

    #[test]
    fn later_parents_win() {
        let documents = documents! {r#"
        target "a" {
          context = "a"
          target = "stage-a"
        }
        target "b" { context = "b" }
        target "c" { inherits = ["a", "b"] }
        "#};

        let document = resolve_documents(&documents).unwrap();
        let c = document.target("c").unwrap();
        assert_eq!(c.context(), Some("b"));
        assert_eq!(c.target(), Some("stage-a"));
    }

    #[test]
    fn inheritance_cycle() {
        let documents = documents! {r#"
        target "a" { inherits = ["b"] }
        target "b" { inherits = ["a"] }
        "#};

        let err = resolve_documents(&documents).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Cycle(_)));
        assert!(err.to_string().contains("a -> b -> a"));
    }

    #[test]
    fn unknown_parent() {
        let documents = documents! {r#"target "a" { inherits = ["nope"] }"#};
        let err = resolve_documents(&documents).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UndefinedReference(_)));
    }

    #[test]
    fn target_attribute_references() {
        let documents = documents! {r#"
        target "base" { tags = ["base:latest"] }
        target "app" {
          tags = concat(target.base.tags, ["app:latest"])
          labels = { base = target["base"].tags[0] }
        }
        "#};

        let document = resolve_documents(&documents).unwrap();
        let app = document.target("app").unwrap();
        assert_eq!(app.tags(), vec!["base:latest", "app:latest"]);
        assert_eq!(app.labels(), IndexMap::from([("base", "base:latest")]));
    }

    #[test]
    fn target_attribute_reference_cycle() {
        let documents = documents! {r#"
        target "a" { context = target.b.context }
        target "b" { context = target.a.context }
        "#};

        let err = resolve_documents(&documents).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Cycle(_)));
    }

    #[test]
    fn groups_concatenate_members() {
        let documents = documents! {
            "a.hcl" => r#"group "default" { targets = ["a", "b"] }
            target "a" {}
            target "b" {}
            target "c" {}"#,
            "b.hcl" => r#"group "default" { targets = ["b", "c"] }"#
        };

        let document = resolve_documents(&documents).unwrap();
        assert_eq!(document.group("default").unwrap().targets, vec!["a", "b", "c"]);
    }

    #[test]
    fn target_and_group_share_name() {
        let documents = documents! {r#"
        target "x" {}
        group "x" { targets = [] }
        "#};

        let err = resolve_documents(&documents).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Merge(_)));
    }

    #[test]
    fn invalid_names() {
        let documents = documents! {r#"target "a.b" {}"#};
        let err = resolve_documents(&documents).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Parse(_)));
    }

    #[test]
    fn normalization() {
        let documents = documents! {r#"
        target "app" {
          args = { n = 1, b = true, gone = null }
          tags = ["a", null]
          pull = "true"
          context = null
          custom = { keep = 1, drop = null }
        }
        "#};

        let document = resolve_documents(&documents).unwrap();
        let app = document.target("app").unwrap();
        assert_eq!(app.args(), IndexMap::from([("n", "1"), ("b", "true")]));
        assert_eq!(app.tags(), vec!["a"]);
        assert_eq!(app.attribute("pull"), Some(&Value::Boolean(true)));
        assert_eq!(app.context(), None);
        assert_eq!(app.attribute("custom").unwrap().to_string(), r#"{"keep":1}"#);
    }

    #[test]
    fn shape_mismatch() {
        let documents = documents! {r#"target "app" { tags = { a = "b" } }"#};
        let err = resolve_documents(&documents).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::TypeMismatch(_)));
        assert!(err.location().is_some());
    }

    #[test]
    fn expand_groups() {
        let documents = documents! {r#"
        group "default" { targets = ["all"] }
        group "all" { targets = ["a", "b", "a"] }
        target "a" {}
        target "b" {}
        "#};

        let document = resolve_documents(&documents).unwrap();
        let names = |targets: Vec<&Target>| {
            targets
                .into_iter()
                .map(|t| t.name.clone())
                .collect::<Vec<_>>()
        };

        assert_eq!(names(document.expand(&[]).unwrap()), vec!["a", "b"]);
        assert_eq!(names(document.expand(&["b", "all"]).unwrap()), vec!["b", "a"]);
        assert!(matches!(
            document.expand(&["nope"]).unwrap_err().kind(),
            ErrorKind::UndefinedReference(_)
        ));

        let selected = document.select(&["all"]).unwrap();
        assert_eq!(selected.groups().count(), 1);
        assert_eq!(selected.targets().count(), 2);
    }

    #[test]
    fn group_cycle() {
        let documents = documents! {r#"
        group "a" { targets = ["b"] }
        group "b" { targets = ["a"] }
        "#};

        let document = resolve_documents(&documents).unwrap();
        assert!(matches!(document.expand(&["a"]).unwrap_err().kind(), ErrorKind::Cycle(_)));
    }

    #[test]
    fn serialization() {
        let documents = documents! {r#"
        group "default" { targets = ["app"] }
        target "app" {
          context = "."
          args = { A = "1" }
        }
        "#};

        let document = resolve_documents(&documents).unwrap();
        assert_eq!(
            serde_json::to_string(&document).unwrap(),
            concat!(
                r#"{"group":{"default":{"targets":["app"]}},"#,
                r#""target":{"app":{"context":".","args":{"A":"1"}}}}"#
            )
        );
    }
}
