//! variable resolution
//!
//! Every `variable` block and every root attribute is a node in one namespace. A node depends on
//! each other node its expressions reference, directly or through the body of a called user
//! function. Nodes are resolved depth-first, dependencies before dependents; reaching a node that
//! is still being resolved is a cycle and fails the pass.
//!
//! Precedence for the value of a name, highest first:
//! 1. injected built-ins
//! 2. an environment variable of the same name, if the name is declared by a `variable` block
//! 3. the last root attribute of that name
//! 4. the default of the last `variable` block that has one (no default at all resolves to `""`)
//!
//! Environment values are coerced to the type of the variable: the declared `type`, or else the
//! type of the default.
use crate::context::Context;
use crate::documents::{BlockKind, Documents, RawAttribute};
use crate::error::{ErrorKind, Location, Result};
use crate::eval::{Evaluator, NoTargets};
use crate::value::Value;
use crate::visit::{Reference, VisitReferences};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableType {
    String,
    Number,
    Bool,
    Any,
}

impl VariableType {
    fn from_attribute(attribute: &RawAttribute) -> Result<Self> {
        let name = match &attribute.expr {
            hcl::Expression::Variable(variable) => variable.as_str(),
            hcl::Expression::String(s) => s.as_str(),
            _ => "",
        };

        match name {
            "string" => Ok(VariableType::String),
            "number" => Ok(VariableType::Number),
            "bool" => Ok(VariableType::Bool),
            "any" => Ok(VariableType::Any),
            _ => Err(crate::Error::new(ErrorKind::Parse(
                "type must be one of string, number, bool or any".to_string(),
            ))
            .at(Some(&attribute.location))),
        }
    }

    fn of_value(value: &Value) -> Self {
        match value {
            Value::Integer(_) | Value::Decimal(_) => VariableType::Number,
            Value::Boolean(_) => VariableType::Bool,
            _ => VariableType::String,
        }
    }

    /// Convert an environment override
    pub fn coerce(self, name: &str, raw: &str) -> Result<Value, ErrorKind> {
        match self {
            VariableType::String | VariableType::Any => Ok(Value::String(raw.to_string())),
            VariableType::Number => raw
                .parse::<f64>()
                .ok()
                .filter(|number| number.is_finite())
                .map(Value::number)
                .ok_or_else(|| ErrorKind::TypeCoercion {
                    name: name.to_string(),
                    expected: "number",
                }),
            VariableType::Bool => {
                parse_bool(raw)
                    .map(Value::Boolean)
                    .ok_or_else(|| ErrorKind::TypeCoercion {
                        name: name.to_string(),
                        expected: "bool",
                    })
            }
        }
    }
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

#[derive(Debug)]
struct Node<'d> {
    /// Default of the last `variable` block declaring one
    default: Option<&'d RawAttribute>,
    /// Last root attribute
    attribute: Option<&'d RawAttribute>,
    /// Declared by at least one `variable` block
    declared: bool,
    declared_type: Option<VariableType>,
    location: Location,
}

impl<'d> Node<'d> {
    fn new(location: &Location) -> Self {
        Node {
            default: None,
            attribute: None,
            declared: false,
            declared_type: None,
            location: location.clone(),
        }
    }

    fn expressions(&self) -> impl Iterator<Item = &'d RawAttribute> {
        self.default.into_iter().chain(self.attribute)
    }
}

fn collect_nodes<'d>(
    documents: &'d Documents,
    builtins: &IndexMap<String, String>,
) -> Result<IndexMap<&'d str, Node<'d>>> {
    let mut nodes: IndexMap<&str, Node> = IndexMap::new();

    for block in documents.blocks_of(BlockKind::Variable) {
        for (key, attribute) in &block.attributes {
            if !matches!(key.as_str(), "default" | "type" | "description") {
                return Err(crate::Error::new(ErrorKind::Parse(format!(
                    "unsupported attribute {key:?} in variable {:?}",
                    block.name
                )))
                .at(Some(&attribute.location)));
            }
        }

        let node = nodes
            .entry(block.name.as_str())
            .or_insert_with(|| Node::new(&block.location));
        if !node.declared {
            node.location = block.location.clone();
        }
        node.declared = true;
        if let Some(default) = block.attributes.get("default") {
            node.default = Some(default);
        }
        if let Some(declared_type) = block.attributes.get("type") {
            node.declared_type = Some(VariableType::from_attribute(declared_type)?);
        }
    }

    for (source, attribute) in documents.attributes() {
        let node = nodes
            .entry(attribute.key.as_str())
            .or_insert_with(|| Node::new(&attribute.location));
        if node.attribute.is_some() {
            tracing::debug!(
                name = %attribute.key,
                file = documents.source_name(source).unwrap_or_default(),
                "later root attribute replaces earlier one"
            );
        }
        node.attribute = Some(attribute);
    }

    nodes.retain(|name, _| {
        let builtin = builtins.contains_key(*name);
        if builtin {
            tracing::debug!(%name, "injected built-in takes precedence over declaration");
        }
        !builtin
    });

    Ok(nodes)
}

/// Variables used by a user function, following calls into other user functions
fn function_variables<'c>(
    ctx: &'c Context,
    name: &str,
    visited: &mut HashSet<&'c str>,
    out: &mut Vec<String>,
) {
    let Some(function) = ctx.function(name) else {
        return;
    };
    if !visited.insert(function.name.as_str()) {
        return;
    }

    for reference in function.free_references() {
        match reference {
            Reference::Variable(variable) => out.push(variable),
            Reference::Function(callee) => function_variables(ctx, &callee, visited, out),
        }
    }
}

fn dependencies<'d>(
    node: &Node<'d>,
    nodes: &IndexMap<&'d str, Node<'d>>,
    ctx: &Context,
) -> Vec<&'d str> {
    let mut names = vec![];
    for attribute in node.expressions() {
        attribute.expr.visit_references(&mut |reference: &Reference| match reference {
            Reference::Variable(name) => names.push(name.clone()),
            Reference::Function(function) => {
                function_variables(ctx, function, &mut HashSet::new(), &mut names)
            }
        });
    }

    let mut dependencies: Vec<&'d str> = vec![];
    for name in names {
        if let Some((&key, _)) = nodes.get_key_value(name.as_str()) {
            if !dependencies.contains(&key) {
                dependencies.push(key);
            }
        }
    }
    dependencies
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    OnStack,
    Done,
}

/// Depth-first post order of the dependency graph
fn evaluation_order<'d>(
    nodes: &IndexMap<&'d str, Node<'d>>,
    edges: &HashMap<&'d str, Vec<&'d str>>,
) -> Result<Vec<&'d str>> {
    fn visit<'d>(
        name: &'d str,
        nodes: &IndexMap<&'d str, Node<'d>>,
        edges: &HashMap<&'d str, Vec<&'d str>>,
        marks: &mut HashMap<&'d str, Mark>,
        order: &mut Vec<&'d str>,
    ) -> Result<()> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::OnStack) => {
                return Err(crate::Error::new(ErrorKind::Cycle(format!(
                    "variable cycle not allowed for {name:?}"
                )))
                .at(nodes.get(name).map(|node| &node.location)))
            }
            None => {}
        }

        tracing::trace!(%name, "visiting variable");
        marks.insert(name, Mark::OnStack);
        for &dependency in edges.get(name).into_iter().flatten() {
            visit(dependency, nodes, edges, marks, order)?;
        }
        marks.insert(name, Mark::Done);
        order.push(name);
        Ok(())
    }

    let mut marks = HashMap::new();
    let mut order = vec![];
    for &name in nodes.keys() {
        visit(name, nodes, edges, &mut marks, &mut order)?;
    }
    Ok(order)
}

fn evaluate(ctx: &Context, attribute: &RawAttribute) -> Result<Value> {
    Evaluator::new(ctx, &mut NoTargets)
        .evaluate(&attribute.expr)
        .map_err(|err| err.at(Some(&attribute.location)))
}

fn resolve_node(ctx: &Context, name: &str, node: &Node) -> Result<Value> {
    let environment = match node.declared {
        true => ctx.env(name),
        false => None,
    };

    if let Some(raw) = environment {
        let variable_type = match (node.declared_type, node.default.or(node.attribute)) {
            (Some(declared_type), _) => declared_type,
            (None, Some(attribute)) => VariableType::of_value(&evaluate(ctx, attribute)?),
            (None, None) => VariableType::String,
        };

        tracing::debug!(%name, ?variable_type, "environment overrides variable");
        return variable_type
            .coerce(name, &raw)
            .map_err(|kind| crate::Error::new(kind).at(Some(&node.location)));
    }

    if let Some(attribute) = node.attribute {
        if node.default.is_some() {
            tracing::debug!(%name, "attribute overrides variable default");
        }
        return evaluate(ctx, attribute);
    }

    match node.default {
        Some(default) => evaluate(ctx, default),
        None => Ok(Value::String(String::new())),
    }
}

/// Resolve all variables and root attributes into `ctx`
#[tracing::instrument(level = "trace", skip_all)]
pub fn resolve(documents: &Documents, ctx: &mut Context) -> Result<()> {
    let builtins = ctx.builtins().clone();
    for (name, value) in &builtins {
        ctx.declare_var(name.clone(), Value::String(value.clone()));
    }

    let nodes = collect_nodes(documents, &builtins)?;
    let edges: HashMap<&str, Vec<&str>> = nodes
        .iter()
        .map(|(name, node)| (*name, dependencies(node, &nodes, ctx)))
        .collect();

    for name in evaluation_order(&nodes, &edges)? {
        let value = resolve_node(ctx, name, &nodes[name])?;
        ctx.declare_var(name, value);
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::Options;
    use crate::documents;
    use crate::userfunc;
    use pretty_assertions::assert_eq;

    fn options(env: &[(&str, &str)]) -> Options {
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Options::default().with_environment(env)
    }

    fn resolve_with(documents: &Documents, options: &Options) -> Result<IndexMap<String, Value>> {
        let mut ctx = Context::new(options);
        ctx.functions = userfunc::registry(documents)?;
        resolve(documents, &mut ctx)?;
        Ok(ctx.variables().clone())
    }

    #[test]
    fn dependency_order_is_independent_of_declaration_order() {
        let documents = documents! {r#"
        variable "BAR" { default = "${FOO}-bar" }
        variable "FOO" { default = "foo" }
        "#};

        let variables = resolve_with(&documents, &options(&[])).unwrap();
        assert_eq!(variables["BAR"], Value::from("foo-bar"));
    }

    #[test]
    fn cycles_are_rejected() {
        let documents = documents! {r#"
        variable "FOO" { default = BAR }
        variable "BAR" { default = BAZ }
        variable "BAZ" { default = FOO }
        "#};

        let err = resolve_with(&documents, &options(&[])).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Cycle(_)));
        assert!(err.to_string().contains("variable cycle not allowed"));
    }

    #[test]
    fn cycles_through_functions_are_rejected() {
        let documents = documents! {r#"
        function "get" {
          params = []
          result = FOO
        }
        variable "FOO" { default = get() }
        "#};

        let err = resolve_with(&documents, &options(&[])).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Cycle(_)));
    }

    #[test]
    fn environment_coercion() {
        let documents = documents! {r#"
        variable "FOO" { default = 3 }
        variable "IS_FOO" { default = true }
        variable "TYPED" {
          type = number
          default = "x"
        }
        "#};

        let env = options(&[("FOO", "5.1"), ("IS_FOO", "0"), ("TYPED", "7")]);
        let variables = resolve_with(&documents, &env).unwrap();
        assert_eq!(variables["FOO"], Value::Decimal(5.1));
        assert_eq!(variables["IS_FOO"], Value::Boolean(false));
        assert_eq!(variables["TYPED"], Value::Integer(7));

        let err = resolve_with(&documents, &options(&[("FOO", "NaN")])).unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::TypeCoercion {
                name: "FOO".into(),
                expected: "number"
            }
        );

        let err = resolve_with(&documents, &options(&[("IS_FOO", "maybe")])).unwrap_err();
        assert!(err.to_string().ends_with("failed to parse IS_FOO as bool"));
    }

    #[test]
    fn bare_attributes_ignore_environment() {
        let documents = documents! {r#"
        FOO = "abc"
        "#};

        let variables = resolve_with(&documents, &options(&[("FOO", "env")])).unwrap();
        assert_eq!(variables["FOO"], Value::from("abc"));
    }

    #[test]
    fn precedence() {
        let documents = documents! {
            "a.hcl" => r#"variable "FOO" { default = "default" }"#,
            "b.hcl" => r#"FOO = "attribute""#
        };

        let variables = resolve_with(&documents, &options(&[])).unwrap();
        assert_eq!(variables["FOO"], Value::from("attribute"));

        let variables = resolve_with(&documents, &options(&[("FOO", "env")])).unwrap();
        assert_eq!(variables["FOO"], Value::from("env"));

        let builtin = options(&[("FOO", "env")]).with_builtin("FOO", "builtin");
        let variables = resolve_with(&documents, &builtin).unwrap();
        assert_eq!(variables["FOO"], Value::from("builtin"));
    }

    #[test]
    fn missing_default_is_empty_string() {
        let documents = documents! {r#"variable "FOO" {}"#};
        let variables = resolve_with(&documents, &options(&[])).unwrap();
        assert_eq!(variables["FOO"], Value::from(""));
    }

    #[test]
    fn parse_bool_tokens() {
        for token in ["1", "t", "T", "TRUE", "true", "True"] {
            assert_eq!(parse_bool(token), Some(true));
        }
        for token in ["0", "f", "F", "FALSE", "false", "False"] {
            assert_eq!(parse_bool(token), Some(false));
        }
        assert_eq!(parse_bool("yes"), None);
    }
}
