//! user defined functions
//!
//! ```hcl
//! function "tag" {
//!   params         = [repo, version]
//!   variadic_param = extra
//!   result         = "${repo}:${version}"
//! }
//! ```
//!
//! Both `params` (possibly empty) and `result` are required. A later declaration of the same name
//! replaces an earlier one. The result expression is evaluated lazily at every call with only the
//! parameters as locals; other names resolve against the shared variables and functions.
use crate::documents::{BlockKind, Documents, RawAttribute, RawBlock};
use crate::error::{ErrorKind, Location, Result};
use crate::value::Value;
use crate::visit::{Reference, VisitReferences};
use hcl::Expression;
use indexmap::{IndexMap, IndexSet};

#[derive(Debug, Clone)]
pub struct UserFunction {
    pub name: String,
    pub params: Vec<String>,
    pub variadic_param: Option<String>,
    pub result: Expression,
    /// Location of the `result` attribute
    pub location: Location,
}

impl UserFunction {
    pub fn from_block(block: &RawBlock) -> Result<Self> {
        debug_assert_eq!(block.kind, BlockKind::Function);

        for key in block.attributes.keys() {
            if !matches!(key.as_str(), "params" | "variadic_param" | "result") {
                return Err(crate::Error::new(ErrorKind::Parse(format!(
                    "unsupported attribute {key:?} in function {:?}",
                    block.name
                )))
                .at(Some(&block.attributes[key].location)));
            }
        }

        let missing = |attribute: &str| {
            crate::Error::new(ErrorKind::Arity(format!(
                "function {:?} is missing required attribute {attribute:?}",
                block.name
            )))
            .at(Some(&block.location))
        };

        let params_attr = block.attributes.get("params").ok_or_else(|| missing("params"))?;
        let result = block.attributes.get("result").ok_or_else(|| missing("result"))?;

        let params = match &params_attr.expr {
            Expression::Array(elements) => elements
                .iter()
                .map(|element| identifier(element, params_attr))
                .collect::<Result<Vec<_>>>()?,
            _ => {
                return Err(param_error(
                    format!("params of function {:?} must be a list of names", block.name),
                    params_attr,
                ))
            }
        };

        let variadic_param = block
            .attributes
            .get("variadic_param")
            .map(|attribute| identifier(&attribute.expr, attribute))
            .transpose()?;

        let mut seen = IndexSet::new();
        for param in params.iter().chain(variadic_param.iter()) {
            if !seen.insert(param) {
                return Err(param_error(
                    format!("duplicate parameter {param:?} in function {:?}", block.name),
                    params_attr,
                ));
            }
        }

        Ok(Self {
            name: block.name.clone(),
            params,
            variadic_param,
            result: result.expr.clone(),
            location: result.location.clone(),
        })
    }

    /// Bind call arguments to parameter names
    pub fn bind(&self, mut args: Vec<Value>) -> Result<Vec<(String, Value)>, ErrorKind> {
        let expected = self.params.len();
        let arity_error = |got: usize| {
            let expected = match self.variadic_param {
                Some(_) => format!("at least {expected}"),
                None => expected.to_string(),
            };
            ErrorKind::Arity(format!(
                "function {:?} expects {expected} argument(s), got {got}",
                self.name
            ))
        };

        if args.len() < expected || (args.len() > expected && self.variadic_param.is_none()) {
            return Err(arity_error(args.len()));
        }

        let rest = args.split_off(expected);
        let mut bindings: Vec<(String, Value)> = self.params.iter().cloned().zip(args).collect();
        if let Some(variadic_param) = &self.variadic_param {
            bindings.push((variadic_param.clone(), Value::Array(rest)));
        }
        Ok(bindings)
    }

    /// Names the result expression uses besides its own parameters
    pub fn free_references(&self) -> Vec<Reference> {
        let mut found = vec![];
        self.result.visit_references(&mut |reference: &Reference| {
            let is_param = matches!(reference, Reference::Variable(name)
                if self.params.contains(name) || self.variadic_param.as_ref() == Some(name));
            if !is_param && !found.contains(reference) {
                found.push(reference.clone());
            }
        });
        found
    }
}

/// Parse all `function` blocks, later declarations replacing earlier ones
#[tracing::instrument(level = "trace", skip_all)]
pub fn registry(documents: &Documents) -> Result<IndexMap<String, UserFunction>> {
    let mut functions = IndexMap::new();
    for block in documents.blocks_of(BlockKind::Function) {
        let function = UserFunction::from_block(block)?;
        if functions.contains_key(&function.name) {
            tracing::debug!(name = %function.name, "function redeclared, later declaration wins");
        }
        functions.insert(function.name.clone(), function);
    }
    Ok(functions)
}

/// A parameter name: a bare identifier or (in JSON) a string
fn identifier(expr: &Expression, attribute: &RawAttribute) -> Result<String> {
    let name = match expr {
        Expression::Variable(variable) => variable.as_str().to_string(),
        Expression::String(s) => s.clone(),
        _ => return Err(param_error("parameter names must be identifiers".to_string(), attribute)),
    };

    hcl::Identifier::new(name.as_str())
        .map_err(|_| param_error(format!("{name:?} is not a valid parameter name"), attribute))?;
    Ok(name)
}

fn param_error(message: String, attribute: &RawAttribute) -> crate::Error {
    crate::Error::new(ErrorKind::Parse(message)).at(Some(&attribute.location))
}
