//! expression evaluation
//!
//! [Evaluator] walks an [hcl::Expression] against a [Context] and produces a [Value].
//!
//! Name lookup order for a bare identifier:
//! 1. locals (function parameters, `for` variables), innermost first
//! 2. resolved variables of the [Context]
//!
//! `target.NAME.ATTR` traversals are answered by a [TargetLookup], which lets the block merger
//! resolve (and memoize) attributes of other targets on demand. While variables are being resolved
//! no targets exist ([NoTargets]).
use crate::context::Context;
use crate::error::{ErrorKind, Result};
use crate::stdlib;
use crate::userfunc::UserFunction;
use crate::value::Value;
use hcl::expr::{
    BinaryOp, BinaryOperator, Conditional, Expression, ForExpr, FuncCall, ObjectKey, Operation,
    TemplateExpr, Traversal, TraversalOperator, UnaryOperator,
};
use hcl::template::{Directive, Element, ForDirective, IfDirective, Strip, Template};
use indexmap::IndexMap;

/// Source of `target.NAME.ATTR` values
pub trait TargetLookup {
    fn target_attribute(&mut self, target: &str, attribute: &str) -> Result<Value>;
}

/// [TargetLookup] for contexts in which targets cannot be referenced
pub struct NoTargets;

impl TargetLookup for NoTargets {
    fn target_attribute(&mut self, target: &str, attribute: &str) -> Result<Value> {
        Err(ErrorKind::UndefinedReference(format!(
            "target.{target}.{attribute} cannot be referenced outside of target and group blocks"
        ))
        .into())
    }
}

pub struct Evaluator<'a, 'o> {
    ctx: &'a Context<'o>,
    targets: &'a mut dyn TargetLookup,
    locals: Vec<(String, Value)>,
    depth: usize,
}

impl<'a, 'o> Evaluator<'a, 'o> {
    pub fn new(ctx: &'a Context<'o>, targets: &'a mut dyn TargetLookup) -> Self {
        Self {
            ctx,
            targets,
            locals: vec![],
            depth: 0,
        }
    }

    #[tracing::instrument(level = "trace", skip_all)]
    pub fn evaluate(&mut self, expr: &Expression) -> Result<Value> {
        match expr {
            Expression::Null => Ok(Value::Null),
            Expression::Bool(b) => Ok(Value::Boolean(*b)),
            Expression::Number(n) => Ok(Value::from(n.clone())),
            Expression::String(s) => Ok(Value::String(s.clone())),
            Expression::Array(elements) => Ok(Value::Array(
                elements
                    .iter()
                    .map(|element| self.evaluate(element))
                    .collect::<Result<_>>()?,
            )),
            Expression::Object(object) => {
                let mut result = IndexMap::new();
                for (key, value) in object.iter() {
                    let key = match key {
                        ObjectKey::Identifier(ident) => ident.as_str().to_string(),
                        ObjectKey::Expression(expr) => self.evaluate(expr)?.to_template_string()?,
                        _ => {
                            return Err(ErrorKind::TypeMismatch(
                                "unsupported object key".to_string(),
                            )
                            .into())
                        }
                    };
                    let value = self.evaluate(value)?;
                    result.insert(key, value);
                }
                Ok(Value::Object(result))
            }
            Expression::TemplateExpr(template_expr) => self.template_expr(template_expr),
            Expression::Variable(variable) => self.variable(variable.as_str()),
            Expression::Traversal(traversal) => self.traversal(traversal),
            Expression::FuncCall(call) => self.call(call),
            Expression::Parenthesis(expr) => self.evaluate(expr),
            Expression::Conditional(cond) => self.conditional(cond),
            Expression::Operation(operation) => match operation.as_ref() {
                Operation::Unary(unop) => {
                    let value = self.evaluate(&unop.expr)?;
                    Ok(unary(unop.operator, &value)?)
                }
                Operation::Binary(binop) => {
                    let mut chain = OperatorChain::default();
                    chain.flatten(binop);
                    let mut position = 0;
                    self.operator_chain(&chain, &mut position, 0)
                }
            },
            Expression::ForExpr(for_expr) => self.for_expr(for_expr),
            _ => Err(ErrorKind::TypeMismatch("unsupported expression".to_string()).into()),
        }
    }

    /// Precedence climbing over a flattened operator chain, left associative
    fn operator_chain(
        &mut self,
        chain: &OperatorChain,
        position: &mut usize,
        min_precedence: u8,
    ) -> Result<Value> {
        let mut lhs = self.evaluate(chain.operands[*position])?;
        while let Some(&operator) = chain.operators.get(*position) {
            if operator.precedence() < min_precedence {
                break;
            }
            *position += 1;

            // `&&` and `||` only look at the right hand side when needed
            let decided = match (operator, lhs.to_bool()) {
                (BinaryOperator::And, Ok(false)) => Some(false),
                (BinaryOperator::Or, Ok(true)) => Some(true),
                _ => None,
            };
            if let Some(result) = decided {
                chain.skip(position, operator.precedence() + 1);
                lhs = Value::Boolean(result);
                continue;
            }

            let rhs = self.operator_chain(chain, position, operator.precedence() + 1)?;
            lhs = binary(operator, &lhs, &rhs)?;
        }
        Ok(lhs)
    }

    fn variable(&self, name: &str) -> Result<Value> {
        if let Some((_, value)) = self.locals.iter().rev().find(|(local, _)| local == name) {
            return Ok(value.clone());
        }

        self.ctx
            .variable(name)
            .cloned()
            .ok_or_else(|| {
                ErrorKind::UndefinedReference(format!("unknown variable {name:?}")).into()
            })
    }

    fn is_local_or_variable(&self, name: &str) -> bool {
        self.locals.iter().any(|(local, _)| local == name) || self.ctx.variable(name).is_some()
    }

    fn traversal(&mut self, traversal: &Traversal) -> Result<Value> {
        let operators = traversal.operators.as_slice();

        if let Expression::Variable(root) = &traversal.expr {
            if root.as_str() == "target" && !self.is_local_or_variable("target") {
                return self.target_traversal(operators);
            }
        }

        let value = self.evaluate(&traversal.expr)?;
        self.apply_operators(value, operators)
    }

    /// `target.NAME.ATTR...`
    fn target_traversal(&mut self, operators: &[TraversalOperator]) -> Result<Value> {
        let (name, attribute, rest) = match operators {
            [name, attribute, rest @ ..] => (
                self.operator_key(name)?,
                self.operator_key(attribute)?,
                rest,
            ),
            _ => {
                return Err(ErrorKind::UndefinedReference(
                    "target references must name a target and an attribute (target.NAME.ATTR)"
                        .to_string(),
                )
                .into())
            }
        };

        tracing::trace!(%name, %attribute, "target attribute reference");
        let value = self.targets.target_attribute(&name, &attribute)?;
        self.apply_operators(value, rest)
    }

    fn operator_key(&mut self, operator: &TraversalOperator) -> Result<String> {
        match operator {
            TraversalOperator::GetAttr(ident) => Ok(ident.as_str().to_string()),
            TraversalOperator::Index(expr) => Ok(self.evaluate(expr)?.to_template_string()?),
            _ => Err(ErrorKind::TypeMismatch(
                "target references do not support splat or numeric index".to_string(),
            )
            .into()),
        }
    }

    fn apply_operators(&mut self, value: Value, operators: &[TraversalOperator]) -> Result<Value> {
        let Some((operator, rest)) = operators.split_first() else {
            return Ok(value);
        };

        match operator {
            TraversalOperator::GetAttr(ident) => {
                let next = get_attr(value, ident.as_str())?;
                self.apply_operators(next, rest)
            }
            TraversalOperator::Index(expr) => {
                let index = self.evaluate(expr)?;
                let next = index_value(value, &index)?;
                self.apply_operators(next, rest)
            }
            TraversalOperator::LegacyIndex(index) => {
                let next = index_value(value, &Value::Integer(*index as i64))?;
                self.apply_operators(next, rest)
            }
            TraversalOperator::FullSplat => {
                let elements = splat_elements(value)
                    .into_iter()
                    .map(|element| self.apply_operators(element, rest))
                    .collect::<Result<_>>()?;
                Ok(Value::Array(elements))
            }
            TraversalOperator::AttrSplat => {
                // only the directly following attribute accesses apply per element
                let split = rest
                    .iter()
                    .position(|operator| !matches!(operator, TraversalOperator::GetAttr(_)))
                    .unwrap_or(rest.len());
                let (per_element, after) = rest.split_at(split);
                let elements = splat_elements(value)
                    .into_iter()
                    .map(|element| self.apply_operators(element, per_element))
                    .collect::<Result<_>>()?;
                self.apply_operators(Value::Array(elements), after)
            }
        }
    }

    fn call(&mut self, call: &FuncCall) -> Result<Value> {
        let name = call.name.name.as_str();
        if call.name.is_namespaced() {
            return Err(
                ErrorKind::UndefinedReference(format!("unknown function {}", call.name)).into(),
            );
        }

        let mut args = call
            .args
            .iter()
            .map(|arg| self.evaluate(arg))
            .collect::<Result<Vec<_>>>()?;

        if call.expand_final {
            match args.pop() {
                Some(Value::Array(expanded)) => args.extend(expanded),
                Some(other) => {
                    return Err(ErrorKind::TypeMismatch(format!(
                        "{name}(): expanded final argument must be a list, got {}",
                        other.type_name()
                    ))
                    .into())
                }
                None => {}
            }
        }

        let ctx = self.ctx;
        if let Some(function) = ctx.function(name) {
            return self.call_user_function(function, args);
        }

        let Some(builtin) = stdlib::lookup(name) else {
            return Err(ErrorKind::UndefinedReference(format!("unknown function {name:?}")).into());
        };
        builtin.check_arity(args.len())?;
        (builtin.func)(ctx, args).map_err(|kind| match kind {
            ErrorKind::TypeMismatch(message) if !message.starts_with(name) => {
                ErrorKind::TypeMismatch(format!("{name}(): {message}")).into()
            }
            kind => kind.into(),
        })
    }

    fn call_user_function(&mut self, function: &UserFunction, args: Vec<Value>) -> Result<Value> {
        let max_depth = self.ctx.max_call_depth();
        if self.depth >= max_depth {
            return Err(ErrorKind::CallDepth(max_depth).into());
        }

        let bindings = function.bind(args)?;

        // the body only sees its own parameters, never the caller's locals
        let saved = std::mem::replace(&mut self.locals, bindings);
        self.depth += 1;
        let result = self.evaluate(&function.result);
        self.depth -= 1;
        self.locals = saved;

        result.map_err(|err| err.at(Some(&function.location)))
    }

    fn conditional(&mut self, cond: &Conditional) -> Result<Value> {
        if self.evaluate(&cond.cond_expr)?.to_bool()? {
            self.evaluate(&cond.true_expr)
        } else {
            self.evaluate(&cond.false_expr)
        }
    }

    /// Run `f` with the for-loop variables of one iteration bound
    fn with_loop_vars<T>(
        &mut self,
        key_var: Option<&hcl::Identifier>,
        value_var: &hcl::Identifier,
        (key, value): (Value, Value),
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let depth = self.locals.len();
        if let Some(key_var) = key_var {
            self.locals.push((key_var.as_str().to_string(), key));
        }
        self.locals.push((value_var.as_str().to_string(), value));
        let result = f(self);
        self.locals.truncate(depth);
        result
    }

    fn for_expr(&mut self, for_expr: &ForExpr) -> Result<Value> {
        let collection = self.evaluate(&for_expr.collection_expr)?;
        let entries = collection_entries(collection)?;

        let mut list = vec![];
        let mut object: IndexMap<String, Value> = IndexMap::new();
        for entry in entries {
            let key_var = for_expr.key_var.as_ref();
            let item = self.with_loop_vars(key_var, &for_expr.value_var, entry, |this| {
                if let Some(cond_expr) = &for_expr.cond_expr {
                    if !this.evaluate(cond_expr)?.to_bool()? {
                        return Ok(None);
                    }
                }
                let key = match &for_expr.key_expr {
                    Some(key_expr) => Some(this.evaluate(key_expr)?.to_template_string()?),
                    None => None,
                };
                Ok(Some((key, this.evaluate(&for_expr.value_expr)?)))
            })?;

            match item {
                None => {}
                Some((None, value)) => list.push(value),
                Some((Some(key), value)) if for_expr.grouping => {
                    let group = object.entry(key).or_insert_with(|| Value::Array(vec![]));
                    if let Value::Array(group) = group {
                        group.push(value);
                    }
                }
                Some((Some(key), value)) => {
                    if object.contains_key(&key) {
                        return Err(ErrorKind::TypeMismatch(format!(
                            "duplicate key {key:?} in for expression, use `...` to group values"
                        ))
                        .into());
                    }
                    object.insert(key, value);
                }
            }
        }

        if for_expr.key_expr.is_some() {
            Ok(Value::Object(object))
        } else {
            Ok(Value::Array(list))
        }
    }

    fn template_expr(&mut self, template_expr: &TemplateExpr) -> Result<Value> {
        let template = Template::from_expr(template_expr)
            .map_err(|err| ErrorKind::Parse(format!("invalid template: {err}")))?;

        // a template consisting of a single interpolation yields its value unconverted
        if let [Element::Interpolation(interpolation)] = template.elements() {
            return self.evaluate(&interpolation.expr);
        }

        let mut result = String::new();
        self.template(&mut result, &template, Strip::None, Strip::None)?;
        Ok(Value::String(result))
    }

    fn template(
        &mut self,
        result: &mut String,
        template: &Template,
        prev: Strip,
        next: Strip,
    ) -> Result<()> {
        let elements = template.elements();
        for (index, element) in elements.iter().enumerate() {
            let before = match index {
                0 => prev,
                _ => element_strip(&elements[index - 1]),
            };
            let after = elements.get(index + 1).map(element_strip).unwrap_or(next);

            match element {
                Element::Literal(literal) => result.push_str(strip_literal(literal, before, after)),
                Element::Interpolation(interpolation) => {
                    let value = self.evaluate(&interpolation.expr)?;
                    result.push_str(&value.to_template_string()?);
                }
                Element::Directive(Directive::If(directive)) => {
                    self.if_directive(result, directive)?
                }
                Element::Directive(Directive::For(directive)) => {
                    self.for_directive(result, directive)?
                }
            }
        }
        Ok(())
    }

    fn if_directive(&mut self, result: &mut String, directive: &IfDirective) -> Result<()> {
        if self.evaluate(&directive.cond_expr)?.to_bool()? {
            let next = match directive.false_template {
                Some(_) => directive.else_strip,
                None => directive.endif_strip,
            };
            self.template(result, &directive.true_template, directive.if_strip, next)
        } else if let Some(false_template) = &directive.false_template {
            self.template(result, false_template, directive.else_strip, directive.endif_strip)
        } else {
            Ok(())
        }
    }

    fn for_directive(&mut self, result: &mut String, directive: &ForDirective) -> Result<()> {
        let collection = self.evaluate(&directive.collection_expr)?;
        for entry in collection_entries(collection)? {
            let key_var = directive.key_var.as_ref();
            self.with_loop_vars(key_var, &directive.value_var, entry, |this| {
                let (start, end) = (directive.for_strip, directive.endfor_strip);
                this.template(result, &directive.template, start, end)
            })?;
        }
        Ok(())
    }
}

/// Operands and operators of an unparenthesized binary chain, in source order
///
/// The parser nests chains without regard to precedence, so the tree shape carries no meaning.
#[derive(Default)]
struct OperatorChain<'e> {
    operands: Vec<&'e Expression>,
    operators: Vec<BinaryOperator>,
}

impl<'e> OperatorChain<'e> {
    fn flatten(&mut self, binop: &'e BinaryOp) {
        self.operand(&binop.lhs_expr);
        self.operators.push(binop.operator);
        self.operand(&binop.rhs_expr);
    }

    fn operand(&mut self, expr: &'e Expression) {
        match expr {
            Expression::Operation(operation) => match operation.as_ref() {
                Operation::Binary(binop) => self.flatten(binop),
                Operation::Unary(_) => self.operands.push(expr),
            },
            expr => self.operands.push(expr),
        }
    }

    /// Advance past an operand the way [Evaluator::operator_chain] would, without evaluating it
    fn skip(&self, position: &mut usize, min_precedence: u8) {
        while let Some(&operator) = self.operators.get(*position) {
            if operator.precedence() < min_precedence {
                break;
            }
            *position += 1;
            self.skip(position, operator.precedence() + 1);
        }
    }
}

fn element_strip(element: &Element) -> Strip {
    match element {
        Element::Literal(_) => Strip::None,
        Element::Interpolation(interpolation) => interpolation.strip,
        Element::Directive(Directive::If(directive)) => Strip::from((
            directive.if_strip.strip_start(),
            directive.endif_strip.strip_end(),
        )),
        Element::Directive(Directive::For(directive)) => Strip::from((
            directive.for_strip.strip_start(),
            directive.endfor_strip.strip_end(),
        )),
    }
}

/// Remove all whitespace next to a `~` strip marker
fn strip_literal(mut literal: &str, before: Strip, after: Strip) -> &str {
    if before.strip_end() {
        literal = literal.trim_start();
    }
    if after.strip_start() {
        literal = literal.trim_end();
    }
    literal
}

/// `(key, value)` pairs of a list (index keys) or map (string keys)
fn collection_entries(collection: Value) -> Result<Vec<(Value, Value)>, ErrorKind> {
    match collection {
        Value::Array(elements) => Ok(elements
            .into_iter()
            .enumerate()
            .map(|(index, value)| (Value::Integer(index as i64), value))
            .collect()),
        Value::Object(object) => Ok(object
            .into_iter()
            .map(|(key, value)| (Value::String(key), value))
            .collect()),
        other => Err(ErrorKind::TypeMismatch(format!(
            "cannot iterate over {}",
            other.type_name()
        ))),
    }
}

fn splat_elements(value: Value) -> Vec<Value> {
    match value {
        Value::Null => vec![],
        Value::Array(elements) => elements,
        other => vec![other],
    }
}

fn get_attr(value: Value, name: &str) -> Result<Value, ErrorKind> {
    match value {
        Value::Object(mut object) => object
            .swap_remove(name)
            .ok_or_else(|| {
                ErrorKind::UndefinedReference(format!("object has no attribute {name:?}"))
            }),
        other => Err(ErrorKind::TypeMismatch(format!(
            "cannot access attribute {name:?} of {}",
            other.type_name()
        ))),
    }
}

fn index_value(value: Value, index: &Value) -> Result<Value, ErrorKind> {
    match value {
        Value::Array(mut elements) => {
            let position = index.to_number()?;
            if position.fract() != 0.0 || position < 0.0 || position as usize >= elements.len() {
                return Err(ErrorKind::TypeMismatch(format!(
                    "index {index} out of range for list of length {}",
                    elements.len()
                )));
            }
            Ok(elements.swap_remove(position as usize))
        }
        Value::Object(mut object) => {
            let key = index.to_template_string()?;
            object
                .swap_remove(&key)
                .ok_or_else(|| ErrorKind::UndefinedReference(format!("map has no key {key:?}")))
        }
        other => Err(ErrorKind::TypeMismatch(format!("cannot index {}", other.type_name()))),
    }
}

fn unary(operator: UnaryOperator, value: &Value) -> Result<Value, ErrorKind> {
    match operator {
        UnaryOperator::Not => Ok(Value::Boolean(!value.to_bool()?)),
        UnaryOperator::Neg => match value {
            Value::Integer(i) => i
                .checked_neg()
                .map(Value::Integer)
                .ok_or_else(|| ErrorKind::TypeMismatch("integer overflow".to_string())),
            other => Ok(Value::number(-other.to_number()?)),
        },
    }
}

pub(crate) fn binary(
    operator: BinaryOperator,
    lhs: &Value,
    rhs: &Value,
) -> Result<Value, ErrorKind> {
    use BinaryOperator::*;

    match operator {
        Eq => Ok(Value::Boolean(lhs == rhs)),
        NotEq => Ok(Value::Boolean(lhs != rhs)),
        And => Ok(Value::Boolean(lhs.to_bool()? && rhs.to_bool()?)),
        Or => Ok(Value::Boolean(lhs.to_bool()? || rhs.to_bool()?)),
        Less => Ok(Value::Boolean(lhs.to_number()? < rhs.to_number()?)),
        LessEq => Ok(Value::Boolean(lhs.to_number()? <= rhs.to_number()?)),
        Greater => Ok(Value::Boolean(lhs.to_number()? > rhs.to_number()?)),
        GreaterEq => Ok(Value::Boolean(lhs.to_number()? >= rhs.to_number()?)),
        Plus | Minus | Mul | Div | Mod => arithmetic(operator, lhs, rhs),
    }
}

/// Numeric operators; integers stay integers while the result is exact
pub(crate) fn arithmetic(
    operator: BinaryOperator,
    lhs: &Value,
    rhs: &Value,
) -> Result<Value, ErrorKind> {
    use BinaryOperator::*;

    let (a, b) = (lhs.to_number()?, rhs.to_number()?);
    if matches!(operator, Div | Mod) && b == 0.0 {
        return Err(ErrorKind::TypeMismatch("division by zero".to_string()));
    }

    if let (Value::Integer(a), Value::Integer(b)) = (integer(lhs), integer(rhs)) {
        let exact = match operator {
            Plus => a.checked_add(b),
            Minus => a.checked_sub(b),
            Mul => a.checked_mul(b),
            Div if a.checked_rem(b) == Some(0) => a.checked_div(b),
            Mod => a.checked_rem(b),
            _ => None,
        };
        if let Some(result) = exact {
            return Ok(Value::Integer(result));
        }
    }

    let result = match operator {
        Plus => a + b,
        Minus => a - b,
        Mul => a * b,
        Div => a / b,
        Mod => a % b,
        _ => unreachable!("not an arithmetic operator"),
    };

    if !result.is_finite() {
        return Err(ErrorKind::TypeMismatch(format!("{a} {operator} {b} is not a finite number")));
    }
    Ok(Value::number(result))
}

/// Integer view of numbers and numeric strings
fn integer(value: &Value) -> Value {
    match value {
        Value::String(s) => s.trim().parse::<i64>().map(Value::Integer).unwrap_or(Value::Null),
        other => other.clone(),
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::context::Options;
    use pretty_assertions::assert_eq;

    pub(crate) fn expr(source: &str) -> Expression {
        let expr: hcl_edit::expr::Expression = source.parse().expect("expression must parse");
        expr.into()
    }

    fn eval_with(ctx: &Context, source: &str) -> Result<Value> {
        Evaluator::new(ctx, &mut NoTargets).evaluate(&expr(source))
    }

    fn eval(source: &str) -> Result<Value> {
        let options = Options::default();
        let mut ctx = Context::new(&options);
        ctx.declare_var("FOO", Value::from("abc"));
        ctx.declare_var("N", Value::Integer(3));
        ctx.declare_var("LIST", Value::from(vec!["a", "b"]));
        ctx.declare_var(
            "OBJ",
            Value::Object(IndexMap::from([("b".to_string(), Value::Integer(1))])),
        );
        eval_with(&ctx, source)
    }

    #[test]
    fn literals_and_collections() {
        assert_eq!(eval("null").unwrap(), Value::Null);
        assert_eq!(eval("[1, true, \"x\"]").unwrap().to_string(), r#"[1,true,"x"]"#);
        assert_eq!(eval("{ a = 1, \"b\" = FOO }").unwrap().to_string(), r#"{"a":1,"b":"abc"}"#);
    }

    #[test]
    fn templates() {
        assert_eq!(eval(r#""pre-${FOO}-${N}""#).unwrap(), Value::from("pre-abc-3"));
        // single interpolation keeps the type
        assert_eq!(eval(r#""${N}""#).unwrap(), Value::Integer(3));
        assert_eq!(
            eval(r#""%{ if N > 2 }big%{ else }small%{ endif }""#).unwrap(),
            Value::from("big")
        );
        assert_eq!(
            eval(r#""%{ for i, v in LIST }${i}=${v};%{ endfor }""#).unwrap(),
            Value::from("0=a;1=b;")
        );
    }

    #[test]
    fn strip_markers() {
        assert_eq!(eval("\"a  ${~ FOO ~}  b\"").unwrap(), Value::from("aabcb"));
        assert_eq!(
            eval("\"%{ for v in LIST ~}\n${v}\n%{~ endfor }\"").unwrap(),
            Value::from("ab")
        );
        assert_eq!(
            eval("\"%{ for v in LIST ~}\n    ${v}\n    %{~ endfor }\n\"").unwrap(),
            Value::from("ab\n")
        );
    }

    #[test]
    fn arithmetic_keeps_integers() {
        assert_eq!(eval("123 + 1").unwrap(), Value::Integer(124));
        assert_eq!(eval("7 / 2").unwrap(), Value::Decimal(3.5));
        assert_eq!(eval("6 / 2").unwrap(), Value::Integer(3));
        assert_eq!(eval("\"5\" * 2").unwrap(), Value::Integer(10));
        assert_eq!(eval("7 % 3").unwrap(), Value::Integer(1));
        assert!(matches!(eval("1 / 0").unwrap_err().kind(), ErrorKind::TypeMismatch(_)));
    }

    #[test]
    fn comparison_and_logic() {
        assert_eq!(eval("N >= 3 && FOO == \"abc\"").unwrap(), Value::Boolean(true));
        assert_eq!(eval("!(N < 3)").unwrap(), Value::Boolean(true));
        assert_eq!(eval("-N").unwrap(), Value::Integer(-3));
    }

    #[test]
    fn operator_precedence() {
        assert_eq!(eval("2 * 3 + 1").unwrap(), Value::Integer(7));
        assert_eq!(eval("1 + 2 * 3").unwrap(), Value::Integer(7));
        assert_eq!(eval("10 - 2 - 3").unwrap(), Value::Integer(5));
        assert_eq!(eval("24 / 4 / 2").unwrap(), Value::Integer(3));
        assert_eq!(eval("(10 - 2) * 3").unwrap(), Value::Integer(24));
        assert_eq!(eval("1 < 2 && 3 > 2").unwrap(), Value::Boolean(true));
        assert_eq!(eval("FOO == \"x\" || N + 1 == 4").unwrap(), Value::Boolean(true));
        assert_eq!(eval("true || false && false").unwrap(), Value::Boolean(true));
        assert_eq!(eval("-N * 2 + 1").unwrap(), Value::Integer(-5));
    }

    #[test]
    fn short_circuit_inside_chain() {
        assert_eq!(eval("N > 5 && MISSING == 1 || true").unwrap(), Value::Boolean(true));
        assert_eq!(eval("N == 3 || MISSING + 1 > 0").unwrap(), Value::Boolean(true));
        assert!(eval("N == 3 && MISSING").is_err());
    }

    #[test]
    fn conditional_short_circuits() {
        assert_eq!(eval("true ? FOO : MISSING").unwrap(), Value::from("abc"));
        assert!(eval("false ? FOO : MISSING").is_err());
        assert_eq!(eval("false && MISSING").unwrap(), Value::Boolean(false));
    }

    #[test]
    fn undefined_references() {
        let err = eval("MISSING").unwrap_err();
        assert_eq!(err.to_string(), "unknown variable \"MISSING\"");
        assert!(matches!(
            eval("nope(1)").unwrap_err().kind(),
            ErrorKind::UndefinedReference(_)
        ));
        assert!(matches!(
            eval("target.app.context").unwrap_err().kind(),
            ErrorKind::UndefinedReference(_)
        ));
    }

    #[test]
    fn for_expressions() {
        assert_eq!(
            eval("[for v in LIST : upper(v) if v != \"b\"]").unwrap(),
            Value::from(vec!["A"])
        );
        assert_eq!(
            eval("{for i, v in LIST : v => i}").unwrap().to_string(),
            r#"{"a":0,"b":1}"#
        );
        assert_eq!(
            eval("{for v in [\"x\", \"y\", \"x\"] : v => v...}").unwrap().to_string(),
            r#"{"x":["x","x"],"y":["y"]}"#
        );
        assert!(eval("{for v in [\"x\", \"x\"] : v => v}").is_err());
    }

    #[test]
    fn traversals_and_splats() {
        assert_eq!(eval("LIST[1]").unwrap(), Value::from("b"));
        assert_eq!(eval("OBJ.b").unwrap(), Value::Integer(1));
        assert_eq!(
            eval("[{ n = 1 }, { n = 2 }][*].n").unwrap(),
            Value::from(vec![Value::Integer(1), Value::Integer(2)])
        );
        assert_eq!(
            eval("[{ n = 1 }, { n = 2 }].*.n").unwrap(),
            Value::from(vec![Value::Integer(1), Value::Integer(2)])
        );
        assert!(eval("LIST[5]").is_err());
    }

    #[test]
    fn expanded_final_argument() {
        assert_eq!(eval("max(1, [5, 2]...)").unwrap(), Value::Integer(5));
    }

    #[test]
    fn builtin_arity() {
        let err = eval("upper()").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Arity(_)));
    }

    #[test]
    fn strip_literal_removes_all_adjacent_whitespace() {
        assert_eq!(strip_literal("  \n\n x", Strip::End, Strip::None), "x");
        assert_eq!(strip_literal("x \n\t ", Strip::None, Strip::Start), "x");
        assert_eq!(strip_literal(" x ", Strip::None, Strip::None), " x ");
    }
}
