use super::Visit;
use hcl::{
    expr::{Expression, Operation, TemplateExpr, Traversal, TraversalOperator},
    template::{Directive, Element},
    Template,
};

/// Free name used by an expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Root of a variable reference or traversal (`FOO`, `target.app.tags`)
    Variable(String),
    /// Called function (`upper(...)`)
    Function(String),
}

/// Recursively report all free [Reference]s
///
/// Names bound by `for` expressions and `%{ for }` directives are local and are not reported inside
/// their body.
pub trait VisitReferences {
    fn visit_references(&self, visitor: &mut dyn Visit<Reference>);
}

impl VisitReferences for Expression {
    fn visit_references(&self, visitor: &mut dyn Visit<Reference>) {
        Walker::new(visitor).expression(self);
    }
}

impl VisitReferences for Template {
    fn visit_references(&self, visitor: &mut dyn Visit<Reference>) {
        Walker::new(visitor).template(self);
    }
}

struct Walker<'v> {
    visitor: &'v mut dyn Visit<Reference>,
    locals: Vec<String>,
}

impl<'v> Walker<'v> {
    fn new(visitor: &'v mut dyn Visit<Reference>) -> Self {
        Self {
            visitor,
            locals: vec![],
        }
    }

    fn variable(&mut self, name: &str) {
        if self.locals.iter().any(|local| local == name) {
            return;
        }
        self.visitor.visit(&Reference::Variable(name.to_string()));
    }

    /// Run `f` with additional local names in scope
    fn scoped(&mut self, names: impl IntoIterator<Item = String>, f: impl FnOnce(&mut Self)) {
        let depth = self.locals.len();
        self.locals.extend(names);
        f(self);
        self.locals.truncate(depth);
    }

    fn expression(&mut self, expr: &Expression) {
        match expr {
            Expression::Variable(variable) => self.variable(variable.as_str()),
            Expression::Traversal(traversal) => self.traversal(traversal),
            Expression::Array(array) => {
                for expr in array {
                    self.expression(expr);
                }
            }
            Expression::Object(object) => {
                for (key, value) in object.iter() {
                    if let hcl::ObjectKey::Expression(key) = key {
                        self.expression(key);
                    }
                    self.expression(value);
                }
            }
            Expression::TemplateExpr(template_expr) => self.template_expr(template_expr),
            Expression::FuncCall(call) => {
                if !call.name.is_namespaced() {
                    self.visitor
                        .visit(&Reference::Function(call.name.name.as_str().to_string()));
                }
                for arg in &call.args {
                    self.expression(arg);
                }
            }
            Expression::Parenthesis(expr) => self.expression(expr),
            Expression::Conditional(cond) => {
                self.expression(&cond.cond_expr);
                self.expression(&cond.true_expr);
                self.expression(&cond.false_expr);
            }
            Expression::Operation(operation) => match operation.as_ref() {
                Operation::Binary(binop) => {
                    self.expression(&binop.lhs_expr);
                    self.expression(&binop.rhs_expr);
                }
                Operation::Unary(unop) => self.expression(&unop.expr),
            },
            Expression::ForExpr(for_expr) => {
                self.expression(&for_expr.collection_expr);
                let names = for_expr
                    .key_var
                    .iter()
                    .chain(Some(&for_expr.value_var))
                    .map(|ident| ident.as_str().to_string());
                self.scoped(names, |walker| {
                    if let Some(key_expr) = &for_expr.key_expr {
                        walker.expression(key_expr);
                    }
                    walker.expression(&for_expr.value_expr);
                    if let Some(cond_expr) = &for_expr.cond_expr {
                        walker.expression(cond_expr);
                    }
                });
            }
            Expression::Null
            | Expression::Bool(_)
            | Expression::Number(_)
            | Expression::String(_) => {}
            // non-exhaustive upstream enum
            _ => {}
        }
    }

    fn traversal(&mut self, traversal: &Traversal) {
        self.expression(&traversal.expr);
        for operator in &traversal.operators {
            if let TraversalOperator::Index(index) = operator {
                self.expression(index);
            }
        }
    }

    fn template_expr(&mut self, template_expr: &TemplateExpr) {
        // unparsable templates surface as errors during evaluation
        if let Ok(template) = Template::from_expr(template_expr) {
            self.template(&template);
        }
    }

    fn template(&mut self, template: &Template) {
        for element in template.elements() {
            match element {
                Element::Interpolation(interpolation) => self.expression(&interpolation.expr),
                Element::Directive(Directive::If(if_directive)) => {
                    self.expression(&if_directive.cond_expr);
                    self.template(&if_directive.true_template);
                    if let Some(false_template) = &if_directive.false_template {
                        self.template(false_template);
                    }
                }
                Element::Directive(Directive::For(for_directive)) => {
                    self.expression(&for_directive.collection_expr);
                    let names = for_directive
                        .key_var
                        .iter()
                        .chain(Some(&for_directive.value_var))
                        .map(|ident| ident.as_str().to_string());
                    self.scoped(names, |walker| walker.template(&for_directive.template));
                }
                Element::Literal(_) => {}
            }
        }
    }
}
