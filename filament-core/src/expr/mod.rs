//! Template Expressions
//!
//! Every binding in a template (attribute value, text interpolation, event
//! instruction, control-flow input) is an expression parsed once into an
//! [`Expr`] tree and shared by reference from then on.
//!
//! # Reactivity
//!
//! An expression is *reactive* when it reads an observable root (`state`,
//! `input`, `context`, `arguments`, `self`) or a variable declared in the
//! enclosing scope. [`Expression::dependencies`] decomposes it into the
//! observable paths it reads:
//!
//! - `state.user.name` yields `state.user.name`
//! - `state.items[i].label` yields `state.items` (computed indices stop the path)
//! - `self.format(x)` yields `self.format`
//! - `state.name.trim()` yields `state.name` (method names are not paths)
//! - a scope variable `item.label` yields `item`
//!
//! # Safe evaluation
//!
//! [`Expression::evaluate`] never fails. Evaluation errors are logged and
//! the expression yields `undefined`.

mod deps;
mod eval;
mod lexer;
mod parser;

pub use eval::{Env, Host};

use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::error::{EvalError, ParseError};
use crate::value::{Scope, Value};

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident(String),
    Member {
        object: Box<Expr>,
        property: String,
        optional: bool,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Array(Vec<ArrayItem>),
    Object(Vec<Property>),
    Arrow {
        params: Vec<String>,
        body: Rc<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayItem {
    Item(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Pair(String, Expr),
    Spread(Expr),
}

/// One piece of an interpolated string.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Code(Expr),
}

#[derive(Debug)]
pub enum ExprKind {
    Code(Expr),
    /// Interpolated text such as `Hello {state.name}`.
    Template(Vec<Segment>),
    /// Kept so a bad binding degrades to `undefined` instead of failing the
    /// whole template.
    Invalid(ParseError),
}

#[derive(Debug)]
struct ExpressionInner {
    source: String,
    kind: ExprKind,
}

/// A parsed, shareable binding.
#[derive(Clone)]
pub struct Expression {
    inner: Rc<ExpressionInner>,
}

impl Expression {
    fn from_kind(source: &str, kind: ExprKind) -> Self {
        Self {
            inner: Rc::new(ExpressionInner {
                source: source.to_string(),
                kind,
            }),
        }
    }

    /// Parse a code expression.
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        Ok(Self::from_kind(source, ExprKind::Code(parser::parse(source)?)))
    }

    /// Parse interpolated text.
    pub fn parse_template(source: &str) -> Result<Self, ParseError> {
        Ok(Self::from_kind(
            source,
            ExprKind::Template(parser::parse_template(source)?),
        ))
    }

    /// Parse a code expression, keeping syntax errors as an invalid binding.
    pub fn code(source: &str) -> Self {
        Self::parse(source).unwrap_or_else(|err| Self::from_kind(source, ExprKind::Invalid(err)))
    }

    /// Parse interpolated text, keeping syntax errors as an invalid binding.
    pub fn template(source: &str) -> Self {
        Self::parse_template(source)
            .unwrap_or_else(|err| Self::from_kind(source, ExprKind::Invalid(err)))
    }

    pub fn literal(value: Value) -> Self {
        let source = value.to_display();
        Self::from_kind(&source, ExprKind::Code(Expr::Literal(value)))
    }

    pub fn source(&self) -> &str {
        &self.inner.source
    }

    pub fn kind(&self) -> &ExprKind {
        &self.inner.kind
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self.inner.kind, ExprKind::Invalid(_))
    }

    /// Observable paths read by this expression, in first-seen order.
    pub fn dependencies(&self, scope: &Scope) -> Vec<String> {
        let mut out = Vec::new();
        match &self.inner.kind {
            ExprKind::Code(expr) => deps::collect(expr, scope, &mut Vec::new(), &mut out),
            ExprKind::Template(segments) => {
                for segment in segments {
                    if let Segment::Code(expr) = segment {
                        deps::collect(expr, scope, &mut Vec::new(), &mut out);
                    }
                }
            }
            ExprKind::Invalid(_) => {}
        }
        out
    }

    pub fn is_reactive(&self, scope: &Scope) -> bool {
        !self.dependencies(scope).is_empty()
    }

    /// Whether any dependency is a `let` variable of `scope`.
    pub fn reads_let(&self, scope: &Scope) -> bool {
        self.dependencies(scope).iter().any(|dep| {
            scope
                .get(dep)
                .is_some_and(|var| var.kind == crate::value::VarKind::Let)
        })
    }

    pub fn try_evaluate(&self, env: &Env<'_>) -> Result<Value, EvalError> {
        match &self.inner.kind {
            ExprKind::Code(expr) => env.eval(expr),
            ExprKind::Template(segments) => {
                if let [Segment::Code(expr)] = segments.as_slice() {
                    return env.eval(expr);
                }
                let mut out = String::new();
                for segment in segments {
                    match segment {
                        Segment::Text(text) => out.push_str(text),
                        Segment::Code(expr) => out.push_str(&env.eval(expr)?.to_display()),
                    }
                }
                Ok(Value::string(out))
            }
            ExprKind::Invalid(err) => Err(EvalError::Invalid(err.to_string())),
        }
    }

    /// Safe evaluation: failures are logged and yield `undefined`.
    pub fn evaluate(&self, env: &Env<'_>) -> Value {
        match self.try_evaluate(env) {
            Ok(value) => value,
            Err(err @ (EvalError::UndefinedAccess { .. } | EvalError::UnknownIdentifier(_))) => {
                debug!(expression = %self.source(), error = %err, "expression yielded undefined");
                Value::Undefined
            }
            Err(err) => {
                warn!(expression = %self.source(), error = %err, "expression evaluation failed");
                Value::Undefined
            }
        }
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expression({:?})", self.inner.source)
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.inner.source == other.inner.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::VarKind;

    fn deps_of(src: &str) -> Vec<String> {
        Expression::code(src).dependencies(&Scope::new())
    }

    #[test]
    fn extracts_observable_paths() {
        assert_eq!(deps_of("state.user.name"), vec!["state.user.name"]);
        assert_eq!(
            deps_of("input.a + context.theme.color"),
            vec!["input.a", "context.theme.color"]
        );
        assert_eq!(deps_of("state.items[state.index].label"), vec!["state.items", "state.index"]);
    }

    #[test]
    fn extracts_self_calls_with_suffixes() {
        assert_eq!(deps_of("self.format(state.x)"), vec!["self.format", "state.x"]);
    }

    #[test]
    fn method_names_are_not_paths() {
        assert_eq!(deps_of("state.name.trim()"), vec!["state.name"]);
    }

    #[test]
    fn static_values_are_not_reactive() {
        assert!(!Expression::code("static.title + 'x'").is_reactive(&Scope::new()));
        assert!(!Expression::code("1 + 2").is_reactive(&Scope::new()));
    }

    #[test]
    fn scope_variables_are_dependencies() {
        let mut scope = Scope::new();
        scope.declare("item", Value::Null, VarKind::Let).unwrap();
        let expr = Expression::code("item.label + index");
        assert_eq!(expr.dependencies(&scope), vec!["item"]);
        assert!(expr.reads_let(&scope));
    }

    #[test]
    fn arrow_params_shadow_scope() {
        let mut scope = Scope::new();
        scope.declare("item", Value::Null, VarKind::Let).unwrap();
        let expr = Expression::code("item => item.id + state.offset");
        assert_eq!(expr.dependencies(&scope), vec!["state.offset"]);
    }

    #[test]
    fn template_dependencies_merge_segments() {
        let expr = Expression::template("{state.a} and {state.b} and {state.a}");
        assert_eq!(expr.dependencies(&Scope::new()), vec!["state.a", "state.b"]);
    }

    #[test]
    fn invalid_source_evaluates_to_undefined() {
        let expr = Expression::code("state.");
        assert!(!expr.is_valid());
        let scope = Scope::new();
        assert!(expr.evaluate(&Env::detached(&scope)).is_undefined());
    }
}
