//! Expression evaluation.

use std::rc::{Rc, Weak};

use super::{ArrayItem, BinaryOp, Expr, LogicalOp, Property, UnaryOp};
use crate::error::EvalError;
use crate::value::{Object, Scope, Value};

type EvalResult = Result<Value, EvalError>;

/// The owner of an evaluation: supplies metavariables and `self` methods.
pub trait Host {
    /// `input`, `state`, `static` or `context`.
    fn metavar(&self, name: &str) -> Option<Value>;

    fn has_method(&self, name: &str) -> bool;

    fn call_method(&self, name: &str, args: &[Value]) -> EvalResult;
}

/// Evaluation environment: host, scope and arrow-function locals.
pub struct Env<'a> {
    host: Option<Rc<dyn Host>>,
    scope: &'a Scope,
    locals: Vec<(String, Value)>,
}

impl<'a> Env<'a> {
    pub fn new(host: Rc<dyn Host>, scope: &'a Scope) -> Self {
        Self {
            host: Some(host),
            scope,
            locals: Vec::new(),
        }
    }

    /// An environment without a host: only scope variables resolve.
    pub fn detached(scope: &'a Scope) -> Self {
        Self {
            host: None,
            scope,
            locals: Vec::new(),
        }
    }

    pub fn scope(&self) -> &Scope {
        self.scope
    }

    fn lookup(&self, name: &str) -> EvalResult {
        if let Some((_, value)) = self.locals.iter().rev().find(|(n, _)| n == name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.scope.value(name) {
            return Ok(value.clone());
        }
        if name == "arguments" {
            return Ok(self
                .scope
                .arguments()
                .map(|args| Value::Object(args.clone()))
                .unwrap_or_default());
        }
        if let Some(value) = self.host.as_ref().and_then(|h| h.metavar(name)) {
            return Ok(value);
        }
        Err(EvalError::UnknownIdentifier(name.to_string()))
    }

    fn is_self(&self, expr: &Expr) -> bool {
        matches!(expr, Expr::Ident(name) if name == "self")
            && !self.locals.iter().any(|(n, _)| n == "self")
            && !self.scope.contains("self")
    }

    fn host(&self) -> Result<&Rc<dyn Host>, EvalError> {
        self.host.as_ref().ok_or(EvalError::HostGone)
    }

    pub fn eval(&self, expr: &Expr) -> EvalResult {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Ident(name) => self.lookup(name),
            Expr::Member {
                object,
                property,
                optional,
            } => {
                if self.is_self(object) {
                    return self.self_member(property);
                }
                let target = self.eval(object)?;
                if target.is_nullish() {
                    if *optional {
                        return Ok(Value::Undefined);
                    }
                    return Err(EvalError::UndefinedAccess {
                        property: property.clone(),
                        target: target.type_name(),
                    });
                }
                Ok(target.get(property))
            }
            Expr::Index { object, index } => {
                let target = self.eval(object)?;
                let key = self.eval(index)?;
                if target.is_nullish() {
                    return Err(EvalError::UndefinedAccess {
                        property: key.to_display(),
                        target: target.type_name(),
                    });
                }
                Ok(target.get_index(&key))
            }
            Expr::Call { callee, args } => {
                let argv = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(callee, &argv)
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.is_truthy()),
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                })
            }
            Expr::Binary { op, left, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                Ok(binary(*op, &l, &r))
            }
            Expr::Logical { op, left, right } => {
                let l = self.eval(left)?;
                match op {
                    LogicalOp::And if !l.is_truthy() => Ok(l),
                    LogicalOp::Or if l.is_truthy() => Ok(l),
                    LogicalOp::Nullish if !l.is_nullish() => Ok(l),
                    _ => self.eval(right),
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test)?.is_truthy() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        ArrayItem::Item(e) => out.push(self.eval(e)?),
                        ArrayItem::Spread(e) => match self.eval(e)? {
                            Value::Array(values) => out.extend(values.iter().cloned()),
                            other => {
                                return Err(EvalError::Thrown(format!(
                                    "cannot spread {} into an array",
                                    other.type_name()
                                )))
                            }
                        },
                    }
                }
                Ok(Value::array(out))
            }
            Expr::Object(props) => {
                let mut out = Object::new();
                for prop in props {
                    match prop {
                        Property::Pair(key, e) => {
                            out.insert(key.clone(), self.eval(e)?);
                        }
                        Property::Spread(e) => {
                            if let Value::Object(map) = self.eval(e)? {
                                for (k, v) in map.iter() {
                                    out.insert(k.clone(), v.clone());
                                }
                            }
                        }
                    }
                }
                Ok(Value::object(out))
            }
            Expr::Arrow { params, body } => Ok(self.closure(params.clone(), body.clone())),
        }
    }

    fn self_member(&self, property: &str) -> EvalResult {
        let host = self.host()?;
        if host.has_method(property) {
            let weak = Rc::downgrade(host);
            let name = property.to_string();
            return Ok(Value::function(move |args| {
                let host = weak.upgrade().ok_or(EvalError::HostGone)?;
                host.call_method(&name, args)
            }));
        }
        Ok(host.metavar(property).unwrap_or_default())
    }

    fn call(&self, callee: &Expr, args: &[Value]) -> EvalResult {
        if let Expr::Member {
            object,
            property,
            optional,
        } = callee
        {
            if self.is_self(object) {
                return self.host()?.call_method(property, args);
            }
            let target = self.eval(object)?;
            if target.is_nullish() {
                if *optional {
                    return Ok(Value::Undefined);
                }
                return Err(EvalError::UndefinedAccess {
                    property: property.clone(),
                    target: target.type_name(),
                });
            }
            if let Some(result) = builtin_method(&target, property, args) {
                return result;
            }
            return invoke(&target.get(property), property, args);
        }

        if let Expr::Ident(name) = callee {
            if let Some(result) = builtin_global(name, args) {
                if self.lookup(name).is_err() {
                    return result;
                }
            }
        }
        let function = self.eval(callee)?;
        invoke(&function, "expression", args)
    }

    fn closure(&self, params: Vec<String>, body: Rc<Expr>) -> Value {
        let host: Option<Weak<dyn Host>> = self.host.as_ref().map(Rc::downgrade);
        let scope = self.scope.clone();
        let locals = self.locals.clone();
        Value::function(move |args| {
            let host = match &host {
                Some(weak) => Some(weak.upgrade().ok_or(EvalError::HostGone)?),
                None => None,
            };
            let mut env = Env {
                host,
                scope: &scope,
                locals: locals.clone(),
            };
            for (i, name) in params.iter().enumerate() {
                env.locals
                    .push((name.clone(), args.get(i).cloned().unwrap_or_default()));
            }
            env.eval(&body)
        })
    }
}

fn invoke(function: &Value, name: &str, args: &[Value]) -> EvalResult {
    match function {
        Value::Function(f) => f.call(args),
        _ => Err(EvalError::NotCallable(name.to_string())),
    }
}

fn loose_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (a, b) if a.is_nullish() && b.is_nullish() => true,
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            l.to_number() == r.to_number()
        }
        (Value::Bool(_), _) | (_, Value::Bool(_)) if !l.is_nullish() && !r.is_nullish() => {
            l.to_number() == r.to_number()
        }
        _ => l.same_ref(r),
    }
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Value {
    match op {
        BinaryOp::Add => match (l, r) {
            (Value::String(_), _) | (_, Value::String(_)) => {
                Value::string(format!("{}{}", l.to_display(), r.to_display()))
            }
            _ => Value::Number(l.to_number() + r.to_number()),
        },
        BinaryOp::Sub => Value::Number(l.to_number() - r.to_number()),
        BinaryOp::Mul => Value::Number(l.to_number() * r.to_number()),
        BinaryOp::Div => Value::Number(l.to_number() / r.to_number()),
        BinaryOp::Rem => Value::Number(l.to_number() % r.to_number()),
        BinaryOp::Eq => Value::Bool(loose_eq(l, r)),
        BinaryOp::NotEq => Value::Bool(!loose_eq(l, r)),
        BinaryOp::StrictEq => Value::Bool(l.same_ref(r)),
        BinaryOp::StrictNotEq => Value::Bool(!l.same_ref(r)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (l, r) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => l.to_number().partial_cmp(&r.to_number()),
            };
            let Some(ordering) = ordering else {
                return Value::Bool(false);
            };
            Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
    }
}

fn builtin_global(name: &str, args: &[Value]) -> Option<EvalResult> {
    let first = args.first().cloned().unwrap_or_default();
    Some(Ok(match name {
        "String" => Value::string(first.to_display()),
        "Number" => Value::Number(first.to_number()),
        "Boolean" => Value::Bool(first.is_truthy()),
        _ => return None,
    }))
}

fn builtin_method(target: &Value, method: &str, args: &[Value]) -> Option<EvalResult> {
    let arg = |i: usize| args.get(i).cloned().unwrap_or_default();
    let result = match (target, method) {
        (Value::String(s), "toUpperCase") => Value::string(s.to_uppercase()),
        (Value::String(s), "toLowerCase") => Value::string(s.to_lowercase()),
        (Value::String(s), "trim") => Value::string(s.trim()),
        (Value::String(s), "includes") => Value::Bool(s.contains(&*arg(0).to_display())),
        (Value::String(s), "startsWith") => Value::Bool(s.starts_with(&*arg(0).to_display())),
        (Value::String(s), "endsWith") => Value::Bool(s.ends_with(&*arg(0).to_display())),
        (Value::String(s), "split") => {
            let sep = arg(0).to_display();
            Value::array(s.split(sep.as_str()).map(Value::string).collect())
        }
        (Value::Array(items), "includes") => Value::Bool(items.contains(&arg(0))),
        (Value::Array(items), "indexOf") => Value::Number(
            items
                .iter()
                .position(|v| *v == arg(0))
                .map(|i| i as f64)
                .unwrap_or(-1.0),
        ),
        (Value::Array(items), "join") => {
            let sep = match arg(0) {
                Value::Undefined => ",".to_string(),
                other => other.to_display(),
            };
            Value::string(
                items
                    .iter()
                    .map(Value::to_display)
                    .collect::<Vec<_>>()
                    .join(&sep),
            )
        }
        (Value::Number(n), "toFixed") => {
            let digits = arg(0).to_number();
            let digits = if digits.is_nan() { 0 } else { digits as usize };
            Value::string(format!("{:.*}", digits, n))
        }
        _ => return None,
    };
    Some(Ok(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expression;
    use serde_json::json;
    use std::cell::Cell;

    struct TestHost {
        state: Value,
        clicks: Cell<u32>,
    }

    impl Host for TestHost {
        fn metavar(&self, name: &str) -> Option<Value> {
            (name == "state").then(|| self.state.clone())
        }

        fn has_method(&self, name: &str) -> bool {
            name == "click"
        }

        fn call_method(&self, name: &str, args: &[Value]) -> EvalResult {
            match name {
                "click" => {
                    self.clicks.set(self.clicks.get() + 1);
                    Ok(args.first().cloned().unwrap_or_default())
                }
                other => Err(EvalError::UnknownMethod(other.into())),
            }
        }
    }

    fn host() -> Rc<TestHost> {
        Rc::new(TestHost {
            state: Value::from(json!({"count": 2, "user": {"name": "ada"}, "items": [1, 2, 3]})),
            clicks: Cell::new(0),
        })
    }

    fn eval(src: &str) -> Value {
        let scope = Scope::new();
        Expression::code(src).evaluate(&Env::new(host(), &scope))
    }

    #[test]
    fn evaluates_against_host_metavars() {
        assert_eq!(eval("state.count * 10"), Value::from(20));
        assert_eq!(eval("state.user.name.toUpperCase()"), Value::from("ADA"));
        assert_eq!(eval("state.items.length > 2 ? 'many' : 'few'"), Value::from("many"));
    }

    #[test]
    fn undefined_paths_are_safe() {
        assert!(eval("state.nothing.deeper").is_undefined());
        assert!(eval("unknown + 1").is_undefined());
        assert!(eval("state.nothing?.deeper").is_undefined());
    }

    #[test]
    fn string_concatenation_and_equality() {
        assert_eq!(eval("'n=' + state.count"), Value::from("n=2"));
        assert_eq!(eval("state.count == '2'"), Value::Bool(true));
        assert_eq!(eval("state.count === '2'"), Value::Bool(false));
        assert_eq!(eval("null ?? 'fallback'"), Value::from("fallback"));
    }

    #[test]
    fn self_methods_are_callable() {
        let h = host();
        let scope = Scope::new();
        let env = Env::new(h.clone(), &scope);
        assert_eq!(
            Expression::code("self.click(state.count)").evaluate(&env),
            Value::from(2)
        );

        let handler = Expression::code("e => self.click(e)").evaluate(&env);
        let Value::Function(f) = handler else { panic!("expected function") };
        assert_eq!(f.call(&[Value::from("evt")]).unwrap(), Value::from("evt"));
        assert_eq!(h.clicks.get(), 2);
    }

    #[test]
    fn object_literals_spread_and_override() {
        let value = eval("{ ...{ a: 1, b: 2 }, b: 3 }");
        assert_eq!(value, Value::from(json!({"a": 1, "b": 3})));
    }
}
