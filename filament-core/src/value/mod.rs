//! Dynamic Values
//!
//! Templates are evaluated against loosely-typed data: component input,
//! state, context and scope variables. [`Value`] is that data model.
//!
//! # Sharing
//!
//! Containers (`Array`, `Object`, `Map`) are reference counted, so cloning a
//! value is cheap and two values can be checked for *identity* with
//! [`Value::same_ref`]. Mutation never happens in place: [`deep_assign`]
//! copies the containers along the assigned path and shares everything else.
//!
//! # Equality
//!
//! `PartialEq` is deep and structural for data. Functions, renderers,
//! templates and promises compare by identity.

mod promise;
mod scope;

pub use promise::{Promise, PromiseState};
pub use scope::{Scope, VarKind, Variable};

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{Error, EvalError, Result};
use crate::mesh::MeshRenderer;
use crate::template::Template;

/// Ordered string-keyed mapping.
pub type Object = IndexMap<String, Value>;

/// Native callable: handler methods, arrow functions, `fn:` attributes.
pub type NativeFn = dyn Fn(&[Value]) -> std::result::Result<Value, EvalError>;

/// A reference counted callable value.
#[derive(Clone)]
pub struct Function(Rc<NativeFn>);

impl Function {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> std::result::Result<Value, EvalError> + 'static,
    {
        Self(Rc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> std::result::Result<Value, EvalError> {
        (self.0)(args)
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// A loosely-typed value visible to template expressions.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<Vec<Value>>),
    Object(Rc<Object>),
    /// Ordered map with arbitrary keys.
    Map(Rc<Vec<(Value, Value)>>),
    Function(Function),
    Renderer(MeshRenderer),
    Template(Rc<Template>),
    Promise(Promise),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Rc::from(s.as_ref()))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(items))
    }

    pub fn object(entries: Object) -> Self {
        Value::Object(Rc::new(entries))
    }

    pub fn empty_object() -> Self {
        Value::Object(Rc::new(Object::new()))
    }

    pub fn map(entries: Vec<(Value, Value)>) -> Self {
        Value::Map(Rc::new(entries))
    }

    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> std::result::Result<Value, EvalError> + 'static,
    {
        Value::Function(Function::new(f))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Map(_) => "map",
            Value::Function(_) => "function",
            Value::Renderer(_) => "renderer",
            Value::Template(_) => "template",
            Value::Promise(_) => "promise",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Script-style truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_renderer(&self) -> Option<&MeshRenderer> {
        match self {
            Value::Renderer(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_promise(&self) -> Option<&Promise> {
        match self {
            Value::Promise(p) => Some(p),
            _ => None,
        }
    }

    /// Numeric coercion used by arithmetic and ranges.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Bool(true) => 1.0,
            Value::Bool(false) | Value::Null => 0.0,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    /// Property lookup. Never fails; missing keys are `undefined`.
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Object(map) => map.get(key).cloned().unwrap_or_default(),
            Value::Array(items) => match key {
                "length" => Value::Number(items.len() as f64),
                _ => key
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or_default(),
            },
            Value::String(s) if key == "length" => Value::Number(s.chars().count() as f64),
            Value::Map(entries) => match key {
                "size" => Value::Number(entries.len() as f64),
                _ => entries
                    .iter()
                    .find(|(k, _)| k.as_str() == Some(key))
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default(),
            },
            _ => Value::Undefined,
        }
    }

    /// Index lookup with a computed key.
    pub fn get_index(&self, index: &Value) -> Value {
        match (self, index) {
            (Value::Array(items), Value::Number(n)) if *n >= 0.0 && n.fract() == 0.0 => {
                items.get(*n as usize).cloned().unwrap_or_default()
            }
            (Value::Map(entries), key) => entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or_default(),
            (_, key) => self.get(&key.to_display()),
        }
    }

    /// Walk a dotted / bracketed path such as `user.tags[0].label`.
    pub fn at(&self, path: &str) -> Value {
        if path.is_empty() {
            return self.clone();
        }
        let mut current = self.clone();
        for segment in segments(path) {
            current = match segment {
                Segment::Key(key) => current.get(&key),
                Segment::Index(i) => current.get_index(&Value::Number(i as f64)),
            };
            if current.is_undefined() {
                break;
            }
        }
        current
    }

    /// Identity check: same container allocation, or equal primitives.
    pub fn same_ref(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            _ => self == other,
        }
    }

    /// Deep structural equality.
    pub fn is_equal(&self, other: &Value) -> bool {
        self == other
    }

    pub fn is_diff(&self, other: &Value) -> bool {
        self != other
    }

    /// Copy every container in the tree. Non-data values keep their identity.
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::Array(items) => Value::array(items.iter().map(Value::deep_clone).collect()),
            Value::Object(map) => Value::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.deep_clone()))
                    .collect(),
            ),
            Value::Map(entries) => Value::map(
                entries
                    .iter()
                    .map(|(k, v)| (k.deep_clone(), v.deep_clone()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Shallow merge of two objects; keys of `patch` win.
    pub fn merge(&self, patch: &Value) -> Value {
        let mut merged = self.as_object().cloned().unwrap_or_default();
        if let Some(patch) = patch.as_object() {
            for (k, v) in patch {
                merged.insert(k.clone(), v.clone());
            }
        }
        Value::object(merged)
    }

    /// String rendering used by interpolation and attribute writes.
    pub fn to_display(&self) -> String {
        match self {
            Value::Undefined | Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.to_string(),
            Value::Array(items) => items
                .iter()
                .map(Value::to_display)
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) | Value::Map(_) => self.to_json().to_string(),
            Value::Function(_) => "[function]".into(),
            Value::Renderer(_) => "[renderer]".into(),
            Value::Template(_) => "[template]".into(),
            Value::Promise(_) => "[promise]".into(),
        }
    }

    /// Convert to JSON. Non-data values become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Undefined | Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.to_string()),
            Value::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Map(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_display(), v.to_json()))
                    .collect(),
            ),
            _ => Json::Null,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".into()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".into() } else { "-Infinity".into() }
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Object(a), Value::Object(b)) => {
                Rc::ptr_eq(a, b)
                    || (a.len() == b.len()
                        && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v == w)))
            }
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Renderer(a), Value::Renderer(b)) => a.ptr_eq(b),
            (Value::Template(a), Value::Template(b)) => Rc::ptr_eq(a, b),
            (Value::Promise(a), Value::Promise(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Object(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Map(entries) => f
                .debug_map()
                .entries(entries.iter().map(|(k, v)| (k, v)))
                .finish(),
            Value::Function(_) => f.write_str("[function]"),
            Value::Renderer(_) => f.write_str("[renderer]"),
            Value::Template(_) => f.write_str("[template]"),
            Value::Promise(p) => write!(f, "[promise {:?}]", p.state()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::string(s),
            Json::Array(items) => Value::array(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => Value::object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl From<Object> for Value {
    fn from(map: Object) -> Self {
        Value::object(map)
    }
}

impl From<Promise> for Value {
    fn from(p: Promise) -> Self {
        Value::Promise(p)
    }
}

impl From<MeshRenderer> for Value {
    fn from(r: MeshRenderer) -> Self {
        Value::Renderer(r)
    }
}

impl From<Rc<Template>> for Value {
    fn from(t: Rc<Template>) -> Self {
        Value::Template(t)
    }
}

// ----------------------------------------------------------------------------
// Path assignment
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

fn segments(path: &str) -> Vec<Segment> {
    let mut out = Vec::new();
    for part in path.split('.') {
        let mut rest = part;
        if let Some(open) = rest.find('[') {
            if open > 0 {
                out.push(Segment::Key(rest[..open].to_string()));
            }
            rest = &rest[open..];
            while let Some(stripped) = rest.strip_prefix('[') {
                let Some(close) = stripped.find(']') else { break };
                let inner = &stripped[..close];
                match inner.parse::<usize>() {
                    Ok(i) => out.push(Segment::Index(i)),
                    Err(_) => out.push(Segment::Key(inner.to_string())),
                }
                rest = &stripped[close + 1..];
            }
        } else if !rest.is_empty() {
            out.push(Segment::Key(rest.to_string()));
        }
    }
    out
}

/// Whether `path` is a legal merge-patch path.
pub fn is_valid_path(path: &str) -> bool {
    !path.is_empty()
        && path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '[' | ']' | '.'))
}

/// Return a copy of `target` with `value` written at `path`.
///
/// Containers along the path are copied, missing ones are created (objects
/// for keys, arrays for indices). Sibling branches keep their identity.
pub fn deep_assign(target: &Value, path: &str, value: Value) -> Result<Value> {
    if !is_valid_path(path) {
        return Err(Error::InvalidPath(path.to_string()));
    }
    Ok(assign_at(target, &segments(path), value))
}

fn assign_at(target: &Value, path: &[Segment], value: Value) -> Value {
    let Some((head, rest)) = path.split_first() else {
        return value;
    };
    match head {
        Segment::Key(key) => {
            let mut map = target.as_object().cloned().unwrap_or_default();
            let child = map.get(key).cloned().unwrap_or_default();
            map.insert(key.clone(), assign_at(&child, rest, value));
            Value::object(map)
        }
        Segment::Index(index) => {
            let mut items = target.as_array().map(<[Value]>::to_vec).unwrap_or_default();
            if items.len() <= *index {
                items.resize(index + 1, Value::Undefined);
            }
            let child = items[*index].clone();
            items[*index] = assign_at(&child, rest, value);
            Value::array(items)
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_equality_is_structural() {
        let a = Value::from(json!({"user": {"name": "ada", "tags": [1, 2]}}));
        let b = Value::from(json!({"user": {"name": "ada", "tags": [1, 2]}}));
        assert_eq!(a, b);
        assert!(!a.same_ref(&b));
        assert!(a.same_ref(&a.clone()));

        let c = Value::from(json!({"user": {"name": "ada", "tags": [1, 3]}}));
        assert!(a.is_diff(&c));
    }

    #[test]
    fn path_lookup_walks_keys_and_indices() {
        let v = Value::from(json!({"user": {"tags": [{"label": "x"}, {"label": "y"}]}}));
        assert_eq!(v.at("user.tags[1].label"), Value::from("y"));
        assert_eq!(v.at("user.tags.length"), Value::from(2));
        assert!(v.at("user.missing.deeper").is_undefined());
    }

    #[test]
    fn deep_assign_copies_only_the_assigned_branch() {
        let v = Value::from(json!({"a": {"b": 1}, "keep": [1, 2, 3]}));
        let next = deep_assign(&v, "a.b", Value::from(2)).unwrap();

        assert_eq!(next.at("a.b"), Value::from(2));
        assert_eq!(v.at("a.b"), Value::from(1));
        assert!(next.get("keep").same_ref(&v.get("keep")));
    }

    #[test]
    fn deep_assign_creates_missing_containers() {
        let next = deep_assign(&Value::Undefined, "else-if[1].by", Value::Bool(true)).unwrap();
        assert_eq!(next.at("else-if[1].by"), Value::Bool(true));
        assert!(next.at("else-if[0]").is_undefined());
    }

    #[test]
    fn deep_assign_rejects_invalid_paths() {
        let err = deep_assign(&Value::Undefined, "a b", Value::Null).unwrap_err();
        assert!(matches!(err, Error::InvalidPath(_)));
    }

    #[test]
    fn display_follows_template_conventions() {
        assert_eq!(Value::Number(3.0).to_display(), "3");
        assert_eq!(Value::Number(2.5).to_display(), "2.5");
        assert_eq!(Value::Undefined.to_display(), "");
        assert_eq!(Value::from(json!([1, "a"])).to_display(), "1,a");
    }

    #[test]
    fn truthiness() {
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(Value::from(json!([])).is_truthy());
        assert!(Value::from("0").is_truthy());
    }
}
