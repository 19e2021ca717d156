//! Attribute classification.
//!
//! The compiler hands every node a flat attribute list. Before rendering it
//! is split once into [`SyntaxAttributes`]: literals, expressions, spreads,
//! event and function instructions, argument declarations, plus the key
//! sets that fix spread precedence.

use indexmap::IndexMap;

use crate::expr::Expression;
use crate::value::{Scope, Value};

/// Attribute name that marks a node translatable.
pub const I18N_ATTR_FLAG: &str = "i18n";
pub const EVENT_LISTENER_FLAG: &str = "on-";
pub const FUNCTION_ATTR_FLAG: &str = "fn:";
pub const META_ATTRIBUTES: [&str; 3] = ["@html", "@text", "@format"];

/// One normalized attribute as produced by the compiler.
#[derive(Debug, Clone)]
pub enum Attribute {
    Literal(String, String),
    /// `name={expr}`.
    Expr(String, String),
    /// `name="text {expr}"`.
    Interpolated(String, String),
    /// `...expr`.
    Spread(String),
    /// `on-name="instruction"`.
    Event(String, String),
    /// `fn:name="instruction"`.
    Function(String, String),
    /// `[a, b]`.
    Args(Vec<String>),
    /// Valueless attribute; evaluates to `true`.
    Flag(String),
}

impl Attribute {
    /// Classify a raw `name=value` pair the way the compiler does.
    pub fn parse(name: &str, value: Option<&str>) -> Self {
        if let Some(source) = name.strip_prefix("...") {
            return Attribute::Spread(source.to_string());
        }
        if let Some(inner) = name.strip_prefix('[').and_then(|n| n.strip_suffix(']')) {
            return Attribute::Args(split_args(inner));
        }
        if let Some(event) = name.strip_prefix(EVENT_LISTENER_FLAG) {
            return Attribute::Event(event.to_string(), value.unwrap_or_default().to_string());
        }
        if let Some(func) = name.strip_prefix(FUNCTION_ATTR_FLAG) {
            return Attribute::Function(func.to_string(), value.unwrap_or_default().to_string());
        }
        let Some(value) = value else {
            return Attribute::Flag(name.trim_start_matches(':').to_string());
        };
        if let Some(bound) = name.strip_prefix(':') {
            return Attribute::Expr(bound.to_string(), value.to_string());
        }
        if let Some(code) = value.strip_prefix('{').and_then(|v| v.strip_suffix('}')) {
            if !code.contains('{') {
                return Attribute::Expr(name.to_string(), code.to_string());
            }
        }
        if value.contains('{') {
            return Attribute::Interpolated(name.to_string(), value.to_string());
        }
        Attribute::Literal(name.to_string(), value.to_string())
    }
}

fn split_args(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// An event or function attribute value.
#[derive(Debug, Clone)]
pub enum Instruction {
    /// `handler, arg1, arg2`: a handler method (or function-valued path)
    /// called with the evaluated arguments followed by the event payload.
    Call { handler: String, args: Vec<Expression> },
    /// Any expression evaluating to a function.
    Expr(Expression),
}

impl Instruction {
    pub fn parse(source: &str) -> Self {
        let source = source.trim();
        if source.contains("=>") {
            return Instruction::Expr(Expression::code(source));
        }
        let mut parts = split_top_level(source).into_iter();
        let head = parts.next().unwrap_or_default();
        let is_path = !head.is_empty()
            && head
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$');
        if !is_path {
            return Instruction::Expr(Expression::code(source));
        }
        Instruction::Call {
            handler: head.strip_prefix("self.").unwrap_or(&head).to_string(),
            args: parts.map(|arg| Expression::code(&arg)).collect(),
        }
    }

    pub fn source(&self) -> String {
        match self {
            Instruction::Call { handler, args } => std::iter::once(handler.clone())
                .chain(args.iter().map(|a| a.source().to_string()))
                .collect::<Vec<_>>()
                .join(", "),
            Instruction::Expr(expr) => expr.source().to_string(),
        }
    }

    pub fn dependencies(&self, scope: &Scope) -> Vec<String> {
        match self {
            Instruction::Call { args, .. } => {
                let mut out: Vec<String> = Vec::new();
                for dep in args.iter().flat_map(|a| a.dependencies(scope)) {
                    if !out.contains(&dep) {
                        out.push(dep);
                    }
                }
                out
            }
            Instruction::Expr(expr) => expr.dependencies(scope),
        }
    }
}

/// Split on commas that are not nested in brackets or quotes.
pub(crate) fn split_top_level(source: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut current = String::new();
    for c in source.chars() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => depth -= 1,
            (None, ',') if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Attributes of one node, split by role.
#[derive(Debug, Clone, Default)]
pub struct SyntaxAttributes {
    pub literals: IndexMap<String, String>,
    pub expressions: IndexMap<String, Expression>,
    pub spreads: Vec<Expression>,
    pub events: IndexMap<String, Instruction>,
    pub functions: IndexMap<String, Instruction>,
    pub argv: Vec<String>,
    /// Explicit keys positioned before the first spread.
    pub before_spread: Vec<String>,
    /// Explicit keys positioned after a spread.
    pub after_spread: Vec<String>,
    pub i18n: bool,
}

impl SyntaxAttributes {
    pub fn from_list(list: &[Attribute]) -> Self {
        let mut attrs = Self::default();
        let mut seen_spread = false;
        for attribute in list {
            let explicit = match attribute {
                Attribute::Literal(name, _) | Attribute::Flag(name) if name == I18N_ATTR_FLAG => {
                    attrs.i18n = true;
                    None
                }
                Attribute::Literal(name, value) => {
                    attrs.literals.insert(name.clone(), value.clone());
                    Some(name)
                }
                Attribute::Expr(name, code) => {
                    attrs.expressions.insert(name.clone(), Expression::code(code));
                    Some(name)
                }
                Attribute::Interpolated(name, text) => {
                    attrs.expressions.insert(name.clone(), Expression::template(text));
                    Some(name)
                }
                Attribute::Flag(name) => {
                    attrs
                        .expressions
                        .insert(name.clone(), Expression::literal(Value::Bool(true)));
                    Some(name)
                }
                Attribute::Spread(code) => {
                    seen_spread = true;
                    attrs.spreads.push(Expression::code(code));
                    None
                }
                Attribute::Event(name, source) => {
                    attrs.events.insert(name.clone(), Instruction::parse(source));
                    None
                }
                Attribute::Function(name, source) => {
                    attrs.functions.insert(name.clone(), Instruction::parse(source));
                    Some(name)
                }
                Attribute::Args(names) => {
                    attrs.argv = names.clone();
                    None
                }
            };
            if let Some(name) = explicit {
                if seen_spread {
                    attrs.after_spread.push(name.clone());
                } else {
                    attrs.before_spread.push(name.clone());
                }
            }
        }
        attrs
    }

    /// Whether `key` is bound explicitly on the node.
    pub fn is_explicit(&self, key: &str) -> bool {
        self.before_spread.iter().any(|k| k == key) || self.after_spread.iter().any(|k| k == key)
    }

    pub fn literal(&self, name: &str) -> Option<&str> {
        self.literals.get(name).map(String::as_str)
    }

    pub fn expression(&self, name: &str) -> Option<&Expression> {
        self.expressions.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.literals.contains_key(name) || self.expressions.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiler_style_names_are_classified() {
        assert!(matches!(Attribute::parse("...input.rest", None), Attribute::Spread(s) if s == "input.rest"));
        assert!(matches!(Attribute::parse("[item, i]", None), Attribute::Args(a) if a == ["item", "i"]));
        assert!(matches!(Attribute::parse("on-click", Some("pick")), Attribute::Event(..)));
        assert!(matches!(Attribute::parse("fn:format", Some("fmt")), Attribute::Function(..)));
        assert!(matches!(Attribute::parse(":width", Some("state.w")), Attribute::Expr(n, _) if n == "width"));
        assert!(matches!(Attribute::parse("title", Some("{state.t}")), Attribute::Expr(..)));
        assert!(matches!(Attribute::parse("title", Some("a {state.t}")), Attribute::Interpolated(..)));
        assert!(matches!(Attribute::parse("disabled", None), Attribute::Flag(_)));
        assert!(matches!(Attribute::parse("id", Some("x")), Attribute::Literal(..)));
    }

    #[test]
    fn spread_position_splits_explicit_keys() {
        let attrs = SyntaxAttributes::from_list(&[
            Attribute::Literal("k1".into(), "1".into()),
            Attribute::Spread("state.bag".into()),
            Attribute::Expr("k2".into(), "4".into()),
            Attribute::Flag("i18n".into()),
        ]);
        assert_eq!(attrs.before_spread, ["k1"]);
        assert_eq!(attrs.after_spread, ["k2"]);
        assert!(attrs.is_explicit("k2"));
        assert!(!attrs.is_explicit("k3"));
        assert!(attrs.i18n);
    }

    #[test]
    fn instructions_split_handler_and_arguments() {
        match Instruction::parse("self.pick, item.id, { a: 1, b: 2 }") {
            Instruction::Call { handler, args } => {
                assert_eq!(handler, "pick");
                assert_eq!(args.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(Instruction::parse("e => self.log(e)"), Instruction::Expr(_)));
    }
}
