//! Scopes and variables.

use std::rc::Rc;

use indexmap::IndexMap;

use super::{Object, Value};
use crate::error::{Error, Result};

/// How a variable was introduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Let,
    Const,
    /// Bound by a mesh invocation and refreshed on every mesh update.
    Arg,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub value: Value,
    pub kind: VarKind,
}

impl Variable {
    pub fn new(value: Value, kind: VarKind) -> Self {
        Self { value, kind }
    }
}

/// Ordered name → variable mapping visible to one template subtree.
///
/// Nested scopes are clones: a child sees its parent's variables but its own
/// declarations never leak back to siblings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    vars: IndexMap<String, Variable>,
    arguments: Option<Rc<Object>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.vars.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.vars.get(name).map(|v| &v.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Variable)> {
        self.vars.iter()
    }

    /// Declare a `let` or `const`. Fails when `name` is already a constant.
    pub fn declare(&mut self, name: &str, value: Value, kind: VarKind) -> Result<()> {
        if let Some(existing) = self.vars.get(name) {
            if existing.kind == VarKind::Const {
                return Err(Error::ConstReassignment(name.to_string()));
            }
        }
        self.vars.insert(name.to_string(), Variable::new(value, kind));
        Ok(())
    }

    /// Reassign an existing variable, keeping its kind.
    pub fn assign(&mut self, name: &str, value: Value) -> Result<()> {
        match self.vars.get_mut(name) {
            Some(var) if var.kind == VarKind::Const => {
                Err(Error::ConstReassignment(name.to_string()))
            }
            Some(var) => {
                var.value = value;
                Ok(())
            }
            None => self.declare(name, value, VarKind::Let),
        }
    }

    /// Bind a mesh argument. Arguments shadow anything of the same name.
    pub fn bind_arg(&mut self, name: &str, value: Value) {
        self.vars
            .insert(name.to_string(), Variable::new(value, VarKind::Arg));
    }

    pub fn bind_args(&mut self, args: &Object) {
        for (name, value) in args {
            self.bind_arg(name, value.clone());
        }
    }

    pub fn arguments(&self) -> Option<&Rc<Object>> {
        self.arguments.as_ref()
    }

    pub fn set_arguments(&mut self, arguments: Object) {
        self.arguments = Some(Rc::new(arguments));
    }

    /// Overlay every variable of `other` onto this scope.
    pub fn extend(&mut self, other: &Scope) {
        for (name, var) in &other.vars {
            self.vars.insert(name.clone(), var.clone());
        }
        if other.arguments.is_some() {
            self.arguments = other.arguments.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_cannot_be_redeclared() {
        let mut scope = Scope::new();
        scope.declare("a", Value::from(1), VarKind::Const).unwrap();
        assert!(matches!(
            scope.declare("a", Value::from(2), VarKind::Let),
            Err(Error::ConstReassignment(_))
        ));
        assert!(scope.assign("a", Value::from(3)).is_err());
        assert_eq!(scope.value("a"), Some(&Value::from(1)));
    }

    #[test]
    fn clones_do_not_leak_declarations() {
        let mut parent = Scope::new();
        parent.declare("x", Value::from(1), VarKind::Let).unwrap();

        let mut child = parent.clone();
        child.declare("y", Value::from(2), VarKind::Let).unwrap();
        child.assign("x", Value::from(5)).unwrap();

        assert!(!parent.contains("y"));
        assert_eq!(parent.value("x"), Some(&Value::from(1)));
    }

    #[test]
    fn args_shadow_constants() {
        let mut scope = Scope::new();
        scope.declare("item", Value::from(1), VarKind::Const).unwrap();
        scope.bind_arg("item", Value::from(2));
        assert_eq!(scope.get("item").map(|v| v.kind), Some(VarKind::Arg));
    }
}
