use crate::builtinops::get_builtin_ops;
use crate::intern::{Symbol, intern};
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Shared handle to a scope. Child scopes and closures hold these, so a scope
/// lives as long as the longest-lived closure that captured it.
pub type Env = Rc<Scope>;

/// One lexical scope: local bindings plus the enclosing scope.
///
/// Parent links always point at a scope that existed before the child was
/// created, so chains are acyclic and lookups terminate.
#[derive(Default)]
pub struct Scope {
    bindings: RefCell<HashMap<Symbol, Value>>,
    parent: Option<Env>,
}

impl Scope {
    /// Create an empty root scope (no builtins)
    pub fn new() -> Env {
        Rc::new(Scope::default())
    }

    /// Create the root scope seeded with every builtin procedure
    pub fn root() -> Env {
        let env = Scope::new();
        for op in get_builtin_ops() {
            env.insert(intern(op.name), Value::Builtin(op));
        }
        env
    }

    /// Create a fresh child scope of `parent`
    pub fn with_parent(parent: &Env) -> Env {
        Rc::new(Scope {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(Rc::clone(parent)),
        })
    }

    /// Look `name` up in this scope, then outward through the parents
    pub fn lookup(&self, name: Symbol) -> Option<Value> {
        let mut scope = self;
        loop {
            if let Some(value) = scope.bindings.borrow().get(&name) {
                return Some(value.clone());
            }
            scope = scope.parent.as_deref()?;
        }
    }

    /// Bind `name` in this scope only, replacing any local binding
    pub fn insert(&self, name: Symbol, value: Value) {
        self.bindings.borrow_mut().insert(name, value);
    }

    /// Overwrite the binding of `name` in the innermost scope that holds it.
    ///
    /// Returns false, leaving every scope untouched, if `name` is unbound.
    pub fn assign(&self, name: Symbol, value: Value) -> bool {
        let mut scope = self;
        loop {
            if let Some(slot) = scope.bindings.borrow_mut().get_mut(&name) {
                *slot = value;
                return true;
            }
            match scope.parent.as_deref() {
                Some(parent) => scope = parent,
                None => return false,
            }
        }
    }

    /// Get all bindings visible from this scope.
    /// Returns (name, value) pairs sorted by name, inner bindings shadowing outer ones
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();

        let mut chain = Vec::new();
        let mut scope = Some(self);
        while let Some(current) = scope {
            chain.push(current);
            scope = current.parent.as_deref();
        }

        // Outermost first, so inner scopes override
        for current in chain.into_iter().rev() {
            for (name, value) in current.bindings.borrow().iter() {
                bindings.insert(name.name(), value.clone());
            }
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}
