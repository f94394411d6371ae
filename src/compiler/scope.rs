//! Scoped identifier resolver
//!
//! Scopes live in an arena and refer to their parent by index; lookup walks the
//! index chain toward the root (the global scope). Redefinition within one scope
//! is an error, shadowing across scopes is not.

use crate::error::{Error, Result};
use std::collections::HashMap;

/// Index of a scope inside a [`ScopeTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

impl ScopeId {
    /// The global scope
    pub const GLOBAL: ScopeId = ScopeId(0);
}

/// Single scope in the tree
#[derive(Debug, Clone)]
struct Scope<V> {
    /// Names bound in this scope
    bindings: HashMap<String, V>,
    /// Index of parent scope (None for the global scope)
    parent: Option<ScopeId>,
}

/// Arena of nested lexical scopes
#[derive(Debug, Clone)]
pub struct ScopeTree<V> {
    scopes: Vec<Scope<V>>,
}

impl<V: Clone> ScopeTree<V> {
    /// Creates a tree holding only the global scope
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                bindings: HashMap::new(),
                parent: None,
            }],
        }
    }

    /// Creates a new scope chained to `parent`
    pub fn push(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            bindings: HashMap::new(),
            parent: Some(parent),
        });
        id
    }

    /// Binds `name` in `scope`; fails if `name` is already bound in that same scope
    pub fn define(&mut self, scope: ScopeId, name: &str, value: V) -> Result<()> {
        let bindings = &mut self.scopes[scope.0].bindings;
        if bindings.contains_key(name) {
            return Err(Error::DuplicateDefinition {
                name: name.to_string(),
            });
        }
        bindings.insert(name.to_string(), value);
        Ok(())
    }

    /// Finds `name` in `scope` or the nearest enclosing scope
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<V> {
        let mut idx = scope;
        loop {
            let scope = &self.scopes[idx.0];
            if let Some(value) = scope.bindings.get(name) {
                return Some(value.clone());
            }
            idx = scope.parent?;
        }
    }

    /// Like [`lookup`](Self::lookup), but a miss is an error
    pub fn resolve(&self, scope: ScopeId, name: &str) -> Result<V> {
        self.lookup(scope, name).ok_or_else(|| Error::UndefinedName {
            name: name.to_string(),
        })
    }
}

impl<V: Clone> Default for ScopeTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_define_and_lookup() {
        let mut tree = ScopeTree::new();
        tree.define(ScopeId::GLOBAL, "x", 42).unwrap();
        assert_eq!(tree.lookup(ScopeId::GLOBAL, "x"), Some(42));
    }

    #[test]
    fn test_undefined_name() {
        let tree: ScopeTree<u32> = ScopeTree::new();
        assert_eq!(tree.lookup(ScopeId::GLOBAL, "missing"), None);
        assert!(matches!(
            tree.resolve(ScopeId::GLOBAL, "missing"),
            Err(Error::UndefinedName { .. })
        ));
    }

    #[test]
    fn test_duplicate_in_same_scope() {
        let mut tree = ScopeTree::new();
        tree.define(ScopeId::GLOBAL, "x", 1).unwrap();
        let err = tree.define(ScopeId::GLOBAL, "x", 2).unwrap_err();
        assert!(matches!(err, Error::DuplicateDefinition { name } if name == "x"));
    }

    #[test]
    fn test_shadowing_across_scopes() {
        let mut tree = ScopeTree::new();
        tree.define(ScopeId::GLOBAL, "x", 10).unwrap();
        let inner = tree.push(ScopeId::GLOBAL);
        tree.define(inner, "x", 20).unwrap();
        tree.define(inner, "y", 30).unwrap();

        assert_eq!(tree.lookup(inner, "x"), Some(20));
        assert_eq!(tree.lookup(ScopeId::GLOBAL, "x"), Some(10));
        assert_eq!(tree.lookup(ScopeId::GLOBAL, "y"), None);
    }

    #[test]
    fn test_lookup_walks_to_root() {
        let mut tree = ScopeTree::new();
        tree.define(ScopeId::GLOBAL, "g", 1).unwrap();
        let a = tree.push(ScopeId::GLOBAL);
        let b = tree.push(a);
        tree.define(a, "a", 2).unwrap();
        assert_eq!(tree.lookup(b, "g"), Some(1));
        assert_eq!(tree.lookup(b, "a"), Some(2));
        assert_eq!(tree.lookup(a, "g"), Some(1));
    }

    #[test]
    fn test_sibling_scopes_are_isolated() {
        let mut tree = ScopeTree::new();
        let f = tree.push(ScopeId::GLOBAL);
        let g = tree.push(ScopeId::GLOBAL);
        tree.define(f, "x", 1).unwrap();
        tree.define(g, "x", 2).unwrap();
        assert_eq!(tree.lookup(f, "x"), Some(1));
        assert_eq!(tree.lookup(g, "x"), Some(2));
    }
}
