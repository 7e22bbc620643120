use crate::language::ast::{FunDecl, StructDecl, VarDecl};
use std::collections::HashMap;
use std::rc::Rc;

/// Struct tags live apart from ordinary identifiers, so a struct and a
/// variable may legally share a name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Namespace {
    Ordinary,
    StructTag,
}

#[derive(Clone, Debug)]
pub enum Symbol {
    Var(Rc<VarDecl>),
    Func(Rc<FunDecl>),
    Struct(Rc<StructDecl>),
}

#[derive(Debug)]
struct Scope {
    parent: Option<usize>,
    ordinary: HashMap<String, Symbol>,
    tags: HashMap<String, Symbol>,
}

impl Scope {
    fn new(parent: Option<usize>) -> Self {
        Self {
            parent,
            ordinary: HashMap::new(),
            tags: HashMap::new(),
        }
    }

    fn table(&self, namespace: Namespace) -> &HashMap<String, Symbol> {
        match namespace {
            Namespace::Ordinary => &self.ordinary,
            Namespace::StructTag => &self.tags,
        }
    }

    fn table_mut(&mut self, namespace: Namespace) -> &mut HashMap<String, Symbol> {
        match namespace {
            Namespace::Ordinary => &mut self.ordinary,
            Namespace::StructTag => &mut self.tags,
        }
    }
}

/// Lexical scope chain, stored as an arena of nodes with parent indices.
/// `current` tracks the innermost open scope; entering and leaving blocks
/// moves it, old nodes simply stop being reachable.
#[derive(Debug)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
    current: usize,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new(None)],
            current: 0,
        }
    }

    pub fn push(&mut self) {
        self.scopes.push(Scope::new(Some(self.current)));
        self.current = self.scopes.len() - 1;
    }

    pub fn pop(&mut self) {
        self.current = self.scopes[self.current]
            .parent
            .expect("cannot leave the root scope");
    }

    /// Installs a symbol in the current scope. The caller is responsible for
    /// checking `lookup_current` first; the scope itself is a passive store.
    pub fn declare(&mut self, name: impl Into<String>, symbol: Symbol, namespace: Namespace) {
        self.scopes[self.current]
            .table_mut(namespace)
            .insert(name.into(), symbol);
    }

    pub fn lookup(&self, name: &str, namespace: Namespace) -> Option<&Symbol> {
        let mut at = Some(self.current);
        while let Some(index) = at {
            let scope = &self.scopes[index];
            if let Some(symbol) = scope.table(namespace).get(name) {
                return Some(symbol);
            }
            at = scope.parent;
        }
        None
    }

    pub fn lookup_current(&self, name: &str, namespace: Namespace) -> Option<&Symbol> {
        self.scopes[self.current].table(namespace).get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::ast::{Type, VarDecl};
    use crate::language::span::Span;

    fn var(name: &str) -> Symbol {
        Symbol::Var(Rc::new(VarDecl::new(Type::Int, name, Span::new(0, 0))))
    }

    #[test]
    fn lookup_walks_outward() {
        let mut scopes = ScopeStack::new();
        scopes.declare("x", var("x"), Namespace::Ordinary);
        scopes.push();
        assert!(scopes.lookup("x", Namespace::Ordinary).is_some());
        assert!(scopes.lookup_current("x", Namespace::Ordinary).is_none());
    }

    #[test]
    fn shadowing_across_scopes_is_legal() {
        let mut scopes = ScopeStack::new();
        scopes.declare("x", var("outer"), Namespace::Ordinary);
        scopes.push();
        scopes.declare("x", var("inner"), Namespace::Ordinary);
        match scopes.lookup("x", Namespace::Ordinary) {
            Some(Symbol::Var(decl)) => assert_eq!(decl.name, "inner"),
            other => panic!("unexpected lookup result: {:?}", other),
        }
        scopes.pop();
        match scopes.lookup("x", Namespace::Ordinary) {
            Some(Symbol::Var(decl)) => assert_eq!(decl.name, "outer"),
            other => panic!("unexpected lookup result: {:?}", other),
        }
    }

    #[test]
    fn namespaces_do_not_collide() {
        let mut scopes = ScopeStack::new();
        scopes.declare("v", var("v"), Namespace::Ordinary);
        assert!(scopes.lookup_current("v", Namespace::StructTag).is_none());
        scopes.declare("v", var("v"), Namespace::StructTag);
        assert!(scopes.lookup("v", Namespace::Ordinary).is_some());
        assert!(scopes.lookup("v", Namespace::StructTag).is_some());
    }

    #[test]
    #[should_panic(expected = "root scope")]
    fn popping_the_root_scope_is_a_fault() {
        let mut scopes = ScopeStack::new();
        scopes.pop();
    }
}
