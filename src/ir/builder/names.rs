use std::collections::HashMap;

use tracing::trace;

use crate::ir::Var;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// A function body, names of enclosing scopes are not visible through it.
    Function,
    /// A then or else branch, names of the enclosing scope stay visible.
    Branch,
}

#[derive(Debug, Clone)]
struct Scope {
    kind: ScopeKind,
    names: HashMap<String, Var>,
}

impl Scope {
    fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            names: HashMap::new(),
        }
    }
}

/// The names visible in a build session, one scope per open function, then
/// or else frame. Binding a name again in the same scope shadows the previous var.
#[derive(Debug, Clone)]
pub struct NameTable {
    /// Never empty, the first scope holds names bound outside any function.
    scopes: Vec<Scope>,
}

impl Default for NameTable {
    fn default() -> Self {
        Self {
            scopes: vec![Scope::new(ScopeKind::Function)],
        }
    }
}

impl NameTable {
    pub fn push_scope(&mut self, kind: ScopeKind) {
        trace!(?kind, depth = self.scopes.len(), "push name scope");
        self.scopes.push(Scope::new(kind));
    }

    /// Drops the innermost scope and every name bound in it.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn bind(&mut self, name: impl Into<String>, var: Var) {
        let name = name.into();
        trace!(%name, id = var.id, "bind name");
        if let Some(scope) = self.scopes.last_mut() {
            scope.names.insert(name, var);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Var> {
        for scope in self.scopes.iter().rev() {
            if let Some(var) = scope.names.get(name) {
                return Some(var);
            }
            if scope.kind == ScopeKind::Function {
                break;
            }
        }
        None
    }

    /// Replaces every visible binding of the var with `var`, e.g after its
    /// annotations changed.
    pub fn refresh(&mut self, var: &Var) {
        for scope in self.scopes.iter_mut().rev() {
            for bound in scope.names.values_mut() {
                if bound.id == var.id {
                    *bound = var.clone();
                }
            }
            if scope.kind == ScopeKind::Function {
                break;
            }
        }
    }
}
