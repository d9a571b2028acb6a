//! Symbol table: a scope tree with non-owning back-references.
//!
//! Scopes own symbols; a use-site in the AST never holds a link back into
//! the tree, only a name (optionally namespace-qualified) that is looked up
//! again at resolution time - this keeps the tree acyclic, per `spec.md`
//! §5/§9 ("a back-reference from a use-site to its defining symbol is a
//! lookup... never a reverse-owning link").

use crate::ast::{Expr, Mutability};
use crate::types::{ArgClass, TypeDescriptor};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Global,
    /// Byte offset from `%rbp`, always negative for locals on the stack.
    LocalStack(i64),
    Const,
}

#[derive(Debug, Clone)]
pub struct FunctionSignature {
    pub params: Vec<TypeDescriptor>,
    pub return_type: TypeDescriptor,
    pub arg_classes: Vec<ArgClass>,
    /// `<namespace>__<name>`, or bare `name` for un-namespaced user code,
    /// or the bare C name for anything imported from `std::`.
    pub linkage_name: String,
    /// `true` for declarations with no body (header prototypes).
    pub is_prototype: bool,
}

#[derive(Debug, Clone)]
pub enum Symbol {
    Variable {
        ty: TypeDescriptor,
        storage: StorageClass,
        mutability: Mutability,
    },
    Function(FunctionSignature),
    Type(TypeDescriptor),
    Macro {
        params: Vec<String>,
        body: Expr,
    },
    /// Points at the child scope introduced by this namespace.
    Namespace(ScopeId),
}

pub type ScopeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Namespace,
    Function,
    Block,
}

#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub symbols: HashMap<String, Symbol>,
}

/// An arena of scopes forming a tree rooted at `GLOBAL`.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

pub const GLOBAL: ScopeId = 0;

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![Scope {
                kind: ScopeKind::Global,
                parent: None,
                symbols: HashMap::new(),
            }],
        }
    }

    pub fn push_scope(&mut self, parent: ScopeId, kind: ScopeKind) -> ScopeId {
        self.scopes.push(Scope {
            kind,
            parent: Some(parent),
            symbols: HashMap::new(),
        });
        self.scopes.len() - 1
    }

    /// Declares `name` in `scope`. Returns `false` (and leaves the table
    /// unchanged) if `name` is already declared directly in `scope` -
    /// callers turn that into diagnostic E041 (duplicate definition).
    pub fn declare(&mut self, scope: ScopeId, name: &str, symbol: Symbol) -> bool {
        if self.scopes[scope].symbols.contains_key(name) {
            return false;
        }
        self.scopes[scope].symbols.insert(name.to_string(), symbol);
        true
    }

    pub fn declared_directly(&self, scope: ScopeId, name: &str) -> bool {
        self.scopes[scope].symbols.contains_key(name)
    }

    /// Looks up `name` starting at `scope` and walking up through parents
    /// (lexical scoping), ignoring namespace child scopes (those are only
    /// reached through an explicit `ns::name` qualifier).
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<&Symbol> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(sym) = self.scopes[id].symbols.get(name) {
                return Some(sym);
            }
            current = self.scopes[id].parent;
        }
        None
    }

    /// Looks up a namespace-qualified name: `ns::name`.
    pub fn lookup_qualified(&self, scope: ScopeId, namespace: &str, name: &str) -> Option<&Symbol> {
        match self.lookup(scope, namespace) {
            Some(Symbol::Namespace(ns_scope)) => self.scopes[*ns_scope].symbols.get(name),
            _ => None,
        }
    }

    pub fn scope_kind(&self, scope: ScopeId) -> ScopeKind {
        self.scopes[scope].kind
    }

    pub fn parent_of(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope].parent
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_declaration_in_same_scope_is_rejected() {
        let mut table = SymbolTable::new();
        let sym = Symbol::Type(TypeDescriptor::Char);
        assert!(table.declare(GLOBAL, "Foo", sym.clone()));
        assert!(!table.declare(GLOBAL, "Foo", sym));
    }

    #[test]
    fn lookup_walks_up_to_parent_scopes() {
        let mut table = SymbolTable::new();
        table.declare(
            GLOBAL,
            "g",
            Symbol::Variable {
                ty: TypeDescriptor::Char,
                storage: StorageClass::Global,
                mutability: Mutability::Let,
            },
        );
        let fn_scope = table.push_scope(GLOBAL, ScopeKind::Function);
        let block_scope = table.push_scope(fn_scope, ScopeKind::Block);
        assert!(table.lookup(block_scope, "g").is_some());
    }

    #[test]
    fn qualified_lookup_requires_namespace_scope() {
        let mut table = SymbolTable::new();
        let ns_scope = table.push_scope(GLOBAL, ScopeKind::Namespace);
        table.declare(
            ns_scope,
            "add",
            Symbol::Function(FunctionSignature {
                params: vec![],
                return_type: TypeDescriptor::Void,
                arg_classes: vec![],
                linkage_name: "math__add".to_string(),
                is_prototype: true,
            }),
        );
        table.declare(GLOBAL, "math", Symbol::Namespace(ns_scope));
        assert!(table.lookup_qualified(GLOBAL, "math", "add").is_some());
        assert!(table.lookup(GLOBAL, "add").is_none());
    }
}
