use std::collections::VecDeque;

use fnv::FnvHashMap;

use crate::common::{DiagnosticKind, Diagnostics, Location};
use crate::type_check::Type;

pub type ScopeId = usize;

/// Everything analysis tracks about one declared identifier. The flags are
/// flipped by initialize/use and read back by the unused-symbol sweep.
#[derive(Debug)]
pub struct Symbol {
    pub ty: Type,
    pub declared_at: Location,
    pub initialized: bool,
    pub used: bool,
}

#[derive(Debug)]
pub struct ScopeNode {
    pub id: ScopeId,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    pub symbols: FnvHashMap<String, Symbol>,
}

/// Tree of lexical scopes backed by an arena; the cursor is a stack of
/// arena indices, so there are no owning parent pointers anywhere. Scope
/// ids are assigned in the order scopes are entered, starting at 0.
#[derive(Debug, Default)]
pub struct ScopeTree {
    nodes: Vec<ScopeNode>,
    cursor: Vec<ScopeId>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            cursor: Vec::new(),
        }
    }

    /// Opens a new child scope under the current one (or the root, if this
    /// is the first) and makes it current.
    pub fn enter_scope(&mut self) -> ScopeId {
        let id = self.nodes.len();
        let parent = self.cursor.last().copied();
        self.nodes.push(ScopeNode {
            id,
            parent,
            children: Vec::new(),
            symbols: FnvHashMap::default(),
        });
        if let Some(parent) = parent {
            self.nodes[parent].children.push(id);
        }
        self.cursor.push(id);
        id
    }

    pub fn exit_scope(&mut self) {
        self.cursor.pop();
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: ScopeId) -> &ScopeNode {
        &self.nodes[id]
    }

    fn current(&self) -> Option<ScopeId> {
        self.cursor.last().copied()
    }

    // walk from the current scope up through its ancestors
    fn resolve(&self, name: &str) -> Option<ScopeId> {
        let mut next = self.current();
        while let Some(id) = next {
            if self.nodes[id].symbols.contains_key(name) {
                return Some(id);
            }
            next = self.nodes[id].parent;
        }
        None
    }

    /// Declares `name` in the current scope. Shadowing an enclosing scope
    /// is fine; a second declaration in the same scope is not.
    pub fn declare_id(
        &mut self,
        name: &str,
        ty: Type,
        loc: Location,
        diagnostics: &mut Diagnostics,
    ) -> Option<ScopeId> {
        let current = self.current()?;
        if self.nodes[current].symbols.contains_key(name) {
            diagnostics.report(DiagnosticKind::AlreadyDeclared(name.to_string()), loc);
            return None;
        }
        #[cfg(feature = "debug-logging")]
        eprintln!("scope: declaring {} in scope {} as {}", name, current, ty);
        self.nodes[current].symbols.insert(
            name.to_string(),
            Symbol {
                ty,
                declared_at: loc,
                initialized: false,
                used: false,
            },
        );
        Some(current)
    }

    /// Marks `name` initialized if it resolves and the assigned type agrees
    /// with the declaration; returns the owning scope id on success.
    pub fn initialize_id(
        &mut self,
        name: &str,
        assigned: Type,
        loc: Location,
        diagnostics: &mut Diagnostics,
    ) -> Option<ScopeId> {
        let owner = match self.resolve(name) {
            Some(owner) => owner,
            None => {
                diagnostics.report(DiagnosticKind::Undeclared(name.to_string()), loc);
                return None;
            }
        };
        let symbol = self.nodes[owner].symbols.get_mut(name)?;
        if symbol.ty != assigned {
            diagnostics.report(
                DiagnosticKind::TypeMismatch {
                    name: name.to_string(),
                    declared: symbol.ty,
                    assigned,
                },
                loc,
            );
            return None;
        }
        symbol.initialized = true;
        Some(owner)
    }

    /// Resolves a read of `name`: warns on an uninitialized read but still
    /// marks the symbol used, and answers Unknown for an undeclared one so
    /// the caller can keep checking.
    pub fn use_id(
        &mut self,
        name: &str,
        loc: Location,
        diagnostics: &mut Diagnostics,
    ) -> (Type, Option<ScopeId>) {
        let owner = match self.resolve(name) {
            Some(owner) => owner,
            None => {
                diagnostics.report(DiagnosticKind::Undeclared(name.to_string()), loc);
                return (Type::Unknown, None);
            }
        };
        match self.nodes[owner].symbols.get_mut(name) {
            Some(symbol) => {
                if !symbol.initialized {
                    diagnostics.report(DiagnosticKind::UsedBeforeInitialized(name.to_string()), loc);
                }
                symbol.used = true;
                (symbol.ty, Some(owner))
            }
            None => (Type::Unknown, None),
        }
    }

    /// Level-order sweep over the whole tree after analysis; one warning
    /// per symbol that was never read.
    pub fn collect_warnings(&self, diagnostics: &mut Diagnostics) {
        if self.nodes.is_empty() {
            return;
        }
        let mut queue = VecDeque::new();
        queue.push_back(0);
        while let Some(id) = queue.pop_front() {
            let node = &self.nodes[id];
            for (name, symbol) in node.symbols.iter() {
                if !symbol.used {
                    let kind = if symbol.initialized {
                        DiagnosticKind::UnusedSymbol(name.clone())
                    } else {
                        DiagnosticKind::UnusedUninitialized(name.clone())
                    };
                    diagnostics.report(kind, symbol.declared_at);
                }
            }
            queue.extend(node.children.iter().copied());
        }
    }
}
