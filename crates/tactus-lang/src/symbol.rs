//! Lexical scopes, symbols, and the struct-type registry.
//!
//! Scopes form a stack with the global scope at index 0. A scope is pushed
//! for every block and for every function call; symbols die with their scope,
//! while shared container values survive through reference counting.
//!
//! Function calls additionally bracket the scope stack with
//! [`SymbolTable::push_function_stack`] so that a nonlocal return can restore
//! the caller's scope depth, and so that shadowing across a call boundary can
//! be flagged separately from ordinary block shadowing.

use std::rc::Rc;

use crate::ast::MemberDecl;
use crate::error::MincError;
use crate::value::{MincType, MincValue, StructInstance, StructMember};

/// Where a lookup searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    /// Current scope only.
    ThisLevel,
    /// Global scope only.
    GlobalLevel,
    /// Innermost scope outward to global.
    AnyLevel,
}

/// A name bound to a typed value within one scope.
#[derive(Debug)]
pub struct Symbol {
    /// The bound name.
    pub name: Rc<str>,
    /// Declared type. Updated on type-overwriting stores.
    pub ty: MincType,
    /// Current value.
    pub value: MincValue,
}

/// Stable reference to a symbol: scope index plus slot within the scope.
///
/// Valid only while the referenced scope is still on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolId {
    scope: usize,
    slot: usize,
}

impl SymbolId {
    /// Index of the owning scope (0 = global).
    pub fn scope(self) -> usize {
        self.scope
    }
}

/// A registered struct type: ordered member declarations.
#[derive(Debug)]
pub struct StructType {
    /// Type name.
    pub name: Rc<str>,
    /// Members in declaration order.
    pub members: Vec<MemberDecl>,
}

impl StructType {
    /// Builds an instance with every member at its type's zero value.
    pub fn instantiate(&self) -> StructInstance {
        StructInstance {
            type_name: Rc::clone(&self.name),
            members: self
                .members
                .iter()
                .map(|m| StructMember {
                    name: Rc::from(m.name.as_str()),
                    ty: m.ty,
                    value: m.ty.zero_value(),
                })
                .collect(),
        }
    }
}

/// Encodes a method as a global function symbol name.
///
/// The `$` prefix is reserved — score identifiers cannot contain it — so the
/// mangled name can never collide with a user symbol.
pub fn mangled_method_name(type_name: &str, method: &str) -> String {
    format!("${type_name}.{method}")
}

#[derive(Debug, Default)]
struct Scope {
    symbols: Vec<Symbol>,
}

impl Scope {
    /// Newest binding wins, so shadowing within one scope behaves like a
    /// fresh declaration.
    fn find(&self, name: &str) -> Option<usize> {
        self.symbols.iter().rposition(|s| &*s.name == name)
    }
}

/// The scope stack plus the global struct-type registry.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    struct_types: Vec<StructType>,
    /// Scope depth recorded at each active function-call entry.
    call_boundaries: Vec<usize>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// Creates a table with only the global scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
            struct_types: Vec::new(),
            call_boundaries: Vec::new(),
        }
    }

    /// Index of the innermost scope.
    pub fn current_scope(&self) -> usize {
        self.scopes.len() - 1
    }

    /// Pushes a fresh scope.
    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Pops the innermost scope. The global scope is never popped.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Truncates the stack back to `depth` (as returned by
    /// [`current_scope`](Self::current_scope)). Used when a call unwinds,
    /// normally or through a nonlocal return.
    pub fn restore_scope(&mut self, depth: usize) {
        self.scopes.truncate(depth + 1);
    }

    /// Marks a function-call entry at the current depth.
    pub fn push_function_stack(&mut self) {
        self.call_boundaries.push(self.current_scope());
    }

    /// Clears the innermost function-call bracket.
    pub fn pop_function_stack(&mut self) {
        self.call_boundaries.pop();
    }

    /// True when at least one function call is active.
    pub fn inside_function(&self) -> bool {
        !self.call_boundaries.is_empty()
    }

    /// Looks up `name` according to `mode`.
    pub fn lookup(&self, name: &str, mode: LookupMode) -> Option<SymbolId> {
        match mode {
            LookupMode::ThisLevel => {
                let scope = self.current_scope();
                self.scopes[scope]
                    .find(name)
                    .map(|slot| SymbolId { scope, slot })
            }
            LookupMode::GlobalLevel => self.scopes[0]
                .find(name)
                .map(|slot| SymbolId { scope: 0, slot }),
            LookupMode::AnyLevel => {
                for scope in (0..self.scopes.len()).rev() {
                    if let Some(slot) = self.scopes[scope].find(name) {
                        return Some(SymbolId { scope, slot });
                    }
                }
                None
            }
        }
    }

    /// Creates a symbol at the current scope (or globally). Shadowing is
    /// permitted; shadowing a symbol that lives outside the innermost call
    /// boundary is flagged, since it usually means a score meant to reuse a
    /// global.
    pub fn install(
        &mut self,
        name: &str,
        ty: MincType,
        value: MincValue,
        global: bool,
    ) -> SymbolId {
        let scope = if global { 0 } else { self.current_scope() };
        if !global
            && let Some(existing) = self.lookup(name, LookupMode::AnyLevel)
            && let Some(&boundary) = self.call_boundaries.last()
            && existing.scope() <= boundary
        {
            tracing::warn!(symbol = name, "declaration shadows a symbol outside this call");
        }
        let slot = self.scopes[scope].symbols.len();
        self.scopes[scope].symbols.push(Symbol {
            name: Rc::from(name),
            ty,
            value,
        });
        SymbolId { scope, slot }
    }

    /// Finds `name` anywhere, or declares it void in the current scope.
    ///
    /// `inside_called_function` only affects diagnostics: autodeclaration in
    /// a callee body is the normal way scores bind locals, so it logs at
    /// debug rather than info level.
    pub fn lookup_or_autodeclare(&mut self, name: &str, inside_called_function: bool) -> SymbolId {
        if let Some(id) = self.lookup(name, LookupMode::AnyLevel) {
            return id;
        }
        if inside_called_function {
            tracing::debug!(symbol = name, "autodeclaring local");
        } else {
            tracing::debug!(symbol = name, "autodeclaring at global scope");
        }
        let scope = self.current_scope();
        let slot = self.scopes[scope].symbols.len();
        self.scopes[scope].symbols.push(Symbol {
            name: Rc::from(name),
            ty: MincType::Void,
            value: MincValue::Void,
        });
        SymbolId { scope, slot }
    }

    /// Immutable access to a symbol.
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.scopes[id.scope].symbols[id.slot]
    }

    /// Mutable access to a symbol.
    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.scopes[id.scope].symbols[id.slot]
    }

    // --- Struct types ---

    /// Registers a struct type. The registry is global; redefinition is an
    /// error.
    pub fn install_struct_type(
        &mut self,
        name: &str,
        members: Vec<MemberDecl>,
    ) -> Result<(), MincError> {
        if self.lookup_struct_type(name).is_some() {
            return Err(MincError::StructTypeRedefined(name.to_string()));
        }
        self.struct_types.push(StructType {
            name: Rc::from(name),
            members,
        });
        Ok(())
    }

    /// Looks up a registered struct type.
    pub fn lookup_struct_type(&self, name: &str) -> Option<&StructType> {
        self.struct_types.iter().find(|t| &*t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_modes() {
        let mut table = SymbolTable::new();
        table.install("g", MincType::Float, MincValue::Float(1.0), false);
        table.push_scope();
        table.install("x", MincType::Float, MincValue::Float(2.0), false);

        assert!(table.lookup("g", LookupMode::ThisLevel).is_none());
        assert!(table.lookup("g", LookupMode::GlobalLevel).is_some());
        assert!(table.lookup("g", LookupMode::AnyLevel).is_some());
        assert!(table.lookup("x", LookupMode::ThisLevel).is_some());
        assert!(table.lookup("x", LookupMode::GlobalLevel).is_none());
    }

    #[test]
    fn test_inner_scope_shadows() {
        let mut table = SymbolTable::new();
        table.install("x", MincType::Float, MincValue::Float(1.0), false);
        table.push_scope();
        table.install("x", MincType::String, MincValue::from("inner"), false);

        let id = table.lookup("x", LookupMode::AnyLevel).unwrap();
        assert_eq!(table.symbol(id).ty, MincType::String);

        table.pop_scope();
        let id = table.lookup("x", LookupMode::AnyLevel).unwrap();
        assert_eq!(table.symbol(id).ty, MincType::Float);
    }

    #[test]
    fn test_global_install_from_inner_scope() {
        let mut table = SymbolTable::new();
        table.push_scope();
        let id = table.install("f", MincType::Function, MincValue::Void, true);
        assert_eq!(id.scope(), 0);
        table.pop_scope();
        assert!(table.lookup("f", LookupMode::GlobalLevel).is_some());
    }

    #[test]
    fn test_restore_scope_unwinds_nested_scopes() {
        let mut table = SymbolTable::new();
        let depth = table.current_scope();
        table.push_scope();
        table.push_scope();
        table.install("tmp", MincType::Float, MincValue::Float(0.0), false);
        table.restore_scope(depth);
        assert_eq!(table.current_scope(), depth);
        assert!(table.lookup("tmp", LookupMode::AnyLevel).is_none());
    }

    #[test]
    fn test_autodeclare_is_void_typed() {
        let mut table = SymbolTable::new();
        let id = table.lookup_or_autodeclare("fresh", false);
        assert_eq!(table.symbol(id).ty, MincType::Void);
        // Second lookup finds the same symbol rather than redeclaring.
        let again = table.lookup_or_autodeclare("fresh", false);
        assert_eq!(id, again);
    }

    #[test]
    fn test_struct_type_registry() {
        let mut table = SymbolTable::new();
        let members = vec![
            MemberDecl::new("x", MincType::Float),
            MemberDecl::new("label", MincType::String),
        ];
        table.install_struct_type("Point", members).unwrap();

        let ty = table.lookup_struct_type("Point").unwrap();
        let instance = ty.instantiate();
        assert_eq!(instance.members.len(), 2);
        assert_eq!(
            instance.member("x").unwrap().value.try_eq(&0.0.into()),
            Some(true)
        );

        let err = table.install_struct_type("Point", Vec::new()).unwrap_err();
        assert!(matches!(err, MincError::StructTypeRedefined(_)));
    }

    #[test]
    fn test_mangled_method_names_are_reserved() {
        let name = mangled_method_name("Point", "get");
        assert_eq!(name, "$Point.get");
        // A user identifier can never start with '$'.
        assert!(name.starts_with('$'));
    }
}
