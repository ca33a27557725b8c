//! Shared generic-type registry.
//!
//! One registry instance is shared by every worker of the parallel driver
//! (wrapped in an `Arc`); a single internal mutex serialises register,
//! lookup and instantiate. Registration is idempotent and never loses
//! information: a later registration with `None` parameters or body does
//! not clobber an earlier `Some`, so the cheap textual pre-scan and the
//! full parser can both feed the same record in either order.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::ast::ClassDecl;
use crate::semantic::{SymbolInfo, SymbolKind, SymbolTable};

/// One registered generic type.
#[derive(Debug, Clone, Default)]
pub struct GenericType {
    pub name: String,
    pub params: Option<Vec<String>>,
    pub body: Option<ClassDecl>,
    /// Mangled names instantiated so far, e.g. `List<int32>`.
    pub specializations: Vec<String>,
}

impl GenericType {
    pub fn param_count(&self) -> usize {
        self.params.as_ref().map_or(0, Vec::len)
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    types: HashMap<String, GenericType>,
}

/// Mutex-guarded registry of parameterised type declarations.
#[derive(Debug, Default)]
pub struct GenericRegistry {
    inner: Mutex<RegistryInner>,
}

impl GenericRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or refresh a generic type. Existing `Some` fields are
    /// never replaced by `None`, and a body, once present, is permanent.
    pub fn register(
        &self,
        name: &str,
        params: Option<Vec<String>>,
        body: Option<ClassDecl>,
    ) -> bool {
        if name.is_empty() {
            return false;
        }
        let mut inner = self.inner.lock().expect("generic registry lock");
        let entry = inner.types.entry(name.to_string()).or_insert_with(|| {
            debug!(target: "front.generics", name, "generic registered");
            GenericType {
                name: name.to_string(),
                ..GenericType::default()
            }
        });
        if entry.params.is_none()
            && let Some(params) = params
        {
            entry.params = Some(params);
        }
        if entry.body.is_none()
            && let Some(body) = body
        {
            entry.body = Some(body);
        }
        true
    }

    /// Snapshot of the current record.
    pub fn lookup(&self, name: &str) -> Option<GenericType> {
        self.inner
            .lock()
            .expect("generic registry lock")
            .types
            .get(name)
            .cloned()
    }

    pub fn is_generic(&self, name: &str) -> bool {
        self.inner
            .lock()
            .expect("generic registry lock")
            .types
            .contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("generic registry lock").types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Arity check for an instantiation.
    pub fn validate(&self, name: &str, arg_count: usize) -> bool {
        self.lookup(name)
            .is_some_and(|generic| generic.param_count() == arg_count)
    }

    /// Mangled instantiation name: `Name<A1,A2,...>`.
    pub fn mangle(name: &str, args: &[String]) -> String {
        format!("{}<{}>", name, args.join(","))
    }

    /// Instantiate `name` with `args`, recording the specialisation in
    /// the registry and defining the mangled type symbol in the target
    /// table. Instantiating an already-present specialisation succeeds as
    /// a no-op.
    pub fn instantiate(
        &self,
        name: &str,
        args: &[String],
        target: &mut SymbolTable,
    ) -> bool {
        let mut inner = self.inner.lock().expect("generic registry lock");
        let Some(entry) = inner.types.get_mut(name) else {
            return false;
        };
        if entry.param_count() != args.len() {
            return false;
        }
        let mangled = Self::mangle(name, args);
        if target.lookup(&mangled).is_some() {
            return true;
        }
        if !entry.specializations.contains(&mangled) {
            entry.specializations.push(mangled.clone());
        }
        target.define(SymbolInfo {
            name: mangled,
            kind: SymbolKind::Type,
            type_name: None,
            line: 0,
            col: 0,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent_and_never_clobbers() {
        let registry = GenericRegistry::new();
        assert!(registry.register("List", Some(vec!["T".into()]), None));
        // Re-registering with no parameters keeps the original arity.
        assert!(registry.register("List", None, None));
        assert_eq!(registry.len(), 1);
        let entry = registry.lookup("List").unwrap();
        assert_eq!(entry.params.as_deref(), Some(&["T".to_string()][..]));
    }

    #[test]
    fn validate_checks_arity() {
        let registry = GenericRegistry::new();
        registry.register("Map", Some(vec!["K".into(), "V".into()]), None);
        assert!(registry.validate("Map", 2));
        assert!(!registry.validate("Map", 1));
        assert!(!registry.validate("Missing", 0));
    }

    #[test]
    fn instantiate_defines_mangled_symbol_once() {
        let registry = GenericRegistry::new();
        registry.register("List", Some(vec!["T".into()]), None);
        let mut table = SymbolTable::new();

        assert!(registry.instantiate("List", &["int32".into()], &mut table));
        assert!(table.lookup("List<int32>").is_some());
        // Second instantiation is a successful no-op.
        assert!(registry.instantiate("List", &["int32".into()], &mut table));
        let entry = registry.lookup("List").unwrap();
        assert_eq!(entry.specializations, vec!["List<int32>"]);
    }

    #[test]
    fn instantiate_rejects_wrong_arity() {
        let registry = GenericRegistry::new();
        registry.register("List", Some(vec!["T".into()]), None);
        let mut table = SymbolTable::new();
        assert!(!registry.instantiate("List", &["a".into(), "b".into()], &mut table));
    }
}
