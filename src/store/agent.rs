//! Per-scope registry of resident stores
//!
//! The agent process holds one [`AgentRegistry`] and passes it to whatever
//! needs a resident store. A store is built the first time its scope is
//! requested; the lock makes that construction happen exactly once even with
//! concurrent callers.

use super::MemoryStore;
use crate::models::Scope;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
pub struct AgentRegistry {
    stores: Mutex<HashMap<Scope, Arc<MemoryStore>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resident store for `scope`, created on first use
    pub fn store(&self, scope: &Scope) -> Arc<MemoryStore> {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = stores.get(scope) {
            return Arc::clone(store);
        }
        tracing::debug!(scope = %scope, "creating resident store");
        let store = Arc::new(MemoryStore::new());
        stores.insert(scope.clone(), Arc::clone(&store));
        store
    }

    /// Scopes that currently have a resident store
    pub fn scopes(&self) -> Vec<Scope> {
        let stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        let mut scopes: Vec<Scope> = stores.keys().cloned().collect();
        scopes.sort();
        scopes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entry, Service};
    use crate::store::StageStore;
    use std::thread;

    #[test]
    fn test_same_scope_shares_store() {
        let registry = AgentRegistry::new();
        let scope = Scope::new("123456789012", "us-east-1");

        let a = registry.store(&scope);
        a.stage_entry(Service::Parameter, "/app/a", Entry::create("v"))
            .unwrap();

        let b = registry.store(&scope);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(b.get_entry(Service::Parameter, "/app/a").is_ok());
    }

    #[test]
    fn test_scopes_are_isolated() {
        let registry = AgentRegistry::new();
        let east = registry.store(&Scope::new("1", "us-east-1"));
        let west = registry.store(&Scope::new("1", "us-west-2"));

        east.stage_entry(Service::Secret, "token", Entry::create("v"))
            .unwrap();
        assert!(west.get_entry(Service::Secret, "token").is_err());
        assert_eq!(registry.scopes().len(), 2);
    }

    #[test]
    fn test_concurrent_first_access_builds_one_store() {
        let registry = Arc::new(AgentRegistry::new());
        let scope = Scope::new("1", "eu-west-1");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let scope = scope.clone();
                thread::spawn(move || registry.store(&scope))
            })
            .collect();
        let stores: Vec<Arc<MemoryStore>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        for store in &stores[1..] {
            assert!(Arc::ptr_eq(&stores[0], store));
        }
    }
}
