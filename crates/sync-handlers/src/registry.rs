//! The Handler Registry: `table -> TableHandler`, one handler per table.
//!
//! Fail-closed on duplicate registration rather than silently overwriting:
//! don't trust an implicit prior state, require an explicit, checkable
//! action.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::contract::TableHandler;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("a handler is already registered for table {0:?}")]
    DuplicateTable(String),
}

/// Maps table name to its handler. Generic over the same `Tx` the
/// [`TableHandler`] trait is generic over.
pub struct HandlerRegistry<Tx> {
    handlers: BTreeMap<String, Arc<dyn TableHandler<Tx>>>,
}

impl<Tx> Default for HandlerRegistry<Tx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Tx> HandlerRegistry<Tx> {
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Register a handler. Errors if a handler for this table already
    /// exists — there is no silent-overwrite path.
    pub fn register(&mut self, handler: Arc<dyn TableHandler<Tx>>) -> Result<(), RegistryError> {
        let table = handler.table().to_string();
        if self.handlers.contains_key(&table) {
            return Err(RegistryError::DuplicateTable(table));
        }
        self.handlers.insert(table, handler);
        Ok(())
    }

    pub fn get(&self, table: &str) -> Option<&Arc<dyn TableHandler<Tx>>> {
        self.handlers.get(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.handlers.contains_key(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{
        ApplyContext, ApplyOutcome, ApplyResult, HandlerError, SnapshotContext, SnapshotPage,
    };
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::BTreeMap;
    use sync_wire::Operation;

    struct NoopHandler(&'static str);

    #[async_trait]
    impl TableHandler<()> for NoopHandler {
        fn table(&self) -> &str {
            self.0
        }
        fn scope_patterns(&self) -> &[sync_scope::Pattern] {
            &[]
        }
        fn resolve_scopes(
            &self,
            _actor_id: &str,
            _partition: &str,
            _params: Option<&Value>,
        ) -> BTreeMap<String, sync_wire::ScopeValue> {
            BTreeMap::new()
        }
        fn extract_scopes(&self, _row: &Value) -> BTreeMap<String, String> {
            BTreeMap::new()
        }
        async fn snapshot(&self, _ctx: &SnapshotContext) -> Result<SnapshotPage, HandlerError> {
            Ok(SnapshotPage {
                rows: vec![],
                next_cursor: None,
            })
        }
        async fn apply_operation(
            &self,
            _tx: &mut (),
            _ctx: &ApplyContext,
            _operation: &Operation,
            _op_index: usize,
        ) -> Result<ApplyOutcome, HandlerError> {
            Ok(ApplyOutcome {
                result: ApplyResult::Applied,
                emitted_changes: vec![],
            })
        }
    }

    #[test]
    fn duplicate_table_registration_is_rejected() {
        let mut registry: HandlerRegistry<()> = HandlerRegistry::new();
        registry.register(Arc::new(NoopHandler("tasks"))).unwrap();
        let err = registry.register(Arc::new(NoopHandler("tasks"))).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTable("tasks".to_string()));
    }

    #[test]
    fn distinct_tables_both_register() {
        let mut registry: HandlerRegistry<()> = HandlerRegistry::new();
        registry.register(Arc::new(NoopHandler("tasks"))).unwrap();
        registry.register(Arc::new(NoopHandler("codes"))).unwrap();
        assert!(registry.contains("tasks"));
        assert!(registry.contains("codes"));
    }
}
