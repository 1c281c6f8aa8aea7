use serde_json::Value;

use crate::error::StoreError;
use crate::filter::{Filter, Query};
use crate::model::Row;

/// The hosted relational backend, seen as a generic request/response
/// collaborator.
///
/// Implementations must keep `StoreError::UnsupportedProcedure` distinct
/// from every other procedure failure: the reconciler's fallback path keys
/// off it.
#[allow(async_fn_in_trait)]
pub trait RecordStore {
    async fn query(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError>;

    /// Inserts one row and returns it as stored (with its generated id).
    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError>;

    /// Patches every row matching `filters`; `NotFound` when nothing matched.
    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>, StoreError>;

    async fn call_procedure(&self, name: &str, args: Value) -> Result<Value, StoreError>;
}

impl<S: RecordStore + ?Sized> RecordStore for &S {
    async fn query(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
        (**self).query(table, query).await
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError> {
        (**self).insert(table, row).await
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>, StoreError> {
        (**self).update(table, filters, patch).await
    }

    async fn call_procedure(&self, name: &str, args: Value) -> Result<Value, StoreError> {
        (**self).call_procedure(name, args).await
    }
}

impl<S: RecordStore + ?Sized> RecordStore for std::sync::Arc<S> {
    async fn query(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
        (**self).query(table, query).await
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError> {
        (**self).insert(table, row).await
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>, StoreError> {
        (**self).update(table, filters, patch).await
    }

    async fn call_procedure(&self, name: &str, args: Value) -> Result<Value, StoreError> {
        (**self).call_procedure(name, args).await
    }
}
