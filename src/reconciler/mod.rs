//! Tag set reconciliation.
//!
//! Makes an entity's set of active tag assignments equal to a desired set
//! with idempotent add/remove primitives. Each primitive first tries the
//! backend's convenience procedure and falls back to a manual sequence of
//! reads and writes (see [`FallbackPolicy`]).
//!
//! Every store call is issued sequentially. A [`CancellationToken`] is
//! checked before each call; once it fires no further call is made.

mod fast_path;
pub mod listing;
mod report;
mod schema;

pub use fast_path::{FallbackPolicy, FastPath};
pub use report::{BulkReport, SyncReport, TagChange, TagOp, TagOutcome};
pub use schema::TagSchema;

use serde_json::{json, Value};
use std::collections::{BTreeSet, HashSet};
use tokio_util::sync::CancellationToken;

use crate::capability;
use crate::error::StoreError;
use crate::filter::{Direction, Filter, Query};
use crate::model::{self, now_secs, row, EntityWithTags, Row, Tag};
use crate::store::RecordStore;

pub struct RoleReconciler<S> {
    store: S,
    schema: TagSchema,
    policy: FallbackPolicy,
    cancel: CancellationToken,
}

impl<S: RecordStore> RoleReconciler<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            schema: TagSchema::default(),
            policy: FallbackPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_schema(mut self, schema: TagSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Ties every later store call to `token`.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn schema(&self) -> &TagSchema {
        &self.schema
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    // --- Guarded store access ---

    fn live(&self) -> Result<(), StoreError> {
        if self.cancel.is_cancelled() {
            Err(StoreError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn query(&self, table: &str, q: &Query) -> Result<Vec<Row>, StoreError> {
        self.live()?;
        self.store.query(table, q).await
    }

    async fn insert(&self, table: &str, r: Row) -> Result<Row, StoreError> {
        self.live()?;
        self.store.insert(table, r).await
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>, StoreError> {
        self.live()?;
        self.store.update(table, filters, patch).await
    }

    async fn call(&self, name: &str, args: Value) -> Result<Value, StoreError> {
        self.live()?;
        self.store.call_procedure(name, args).await
    }

    fn pair(&self, entity_id: &str, tag_id: &Value) -> Vec<Filter> {
        vec![
            Filter::eq(&self.schema.entity_column, entity_id),
            Filter::eq(&self.schema.tag_column, tag_id.clone()),
        ]
    }

    // --- Primitives ---

    /// Ensures exactly one active assignment of `tag_name` to `entity_id`.
    /// Idempotent: repeated calls report `AlreadyActive` (or the procedure's
    /// success) and never create a duplicate.
    pub async fn add_tag(&self, entity_id: &str, tag_name: &str) -> Result<TagChange, StoreError> {
        if let Some(proc_name) = self.schema.upsert_procedure.as_deref() {
            let reply = self
                .call(proc_name, json!({ "entity_id": entity_id, "tag_name": tag_name }))
                .await;
            match self.policy.classify(proc_name, reply, accept_true) {
                FastPath::Done(()) => return Ok(TagChange::ViaProcedure),
                FastPath::Failed(e) => return Err(e),
                FastPath::Fallback => {}
            }
        }
        self.add_directly(entity_id, tag_name).await
    }

    async fn add_directly(&self, entity_id: &str, tag_name: &str) -> Result<TagChange, StoreError> {
        let s = &self.schema;
        let tag_id = self.resolve_or_create_tag(tag_name).await?;
        let pair = self.pair(entity_id, &tag_id);

        let existing = self
            .query(&s.assignments_table, &Query { filters: pair.clone(), ..Query::default() })
            .await?;

        if existing.iter().any(|r| model::flag(r, &s.active_column)) {
            tracing::debug!(entity = entity_id, tag = tag_name, "tag already assigned");
            return Ok(TagChange::AlreadyActive);
        }
        // Revive only the latest historical row; older ones stay closed.
        if let Some(latest) = existing.iter().max_by_key(|r| model::stamp(r, &s.started_column)) {
            self.reactivate(&[Filter::eq("id", row_id(latest)?)]).await?;
            return Ok(TagChange::Reactivated);
        }

        let now = now_secs();
        let fresh = row([
            (s.entity_column.as_str(), json!(entity_id)),
            (s.tag_column.as_str(), tag_id.clone()),
            (s.active_column.as_str(), json!(true)),
            (s.started_column.as_str(), json!(now)),
            (s.ended_column.as_str(), Value::Null),
            (s.updated_column.as_str(), json!(now)),
        ]);
        match self.insert(&s.assignments_table, fresh).await {
            Ok(_) => Ok(TagChange::Inserted),
            Err(e) if e.is_conflict() => {
                tracing::debug!(entity = entity_id, tag = tag_name, "insert raced another writer, reactivating");
                self.reactivate(&pair).await?;
                Ok(TagChange::ReactivatedAfterConflict)
            }
            Err(e) => Err(e),
        }
    }

    async fn reactivate(&self, filters: &[Filter]) -> Result<(), StoreError> {
        let s = &self.schema;
        let patch = row([
            (s.active_column.as_str(), json!(true)),
            (s.ended_column.as_str(), Value::Null),
            (s.updated_column.as_str(), json!(now_secs())),
        ]);
        self.update(&s.assignments_table, filters, patch).await.map(|_| ())
    }

    /// Id of the active tag called `name`, creating it when missing.
    async fn resolve_or_create_tag(&self, name: &str) -> Result<Value, StoreError> {
        let s = &self.schema;
        let q = Query::new().eq(&s.name_column, name).eq(&s.active_column, true).limit(1);
        if let Some(t) = self.query(&s.tags_table, &q).await?.into_iter().next() {
            return row_id(&t);
        }

        let new_tag = row([(s.name_column.as_str(), json!(name)), (s.active_column.as_str(), json!(true))]);
        match self.insert(&s.tags_table, new_tag).await {
            Ok(t) => {
                tracing::info!(tag = name, "created tag");
                row_id(&t)
            }
            Err(e) if e.is_conflict() => {
                // Created concurrently, or present but deactivated.
                let q = Query::new().eq(&s.name_column, name).limit(1);
                let t = self
                    .query(&s.tags_table, &q)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| StoreError::NotFound(format!("tag '{}'", name)))?;
                let id = row_id(&t)?;
                if !model::flag(&t, &s.active_column) {
                    self.update(
                        &s.tags_table,
                        &[Filter::eq("id", id.clone())],
                        row([(s.active_column.as_str(), json!(true))]),
                    )
                    .await?;
                }
                Ok(id)
            }
            Err(e) => Err(e),
        }
    }

    /// Deactivates any active assignment of `tag_name` to `entity_id`.
    /// Removing something that is not assigned succeeds with `NotAssigned`.
    pub async fn remove_tag(&self, entity_id: &str, tag_name: &str) -> Result<TagChange, StoreError> {
        if let Some(proc_name) = self.schema.deactivate_procedure.as_deref() {
            let reply = self
                .call(proc_name, json!({ "entity_id": entity_id, "tag_name": tag_name }))
                .await;
            match self.policy.classify(proc_name, reply, accept_true) {
                FastPath::Done(()) => return Ok(TagChange::ViaProcedure),
                FastPath::Failed(e) => return Err(e),
                FastPath::Fallback => {}
            }
        }
        self.remove_directly(entity_id, tag_name).await
    }

    async fn remove_directly(&self, entity_id: &str, tag_name: &str) -> Result<TagChange, StoreError> {
        let s = &self.schema;
        let q = Query::new().eq(&s.name_column, tag_name).limit(1);
        let Some(tag) = self.query(&s.tags_table, &q).await?.into_iter().next() else {
            return Ok(TagChange::NotAssigned);
        };

        let mut filters = self.pair(entity_id, &row_id(&tag)?);
        filters.push(Filter::eq(&s.active_column, true));
        let now = now_secs();
        let patch = row([
            (s.active_column.as_str(), json!(false)),
            (s.ended_column.as_str(), json!(now)),
            (s.updated_column.as_str(), json!(now)),
        ]);

        match self.update(&s.assignments_table, &filters, patch).await {
            Ok(_) => Ok(TagChange::Deactivated),
            Err(e) if e.is_not_found() => Ok(TagChange::NotAssigned),
            Err(e) => Err(e),
        }
    }

    // --- Reads ---

    /// Names of the tags currently assigned to `entity_id`.
    pub async fn active_tags(&self, entity_id: &str) -> Result<BTreeSet<String>, StoreError> {
        let s = &self.schema;
        let q = Query::new().eq(&s.entity_column, entity_id).eq(&s.active_column, true);
        let tag_ids: Vec<Value> = self
            .query(&s.assignments_table, &q)
            .await?
            .iter()
            .filter_map(|r| r.get(&s.tag_column).cloned())
            .collect();

        if tag_ids.is_empty() {
            return Ok(BTreeSet::new());
        }

        let q = Query::new().filter(Filter::In("id".into(), tag_ids));
        Ok(self
            .query(&s.tags_table, &q)
            .await?
            .iter()
            .filter_map(|t| model::text(t, &s.name_column))
            .collect())
    }

    /// Active tags ordered by name.
    pub async fn available_tags(&self) -> Result<Vec<Tag>, StoreError> {
        let s = &self.schema;
        let q = Query::new().eq(&s.active_column, true).order_by(&s.name_column, Direction::Asc);
        self.query(&s.tags_table, &q)
            .await?
            .iter()
            .map(|r| Tag::from_row(r, &s.name_column, &s.active_column))
            .collect()
    }

    /// Active entities with their tag names, de-duplicated by id.
    pub async fn entities_with_tags(&self) -> Result<Vec<EntityWithTags>, StoreError> {
        let s = &self.schema;
        if let Some(proc_name) = s.listing_procedure.as_deref() {
            let reply = self.call(proc_name, json!({})).await;
            let accept = |v: Value| serde_json::from_value::<Vec<EntityWithTags>>(v).ok();
            match self.policy.classify(proc_name, reply, accept) {
                FastPath::Done(list) => return Ok(dedupe(list)),
                FastPath::Failed(e) => return Err(e),
                FastPath::Fallback => {}
            }
        }

        let entities = self
            .query(&s.entities_table, &Query::new().eq(&s.active_column, true))
            .await?;
        let assignments = self
            .query(&s.assignments_table, &Query::new().eq(&s.active_column, true))
            .await?;
        let tags = self.query(&s.tags_table, &Query::new()).await?;
        Ok(listing::assemble(s, &entities, &assignments, &tags))
    }

    // --- Reconciliation ---

    /// Adds `desired − current` and removes `current − desired`, in set
    /// order, one call at a time. A failing item is logged and recorded in
    /// the report; it never stops the remaining items. Only the initial read
    /// of the current set can fail the whole call.
    #[tracing::instrument(level = "debug", skip(self, desired), fields(desired = desired.len()))]
    pub async fn sync_tags(&self, entity_id: &str, desired: &BTreeSet<String>) -> Result<SyncReport, StoreError> {
        let current = self.active_tags(entity_id).await?;
        let mut report = SyncReport { entity_id: entity_id.to_string(), outcomes: Vec::new() };

        for tag in desired.difference(&current) {
            let result = self.add_tag(entity_id, tag).await;
            report.outcomes.push(TagOutcome::record(entity_id, tag, TagOp::Add, result));
        }
        for tag in current.difference(desired) {
            let result = self.remove_tag(entity_id, tag).await;
            report.outcomes.push(TagOutcome::record(entity_id, tag, TagOp::Remove, result));
        }

        tracing::info!(entity = entity_id, "{}", report.summary());
        Ok(report)
    }

    /// `sync_tags` for each entity in turn.
    pub async fn sync_many(&self, entity_ids: &[String], desired: &BTreeSet<String>) -> Vec<Result<SyncReport, StoreError>> {
        let mut out = Vec::with_capacity(entity_ids.len());
        for id in entity_ids {
            let res = self.sync_tags(id, desired).await;
            if let Err(e) = &res {
                tracing::warn!(entity = %id, error = %e, "tag sync failed");
            }
            out.push(res);
        }
        out
    }

    /// Adds every tag in `add` and removes every tag in `remove` on each
    /// entity: one primitive call per (entity, tag) pair, no batching.
    pub async fn apply_bulk(&self, entity_ids: &[String], add: &[String], remove: &[String]) -> BulkReport {
        capability::fan_out(self, entity_ids, add, remove).await
    }
}

fn accept_true(v: Value) -> Option<()> {
    (v == Value::Bool(true)).then_some(())
}

fn row_id(r: &Row) -> Result<Value, StoreError> {
    r.get("id")
        .filter(|v| !v.is_null())
        .cloned()
        .ok_or_else(|| StoreError::rejected("decode", "row has no id"))
}

fn dedupe(list: Vec<EntityWithTags>) -> Vec<EntityWithTags> {
    let mut seen = HashSet::new();
    list.into_iter().filter(|e| seen.insert(e.id.clone())).collect()
}
