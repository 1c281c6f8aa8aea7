use std::fmt;

use crate::error::StoreError;

/// How an add or remove primitive converged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagChange {
    /// The server-side procedure did the work
    ViaProcedure,
    AlreadyActive,
    Reactivated,
    Inserted,
    /// The insert lost a race and the concurrent row was reactivated
    ReactivatedAfterConflict,
    Deactivated,
    /// Nothing active to remove
    NotAssigned,
}

impl TagChange {
    /// Whether the primitive wrote anything.
    pub fn wrote(self) -> bool {
        !matches!(self, TagChange::AlreadyActive | TagChange::NotAssigned)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOp {
    Add,
    Remove,
}

impl fmt::Display for TagOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagOp::Add => write!(f, "add"),
            TagOp::Remove => write!(f, "remove"),
        }
    }
}

/// One primitive call inside a sync or bulk edit.
#[derive(Debug, Clone, PartialEq)]
pub struct TagOutcome {
    pub entity_id: String,
    pub tag: String,
    pub op: TagOp,
    pub result: Result<TagChange, StoreError>,
}

impl TagOutcome {
    /// Builds the outcome, logging a failure at warn level.
    pub fn record(entity_id: &str, tag: &str, op: TagOp, result: Result<TagChange, StoreError>) -> Self {
        if let Err(e) = &result {
            tracing::warn!(entity = entity_id, tag, %op, error = %e, "tag change failed");
        }
        Self { entity_id: entity_id.to_string(), tag: tag.to_string(), op, result }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-item result of reconciling one entity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncReport {
    pub entity_id: String,
    pub outcomes: Vec<TagOutcome>,
}

impl SyncReport {
    pub fn attempted_adds(&self) -> usize {
        self.outcomes.iter().filter(|o| o.op == TagOp::Add).count()
    }

    pub fn attempted_removes(&self) -> usize {
        self.outcomes.iter().filter(|o| o.op == TagOp::Remove).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TagOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }

    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(TagOutcome::is_ok)
    }

    pub fn summary(&self) -> String {
        let failed = self.failures().count();
        let mut msg = format!(
            "Synchronized {} additions and {} removals",
            self.attempted_adds(),
            self.attempted_removes()
        );
        if failed > 0 {
            msg.push_str(&format!(" ({} failed)", failed));
        }
        msg
    }
}

/// Result of a bulk add/remove fan-out over many entities.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BulkReport {
    pub outcomes: Vec<TagOutcome>,
}

impl BulkReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn summary(&self) -> String {
        format!("{} of {} tag changes applied", self.succeeded(), self.outcomes.len())
    }
}
