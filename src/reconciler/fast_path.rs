use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

/// When the manual multi-step path may stand in for a failed procedure call.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Only a missing procedure triggers the fallback; any other procedure
    /// failure is returned to the caller.
    #[default]
    OnUnsupported,
    /// Every procedure failure, including unexpected replies, falls back.
    OnAnyError,
}

/// Result of the first stage of a two-stage operation.
#[derive(Debug)]
pub enum FastPath<T> {
    Done(T),
    Fallback,
    Failed(StoreError),
}

impl FallbackPolicy {
    /// Classifies a procedure reply. `accept` turns an acceptable reply into
    /// the final value; `None` marks the reply as unexpected.
    pub fn classify<T>(
        self,
        procedure: &str,
        reply: Result<Value, StoreError>,
        accept: impl FnOnce(Value) -> Option<T>,
    ) -> FastPath<T> {
        let err = match reply {
            Ok(v) => match accept(v) {
                Some(done) => return FastPath::Done(done),
                None => StoreError::rejected("unexpected_reply", format!("unexpected reply from '{}'", procedure)),
            },
            Err(e) => e,
        };

        match (self, &err) {
            (_, StoreError::UnsupportedProcedure(_)) => {
                tracing::debug!(procedure, "procedure unavailable, using direct path");
                FastPath::Fallback
            }
            (_, StoreError::Cancelled) => FastPath::Failed(err),
            (FallbackPolicy::OnAnyError, _) => {
                tracing::warn!(procedure, error = %err, "procedure failed, using direct path");
                FastPath::Fallback
            }
            (FallbackPolicy::OnUnsupported, _) => FastPath::Failed(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn is_true(v: Value) -> Option<()> {
        (v == Value::Bool(true)).then_some(())
    }

    #[test]
    fn unsupported_always_falls_back() {
        for policy in [FallbackPolicy::OnUnsupported, FallbackPolicy::OnAnyError] {
            let r = policy.classify("p", Err(StoreError::UnsupportedProcedure("p".into())), is_true);
            assert!(matches!(r, FastPath::Fallback));
        }
    }

    #[test]
    fn other_errors_depend_on_policy() {
        let transient = || Err(StoreError::Transient("timeout".into()));
        assert!(matches!(
            FallbackPolicy::OnUnsupported.classify("p", transient(), is_true),
            FastPath::Failed(StoreError::Transient(_))
        ));
        assert!(matches!(FallbackPolicy::OnAnyError.classify("p", transient(), is_true), FastPath::Fallback));
    }

    #[test]
    fn unexpected_reply_is_a_failure() {
        let r = FallbackPolicy::OnUnsupported.classify("p", Ok(json!(false)), is_true);
        assert!(matches!(r, FastPath::Failed(StoreError::Rejected { .. })));
        let r = FallbackPolicy::OnAnyError.classify("p", Ok(json!(false)), is_true);
        assert!(matches!(r, FastPath::Fallback));
    }
}
