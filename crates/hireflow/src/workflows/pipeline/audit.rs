use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ActorRole, PipelineState};
use crate::store::RepositoryError;
use crate::workflows::domain::{CandidacyId, TransitionId};

/// Write-once audit row for one state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub id: TransitionId,
    pub candidacy_id: CandidacyId,
    /// `None` for the row written when the pairing is opened.
    pub previous_state: Option<PipelineState>,
    pub new_state: PipelineState,
    pub actor_id: String,
    pub actor_role: ActorRole,
    pub reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub automatic: bool,
}

/// Audit row staged inside a transaction; the store assigns its identity on commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransition {
    pub previous_state: Option<PipelineState>,
    pub new_state: PipelineState,
    pub actor_id: String,
    pub actor_role: ActorRole,
    pub reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub automatic: bool,
}

impl NewTransition {
    pub fn into_record(self, id: TransitionId, candidacy_id: CandidacyId) -> TransitionRecord {
        TransitionRecord {
            id,
            candidacy_id,
            previous_state: self.previous_state,
            new_state: self.new_state,
            actor_id: self.actor_id,
            actor_role: self.actor_role,
            reason: self.reason,
            recorded_at: self.recorded_at,
            automatic: self.automatic,
        }
    }
}

/// Read side of the append-only transition log. Rows are only ever appended through a
/// pairing transaction; there is no update or delete.
pub trait AuditTrail: Send + Sync {
    /// Full history of a pairing in commit order.
    fn history(&self, candidacy_id: CandidacyId) -> Result<Vec<TransitionRecord>, RepositoryError>;

    fn latest(&self, candidacy_id: CandidacyId)
        -> Result<Option<TransitionRecord>, RepositoryError>;

    /// Transitions into `state` across all pairings with `from <= recorded_at < to`.
    fn entered_state(
        &self,
        state: PipelineState,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TransitionRecord>, RepositoryError>;
}
