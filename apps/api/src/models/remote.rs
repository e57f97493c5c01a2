use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A locally-created record that may not yet have a server-assigned id.
///
/// Records are built `Pending` with a `temp-` prefixed id, then *replaced*
/// (never merged) by `Confirmed` once the server ack carries the real id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Remote<T> {
    Pending { temp_id: String, record: T },
    Confirmed { id: Uuid, record: T },
}

impl<T> Remote<T> {
    pub fn pending(key: impl std::fmt::Display, record: T) -> Self {
        Remote::Pending {
            temp_id: format!("temp-{key}"),
            record,
        }
    }

    /// Resolves a pending record against the server-assigned id. Confirmed
    /// records are left untouched.
    pub fn confirm(self, id: Uuid) -> Self {
        match self {
            Remote::Pending { record, .. } => Remote::Confirmed { id, record },
            confirmed @ Remote::Confirmed { .. } => confirmed,
        }
    }

    pub fn record(&self) -> &T {
        match self {
            Remote::Pending { record, .. } | Remote::Confirmed { record, .. } => record,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Remote::Confirmed { .. })
    }
}
