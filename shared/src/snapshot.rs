use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::player::Player;

/// One fetched and normalized view of the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub players: Vec<Player>,
    /// Color-code-stripped display name; `None` when upstream sent none.
    pub hostname: Option<String>,
    pub capacity: Option<u32>,
    pub fetched_at: DateTime<Utc>,
    /// URL of the source that produced this snapshot.
    pub source: String,
}
