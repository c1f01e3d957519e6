use serde::{Deserialize, Serialize};

use crate::board::ShiftBoard;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BoardEvent {
    /// A fresh snapshot was applied (or the roster changed).
    Snapshot {
        #[serde(default)]
        seq: u64,
        board: ShiftBoard,
    },
    /// Refresh failed; clients keep showing their last board.
    Stale {
        #[serde(default)]
        seq: u64,
        warning: String,
        error: String,
        #[serde(default)]
        last_success: Option<String>,
    },
    /// Refresh failed and there is nothing to fall back to.
    Failed {
        #[serde(default)]
        seq: u64,
        message: String,
        error: String,
    },
}

impl BoardEvent {
    pub fn seq(&self) -> u64 {
        match self {
            Self::Snapshot { seq, .. } | Self::Stale { seq, .. } | Self::Failed { seq, .. } => {
                *seq
            }
        }
    }

    /// SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Snapshot { .. } => "snapshot",
            Self::Stale { .. } => "stale",
            Self::Failed { .. } => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_event_is_tagged_by_type() {
        let event = BoardEvent::Stale {
            seq: 9,
            warning: "w".into(),
            error: "timeout".into(),
            last_success: None,
        };
        let json = serde_json::to_value(&event).expect("event should serialize");
        assert_eq!(json["type"], "Stale");
        assert_eq!(json["seq"], 9);
        assert_eq!(event.kind(), "stale");

        let back: BoardEvent = serde_json::from_value(json).expect("event should parse");
        assert_eq!(back.seq(), 9);
    }
}
