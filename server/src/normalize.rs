//! Turns the status payload shapes we see in the wild into a [`StatusSnapshot`].
//!
//! Accepted: the server-list frontend response (`{"Data": {...}}`), the same
//! object unwrapped, and a bare `players.json` array.

use chrono::{DateTime, Utc};
use serde_json::Value;
use shiftboard_shared::{Player, StatusSnapshot, sort_players, strip_color_codes};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub players: Vec<Player>,
    pub hostname: Option<String>,
    pub capacity: Option<u32>,
}

impl Normalized {
    pub fn into_snapshot(self, source: &str, fetched_at: DateTime<Utc>) -> StatusSnapshot {
        StatusSnapshot {
            players: self.players,
            hostname: self.hostname,
            capacity: self.capacity,
            fetched_at,
            source: source.to_string(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("payload is neither an object nor an array")]
    NotObjectOrArray,
}

pub fn parse_status_payload(bytes: &[u8]) -> Result<Normalized, serde_json::Error> {
    let value: Value = serde_json::from_slice(bytes)?;
    normalize_value(&value).map_err(<serde_json::Error as serde::de::Error>::custom)
}

pub fn normalize_value(value: &Value) -> Result<Normalized, ShapeError> {
    let root = match value {
        Value::Array(entries) => {
            return Ok(Normalized {
                players: parse_players(entries),
                hostname: None,
                capacity: None,
            });
        }
        Value::Object(_) => value
            .get("Data")
            .filter(|data| data.is_object())
            .unwrap_or(value),
        _ => return Err(ShapeError::NotObjectOrArray),
    };

    let players = root
        .get("players")
        .and_then(Value::as_array)
        .map(|entries| parse_players(entries))
        .unwrap_or_default();

    let hostname = root
        .get("hostname")
        .and_then(Value::as_str)
        .map(strip_color_codes)
        .filter(|name| !name.is_empty());

    // The first key that is present decides; an unparseable value means unknown.
    let vars = root.get("vars");
    let capacity = [
        root.get("sv_maxclients"),
        vars.and_then(|v| v.get("sv_maxclients")),
        vars.and_then(|v| v.get("svMaxClients")),
    ]
    .into_iter()
    .flatten()
    .find(|value| !value.is_null())
    .and_then(as_u32);

    Ok(Normalized {
        players,
        hostname,
        capacity,
    })
}

fn parse_players(entries: &[Value]) -> Vec<Player> {
    let mut players: Vec<Player> = entries
        .iter()
        .filter(|entry| entry.is_object())
        .map(|entry| Player {
            id: entry.get("id").and_then(as_i64),
            name: entry
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            ping: entry.get("ping").and_then(as_i64),
        })
        .collect();
    sort_players(&mut players);
    players
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    as_i64(value).and_then(|n| u32::try_from(n).ok())
}
