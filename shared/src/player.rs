use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A connected player as reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    #[serde(default)]
    pub id: Option<i64>,
    /// Raw upstream name, possibly carrying `^N` color codes.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ping: Option<i64>,
}

impl Player {
    pub fn new(id: Option<i64>, name: impl Into<String>, ping: Option<i64>) -> Self {
        Self {
            id,
            name: name.into(),
            ping,
        }
    }

    pub fn clean_name(&self) -> String {
        strip_color_codes(&self.name)
    }
}

/// Remove `^0`..`^9` color codes and surrounding whitespace.
pub fn strip_color_codes(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '^' && chars.peek().is_some_and(char::is_ascii_digit) {
            chars.next();
            continue;
        }
        out.push(ch);
    }
    out.trim().to_string()
}

/// Stable order: id ascending (missing id sorts as 0), then raw name.
pub fn sort_players(players: &mut [Player]) {
    players.sort_by(compare_players);
}

fn compare_players(a: &Player, b: &Player) -> Ordering {
    a.id.unwrap_or(0)
        .cmp(&b.id.unwrap_or(0))
        .then_with(|| a.name.cmp(&b.name))
}
