use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::player::Player;
use crate::roster::Roster;

pub const DEFAULT_HOSTNAME: &str = "FiveM Server";
pub const STALE_WARNING: &str = "Couldn't update, showing last data";
pub const FAILED_MESSAGE: &str = "Failed to load players.";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ShiftFilter {
    #[default]
    All,
    Shift(String),
}

impl ShiftFilter {
    /// `None`, empty and `"all"` select every player.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") | Some("all") => Self::All,
            Some(shift) => Self::Shift(shift.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlayerFilter {
    /// Lowercased search text, matched as typed (surrounding spaces included).
    pub search: Option<String>,
    pub shift: ShiftFilter,
}

impl PlayerFilter {
    pub fn new(search: Option<&str>, shift: ShiftFilter) -> Self {
        let search = search.filter(|s| !s.is_empty()).map(str::to_lowercase);
        Self { search, shift }
    }

    pub fn is_unfiltered(&self) -> bool {
        self.search.is_none() && self.shift == ShiftFilter::All
    }

    pub fn matches(&self, clean_name: &str, roster: &Roster) -> bool {
        if let Some(search) = &self.search
            && !clean_name.to_lowercase().contains(search.as_str())
        {
            return false;
        }
        match &self.shift {
            ShiftFilter::All => true,
            ShiftFilter::Shift(shift) => roster
                .group(shift)
                .is_some_and(|group| group.contains(clean_name)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineRow {
    /// 1-based position after filtering.
    pub position: usize,
    pub id: Option<i64>,
    pub name: String,
    pub role: Option<String>,
    pub ping: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineRow {
    pub name: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftSummary {
    pub shift: String,
    pub online: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardStatus {
    /// No fetch has completed yet.
    Loading,
    Live,
    /// Last fetch failed; showing the previous snapshot.
    Stale,
    /// Every fetch so far has failed.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftBoard {
    pub seq: u64,
    pub status: BoardStatus,
    pub hostname: String,
    pub player_count: usize,
    pub capacity: Option<u32>,
    pub online: Vec<OnlineRow>,
    pub offline: Vec<OfflineRow>,
    pub shifts: Vec<ShiftSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

pub fn online_rows(players: &[Player], roster: &Roster, filter: &PlayerFilter) -> Vec<OnlineRow> {
    players
        .iter()
        .map(|player| (player, player.clean_name()))
        .filter(|(_, clean)| filter.matches(clean, roster))
        .enumerate()
        .map(|(idx, (player, clean))| OnlineRow {
            position: idx + 1,
            id: player.id,
            role: roster.role_of(&clean).map(str::to_string),
            name: clean,
            ping: player.ping,
        })
        .collect()
}

fn online_names(players: &[Player]) -> HashSet<String> {
    players.iter().map(Player::clean_name).collect()
}

pub fn offline_rows(players: &[Player], roster: &Roster) -> Vec<OfflineRow> {
    let online = online_names(players);
    roster
        .members()
        .filter(|(_, member)| !online.contains(*member))
        .map(|(shift, member)| OfflineRow {
            name: member.to_string(),
            role: shift.to_string(),
        })
        .collect()
}

pub fn shift_summaries(players: &[Player], roster: &Roster) -> Vec<ShiftSummary> {
    let online = online_names(players);
    roster
        .groups
        .iter()
        .map(|group| ShiftSummary {
            shift: group.name.clone(),
            online: group
                .members
                .iter()
                .filter(|member| online.contains(member.as_str()))
                .count(),
            total: group.members.len(),
        })
        .collect()
}

/// What the board is built from: the current snapshot (if any) and its state.
#[derive(Debug, Clone, Copy)]
pub struct BoardInput<'a> {
    pub seq: u64,
    pub status: BoardStatus,
    pub hostname: Option<&'a str>,
    pub capacity: Option<u32>,
    pub players: &'a [Player],
    pub fetched_at: Option<&'a str>,
    pub source: Option<&'a str>,
}

impl ShiftBoard {
    pub fn build(input: BoardInput<'_>, roster: &Roster, filter: &PlayerFilter) -> Self {
        let warning = match input.status {
            BoardStatus::Stale => Some(STALE_WARNING.to_string()),
            BoardStatus::Failed => Some(FAILED_MESSAGE.to_string()),
            BoardStatus::Loading | BoardStatus::Live => None,
        };
        Self {
            seq: input.seq,
            status: input.status,
            hostname: input
                .hostname
                .filter(|name| !name.is_empty())
                .unwrap_or(DEFAULT_HOSTNAME)
                .to_string(),
            player_count: input.players.len(),
            capacity: input.capacity,
            online: online_rows(input.players, roster, filter),
            offline: offline_rows(input.players, roster),
            shifts: shift_summaries(input.players, roster),
            warning,
            fetched_at: input.fetched_at.map(str::to_string),
            source: input.source.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::ShiftGroup;

    fn roster() -> Roster {
        Roster::new(vec![
            ShiftGroup::new("Shift-1", vec!["Siam".into(), "Sami".into()]),
            ShiftGroup::new("Staff", vec!["KLOK".into(), "Frog".into()]),
        ])
    }

    fn players() -> Vec<Player> {
        vec![
            Player::new(Some(1), "^1Siam", Some(40)),
            Player::new(Some(2), "Random", Some(80)),
            Player::new(Some(7), "KLOK^7 ", None),
        ]
    }

    #[test]
    fn online_rows_assign_roles_from_clean_names() {
        let rows = online_rows(&players(), &roster(), &PlayerFilter::default());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].name, "Siam");
        assert_eq!(rows[0].role.as_deref(), Some("Shift-1"));
        assert_eq!(rows[1].role, None);
        assert_eq!(rows[2].name, "KLOK");
        assert_eq!(rows[2].role.as_deref(), Some("Staff"));
    }

    #[test]
    fn search_is_case_insensitive_and_renumbers() {
        let filter = PlayerFilter::new(Some("kL"), ShiftFilter::All);
        let rows = online_rows(&players(), &roster(), &filter);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].position, 1);
        assert_eq!(rows[0].id, Some(7));
    }

    #[test]
    fn search_text_is_not_trimmed() {
        let padded = PlayerFilter::new(Some(" kl "), ShiftFilter::All);
        assert!(!padded.is_unfiltered());
        assert!(online_rows(&players(), &roster(), &padded).is_empty());

        let spaced = vec![Player::new(Some(3), "Mr Fraud", None)];
        let inner = PlayerFilter::new(Some("r f"), ShiftFilter::All);
        assert_eq!(online_rows(&spaced, &Roster::default(), &inner).len(), 1);
    }

    #[test]
    fn shift_filter_requires_exact_membership() {
        let filter = PlayerFilter::new(None, ShiftFilter::parse(Some("Staff")));
        let rows = online_rows(&players(), &roster(), &filter);
        assert_eq!(rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), vec!["KLOK"]);

        let lower = PlayerFilter::new(None, ShiftFilter::parse(Some("staff")));
        assert!(online_rows(&players(), &roster(), &lower).is_empty());
    }

    #[test]
    fn shift_filter_parse_treats_all_and_blank_as_unfiltered() {
        assert_eq!(ShiftFilter::parse(None), ShiftFilter::All);
        assert_eq!(ShiftFilter::parse(Some(" ")), ShiftFilter::All);
        assert_eq!(ShiftFilter::parse(Some("all")), ShiftFilter::All);
        assert!(PlayerFilter::new(Some(""), ShiftFilter::All).is_unfiltered());
    }

    #[test]
    fn offline_rows_follow_roster_order() {
        let rows = offline_rows(&players(), &roster());
        let pairs: Vec<_> = rows
            .iter()
            .map(|r| (r.name.as_str(), r.role.as_str()))
            .collect();
        assert_eq!(pairs, vec![("Sami", "Shift-1"), ("Frog", "Staff")]);
    }

    #[test]
    fn offline_rows_empty_without_roster() {
        assert!(offline_rows(&players(), &Roster::default()).is_empty());
    }

    #[test]
    fn summaries_count_online_members_per_shift() {
        let summaries = shift_summaries(&players(), &roster());
        assert_eq!(summaries[0], ShiftSummary { shift: "Shift-1".into(), online: 1, total: 2 });
        assert_eq!(summaries[1], ShiftSummary { shift: "Staff".into(), online: 1, total: 2 });
    }

    #[test]
    fn stale_board_carries_warning_and_defaults_hostname() {
        let players = players();
        let board = ShiftBoard::build(
            BoardInput {
                seq: 4,
                status: BoardStatus::Stale,
                hostname: Some(""),
                capacity: None,
                players: &players,
                fetched_at: Some("2026-01-01T00:00:00Z"),
                source: None,
            },
            &roster(),
            &PlayerFilter::default(),
        );
        assert_eq!(board.hostname, DEFAULT_HOSTNAME);
        assert_eq!(board.warning.as_deref(), Some(STALE_WARNING));
        assert_eq!(board.capacity, None);
        assert_eq!(board.player_count, 3);
        assert_eq!(board.online.len(), 3);
    }
}
