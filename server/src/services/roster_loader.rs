use std::fmt;
use std::path::Path;

use serde::Deserialize;
use serde::de::{MapAccess, Visitor};
use shiftboard_shared::{Roster, ShiftGroup};
use tracing::{info, warn};

use crate::config::roster_refresh_interval;
use crate::error::RosterError;
use crate::services::status_poller;
use crate::state::AppState;

const NAME_HEADERS: &[&str] = &["name", "player", "player name", "member"];
const SHIFT_HEADERS: &[&str] = &["shift", "role", "group", "team"];

/// Roster file: either `{"Shift": ["name", ...], ...}` (key order kept) or a
/// list of `{"name": "Shift", "members": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RosterFile {
    Groups(Vec<ShiftGroup>),
    Map(OrderedGroups),
}

struct OrderedGroups(Vec<ShiftGroup>);

impl<'de> Deserialize<'de> for OrderedGroups {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = OrderedGroups;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of shift name to member list")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut groups = Vec::new();
                while let Some((name, members)) = map.next_entry::<String, Vec<String>>()? {
                    groups.push(ShiftGroup::new(name, members));
                }
                Ok(OrderedGroups(groups))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

pub fn parse_roster_json(bytes: &[u8]) -> Result<Roster, RosterError> {
    let groups = match serde_json::from_slice::<RosterFile>(bytes)? {
        RosterFile::Groups(groups) => groups,
        RosterFile::Map(OrderedGroups(groups)) => groups,
    };
    Ok(Roster::normalized(groups))
}

pub async fn load_base_roster(path: &Path) -> Result<Roster, RosterError> {
    let bytes = tokio::fs::read(path).await?;
    parse_roster_json(&bytes)
}

/// Parse a published-spreadsheet CSV of `(name, shift)` rows. A header row is
/// recognised by its column names; without one the first two columns are used.
pub fn parse_roster_csv(bytes: &[u8]) -> Result<Roster, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let mut records = reader.records();

    let Some(first) = records.next().transpose()? else {
        return Ok(Roster::default());
    };
    let header = detect_header(&first);
    let (name_col, shift_col) = header.unwrap_or((0, 1));

    let mut rows = Vec::new();
    if header.is_none() {
        rows.push(row_at(&first, name_col, shift_col));
    }
    for record in records {
        let record = record?;
        rows.push(row_at(&record, name_col, shift_col));
    }
    Ok(Roster::from_rows(rows))
}

fn detect_header(record: &csv::StringRecord) -> Option<(usize, usize)> {
    let position = |candidates: &[&str]| {
        record
            .iter()
            .position(|cell| candidates.contains(&cell.to_ascii_lowercase().as_str()))
    };
    Some((position(NAME_HEADERS)?, position(SHIFT_HEADERS)?))
}

fn row_at(record: &csv::StringRecord, name_col: usize, shift_col: usize) -> (String, String) {
    (
        record.get(name_col).unwrap_or_default().to_string(),
        record.get(shift_col).unwrap_or_default().to_string(),
    )
}

pub async fn fetch_remote_roster(client: &reqwest::Client, url: &str) -> Result<Roster, RosterError> {
    let resp = client
        .get(url)
        .header(reqwest::header::CACHE_CONTROL, "no-store")
        .send()
        .await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(RosterError::Status(status));
    }
    let bytes = resp.bytes().await?;
    Ok(parse_roster_csv(bytes.as_ref())?)
}

/// Periodically overlay the spreadsheet roster on the base roster. A failed
/// fetch keeps whatever was merged last.
pub async fn run(state: AppState, csv_url: String) {
    let mut interval = tokio::time::interval(roster_refresh_interval());

    loop {
        interval.tick().await;
        refresh_remote_roster(&state, &csv_url).await;
    }
}

async fn refresh_remote_roster(state: &AppState, csv_url: &str) {
    match fetch_remote_roster(&state.http_client, csv_url).await {
        Ok(remote) => {
            let remote_members = remote.member_count();
            let changed = state.roster.write().await.apply_remote(remote);
            if changed {
                info!(remote_members, "roster spreadsheet changed; republishing board");
                status_poller::republish(state).await;
            }
        }
        Err(e) => {
            state.observability.record_roster_refresh_failure();
            warn!(error = %e, "failed to refresh roster spreadsheet; keeping previous roster");
        }
    }
}
