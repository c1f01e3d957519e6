use serde::{Deserialize, Serialize};

/// A named set of players, e.g. a work shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftGroup {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

impl ShiftGroup {
    pub fn new(name: impl Into<String>, members: Vec<String>) -> Self {
        Self {
            name: name.into(),
            members,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.iter().any(|member| member == name)
    }
}

/// Ordered shift groups. Group order is display order and decides which role
/// wins when a name appears in more than one group.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    pub groups: Vec<ShiftGroup>,
}

impl Roster {
    pub fn new(groups: Vec<ShiftGroup>) -> Self {
        Self { groups }
    }

    /// First shift (in roster order) listing `clean_name`. Exact, case-sensitive.
    pub fn role_of(&self, clean_name: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|group| group.contains(clean_name))
            .map(|group| group.name.as_str())
    }

    pub fn group(&self, shift: &str) -> Option<&ShiftGroup> {
        self.groups.iter().find(|group| group.name == shift)
    }

    pub fn contains_shift(&self, shift: &str) -> bool {
        self.group(shift).is_some()
    }

    /// `(shift, member)` pairs in display order.
    pub fn members(&self) -> impl Iterator<Item = (&str, &str)> {
        self.groups.iter().flat_map(|group| {
            group
                .members
                .iter()
                .map(move |member| (group.name.as_str(), member.as_str()))
        })
    }

    pub fn member_count(&self) -> usize {
        self.groups.iter().map(|group| group.members.len()).sum()
    }

    /// Build from `(name, shift)` rows. Shifts are ordered by first appearance;
    /// blank cells are skipped and duplicate pairs collapse.
    pub fn from_rows<I, N, S>(rows: I) -> Self
    where
        I: IntoIterator<Item = (N, S)>,
        N: AsRef<str>,
        S: AsRef<str>,
    {
        let mut roster = Roster::default();
        for (name, shift) in rows {
            let name = name.as_ref().trim();
            let shift = shift.as_ref().trim();
            if name.is_empty() || shift.is_empty() {
                continue;
            }
            roster.insert(shift, name);
        }
        roster
    }

    /// Clean up hand-written groups: trim names, drop blanks and duplicates,
    /// merge groups sharing a name. Group order, including empty groups, is kept.
    pub fn normalized(groups: Vec<ShiftGroup>) -> Self {
        let mut roster = Roster::default();
        for group in groups {
            let shift = group.name.trim();
            if shift.is_empty() {
                continue;
            }
            if !roster.contains_shift(shift) {
                roster.groups.push(ShiftGroup::new(shift, Vec::new()));
            }
            for member in &group.members {
                let member = member.trim();
                if !member.is_empty() {
                    roster.insert(shift, member);
                }
            }
        }
        roster
    }

    fn insert(&mut self, shift: &str, name: &str) {
        let group = match self.groups.iter().position(|group| group.name == shift) {
            Some(idx) => &mut self.groups[idx],
            None => {
                self.groups.push(ShiftGroup::new(shift, Vec::new()));
                let last = self.groups.len() - 1;
                &mut self.groups[last]
            }
        };
        if !group.contains(name) {
            group.members.push(name.to_string());
        }
    }

    /// Overlay `overlay` onto `base`. Names the overlay mentions are moved to
    /// the overlay's shift; shifts only the overlay knows are appended.
    pub fn merge(base: &Roster, overlay: &Roster) -> Roster {
        let mut merged = base.clone();
        for group in &mut merged.groups {
            group
                .members
                .retain(|member| overlay.role_of(member).is_none());
        }
        for (shift, member) in overlay.members() {
            merged.insert(shift, member);
        }
        for group in &overlay.groups {
            if !merged.contains_shift(&group.name) {
                merged.groups.push(ShiftGroup::new(group.name.clone(), Vec::new()));
            }
        }
        merged
    }

    /// CRC32 over the canonical layout; equal rosters share a fingerprint.
    pub fn fingerprint(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        for group in &self.groups {
            hasher.update(group.name.as_bytes());
            hasher.update(&[0x1e]);
            for member in &group.members {
                hasher.update(member.as_bytes());
                hasher.update(&[0x1f]);
            }
            hasher.update(&[0x1d]);
        }
        hasher.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn sample() -> Roster {
        Roster::new(vec![
            ShiftGroup::new("Shift-1", names(&["Siam", "Sami"])),
            ShiftGroup::new("Shift-2", names(&["KIBRIA", "Sami"])),
            ShiftGroup::new("Staff", names(&["KLOK"])),
        ])
    }

    #[test]
    fn role_lookup_is_exact_and_first_group_wins() {
        let roster = sample();
        assert_eq!(roster.role_of("Sami"), Some("Shift-1"));
        assert_eq!(roster.role_of("KIBRIA"), Some("Shift-2"));
        assert_eq!(roster.role_of("kibria"), None);
        assert_eq!(roster.role_of("KIBRIA "), None);
    }

    #[test]
    fn from_rows_orders_shifts_by_first_appearance() {
        let roster = Roster::from_rows(vec![
            (" Abir ", "Full Shift"),
            ("KLOK", "Staff"),
            ("piupiu", "Full Shift"),
            ("Abir", "Full Shift"),
            ("", "Staff"),
            ("Ghost", "  "),
        ]);
        assert_eq!(roster.groups.len(), 2);
        assert_eq!(roster.groups[0].name, "Full Shift");
        assert_eq!(roster.groups[0].members, names(&["Abir", "piupiu"]));
        assert_eq!(roster.groups[1].members, names(&["KLOK"]));
        assert_eq!(roster.member_count(), 3);
    }

    #[test]
    fn normalized_keeps_empty_groups_in_place() {
        let roster = Roster::normalized(vec![
            ShiftGroup::new(" Staff ", names(&["KLOK", " KLOK", ""])),
            ShiftGroup::new("Night", Vec::new()),
            ShiftGroup::new("", names(&["Orphan"])),
            ShiftGroup::new("Staff", names(&["Frog"])),
            ShiftGroup::new("Day", names(&["Sami"])),
        ]);
        let order: Vec<_> = roster.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(order, vec!["Staff", "Night", "Day"]);
        assert_eq!(roster.groups[0].members, names(&["KLOK", "Frog"]));
        assert_eq!(roster.role_of("Orphan"), None);
    }

    #[test]
    fn merge_moves_overlay_names_and_appends_new_shifts() {
        let base = sample();
        let overlay = Roster::from_rows(vec![("Siam", "Staff"), ("Nova", "Night")]);

        let merged = Roster::merge(&base, &overlay);

        assert_eq!(merged.role_of("Siam"), Some("Staff"));
        assert_eq!(merged.group("Shift-1").map(|g| g.members.clone()), Some(names(&["Sami"])));
        assert_eq!(
            merged.group("Staff").map(|g| g.members.clone()),
            Some(names(&["KLOK", "Siam"]))
        );
        let order: Vec<_> = merged.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(order, vec!["Shift-1", "Shift-2", "Staff", "Night"]);
    }

    #[test]
    fn merge_keeps_emptied_base_groups() {
        let base = Roster::from_rows(vec![("Zero", "Staff")]);
        let overlay = Roster::from_rows(vec![("Zero", "Shift-1")]);
        let merged = Roster::merge(&base, &overlay);
        assert!(merged.group("Staff").is_some_and(|g| g.members.is_empty()));
        assert_eq!(merged.role_of("Zero"), Some("Shift-1"));
    }

    #[test]
    fn merge_with_empty_overlay_is_identity() {
        let base = sample();
        assert_eq!(Roster::merge(&base, &Roster::default()), base);
    }

    #[test]
    fn fingerprint_tracks_content_and_order() {
        let a = sample();
        let b = sample();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let mut reordered = sample();
        reordered.groups.swap(0, 1);
        assert_ne!(a.fingerprint(), reordered.fingerprint());

        let split = Roster::new(vec![ShiftGroup::new("ab", names(&["c"]))]);
        let joined = Roster::new(vec![ShiftGroup::new("a", names(&["bc"]))]);
        assert_ne!(split.fingerprint(), joined.fingerprint());
    }

    #[test]
    fn serializes_as_plain_group_list() {
        let roster = Roster::from_rows(vec![("KLOK", "Staff")]);
        let json = serde_json::to_value(&roster).expect("roster should serialize");
        assert_eq!(
            json,
            serde_json::json!([{ "name": "Staff", "members": ["KLOK"] }])
        );
    }
}
