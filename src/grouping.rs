//! Collapses the raw inventory feed into unique miner groups.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::model::{ItemGroup, ItemRecord, ValidationError};

/// Grouping key: every attribute that influences selection and placement.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct GroupKey<'a> {
    name: &'a str,
    level: i64,
    power_bits: u64,
    width: u32,
    bonus_percent: i64,
}

impl<'a> GroupKey<'a> {
    fn of(record: &'a ItemRecord) -> Self {
        // -0.0 and 0.0 must land in the same group
        let power = if record.power == 0.0 { 0.0 } else { record.power };
        Self {
            name: &record.name,
            level: record.level,
            power_bits: power.to_bits(),
            width: record.width,
            bonus_percent: record.bonus_percent,
        }
    }
}

/// Groups identical miners and validates every record.
///
/// Groups are returned in the order their first record appears, so group
/// indices are stable for identical input. An empty feed yields an empty
/// group list.
///
/// # Errors
/// Returns the first `ValidationError` found; no groups are produced in that
/// case.
pub fn group_items(records: &[ItemRecord]) -> Result<Vec<ItemGroup>, ValidationError> {
    let mut groups: Vec<ItemGroup> = Vec::new();
    let mut index: HashMap<GroupKey<'_>, usize> = HashMap::new();

    for record in records {
        record.validate()?;

        match index.get(&GroupKey::of(record)) {
            Some(&slot) => groups[slot].count += 1,
            None => {
                index.insert(GroupKey::of(record), groups.len());
                groups.push(ItemGroup {
                    name: record.name.clone(),
                    level: record.level,
                    power: record.power,
                    width: record.width,
                    bonus_percent: record.bonus_percent,
                    count: 1,
                });
            }
        }
    }

    warn_on_split_bonus_keys(&groups);
    debug!(
        records = records.len(),
        groups = groups.len(),
        "grouped inventory"
    );
    Ok(groups)
}

/// Logs bonus keys that ended up in more than one group.
///
/// Each group contributes its bonus on its own, so such a key may be counted
/// more than once by the selection step.
fn warn_on_split_bonus_keys(groups: &[ItemGroup]) {
    let mut seen: HashMap<(&str, i64), usize> = HashMap::new();
    for group in groups {
        *seen.entry(group.bonus_key()).or_default() += 1;
    }
    for ((name, level), count) in seen {
        if count > 1 {
            warn!(
                name,
                level,
                groups = count,
                "miners sharing a bonus key differ in power, width or bonus"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, level: i64, power: f64, width: u32, bonus: i64) -> ItemRecord {
        ItemRecord {
            name: name.to_string(),
            level,
            power,
            width,
            bonus_percent: bonus,
        }
    }

    #[test]
    fn empty_feed_yields_no_groups() {
        let groups = group_items(&[]).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn identical_records_are_counted() {
        let records = vec![
            record("A", 1, 100.0, 1, 500),
            record("B", 1, 50.0, 2, 0),
            record("A", 1, 100.0, 1, 500),
            record("A", 1, 100.0, 1, 500),
        ];

        let groups = group_items(&records).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "A");
        assert_eq!(groups[0].count, 3);
        assert_eq!(groups[1].name, "B");
        assert_eq!(groups[1].count, 1);

        let total: u32 = groups.iter().map(|g| g.count).sum();
        assert_eq!(total as usize, records.len());
    }

    #[test]
    fn differing_levels_form_separate_groups() {
        let records = vec![record("A", 1, 100.0, 1, 500), record("A", 2, 100.0, 1, 500)];
        let groups = group_items(&records).unwrap();
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn signed_zero_power_shares_a_group() {
        let records = vec![record("Z", 0, 0.0, 1, 0), record("Z", 0, -0.0, 1, 0)];
        let groups = group_items(&records).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].count, 2);
    }

    #[test]
    fn width_above_floor_capacity_is_fatal() {
        let records = vec![record("A", 1, 100.0, 1, 0), record("Huge", 1, 900.0, 3, 0)];
        let err = group_items(&records).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidWidth(_)));
    }

    #[test]
    fn negative_power_is_fatal() {
        let err = group_items(&[record("A", 1, -5.0, 1, 0)]).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPower(_)));
    }
}
