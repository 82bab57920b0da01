//! Selection engine: which miners to keep for a given slot budget.
//!
//! A multi-dimensional knapsack over miner groups. For every reachable used
//! width the table keeps the Pareto frontier of `(raw_power, bonus_total)`
//! together with the group counts that produced each point:
//! - Groups are processed one after another, trying `0..=count` copies each
//! - A group's bonus is added once, as soon as at least one copy is chosen
//! - After each group every width bucket is pruned to its non-dominated states
//!
//! The table is built once for the largest capacity of interest and then read
//! through [`SelectionTable::states_within`] for any smaller ceiling.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::debug;

use crate::model::{BONUS_SCALE, ItemGroup};

/// Number of copies chosen from one group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupChoice {
    pub group: usize,
    pub count: u32,
}

/// One point of the selection frontier.
///
/// Invariants (relative to the groups the table was built from):
/// * `used_width == Σ count * width`
/// * `raw_power == Σ count * power`
/// * `bonus_total == Σ bonus` over groups with at least one chosen copy
///
/// `choice` only lists groups with a non-zero count, ordered by group index.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectionState {
    pub used_width: u32,
    pub raw_power: f64,
    pub bonus_total: i64,
    pub choice: Vec<GroupChoice>,
}

impl SelectionState {
    /// The empty selection.
    pub fn empty() -> Self {
        Self {
            used_width: 0,
            raw_power: 0.0,
            bonus_total: 0,
            choice: Vec::new(),
        }
    }

    /// Extends the state by `copies` miners of `group`.
    fn extend(&self, group_index: usize, group: &ItemGroup, copies: u32, width: u32) -> Self {
        if copies == 0 {
            return self.clone();
        }
        let mut choice = Vec::with_capacity(self.choice.len() + 1);
        choice.extend_from_slice(&self.choice);
        choice.push(GroupChoice {
            group: group_index,
            count: copies,
        });
        Self {
            used_width: width,
            raw_power: self.raw_power + f64::from(copies) * group.power,
            bonus_total: self.bonus_total + group.bonus_percent,
            choice,
        }
    }

    /// Total number of miners in the selection.
    pub fn item_count(&self) -> u64 {
        self.choice.iter().map(|c| u64::from(c.count)).sum()
    }

    /// Group index → count mapping, as exported in the layout.
    pub fn choice_map(&self) -> BTreeMap<usize, u32> {
        self.choice.iter().map(|c| (c.group, c.count)).collect()
    }

    /// Final power of the selection under an additional rack bonus.
    pub fn final_power(&self, rack_bonus: i64) -> f64 {
        final_power(self.raw_power, self.bonus_total + rack_bonus)
    }

    /// Returns `true` if `other` is at least as good in both dimensions and
    /// strictly better in one.
    pub fn is_dominated_by(&self, other: &Self) -> bool {
        other.raw_power >= self.raw_power
            && other.bonus_total >= self.bonus_total
            && (other.raw_power > self.raw_power || other.bonus_total > self.bonus_total)
    }
}

/// Scales raw power by one plus the combined bonus fraction.
///
/// # Examples
/// ```
/// use rack_planner::selection::final_power;
///
/// let power = final_power(400.0, 800);
/// assert!((power - 432.0).abs() < 1e-9);
/// ```
pub fn final_power(raw_power: f64, bonus_percent: i64) -> f64 {
    raw_power * (1.0 + bonus_percent as f64 / BONUS_SCALE)
}

/// Pareto frontiers of every used width up to `max_units`.
#[derive(Clone, Debug)]
pub struct SelectionTable {
    max_units: u32,
    buckets: Vec<Vec<SelectionState>>,
}

impl SelectionTable {
    /// Runs the selection engine over all groups.
    ///
    /// # Parameters
    /// * `groups` - Miner groups, processed in order
    /// * `max_units` - Largest used width that is kept
    pub fn build(groups: &[ItemGroup], max_units: u32) -> Self {
        let bucket_count = max_units as usize + 1;
        let mut buckets: Vec<Vec<SelectionState>> = vec![Vec::new(); bucket_count];
        buckets[0].push(SelectionState::empty());

        for (group_index, group) in groups.iter().enumerate() {
            let mut next: Vec<Vec<SelectionState>> = vec![Vec::new(); bucket_count];

            for (used, states) in buckets.iter().enumerate() {
                if states.is_empty() {
                    continue;
                }
                for copies in 0..=group.count {
                    let new_width = used as u64 + u64::from(copies) * u64::from(group.width);
                    if new_width > u64::from(max_units) {
                        break;
                    }
                    let new_width = new_width as u32;
                    for state in states {
                        next[new_width as usize].push(state.extend(
                            group_index,
                            group,
                            copies,
                            new_width,
                        ));
                    }
                }
            }

            buckets = next.into_iter().map(prune_frontier).collect();
            debug!(
                group = group_index,
                name = %group.name,
                states = buckets.iter().map(Vec::len).sum::<usize>(),
                "processed group"
            );
        }

        Self { max_units, buckets }
    }

    /// Largest used width held by the table.
    pub fn max_units(&self) -> u32 {
        self.max_units
    }

    /// Frontier of states using exactly `width` units (empty if unreachable).
    pub fn frontier(&self, width: u32) -> &[SelectionState] {
        self.buckets
            .get(width as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All states with `used_width <= limit`, by width ascending and then in
    /// frontier order.
    pub fn states_within(&self, limit: u32) -> impl Iterator<Item = &SelectionState> {
        let end = (limit.min(self.max_units) as usize) + 1;
        self.buckets[..end].iter().flatten()
    }

    /// Widths that have at least one state.
    pub fn reachable_widths(&self) -> impl Iterator<Item = u32> + '_ {
        self.buckets
            .iter()
            .enumerate()
            .filter(|(_, states)| !states.is_empty())
            .map(|(width, _)| width as u32)
    }

    /// Number of retained states over all widths.
    pub fn state_count(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }
}

/// Keeps the non-dominated states of one width bucket.
///
/// States are ordered by raw power and then bonus, both descending; a state
/// survives only if its bonus beats every state before it. Among exact
/// duplicates the first one encountered is kept.
fn prune_frontier(mut states: Vec<SelectionState>) -> Vec<SelectionState> {
    if states.len() <= 1 {
        return states;
    }

    states.sort_by(|a, b| {
        b.raw_power
            .partial_cmp(&a.raw_power)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.bonus_total.cmp(&a.bonus_total))
    });

    let mut pruned = Vec::with_capacity(states.len());
    let mut best_bonus: Option<i64> = None;
    for state in states {
        if best_bonus.is_none_or(|bonus| state.bonus_total > bonus) {
            best_bonus = Some(state.bonus_total);
            pruned.push(state);
        }
    }
    pruned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &str, power: f64, width: u32, bonus: i64, count: u32) -> ItemGroup {
        ItemGroup {
            name: name.to_string(),
            level: 1,
            power,
            width,
            bonus_percent: bonus,
            count,
        }
    }

    fn sample_groups() -> Vec<ItemGroup> {
        vec![
            group("A", 100.0, 1, 500, 3),
            group("B", 50.0, 2, 0, 2),
            group("C", 80.0, 2, 300, 1),
            group("D", 10.0, 1, 900, 2),
        ]
    }

    fn assert_consistent(state: &SelectionState, groups: &[ItemGroup]) {
        let mut width = 0u32;
        let mut raw = 0.0;
        let mut bonus = 0i64;
        for choice in &state.choice {
            let g = &groups[choice.group];
            assert!(choice.count >= 1, "choice lists an unused group");
            assert!(choice.count <= g.count, "choice exceeds inventory");
            width += choice.count * g.width;
            raw += f64::from(choice.count) * g.power;
            bonus += g.bonus_percent;
        }
        assert_eq!(state.used_width, width);
        assert!((state.raw_power - raw).abs() < 1e-9);
        assert_eq!(state.bonus_total, bonus);
    }

    #[test]
    fn empty_groups_keep_only_the_empty_state() {
        let table = SelectionTable::build(&[], 8);
        assert_eq!(table.state_count(), 1);
        assert_eq!(table.frontier(0), &[SelectionState::empty()]);
        assert!(table.frontier(1).is_empty());
    }

    #[test]
    fn every_state_matches_its_recorded_choice() {
        let groups = sample_groups();
        for max_units in [0, 3, 6, 8, 16] {
            let table = SelectionTable::build(&groups, max_units);
            for width in 0..=max_units {
                for state in table.frontier(width) {
                    assert_eq!(state.used_width, width);
                    assert_consistent(state, &groups);
                }
            }
        }
    }

    #[test]
    fn frontier_buckets_hold_no_comparable_states() {
        let groups = sample_groups();
        let table = SelectionTable::build(&groups, 12);
        for width in table.reachable_widths() {
            let frontier = table.frontier(width);
            for (i, a) in frontier.iter().enumerate() {
                for (j, b) in frontier.iter().enumerate() {
                    if i != j {
                        assert!(
                            !a.is_dominated_by(b),
                            "state {:?} dominated by {:?} at width {}",
                            a,
                            b,
                            width
                        );
                        assert!(
                            !(a.raw_power == b.raw_power && a.bonus_total == b.bonus_total),
                            "duplicate state at width {}",
                            width
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn bonus_counts_once_per_group() {
        let groups = vec![group("A", 100.0, 1, 500, 3)];
        let table = SelectionTable::build(&groups, 8);
        let three = table.frontier(3);
        assert_eq!(three.len(), 1);
        assert_eq!(three[0].bonus_total, 500);
        assert_eq!(three[0].choice_map().get(&0), Some(&3));
        assert!((three[0].raw_power - 300.0).abs() < 1e-9);
    }

    #[test]
    fn widths_beyond_the_ceiling_are_not_kept() {
        let groups = vec![group("B", 50.0, 2, 0, 5)];
        let table = SelectionTable::build(&groups, 5);
        let widths: Vec<u32> = table.reachable_widths().collect();
        assert_eq!(widths, vec![0, 2, 4]);
    }

    #[test]
    fn truncated_view_matches_a_smaller_build() {
        let groups = sample_groups();
        let large = SelectionTable::build(&groups, 16);
        let small = SelectionTable::build(&groups, 6);

        let best_large = large
            .states_within(6)
            .map(|s| s.final_power(0))
            .fold(0.0, f64::max);
        let best_small = small
            .states_within(6)
            .map(|s| s.final_power(0))
            .fold(0.0, f64::max);
        assert!((best_large - best_small).abs() < 1e-9);
        assert!(large.states_within(6).all(|s| s.used_width <= 6));
    }

    #[test]
    fn prune_keeps_trade_offs_and_drops_dominated() {
        let make = |raw: f64, bonus: i64| SelectionState {
            used_width: 2,
            raw_power: raw,
            bonus_total: bonus,
            choice: Vec::new(),
        };
        let pruned = prune_frontier(vec![
            make(100.0, 0),
            make(80.0, 500),
            make(90.0, 100),
            make(70.0, 400),
            make(100.0, 0),
        ]);
        let points: Vec<(f64, i64)> = pruned
            .iter()
            .map(|s| (s.raw_power, s.bonus_total))
            .collect();
        assert_eq!(points, vec![(100.0, 0), (90.0, 100), (80.0, 500)]);
    }

    #[test]
    fn choice_map_lists_chosen_groups() {
        let groups = sample_groups();
        let table = SelectionTable::build(&groups, 16);
        let best = table
            .states_within(16)
            .max_by(|a, b| a.raw_power.partial_cmp(&b.raw_power).unwrap())
            .unwrap();
        let map = best.choice_map();
        assert_eq!(map.get(&0), Some(&3));
        assert_eq!(best.item_count(), map.values().map(|&c| u64::from(c)).sum::<u64>());
    }
}
