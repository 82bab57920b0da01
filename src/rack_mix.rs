//! Rack-mix search over the split of the rack budget into both shapes.
//!
//! Every split `r3 + r4 = R` is evaluated against the shared selection table:
//! - capacity is `r3 * 6 + r4 * 8` unit-slots
//! - the rack bonus is the integer mean of the best `r3` three-floor and the
//!   best `r4` four-floor bonuses, padded with a fallback when inventory is short
//! - the best selection within capacity is the one maximizing final power
//!
//! Trials only read the table, so they may run in parallel.

use rayon::prelude::*;
use tracing::debug;

use crate::model::{RackBonusOption, RackHeight};
use crate::optimizer::PlannerConfig;
use crate::selection::{SelectionState, SelectionTable};

/// A rack committed to a trial, with the bonus and name it contributes.
#[derive(Clone, Debug, PartialEq)]
pub struct CommittedRack {
    pub height: RackHeight,
    pub bonus_percent: i64,
    pub name: String,
    /// `false` if the rack was padded in with the fallback bonus.
    pub from_inventory: bool,
}

/// Rack bonus options grouped by shape, best first.
#[derive(Clone, Debug, Default)]
pub struct RackBonusFeed {
    three: Vec<RackBonusOption>,
    four: Vec<RackBonusOption>,
}

impl RackBonusFeed {
    /// Sorts the options of each shape by bonus descending.
    ///
    /// The sort is stable: equal bonuses keep their feed order.
    pub fn new(options: impl IntoIterator<Item = RackBonusOption>) -> Self {
        let mut feed = Self::default();
        for option in options {
            match option.height {
                RackHeight::Three => feed.three.push(option),
                RackHeight::Four => feed.four.push(option),
            }
        }
        feed.three.sort_by(|a, b| b.bonus_percent.cmp(&a.bonus_percent));
        feed.four.sort_by(|a, b| b.bonus_percent.cmp(&a.bonus_percent));
        feed
    }

    /// Ranked options of one shape.
    pub fn options(&self, height: RackHeight) -> &[RackBonusOption] {
        match height {
            RackHeight::Three => &self.three,
            RackHeight::Four => &self.four,
        }
    }

    /// Commits the `count` best racks of one shape.
    ///
    /// Missing racks are padded with `fallback` and the shape's default name.
    pub fn commit(&self, height: RackHeight, count: u32, fallback: i64) -> Vec<CommittedRack> {
        let available = self.options(height);
        let mut racks: Vec<CommittedRack> = available
            .iter()
            .take(count as usize)
            .map(|option| CommittedRack {
                height,
                bonus_percent: option.bonus_percent,
                name: option
                    .name
                    .clone()
                    .unwrap_or_else(|| height.default_name().to_string()),
                from_inventory: true,
            })
            .collect();

        let missing = (count as usize).saturating_sub(racks.len());
        if missing > 0 {
            debug!(
                height = %height,
                requested = count,
                available = available.len(),
                fallback,
                "padding rack bonuses with fallback"
            );
        }
        racks.extend((0..missing).map(|_| CommittedRack {
            height,
            bonus_percent: fallback,
            name: height.default_name().to_string(),
            from_inventory: false,
        }));
        racks
    }
}

/// The best selection found for one split of the rack budget.
#[derive(Clone, Debug, PartialEq)]
pub struct RackMixCandidate {
    pub r3: u32,
    pub r4: u32,
    pub capacity_units: u32,
    pub state: SelectionState,
    pub avg_rack_bonus: i64,
    pub final_power: f64,
    /// Committed racks in creation order: all three-floor racks first.
    pub racks: Vec<CommittedRack>,
}

impl RackMixCandidate {
    /// Number of racks in the mix.
    pub fn total_racks(&self) -> u32 {
        self.r3 + self.r4
    }
}

/// Unit-slots offered by a rack mix.
pub fn capacity_units(r3: u32, r4: u32) -> u32 {
    r3 * RackHeight::Three.units() + r4 * RackHeight::Four.units()
}

/// Integer mean of the committed rack bonuses, truncated toward zero.
fn average_rack_bonus(racks: &[CommittedRack]) -> i64 {
    if racks.is_empty() {
        return 0;
    }
    let sum: i64 = racks.iter().map(|r| r.bonus_percent).sum();
    sum / racks.len() as i64
}

/// Evaluates a single split of the rack budget.
///
/// # Parameters
/// * `table` - Selection table built for at least `capacity_units(r3, r4)`
/// * `feed` - Ranked rack bonus options
/// * `r3` / `r4` - Number of racks per shape
/// * `config` - Supplies the fallback bonuses
///
/// # Returns
/// `None` only if the table holds no state within capacity.
pub fn evaluate_trial(
    table: &SelectionTable,
    feed: &RackBonusFeed,
    r3: u32,
    r4: u32,
    config: &PlannerConfig,
) -> Option<RackMixCandidate> {
    let capacity = capacity_units(r3, r4);

    let mut racks = Vec::with_capacity((r3 + r4) as usize);
    for (height, count) in [(RackHeight::Three, r3), (RackHeight::Four, r4)] {
        racks.extend(feed.commit(height, count, config.fallback_for(height)));
    }
    let avg_rack_bonus = average_rack_bonus(&racks);

    let mut best: Option<(f64, &SelectionState)> = None;
    for state in table.states_within(capacity) {
        let power = state.final_power(avg_rack_bonus);
        if best.is_none_or(|(current, _)| power > current) {
            best = Some((power, state));
        }
    }

    best.map(|(final_power, state)| RackMixCandidate {
        r3,
        r4,
        capacity_units: capacity,
        state: state.clone(),
        avg_rack_bonus,
        final_power,
        racks,
    })
}

/// Evaluates every split `r3 in 0..=rack_budget`, returned in `r3` order.
pub fn evaluate_trials(
    table: &SelectionTable,
    feed: &RackBonusFeed,
    rack_budget: u32,
    config: &PlannerConfig,
) -> Vec<RackMixCandidate> {
    let trial = |r3: u32| evaluate_trial(table, feed, r3, rack_budget - r3, config);

    let results: Vec<Option<RackMixCandidate>> = if config.parallel_trials {
        (0..=rack_budget).into_par_iter().map(trial).collect()
    } else {
        (0..=rack_budget).map(trial).collect()
    };
    results.into_iter().flatten().collect()
}

/// Ranks trials by final power, best first, keeping at most `top_n`.
///
/// Equal final powers keep their input order (lower `r3` first).
pub fn rank_candidates(
    mut candidates: Vec<RackMixCandidate>,
    top_n: usize,
) -> Vec<RackMixCandidate> {
    candidates.sort_by(|a, b| b.final_power.total_cmp(&a.final_power));
    candidates.truncate(top_n);
    candidates
}

/// Evaluates and ranks all rack mixes.
///
/// `on_trial` sees every evaluated trial in `r3` order before ranking.
pub fn search_rack_mixes(
    table: &SelectionTable,
    feed: &RackBonusFeed,
    rack_budget: u32,
    config: &PlannerConfig,
    mut on_trial: impl FnMut(&RackMixCandidate),
) -> Vec<RackMixCandidate> {
    let trials = evaluate_trials(table, feed, rack_budget, config);
    for trial in &trials {
        on_trial(trial);
    }
    debug!(trials = trials.len(), rack_budget, "rack mixes evaluated");
    rank_candidates(trials, config.top_n)
}
