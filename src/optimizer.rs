//! End-to-end layout optimization.
//!
//! The pipeline runs leaf stages in a fixed order:
//! grouping → selection table → rack-mix search → placement → layout.
//! The selection table is built once for the full rack budget and shared by
//! every rack-mix trial.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::grouping::group_items;
use crate::layout::{CandidateSummary, Layout};
use crate::model::{ItemRecord, RackBonusOption, RackHeight, ValidationError, validate_bonus};
use crate::placement::assign_to_racks_with_progress;
use crate::rack_mix::{RackBonusFeed, capacity_units, search_rack_mixes};
use crate::report::{AggregateReport, aggregate};
use crate::selection::SelectionTable;

/// Tunable parameters of the optimizer.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannerConfig {
    /// Number of ranked rack mixes kept
    pub top_n: usize,
    /// Bonus of a 3-floor rack the inventory does not provide
    pub rack3_fallback: i64,
    /// Bonus of a 4-floor rack the inventory does not provide
    pub rack4_fallback: i64,
    /// Largest rack budget accepted; bounds the size of the selection table
    pub max_rack_budget: u32,
    /// Evaluate rack-mix trials on the rayon pool
    pub parallel_trials: bool,
}

impl PlannerConfig {
    pub const DEFAULT_TOP_N: usize = 10;
    pub const DEFAULT_RACK3_FALLBACK: i64 = 0;
    pub const DEFAULT_RACK4_FALLBACK: i64 = 0;
    pub const DEFAULT_MAX_RACK_BUDGET: u32 = 256;
    pub const DEFAULT_PARALLEL_TRIALS: bool = true;

    /// Creates a builder for a custom configuration.
    pub fn builder() -> PlannerConfigBuilder {
        PlannerConfigBuilder::default()
    }

    /// Fallback bonus for racks of `height`.
    pub fn fallback_for(&self, height: RackHeight) -> i64 {
        match height {
            RackHeight::Three => self.rack3_fallback,
            RackHeight::Four => self.rack4_fallback,
        }
    }

    /// Rejects configurations that could never produce a result.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.top_n == 0 {
            return Err(ValidationError::InvalidConfiguration(
                "top_n must be at least 1".to_string(),
            ));
        }
        validate_bonus(self.rack3_fallback, "rack3_fallback")?;
        validate_bonus(self.rack4_fallback, "rack4_fallback")?;
        Ok(())
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            top_n: Self::DEFAULT_TOP_N,
            rack3_fallback: Self::DEFAULT_RACK3_FALLBACK,
            rack4_fallback: Self::DEFAULT_RACK4_FALLBACK,
            max_rack_budget: Self::DEFAULT_MAX_RACK_BUDGET,
            parallel_trials: Self::DEFAULT_PARALLEL_TRIALS,
        }
    }
}

/// Builder for [`PlannerConfig`].
#[derive(Clone, Debug, Default)]
pub struct PlannerConfigBuilder {
    config: PlannerConfig,
}

impl PlannerConfigBuilder {
    pub fn top_n(mut self, top_n: usize) -> Self {
        self.config.top_n = top_n;
        self
    }

    pub fn rack3_fallback(mut self, bonus_percent: i64) -> Self {
        self.config.rack3_fallback = bonus_percent;
        self
    }

    pub fn rack4_fallback(mut self, bonus_percent: i64) -> Self {
        self.config.rack4_fallback = bonus_percent;
        self
    }

    pub fn max_rack_budget(mut self, racks: u32) -> Self {
        self.config.max_rack_budget = racks;
        self
    }

    pub fn parallel_trials(mut self, enabled: bool) -> Self {
        self.config.parallel_trials = enabled;
        self
    }

    /// Creates the final configuration.
    pub fn build(self) -> PlannerConfig {
        self.config
    }
}

/// Progress events of an optimizer run, suitable for live streaming.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum PlanEvent {
    /// The selection table is ready.
    TableBuilt {
        groups: usize,
        max_units: u32,
        states: usize,
    },
    /// One split of the rack budget was evaluated. Sent in `r3` order.
    TrialEvaluated {
        r3: u32,
        r4: u32,
        capacity_units: u32,
        avg_rack_bonus: i64,
        final_power: f64,
    },
    /// A miner was placed on a rack floor.
    ///
    /// `rack` indexes the racks in creation order (3-floor racks first), not
    /// the final layout, whose racks are reordered by raw power afterwards.
    ItemPlaced {
        rack: usize,
        rack_name: String,
        floor: usize,
        name: String,
        power: f64,
        width: u32,
        rack_power: f64,
    },
    /// No floor had room for a selected miner.
    ItemOverflow { name: String, power: f64, width: u32 },
    /// Optimization finished.
    Finished {
        final_power: f64,
        racks: usize,
        placed: usize,
        overflow: usize,
    },
}

/// Everything one optimizer run needs besides configuration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlanningInput {
    pub items: Vec<ItemRecord>,
    pub rack_bonuses: Vec<RackBonusOption>,
    pub rack_budget: u32,
}

impl PlanningInput {
    pub fn new(
        items: Vec<ItemRecord>,
        rack_bonuses: Vec<RackBonusOption>,
        rack_budget: u32,
    ) -> Self {
        Self {
            items,
            rack_bonuses,
            rack_budget,
        }
    }
}

/// Result of an optimizer run.
///
/// # Fields
/// * `layout` - Placement of the winning rack mix
/// * `alternatives` - Ranked rack mixes, the winner first
/// * `aggregates` - Upper bounds over the whole inventory
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    pub layout: Layout,
    pub alternatives: Vec<CandidateSummary>,
    pub aggregates: AggregateReport,
}

/// Optimizes with the given configuration.
///
/// See [`optimize_with_progress`].
pub fn optimize(
    input: &PlanningInput,
    config: &PlannerConfig,
) -> Result<OptimizationOutcome, ValidationError> {
    optimize_with_progress(input, config, |_| {})
}

/// Optimizes and reports every step through `on_event`.
///
/// An empty inventory or a rack budget of zero is not an error; the layout
/// then carries a final power of zero.
///
/// # Errors
/// Returns a `ValidationError` for invalid miners or rack bonuses, a rack budget above
/// `config.max_rack_budget` or an unusable configuration. Nothing is computed
/// in that case.
pub fn optimize_with_progress(
    input: &PlanningInput,
    config: &PlannerConfig,
    mut on_event: impl FnMut(&PlanEvent),
) -> Result<OptimizationOutcome, ValidationError> {
    config.validate()?;
    if input.rack_budget > config.max_rack_budget {
        return Err(ValidationError::InvalidRackBudget(format!(
            "rack budget {} exceeds the limit of {}",
            input.rack_budget, config.max_rack_budget
        )));
    }

    for option in &input.rack_bonuses {
        option.validate()?;
    }
    let groups = group_items(&input.items)?;
    let max_units = capacity_units(0, input.rack_budget);
    let table = SelectionTable::build(&groups, max_units);
    on_event(&PlanEvent::TableBuilt {
        groups: groups.len(),
        max_units,
        states: table.state_count(),
    });
    debug!(
        groups = groups.len(),
        max_units,
        states = table.state_count(),
        "selection table built"
    );

    let feed = RackBonusFeed::new(input.rack_bonuses.iter().cloned());
    let ranked = search_rack_mixes(&table, &feed, input.rack_budget, config, |trial| {
        on_event(&PlanEvent::TrialEvaluated {
            r3: trial.r3,
            r4: trial.r4,
            capacity_units: trial.capacity_units,
            avg_rack_bonus: trial.avg_rack_bonus,
            final_power: trial.final_power,
        });
    });
    let aggregates = aggregate(&table, &groups);

    let layout = match ranked.first() {
        Some(best) => {
            let padded = best.racks.iter().filter(|r| !r.from_inventory).count();
            debug!(r3 = best.r3, r4 = best.r4, padded, "committing best rack mix");
            let placement =
                assign_to_racks_with_progress(&best.state, &groups, &best.racks, &mut on_event);
            if !placement.is_complete() {
                warn!(
                    overflow = placement.overflow.len(),
                    "selected miners did not all fit the committed racks"
                );
            }
            Layout::build(input.rack_budget, best, &placement)
        }
        None => Layout::empty(input.rack_budget),
    };

    on_event(&PlanEvent::Finished {
        final_power: layout.best_candidate.final_power,
        racks: layout.racks.len(),
        placed: layout.placed_count(),
        overflow: layout.overflow.len(),
    });

    info!(
        rack_budget = input.rack_budget,
        r3 = layout.best_candidate.r3,
        r4 = layout.best_candidate.r4,
        final_power = layout.best_candidate.final_power,
        placed = layout.placed_count(),
        overflow = layout.overflow.len(),
        "optimization finished"
    );
    for line in layout.summary_lines() {
        info!("{}", line);
    }

    Ok(OptimizationOutcome {
        layout,
        alternatives: ranked.iter().map(CandidateSummary::from).collect(),
        aggregates,
    })
}
