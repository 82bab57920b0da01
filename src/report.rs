//! Global upper bounds and display helpers.
//!
//! The bounds ignore the rack mix entirely and are only meant for comparison
//! with the optimized layout.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::ItemGroup;
use crate::selection::SelectionTable;

/// Upper bounds over the whole inventory.
///
/// # Fields
/// * `max_units` - Slot budget the bounds were computed for
/// * `max_raw_power` - Highest raw power reachable, bonuses ignored
/// * `max_unique_bonus` - Highest sum of unique miner bonuses, power ignored
/// * `max_item_count` - Most miners that fit by width alone
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AggregateReport {
    pub max_units: u32,
    pub max_raw_power: f64,
    pub max_unique_bonus: i64,
    pub max_item_count: u64,
}

/// Highest raw power anywhere in the table.
pub fn max_raw_power(table: &SelectionTable) -> f64 {
    table
        .states_within(table.max_units())
        .map(|s| s.raw_power)
        .fold(0.0, f64::max)
}

/// Highest unique bonus total anywhere in the table.
pub fn max_unique_bonus(table: &SelectionTable) -> i64 {
    table
        .states_within(table.max_units())
        .map(|s| s.bonus_total)
        .max()
        .unwrap_or(0)
        .max(0)
}

/// Most miners that fit into `max_units` slots, narrowest first.
///
/// Power and bonus play no role; this is a different objective from the
/// final power optimized by the rack-mix search.
pub fn max_item_count(groups: &[ItemGroup], max_units: u32) -> u64 {
    let mut by_width: Vec<(u32, u64)> = Vec::new();
    for group in groups {
        match by_width.iter_mut().find(|(w, _)| *w == group.width) {
            Some((_, count)) => *count += u64::from(group.count),
            None => by_width.push((group.width, u64::from(group.count))),
        }
    }
    by_width.sort_by_key(|(width, _)| *width);

    let mut remaining = u64::from(max_units);
    let mut total = 0;
    for (width, available) in by_width {
        if remaining == 0 {
            break;
        }
        let fit = available.min(remaining / u64::from(width));
        total += fit;
        remaining -= fit * u64::from(width);
    }
    total
}

/// Computes all bounds from a table built at the largest capacity.
pub fn aggregate(table: &SelectionTable, groups: &[ItemGroup]) -> AggregateReport {
    AggregateReport {
        max_units: table.max_units(),
        max_raw_power: max_raw_power(table),
        max_unique_bonus: max_unique_bonus(table),
        max_item_count: max_item_count(groups, table.max_units()),
    }
}

/// Formats raw power with the largest fitting unit, starting at Gh/s.
///
/// # Examples
/// ```
/// use rack_planner::report::format_power;
///
/// assert_eq!(format_power(999.0), "999.00 Gh/s");
/// assert_eq!(format_power(1_500_000.0), "1.50 Ph/s");
/// ```
pub fn format_power(power: f64) -> String {
    const UNITS: [&str; 5] = ["Gh/s", "Th/s", "Ph/s", "Eh/s", "Zh/s"];
    let mut value = power;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

/// Formats a bonus given in hundredths of a percent.
///
/// Whole percentages drop the decimals: `4500` → `"45%"`, `1050` → `"10.50%"`.
pub fn format_bonus(bonus_percent: i64) -> String {
    if bonus_percent % 100 == 0 {
        format!("{}%", bonus_percent / 100)
    } else {
        format!("{:.2}%", bonus_percent as f64 / 100.0)
    }
}
