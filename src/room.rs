//! Room capacity and power of an existing room.
//!
//! Each unlocked room level adds a fixed number of rack places; the rack
//! budget of a room level is the sum over all levels up to it.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use utoipa::ToSchema;

use crate::model::{BONUS_SCALE, ItemRecord, ValidationError, validate_bonus};

/// Rack places added by the first room level.
pub const FIRST_ROOM_RACKS: u32 = 12;

/// Rack places added by every further room level.
pub const ROOM_RACKS: u32 = 18;

/// Highest known room level.
pub const MAX_ROOM_LEVEL: u8 = 3;

/// Rack places added by one room level.
pub fn racks_for_level(level: u8) -> u32 {
    if level == 0 {
        FIRST_ROOM_RACKS
    } else {
        ROOM_RACKS
    }
}

/// Rack budget with every level up to `level` unlocked.
///
/// # Examples
/// ```
/// use rack_planner::room::rack_budget_for_room_level;
///
/// assert_eq!(rack_budget_for_room_level(0), 12);
/// assert_eq!(rack_budget_for_room_level(3), 66);
/// ```
pub fn rack_budget_for_room_level(level: u8) -> u32 {
    (0..=level).map(racks_for_level).sum()
}

/// A rack of an existing room with the miners placed on it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "name": "Golden Rack",
    "bonus_percent": 300,
    "items": [{ "name": "Antminer", "level": 1, "power": 1200.0, "width": 2, "bonus_percent": 150 }]
}))]
pub struct RoomRack {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bonus_percent: i64,
    #[serde(default)]
    pub items: Vec<ItemRecord>,
}

/// Power breakdown of a room.
///
/// # Fields
/// * `raw_power` - Sum of all miner power
/// * `miner_bonus_percent` - Sum of unique miner bonuses
/// * `miner_bonus_power` - `raw_power` scaled by the miner bonus
/// * `rack_bonus_power` - Sum of each rack's raw power scaled by its own bonus
/// * `final_power` - Raw power plus both bonus powers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RoomPower {
    pub raw_power: f64,
    pub miner_bonus_percent: i64,
    pub miner_bonus_power: f64,
    pub rack_bonus_power: f64,
    pub final_power: f64,
    pub miner_count: usize,
}

/// Computes the power of a room from its racks.
///
/// A miner bonus is counted once per `(name, level)`, taken from the first
/// miner seen with that key. Rack bonuses only scale the power of the miners
/// on that rack.
///
/// # Errors
/// Returns a `ValidationError` for miners with invalid power, width or bonus,
/// or for a rack bonus outside the accepted range.
pub fn evaluate(racks: &[RoomRack]) -> Result<RoomPower, ValidationError> {
    let mut raw_power = 0.0;
    let mut rack_bonus_power = 0.0;
    let mut miner_bonus_percent = 0;
    let mut miner_count = 0;
    let mut seen: HashSet<(&str, i64)> = HashSet::new();

    for rack in racks {
        validate_bonus(rack.bonus_percent, rack.name.as_deref().unwrap_or("rack"))?;
        let mut rack_raw = 0.0;
        for item in &rack.items {
            item.validate()?;
            rack_raw += item.power;
            miner_count += 1;
            if seen.insert(item.bonus_key()) {
                miner_bonus_percent += item.bonus_percent;
            }
        }
        raw_power += rack_raw;
        rack_bonus_power += rack_raw * (rack.bonus_percent as f64 / BONUS_SCALE);
    }

    let miner_bonus_power = raw_power * (miner_bonus_percent as f64 / BONUS_SCALE);
    Ok(RoomPower {
        raw_power,
        miner_bonus_percent,
        miner_bonus_power,
        rack_bonus_power,
        final_power: raw_power + miner_bonus_power + rack_bonus_power,
        miner_count,
    })
}
