//! Data models for the rack layout optimizer.
//!
//! This module defines the fundamental data structures shared by every stage:
//! - `ItemRecord`: A single miner from the inventory feed
//! - `ItemGroup`: Identical miners collapsed into one entry with a multiplicity
//! - `RackHeight`: The two interchangeable rack shapes
//! - `RackBonusOption`: A bonus offered by one owned rack of a given shape

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

/// Unit-slots available on a single rack floor.
pub const FLOOR_CAPACITY: u32 = 2;

/// Bonus values are expressed in hundredths of a percent (`300` = 3%).
pub const BONUS_SCALE: f64 = 10_000.0;

/// Largest accepted magnitude of a single bonus (10 000 000%).
///
/// Bonus totals are summed as `i64` over groups and racks; with every term
/// bounded by this value no realistic input can overflow the sum.
pub const MAX_BONUS_PERCENT: i64 = 1_000_000_000;

/// Validation error for inventory and request data.
///
/// Every variant is fatal: it is raised before any optimization work starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid power: {0}")]
    InvalidPower(String),
    #[error("Invalid width: {0}")]
    InvalidWidth(String),
    #[error("Invalid bonus: {0}")]
    InvalidBonus(String),
    #[error("Invalid rack height: {0}")]
    InvalidRackHeight(String),
    #[error("Invalid rack budget: {0}")]
    InvalidRackBudget(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Helper function to validate a power value (DRY principle).
fn validate_power(value: f64, name: &str) -> Result<(), ValidationError> {
    if value < 0.0 || value.is_nan() || value.is_infinite() {
        return Err(ValidationError::InvalidPower(format!(
            "power of '{}' must be a finite non-negative number, got: {}",
            name, value
        )));
    }
    Ok(())
}

/// Helper function to validate a bonus against [`MAX_BONUS_PERCENT`].
pub(crate) fn validate_bonus(value: i64, name: &str) -> Result<(), ValidationError> {
    if !(-MAX_BONUS_PERCENT..=MAX_BONUS_PERCENT).contains(&value) {
        return Err(ValidationError::InvalidBonus(format!(
            "bonus of '{}' must lie within ±{}, got: {}",
            name, MAX_BONUS_PERCENT, value
        )));
    }
    Ok(())
}

/// Helper function to validate a slot width.
///
/// A miner wider than one floor could never be placed, so it is rejected here
/// instead of being treated as feasible by the selection step.
fn validate_width(value: u32, name: &str) -> Result<(), ValidationError> {
    if value == 0 {
        return Err(ValidationError::InvalidWidth(format!(
            "width of '{}' must be at least 1",
            name
        )));
    }
    if value > FLOOR_CAPACITY {
        return Err(ValidationError::InvalidWidth(format!(
            "width of '{}' is {}, but a floor only holds {} slots",
            name, value, FLOOR_CAPACITY
        )));
    }
    Ok(())
}

/// A single miner as supplied by the inventory feed.
///
/// # Fields
/// * `name` - Display name of the miner
/// * `level` - Upgrade level; together with `name` it forms the bonus key
/// * `power` - Raw power contributed when placed
/// * `width` - Number of unit-slots occupied on one floor
/// * `bonus_percent` - One-time bonus in hundredths of a percent
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "name": "Antminer",
    "level": 2,
    "power": 1500.0,
    "width": 2,
    "bonus_percent": 250
}))]
pub struct ItemRecord {
    pub name: String,
    #[serde(default)]
    pub level: i64,
    pub power: f64,
    pub width: u32,
    #[serde(default)]
    pub bonus_percent: i64,
}

impl ItemRecord {
    /// Creates a new ItemRecord with validation.
    ///
    /// # Examples
    /// ```
    /// use rack_planner::model::ItemRecord;
    ///
    /// assert!(ItemRecord::new("Antminer", 1, 120.0, 1, 200).is_ok());
    /// assert!(ItemRecord::new("Antminer", 1, 120.0, 3, 200).is_err());
    /// ```
    pub fn new(
        name: impl Into<String>,
        level: i64,
        power: f64,
        width: u32,
        bonus_percent: i64,
    ) -> Result<Self, ValidationError> {
        let record = Self {
            name: name.into(),
            level,
            power,
            width,
            bonus_percent,
        };
        record.validate()?;
        Ok(record)
    }

    /// Checks power and width of a record that was built without `new`
    /// (e.g. by deserialization).
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_power(self.power, &self.name)?;
        validate_width(self.width, &self.name)?;
        validate_bonus(self.bonus_percent, &self.name)?;
        Ok(())
    }

    /// Key under which the miner bonus is counted once.
    pub fn bonus_key(&self) -> (&str, i64) {
        (&self.name, self.level)
    }
}

/// Identical miners collapsed into a single entry.
///
/// Invariant: `count >= 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct ItemGroup {
    pub name: String,
    pub level: i64,
    pub power: f64,
    pub width: u32,
    pub bonus_percent: i64,
    pub count: u32,
}

impl ItemGroup {
    /// Key under which the miner bonus is counted once.
    pub fn bonus_key(&self) -> (&str, i64) {
        (&self.name, self.level)
    }
}

/// The two interchangeable rack shapes.
///
/// Serialized as the plain floor count (`3` or `4`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RackHeight {
    Three,
    Four,
}

impl RackHeight {
    /// Number of floors of this shape.
    pub const fn floors(self) -> u32 {
        match self {
            RackHeight::Three => 3,
            RackHeight::Four => 4,
        }
    }

    /// Unit-slots offered by one rack of this shape.
    pub const fn units(self) -> u32 {
        self.floors() * FLOOR_CAPACITY
    }

    /// Name used for racks without an inventory display name.
    pub const fn default_name(self) -> &'static str {
        match self {
            RackHeight::Three => "3-floor",
            RackHeight::Four => "4-floor",
        }
    }
}

impl TryFrom<u8> for RackHeight {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            3 => Ok(RackHeight::Three),
            4 => Ok(RackHeight::Four),
            other => Err(ValidationError::InvalidRackHeight(format!(
                "racks have 3 or 4 floors, got: {}",
                other
            ))),
        }
    }
}

impl From<RackHeight> for u8 {
    fn from(height: RackHeight) -> Self {
        match height {
            RackHeight::Three => 3,
            RackHeight::Four => 4,
        }
    }
}

impl std::fmt::Display for RackHeight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.floors())
    }
}

/// A bonus offered by one owned rack.
///
/// # Fields
/// * `height` - Shape of the rack (3 or 4 floors)
/// * `bonus_percent` - Rack bonus in hundredths of a percent
/// * `name` - Optional display name attached to the rack in the layout
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "height": 4, "bonus_percent": 300, "name": "Golden Rack" }))]
pub struct RackBonusOption {
    #[schema(value_type = u8, example = 4)]
    pub height: RackHeight,
    #[serde(default)]
    pub bonus_percent: i64,
    #[serde(default)]
    pub name: Option<String>,
}

impl RackBonusOption {
    /// Creates a rack bonus option.
    pub fn new(height: RackHeight, bonus_percent: i64, name: Option<String>) -> Self {
        Self {
            height,
            bonus_percent,
            name,
        }
    }

    /// Checks the bonus of an option built by deserialization.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let label = self.name.as_deref().unwrap_or(self.height.default_name());
        validate_bonus(self.bonus_percent, label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_rejects_negative_power() {
        let err = ItemRecord::new("Broken", 1, -1.0, 1, 0).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPower(_)));
    }

    #[test]
    fn record_rejects_non_finite_power() {
        assert!(ItemRecord::new("Nan", 1, f64::NAN, 1, 0).is_err());
        assert!(ItemRecord::new("Inf", 1, f64::INFINITY, 1, 0).is_err());
    }

    #[test]
    fn record_rejects_zero_and_oversized_width() {
        let zero = ItemRecord::new("Flat", 1, 10.0, 0, 0).unwrap_err();
        assert!(matches!(zero, ValidationError::InvalidWidth(_)));

        let wide = ItemRecord::new("Wide", 1, 10.0, 3, 0).unwrap_err();
        assert!(matches!(wide, ValidationError::InvalidWidth(_)));
    }

    #[test]
    fn record_accepts_zero_power() {
        assert!(ItemRecord::new("Idle", 0, 0.0, 2, 0).is_ok());
    }

    #[test]
    fn rack_height_serializes_as_floor_count() {
        let option = RackBonusOption::new(RackHeight::Four, 300, None);
        let json = serde_json::to_value(&option).unwrap();
        assert_eq!(json["height"], 4);

        let parsed: RackBonusOption =
            serde_json::from_str(r#"{"height": 3, "bonus_percent": 120}"#).unwrap();
        assert_eq!(parsed.height, RackHeight::Three);
        assert_eq!(parsed.name, None);
    }

    #[test]
    fn rack_height_rejects_unknown_floor_count() {
        let parsed = serde_json::from_str::<RackBonusOption>(r#"{"height": 5}"#);
        assert!(parsed.is_err());
        assert!(RackHeight::try_from(2).is_err());
    }

    #[test]
    fn rack_units_follow_floor_capacity() {
        assert_eq!(RackHeight::Three.units(), 6);
        assert_eq!(RackHeight::Four.units(), 8);
    }

    #[test]
    fn bonus_outside_the_accepted_range_is_rejected() {
        let huge = ItemRecord::new("Huge", 1, 10.0, 1, i64::MAX / 2 + 1).unwrap_err();
        assert!(matches!(huge, ValidationError::InvalidBonus(_)));
        assert!(ItemRecord::new("Neg", 1, 10.0, 1, i64::MIN).is_err());
        assert!(ItemRecord::new("Edge", 1, 10.0, 1, MAX_BONUS_PERCENT).is_ok());

        let rack = RackBonusOption::new(RackHeight::Four, MAX_BONUS_PERCENT + 1, None);
        let err = rack.validate().unwrap_err();
        assert!(err.to_string().contains("4-floor"));
        assert!(RackBonusOption::new(RackHeight::Three, 700, None).validate().is_ok());
    }

    #[test]
    fn item_record_defaults_level_and_bonus() {
        let record: ItemRecord =
            serde_json::from_str(r#"{"name": "Plain", "power": 5.0, "width": 1}"#).unwrap();
        assert_eq!(record.level, 0);
        assert_eq!(record.bonus_percent, 0);
    }
}
