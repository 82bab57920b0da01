//! Serializable layout produced by one optimizer run.
//!
//! The structure is plain data so that external reporting can store or render
//! it in any format; serializing and deserializing it loses nothing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use utoipa::ToSchema;

use crate::model::RackHeight;
use crate::placement::{ItemInstance, PhysicalRack, PlacementResult};
use crate::rack_mix::RackMixCandidate;
use crate::report::{format_bonus, format_power};

/// Summary of a rack-mix candidate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "r3": 0,
    "r4": 1,
    "total_racks": 1,
    "final_power": 432.0,
    "raw_power": 400.0,
    "bonus_total": 500,
    "used_width": 7,
    "capacity_units": 8,
    "avg_rack_bonus": 300
}))]
pub struct CandidateSummary {
    pub r3: u32,
    pub r4: u32,
    pub total_racks: u32,
    pub final_power: f64,
    pub raw_power: f64,
    pub bonus_total: i64,
    pub used_width: u32,
    pub capacity_units: u32,
    pub avg_rack_bonus: i64,
}

impl CandidateSummary {
    /// Summary of a run without any rack.
    pub fn empty() -> Self {
        Self {
            r3: 0,
            r4: 0,
            total_racks: 0,
            final_power: 0.0,
            raw_power: 0.0,
            bonus_total: 0,
            used_width: 0,
            capacity_units: 0,
            avg_rack_bonus: 0,
        }
    }
}

impl From<&RackMixCandidate> for CandidateSummary {
    fn from(candidate: &RackMixCandidate) -> Self {
        Self {
            r3: candidate.r3,
            r4: candidate.r4,
            total_racks: candidate.total_racks(),
            final_power: candidate.final_power,
            raw_power: candidate.state.raw_power,
            bonus_total: candidate.state.bonus_total,
            used_width: candidate.state.used_width,
            capacity_units: candidate.capacity_units,
            avg_rack_bonus: candidate.avg_rack_bonus,
        }
    }
}

/// A miner in the layout. `floor` is `None` for overflow entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LayoutItem {
    pub name: String,
    pub level: i64,
    pub power: f64,
    pub width: u32,
    pub bonus_percent: i64,
    #[serde(default)]
    pub floor: Option<usize>,
}

impl LayoutItem {
    fn from_instance(instance: &ItemInstance, floor: Option<usize>) -> Self {
        Self {
            name: instance.name.clone(),
            level: instance.level,
            power: instance.power,
            width: instance.width,
            bonus_percent: instance.bonus_percent,
            floor,
        }
    }
}

/// One rack of the layout with its miners in placement order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RackLayout {
    #[schema(value_type = u8, example = 4)]
    pub height: RackHeight,
    pub name: String,
    pub bonus_percent: i64,
    pub items: Vec<LayoutItem>,
    pub raw_power: f64,
    pub item_count: usize,
    /// Free unit-slots per floor, bottom to top.
    pub free_slots: Vec<u32>,
}

impl From<&PhysicalRack> for RackLayout {
    fn from(rack: &PhysicalRack) -> Self {
        Self {
            height: rack.height,
            name: rack.name.clone(),
            bonus_percent: rack.bonus_percent,
            items: rack
                .placed
                .iter()
                .map(|p| LayoutItem::from_instance(&p.instance, Some(p.floor)))
                .collect(),
            raw_power: rack.raw_power,
            item_count: rack.item_count(),
            free_slots: rack.floors.clone(),
        }
    }
}

/// The optimizer's output.
///
/// # Fields
/// * `capacity` - Rack budget of the run
/// * `best_candidate` - Winning rack mix
/// * `selection` - Group index → number of chosen miners
/// * `racks` - Racks ordered by raw power, highest first
/// * `overflow` - Selected miners no floor had room for
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Layout {
    pub capacity: u32,
    pub best_candidate: CandidateSummary,
    pub selection: BTreeMap<usize, u32>,
    pub racks: Vec<RackLayout>,
    #[serde(default)]
    pub overflow: Vec<LayoutItem>,
}

impl Layout {
    /// Assembles the layout of the winning candidate.
    pub fn build(capacity: u32, candidate: &RackMixCandidate, placement: &PlacementResult) -> Self {
        Self {
            capacity,
            best_candidate: CandidateSummary::from(candidate),
            selection: candidate.state.choice_map(),
            racks: placement.racks.iter().map(RackLayout::from).collect(),
            overflow: placement
                .overflow
                .iter()
                .map(|instance| LayoutItem::from_instance(instance, None))
                .collect(),
        }
    }

    /// Layout of a run that produced no candidate.
    pub fn empty(capacity: u32) -> Self {
        Self {
            capacity,
            best_candidate: CandidateSummary::empty(),
            selection: BTreeMap::new(),
            racks: Vec::new(),
            overflow: Vec::new(),
        }
    }

    /// Number of placed miners over all racks.
    pub fn placed_count(&self) -> usize {
        self.racks.iter().map(|r| r.item_count).sum()
    }

    /// Human-readable lines: one header per rack, then its miners by power.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for (i, rack) in self.racks.iter().enumerate() {
            let label = if rack.name.is_empty() {
                format!("Rack #{}", i + 1)
            } else {
                format!("Rack #{} ({})", i + 1, rack.name)
            };
            lines.push(format!(
                "{}: height={}, raw={}, miners={}",
                label,
                rack.height,
                format_power(rack.raw_power),
                rack.item_count
            ));

            let mut items: Vec<&LayoutItem> = rack.items.iter().collect();
            items.sort_by(|a, b| b.power.total_cmp(&a.power));
            for item in items {
                lines.push(format!(
                    "  - {} lv{} power={} width={} bonus={}",
                    item.name,
                    item.level,
                    format_power(item.power),
                    item.width,
                    format_bonus(item.bonus_percent)
                ));
            }
        }
        lines
    }
}
