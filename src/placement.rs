//! Greedy assignment of selected miners to concrete rack floors.
//!
//! Miners are placed heaviest first. Each one goes to the floor of the rack
//! that carries the most raw power after placing it, so power is clustered on
//! as few racks as possible rather than balanced across them.

use std::cmp::Ordering;

use tracing::{debug, warn};

use crate::model::{FLOOR_CAPACITY, ItemGroup, RackHeight};
use crate::optimizer::PlanEvent;
use crate::rack_mix::CommittedRack;
use crate::selection::SelectionState;

/// A single physical miner expanded from a selected group.
#[derive(Clone, Debug, PartialEq)]
pub struct ItemInstance {
    pub group: usize,
    pub name: String,
    pub level: i64,
    pub power: f64,
    pub width: u32,
    pub bonus_percent: i64,
}

/// A miner placed on a rack floor.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacedItem {
    pub instance: ItemInstance,
    pub floor: usize,
}

/// A rack being filled by the placement heuristic.
///
/// # Fields
/// * `height` - Shape of the rack
/// * `name` - Display name taken from the committed rack
/// * `bonus_percent` - Rack bonus the rack was committed with
/// * `floors` - Free unit-slots per floor, bottom to top
/// * `placed` - Miners in placement order
/// * `raw_power` - Sum of the power of all placed miners
#[derive(Clone, Debug, PartialEq)]
pub struct PhysicalRack {
    pub height: RackHeight,
    pub name: String,
    pub bonus_percent: i64,
    pub floors: Vec<u32>,
    pub placed: Vec<PlacedItem>,
    pub raw_power: f64,
}

impl PhysicalRack {
    /// Creates an empty rack with every floor free.
    pub fn new(height: RackHeight, name: impl Into<String>, bonus_percent: i64) -> Self {
        Self {
            height,
            name: name.into(),
            bonus_percent,
            floors: vec![FLOOR_CAPACITY; height.floors() as usize],
            placed: Vec::new(),
            raw_power: 0.0,
        }
    }

    /// Creates the rack for a committed rack of a rack mix.
    pub fn from_committed(rack: &CommittedRack) -> Self {
        Self::new(rack.height, rack.name.clone(), rack.bonus_percent)
    }

    /// Index of the first floor with room for `width` slots.
    pub fn first_free_floor(&self, width: u32) -> Option<usize> {
        self.floors.iter().position(|&free| free >= width)
    }

    /// Places an instance on a floor. The caller checks the free capacity.
    fn place(&mut self, instance: ItemInstance, floor: usize) {
        self.floors[floor] -= instance.width;
        self.raw_power += instance.power;
        self.placed.push(PlacedItem { instance, floor });
    }

    /// Number of placed miners.
    pub fn item_count(&self) -> usize {
        self.placed.len()
    }

    /// Occupied unit-slots over all floors.
    pub fn used_units(&self) -> u32 {
        self.height.units() - self.floors.iter().sum::<u32>()
    }
}

/// Outcome of the placement heuristic.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlacementResult {
    /// Racks ordered by raw power, highest first.
    pub racks: Vec<PhysicalRack>,
    /// Instances for which no floor had enough room.
    pub overflow: Vec<ItemInstance>,
}

impl PlacementResult {
    /// Gives whether every selected miner was placed.
    pub fn is_complete(&self) -> bool {
        self.overflow.is_empty()
    }

    /// Number of placed miners over all racks.
    pub fn placed_count(&self) -> usize {
        self.racks.iter().map(PhysicalRack::item_count).sum()
    }
}

/// Expands the selection into one instance per chosen miner, by group index.
pub fn expand_selection(selection: &SelectionState, groups: &[ItemGroup]) -> Vec<ItemInstance> {
    let mut instances = Vec::with_capacity(selection.item_count() as usize);
    for choice in &selection.choice {
        let Some(group) = groups.get(choice.group) else {
            warn!(group = choice.group, "selection refers to an unknown group");
            continue;
        };
        for _ in 0..choice.count {
            instances.push(ItemInstance {
                group: choice.group,
                name: group.name.clone(),
                level: group.level,
                power: group.power,
                width: group.width,
                bonus_percent: group.bonus_percent,
            });
        }
    }
    instances
}

/// Places the selection into the committed racks.
///
/// See [`assign_to_racks_with_progress`].
pub fn assign_to_racks(
    selection: &SelectionState,
    groups: &[ItemGroup],
    committed: &[CommittedRack],
) -> PlacementResult {
    assign_to_racks_with_progress(selection, groups, committed, |_| {})
}

/// Places the selection into the committed racks and reports each step.
///
/// Racks are created in the order of `committed`. Instances are handled by
/// power descending; for each one every `(rack, floor)` pair with enough free
/// slots is considered and the pair whose rack has the highest raw power after
/// placement wins. Ties keep the lowest rack index, then the lowest floor.
/// Instances without a valid pair are skipped into the overflow list.
///
/// # Parameters
/// * `selection` - Winning selection of the rack-mix search
/// * `groups` - Groups the selection refers to
/// * `committed` - Racks of the winning mix, three-floor racks first
/// * `on_event` - Receives `ItemPlaced` / `ItemOverflow` events
pub fn assign_to_racks_with_progress(
    selection: &SelectionState,
    groups: &[ItemGroup],
    committed: &[CommittedRack],
    mut on_event: impl FnMut(&PlanEvent),
) -> PlacementResult {
    let mut racks: Vec<PhysicalRack> = committed
        .iter()
        .map(PhysicalRack::from_committed)
        .collect();

    // Heaviest first; equal powers keep group order
    let mut instances = expand_selection(selection, groups);
    instances.sort_by(|a, b| b.power.partial_cmp(&a.power).unwrap_or(Ordering::Equal));

    let mut overflow = Vec::new();

    for instance in instances {
        let mut target: Option<(usize, usize, f64)> = None;

        for (rack_idx, rack) in racks.iter().enumerate() {
            let Some(floor) = rack.first_free_floor(instance.width) else {
                continue;
            };
            let after = rack.raw_power + instance.power;
            if target.is_none_or(|(_, _, best)| after > best) {
                target = Some((rack_idx, floor, after));
            }
        }

        match target {
            Some((rack_idx, floor, rack_power)) => {
                on_event(&PlanEvent::ItemPlaced {
                    rack: rack_idx,
                    rack_name: racks[rack_idx].name.clone(),
                    floor,
                    name: instance.name.clone(),
                    power: instance.power,
                    width: instance.width,
                    rack_power,
                });
                racks[rack_idx].place(instance, floor);
            }
            None => {
                warn!(
                    name = %instance.name,
                    width = instance.width,
                    power = instance.power,
                    "no rack floor left for miner"
                );
                on_event(&PlanEvent::ItemOverflow {
                    name: instance.name.clone(),
                    power: instance.power,
                    width: instance.width,
                });
                overflow.push(instance);
            }
        }
    }

    racks.sort_by(|a, b| {
        b.raw_power
            .partial_cmp(&a.raw_power)
            .unwrap_or(Ordering::Equal)
    });

    debug!(
        racks = racks.len(),
        placed = racks.iter().map(PhysicalRack::item_count).sum::<usize>(),
        overflow = overflow.len(),
        "placement finished"
    );

    PlacementResult { racks, overflow }
}
