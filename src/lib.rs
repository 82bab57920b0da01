//! Rack layout optimizer for miner inventories.
//!
//! Chooses which miners to keep and how to split a rack budget into 3-floor
//! and 4-floor racks so that the bonus-weighted power is maximal, then places
//! the chosen miners onto concrete rack floors.

pub mod api;
pub mod config;
pub mod grouping;
pub mod layout;
pub mod model;
pub mod optimizer;
pub mod placement;
pub mod rack_mix;
pub mod report;
pub mod room;
pub mod selection;
