//! World engine for a vintage toy-train simulation
//!
//! Parses the original game's binary saves and per-object `.dat` resources,
//! rebuilds the tile world of placed objects, and drives trains along the
//! piecewise-linear track paths those resources define.
//!
//!   data/   — `.dat` resource parsing and the shared template store
//!   world/  — placed objects, the tile-occupancy query, save loading, trains
//!   config  — reverse-engineered tuning constants

pub mod config;
pub mod data;
pub mod world;
