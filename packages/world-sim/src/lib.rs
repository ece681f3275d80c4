//! # world-sim
//!
//! Deterministic world-state simulator for the Fieldlapse replay pipeline.
//!
//! Feed the normalized action log through [`WorldModel::process_action`] in
//! timestamp order and read back [`WorldModel::snapshot`] whenever a frame is
//! due. The model maintains the set of portals, links, and control fields
//! visible on the map, enforcing planarity (no interior link crossings),
//! ownership, and field-dependency invariants on every step.
//!
//! Replaying the same action log against a fresh model always yields the
//! same sequence of states — all internal collections iterate in a fixed
//! order and nothing here consults the clock.

pub mod geometry;
pub mod world;

pub use geometry::{cross, segments_properly_intersect, LatLng};
pub use world::WorldModel;
