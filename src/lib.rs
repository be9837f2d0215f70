//! Guillotine cutting-stock optimizer for rectangular sheet material.
//!
//! Pieces are cut from caller-supplied leftover sheets first and from fresh
//! stock of a configured base size afterwards. Every layout can be produced
//! with straight edge-to-edge cuts.

pub mod api;
pub mod config;
pub mod geometry;
pub mod heuristics;
pub mod model;
pub mod optimizer;
pub mod packer;
pub mod processor;
pub mod types;
