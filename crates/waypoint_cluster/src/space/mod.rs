//! # Space role
//!
//! Space processes host the authoritative worlds:
//!
//! - [`WorldOperator`] creates worlds on request and announces them
//! - [`World`] holds the players of one world instance
//! - [`WorldGather`] sums the online counts of the local worlds and reports them to
//!   game processes and the app manager

mod gather;
mod operator;
mod world;

pub use gather::{GatherInit, WorldGather};
pub use operator::{OperatorInit, WorldOperator};
pub use world::{World, WorldInit};
