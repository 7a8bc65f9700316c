//! Core traits for the mydyns system
//!
//! - [`UpdateDispatcher`]: Apply a coalesced batch of record changes

pub mod dispatcher;

pub use dispatcher::{UpdateBatch, UpdateDispatcher};
