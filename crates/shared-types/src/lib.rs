//! # Shared Types Crate
//!
//! Domain entities shared across the Valence subsystem crates.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: cross-subsystem identity types (`Address`,
//!   `NodeId`, `Timestamp`) are defined here and nowhere else.
//! - **No crypto here**: key recovery and address derivation live in
//!   `shared-crypto`; this crate only carries the derived values.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entities;
pub mod enode;

pub use entities::{Address, Hash, Timestamp, Version};
pub use enode::{EnodeUrlError, Node, NodeId};
