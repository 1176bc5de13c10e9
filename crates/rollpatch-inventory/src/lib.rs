//! rollpatch-inventory: fleet inventory and host resolution
//!
//! A file-backed, group-keyed host inventory. Resolution expands a single
//! target, a named group, or the whole inventory into an ordered,
//! deduplicated list of host entries; it performs no I/O beyond the
//! initial load and never contacts a host.

pub mod error;
pub mod types;

pub use error::InventoryError;
pub use types::{GroupEntry, HostEntry, Inventory};
