//! Two-tier frame cache: bounded in-memory LRU backed by a disk tier.

pub mod entry;
pub mod key;
pub mod manager;
pub(crate) mod record;
