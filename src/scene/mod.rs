//! Scene serialization contract and content-addressed snapshots.

pub mod snapshot;
