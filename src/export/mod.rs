//! Scene export: normalized data model and the self-contained artifact.

pub mod model;
pub mod pipeline;
