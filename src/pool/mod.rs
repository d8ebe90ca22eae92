//! Priority render pool: worker threads, a coordinator, and task lifecycle.

pub(crate) mod channel;
pub mod pool;
pub mod task;
