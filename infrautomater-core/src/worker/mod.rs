//! Queue, worker pool, and stale-request recovery

pub mod pool;
pub mod queue;
pub mod reconciler;

pub use pool::*;
pub use queue::*;
pub use reconciler::*;
