//! Session bookkeeping for the smart wake agent.

pub mod stats;

// Re-export commonly used types
pub use stats::{create_shared_stats, SessionStats, SessionStatsSnapshot, SharedSessionStats};
