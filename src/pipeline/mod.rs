//! Mention processing pipeline.
//!
//! Every cycle flows through:
//! 1. `MentionSource::fetch_mentions()`: channel-specific I/O
//! 2. `DedupStore` filter: drop ids already handled
//! 3. `MentionProcessor::process_batch()`: thread context, oracle, dispatch
//!
//! `CycleScheduler` drives cycles on a timer and guarantees that at most one
//! is in flight.

pub mod dedup;
pub mod oracle;
pub mod processor;
pub mod scheduler;
pub mod types;

pub use dedup::DedupStore;
pub use oracle::{GrokOracle, HeuristicOracle};
pub use processor::{BatchReport, DispatchOutcome, MentionProcessor};
pub use scheduler::{AgentStats, CycleScheduler, SchedulerConfig, TickOutcome};
