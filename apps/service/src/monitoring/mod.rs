/// Monitoring engine
///
/// Probes monitored URLs, folds results into reliability counters and keeps
/// the scheduler and history retention running.
pub mod aggregator;
pub mod checker;
pub mod retention;
pub mod scheduler;
pub mod types;
pub mod validation;

pub use aggregator::ReliabilityAggregator;
pub use checker::HttpChecker;
pub use retention::{RetentionCleanup, RetentionPolicy};
pub use scheduler::PingService;
