pub mod alerts;
pub mod audit;
pub mod classifier;
pub mod config_store;
pub mod engine;
pub mod evaluator;
pub mod orchestrator;
pub mod progress;
pub mod summary;
pub mod validator;

pub use audit::{AuditEvent, AuditSink, TracingAuditSink};
pub use config_store::ConfigStore;
pub use engine::ValidationEngine;
pub use evaluator::FieldRegistry;
pub use orchestrator::{BatchOptions, BatchOrchestrator, BatchOutcome, RevalidationOutcome};
pub use progress::{CancellationToken, ChannelObserver, NoOpObserver, ProgressObserver, ProgressSubscription};
