pub mod alert;
pub mod config;
pub mod invoice;
pub mod progress;
pub mod result;
pub mod summary;

pub use alert::Alert;
pub use config::{SeverityThresholds, ValidationConfig, ValidationConfigPatch};
pub use invoice::{InvoiceRecord, LineItem};
pub use progress::{BatchStatus, Progress};
pub use result::{RecordError, RecordErrorKind, Severity, ValidationResult};
pub use summary::ValidationSummary;
