//! Error classification: category taxonomy, structured-error mapping, and
//! transport failure detection.

pub mod classifier;
pub mod transport;

pub use classifier::{
    is_transient_db_error, CategoryCounters, CategorySnapshot, ClassificationResult,
    ErrorCategory, ExceptionClassifier, DEFAULT_RATE_LIMIT_WAIT,
};
pub use transport::is_transport_error;
