use crate::config::ConfigError;
use crate::pool::PoolError;
use crate::stream::StreamError;

/// Crate-level error for facility operations.
///
/// Pool and stream errors signal caller/integration bugs; config errors are
/// fatal at activation. Discharge backpressure is deliberately *not* here —
/// a blocked discharge is an ordinary `false` result retried every step.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unknown composition template '{0}'")]
    UnknownTemplate(String),
}
