use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the simulation core.
///
/// Every failure is reported synchronously by the call that violated its contract.
/// Truncation on particle-box overflow and eviction on a lowered particle limit are
/// defined outcomes, not errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed numeric input: non-finite, non-positive where positivity is required,
    /// negative counts, or a handle that does not belong to the world it was passed to.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The world was accessed while one of its steps is still in progress.
    #[error("reentrant call: the world is already stepping")]
    Reentrancy,

    /// A shared world whose lock was poisoned by a panic during a step.
    #[error("world lock poisoned by a panicked step")]
    Poisoned,
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_is_informative() {
        let e = Error::InvalidArgument("radius must be finite and > 0".to_string());
        let msg = format!("{e}");
        assert!(msg.contains("invalid argument"));
        assert!(msg.contains("radius"));
    }

    #[test]
    fn reentrancy_display_mentions_stepping() {
        assert!(Error::Reentrancy.to_string().contains("stepping"));
    }

    #[test]
    fn result_type_alias_compiles() -> Result<()> {
        Ok(())
    }
}
