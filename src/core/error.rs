use std::error::Error as StdError;
use std::fmt;

/// `GuardError` indicates why a guarded call did not produce a result.
///
/// The two variants are deliberately distinguishable so callers can fast-fail
/// on a rejection while handling a real upstream failure differently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardError<E> {
    /// The guard declined to invoke the operation: the circuit is open and the
    /// reset timeout has not elapsed. The operation was not executed.
    Rejected,
    /// The wrapped operation itself failed. The original error is carried
    /// through unchanged, after the guard has recorded the failure.
    Inner(E),
}

impl<E> GuardError<E> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, GuardError::Rejected)
    }

    pub fn is_inner(&self) -> bool {
        matches!(self, GuardError::Inner(_))
    }

    /// Consumes the error, returning the wrapped operation's error if any.
    pub fn into_inner(self) -> Option<E> {
        match self {
            GuardError::Inner(e) => Some(e),
            GuardError::Rejected => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for GuardError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardError::Rejected => write!(f, "circuit guard is open"),
            GuardError::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: StdError + 'static> StdError for GuardError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            GuardError::Inner(e) => Some(e),
            GuardError::Rejected => None,
        }
    }
}
