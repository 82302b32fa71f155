use crate::bridge::ResultShape;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by service registration, characteristic writes and the native backends.
#[derive(Error, Debug)]
pub enum Error {
  /// The native stack refused to accept an operation (e.g. service or characteristic creation).
  #[error("native stack rejected {operation}: {message}")]
  Native {
    operation: &'static str,
    message: String,
  },

  /// The operation was accepted but its completion signalled failure.
  #[error("{operation} completed with failure: {message}")]
  OperationFailed {
    operation: &'static str,
    message: String,
  },

  /// The operation completed with a result of a different kind than the caller expected.
  #[error("{operation} completed with {actual} result, expected {expected}")]
  UnexpectedShape {
    operation: &'static str,
    expected: ResultShape,
    actual: ResultShape,
  },

  /// The native side went away without ever signalling completion.
  #[error("{operation} was abandoned before completion")]
  Abandoned { operation: &'static str },

  #[error("{operation} did not complete within {after:?}")]
  Timeout {
    operation: &'static str,
    after: Duration,
  },

  /// The characteristic handle was never bound by a successful registration.
  #[error("characteristic handle is not bound to a registered characteristic")]
  Unbound,

  #[error("characteristic handle is already bound to {0}")]
  AlreadyBound(Uuid),

  #[cfg(feature = "bluez")]
  #[error(transparent)]
  Bluer(#[from] bluer::Error),
}

impl Error {
  pub fn native(operation: &'static str, message: impl Into<String>) -> Self {
    Self::Native {
      operation,
      message: message.into(),
    }
  }
}

/// Failure from [crate::Characteristic::write].
///
/// `written` is the number of bytes already committed to the local value when the error
/// occurred. A failed notification does not roll the local value back, so this is usually the
/// full input length.
#[derive(Error, Debug)]
#[error("wrote {written} bytes but the update failed: {source}")]
pub struct WriteError {
  pub written: usize,
  #[source]
  pub source: Error,
}
