//! Turns completion callbacks from the native stack into awaitable (or thread-blocking) calls.
//!
//! The native side holds a [Completer] and signals it from whatever thread it likes; the caller
//! holds the matching [PendingOperation] and waits on it with [await_operation] or
//! [wait_blocking]. The caller names the result it expects through a [Shaped] type, and a
//! completion of any other kind is reported as [Error::UnexpectedShape].

use crate::error::Error;
use crate::native::{
  NativeCharacteristic, NativeReadRequest, NativeServiceProvider, NativeWriteRequest,
  NotificationResult,
};
use log::warn;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

type Completion = Result<Outcome, Error>;

/// Result delivered by a completed native operation.
pub enum Outcome {
  ServiceProvider(Arc<dyn NativeServiceProvider>),
  Characteristic(Arc<dyn NativeCharacteristic>),
  WriteRequest(Box<dyn NativeWriteRequest>),
  ReadRequest(Box<dyn NativeReadRequest>),
  Notifications(Vec<NotificationResult>),
  Done,
}

impl Outcome {
  pub fn shape(&self) -> ResultShape {
    match self {
      Outcome::ServiceProvider(_) => ResultShape::ServiceProvider,
      Outcome::Characteristic(_) => ResultShape::Characteristic,
      Outcome::WriteRequest(_) => ResultShape::WriteRequest,
      Outcome::ReadRequest(_) => ResultShape::ReadRequest,
      Outcome::Notifications(_) => ResultShape::Notifications,
      Outcome::Done => ResultShape::Done,
    }
  }
}

impl Debug for Outcome {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_tuple("Outcome").field(&self.shape()).finish()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultShape {
  ServiceProvider,
  Characteristic,
  WriteRequest,
  ReadRequest,
  Notifications,
  Done,
}

impl Display for ResultShape {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      ResultShape::ServiceProvider => "service provider",
      ResultShape::Characteristic => "characteristic",
      ResultShape::WriteRequest => "write request",
      ResultShape::ReadRequest => "read request",
      ResultShape::Notifications => "notification results",
      ResultShape::Done => "empty",
    };
    f.write_str(name)
  }
}

/// A typed view of one [Outcome] variant.
pub trait Shaped: Sized {
  const SHAPE: ResultShape;

  /// Returns the outcome back unchanged if it is not of this shape.
  fn extract(outcome: Outcome) -> Result<Self, Outcome>;
}

impl Shaped for Arc<dyn NativeServiceProvider> {
  const SHAPE: ResultShape = ResultShape::ServiceProvider;

  fn extract(outcome: Outcome) -> Result<Self, Outcome> {
    match outcome {
      Outcome::ServiceProvider(provider) => Ok(provider),
      other => Err(other),
    }
  }
}

impl Shaped for Arc<dyn NativeCharacteristic> {
  const SHAPE: ResultShape = ResultShape::Characteristic;

  fn extract(outcome: Outcome) -> Result<Self, Outcome> {
    match outcome {
      Outcome::Characteristic(characteristic) => Ok(characteristic),
      other => Err(other),
    }
  }
}

impl Shaped for Box<dyn NativeWriteRequest> {
  const SHAPE: ResultShape = ResultShape::WriteRequest;

  fn extract(outcome: Outcome) -> Result<Self, Outcome> {
    match outcome {
      Outcome::WriteRequest(request) => Ok(request),
      other => Err(other),
    }
  }
}

impl Shaped for Box<dyn NativeReadRequest> {
  const SHAPE: ResultShape = ResultShape::ReadRequest;

  fn extract(outcome: Outcome) -> Result<Self, Outcome> {
    match outcome {
      Outcome::ReadRequest(request) => Ok(request),
      other => Err(other),
    }
  }
}

impl Shaped for Vec<NotificationResult> {
  const SHAPE: ResultShape = ResultShape::Notifications;

  fn extract(outcome: Outcome) -> Result<Self, Outcome> {
    match outcome {
      Outcome::Notifications(results) => Ok(results),
      other => Err(other),
    }
  }
}

impl Shaped for () {
  const SHAPE: ResultShape = ResultShape::Done;

  fn extract(outcome: Outcome) -> Result<Self, Outcome> {
    match outcome {
      Outcome::Done => Ok(()),
      other => Err(other),
    }
  }
}

/// Creates a new in-flight operation. The [Completer] goes to whoever will finish the work, the
/// [PendingOperation] to whoever waits for it.
pub fn operation(label: &'static str) -> (Completer, PendingOperation) {
  let (tx, rx) = oneshot::channel();
  let completer = Completer {
    label,
    tx: Some(tx),
  };
  let pending = PendingOperation {
    label,
    rx,
    guard: ReleaseGuard(None),
  };
  (completer, pending)
}

/// Native half of an in-flight operation.
pub struct Completer {
  label: &'static str,
  tx: Option<oneshot::Sender<Completion>>,
}

impl Completer {
  pub fn succeed(mut self, outcome: Outcome) {
    self.send(Ok(outcome));
  }

  pub fn fail(mut self, message: impl Into<String>) {
    let error = Error::OperationFailed {
      operation: self.label,
      message: message.into(),
    };
    self.send(Err(error));
  }

  fn send(&mut self, completion: Completion) {
    if let Some(tx) = self.tx.take() {
      // The waiter may have given up (timeout); nothing left to tell.
      let _ = tx.send(completion);
    }
  }
}

impl Debug for Completer {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Completer")
      .field("label", &self.label)
      .finish_non_exhaustive()
  }
}

impl Drop for Completer {
  fn drop(&mut self) {
    if self.tx.is_some() {
      warn!("{} dropped without signalling completion", self.label);
      let error = Error::Abandoned {
        operation: self.label,
      };
      self.send(Err(error));
    }
  }
}

/// Waiting half of an in-flight operation.
pub struct PendingOperation {
  label: &'static str,
  rx: oneshot::Receiver<Completion>,
  guard: ReleaseGuard,
}

impl PendingOperation {
  /// An operation that has already completed.
  pub fn ready(label: &'static str, outcome: Outcome) -> Self {
    let (completer, pending) = operation(label);
    completer.succeed(outcome);
    pending
  }

  /// Registers native resources to release once the result has been consumed. The hook runs
  /// exactly once, whenever the operation is dropped, regardless of how the wait ended. Hooks
  /// registered earlier stay in place and run after this one.
  pub fn on_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
    let hook: Box<dyn FnOnce() + Send> = match self.guard.0.take() {
      Some(previous) => Box::new(move || {
        release();
        previous();
      }),
      None => Box::new(release),
    };
    self.guard.0 = Some(hook);
    self
  }

  pub fn label(&self) -> &'static str {
    self.label
  }
}

impl Debug for PendingOperation {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PendingOperation")
      .field("label", &self.label)
      .finish_non_exhaustive()
  }
}

struct ReleaseGuard(Option<Box<dyn FnOnce() + Send>>);

impl Drop for ReleaseGuard {
  fn drop(&mut self) {
    if let Some(release) = self.0.take() {
      release();
    }
  }
}

/// Suspends until `op` completes and extracts a result of shape `T`. Waits indefinitely.
pub async fn await_operation<T: Shaped>(op: PendingOperation) -> Result<T, Error> {
  await_operation_within(op, None).await
}

/// Like [await_operation], but gives up with [Error::Timeout] after `timeout` if one is set.
pub async fn await_operation_within<T: Shaped>(
  op: PendingOperation,
  timeout: Option<Duration>,
) -> Result<T, Error> {
  let PendingOperation {
    label,
    mut rx,
    guard,
  } = op;
  let received = match timeout {
    None => (&mut rx).await,
    Some(after) => tokio::time::timeout(after, &mut rx)
      .await
      .map_err(|_| Error::Timeout {
        operation: label,
        after,
      })?,
  };
  let result = resolve(label, received);
  drop(guard);
  result
}

/// Parks the current thread until `op` completes.
///
/// Must not be called from within an async execution context; use [await_operation] there.
pub fn wait_blocking<T: Shaped>(op: PendingOperation) -> Result<T, Error> {
  let PendingOperation { label, rx, guard } = op;
  let result = resolve(label, rx.blocking_recv());
  drop(guard);
  result
}

fn resolve<T: Shaped>(
  label: &'static str,
  received: Result<Completion, oneshot::error::RecvError>,
) -> Result<T, Error> {
  let outcome = received.map_err(|_| Error::Abandoned { operation: label })??;
  T::extract(outcome).map_err(|other| Error::UnexpectedShape {
    operation: label,
    expected: T::SHAPE,
    actual: other.shape(),
  })
}
