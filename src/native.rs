//! Seam between this crate and a host Bluetooth stack.
//!
//! Every long-running call returns a [PendingOperation] that is consumed through
//! [crate::bridge]. A synchronous `Err` means the stack refused to even start the operation.

use crate::bridge::PendingOperation;
use crate::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;

pub type EventFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Invoked by the native stack, on a context of its choosing, when a peer writes a characteristic.
pub type WriteRequestedHandler = Arc<dyn Fn(WriteRequested) -> EventFuture + Send + Sync>;

/// Invoked by the native stack, on a context of its choosing, when a peer reads a characteristic.
pub type ReadRequestedHandler = Arc<dyn Fn(ReadRequested) -> EventFuture + Send + Sync>;

pub struct WriteRequested {
  /// The characteristic the peer addressed.
  pub characteristic: Arc<dyn NativeCharacteristic>,
  /// Resolves to a [NativeWriteRequest].
  pub request: PendingOperation,
}

pub struct ReadRequested {
  pub characteristic: Arc<dyn NativeCharacteristic>,
  /// Resolves to a [NativeReadRequest].
  pub request: PendingOperation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharacteristicParameters {
  /// GATT characteristic properties bitmask (broadcast = 0x01 ... indicate = 0x20).
  pub properties: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdvertisingParameters {
  pub connectable: bool,
  pub discoverable: bool,
}

/// Delivery status of one notification to one subscribed central.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationResult {
  pub subscriber: String,
  pub error: Option<String>,
}

impl NotificationResult {
  pub fn delivered(subscriber: impl Into<String>) -> Self {
    Self {
      subscriber: subscriber.into(),
      error: None,
    }
  }

  pub fn failed(subscriber: impl Into<String>, error: impl Into<String>) -> Self {
    Self {
      subscriber: subscriber.into(),
      error: Some(error.into()),
    }
  }

  pub fn is_delivered(&self) -> bool {
    self.error.is_none()
  }
}

pub trait NativeAdapter: Send + Sync {
  /// Resolves to an `Arc<dyn NativeServiceProvider>`.
  fn create_service_provider(&self, uuid: Uuid) -> Result<PendingOperation, Error>;
}

pub trait NativeServiceProvider: Send + Sync {
  fn service(&self) -> Result<Arc<dyn NativeService>, Error>;

  /// Publishes the service and starts advertising it. Resolves to `()`.
  fn start_advertising(&self, params: AdvertisingParameters) -> Result<PendingOperation, Error>;
}

pub trait NativeService: Send + Sync {
  fn uuid(&self) -> Uuid;

  /// Resolves to an `Arc<dyn NativeCharacteristic>`.
  fn create_characteristic(
    &self,
    uuid: Uuid,
    params: CharacteristicParameters,
  ) -> Result<PendingOperation, Error>;
}

pub trait NativeCharacteristic: Send + Sync {
  fn uuid(&self) -> Result<Uuid, Error>;

  fn add_write_requested(&self, handler: WriteRequestedHandler) -> Result<(), Error>;

  fn add_read_requested(&self, handler: ReadRequestedHandler) -> Result<(), Error>;

  /// Sends `value` to every subscribed central. Resolves to a `Vec<NotificationResult>`.
  fn notify_value(&self, value: &[u8]) -> Result<PendingOperation, Error>;
}

/// A peer write, fetched from a [WriteRequested] event.
pub trait NativeWriteRequest: Send {
  fn value(&self) -> Result<Vec<u8>, Error>;

  fn offset(&self) -> Result<usize, Error>;
}

/// A peer read, fetched from a [ReadRequested] event. Dropping it without responding leaves
/// the peer's request unanswered by us; what the peer then sees is up to the native stack.
pub trait NativeReadRequest: Send {
  /// Resolves to `()` once the stack has accepted the response.
  fn respond_with_value(self: Box<Self>, value: Vec<u8>) -> Result<PendingOperation, Error>;
}
