use crate::bridge::{self, PendingOperation};
use crate::descriptors::{
  CharacteristicPermission, CharacteristicPermissions, Connection, WriteEvent,
};
use crate::error::{Error, WriteError};
use crate::native::{NativeCharacteristic, NotificationResult};
use log::{debug, trace, warn};
use parking_lot::Mutex;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use uuid::Uuid;

/// Live state of one registered characteristic. Shared between the application's
/// [Characteristic] handle and the dispatcher registry; `value` is the only copy of the value.
pub(crate) struct CharacteristicState {
  uuid: Uuid,
  native: Arc<dyn NativeCharacteristic>,
  flags: CharacteristicPermissions,
  write_event: Option<WriteEvent>,
  value: Mutex<Vec<u8>>,
  await_timeout: Option<Duration>,
}

impl CharacteristicState {
  pub(crate) fn new(
    uuid: Uuid,
    native: Arc<dyn NativeCharacteristic>,
    flags: CharacteristicPermissions,
    write_event: Option<WriteEvent>,
    value: Vec<u8>,
    await_timeout: Option<Duration>,
  ) -> Self {
    Self {
      uuid,
      native,
      flags,
      write_event,
      value: Mutex::new(value),
      await_timeout,
    }
  }

  pub(crate) fn uuid(&self) -> Uuid {
    self.uuid
  }

  pub(crate) fn await_timeout(&self) -> Option<Duration> {
    self.await_timeout
  }

  pub(crate) fn snapshot(&self) -> Vec<u8> {
    self.value.lock().clone()
  }

  pub(crate) fn fire_write_event(&self, connection: Connection, offset: usize, value: &[u8]) {
    if let Some(write_event) = &self.write_event {
      write_event(connection, offset, value);
    }
  }

  /// Runs the write callback, replaces the value and, for notifying characteristics, submits
  /// the notification. The returned operation (if any) still has to be awaited.
  fn commit(&self, value: &[u8]) -> Result<Option<PendingOperation>, Error> {
    self.fire_write_event(Connection::PLACEHOLDER, 0, value);

    *self.value.lock() = value.to_vec();
    trace!("{}: stored {} bytes", self.uuid, value.len());

    if !self.flags.contains(CharacteristicPermission::Notify) {
      return Ok(None);
    }
    self.native.notify_value(value).map(Some)
  }

  fn report(&self, results: &[NotificationResult]) {
    for result in results.iter().filter(|r| !r.is_delivered()) {
      warn!(
        "{}: notification to {} failed: {}",
        self.uuid,
        result.subscriber,
        result.error.as_deref().unwrap_or("unknown error")
      );
    }
    debug!("{}: notified {} subscriber(s)", self.uuid, results.len());
  }
}

impl Debug for CharacteristicState {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CharacteristicState")
      .field("uuid", &self.uuid)
      .field("flags", &self.flags)
      .finish_non_exhaustive()
  }
}

/// Application handle to a characteristic.
///
/// Create it unbound with [Characteristic::new], place a clone in
/// [crate::CharacteristicConfig::handle], and it becomes usable once the service has been
/// registered with [crate::Peripheral::add_service].
#[derive(Clone, Default)]
pub struct Characteristic {
  state: Arc<OnceLock<Arc<CharacteristicState>>>,
}

impl Characteristic {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_bound(&self) -> bool {
    self.state.get().is_some()
  }

  pub fn uuid(&self) -> Option<Uuid> {
    self.state.get().map(|s| s.uuid())
  }

  /// Current value, or `None` if the handle is unbound.
  pub fn value(&self) -> Option<Vec<u8>> {
    self.state.get().map(|s| s.snapshot())
  }

  pub(crate) fn bind(&self, state: Arc<CharacteristicState>) -> Result<(), Error> {
    self
      .state
      .set(state)
      .map_err(|_| Error::AlreadyBound(self.uuid().unwrap_or_default()))
  }

  /// Replaces the value and notifies subscribed centrals if the characteristic has the
  /// [CharacteristicPermission::Notify] flag.
  ///
  /// Returns the number of bytes written. The local value is updated even when the
  /// notification fails; the [WriteError] then reports the byte count alongside the cause.
  /// Writing an empty slice does nothing.
  pub async fn write(&self, value: &[u8]) -> Result<usize, WriteError> {
    let Some((state, pending)) = self.begin_write(value)? else {
      return Ok(value.len());
    };
    let results: Vec<NotificationResult> =
      bridge::await_operation_within(pending, state.await_timeout())
        .await
        .map_err(|source| WriteError {
          written: value.len(),
          source,
        })?;
    state.report(&results);
    Ok(value.len())
  }

  /// Thread-blocking form of [Characteristic::write]. Must not be called from within an async
  /// execution context.
  pub fn write_blocking(&self, value: &[u8]) -> Result<usize, WriteError> {
    let Some((state, pending)) = self.begin_write(value)? else {
      return Ok(value.len());
    };
    let results: Vec<NotificationResult> =
      bridge::wait_blocking(pending).map_err(|source| WriteError {
        written: value.len(),
        source,
      })?;
    state.report(&results);
    Ok(value.len())
  }

  fn begin_write(
    &self,
    value: &[u8],
  ) -> Result<Option<(&Arc<CharacteristicState>, PendingOperation)>, WriteError> {
    if value.is_empty() {
      return Ok(None);
    }
    let state = self.state.get().ok_or(WriteError {
      written: 0,
      source: Error::Unbound,
    })?;
    let pending = state.commit(value).map_err(|source| WriteError {
      written: value.len(),
      source,
    })?;
    Ok(pending.map(|p| (state, p)))
  }
}

impl Debug for Characteristic {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self.state.get() {
      Some(state) => f.debug_tuple("Characteristic").field(state).finish(),
      None => f.write_str("Characteristic(unbound)"),
    }
  }
}
