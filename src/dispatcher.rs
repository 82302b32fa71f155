//! Routes peer read and write events to the registered characteristic they address.
//!
//! Events for characteristics that are not in the registry are dropped without a response and
//! without an error; the peer's request is simply left to the native stack.

use crate::bridge;
use crate::characteristic::CharacteristicState;
use crate::descriptors::Connection;
use crate::error::Error;
use crate::native::{
  NativeReadRequest, NativeWriteRequest, ReadRequested, ReadRequestedHandler, WriteRequested,
  WriteRequestedHandler,
};
use futures_util::FutureExt;
use log::{debug, trace, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
  Delivered,
  Unknown(Uuid),
}

/// UUID-keyed registry of bound characteristics.
///
/// Registration normally finishes before any traffic arrives, but the map is behind a lock so
/// that further services may be added while earlier ones are already serving peers.
#[derive(Clone, Default)]
pub(crate) struct Dispatcher {
  registry: Arc<RwLock<HashMap<Uuid, Arc<CharacteristicState>>>>,
  await_timeout: Option<Duration>,
}

impl Dispatcher {
  pub(crate) fn new(await_timeout: Option<Duration>) -> Self {
    Self {
      registry: Default::default(),
      await_timeout,
    }
  }

  pub(crate) fn register(&self, state: Arc<CharacteristicState>) {
    let uuid = state.uuid();
    if self.registry.write().insert(uuid, state).is_some() {
      warn!("{uuid}: replaced previously registered characteristic");
    }
  }

  pub(crate) fn lookup(&self, uuid: &Uuid) -> Option<Arc<CharacteristicState>> {
    self.registry.read().get(uuid).cloned()
  }

  pub(crate) fn len(&self) -> usize {
    self.registry.read().len()
  }

  pub(crate) fn write_handler(&self) -> WriteRequestedHandler {
    let dispatcher = self.clone();
    Arc::new(move |event| {
      let dispatcher = dispatcher.clone();
      async move {
        match dispatcher.handle_write(event).await {
          Ok(Dispatch::Delivered) => {}
          Ok(Dispatch::Unknown(uuid)) => debug!("Dropping write for unknown characteristic {uuid}"),
          Err(e) => debug!("Dropping write event: {e}"),
        }
      }
      .boxed()
    })
  }

  pub(crate) fn read_handler(&self) -> ReadRequestedHandler {
    let dispatcher = self.clone();
    Arc::new(move |event| {
      let dispatcher = dispatcher.clone();
      async move {
        match dispatcher.handle_read(event).await {
          Ok(Dispatch::Delivered) => {}
          Ok(Dispatch::Unknown(uuid)) => debug!("Dropping read for unknown characteristic {uuid}"),
          Err(e) => debug!("Dropping read event: {e}"),
        }
      }
      .boxed()
    })
  }

  /// Hands a peer write to the characteristic's write callback. The stored value is left
  /// untouched; only [crate::Characteristic::write] changes what peers read back.
  pub(crate) async fn handle_write(&self, event: WriteRequested) -> Result<Dispatch, Error> {
    let request: Box<dyn NativeWriteRequest> =
      bridge::await_operation_within(event.request, self.await_timeout).await?;
    let value = request.value()?;
    let offset = request.offset()?;

    let uuid = event.characteristic.uuid()?;
    let Some(state) = self.lookup(&uuid) else {
      return Ok(Dispatch::Unknown(uuid));
    };

    trace!("{uuid}: peer wrote {} bytes at offset {offset}", value.len());
    state.fire_write_event(Connection::PLACEHOLDER, offset, &value);
    Ok(Dispatch::Delivered)
  }

  /// Answers a peer read with the characteristic's current value.
  pub(crate) async fn handle_read(&self, event: ReadRequested) -> Result<Dispatch, Error> {
    let request: Box<dyn NativeReadRequest> =
      bridge::await_operation_within(event.request, self.await_timeout).await?;

    let uuid = event.characteristic.uuid()?;
    let Some(state) = self.lookup(&uuid) else {
      return Ok(Dispatch::Unknown(uuid));
    };

    let value = state.snapshot();
    trace!("{uuid}: answering read with {} bytes", value.len());
    let pending = request.respond_with_value(value)?;
    bridge::await_operation_within::<()>(pending, self.await_timeout).await?;
    Ok(Dispatch::Delivered)
  }
}
