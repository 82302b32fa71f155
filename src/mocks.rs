//! In-memory native stack for use in tests. Records what the crate asks of it, can be told to
//! fail specific steps, and counts pending operations that have not been released yet.

use crate::bridge::{self, Completer, Outcome, PendingOperation};
use crate::error::Error;
use crate::native::{
  AdvertisingParameters, CharacteristicParameters, NativeAdapter, NativeCharacteristic,
  NativeReadRequest, NativeService, NativeServiceProvider, NativeWriteRequest,
  NotificationResult, ReadRequested, ReadRequestedHandler, WriteRequested, WriteRequestedHandler,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum MockFailure {
  ServiceSubmission,
  ServiceCompletion,
  /// Service creation completes with an empty result instead of a provider.
  ServiceShape,
  CharacteristicSubmission,
  /// Refuse only the n-th characteristic created (zero based).
  CharacteristicSubmissionAt(usize),
  CharacteristicCompletion,
  HandlerAttach,
  AdvertisingCompletion,
  NotifySubmission,
  NotifyCompletion,
  RequestFetch,
  /// Service creation is accepted but never signalled.
  ServiceStall,
  NotifyStall,
  /// Read responses are accepted but never acknowledged.
  RespondStall,
}

#[derive(Default)]
struct MockStack {
  failures: Mutex<HashSet<MockFailure>>,
  outstanding: Arc<AtomicUsize>,
  services: Mutex<Vec<Uuid>>,
  characteristics: Mutex<Vec<Arc<MockCharacteristic>>>,
  advertising: Mutex<Vec<AdvertisingParameters>>,
  stalled: Mutex<Vec<Completer>>,
}

impl MockStack {
  fn failing(&self, failure: MockFailure) -> bool {
    self.failures.lock().contains(&failure)
  }

  fn track(&self, op: PendingOperation) -> PendingOperation {
    self.outstanding.fetch_add(1, Ordering::SeqCst);
    let outstanding = self.outstanding.clone();
    op.on_release(move || {
      outstanding.fetch_sub(1, Ordering::SeqCst);
    })
  }

  fn ready(&self, label: &'static str, outcome: Outcome) -> PendingOperation {
    self.track(PendingOperation::ready(label, outcome))
  }

  fn failed(&self, label: &'static str) -> PendingOperation {
    let (completer, pending) = bridge::operation(label);
    completer.fail("mock failure");
    self.track(pending)
  }

  /// Keeps the completer alive without ever signalling it.
  fn stalled(&self, label: &'static str) -> PendingOperation {
    let (completer, pending) = bridge::operation(label);
    self.stalled.lock().push(completer);
    self.track(pending)
  }
}

#[derive(Clone, Default)]
pub(crate) struct MockAdapter {
  stack: Arc<MockStack>,
}

impl MockAdapter {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  pub(crate) fn fail_with(&self, failure: MockFailure) {
    self.stack.failures.lock().insert(failure);
  }

  pub(crate) fn services(&self) -> Vec<Uuid> {
    self.stack.services.lock().clone()
  }

  pub(crate) fn characteristics(&self) -> Vec<Arc<MockCharacteristic>> {
    self.stack.characteristics.lock().clone()
  }

  pub(crate) fn characteristic(&self, uuid: Uuid) -> Option<Arc<MockCharacteristic>> {
    self
      .stack
      .characteristics
      .lock()
      .iter()
      .rev()
      .find(|c| c.created_as == uuid)
      .cloned()
  }

  pub(crate) fn advertising(&self) -> Vec<AdvertisingParameters> {
    self.stack.advertising.lock().clone()
  }

  pub(crate) fn outstanding_operations(&self) -> usize {
    self.stack.outstanding.load(Ordering::SeqCst)
  }
}

impl NativeAdapter for MockAdapter {
  fn create_service_provider(&self, uuid: Uuid) -> Result<PendingOperation, Error> {
    if self.stack.failing(MockFailure::ServiceSubmission) {
      return Err(Error::native("create service", "mock refusal"));
    }
    self.stack.services.lock().push(uuid);
    if self.stack.failing(MockFailure::ServiceStall) {
      return Ok(self.stack.stalled("create service"));
    }
    if self.stack.failing(MockFailure::ServiceCompletion) {
      return Ok(self.stack.failed("create service"));
    }
    if self.stack.failing(MockFailure::ServiceShape) {
      return Ok(self.stack.ready("create service", Outcome::Done));
    }
    let provider = MockServiceProvider {
      service: Arc::new(MockService {
        uuid,
        stack: self.stack.clone(),
      }),
      stack: self.stack.clone(),
    };
    Ok(
      self
        .stack
        .ready("create service", Outcome::ServiceProvider(Arc::new(provider))),
    )
  }
}

struct MockServiceProvider {
  service: Arc<MockService>,
  stack: Arc<MockStack>,
}

impl NativeServiceProvider for MockServiceProvider {
  fn service(&self) -> Result<Arc<dyn NativeService>, Error> {
    Ok(self.service.clone())
  }

  fn start_advertising(&self, params: AdvertisingParameters) -> Result<PendingOperation, Error> {
    if self.stack.failing(MockFailure::AdvertisingCompletion) {
      return Ok(self.stack.failed("start advertising"));
    }
    self.stack.advertising.lock().push(params);
    Ok(self.stack.ready("start advertising", Outcome::Done))
  }
}

struct MockService {
  uuid: Uuid,
  stack: Arc<MockStack>,
}

impl NativeService for MockService {
  fn uuid(&self) -> Uuid {
    self.uuid
  }

  fn create_characteristic(
    &self,
    uuid: Uuid,
    params: CharacteristicParameters,
  ) -> Result<PendingOperation, Error> {
    let index = self.stack.characteristics.lock().len();
    if self.stack.failing(MockFailure::CharacteristicSubmission)
      || self
        .stack
        .failing(MockFailure::CharacteristicSubmissionAt(index))
    {
      return Err(Error::native("create characteristic", "mock refusal"));
    }
    if self.stack.failing(MockFailure::CharacteristicCompletion) {
      return Ok(self.stack.failed("create characteristic"));
    }
    let characteristic = MockCharacteristic::with_stack(uuid, params.properties, self.stack.clone());
    self.stack.characteristics.lock().push(characteristic.clone());
    Ok(
      self
        .stack
        .ready("create characteristic", Outcome::Characteristic(characteristic)),
    )
  }
}

pub(crate) struct MockCharacteristic {
  created_as: Uuid,
  reported_uuid: Mutex<Uuid>,
  properties: u8,
  stack: Arc<MockStack>,
  write_handler: Mutex<Option<WriteRequestedHandler>>,
  read_handler: Mutex<Option<ReadRequestedHandler>>,
  notifications: Mutex<Vec<Vec<u8>>>,
  subscriber_results: Mutex<Vec<NotificationResult>>,
}

impl MockCharacteristic {
  /// A characteristic with a private stack, not attached to any adapter.
  pub(crate) fn new(uuid: Uuid) -> Arc<Self> {
    Self::with_stack(uuid, 0, Default::default())
  }

  fn with_stack(uuid: Uuid, properties: u8, stack: Arc<MockStack>) -> Arc<Self> {
    Arc::new(Self {
      created_as: uuid,
      reported_uuid: Mutex::new(uuid),
      properties,
      stack,
      write_handler: Default::default(),
      read_handler: Default::default(),
      notifications: Default::default(),
      subscriber_results: Default::default(),
    })
  }

  pub(crate) fn fail_with(&self, failure: MockFailure) {
    self.stack.failures.lock().insert(failure);
  }

  pub(crate) fn properties(&self) -> u8 {
    self.properties
  }

  pub(crate) fn has_handlers(&self) -> bool {
    self.write_handler.lock().is_some() && self.read_handler.lock().is_some()
  }

  /// Makes subsequent events claim to come from a different characteristic.
  pub(crate) fn report_uuid(&self, uuid: Uuid) {
    *self.reported_uuid.lock() = uuid;
  }

  pub(crate) fn notifications(&self) -> Vec<Vec<u8>> {
    self.notifications.lock().clone()
  }

  pub(crate) fn set_subscriber_results(&self, results: Vec<NotificationResult>) {
    *self.subscriber_results.lock() = results;
  }

  pub(crate) fn outstanding_operations(&self) -> usize {
    self.stack.outstanding.load(Ordering::SeqCst)
  }

  pub(crate) fn write_event(self: &Arc<Self>, offset: usize, value: &[u8]) -> WriteRequested {
    let request = if self.stack.failing(MockFailure::RequestFetch) {
      self.stack.failed("fetch write request")
    } else {
      let request = MockWriteRequest {
        value: value.to_vec(),
        offset,
      };
      self
        .stack
        .ready("fetch write request", Outcome::WriteRequest(Box::new(request)))
    };
    WriteRequested {
      characteristic: self.clone(),
      request,
    }
  }

  /// Returns the event plus the receiver the response (if any) arrives on.
  pub(crate) fn read_event(self: &Arc<Self>) -> (ReadRequested, oneshot::Receiver<Vec<u8>>) {
    let (tx, rx) = oneshot::channel();
    let request = if self.stack.failing(MockFailure::RequestFetch) {
      self.stack.failed("fetch read request")
    } else {
      let request = MockReadRequest {
        tx,
        stack: self.stack.clone(),
      };
      self
        .stack
        .ready("fetch read request", Outcome::ReadRequest(Box::new(request)))
    };
    let event = ReadRequested {
      characteristic: self.clone(),
      request,
    };
    (event, rx)
  }

  /// Simulates a peer read through the installed read handler. `None` if nothing responded.
  pub(crate) async fn peer_read(self: &Arc<Self>) -> Option<Vec<u8>> {
    let handler = self.read_handler.lock().clone()?;
    let (event, rx) = self.read_event();
    handler(event).await;
    rx.await.ok()
  }

  /// Simulates a peer write through the installed write handler.
  pub(crate) async fn peer_write(self: &Arc<Self>, offset: usize, value: &[u8]) {
    let handler = self.write_handler.lock().clone();
    if let Some(handler) = handler {
      handler(self.write_event(offset, value)).await;
    }
  }
}

impl NativeCharacteristic for MockCharacteristic {
  fn uuid(&self) -> Result<Uuid, Error> {
    Ok(*self.reported_uuid.lock())
  }

  fn add_write_requested(&self, handler: WriteRequestedHandler) -> Result<(), Error> {
    if self.stack.failing(MockFailure::HandlerAttach) {
      return Err(Error::native("attach write handler", "mock refusal"));
    }
    *self.write_handler.lock() = Some(handler);
    Ok(())
  }

  fn add_read_requested(&self, handler: ReadRequestedHandler) -> Result<(), Error> {
    if self.stack.failing(MockFailure::HandlerAttach) {
      return Err(Error::native("attach read handler", "mock refusal"));
    }
    *self.read_handler.lock() = Some(handler);
    Ok(())
  }

  fn notify_value(&self, value: &[u8]) -> Result<PendingOperation, Error> {
    if self.stack.failing(MockFailure::NotifySubmission) {
      return Err(Error::native("notify", "mock refusal"));
    }
    self.notifications.lock().push(value.to_vec());
    if self.stack.failing(MockFailure::NotifyCompletion) {
      return Ok(self.stack.failed("notify"));
    }
    if self.stack.failing(MockFailure::NotifyStall) {
      return Ok(self.stack.stalled("notify"));
    }
    let results = self.subscriber_results.lock().clone();
    Ok(self.stack.ready("notify", Outcome::Notifications(results)))
  }
}

struct MockWriteRequest {
  value: Vec<u8>,
  offset: usize,
}

impl NativeWriteRequest for MockWriteRequest {
  fn value(&self) -> Result<Vec<u8>, Error> {
    Ok(self.value.clone())
  }

  fn offset(&self) -> Result<usize, Error> {
    Ok(self.offset)
  }
}

struct MockReadRequest {
  tx: oneshot::Sender<Vec<u8>>,
  stack: Arc<MockStack>,
}

impl NativeReadRequest for MockReadRequest {
  fn respond_with_value(self: Box<Self>, value: Vec<u8>) -> Result<PendingOperation, Error> {
    let _ = self.tx.send(value);
    if self.stack.failing(MockFailure::RespondStall) {
      return Ok(self.stack.stalled("respond"));
    }
    Ok(self.stack.ready("respond", Outcome::Done))
  }
}
