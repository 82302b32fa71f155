use super::notifier::Subscribers;
use super::responder::{self, BluezReadRequest, BluezWriteRequest};
use crate::bridge::{self, Outcome, PendingOperation};
use crate::descriptors::{CharacteristicPermission, CharacteristicPermissions};
use crate::error::Error;
use crate::native::{
  CharacteristicParameters, NativeCharacteristic, ReadRequested, ReadRequestedHandler,
  WriteRequested, WriteRequestedHandler,
};
use bluer::gatt::local::{
  Characteristic, CharacteristicNotifier, CharacteristicNotify, CharacteristicNotifyFun,
  CharacteristicNotifyMethod, CharacteristicRead, CharacteristicReadRequest, CharacteristicWrite,
  CharacteristicWriteMethod, CharacteristicWriteRequest, ReqError, ReqResult,
};
use futures_util::FutureExt;
use log::trace;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use uuid::Uuid;

type ReadFun = Box<
  dyn (Fn(CharacteristicReadRequest) -> Pin<Box<dyn Future<Output = ReqResult<Vec<u8>>> + Send>>)
    + Send
    + Sync,
>;

type WriteFun = Box<
  dyn Fn(Vec<u8>, CharacteristicWriteRequest) -> Pin<Box<dyn Future<Output = ReqResult<()>> + Send>>
    + Send
    + Sync,
>;

#[derive(Default)]
struct Handlers {
  write: Option<WriteRequestedHandler>,
  read: Option<ReadRequestedHandler>,
}

/// A characteristic as described to BlueZ. Requests from BlueZ are turned into
/// [ReadRequested]/[WriteRequested] events for whichever handlers are attached.
pub(super) struct BluezCharacteristic {
  uuid: Uuid,
  flags: CharacteristicPermissions,
  runtime: Handle,
  handlers: Mutex<Handlers>,
  subscribers: Subscribers,
}

impl BluezCharacteristic {
  pub(super) fn new(uuid: Uuid, params: CharacteristicParameters, runtime: Handle) -> Arc<Self> {
    Arc::new(Self {
      uuid,
      flags: CharacteristicPermissions::from_u8_truncated(params.properties),
      runtime,
      handlers: Default::default(),
      subscribers: Default::default(),
    })
  }

  pub(super) fn to_bluer(self: &Arc<Self>) -> Characteristic {
    let flags = self.flags;

    let read = flags
      .contains(CharacteristicPermission::Read)
      .then(|| CharacteristicRead {
        read: true,
        fun: self.new_read_handler(),
        ..Default::default()
      });

    let write = (flags.contains(CharacteristicPermission::Write)
      || flags.contains(CharacteristicPermission::WriteWithoutResponse))
    .then(|| CharacteristicWrite {
      write: flags.contains(CharacteristicPermission::Write),
      write_without_response: flags.contains(CharacteristicPermission::WriteWithoutResponse),
      method: CharacteristicWriteMethod::Fun(self.new_write_handler()),
      ..Default::default()
    });

    let notify = (flags.contains(CharacteristicPermission::Notify)
      || flags.contains(CharacteristicPermission::Indicate))
    .then(|| CharacteristicNotify {
      notify: flags.contains(CharacteristicPermission::Notify),
      indicate: flags.contains(CharacteristicPermission::Indicate),
      method: CharacteristicNotifyMethod::Fun(self.new_notify_handler()),
      ..Default::default()
    });

    Characteristic {
      uuid: self.uuid,
      broadcast: flags.contains(CharacteristicPermission::Broadcast),
      read,
      write,
      notify,
      ..Default::default()
    }
  }

  fn new_read_handler(self: &Arc<Self>) -> ReadFun {
    let this = self.clone();
    Box::new(move |req: CharacteristicReadRequest| {
      let this = this.clone();
      async move {
        let handler = this.handlers.lock().read.clone().ok_or(ReqError::Failed)?;
        let (tx, rx) = oneshot::channel();
        let request = BluezReadRequest::new(tx);
        handler(ReadRequested {
          characteristic: this.clone(),
          request: PendingOperation::ready(
            "fetch read request",
            Outcome::ReadRequest(Box::new(request)),
          ),
        })
        .await;
        let value = rx.await.map_err(|_| ReqError::Failed)?;
        trace!("{}: read at offset {} by {}", this.uuid, req.offset, req.device_address);
        responder::slice_at(value, req.offset)
      }
      .boxed()
    })
  }

  fn new_write_handler(self: &Arc<Self>) -> WriteFun {
    let this = self.clone();
    Box::new(move |value: Vec<u8>, req: CharacteristicWriteRequest| {
      let this = this.clone();
      async move {
        let handler = this.handlers.lock().write.clone();
        if let Some(handler) = handler {
          let request = BluezWriteRequest::new(value, req.offset);
          handler(WriteRequested {
            characteristic: this.clone(),
            request: PendingOperation::ready(
              "fetch write request",
              Outcome::WriteRequest(Box::new(request)),
            ),
          })
          .await;
        }
        Ok::<_, ReqError>(())
      }
      .boxed()
    })
  }

  fn new_notify_handler(&self) -> CharacteristicNotifyFun {
    let subscribers = self.subscribers.clone();
    Box::new(move |notifier: CharacteristicNotifier| {
      let subscribers = subscribers.clone();
      async move { subscribers.add(notifier).await }.boxed()
    })
  }
}

impl NativeCharacteristic for BluezCharacteristic {
  fn uuid(&self) -> Result<Uuid, Error> {
    Ok(self.uuid)
  }

  fn add_write_requested(&self, handler: WriteRequestedHandler) -> Result<(), Error> {
    self.handlers.lock().write = Some(handler);
    Ok(())
  }

  fn add_read_requested(&self, handler: ReadRequestedHandler) -> Result<(), Error> {
    self.handlers.lock().read = Some(handler);
    Ok(())
  }

  fn notify_value(&self, value: &[u8]) -> Result<PendingOperation, Error> {
    let (completer, pending) = bridge::operation("notify");
    let subscribers = self.subscribers.clone();
    let value = value.to_vec();
    self.runtime.spawn(async move {
      let results = subscribers.notify_all(value).await;
      completer.succeed(Outcome::Notifications(results));
    });
    Ok(pending)
  }
}
