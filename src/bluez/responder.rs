use crate::bridge::{Outcome, PendingOperation};
use crate::error::Error;
use crate::native::{NativeReadRequest, NativeWriteRequest};
use bluer::gatt::local::{ReqError, ReqResult};
use log::debug;
use tokio::sync::oneshot;

/// Read request handed out to the dispatcher; the value travels back to the waiting BlueZ
/// callback over `tx`.
#[derive(Debug)]
pub(super) struct BluezReadRequest {
  tx: Option<oneshot::Sender<Vec<u8>>>,
}

impl BluezReadRequest {
  pub(super) fn new(tx: oneshot::Sender<Vec<u8>>) -> Self {
    Self { tx: Some(tx) }
  }
}

impl NativeReadRequest for BluezReadRequest {
  fn respond_with_value(mut self: Box<Self>, value: Vec<u8>) -> Result<PendingOperation, Error> {
    self
      .tx
      .take()
      .ok_or_else(|| Error::native("respond", "already sent response"))?
      .send(value)
      .map_err(|_| Error::native("respond", "request no longer pending"))?;
    Ok(PendingOperation::ready("respond", Outcome::Done))
  }
}

impl Drop for BluezReadRequest {
  fn drop(&mut self) {
    if self.tx.is_some() {
      debug!("Read request dropped without a response");
    }
  }
}

#[derive(Debug)]
pub(super) struct BluezWriteRequest {
  value: Vec<u8>,
  offset: u16,
}

impl BluezWriteRequest {
  pub(super) fn new(value: Vec<u8>, offset: u16) -> Self {
    Self { value, offset }
  }
}

impl NativeWriteRequest for BluezWriteRequest {
  fn value(&self) -> Result<Vec<u8>, Error> {
    Ok(self.value.clone())
  }

  fn offset(&self) -> Result<usize, Error> {
    Ok(usize::from(self.offset))
  }
}

/// BlueZ asks for the remainder of the value past `offset` on long reads.
pub(super) fn slice_at(mut value: Vec<u8>, offset: u16) -> ReqResult<Vec<u8>> {
  let offset = usize::from(offset);
  if offset > value.len() {
    return Err(ReqError::InvalidOffset);
  }
  Ok(value.split_off(offset))
}
