use crate::characteristic::Characteristic;
use enumset::{EnumSet, EnumSetType};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use uuid::Uuid;

/// Characteristic property flags. Variants are declared in GATT bit order so that
/// [CharacteristicPermissions::as_u8] yields the on-air properties bitmask.
#[derive(EnumSetType, Debug)]
pub enum CharacteristicPermission {
  Broadcast,
  Read,
  WriteWithoutResponse,
  Write,
  Notify,
  Indicate,
}

pub type CharacteristicPermissions = EnumSet<CharacteristicPermission>;

/// Identifies the peer connection a write event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Connection(pub u16);

impl Connection {
  /// Reported for every write event; the native request does not carry a usable connection id.
  pub const PLACEHOLDER: Connection = Connection(0);
}

/// Called with `(connection, offset, value)` whenever a characteristic is written, either by a
/// peer or locally through [Characteristic::write].
pub type WriteEvent = Arc<dyn Fn(Connection, usize, &[u8]) + Send + Sync>;

pub struct Service {
  pub uuid: Uuid,
  pub characteristics: Vec<CharacteristicConfig>,
}

impl Debug for Service {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Service")
      .field("uuid", &self.uuid)
      .field("characteristics", &self.characteristics)
      .finish()
  }
}

#[derive(Default)]
pub struct CharacteristicConfig {
  pub uuid: Uuid,
  pub flags: CharacteristicPermissions,
  pub value: Vec<u8>,
  pub write_event: Option<WriteEvent>,
  /// Bound on registration. Characteristics without a handle are published but cannot be
  /// read from or written to locally, and peer events for them are dropped.
  pub handle: Option<Characteristic>,
}

impl Debug for CharacteristicConfig {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CharacteristicConfig")
      .field("uuid", &self.uuid)
      .field("flags", &self.flags)
      .field("value", &self.value)
      .field("write_event", &self.write_event.is_some())
      .field("handle", &self.handle.is_some())
      .finish()
  }
}
