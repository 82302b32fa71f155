use super::DeviceIdent;
use crate::native::AdvertisingParameters;
use bluer::adv::{Advertisement, Type};
use std::collections::BTreeSet;
use uuid::Uuid;

pub(super) fn advertisement(
  service_uuid: Uuid,
  ident: &DeviceIdent,
  params: AdvertisingParameters,
) -> Advertisement {
  let advertisement_type = if params.connectable {
    Type::Peripheral
  } else {
    Type::Broadcast
  };
  Advertisement {
    advertisement_type,
    service_uuids: BTreeSet::from([service_uuid]),
    discoverable: Some(params.discoverable),
    local_name: ident.name.clone(),
    appearance: ident.appearance,
    ..Default::default()
  }
}
