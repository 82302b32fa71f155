//! Native backend over BlueZ, reached through `bluer`.
//!
//! BlueZ takes a whole GATT application at once, so service and characteristic creation only
//! build up a description; the application is handed to BlueZ when advertising starts.

mod advertiser;
mod application;
mod notifier;
mod responder;

use crate::bridge::{self, Outcome, PendingOperation};
use crate::config::PeripheralConfig;
use crate::error::Error;
use crate::native::{
  AdvertisingParameters, CharacteristicParameters, NativeAdapter, NativeService,
  NativeServiceProvider,
};
use application::BluezCharacteristic;
use bluer::adv::AdvertisementHandle;
use bluer::gatt::local::{Application, ApplicationHandle, Service};
use bluer::Adapter;
use log::debug;
use parking_lot::Mutex;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use tokio::runtime::Handle;
use uuid::Uuid;

#[derive(Debug, Default)]
struct DeviceIdent {
  name: Option<String>,
  appearance: Option<u16>,
}

pub struct BluezAdapter {
  adapter: Adapter,
  ident: Arc<DeviceIdent>,
  runtime: Handle,
  keep_alive: Arc<Mutex<Vec<KeepAliveHandles>>>,
}

impl BluezAdapter {
  /// Opens the configured (or default) adapter and powers it on.
  pub async fn open(config: &PeripheralConfig) -> Result<Self, Error> {
    let session = bluer::Session::new().await?;
    let adapter = match &config.adapter_name {
      Some(name) => session.adapter(name)?,
      None => session.default_adapter().await?,
    };
    adapter.set_powered(true).await?;
    debug!("Using adapter {}", adapter.name());
    Self::new(adapter, config)
  }

  /// Wraps an already configured adapter. Fails when called outside a tokio runtime, which
  /// later drives the BlueZ callbacks.
  pub fn new(adapter: Adapter, config: &PeripheralConfig) -> Result<Self, Error> {
    Ok(Self {
      adapter,
      ident: Arc::new(DeviceIdent {
        name: config.local_name.clone(),
        appearance: config.appearance,
      }),
      runtime: current_runtime()?,
      keep_alive: Default::default(),
    })
  }

  pub fn adapter(&self) -> &Adapter {
    &self.adapter
  }
}

impl Debug for BluezAdapter {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BluezAdapter")
      .field("adapter", &self.adapter.name())
      .field("ident", &self.ident)
      .finish_non_exhaustive()
  }
}

impl NativeAdapter for BluezAdapter {
  fn create_service_provider(&self, uuid: Uuid) -> Result<PendingOperation, Error> {
    let provider = BluezServiceProvider {
      adapter: self.adapter.clone(),
      ident: self.ident.clone(),
      runtime: self.runtime.clone(),
      service: Arc::new(BluezService {
        uuid,
        runtime: self.runtime.clone(),
        characteristics: Default::default(),
      }),
      keep_alive: self.keep_alive.clone(),
    };
    Ok(PendingOperation::ready(
      "create service",
      Outcome::ServiceProvider(Arc::new(provider)),
    ))
  }
}

struct BluezServiceProvider {
  adapter: Adapter,
  ident: Arc<DeviceIdent>,
  runtime: Handle,
  service: Arc<BluezService>,
  keep_alive: Arc<Mutex<Vec<KeepAliveHandles>>>,
}

impl NativeServiceProvider for BluezServiceProvider {
  fn service(&self) -> Result<Arc<dyn NativeService>, Error> {
    Ok(self.service.clone())
  }

  fn start_advertising(&self, params: AdvertisingParameters) -> Result<PendingOperation, Error> {
    let (completer, pending) = bridge::operation("start advertising");
    let app = Application {
      services: vec![self.service.to_bluer()],
      ..Default::default()
    };
    let adv = advertiser::advertisement(self.service.uuid, &self.ident, params);
    let adapter = self.adapter.clone();
    let keep_alive = self.keep_alive.clone();

    self.runtime.spawn(async move {
      let app = match adapter.serve_gatt_application(app).await {
        Ok(handle) => handle,
        Err(e) => return completer.fail(e.to_string()),
      };
      // On failure the application handle is dropped here, unpublishing the service again.
      match adapter.advertise(adv).await {
        Ok(advertisement) => {
          keep_alive.lock().push(KeepAliveHandles { app, advertisement });
          completer.succeed(Outcome::Done);
        }
        Err(e) => completer.fail(e.to_string()),
      }
    });
    Ok(pending)
  }
}

struct BluezService {
  uuid: Uuid,
  runtime: Handle,
  characteristics: Mutex<Vec<Arc<BluezCharacteristic>>>,
}

impl BluezService {
  fn to_bluer(&self) -> Service {
    Service {
      uuid: self.uuid,
      handle: None,
      primary: true,
      characteristics: self
        .characteristics
        .lock()
        .iter()
        .map(|c| c.to_bluer())
        .collect(),
      ..Default::default()
    }
  }
}

impl NativeService for BluezService {
  fn uuid(&self) -> Uuid {
    self.uuid
  }

  fn create_characteristic(
    &self,
    uuid: Uuid,
    params: CharacteristicParameters,
  ) -> Result<PendingOperation, Error> {
    let characteristic = BluezCharacteristic::new(uuid, params, self.runtime.clone());
    self.characteristics.lock().push(characteristic.clone());
    Ok(PendingOperation::ready(
      "create characteristic",
      Outcome::Characteristic(characteristic),
    ))
  }
}

/// Collections of bluer handles that keep the server and advertiser alive and working.
struct KeepAliveHandles {
  #[allow(dead_code)]
  app: ApplicationHandle,
  #[allow(dead_code)]
  advertisement: AdvertisementHandle,
}

fn current_runtime() -> Result<Handle, Error> {
  Handle::try_current().map_err(|e| Error::native("open adapter", e.to_string()))
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn runtime_is_required() {
    let err = current_runtime().unwrap_err();
    assert!(matches!(err, Error::Native { operation: "open adapter", .. }));
  }

  #[tokio::test]
  async fn runtime_is_picked_up_from_the_caller() {
    assert!(current_runtime().is_ok());
  }
}
