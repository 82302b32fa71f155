use crate::bridge;
use crate::characteristic::CharacteristicState;
use crate::config::PeripheralConfig;
use crate::descriptors::Service;
use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::native::{
  AdvertisingParameters, CharacteristicParameters, NativeAdapter, NativeCharacteristic,
  NativeServiceProvider,
};
use log::debug;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Local GATT server publishing application services through a native Bluetooth stack.
pub struct Peripheral {
  adapter: Arc<dyn NativeAdapter>,
  dispatcher: Dispatcher,
  config: PeripheralConfig,
}

impl Peripheral {
  pub fn new(adapter: impl NativeAdapter + 'static, config: PeripheralConfig) -> Self {
    Self {
      adapter: Arc::new(adapter),
      dispatcher: Dispatcher::new(config.await_timeout),
      config,
    }
  }

  pub fn config(&self) -> &PeripheralConfig {
    &self.config
  }

  /// Number of characteristics currently reachable by peer reads and writes.
  pub fn registered(&self) -> usize {
    self.dispatcher.len()
  }

  /// Creates `service` and all of its characteristics in the native stack, binds the
  /// characteristic handles it carries and starts advertising it as connectable and
  /// discoverable.
  ///
  /// Stops at the first failing step. Native objects created before the failure are not torn
  /// down, and characteristics bound before the failure stay bound, but nothing is advertised.
  pub async fn add_service(&self, service: &Service) -> Result<(), Error> {
    let timeout = self.config.await_timeout;

    let pending = self.adapter.create_service_provider(service.uuid)?;
    let provider: Arc<dyn NativeServiceProvider> =
      bridge::await_operation_within(pending, timeout).await?;
    let local_service = provider.service()?;
    debug!("Created service {}", local_service.uuid());

    let write_handler = self.dispatcher.write_handler();
    let read_handler = self.dispatcher.read_handler();

    for entry in &service.characteristics {
      let params = CharacteristicParameters {
        properties: entry.flags.as_u8(),
      };
      let pending = local_service.create_characteristic(entry.uuid, params)?;
      let characteristic: Arc<dyn NativeCharacteristic> =
        bridge::await_operation_within(pending, timeout).await?;

      characteristic.add_write_requested(write_handler.clone())?;
      characteristic.add_read_requested(read_handler.clone())?;
      debug!("Created characteristic {} (flags={:?})", entry.uuid, entry.flags);

      // Keep the state around for Characteristic::write and for peer reads.
      if let Some(handle) = &entry.handle {
        let state = Arc::new(CharacteristicState::new(
          entry.uuid,
          characteristic,
          entry.flags,
          entry.write_event.clone(),
          entry.value.clone(),
          timeout,
        ));
        handle.bind(state.clone())?;
        self.dispatcher.register(state);
      }
    }

    let params = AdvertisingParameters {
      connectable: true,
      discoverable: true,
    };
    let pending = provider.start_advertising(params)?;
    bridge::await_operation_within::<()>(pending, timeout).await?;
    debug!("Advertising service {}", service.uuid);
    Ok(())
  }
}

impl Debug for Peripheral {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Peripheral")
      .field("config", &self.config)
      .field("registered", &self.registered())
      .finish_non_exhaustive()
  }
}
