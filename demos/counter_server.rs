use bluer_gatt_peripheral::bluez::BluezAdapter;
use bluer_gatt_peripheral::{
  Characteristic, CharacteristicConfig, CharacteristicPermission, Connection, Peripheral,
  PeripheralConfig, Service, WriteEvent,
};
use byteorder::{ByteOrder, LittleEndian};
use enumset::enum_set;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::select;
use uuid::Uuid;

const COUNTER_SERVICE_UUID: Uuid = Uuid::from_u128(0xFEEDC0DE);
const COUNTER_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0xF00DC0DE00001);

#[tokio::main]
async fn main() -> Result<(), bluer_gatt_peripheral::Error> {
  env_logger::init();

  let config = PeripheralConfig::default()
    .with_local_name("gatt_counter")
    .with_await_timeout(Duration::from_secs(10));
  let adapter = BluezAdapter::open(&config).await?;
  let peripheral = Peripheral::new(adapter, config);

  let on_write: WriteEvent = Arc::new(|conn: Connection, offset: usize, value: &[u8]| {
    info!("Write on {conn:?}: offset={offset}, value={value:02x?}");
  });
  let counter = Characteristic::new();
  let service = Service {
    uuid: COUNTER_SERVICE_UUID,
    characteristics: vec![CharacteristicConfig {
      uuid: COUNTER_CHARACTERISTIC_UUID,
      flags: enum_set!(
        CharacteristicPermission::Read
          | CharacteristicPermission::Write
          | CharacteristicPermission::Notify
      ),
      value: vec![0; 4],
      write_event: Some(on_write),
      handle: Some(counter.clone()),
    }],
  };
  peripheral.add_service(&service).await?;

  println!("Started counter server. Press Enter to exit.");
  let stdin = BufReader::new(tokio::io::stdin());
  let mut lines = stdin.lines();
  let mut ticker = tokio::time::interval(Duration::from_secs(1));
  let mut count = 0u32;

  loop {
    select! {
      _ = lines.next_line() => break,
      _ = ticker.tick() => {
        count = count.wrapping_add(1);
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, count);
        if let Err(e) = counter.write(&buf).await {
          warn!("Counter update not delivered: {e}");
        }
      }
    }
  }

  Ok(())
}
