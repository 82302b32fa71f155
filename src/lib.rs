pub mod bridge;
pub mod native;
mod characteristic;
mod config;
mod descriptors;
mod dispatcher;
mod error;
mod peripheral;

#[cfg(feature = "bluez")]
pub mod bluez;

#[cfg(test)]
mod mocks;

pub use characteristic::Characteristic;
pub use config::PeripheralConfig;
pub use descriptors::*;
pub use error::{Error, WriteError};
pub use peripheral::Peripheral;
