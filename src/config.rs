use std::time::Duration;

/// Settings shared by the registrar, the dispatcher and the native backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeripheralConfig {
  /// Name placed in the advertisement.
  pub local_name: Option<String>,
  pub appearance: Option<u16>,
  /// Host adapter to use (e.g. `hci0`); the system default when unset.
  pub adapter_name: Option<String>,
  /// Upper bound on every wait for the native stack. `None` waits indefinitely.
  pub await_timeout: Option<Duration>,
}

impl PeripheralConfig {
  pub fn with_local_name(mut self, name: &str) -> Self {
    self.local_name = Some(name.to_owned());
    self
  }

  pub fn with_appearance(mut self, appearance: u16) -> Self {
    self.appearance = Some(appearance);
    self
  }

  pub fn with_adapter_name(mut self, adapter: &str) -> Self {
    self.adapter_name = Some(adapter.to_owned());
    self
  }

  pub fn with_await_timeout(mut self, timeout: Duration) -> Self {
    self.await_timeout = Some(timeout);
    self
  }
}
