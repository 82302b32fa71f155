use crate::native::NotificationResult;
use bluer::gatt::local::CharacteristicNotifier;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use log::debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// One central's notification session.
pub(super) trait NotifySink: Send + 'static {
  fn is_stopped(&self) -> bool;

  fn deliver(&mut self, value: Vec<u8>) -> BoxFuture<'_, Result<(), String>>;
}

impl NotifySink for CharacteristicNotifier {
  fn is_stopped(&self) -> bool {
    CharacteristicNotifier::is_stopped(self)
  }

  fn deliver(&mut self, value: Vec<u8>) -> BoxFuture<'_, Result<(), String>> {
    async move { self.notify(value).await.map_err(|e| e.to_string()) }.boxed()
  }
}

struct Subscriber<S> {
  id: usize,
  sink: S,
}

/// Centrals currently subscribed to one characteristic.
///
/// The list stays locked for a whole fan-out, so overlapping notifications reach every
/// subscriber one after the other.
pub(super) struct Subscribers<S = CharacteristicNotifier> {
  active: Arc<Mutex<Vec<Subscriber<S>>>>,
  next_id: Arc<AtomicUsize>,
}

impl<S> Clone for Subscribers<S> {
  fn clone(&self) -> Self {
    Self {
      active: self.active.clone(),
      next_id: self.next_id.clone(),
    }
  }
}

impl<S> Default for Subscribers<S> {
  fn default() -> Self {
    Self {
      active: Default::default(),
      next_id: Default::default(),
    }
  }
}

impl<S: NotifySink> Subscribers<S> {
  pub(super) async fn add(&self, sink: S) {
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    debug!("Subscriber #{id} added");
    self.active.lock().await.push(Subscriber { id, sink });
  }

  /// Sends `value` to every live subscriber and forgets those that have unsubscribed.
  pub(super) async fn notify_all(&self, value: Vec<u8>) -> Vec<NotificationResult> {
    let mut subscribers = self.active.lock().await;
    prune(&mut subscribers);

    let mut results = Vec::with_capacity(subscribers.len());
    for subscriber in subscribers.iter_mut() {
      let label = format!("subscriber #{}", subscriber.id);
      let result = match subscriber.sink.deliver(value.clone()).await {
        Ok(()) => NotificationResult::delivered(label),
        Err(e) => NotificationResult::failed(label, e),
      };
      results.push(result);
    }

    prune(&mut subscribers);
    results
  }
}

fn prune<S: NotifySink>(subscribers: &mut Vec<Subscriber<S>>) {
  subscribers.retain(|s| {
    let stopped = s.sink.is_stopped();
    if stopped {
      debug!("Subscriber #{} unsubscribed", s.id);
    }
    !stopped
  });
}
