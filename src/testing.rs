//! Test doubles shared by the unit tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::remote::{RemoteApi, RemoteError, RemoteRequest, RemoteResult};
use crate::storage::KeyValueStore;

/// Clock that only moves when told to.
pub struct ManualClock {
  now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
  pub fn new() -> Self {
    Self::at(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
  }

  pub fn at(now: DateTime<Utc>) -> Self {
    Self {
      now: Mutex::new(now),
    }
  }

  pub fn advance(&self, by: Duration) {
    *self.now.lock().unwrap() += by;
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.now.lock().unwrap()
  }
}

/// Scripted server that records every request.
#[derive(Default)]
pub struct MockRemote {
  calls: Mutex<Vec<RemoteRequest>>,
  failures: Mutex<HashMap<String, RemoteError>>,
  responses: Mutex<HashMap<String, Value>>,
  delay: Option<std::time::Duration>,
}

impl MockRemote {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every call sleeps this long before answering.
  pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  /// Calls against `target` fail with `error`.
  pub fn fail(&self, target: &str, error: RemoteError) {
    self
      .failures
      .lock()
      .unwrap()
      .insert(target.to_string(), error);
  }

  pub fn succeed(&self, target: &str) {
    self.failures.lock().unwrap().remove(target);
  }

  /// Successful calls against `target` answer with `body`.
  pub fn respond(&self, target: &str, body: Value) {
    self
      .responses
      .lock()
      .unwrap()
      .insert(target.to_string(), body);
  }

  pub fn calls(&self) -> Vec<RemoteRequest> {
    self.calls.lock().unwrap().clone()
  }
}

impl RemoteApi for MockRemote {
  fn send(&self, request: RemoteRequest) -> BoxFuture<'_, RemoteResult<Option<Value>>> {
    Box::pin(async move {
      if let Some(delay) = self.delay {
        tokio::time::sleep(delay).await;
      }
      let target = request.target.clone();
      self.calls.lock().unwrap().push(request);

      if let Some(err) = self.failures.lock().unwrap().get(&target) {
        return Err(err.clone());
      }
      Ok(self.responses.lock().unwrap().get(&target).cloned())
    })
  }
}

/// Store whose every call can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
  inner: crate::storage::MemoryStore,
  broken: AtomicBool,
}

impl FlakyStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_broken(&self, broken: bool) {
    self.broken.store(broken, Ordering::SeqCst);
  }

  fn check(&self) -> Result<()> {
    if self.broken.load(Ordering::SeqCst) {
      Err(Error::StorageUnavailable("disk I/O error".into()))
    } else {
      Ok(())
    }
  }
}

impl KeyValueStore for FlakyStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    self.check()?;
    self.inner.get(key)
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    self.check()?;
    self.inner.set(key, value)
  }

  fn remove(&self, key: &str) -> Result<()> {
    self.check()?;
    self.inner.remove(key)
  }

  fn update(
    &self,
    key: &str,
    change: &mut dyn FnMut(Option<String>) -> Result<Option<String>>,
  ) -> Result<()> {
    self.check()?;
    self.inner.update(key, change)
  }
}
