//! In-memory collaborators for tests.
//!
//! Compiled for this crate's unit tests and, through the `test-utils`
//! feature, for integration tests and downstream crates.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::clock::Clock;
use crate::notifications::{Notifier, NotifyError};
use crate::resources::{InstanceDescription, NetworkInterface, ResourceControl, ResourceError};
use crate::restore::{DispatchError, RestoreDispatcher, RestoreRequest};
use crate::secrets::{SecretError, SecretStore};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Compute control plane held in memory.
#[derive(Debug, Default)]
pub struct MemoryResourceControl {
    instances: Mutex<HashMap<String, InstanceDescription>>,
    fail_describe: AtomicBool,
    fail_interface_updates: AtomicBool,
    tag_writes: AtomicUsize,
}

impl MemoryResourceControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance with `(interface id, groups)` pairs.
    pub fn add_instance(&self, instance_id: &str, interfaces: &[(&str, &[&str])]) {
        let description = InstanceDescription {
            instance_id: instance_id.to_string(),
            network_interfaces: interfaces
                .iter()
                .map(|(id, groups)| NetworkInterface {
                    id: (*id).to_string(),
                    groups: groups.iter().map(|g| (*g).to_string()).collect(),
                })
                .collect(),
            tags: HashMap::new(),
        };
        lock(&self.instances).insert(instance_id.to_string(), description);
    }

    /// Set a tag directly, bypassing the write counter.
    pub fn seed_tag(&self, instance_id: &str, key: &str, value: &str) {
        if let Some(inst) = lock(&self.instances).get_mut(instance_id) {
            inst.tags.insert(key.to_string(), value.to_string());
        }
    }

    pub fn fail_describe(&self, fail: bool) {
        self.fail_describe.store(fail, Ordering::SeqCst);
    }

    pub fn fail_interface_updates(&self, fail: bool) {
        self.fail_interface_updates.store(fail, Ordering::SeqCst);
    }

    /// Current groups of an interface, empty if unknown.
    pub fn groups(&self, interface_id: &str) -> Vec<String> {
        lock(&self.instances)
            .values()
            .flat_map(|i| &i.network_interfaces)
            .find(|eni| eni.id == interface_id)
            .map(|eni| eni.groups.clone())
            .unwrap_or_default()
    }

    pub fn tag(&self, instance_id: &str, key: &str) -> Option<String> {
        lock(&self.instances)
            .get(instance_id)
            .and_then(|i| i.tags.get(key).cloned())
    }

    /// Number of tag create/delete calls made through the trait.
    pub fn tag_writes(&self) -> usize {
        self.tag_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceControl for MemoryResourceControl {
    async fn describe_instance(&self, instance_id: &str) -> Result<InstanceDescription, ResourceError> {
        if self.fail_describe.load(Ordering::SeqCst) {
            return Err(ResourceError::Other("describe unavailable".into()));
        }
        lock(&self.instances)
            .get(instance_id)
            .cloned()
            .ok_or_else(|| ResourceError::InstanceNotFound(instance_id.to_string()))
    }

    async fn set_interface_groups(
        &self,
        interface_id: &str,
        group_ids: &[String],
    ) -> Result<(), ResourceError> {
        if self.fail_interface_updates.load(Ordering::SeqCst) {
            return Err(ResourceError::Other("interface update rejected".into()));
        }
        let mut instances = lock(&self.instances);
        let eni = instances
            .values_mut()
            .flat_map(|i| i.network_interfaces.iter_mut())
            .find(|eni| eni.id == interface_id)
            .ok_or_else(|| ResourceError::Api {
                status: 404,
                message: format!("interface {interface_id} not found"),
            })?;
        eni.groups = group_ids.to_vec();
        Ok(())
    }

    async fn set_tags(
        &self,
        instance_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), ResourceError> {
        self.tag_writes.fetch_add(1, Ordering::SeqCst);
        let mut instances = lock(&self.instances);
        let inst = instances
            .get_mut(instance_id)
            .ok_or_else(|| ResourceError::InstanceNotFound(instance_id.to_string()))?;
        inst.tags
            .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn delete_tags(&self, instance_id: &str, keys: &[String]) -> Result<(), ResourceError> {
        self.tag_writes.fetch_add(1, Ordering::SeqCst);
        let mut instances = lock(&self.instances);
        let inst = instances
            .get_mut(instance_id)
            .ok_or_else(|| ResourceError::InstanceNotFound(instance_id.to_string()))?;
        for key in keys {
            inst.tags.remove(key);
        }
        Ok(())
    }
}

/// Secret store returning a fixed secret.
#[derive(Debug)]
pub struct StaticSecretStore {
    secret: Mutex<Vec<u8>>,
    unavailable: AtomicBool,
    fetches: AtomicUsize,
}

impl StaticSecretStore {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: Mutex::new(secret.into()),
            unavailable: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Swap the secret, as a rotation would.
    pub fn rotate(&self, secret: impl Into<Vec<u8>>) {
        *lock(&self.secret) = secret.into();
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn get_secret(&self, reference: &str) -> Result<Zeroizing<Vec<u8>>, SecretError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SecretError::NotFound(reference.to_string()));
        }
        Ok(Zeroizing::new(lock(&self.secret).clone()))
    }
}

/// Notifier that records every message.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Recorded `(subject, body)` pairs.
    pub fn messages(&self) -> Vec<(String, String)> {
        lock(&self.messages).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, subject: &str, body: &str) -> Result<String, NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::ApiError {
                status: 503,
                body: "sink down".into(),
            });
        }
        let mut messages = lock(&self.messages);
        messages.push((subject.to_string(), body.to_string()));
        Ok(format!("msg-{}", messages.len()))
    }
}

/// Dispatcher that records requests instead of running them.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    requests: Mutex<Vec<RestoreRequest>>,
    failing: AtomicBool,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<RestoreRequest> {
        lock(&self.requests).clone()
    }
}

impl RestoreDispatcher for RecordingDispatcher {
    fn dispatch(&self, request: RestoreRequest) -> Result<(), DispatchError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DispatchError::Unavailable("dispatcher offline".into()));
        }
        lock(&self.requests).push(request);
        Ok(())
    }
}

/// Clock advanced by hand.
#[derive(Debug)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub const fn new(now: i64) -> Self {
        Self(AtomicI64::new(now))
    }

    pub fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}
