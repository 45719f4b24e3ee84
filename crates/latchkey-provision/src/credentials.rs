//! Credential provider interface.

use latchkey_core::{ConfigKey, DeviceId};
use std::collections::HashMap;
use std::sync::RwLock;

/// Source of the device configuration secret.
///
/// Every provisioning command requires the key; when the provider has none
/// for a device, the task fails with the unauthorized device error before
/// any frame is written, and the caller must supply valid credentials
/// before retrying.
pub trait CredentialProvider: Send + Sync {
    /// The configuration key for a device, if known.
    fn configuration_key(&self, device: &DeviceId) -> Option<ConfigKey>;
}

impl<C: CredentialProvider> CredentialProvider for std::sync::Arc<C> {
    fn configuration_key(&self, device: &DeviceId) -> Option<ConfigKey> {
        C::configuration_key(self, device)
    }
}

/// Fixed in-memory credential map.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    keys: RwLock<HashMap<DeviceId, ConfigKey>>,
}

impl StaticCredentials {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider knowing a single device's key.
    #[must_use]
    pub fn single(device: DeviceId, key: ConfigKey) -> Self {
        let provider = Self::new();
        provider.insert(device, key);
        provider
    }

    pub fn insert(&self, device: DeviceId, key: ConfigKey) {
        if let Ok(mut keys) = self.keys.write() {
            keys.insert(device, key);
        }
    }

    pub fn remove(&self, device: &DeviceId) {
        if let Ok(mut keys) = self.keys.write() {
            keys.remove(device);
        }
    }
}

impl CredentialProvider for StaticCredentials {
    fn configuration_key(&self, device: &DeviceId) -> Option<ConfigKey> {
        self.keys.read().ok()?.get(device).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_credentials() {
        let device = DeviceId::new("dev").unwrap();
        let key = ConfigKey::new("ABCDEFGH").unwrap();
        let provider = StaticCredentials::single(device.clone(), key.clone());

        assert_eq!(provider.configuration_key(&device), Some(key));
        provider.remove(&device);
        assert_eq!(provider.configuration_key(&device), None);
    }
}
