//! In-memory configuration admin.
//!
//! Configurations are property maps keyed by PID, or by `factoryPid~name`
//! for factory configurations. Storage sits behind [`ConfigurationStore`] so
//! tests can inject failing or pre-seeded stores.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{OsgiError, OsgiResult};
use crate::filter::{parse_optional, Filter};
use crate::properties::{Properties, PropertyValue, SERVICE_FACTORYPID, SERVICE_PID};

/// Interface name the admin is published under.
pub const CONFIGURATION_ADMIN_INTERFACE: &str = "org.osgi.service.cm.ConfigurationAdmin";

/// Backing store for configurations.
pub trait ConfigurationStore: Send + Sync {
    fn load(&self, key: &str) -> io::Result<Option<Properties>>;
    fn store(&self, key: &str, properties: &Properties) -> io::Result<()>;
    fn delete(&self, key: &str) -> io::Result<bool>;
    fn keys(&self) -> io::Result<Vec<String>>;
}

/// Default store: a map behind a lock.
#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, Properties>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigurationStore for InMemoryStore {
    fn load(&self, key: &str) -> io::Result<Option<Properties>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn store(&self, key: &str, properties: &Properties) -> io::Result<()> {
        self.entries.write().insert(key.to_string(), properties.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> io::Result<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn keys(&self) -> io::Result<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

/// One configuration object.
#[derive(Clone)]
pub struct Configuration {
    pid: String,
    factory_pid: Option<String>,
    store: Arc<dyn ConfigurationStore>,
}

impl Configuration {
    pub fn pid(&self) -> &str {
        &self.pid
    }

    pub fn factory_pid(&self) -> Option<&str> {
        self.factory_pid.as_deref()
    }

    /// Stored properties, `None` until the first update.
    pub fn properties(&self) -> OsgiResult<Option<Properties>> {
        self.store.load(&self.pid).map_err(OsgiError::configuration_io)
    }

    /// Replaces the stored properties, stamping the PID keys.
    pub fn update(&self, mut properties: Properties) -> OsgiResult<()> {
        properties.insert(SERVICE_PID.to_string(), PropertyValue::from(self.pid.as_str()));
        if let Some(factory_pid) = &self.factory_pid {
            properties.insert(SERVICE_FACTORYPID.to_string(), PropertyValue::from(factory_pid.as_str()));
        }
        tracing::debug!(pid = %self.pid, keys = properties.len(), "configuration updated");
        self.store.store(&self.pid, &properties).map_err(OsgiError::configuration_io)
    }

    pub fn delete(&self) -> OsgiResult<()> {
        tracing::debug!(pid = %self.pid, "configuration deleted");
        self.store.delete(&self.pid).map(|_| ()).map_err(OsgiError::configuration_io)
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("pid", &self.pid)
            .field("factory_pid", &self.factory_pid)
            .finish()
    }
}

/// Configuration admin service of one container.
///
/// # Examples
///
/// ```rust
/// use osgi_mock::{properties, MockConfigurationAdmin, PropertyValue};
///
/// let admin = MockConfigurationAdmin::new();
/// admin.get_configuration("com.example.Greeter").update(properties! { "greeting" => "hi" }).unwrap();
///
/// let stored = admin.get_configuration("com.example.Greeter").properties().unwrap().unwrap();
/// assert_eq!(stored.get("greeting"), Some(&PropertyValue::from("hi")));
/// assert_eq!(stored.get("service.pid"), Some(&PropertyValue::from("com.example.Greeter")));
/// assert!(admin.list_configurations(Some("(greeting=bye)")).unwrap().is_none());
/// ```
#[derive(Clone)]
pub struct MockConfigurationAdmin {
    store: Arc<dyn ConfigurationStore>,
}

impl MockConfigurationAdmin {
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn ConfigurationStore>) -> Self {
        Self { store }
    }

    pub fn get_configuration(&self, pid: &str) -> Configuration {
        Configuration {
            pid: pid.to_string(),
            factory_pid: None,
            store: self.store.clone(),
        }
    }

    pub fn get_factory_configuration(&self, factory_pid: &str, name: &str) -> Configuration {
        Configuration {
            pid: format!("{}~{}", factory_pid, name),
            factory_pid: Some(factory_pid.to_string()),
            store: self.store.clone(),
        }
    }

    /// Configurations whose properties match `filter` (all, if `None`);
    /// `None` when nothing matches.
    pub fn list_configurations(&self, filter: Option<&str>) -> OsgiResult<Option<Vec<Configuration>>> {
        let filter = parse_optional(filter)?;
        let mut found = Vec::new();
        for key in self.store.keys().map_err(OsgiError::configuration_io)? {
            let Some(properties) = self.store.load(&key).map_err(OsgiError::configuration_io)? else {
                continue;
            };
            if filter.as_ref().map_or(true, |f| f.matches(&properties)) {
                let factory_pid = properties
                    .get(SERVICE_FACTORYPID)
                    .and_then(PropertyValue::as_str)
                    .map(str::to_string);
                found.push(Configuration {
                    pid: key,
                    factory_pid,
                    store: self.store.clone(),
                });
            }
        }
        Ok(if found.is_empty() { None } else { Some(found) })
    }

    /// Stored properties for `pid`, if any.
    pub(crate) fn properties_for(&self, pid: &str) -> OsgiResult<Option<Properties>> {
        self.store.load(pid).map_err(OsgiError::configuration_io)
    }
}

impl Default for MockConfigurationAdmin {
    fn default() -> Self {
        Self::new()
    }
}
