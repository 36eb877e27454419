//! Service and component property values.
//!
//! Properties are an ordered string-keyed map of typed values. The ordering
//! only matters for deterministic debug output; lookups by filters are
//! case-insensitive on keys and handled in [`crate::filter`].

use std::collections::BTreeMap;
use std::fmt;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

/// Property key carrying the registry-assigned service id.
pub const SERVICE_ID: &str = "service.id";
/// Property key carrying the interfaces a service is published under.
pub const OBJECTCLASS: &str = "objectClass";
/// Property key for the service ranking.
pub const SERVICE_RANKING: &str = "service.ranking";
/// Property key for the persistent identifier of a configuration.
pub const SERVICE_PID: &str = "service.pid";
/// Property key for the factory PID of a factory configuration.
pub const SERVICE_FACTORYPID: &str = "service.factoryPid";
/// Property key for the id of the bundle that registered the service.
pub const SERVICE_BUNDLEID: &str = "service.bundleid";
/// Property key for the service scope.
pub const SERVICE_SCOPE: &str = "service.scope";
/// Component name, forced at activation.
pub const COMPONENT_NAME: &str = "component.name";
/// Component id, forced at activation.
pub const COMPONENT_ID: &str = "component.id";

/// Keys the registry owns; they are re-derived on every registration and
/// property update and stripped when a service is restarted.
pub(crate) const FRAMEWORK_KEYS: [&str; 4] = [SERVICE_ID, OBJECTCLASS, SERVICE_BUNDLEID, SERVICE_SCOPE];

/// Ordered property map.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A property value.
///
/// # Examples
///
/// ```rust
/// use osgi_mock::PropertyValue;
///
/// let ranking = PropertyValue::from(5);
/// assert_eq!(ranking.as_i64(), Some(5));
///
/// let name = PropertyValue::from("primary");
/// assert_eq!(name.as_str(), Some("primary"));
/// assert_eq!(name.to_string(), "primary");
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(untagged))]
pub enum PropertyValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Array(Vec<PropertyValue>),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(f) => Some(*f),
            PropertyValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::Array(values) => Some(values),
            _ => None,
        }
    }

    /// String elements of an array value, or the single string itself.
    pub fn as_string_list(&self) -> Vec<String> {
        match self {
            PropertyValue::String(s) => vec![s.clone()],
            PropertyValue::Array(values) => values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(s) => f.write_str(s),
            PropertyValue::Integer(i) => write!(f, "{}", i),
            PropertyValue::Float(v) => write!(f, "{}", v),
            PropertyValue::Boolean(b) => write!(f, "{}", b),
            PropertyValue::Array(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Integer(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Integer(value as i64)
    }
}

impl From<u64> for PropertyValue {
    fn from(value: u64) -> Self {
        PropertyValue::Integer(value as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Boolean(value)
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(values: Vec<T>) -> Self {
        PropertyValue::Array(values.into_iter().map(Into::into).collect())
    }
}

/// Builds a [`Properties`] map from `key => value` pairs.
///
/// ```rust
/// use osgi_mock::{properties, PropertyValue};
///
/// let props = properties! { "service.ranking" => 10, "name" => "a" };
/// assert_eq!(props.get("service.ranking"), Some(&PropertyValue::Integer(10)));
/// assert_eq!(props.len(), 2);
/// ```
#[macro_export]
macro_rules! properties {
    () => { $crate::Properties::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut props = $crate::Properties::new();
        $( props.insert(::std::string::String::from($key), $crate::PropertyValue::from($value)); )+
        props
    }};
}

/// Service ranking of a property map; absent or non-integer values rank 0.
pub fn ranking(properties: &Properties) -> i64 {
    properties
        .get(SERVICE_RANKING)
        .and_then(PropertyValue::as_i64)
        .unwrap_or(0)
}

/// Parses a JSON object into properties.
///
/// Nested objects are rejected because property values are flat.
#[cfg(feature = "config")]
pub fn properties_from_json(json: &str) -> crate::OsgiResult<Properties> {
    serde_json::from_str(json).map_err(|e| crate::OsgiError::ConfigurationIo(e.to_string()))
}
