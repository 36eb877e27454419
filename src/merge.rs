//! Property merging for registration and activation.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config_admin::MockConfigurationAdmin;
use crate::error::OsgiResult;
use crate::metadata::OsgiMetadata;
use crate::properties::{Properties, PropertyValue, COMPONENT_ID, COMPONENT_NAME};

static NEXT_COMPONENT_ID: AtomicU64 = AtomicU64::new(0);

/// Descriptor defaults, then stored configuration for each PID in declared
/// order, then call-site properties. Later layers win.
pub(crate) fn merge_with_metadata(
    metadata: &OsgiMetadata,
    admin: &MockConfigurationAdmin,
    call_site: &Properties,
) -> OsgiResult<Properties> {
    let mut merged = metadata.properties().clone();
    for pid in metadata.configuration_pids() {
        if let Some(stored) = admin.properties_for(&pid)? {
            merged.extend(stored);
        }
    }
    merged.extend(call_site.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(merged)
}

/// [`merge_with_metadata`] plus the forced `component.name` and a fresh
/// `component.id`.
pub(crate) fn merge_for_activation(
    metadata: &OsgiMetadata,
    admin: &MockConfigurationAdmin,
    call_site: &Properties,
) -> OsgiResult<Properties> {
    let mut merged = merge_with_metadata(metadata, admin, call_site)?;
    let id = NEXT_COMPONENT_ID.fetch_add(1, Ordering::SeqCst);
    merged.insert(COMPONENT_NAME.to_string(), PropertyValue::from(metadata.name()));
    merged.insert(COMPONENT_ID.to_string(), PropertyValue::from(id));
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties;

    #[test]
    fn test_layers_in_precedence_order() {
        let metadata = OsgiMetadata::new("m.Component")
            .with_property("key", "A")
            .with_property("only_default", true);
        let admin = MockConfigurationAdmin::new();
        admin.get_configuration("m.Component").update(properties! { "key" => "B" }).unwrap();

        let merged = merge_with_metadata(&metadata, &admin, &properties! { "key" => "C" }).unwrap();
        assert_eq!(merged.get("key"), Some(&PropertyValue::from("C")));
        assert_eq!(merged.get("only_default"), Some(&PropertyValue::from(true)));

        let merged = merge_with_metadata(&metadata, &admin, &Properties::new()).unwrap();
        assert_eq!(merged.get("key"), Some(&PropertyValue::from("B")));
    }

    #[test]
    fn test_multiple_pids_merge_in_declared_order() {
        let metadata = OsgiMetadata::new("m.Multi")
            .with_configuration_pid("first")
            .with_configuration_pid("second");
        let admin = MockConfigurationAdmin::new();
        admin.get_configuration("first").update(properties! { "k" => 1, "f" => 1 }).unwrap();
        admin.get_configuration("second").update(properties! { "k" => 2 }).unwrap();

        let merged = merge_with_metadata(&metadata, &admin, &Properties::new()).unwrap();
        assert_eq!(merged.get("k"), Some(&PropertyValue::from(2)));
        assert_eq!(merged.get("f"), Some(&PropertyValue::from(1)));
    }

    #[test]
    fn test_component_keys_cannot_be_overridden() {
        let metadata = OsgiMetadata::new("m.Named");
        let admin = MockConfigurationAdmin::new();
        let call_site = properties! { COMPONENT_NAME => "spoofed", COMPONENT_ID => -1 };

        let first = merge_for_activation(&metadata, &admin, &call_site).unwrap();
        let second = merge_for_activation(&metadata, &admin, &call_site).unwrap();
        assert_eq!(first.get(COMPONENT_NAME), Some(&PropertyValue::from("m.Named")));

        let id = |p: &Properties| p.get(COMPONENT_ID).and_then(PropertyValue::as_i64).unwrap();
        assert!(id(&first) >= 0);
        assert!(id(&second) > id(&first));
    }
}
