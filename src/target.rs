//! Target groups and the mapping from inventory records to them.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::inventory::InventoryRecord;

/// Prefix of every label attached to a discovered group, the monitoring
/// system drops `__meta_` labels after relabeling.
pub const META_LABEL_PREFIX: &str = "__meta_workspaces_";

/// Rendered in place of any attribute the inventory did not report.
pub const SENTINEL: &str = "null";

pub const IP_ADDRESS_LABEL: &str = "__meta_workspaces_ip_address";
pub const USERNAME_LABEL: &str = "__meta_workspaces_username";
pub const SUBNET_ID_LABEL: &str = "__meta_workspaces_subnet_id";
pub const STATE_LABEL: &str = "__meta_workspaces_state";
pub const DIRECTORY_ID_LABEL: &str = "__meta_workspaces_directory_id";
pub const BUNDLE_ID_LABEL: &str = "__meta_workspaces_bundle_id";
pub const COMPUTE_TYPE_LABEL: &str = "__meta_workspaces_compute_type";
pub const RUNNING_MODE_LABEL: &str = "__meta_workspaces_running_mode";
pub const ROOT_VOLUME_SIZE_LABEL: &str = "__meta_workspaces_root_volume_size";
pub const USER_VOLUME_SIZE_LABEL: &str = "__meta_workspaces_user_volume_size";

const SOURCE_PREFIX: &str = "workspaces/";

/// The unit exchanged with the monitoring system's file based discovery.
///
/// A group without targets is a tombstone, it tells the consumer to forget
/// whatever it knows about `source`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TargetGroup {
    #[serde(skip)]
    pub source: String,
    pub targets: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

impl TargetGroup {
    pub fn tombstone(source: impl Into<String>) -> Self {
        TargetGroup {
            source: source.into(),
            targets: vec![],
            labels: BTreeMap::new(),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.targets.is_empty()
    }
}

/// The stable join key used to diff consecutive polls.
pub fn source_key(workspace_id: &str) -> String {
    format!("{SOURCE_PREFIX}{workspace_id}")
}

/// Turns inventory records into target groups. Total, missing attributes are
/// rendered as `SENTINEL` so every group carries the full label set.
#[derive(Clone, Copy, Debug)]
pub struct Mapper {
    exporter_port: u16,
}

impl Mapper {
    pub fn new(exporter_port: u16) -> Self {
        Mapper { exporter_port }
    }

    pub fn map(&self, record: InventoryRecord) -> TargetGroup {
        let InventoryRecord {
            workspace_id,
            ip_address,
            subnet_id,
            user_name,
            state,
            directory_id,
            bundle_id,
            workspace_properties,
        } = record;

        // the subnet is only meaningful together with an address
        let (address, subnet_id) = match ip_address {
            Some(address) => (address, or_sentinel(subnet_id)),
            None => (SENTINEL.to_string(), SENTINEL.to_string()),
        };
        let properties = workspace_properties.unwrap_or_default();

        let labels = BTreeMap::from([
            (IP_ADDRESS_LABEL.to_string(), address.clone()),
            (USERNAME_LABEL.to_string(), or_sentinel(user_name)),
            (SUBNET_ID_LABEL.to_string(), subnet_id),
            (STATE_LABEL.to_string(), or_sentinel(state)),
            (DIRECTORY_ID_LABEL.to_string(), or_sentinel(directory_id)),
            (BUNDLE_ID_LABEL.to_string(), or_sentinel(bundle_id)),
            (
                COMPUTE_TYPE_LABEL.to_string(),
                or_sentinel(properties.compute_type_name),
            ),
            (
                RUNNING_MODE_LABEL.to_string(),
                or_sentinel(properties.running_mode),
            ),
            (
                ROOT_VOLUME_SIZE_LABEL.to_string(),
                or_sentinel(properties.root_volume_size_gib.map(|size| size.to_string())),
            ),
            (
                USER_VOLUME_SIZE_LABEL.to_string(),
                or_sentinel(properties.user_volume_size_gib.map(|size| size.to_string())),
            ),
        ]);

        TargetGroup {
            source: source_key(&workspace_id),
            targets: vec![format!("{}:{}", address, self.exporter_port)],
            labels,
        }
    }
}

fn or_sentinel(value: Option<String>) -> String {
    value.unwrap_or_else(|| SENTINEL.to_string())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::inventory::WorkspaceProperties;

    fn full_record() -> InventoryRecord {
        InventoryRecord {
            workspace_id: "ws-abc".to_string(),
            ip_address: Some("10.0.0.1".to_string()),
            subnet_id: Some("subnet-1".to_string()),
            user_name: Some("alice".to_string()),
            state: Some("AVAILABLE".to_string()),
            directory_id: Some("d-123".to_string()),
            bundle_id: Some("wsb-1".to_string()),
            workspace_properties: Some(WorkspaceProperties {
                compute_type_name: Some("PERFORMANCE".to_string()),
                running_mode: Some("ALWAYS_ON".to_string()),
                root_volume_size_gib: Some(80),
                user_volume_size_gib: Some(100),
            }),
        }
    }

    #[test]
    fn map_full_record() {
        let group = Mapper::new(9182).map(full_record());

        assert_eq!(group.source, "workspaces/ws-abc");
        assert_eq!(group.targets, vec!["10.0.0.1:9182".to_string()]);
        assert!(!group.is_tombstone());

        let want = [
            ("__meta_workspaces_bundle_id", "wsb-1"),
            ("__meta_workspaces_compute_type", "PERFORMANCE"),
            ("__meta_workspaces_directory_id", "d-123"),
            ("__meta_workspaces_ip_address", "10.0.0.1"),
            ("__meta_workspaces_root_volume_size", "80"),
            ("__meta_workspaces_running_mode", "ALWAYS_ON"),
            ("__meta_workspaces_state", "AVAILABLE"),
            ("__meta_workspaces_subnet_id", "subnet-1"),
            ("__meta_workspaces_user_volume_size", "100"),
            ("__meta_workspaces_username", "alice"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<BTreeMap<_, _>>();
        assert_eq!(group.labels, want);
    }

    #[test]
    fn missing_address_uses_sentinel() {
        let record = InventoryRecord {
            ip_address: None,
            ..full_record()
        };

        let group = Mapper::new(9182).map(record);

        assert_eq!(group.targets, vec!["null:9182".to_string()]);
        assert_eq!(group.labels[IP_ADDRESS_LABEL], SENTINEL);
        // a reported subnet is dropped along with the address
        assert_eq!(group.labels[SUBNET_ID_LABEL], SENTINEL);
    }

    #[test]
    fn bare_record_is_fully_labeled() {
        let record = InventoryRecord {
            workspace_id: "ws-bare".to_string(),
            ..Default::default()
        };

        let group = Mapper::new(1234).map(record);

        assert_eq!(group.source, "workspaces/ws-bare");
        assert_eq!(group.labels.len(), 10);
        assert!(group.labels.keys().all(|k| k.starts_with(META_LABEL_PREFIX)));
        assert!(group.labels.values().all(|v| v == SENTINEL));
    }

    #[test]
    fn empty_attribute_is_kept() {
        let record = InventoryRecord {
            user_name: Some(String::new()),
            ..full_record()
        };

        let group = Mapper::new(9182).map(record);
        assert_eq!(group.labels[USERNAME_LABEL], "");
    }

    #[test]
    fn source_is_stable() {
        let mapper = Mapper::new(9182);

        assert_eq!(mapper.map(full_record()), mapper.map(full_record()));
    }

    #[test]
    fn tombstone() {
        let group = TargetGroup::tombstone("workspaces/gone");

        assert!(group.is_tombstone());
        assert!(group.labels.is_empty());
        assert_eq!(group.source, "workspaces/gone");
    }

    #[test]
    fn serialize_file_sd_entry() {
        let group = TargetGroup {
            source: "workspaces/ws-1".to_string(),
            targets: vec!["10.0.0.1:9182".to_string()],
            labels: BTreeMap::from([(STATE_LABEL.to_string(), "AVAILABLE".to_string())]),
        };

        assert_eq!(
            serde_json::to_string(&group).unwrap(),
            r#"{"targets":["10.0.0.1:9182"],"labels":{"__meta_workspaces_state":"AVAILABLE"}}"#
        );
    }
}
