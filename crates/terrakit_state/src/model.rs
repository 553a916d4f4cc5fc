//! Provisioning state model.
//!
//! Mirrors the tool's JSON state file closely enough to round-trip the
//! fields terrakit reads, while tolerating fields it does not know about.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{StateError, StateResult};

/// Oldest state format version accepted by validation.
pub const MIN_STATE_VERSION: u32 = 3;
/// Newest state format version accepted by validation.
pub const MAX_STATE_VERSION: u32 = 5;

/// A provisioning state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub version: u32,
    #[serde(default)]
    pub terraform_version: String,
    #[serde(default)]
    pub serial: u64,
    #[serde(default)]
    pub lineage: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub outputs: BTreeMap<String, StateOutput>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub resources: Vec<StateResource>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub check_results: Vec<CheckResult>,
}

/// An output value recorded in state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateOutput {
    #[serde(default)]
    pub value: Value,
    #[serde(rename = "type", default)]
    pub value_type: Value,
    #[serde(default, skip_serializing_if = "is_false")]
    pub sensitive: bool,
}

/// A resource recorded in state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateResource {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,
    #[serde(rename = "type", default)]
    pub resource_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub module: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub tainted: bool,
    /// Raw per-instance objects as written by the tool.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instances: Vec<Value>,
}

/// A check result recorded in state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    #[serde(default)]
    pub object_kind: String,
    #[serde(default)]
    pub config_addr: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failure_messages: Vec<String>,
}

fn default_mode() -> String {
    "managed".to_string()
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl State {
    /// Create an empty state at the current format version.
    pub fn new(terraform_version: impl Into<String>, lineage: impl Into<String>) -> Self {
        Self {
            version: 4,
            terraform_version: terraform_version.into(),
            serial: 0,
            lineage: lineage.into(),
            outputs: BTreeMap::new(),
            resources: Vec::new(),
            check_results: Vec::new(),
        }
    }

    /// Parse a state document.
    pub fn from_slice(data: &[u8]) -> StateResult<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Compact serialization used for cache payloads.
    pub fn to_vec(&self) -> StateResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Indented serialization used for export.
    pub fn to_pretty_json(&self) -> StateResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Structural validation: supported version, non-empty tool version and
    /// lineage. Resource contents are not inspected.
    pub fn validate(&self) -> StateResult<()> {
        if !(MIN_STATE_VERSION..=MAX_STATE_VERSION).contains(&self.version) {
            return Err(StateError::Invalid(format!(
                "unsupported state version: {} (supported {}-{})",
                self.version, MIN_STATE_VERSION, MAX_STATE_VERSION
            )));
        }
        if self.terraform_version.trim().is_empty() {
            return Err(StateError::Invalid("missing terraform version".to_string()));
        }
        if self.lineage.trim().is_empty() {
            return Err(StateError::Invalid("missing state lineage".to_string()));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn resource(&self, address: &str) -> Option<&StateResource> {
        self.resources
            .iter()
            .find(|r| r.resolved_address() == address)
    }

    pub fn output(&self, name: &str) -> Option<&StateOutput> {
        self.outputs.get(name)
    }

    /// Addresses of all resources, sorted.
    pub fn resource_addresses(&self) -> BTreeSet<String> {
        self.resources.iter().map(|r| r.resolved_address()).collect()
    }

    pub fn with_resource(mut self, resource: StateResource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, output: StateOutput) -> Self {
        self.outputs.insert(name.into(), output);
        self
    }

    pub fn with_serial(mut self, serial: u64) -> Self {
        self.serial = serial;
        self
    }
}

impl StateOutput {
    pub fn new(value: Value) -> Self {
        let value_type = match &value {
            Value::String(_) => Value::String("string".to_string()),
            Value::Number(_) => Value::String("number".to_string()),
            Value::Bool(_) => Value::String("bool".to_string()),
            _ => Value::Null,
        };
        Self {
            value,
            value_type,
            sensitive: false,
        }
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

impl StateResource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: String::new(),
            resource_type: resource_type.into(),
            name: name.into(),
            provider: String::new(),
            module: String::new(),
            mode: default_mode(),
            id: None,
            attributes: BTreeMap::new(),
            dependencies: Vec::new(),
            tainted: false,
            instances: Vec::new(),
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn data(mut self) -> Self {
        self.mode = "data".to_string();
        self
    }

    /// The explicit address, or one derived from module, mode, type and name.
    pub fn resolved_address(&self) -> String {
        if !self.address.is_empty() {
            return self.address.clone();
        }
        let mut address = String::new();
        if !self.module.is_empty() {
            address.push_str(&self.module);
            address.push('.');
        }
        if self.mode == "data" {
            address.push_str("data.");
        }
        address.push_str(&self.resource_type);
        address.push('.');
        address.push_str(&self.name);
        address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_tool_state_document() {
        let raw = json!({
            "version": 4,
            "terraform_version": "1.6.2",
            "serial": 7,
            "lineage": "3f1c2a4e-0000-4000-8000-000000000001",
            "outputs": {
                "bucket": { "value": "assets", "type": "string" }
            },
            "resources": [
                {
                    "mode": "managed",
                    "type": "google_storage_bucket",
                    "name": "assets",
                    "provider": "provider[\"registry.terraform.io/hashicorp/google\"]",
                    "instances": [{ "attributes": { "name": "assets" } }]
                }
            ],
            "check_results": null
        });

        let state = State::from_slice(raw.to_string().as_bytes()).unwrap();

        assert_eq!(state.serial, 7);
        assert!(state.check_results.is_empty());
        assert_eq!(state.resources[0].instances.len(), 1);
        assert_eq!(
            state.resource_addresses().into_iter().collect::<Vec<_>>(),
            vec!["google_storage_bucket.assets".to_string()]
        );
        assert!(state.is_valid());
    }

    #[test]
    fn test_resolved_address_includes_module_and_data_mode() {
        let resource = StateResource::new("google_compute_network", "vpc")
            .with_module("module.network")
            .data();
        assert_eq!(
            resource.resolved_address(),
            "module.network.data.google_compute_network.vpc"
        );

        let mut explicit = StateResource::new("aws_instance", "web");
        explicit.address = "aws_instance.web[0]".to_string();
        assert_eq!(explicit.resolved_address(), "aws_instance.web[0]");
    }

    #[test]
    fn test_validate_version_bounds() {
        let mut state = State::new("1.6.2", "lineage");
        for version in [3, 4, 5] {
            state.version = version;
            assert!(state.validate().is_ok());
        }
        for version in [2, 6] {
            state.version = version;
            assert!(matches!(state.validate(), Err(StateError::Invalid(_))));
        }
    }

    #[test]
    fn test_validate_requires_lineage_and_tool_version() {
        assert!(State::new("", "lineage").validate().is_err());
        assert!(State::new("1.6.2", " ").validate().is_err());
    }

    #[test]
    fn test_output_type_inference() {
        assert_eq!(StateOutput::new(json!("x")).value_type, json!("string"));
        assert_eq!(StateOutput::new(json!(1)).value_type, json!("number"));
        assert!(StateOutput::new(json!(true)).sensitive().sensitive);
    }
}
