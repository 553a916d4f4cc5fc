//! Structural differences between two states.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::model::{State, StateOutput, StateResource};

/// Differences between two cached states.
///
/// "Changed" is shallow: a resource present on both sides counts as changed
/// when its type, name, mode, provider or module differ, and an output when
/// its type or sensitivity differ. Attribute values are not compared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StateDiff {
    pub key_a: String,
    pub key_b: String,
    pub version_changed: bool,
    pub serial_changed: bool,
    pub added_resources: Vec<String>,
    pub removed_resources: Vec<String>,
    pub changed_resources: Vec<String>,
    pub added_outputs: Vec<String>,
    pub removed_outputs: Vec<String>,
    pub changed_outputs: Vec<String>,
}

impl StateDiff {
    /// Compare `b` against `a`. Added means present in `b` only.
    pub fn between(key_a: &str, a: &State, key_b: &str, b: &State) -> Self {
        let addrs_a = a.resource_addresses();
        let addrs_b = b.resource_addresses();

        let changed_resources = addrs_a
            .intersection(&addrs_b)
            .filter(|addr| match (a.resource(addr), b.resource(addr)) {
                (Some(ra), Some(rb)) => resource_changed(ra, rb),
                _ => false,
            })
            .cloned()
            .collect();

        let outs_a: BTreeSet<&String> = a.outputs.keys().collect();
        let outs_b: BTreeSet<&String> = b.outputs.keys().collect();

        let changed_outputs = outs_a
            .intersection(&outs_b)
            .filter(|name| output_changed(&a.outputs[name.as_str()], &b.outputs[name.as_str()]))
            .map(|name| (*name).clone())
            .collect();

        Self {
            key_a: key_a.to_string(),
            key_b: key_b.to_string(),
            version_changed: a.version != b.version,
            serial_changed: a.serial != b.serial,
            added_resources: addrs_b.difference(&addrs_a).cloned().collect(),
            removed_resources: addrs_a.difference(&addrs_b).cloned().collect(),
            changed_resources,
            added_outputs: outs_b.difference(&outs_a).map(|n| (*n).clone()).collect(),
            removed_outputs: outs_a.difference(&outs_b).map(|n| (*n).clone()).collect(),
            changed_outputs,
        }
    }

    /// True when nothing differs, including version and serial.
    pub fn is_empty(&self) -> bool {
        !self.version_changed && !self.serial_changed && !self.has_content_changes()
    }

    /// True when any resource or output differs.
    pub fn has_content_changes(&self) -> bool {
        !(self.added_resources.is_empty()
            && self.removed_resources.is_empty()
            && self.changed_resources.is_empty()
            && self.added_outputs.is_empty()
            && self.removed_outputs.is_empty()
            && self.changed_outputs.is_empty())
    }
}

fn resource_changed(a: &StateResource, b: &StateResource) -> bool {
    a.resource_type != b.resource_type
        || a.name != b.name
        || a.mode != b.mode
        || a.provider != b.provider
        || a.module != b.module
}

fn output_changed(a: &StateOutput, b: &StateOutput) -> bool {
    a.sensitive != b.sensitive || a.value_type != b.value_type
}
