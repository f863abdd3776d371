//! Cluster configuration artifact patching

use crate::atomic_write_bytes;
use crate::trial::{Protocol, TrialSpec};
use anyhow::{anyhow, Context, Result};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::Path;
use tracing::debug;

pub const PROTOCOL_KEY: &str = "protocol";
pub const MESH_TARGET_KEY: &str = "OPTIMUM_MESH_TARGET";
pub const MESH_MIN_KEY: &str = "OPTIMUM_MESH_MIN";
pub const MESH_MAX_KEY: &str = "OPTIMUM_MESH_MAX";

/// Sets the protocol, and for mesh trials with a profile the mesh degree
/// bounds. Every other key is left untouched.
pub fn patch_config(config: &mut Mapping, spec: &TrialSpec) {
    config.insert(
        Value::from(PROTOCOL_KEY),
        Value::from(spec.protocol.as_str()),
    );
    if let (Protocol::Mesh, Some(profile)) = (spec.protocol, spec.mesh_profile.as_ref()) {
        config.insert(Value::from(MESH_TARGET_KEY), Value::from(profile.target));
        config.insert(Value::from(MESH_MIN_KEY), Value::from(profile.min));
        config.insert(Value::from(MESH_MAX_KEY), Value::from(profile.max));
    }
}

/// Reads the artifact at `path`, patches it for `spec` and durably writes it
/// back. The write has reached stable storage when this returns.
pub fn apply_trial_settings(path: &Path, spec: &TrialSpec) -> Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read cluster config {}", path.display()))?;
    let value: Value = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse cluster config {}", path.display()))?;
    let mut config = match value {
        Value::Mapping(map) => map,
        Value::Null => Mapping::new(),
        other => {
            return Err(anyhow!(
                "cluster config {} must be a mapping, found {}",
                path.display(),
                yaml_type_name(&other)
            ))
        }
    };
    patch_config(&mut config, spec);
    let out = serde_yaml::to_string(&config)?;
    atomic_write_bytes(path, out.as_bytes())?;
    debug!(path = %path.display(), trial = %spec.label(), "Wrote cluster config");
    Ok(())
}

fn yaml_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeshProfile;
    use crate::test_dir;

    fn read_mapping(path: &Path) -> Mapping {
        let raw = fs::read_to_string(path).expect("read");
        serde_yaml::from_str(&raw).expect("mapping")
    }

    #[test]
    fn gossip_trial_only_sets_protocol() {
        let root = test_dir("artifact_gossip");
        let path = root.join("config_p2p_d.yml");
        fs::write(
            &path,
            "protocol: optimum-p2p\nnodes: 12\nOPTIMUM_MESH_TARGET: 6\n",
        )
        .expect("seed");
        let spec = TrialSpec::new(Protocol::Gossip, 10, None);
        apply_trial_settings(&path, &spec).expect("apply");

        let map = read_mapping(&path);
        assert_eq!(map.get("protocol").and_then(|v| v.as_str()), Some("gossipsub"));
        assert_eq!(map.get("nodes").and_then(|v| v.as_u64()), Some(12));
        assert_eq!(map.get(MESH_TARGET_KEY).and_then(|v| v.as_u64()), Some(6));
        assert!(map.get(MESH_MIN_KEY).is_none());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn mesh_trial_sets_degree_bounds() {
        let root = test_dir("artifact_mesh");
        let path = root.join("config.yml");
        fs::write(&path, "protocol: gossipsub\n").expect("seed");
        let spec = TrialSpec::new(
            Protocol::Mesh,
            50,
            Some(MeshProfile::new("high_density", 10, 8, 18)),
        );
        apply_trial_settings(&path, &spec).expect("apply");

        let map = read_mapping(&path);
        assert_eq!(map.get("protocol").and_then(|v| v.as_str()), Some("optimum-p2p"));
        assert_eq!(map.get(MESH_TARGET_KEY).and_then(|v| v.as_u64()), Some(10));
        assert_eq!(map.get(MESH_MIN_KEY).and_then(|v| v.as_u64()), Some(8));
        assert_eq!(map.get(MESH_MAX_KEY).and_then(|v| v.as_u64()), Some(18));
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn empty_file_is_treated_as_empty_mapping() {
        let root = test_dir("artifact_empty");
        let path = root.join("config.yml");
        fs::write(&path, "").expect("seed");
        apply_trial_settings(&path, &TrialSpec::new(Protocol::Gossip, 10, None)).expect("apply");
        assert_eq!(read_mapping(&path).len(), 1);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn non_mapping_and_missing_files_are_errors() {
        let root = test_dir("artifact_bad");
        let path = root.join("config.yml");
        fs::write(&path, "- a\n- b\n").expect("seed");
        let spec = TrialSpec::new(Protocol::Gossip, 10, None);
        let err = apply_trial_settings(&path, &spec).expect_err("sequence rejected");
        assert!(err.to_string().contains("sequence"), "{}", err);
        assert!(apply_trial_settings(&root.join("absent.yml"), &spec).is_err());
        let _ = fs::remove_dir_all(root);
    }
}
