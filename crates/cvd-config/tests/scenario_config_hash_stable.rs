//! Config hash stability + layered file loading.
//!
//! GREEN when:
//! - the same inputs hash identically
//! - key order inside YAML does not change the hash
//! - a changed value changes the hash
//! - env overrides land in the effective config and in its hash
//! - files load in the given order

use std::io::Write;

use cvd_config::{
    load_layered_yaml, load_layered_yaml_from_strings, load_pipeline_config_from_strings,
    PipelineConfig,
};

const BASE_YAML: &str = r#"
feeds:
  snapshot_base_url: "https://example.test/FeatureServer/1"
  series_base_url: "https://example.test/series"
  timeout_secs: 20
schedule:
  interval_secs: 1800
"#;

const BASE_YAML_REORDERED: &str = r#"
schedule:
  interval_secs: 1800
feeds:
  timeout_secs: 20
  series_base_url: "https://example.test/series"
  snapshot_base_url: "https://example.test/FeatureServer/1"
"#;

const OVERRIDE_YAML: &str = r#"
schedule:
  interval_secs: 600
"#;

fn no_env(_: &str) -> Option<String> {
    None
}

#[test]
fn same_inputs_same_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.config_hash.len(), 64);
}

#[test]
fn key_order_does_not_change_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn changed_value_changes_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML, OVERRIDE_YAML]).unwrap();
    assert_ne!(a.config_hash, b.config_hash);
}

#[test]
fn typed_config_follows_layers() {
    let eff = load_pipeline_config_from_strings(&[BASE_YAML, OVERRIDE_YAML], no_env).unwrap();
    assert_eq!(eff.pipeline.schedule.interval_secs, 600);
    assert_eq!(eff.pipeline.feeds.timeout_secs, 20);
    assert_eq!(eff.pipeline.api, PipelineConfig::default().api);
}

#[test]
fn env_override_beats_yaml_and_changes_hash() {
    let plain = load_pipeline_config_from_strings(&[BASE_YAML], no_env).unwrap();
    let env = |k: &str| match k {
        "CVD_INTERVAL_SECS" => Some("5".to_string()),
        "CVD_SERIES_BASE_URL" => Some("http://127.0.0.1:9/series".to_string()),
        _ => None,
    };
    let overridden = load_pipeline_config_from_strings(&[BASE_YAML], env).unwrap();

    assert_eq!(overridden.pipeline.schedule.interval_secs, 5);
    assert_eq!(
        overridden.pipeline.feeds.series_base_url,
        "http://127.0.0.1:9/series"
    );
    assert_ne!(plain.loaded.config_hash, overridden.loaded.config_hash);
}

#[test]
fn files_load_in_order() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let base = dir.path().join("base.yaml");
    let over = dir.path().join("override.yaml");
    std::fs::File::create(&base)?.write_all(BASE_YAML.as_bytes())?;
    std::fs::File::create(&over)?.write_all(OVERRIDE_YAML.as_bytes())?;

    let base_s = base.to_string_lossy().to_string();
    let over_s = over.to_string_lossy().to_string();
    let cfg = load_layered_yaml(&[base_s.as_str(), over_s.as_str()])?;
    assert_eq!(cfg.config_json["schedule"]["interval_secs"], 600);

    let reversed = load_layered_yaml(&[over_s.as_str(), base_s.as_str()])?;
    assert_eq!(reversed.config_json["schedule"]["interval_secs"], 1800);
    Ok(())
}

#[test]
fn missing_file_names_path() {
    let err = load_layered_yaml(&["/definitely/not/here.yaml"]).unwrap_err();
    assert!(err.to_string().contains("/definitely/not/here.yaml"));
}
