//! cvd-config
//!
//! Layered YAML configuration.
//!
//! Documents merge in order (earlier docs are base, later docs override),
//! then the environment override layer is merged on top. The effective JSON
//! is checked for secret-looking literals, canonicalized and hashed, and
//! finally deserialized into [`PipelineConfig`].

use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

mod pipeline;

pub use pipeline::{
    env_override_layer, ApiConfig, DatabaseConfig, FeedsConfig, PipelineConfig, ScheduleConfig,
    DEFAULT_SERIES_BASE_URL, DEFAULT_SNAPSHOT_BASE_URL, ENV_OVERRIDES,
};

/// Known secret-like prefixes. If any leaf string value in the effective
/// config starts with one of these, loading aborts with CONFIG_SECRET_DETECTED.
/// Credentials (including the database URL) come from the environment only.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",        // OpenAI style
    "AKIA",       // AWS access key ID
    "-----BEGIN", // PEM private keys
    "ghp_",       // GitHub PAT
    "gho_",       // GitHub OAuth
    "glpat-",     // GitLab PAT
    "xoxb-",      // Slack bot token
    "postgres://",
    "postgresql://",
];

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

/// Effective configuration of one process: the hashed JSON plus the typed view.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub loaded: LoadedConfig,
    pub pipeline: PipelineConfig,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = read_docs(paths)?;
    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    finish(merge_yaml_docs(yaml_docs)?)
}

/// Load YAML files, apply `CVD_*` overrides from the process environment,
/// and build the typed config.
pub fn load_pipeline_config(paths: &[&str]) -> Result<EffectiveConfig> {
    let docs = read_docs(paths)?;
    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_pipeline_config_from_strings(&doc_refs, |k| std::env::var(k).ok())
}

/// Same as [`load_pipeline_config`] with explicit docs and env lookup.
pub fn load_pipeline_config_from_strings(
    yaml_docs: &[&str],
    env: impl Fn(&str) -> Option<String>,
) -> Result<EffectiveConfig> {
    let merged = merge_yaml_docs(yaml_docs)?;
    let merged = deep_merge(merged, env_override_layer(env)?);
    let loaded = finish(merged)?;
    let pipeline = PipelineConfig::from_json(&loaded.config_json)?;
    Ok(EffectiveConfig { loaded, pipeline })
}

fn read_docs(paths: &[&str]) -> Result<Vec<String>> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }
    Ok(docs)
}

fn merge_yaml_docs(yaml_docs: &[&str]) -> Result<Value> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        // An empty document parses as null; treat it as an empty layer.
        if v_json.is_null() {
            continue;
        }
        merged = deep_merge(merged, v_json);
    }
    Ok(merged)
}

fn finish(merged: Value) -> Result<LoadedConfig> {
    enforce_no_secret_literals(&merged)?;

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn canonicalize_json(v: &Value) -> Result<String> {
    // serde_json's default Map is a BTreeMap, so keys serialize sorted.
    let s = serde_json::to_string(v).context("canonical json serialize failed")?;
    Ok(s)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, k.replace('~', "~0").replace('/', "~1"));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                collect_leaf_pointers(vv, &format!("{prefix}/{i}"), out);
            }
        }
        _ => out.push(prefix.to_string()),
    }
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(s) = v.pointer(&ptr).and_then(Value::as_str) {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
            }
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}
