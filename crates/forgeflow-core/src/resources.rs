use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::CoreError;

const DEFAULT_SECTION: &str = "__default__";
const THREADS_KEY: &str = "threads";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl fmt::Display for ResourceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceValue::Int(v) => write!(f, "{v}"),
            ResourceValue::Float(v) => write!(f, "{v}"),
            ResourceValue::Bool(v) => write!(f, "{v}"),
            ResourceValue::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for ResourceValue {
    fn from(v: i64) -> Self {
        ResourceValue::Int(v)
    }
}

impl From<&str> for ResourceValue {
    fn from(v: &str) -> Self {
        ResourceValue::Str(v.to_string())
    }
}

/// Per-job key -> value map, e.g. `threads`, `memory`, `time`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resources(BTreeMap<String, ResourceValue>);

impl Resources {
    pub fn new() -> Self {
        Resources(BTreeMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ResourceValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ResourceValue> {
        self.0.get(key)
    }

    /// Thread/CPU count; `1` if absent, matching `RootResources`'s default.
    pub fn threads(&self) -> u32 {
        match self.0.get(THREADS_KEY) {
            Some(ResourceValue::Int(v)) => (*v).max(1) as u32,
            Some(ResourceValue::Str(s)) => s.parse().unwrap_or(1),
            _ => 1,
        }
    }

    /// `self` as defaults, overridden key-by-key by `specific`.
    pub fn merged_with(&self, specific: &Resources) -> Resources {
        let mut merged = self.0.clone();
        for (k, v) in &specific.0 {
            merged.insert(k.clone(), v.clone());
        }
        Resources(merged)
    }

    pub fn to_cli(&self, opts: &CliRenderOptions) -> Vec<String> {
        self.0
            .iter()
            .map(|(key, value)| {
                let rendered = match opts.rename.get(key) {
                    Some(KeyTransform::Custom(f)) => f(value),
                    Some(KeyTransform::Rename(renamed)) => render_token(renamed, value, opts),
                    None => render_token(key, value, opts),
                };
                shell_escape::escape(rendered.into()).into_owned()
            })
            .collect()
    }
}

fn render_token(key: &str, value: &ResourceValue, opts: &CliRenderOptions) -> String {
    if key.chars().count() == 1 {
        format!("{}{key}{value}", opts.short_opt_prefix)
    } else {
        format!("{}{key}{}{value}", opts.long_opt_prefix, opts.long_opt_sep)
    }
}

#[derive(Clone)]
pub enum KeyTransform {
    /// Replace the key, keeping the normal `-k<v>` / `--key=value` rendering.
    Rename(String),
    /// Compute the whole rendered token (before shell-escaping) from the value.
    Custom(Arc<dyn Fn(&ResourceValue) -> String + Send + Sync>),
}

impl fmt::Debug for KeyTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyTransform::Rename(s) => write!(f, "Rename({s:?})"),
            KeyTransform::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CliRenderOptions {
    pub short_opt_prefix: String,
    pub long_opt_prefix: String,
    pub long_opt_sep: String,
    pub rename: BTreeMap<String, KeyTransform>,
}

impl Default for CliRenderOptions {
    fn default() -> Self {
        CliRenderOptions {
            short_opt_prefix: "-".to_string(),
            long_opt_prefix: "--".to_string(),
            long_opt_sep: "=".to_string(),
            rename: BTreeMap::new(),
        }
    }
}

/// Loads the root `{job_name: {option: value}, __default__: {...}}` mapping
/// from a YAML or JSON resources file.
#[derive(Debug, Clone, Default)]
pub struct RootResources {
    default: Resources,
    per_job: BTreeMap<String, Resources>,
}

impl RootResources {
    /// Empty resources: just `threads = 1` in `__default__`.
    pub fn empty() -> Self {
        let mut default = Resources::new();
        default.insert(THREADS_KEY, 1i64);
        RootResources {
            default,
            per_job: BTreeMap::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        debug!("loading resources from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let root: JsonValue = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&contents)
                .map_err(|e| CoreError::ResourcesParse { path: path.to_path_buf(), reason: e.to_string() })?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&contents)
                .map_err(|e| CoreError::ResourcesParse { path: path.to_path_buf(), reason: e.to_string() })?,
            _ => return Err(CoreError::UnsupportedResourcesExtension(path.to_path_buf())),
        };

        let root_map = root
            .as_object()
            .ok_or_else(|| CoreError::ResourcesNotAMapping(path.to_path_buf()))?;

        let default_json = root_map
            .get(DEFAULT_SECTION)
            .ok_or_else(|| CoreError::ResourcesMissingDefault(path.to_path_buf()))?;
        let default = resources_from_json(default_json);

        let mut per_job = BTreeMap::new();
        for (key, value) in root_map {
            if key == DEFAULT_SECTION {
                continue;
            }
            per_job.insert(key.clone(), resources_from_json(value));
        }

        Ok(RootResources { default, per_job })
    }

    pub fn for_job(&self, job_name: &str) -> Resources {
        match self.per_job.get(job_name) {
            Some(specific) => self.default.merged_with(specific),
            None => self.default.clone(),
        }
    }
}

fn resources_from_json(value: &JsonValue) -> Resources {
    let mut resources = Resources::new();
    if let Some(map) = value.as_object() {
        for (k, v) in map {
            let rv = match v {
                JsonValue::Bool(b) => ResourceValue::Bool(*b),
                JsonValue::Number(n) if n.is_i64() => ResourceValue::Int(n.as_i64().unwrap()),
                JsonValue::Number(n) => ResourceValue::Float(n.as_f64().unwrap_or_default()),
                JsonValue::String(s) => ResourceValue::Str(s.clone()),
                other => ResourceValue::Str(other.to_string()),
            };
            resources.insert(k.clone(), rv);
        }
    }
    resources
}
