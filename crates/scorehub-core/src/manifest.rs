use anyhow::{anyhow, bail, Context as _, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

pub const CATALOG_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// One plugin entry from either the catalog or the installed manifest.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PluginEntry {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct PluginDocument {
    #[serde(default)]
    plugins: Option<Value>,
}

pub type PluginMap = BTreeMap<String, PluginEntry>;

pub fn load_catalog(path: &Path) -> PluginMap {
    load_plugin_map(path, "catalog")
}

pub fn load_installed(path: &Path) -> PluginMap {
    load_plugin_map(path, "installed manifest")
}

fn load_plugin_map(path: &Path, label: &str) -> PluginMap {
    match read_plugin_map(path) {
        Ok(map) => {
            tracing::debug!(path = %path.display(), count = map.len(), "loaded {label}");
            map
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), "failed to read {label}: {err:#}");
            PluginMap::new()
        }
    }
}

pub fn read_plugin_map(path: &Path) -> Result<PluginMap> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_plugin_map(&raw).with_context(|| format!("parse {}", path.display()))
}

pub fn parse_plugin_map(raw: &str) -> Result<PluginMap> {
    Ok(parse_plugin_entries(raw)?
        .into_iter()
        .map(|entry| (entry.name.clone(), entry))
        .collect())
}

/// Entries in manifest order, duplicates included.
pub fn parse_plugin_entries(raw: &str) -> Result<Vec<PluginEntry>> {
    let document: PluginDocument = serde_json::from_str(raw)?;
    let Some(Value::Array(items)) = document.plugins else {
        bail!("'plugins' key is missing or not a list");
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if !matches!(item.get("name"), Some(Value::String(_))) {
            tracing::warn!("skipping plugin entry without a name: {item}");
            continue;
        }
        match serde_json::from_value::<PluginEntry>(item) {
            Ok(entry) => out.push(entry),
            Err(err) => tracing::warn!("skipping malformed plugin entry: {err}"),
        }
    }
    Ok(out)
}

/// Installed plugin names in the order `plugins.json` lists them. Read
/// failures yield an empty list.
pub fn load_installed_names(path: &Path) -> Vec<String> {
    let entries = fs::read_to_string(path)
        .with_context(|| format!("read {}", path.display()))
        .and_then(|raw| parse_plugin_entries(&raw));
    match entries {
        Ok(entries) => entries.into_iter().map(|entry| entry.name).collect(),
        Err(err) => {
            tracing::warn!(path = %path.display(), "failed to read installed manifest: {err:#}");
            Vec::new()
        }
    }
}

/// Why the installed manifest cannot be trusted as-is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManifestDefect {
    Missing,
    Empty,
    Invalid(String),
    NoPlugins,
}

pub fn inspect_installed(path: &Path) -> Option<ManifestDefect> {
    if !path.exists() {
        return Some(ManifestDefect::Missing);
    }
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => return Some(ManifestDefect::Invalid(err.to_string())),
    };
    if raw.trim().is_empty() {
        return Some(ManifestDefect::Empty);
    }
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => match map.get("plugins") {
            Some(Value::Array(items)) if !items.is_empty() => None,
            _ => Some(ManifestDefect::NoPlugins),
        },
        Ok(_) => Some(ManifestDefect::NoPlugins),
        Err(err) => Some(ManifestDefect::Invalid(err.to_string())),
    }
}

/// Restores the installed manifest from the bundled template when it is
/// missing, empty, unparsable or lists no plugins. Returns whether a restore
/// happened. A healthy manifest is never touched.
pub fn ensure_installed_manifest(installed: &Path, template: &Path) -> bool {
    let Some(defect) = inspect_installed(installed) else {
        return false;
    };
    tracing::warn!(path = %installed.display(), ?defect, "installed manifest needs restore");

    if !template.is_file() {
        tracing::warn!(
            template = %template.display(),
            "template not found, cannot restore installed manifest"
        );
        return false;
    }

    match replace_atomically(template, installed) {
        Ok(()) => {
            tracing::info!(path = %installed.display(), "installed manifest restored from template");
            true
        }
        Err(err) => {
            tracing::error!(path = %installed.display(), "failed to restore installed manifest: {err:#}");
            false
        }
    }
}

fn replace_atomically(source: &Path, target: &Path) -> Result<()> {
    let bytes = fs::read(source).with_context(|| format!("read {}", source.display()))?;
    let permissions = fs::metadata(source)
        .with_context(|| format!("stat {}", source.display()))?
        .permissions();
    write_atomically(target, &bytes, Some(permissions))
}

/// Writes through a sibling temp file renamed over `target`. Temp files are
/// created owner-only, so `permissions` is applied before the rename.
pub fn write_atomically(
    target: &Path,
    bytes: &[u8],
    permissions: Option<fs::Permissions>,
) -> Result<()> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("write temp file for {}", target.display()))?;
    if let Some(permissions) = permissions {
        tmp.as_file()
            .set_permissions(permissions)
            .with_context(|| format!("set permissions for {}", target.display()))?;
    }
    tmp.as_file().sync_all().ok();
    tmp.persist(target)
        .map_err(|err| anyhow!("replace {}: {}", target.display(), err.error))?;
    Ok(())
}

pub trait CatalogSource {
    fn fetch(&self) -> Result<Vec<u8>>;
}

pub struct HttpCatalogSource {
    pub url: String,
    pub timeout: Duration,
}

impl HttpCatalogSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: CATALOG_DOWNLOAD_TIMEOUT,
        }
    }
}

impl CatalogSource for HttpCatalogSource {
    fn fetch(&self) -> Result<Vec<u8>> {
        let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();
        let response = match agent.get(&self.url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                bail!("Failed to download. Status: {status}");
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(anyhow!("catalog transport error: {err}"));
            }
        };
        if response.status() != 200 {
            bail!("Failed to download. Status: {}", response.status());
        }

        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .with_context(|| format!("read catalog body {}", self.url))?;
        Ok(bytes)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogRefresh {
    pub success: bool,
    pub message: String,
}

/// Downloads the catalog when it is absent locally, or always when `force` is
/// set. Never fails the caller.
pub fn ensure_catalog(path: &Path, source: &dyn CatalogSource, force: bool) -> CatalogRefresh {
    if !force && path.exists() {
        tracing::debug!(path = %path.display(), "catalog already present, skipping download");
        return CatalogRefresh {
            success: true,
            message: "Plugin index already exists.".to_string(),
        };
    }

    tracing::info!(path = %path.display(), force, "downloading plugin catalog");
    let previous = fs::metadata(path).ok().map(|meta| meta.permissions());
    let downloaded = source
        .fetch()
        .and_then(|bytes| write_atomically(path, &bytes, previous));
    match downloaded {
        Ok(()) => {
            tracing::info!(path = %path.display(), "plugin catalog saved");
            CatalogRefresh {
                success: true,
                message: "Plugin index downloaded successfully.".to_string(),
            }
        }
        Err(err) => {
            tracing::error!(path = %path.display(), "failed to download plugin catalog: {err:#}");
            CatalogRefresh {
                success: false,
                message: format!("An error occurred: {err:#}"),
            }
        }
    }
}
