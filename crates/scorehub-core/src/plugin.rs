use crate::command::PluginOperation;
use crate::manifest::{
    ensure_catalog, ensure_installed_manifest, load_catalog, load_installed, CatalogRefresh,
    CatalogSource, HttpCatalogSource, PluginMap,
};
use crate::paths::HubPaths;
use crate::plugin_status::{parse_plugin_list, LiveStatusMap};
use crate::process::{
    CommandResult, CommandRunner, ProcessRunner, LIST_TIMEOUT, PLUGIN_OPERATION_TIMEOUT,
};
use crate::settings::HubConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const PLACEHOLDER: &str = "-";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PluginState {
    Available,
    Installed,
    Error,
    Unknown,
    /// Any other status string reported by the management script.
    Live(String),
}

impl PluginState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Available => "available",
            Self::Installed => "installed",
            Self::Error => "error",
            Self::Unknown => "unknown",
            Self::Live(status) => status.as_str(),
        }
    }
}

impl From<String> for PluginState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "available" => Self::Available,
            "installed" => Self::Installed,
            "error" => Self::Error,
            "unknown" => Self::Unknown,
            _ => Self::Live(value),
        }
    }
}

impl From<PluginState> for String {
    fn from(value: PluginState) -> Self {
        value.as_str().to_string()
    }
}

/// Reconciled view of one plugin. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRecord {
    pub name: String,
    pub url: String,
    pub version: String,
    pub status: PluginState,
    pub commit: String,
}

impl PluginRecord {
    fn seeded(name: &str, url: Option<&str>, status: PluginState) -> Self {
        Self {
            name: name.to_string(),
            url: url.unwrap_or(PLACEHOLDER).to_string(),
            version: PLACEHOLDER.to_string(),
            status,
            commit: PLACEHOLDER.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginStatusReport {
    pub success: bool,
    pub plugins: Vec<PluginRecord>,
}

/// Merges the catalog, the installed manifest and the live status into one
/// record per plugin, sorted by name.
///
/// Live status always wins for version, status and commit. A plugin declared
/// as installed but missing from the live status is reported as `error`.
/// Catalog-only plugins stay `available`.
pub fn merge_plugin_views(
    catalog: &PluginMap,
    installed: &PluginMap,
    live: &LiveStatusMap,
) -> Vec<PluginRecord> {
    let mut merged: BTreeMap<String, PluginRecord> = catalog
        .iter()
        .map(|(name, entry)| {
            (
                name.clone(),
                PluginRecord::seeded(name, entry.url.as_deref(), PluginState::Available),
            )
        })
        .collect();

    let all_names: BTreeSet<&String> = catalog
        .keys()
        .chain(installed.keys())
        .chain(live.keys())
        .collect();

    for name in all_names {
        let record = merged.entry(name.clone()).or_insert_with(|| {
            let url = installed.get(name).and_then(|entry| entry.url.as_deref());
            PluginRecord::seeded(name, url, PluginState::Unknown)
        });

        if let Some(status) = live.get(name) {
            record.version = status.version.clone();
            record.status = PluginState::from(status.status.clone());
            record.commit = status.commit.clone();
        } else if installed.contains_key(name) {
            record.status = PluginState::Error;
        }
    }

    merged.into_values().collect()
}

/// Runs plugin operations against the scoreboard's management script and
/// reconciles plugin state for status requests.
pub struct PluginManager {
    paths: HubPaths,
    python_exec: String,
    runner: Box<dyn CommandRunner>,
    catalog_source: Box<dyn CatalogSource>,
}

impl PluginManager {
    pub fn new(config: &HubConfig) -> Self {
        Self::with_parts(
            HubPaths::from_config(config),
            config.python_exec.clone(),
            Box::new(ProcessRunner::new()),
            Box::new(HttpCatalogSource::new(config.catalog_url.clone())),
        )
    }

    pub fn with_parts(
        paths: HubPaths,
        python_exec: impl Into<String>,
        runner: Box<dyn CommandRunner>,
        catalog_source: Box<dyn CatalogSource>,
    ) -> Self {
        Self {
            paths,
            python_exec: python_exec.into(),
            runner,
            catalog_source,
        }
    }

    pub fn refresh_catalog(&self) -> CatalogRefresh {
        ensure_catalog(&self.paths.catalog, self.catalog_source.as_ref(), true)
    }

    pub fn installed_plugins(&self) -> PluginMap {
        ensure_installed_manifest(&self.paths.installed, &self.paths.installed_template);
        load_installed(&self.paths.installed)
    }

    pub fn live_status(&self) -> LiveStatusMap {
        let result = self.run(&PluginOperation::List);
        if !result.success {
            tracing::error!("plugin list command failed, live status unavailable");
            return LiveStatusMap::new();
        }
        parse_plugin_list(&result.stdout)
    }

    pub fn status(&self) -> Vec<PluginRecord> {
        ensure_catalog(&self.paths.catalog, self.catalog_source.as_ref(), false);
        let catalog = load_catalog(&self.paths.catalog);
        let installed = self.installed_plugins();
        let live = self.live_status();
        tracing::info!(
            catalog = catalog.len(),
            installed = installed.len(),
            live = live.len(),
            "reconciling plugin views"
        );

        let plugins = merge_plugin_views(&catalog, &installed, &live);
        tracing::info!(count = plugins.len(), "plugin status ready");
        plugins
    }

    pub fn status_report(&self) -> PluginStatusReport {
        PluginStatusReport {
            success: true,
            plugins: self.status(),
        }
    }

    pub fn add(&self, url: &str) -> CommandResult {
        self.run(&PluginOperation::Add {
            url: url.to_string(),
        })
    }

    pub fn remove(&self, name: &str, keep_config: bool) -> CommandResult {
        self.run(&PluginOperation::Remove {
            name: name.to_string(),
            keep_config,
        })
    }

    pub fn update(&self, name: &str) -> CommandResult {
        self.run(&PluginOperation::Update {
            name: name.to_string(),
        })
    }

    pub fn sync(&self) -> CommandResult {
        self.run(&PluginOperation::Sync)
    }

    pub fn run(&self, operation: &PluginOperation) -> CommandResult {
        if let Some(field) = operation.missing_field() {
            return CommandResult::failed(format!("Error: \"{field}\" is required."));
        }

        let script = &self.paths.plugins_script;
        if !script.is_file() {
            tracing::error!(path = %script.display(), "plugin script not found");
            return CommandResult::failed(format!(
                "Error: Script not found at {}",
                script.display()
            ));
        }

        let mut argv = vec![
            self.python_exec.clone(),
            script.to_string_lossy().into_owned(),
        ];
        argv.extend(operation.args());

        let timeout = if operation.is_mutating() {
            PLUGIN_OPERATION_TIMEOUT
        } else {
            LIST_TIMEOUT
        };
        self.runner.run(&argv, &self.paths.scoreboard_dir, timeout)
    }
}
