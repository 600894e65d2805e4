use crate::settings::HubConfig;
use std::path::{Path, PathBuf};

pub const CATALOG_FILE: &str = "plugins_index.json";
pub const INSTALLED_FILE: &str = "plugins.json";
pub const INSTALLED_TEMPLATE_FILE: &str = "plugins.json.example";
pub const PLUGINS_SCRIPT_FILE: &str = "plugins.py";
pub const VERSION_FILE: &str = "VERSION";
pub const ISSUE_UPLOADER_FILE: &str = "issue_upload.py";

/// Every file location the hub touches, resolved once from the configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubPaths {
  pub scoreboard_dir: PathBuf,
  pub catalog: PathBuf,
  pub installed: PathBuf,
  pub installed_template: PathBuf,
  pub plugins_script: PathBuf,
  pub version: PathBuf,
  pub issue_uploader: PathBuf,
}

impl HubPaths {
  pub fn from_config(config: &HubConfig) -> Self {
    let mut paths = Self::for_scoreboard_dir(&config.scoreboard_dir);
    paths.issue_uploader = config.hub_dir().join(ISSUE_UPLOADER_FILE);
    paths
  }

  pub fn for_scoreboard_dir(dir: &Path) -> Self {
    Self {
      scoreboard_dir: dir.to_path_buf(),
      catalog: dir.join(CATALOG_FILE),
      installed: dir.join(INSTALLED_FILE),
      installed_template: dir.join(INSTALLED_TEMPLATE_FILE),
      plugins_script: dir.join(PLUGINS_SCRIPT_FILE),
      version: dir.join(VERSION_FILE),
      issue_uploader: dir.join(ISSUE_UPLOADER_FILE),
    }
  }
}

pub fn display_command(argv: &[String]) -> String {
  argv.join(" ")
}
