use crate::manifest::{ensure_installed_manifest, load_installed_names};
use crate::paths::HubPaths;
use crate::process::{CommandResult, CommandRunner, ISSUE_UPLOAD_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

pub const CONTROL_HUB_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const BUILTIN_BOARDS: &[&str] = &[
    "wxalert",
    "wxforecast",
    "scoreticker",
    "seriesticker",
    "standings",
    "team_summary",
    "stanley_cup_champions",
    "christmas",
    "season_countdown",
    "clock",
    "weather",
    "player_stats",
    "ovi_tracker",
    "stats_leaders",
];

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HubStatus {
    pub version: String,
    pub control_hub_version: String,
    pub supervisor_available: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardOption {
    pub v: String,
    pub n: String,
}

/// Scoreboard release from the `VERSION` file, always `V`-prefixed.
pub fn scoreboard_version(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(raw) => {
            let version = raw.trim();
            if version.to_ascii_uppercase().starts_with('V') {
                version.to_string()
            } else {
                format!("V{version}")
            }
        }
        Err(err) if err.kind() == ErrorKind::NotFound => "Unknown".to_string(),
        Err(err) => {
            tracing::error!(path = %path.display(), "failed to read version file: {err}");
            "Error".to_string()
        }
    }
}

pub fn hub_status(paths: &HubPaths, supervisor_available: bool, debug: bool) -> HubStatus {
    HubStatus {
        version: scoreboard_version(&paths.version),
        control_hub_version: CONTROL_HUB_VERSION.to_string(),
        supervisor_available: supervisor_available || debug,
    }
}

// Every letter that follows a non-letter starts a word, so `2x` becomes `2X`.
fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_word = false;
    for ch in name.chars() {
        let ch = if ch == '_' { ' ' } else { ch };
        if ch.is_alphabetic() {
            if in_word {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(ch);
            in_word = false;
        }
    }
    out
}

/// Built-in boards followed by every board contributed by an installed plugin.
pub fn board_options(paths: &HubPaths) -> Vec<BoardOption> {
    ensure_installed_manifest(&paths.installed, &paths.installed_template);
    let plugin_boards = load_installed_names(&paths.installed);
    tracing::info!(count = plugin_boards.len(), "loaded plugin boards");

    BUILTIN_BOARDS
        .iter()
        .map(|name| name.to_string())
        .chain(plugin_boards)
        .map(|name| BoardOption {
            n: title_case(&name),
            v: name,
        })
        .collect()
}

pub fn run_issue_uploader(
    paths: &HubPaths,
    python_exec: &str,
    runner: &dyn CommandRunner,
) -> CommandResult {
    if !paths.issue_uploader.is_file() {
        tracing::error!(path = %paths.issue_uploader.display(), "issue uploader script not found");
        return CommandResult::failed(format!(
            "Error: Script not found at {}",
            paths.issue_uploader.display()
        ));
    }

    let argv = vec![
        python_exec.to_string(),
        paths.issue_uploader.to_string_lossy().into_owned(),
        "--scoreboard_dir".to_string(),
        paths.scoreboard_dir.to_string_lossy().into_owned(),
    ];
    runner.run(&argv, &paths.scoreboard_dir, ISSUE_UPLOAD_TIMEOUT)
}
