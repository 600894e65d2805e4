#![cfg(unix)]

use anyhow::Result;
use scorehub_core::manifest::CatalogSource;
use scorehub_core::paths::HubPaths;
use scorehub_core::plugin::PluginManager;
use scorehub_core::process::ProcessRunner;
use std::fs;
use std::path::Path;

struct OfflineCatalog;

impl CatalogSource for OfflineCatalog {
    fn fetch(&self) -> Result<Vec<u8>> {
        anyhow::bail!("offline")
    }
}

const LIST_TABLE: &str = "\
NAME            VERSION   STATUS     COMMIT
--------------------------------------------
holiday_lights  1.2.0     installed  3f2a9c1
";

fn write_board(dir: &Path, script: &str) {
    fs::write(
        dir.join("plugins_index.json"),
        r#"{"plugins": [
            {"name": "holiday_lights", "url": "https://example.com/holiday_lights"},
            {"name": "nfl_board", "url": "https://example.com/nfl_board"}
        ]}"#,
    )
    .expect("write catalog");
    fs::write(
        dir.join("plugins.json"),
        r#"{"plugins": [
            {"name": "holiday_lights", "url": "https://example.com/holiday_lights"},
            {"name": "stale_board", "url": "https://example.com/stale_board"}
        ]}"#,
    )
    .expect("write installed");
    fs::write(dir.join("plugins.py"), script).expect("write script");
}

fn manager(dir: &Path) -> PluginManager {
    PluginManager::with_parts(
        HubPaths::for_scoreboard_dir(dir),
        "sh",
        Box::new(ProcessRunner::new()),
        Box::new(OfflineCatalog),
    )
}

#[test]
fn status_merges_catalog_installed_and_live_table() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_board(dir.path(), &format!("cat <<'TABLE'\n{LIST_TABLE}TABLE\n"));

    let report = manager(dir.path()).status_report();
    assert!(report.success);

    let states: Vec<(String, String, String)> = report
        .plugins
        .iter()
        .map(|p| (p.name.clone(), p.status.as_str().to_string(), p.version.clone()))
        .collect();
    assert_eq!(
        states,
        vec![
            ("holiday_lights".to_string(), "installed".to_string(), "1.2.0".to_string()),
            ("nfl_board".to_string(), "available".to_string(), "-".to_string()),
            ("stale_board".to_string(), "error".to_string(), "-".to_string()),
        ]
    );
}

#[test]
fn operations_pass_arguments_and_capture_both_streams() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_board(dir.path(), "echo \"args: $*\"\necho warn >&2\n");

    let result = manager(dir.path()).remove("holiday_lights", true);
    assert!(result.success);
    assert_eq!(result.output, "args: rm holiday_lights --keep-config\n\nwarn\n");
}

#[test]
fn failing_script_reports_failure_and_unparseable_list_is_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_board(dir.path(), "echo boom\nexit 3\n");

    let manager = manager(dir.path());
    let result = manager.update("holiday_lights");
    assert!(!result.success);
    assert!(result.output.contains("boom"));

    assert!(manager.live_status().is_empty());
}
