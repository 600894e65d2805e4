use anyhow::{bail, Context as _, Result};
use scorehub_core::hub::{board_options, hub_status, run_issue_uploader};
use scorehub_core::paths::HubPaths;
use scorehub_core::plugin::PluginManager;
use scorehub_core::probe::{ProbeRunner, ProbeTarget};
use scorehub_core::process::ProcessRunner;
use scorehub_core::settings::{load_config, ConfigOverrides, HubConfig};
use scorehub_core::supervisor::{ActionResult, ProcessList, SupervisorClient, SupervisorReply};
use serde::Serialize;
use std::io::Write as _;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "scorehub_cli=info,scorehub_core=info";
const DEBUG_LOG_FILTER: &str = "scorehub_cli=debug,scorehub_core=debug";

fn main() -> Result<()> {
    let (overrides, command, rest) = parse_global_args(std::env::args().skip(1).collect())?;
    init_logging(overrides.debug);

    let Some(command) = command else {
        print_help();
        return Ok(());
    };
    if matches!(command.as_str(), "help" | "-h" | "--help") {
        print_help();
        return Ok(());
    }

    let config = load_config(&overrides)?;
    tracing::debug!(
        scoreboard_dir = %config.scoreboard_dir.display(),
        supervisor = %config.supervisor_endpoint(),
        "configuration loaded"
    );

    match command.as_str() {
        "status" => cmd_status(&config),
        "boards" => print_json(&board_options(&HubPaths::from_config(&config))),
        "plugins" => print_json(&PluginManager::new(&config).status_report()),
        "refresh" => print_json(&PluginManager::new(&config).refresh_catalog()),
        "add" => {
            let url = single_arg(rest, "add <url>")?;
            print_json(&PluginManager::new(&config).add(&url))
        }
        "rm" => cmd_remove(&config, rest),
        "update" => {
            let name = single_arg(rest, "update <name>")?;
            print_json(&PluginManager::new(&config).update(&name))
        }
        "sync" => print_json(&PluginManager::new(&config).sync()),
        "processes" => {
            let client = SupervisorClient::new(&config);
            let reply = client
                .list_processes()
                .map(|processes| ProcessList { processes });
            print_json(&SupervisorReply::from_result(reply))
        }
        "start" => {
            let name = single_arg(rest, "start <name>")?;
            let client = SupervisorClient::new(&config);
            let reply = client.start(&name).map(|result| ActionResult { result });
            print_json(&SupervisorReply::from_result(reply))
        }
        "stop" => {
            let name = single_arg(rest, "stop <name>")?;
            let client = SupervisorClient::new(&config);
            let reply = client.stop(&name).map(|result| ActionResult { result });
            print_json(&SupervisorReply::from_result(reply))
        }
        "tail" => {
            let name = single_arg(rest, "tail <name>")?;
            let client = SupervisorClient::new(&config);
            print_json(&SupervisorReply::from_result(client.tail_error_log(&name)))
        }
        "mqtt-test" => cmd_mqtt_test(&config, rest),
        "issue-upload" => {
            let paths = HubPaths::from_config(&config);
            let result = run_issue_uploader(&paths, &config.python_exec, &ProcessRunner::new());
            print_json(&result)
        }
        other => {
            print_help();
            bail!("unknown scorehub command: {other}");
        }
    }
}

fn init_logging(debug: bool) {
    let fallback = if debug {
        DEBUG_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn print_help() {
    eprintln!(
        r#"scorehub (scoreboard control hub)

Usage:
  scorehub [--config PATH] [--scoreboard-dir DIR] [--debug] <command> [args]

Commands:
  status                    Scoreboard version, hub version, supervisor availability
  boards                    Built-in and plugin board options
  plugins                   Reconciled plugin status
  refresh                   Re-download the plugin catalog
  add <url>                 Install a plugin from a repository URL
  rm <name> [--keep-config] Remove an installed plugin
  update <name>             Update an installed plugin
  sync                      Reinstall plugins from the installed manifest
  processes                 List supervised processes
  start <name>              Start a supervised process
  stop <name>               Stop a supervised process
  tail <name>               Last 4 KiB of a process stderr log
  mqtt-test <broker> <port> [-u USER] [-p PASSWORD]
                            Probe an MQTT broker
  issue-upload              Run the bundled issue uploader

Logging goes to stderr; RUST_LOG overrides the default filter.
"#
    );
}

fn parse_global_args(args: Vec<String>) -> Result<(ConfigOverrides, Option<String>, Vec<String>)> {
    let mut overrides = ConfigOverrides::default();
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let value = iter.next().context("--config requires a path")?;
                overrides.config_path = Some(PathBuf::from(value));
            }
            "--scoreboard-dir" => {
                let value = iter.next().context("--scoreboard-dir requires a path")?;
                overrides.scoreboard_dir = Some(PathBuf::from(value));
            }
            "--debug" => overrides.debug = true,
            _ => return Ok((overrides, Some(arg), iter.collect())),
        }
    }

    Ok((overrides, None, Vec::new()))
}

fn single_arg(rest: Vec<String>, usage: &str) -> Result<String> {
    match <[String; 1]>::try_from(rest) {
        Ok([value]) => Ok(value),
        Err(_) => bail!("usage: scorehub {usage}"),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value).context("serialize result")?;
    writeln!(stdout).context("write result")?;
    Ok(())
}

fn cmd_status(config: &HubConfig) -> Result<()> {
    let paths = HubPaths::from_config(config);
    let available = SupervisorClient::new(config).is_available();
    print_json(&hub_status(&paths, available, config.debug))
}

fn cmd_remove(config: &HubConfig, rest: Vec<String>) -> Result<()> {
    let mut name = None;
    let mut keep_config = false;
    for arg in rest {
        match arg.as_str() {
            "--keep-config" => keep_config = true,
            _ if name.is_none() => name = Some(arg),
            other => bail!("unexpected argument for rm: {other}"),
        }
    }
    let name = name.context("usage: scorehub rm <name> [--keep-config]")?;
    print_json(&PluginManager::new(config).remove(&name, keep_config))
}

fn cmd_mqtt_test(config: &HubConfig, rest: Vec<String>) -> Result<()> {
    let mut positional = Vec::new();
    let mut username = None;
    let mut password = None;

    let mut iter = rest.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-u" | "--username" => username = Some(iter.next().context("-u requires a value")?),
            "-p" | "--password" => password = Some(iter.next().context("-p requires a value")?),
            _ => positional.push(arg),
        }
    }

    let [broker, port] = <[String; 2]>::try_from(positional).map_err(|_| {
        anyhow::anyhow!("usage: scorehub mqtt-test <broker> <port> [-u USER] [-p PASSWORD]")
    })?;
    let port: u16 = port
        .parse()
        .with_context(|| format!("invalid port: {port}"))?;

    let target = ProbeTarget::new(broker, port).with_credentials(username, password);
    print_json(&ProbeRunner::new(config).probe(&target))
}
