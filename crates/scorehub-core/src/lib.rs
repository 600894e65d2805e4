pub mod command;
pub mod hub;
pub mod manifest;
pub mod paths;
pub mod plugin;
pub mod plugin_status;
pub mod probe;
pub mod probe_protocol;
pub mod process;
pub mod settings;
pub mod supervisor;
pub mod xmlrpc;
