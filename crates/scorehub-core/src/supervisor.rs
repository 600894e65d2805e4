use crate::settings::HubConfig;
use crate::xmlrpc::{decode_response, encode_call, XmlRpcError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

pub const RPC_TIMEOUT: Duration = Duration::from_secs(10);
pub const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(1);
pub const LOG_TAIL_BYTES: i64 = 4096;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("<Fault {code}: '{message}'>")]
    Fault { code: i64, message: String },
    #[error("invalid response: {0}")]
    Decode(String),
}

impl From<XmlRpcError> for SupervisorError {
    fn from(err: XmlRpcError) -> Self {
        match err {
            XmlRpcError::Fault { code, message } => Self::Fault { code, message },
            other => Self::Decode(other.to_string()),
        }
    }
}

pub trait RpcTransport {
    fn post(&self, body: &str) -> Result<String, SupervisorError>;
}

/// Plain HTTP transport. Every call builds its own agent, so no connection
/// outlives the request.
pub struct HttpRpcTransport {
    endpoint: String,
    timeout: Duration,
}

impl HttpRpcTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: RPC_TIMEOUT,
        }
    }
}

impl RpcTransport for HttpRpcTransport {
    fn post(&self, body: &str) -> Result<String, SupervisorError> {
        let agent = ureq::AgentBuilder::new()
            .timeout(self.timeout)
            .max_idle_connections(0)
            .build();
        let response = agent
            .post(&self.endpoint)
            .set("Content-Type", "text/xml")
            .send_string(body);

        match response {
            Ok(response) => response
                .into_string()
                .map_err(|err| SupervisorError::Transport(format!("read response body: {err}"))),
            Err(ureq::Error::Status(status, response)) => Err(SupervisorError::Status {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(err)) => Err(SupervisorError::Transport(err.to_string())),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProcessInfo {
    pub name: String,
    pub group: String,
    pub description: String,
    pub start: i64,
    pub stop: i64,
    pub now: i64,
    pub state: i64,
    pub statename: String,
    pub spawnerr: String,
    pub exitstatus: i64,
    pub logfile: String,
    pub stdout_logfile: String,
    pub stderr_logfile: String,
    pub pid: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogTail {
    pub log: String,
    pub offset: i64,
    pub overflow: bool,
}

pub struct SupervisorClient {
    transport: Box<dyn RpcTransport>,
    host: String,
    port: u16,
}

impl SupervisorClient {
    pub fn new(config: &HubConfig) -> Self {
        Self::with_transport(
            config.supervisor_url.clone(),
            config.supervisor_port,
            Box::new(HttpRpcTransport::new(config.supervisor_endpoint())),
        )
    }

    pub fn with_transport(
        host: impl Into<String>,
        port: u16,
        transport: Box<dyn RpcTransport>,
    ) -> Self {
        Self {
            transport,
            host: host.into(),
            port,
        }
    }

    fn call(&self, method: &str, params: &[Value]) -> Result<Value, SupervisorError> {
        tracing::debug!(method, "supervisor rpc call");
        let body = encode_call(method, params);
        let result = self
            .transport
            .post(&body)
            .and_then(|raw| decode_response(&raw).map_err(SupervisorError::from));
        if let Err(err) = &result {
            tracing::error!(method, "supervisor rpc failed: {err}");
        }
        result
    }

    pub fn list_processes(&self) -> Result<Vec<ProcessInfo>, SupervisorError> {
        let value = self.call("supervisor.getAllProcessInfo", &[])?;
        serde_json::from_value(value)
            .map_err(|err| SupervisorError::Decode(format!("process list: {err}")))
    }

    pub fn start(&self, name: &str) -> Result<bool, SupervisorError> {
        let value = self.call("supervisor.startProcess", &[json!(name)])?;
        expect_bool(value, "startProcess")
    }

    pub fn stop(&self, name: &str) -> Result<bool, SupervisorError> {
        let value = self.call("supervisor.stopProcess", &[json!(name)])?;
        expect_bool(value, "stopProcess")
    }

    /// Reads the last 4 KiB of a process's stderr log.
    pub fn tail_error_log(&self, name: &str) -> Result<LogTail, SupervisorError> {
        let value = self.call(
            "supervisor.tailProcessStderrLog",
            &[json!(name), json!(-LOG_TAIL_BYTES), json!(LOG_TAIL_BYTES)],
        )?;
        match value {
            Value::Array(items) => match items.as_slice() {
                [Value::String(log), offset, Value::Bool(overflow)] => {
                    let offset = offset.as_i64().ok_or_else(|| {
                        SupervisorError::Decode(format!("log tail offset is not an integer: {offset}"))
                    })?;
                    Ok(LogTail {
                        log: log.clone(),
                        offset,
                        overflow: *overflow,
                    })
                }
                _ => Err(SupervisorError::Decode(format!(
                    "log tail is not [log, offset, overflow]: {items:?}"
                ))),
            },
            other => Err(SupervisorError::Decode(format!(
                "log tail is not an array: {other}"
            ))),
        }
    }

    /// Whether anything accepts TCP connections on the supervisor port.
    pub fn is_available(&self) -> bool {
        let target = format!("{}:{}", self.host.trim(), self.port);
        let addrs = match target.to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(err) => {
                tracing::warn!(target = %target, "supervisor check failed: {err}");
                return false;
            }
        };
        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, AVAILABILITY_TIMEOUT).is_ok())
    }
}

fn expect_bool(value: Value, method: &str) -> Result<bool, SupervisorError> {
    value
        .as_bool()
        .ok_or_else(|| SupervisorError::Decode(format!("{method} returned {value}")))
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessList {
    pub processes: Vec<ProcessInfo>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionResult {
    pub result: bool,
}

/// Uniform JSON payload: `{"success": true, ...payload}` or
/// `{"success": false, "message": "..."}`.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct SupervisorReply<T> {
    pub success: bool,
    #[serde(flatten)]
    pub payload: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> SupervisorReply<T> {
    pub fn from_result(result: Result<T, SupervisorError>) -> Self {
        match result {
            Ok(payload) => Self {
                success: true,
                payload: Some(payload),
                message: None,
            },
            Err(err) => Self {
                success: false,
                payload: None,
                message: Some(err.to_string()),
            },
        }
    }
}
