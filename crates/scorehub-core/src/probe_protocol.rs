//! Minimal MQTT 3.1.1 handshake used by the connectivity probe: one CONNECT out,
//! one CONNACK back.

pub const PROBE_KEEPALIVE_SECS: u16 = 10;
pub const CONNACK_WAIT_SECS: u64 = 5;
pub const PROBE_CLIENT_ID: &str = "scorehub-probe";

const CONNECT_PACKET: u8 = 0x10;
const CONNACK_PACKET: u8 = 0x20;
const PROTOCOL_LEVEL_311: u8 = 0x04;
const FLAG_CLEAN_SESSION: u8 = 0x02;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_USERNAME: u8 = 0x80;

/// The single-line answer printed by the probe executable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeVerdict {
    Yes,
    No,
}

impl ProbeVerdict {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }

    /// Positive only when some line of the output is exactly `yes`, ignoring
    /// case and surrounding whitespace.
    pub fn from_output(output: &str) -> Self {
        if output
            .lines()
            .any(|line| line.trim().eq_ignore_ascii_case(Self::Yes.as_str()))
        {
            Self::Yes
        } else {
            Self::No
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectRequest<'a> {
    pub client_id: &'a str,
    pub keepalive_secs: u16,
    pub credentials: Option<(&'a str, &'a str)>,
}

fn push_str(buf: &mut Vec<u8>, value: &str) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(u16::MAX as usize);
    buf.extend_from_slice(&(len as u16).to_be_bytes());
    buf.extend_from_slice(&bytes[..len]);
}

fn push_remaining_length(buf: &mut Vec<u8>, mut len: usize) {
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if len == 0 {
            break;
        }
    }
}

pub fn encode_connect(request: &ConnectRequest<'_>) -> Vec<u8> {
    let mut body = Vec::new();
    push_str(&mut body, "MQTT");
    body.push(PROTOCOL_LEVEL_311);

    let mut flags = FLAG_CLEAN_SESSION;
    if request.credentials.is_some() {
        flags |= FLAG_USERNAME | FLAG_PASSWORD;
    }
    body.push(flags);
    body.extend_from_slice(&request.keepalive_secs.to_be_bytes());

    push_str(&mut body, request.client_id);
    if let Some((username, password)) = request.credentials {
        push_str(&mut body, username);
        push_str(&mut body, password);
    }

    let mut packet = vec![CONNECT_PACKET];
    push_remaining_length(&mut packet, body.len());
    packet.extend_from_slice(&body);
    packet
}

/// Interprets a 4-byte CONNACK. Return code 0 is the only acceptance.
pub fn decode_connack(packet: &[u8]) -> Result<(), String> {
    match packet {
        [CONNACK_PACKET, 0x02, _session_present, 0x00] => Ok(()),
        [CONNACK_PACKET, 0x02, _, code] => Err(format!("broker refused connection: code {code}")),
        [CONNACK_PACKET, ..] => Err("malformed connack".to_string()),
        [kind, ..] => Err(format!("unexpected packet type 0x{kind:02x}")),
        [] => Err("empty response".to_string()),
    }
}
