use scorehub_core::probe_protocol::{
    decode_connack, encode_connect, ConnectRequest, ProbeVerdict, CONNACK_WAIT_SECS,
    PROBE_CLIENT_ID, PROBE_KEEPALIVE_SECS,
};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

struct ProbeArgs {
    broker: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
}

fn main() {
    let verdict = match parse_args(std::env::args().skip(1).collect()) {
        Ok(args) => match probe(&args) {
            Ok(()) => ProbeVerdict::Yes,
            Err(err) => {
                eprintln!("probe failed: {err}");
                ProbeVerdict::No
            }
        },
        Err(err) => {
            eprintln!("usage: scorehub-probe <broker> <port> [-u USER] [-p PASSWORD] ({err})");
            ProbeVerdict::No
        }
    };

    let mut stdout = io::stdout();
    let _ = writeln!(stdout, "{}", verdict.as_str());
    let _ = stdout.flush();
}

fn parse_args(args: Vec<String>) -> Result<ProbeArgs, String> {
    let mut positional = Vec::new();
    let mut username = None;
    let mut password = None;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-u" | "--username" => {
                username = Some(iter.next().ok_or("missing value for --username")?);
            }
            "-p" | "--password" => {
                password = Some(iter.next().ok_or("missing value for --password")?);
            }
            _ => positional.push(arg),
        }
    }

    let [broker, port] = <[String; 2]>::try_from(positional)
        .map_err(|found| format!("expected <broker> <port>, got {} arguments", found.len()))?;
    let port = port
        .parse::<u16>()
        .map_err(|err| format!("invalid port: {err}"))?;

    Ok(ProbeArgs {
        broker,
        port,
        username,
        password,
    })
}

fn probe(args: &ProbeArgs) -> Result<(), String> {
    let deadline = Instant::now() + Duration::from_secs(CONNACK_WAIT_SECS);
    let addrs: Vec<SocketAddr> = (args.broker.as_str(), args.port)
        .to_socket_addrs()
        .map_err(|err| format!("resolve broker: {err}"))?
        .collect();

    let mut stream = connect_any(&addrs, deadline)?;

    let credentials = match (args.username.as_deref(), args.password.as_deref()) {
        (Some(user), Some(pass)) => Some((user, pass)),
        _ => None,
    };
    let packet = encode_connect(&ConnectRequest {
        client_id: PROBE_CLIENT_ID,
        keepalive_secs: PROBE_KEEPALIVE_SECS,
        credentials,
    });
    stream
        .set_write_timeout(Some(remaining(deadline)?))
        .map_err(|err| err.to_string())?;
    stream
        .write_all(&packet)
        .map_err(|err| format!("send connect: {err}"))?;

    let mut connack = [0u8; 4];
    let mut filled = 0;
    while filled < connack.len() {
        stream
            .set_read_timeout(Some(remaining(deadline)?))
            .map_err(|err| err.to_string())?;
        match stream.read(&mut connack[filled..]) {
            Ok(0) => return Err("connection closed before connack".to_string()),
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(format!("read connack: {err}")),
        }
    }

    let accepted = decode_connack(&connack);
    let _ = stream.write_all(&[0xe0, 0x00]);
    accepted
}

fn connect_any(addrs: &[SocketAddr], deadline: Instant) -> Result<TcpStream, String> {
    let mut last_err = "no addresses for broker".to_string();
    for addr in addrs {
        match TcpStream::connect_timeout(addr, remaining(deadline)?) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = format!("connect {addr}: {err}"),
        }
    }
    Err(last_err)
}

fn remaining(deadline: Instant) -> Result<Duration, String> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        return Err("timed out waiting for broker".to_string());
    }
    Ok(left)
}
