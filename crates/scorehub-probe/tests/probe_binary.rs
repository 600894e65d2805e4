use scorehub_core::probe::{ProbeRunner, ProbeTarget};
use scorehub_core::process::ProcessRunner;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::process::Command;
use std::thread;

fn run_probe(args: &[String]) -> (bool, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_scorehub-probe"))
        .args(args)
        .output()
        .expect("run probe binary");
    (
        output.status.success(),
        String::from_utf8_lossy(&output.stdout).into_owned(),
    )
}

fn fake_broker(return_code: u8) -> (u16, thread::JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake broker");
    let port = listener.local_addr().expect("local addr").port();
    let handle = thread::spawn(move || {
        let (mut socket, _) = listener.accept().expect("accept probe");
        let mut header = [0u8; 2];
        socket.read_exact(&mut header).expect("read fixed header");
        let mut body = vec![0u8; header[1] as usize];
        socket.read_exact(&mut body).expect("read connect body");
        socket
            .write_all(&[0x20, 0x02, 0x00, return_code])
            .expect("write connack");
        let mut packet = header.to_vec();
        packet.extend(body);
        packet
    });
    (port, handle)
}

#[test]
fn prints_yes_when_broker_accepts() {
    let (port, broker) = fake_broker(0);
    let (ok, stdout) = run_probe(&["127.0.0.1".to_string(), port.to_string()]);
    let connect = broker.join().expect("broker thread");

    assert!(ok);
    assert_eq!(stdout, "yes\n");
    assert_eq!(connect[0], 0x10);
    assert_eq!(&connect[4..8], b"MQTT");
}

#[test]
fn sends_credentials_when_given() {
    let (port, broker) = fake_broker(0);
    let (_, stdout) = run_probe(&[
        "127.0.0.1".to_string(),
        port.to_string(),
        "-u".to_string(),
        "pi".to_string(),
        "-p".to_string(),
        "secret".to_string(),
    ]);
    let connect = broker.join().expect("broker thread");

    assert_eq!(stdout, "yes\n");
    assert_eq!(connect[9] & 0xc0, 0xc0);
    assert!(connect.ends_with(b"secret"));
}

#[test]
fn prints_no_when_credentials_are_refused() {
    let (port, broker) = fake_broker(5);
    let (_, stdout) = run_probe(&["127.0.0.1".to_string(), port.to_string()]);
    broker.join().expect("broker thread");
    assert_eq!(stdout, "no\n");
}

#[test]
fn prints_no_when_nothing_listens() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);

    let (_, stdout) = run_probe(&["127.0.0.1".to_string(), port.to_string()]);
    assert_eq!(stdout, "no\n");
}

#[test]
fn prints_no_on_bad_arguments() {
    let (_, stdout) = run_probe(&["only-broker".to_string()]);
    assert_eq!(stdout, "no\n");
}

fn hub_runner() -> ProbeRunner {
    ProbeRunner::with_runner(
        env!("CARGO_BIN_EXE_scorehub-probe"),
        ".",
        Box::new(ProcessRunner::new()),
    )
}

#[test]
fn unresolvable_broker_named_like_yes_is_still_a_failure() {
    let runner = hub_runner();
    for broker in ["eyes.invalid", "yesterday.invalid"] {
        let outcome = runner.probe(&ProbeTarget::new(broker, 1883));
        assert!(!outcome.success, "{broker}: {}", outcome.output);
        assert!(!outcome.output.contains(broker));
    }
}

#[test]
fn hub_runner_accepts_reachable_broker() {
    let (port, broker) = fake_broker(0);
    let outcome = hub_runner().probe(&ProbeTarget::new("127.0.0.1", port));
    broker.join().expect("broker thread");
    assert!(outcome.success, "{}", outcome.output);
}
