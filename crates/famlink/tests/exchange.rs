#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use famlink::demo::ops::{self, client_payload, HELLO_TEXT, PING_TEXT};
use famlink::demo::{build_dispatcher, register_demo, DemoCommand, FixedCount};
use famlink::peer::{Client, ClientConfig, PeerError, ReplyMode, Service, ServiceConfig};
use famlink::schema::{Attributes, Family, RegistryBuilder};
use famlink::transport::BusSocket;

const PONG: &str = "Pong from service!";

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/famlink-it-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

struct Running {
    dir: PathBuf,
    socket: PathBuf,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<famlink::peer::Result<()>>>,
}

impl Running {
    fn start(tag: &str, extra_parts: usize) -> Self {
        Self::start_with(tag, extra_parts, |_| {})
    }

    fn start_with(tag: &str, extra_parts: usize, setup: impl FnOnce(&Path)) -> Self {
        let dir = unique_temp_dir(tag);
        setup(&dir);

        let mut builder = RegistryBuilder::new();
        register_demo(&mut builder).expect("demo family registers");
        builder.load_directory(&dir).expect("declarations load");
        let registry = Arc::new(builder.build());

        let mut service = Service::new(Arc::clone(&registry))
            .expect("service builds")
            .with_config(ServiceConfig {
                poll_interval: Duration::from_millis(20),
                ..ServiceConfig::default()
            });
        service
            .register(
                build_dispatcher(&registry, Arc::new(FixedCount(extra_parts)))
                    .expect("dispatcher builds"),
            )
            .expect("dispatcher registers");

        let socket = dir.join("service.sock");
        let bound = BusSocket::bind(&socket).expect("service socket binds");
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::spawn(move || service.serve(&bound, &flag));

        Self {
            dir,
            socket,
            running,
            handle: Some(handle),
        }
    }

    fn config(&self, recv_timeout: Duration) -> ClientConfig {
        ClientConfig {
            resolve_timeout: Duration::from_secs(5),
            recv_timeout: Some(recv_timeout),
            socket_dir: self.dir.clone(),
            ..ClientConfig::default()
        }
    }

    fn client(&self) -> Client<famlink::transport::BusEndpoint> {
        ops::connect(&self.socket, self.config(Duration::from_secs(5))).expect("client connects")
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

#[test]
fn every_demo_command_over_one_client() {
    let service = Running::start("all", 3);
    let mut client = service.client();
    assert_eq!(client.family_id(), 0x11);

    let hello_seq = ops::send_hello(&mut client, HELLO_TEXT).expect("hello sends");
    assert_eq!(client.next_sequence(), hello_seq.wrapping_add(1));

    assert_eq!(ops::pingpong(&mut client, PING_TEXT).expect("pong"), PONG);

    let pongs = ops::pingpong_random(&mut client, PING_TEXT).expect("pongs");
    assert_eq!(pongs, vec![PONG.to_string(); 4]);

    let answer = ops::request_struct(&mut client, &client_payload()).expect("payload");
    assert_eq!(answer.name(), "famlink-service");
    assert_eq!(answer.pid, std::process::id());
    assert_eq!(answer.ipv4.to_string(), "123.45.67.89");
}

#[test]
fn missing_attribute_gets_no_reply() {
    let service = Running::start("missing", 0);
    let mut client = ops::connect(&service.socket, service.config(Duration::from_millis(300)))
        .expect("client connects");

    client
        .send_request(DemoCommand::PingPong, &Attributes::new())
        .expect("request sends");
    let err = client
        .receive_loop(ReplyMode::Single, |_| Ok(()))
        .expect_err("no reply expected");
    assert!(matches!(err, PeerError::Timeout(_)));

    assert_eq!(ops::pingpong(&mut client, PING_TEXT).expect("service alive"), PONG);
}

#[test]
fn random_stream_ends_with_single_marker() {
    let service = Running::start("stream", 10);
    let mut client = service.client();

    let sequence = client
        .send_request(
            DemoCommand::PingPongRandom,
            &Attributes::new().with(famlink::demo::DemoAttr::PingPongRandomMsg, PING_TEXT),
        )
        .expect("request sends");
    let mut seen = Vec::new();
    let delivered = client
        .receive_loop(ReplyMode::Multipart, |reply| {
            seen.push((reply.sequence, reply.flags.multipart));
            Ok(())
        })
        .expect("stream completes");

    assert_eq!(delivered, 11);
    assert!(seen.iter().all(|&(seq, multipart)| seq == sequence && multipart));
}

#[test]
fn concurrent_clients_keep_their_replies() {
    let service = Running::start("concurrent", 5);
    thread::scope(|scope| {
        let workers: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    let mut client = service.client();
                    (0..3)
                        .map(|_| {
                            ops::pingpong_random(&mut client, PING_TEXT)
                                .expect("pongs")
                                .len()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for worker in workers {
            assert_eq!(worker.join().expect("worker finishes"), vec![6, 6, 6]);
        }
    });
}

#[test]
fn unknown_family_fails_resolution() {
    let service = Running::start("unknown", 0);
    let family = Family::builder("nobody")
        .command(1u8)
        .build()
        .expect("family builds");
    let err = Client::connect(
        &service.socket,
        Arc::new(family),
        service.config(Duration::from_secs(1)),
    )
    .err()
    .expect("resolution fails");
    assert!(matches!(err, PeerError::UnknownFamily(name) if name == "nobody"));
}

#[test]
fn declared_but_unserved_family_does_not_resolve() {
    const WEATHER: &str = r#"{
        "name": "weather",
        "version": 3,
        "commands": [1],
        "attributes": [{ "key": 1, "kind": "string", "max_length": 16 }]
    }"#;

    let service = Running::start_with("unserved", 0, |dir| {
        std::fs::write(dir.join("weather.family.json"), WEATHER).expect("declaration writes");
    });
    let family = Family::from_json(WEATHER).expect("declaration parses");
    let err = Client::connect(
        &service.socket,
        Arc::new(family),
        service.config(Duration::from_secs(1)),
    )
    .err()
    .expect("nobody serves weather");
    assert!(matches!(err, PeerError::UnknownFamily(name) if name == "weather"));

    // The served family next to it still resolves.
    assert_eq!(service.client().family_id(), 0x11);
}

#[test]
fn connect_without_service_is_transport_error() {
    let dir = unique_temp_dir("absent");
    let config = ClientConfig {
        socket_dir: dir.clone(),
        ..ClientConfig::default()
    };
    let err = ops::connect(dir.join("none.sock"), config)
        .err()
        .expect("nothing listens");
    assert!(matches!(err, PeerError::Transport(_)));
    let _ = std::fs::remove_dir_all(&dir);
}
