//! End-to-end tests: a real service ticked from a host thread, driven by
//! the async client over loopback.

use parking_lot::Mutex;
use rcond_client::{Client, ClientError, Connection, ConnectionConfig};
use rcond_protocol::{Packet, PacketType, AUTH_FAILURE_ID};
use rcond_server::{RconService, ServiceConfig};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

const PASSWORD: &str = "secret";

/// How long the host spends on commands starting with "slow".
const SLOW_COMMAND: Duration = Duration::from_millis(100);

/// One command as seen by the host.
#[derive(Debug, Clone)]
struct Run {
    command: String,
    started: Instant,
    finished: Instant,
}

/// A service plus the host thread that ticks it.
struct TestServer {
    addr: SocketAddr,
    runs: Arc<Mutex<Vec<Run>>>,
    running: Arc<AtomicBool>,
    host: Option<JoinHandle<()>>,
}

impl TestServer {
    fn start() -> Self {
        Self::start_with(ServiceConfig::new(PASSWORD, "127.0.0.1:0".parse().unwrap()))
    }

    fn start_with(config: ServiceConfig) -> Self {
        let mut service = RconService::start(config).unwrap();
        let addr = service.local_addr();

        let runs = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicBool::new(true));

        let host = {
            let runs = runs.clone();
            let running = running.clone();

            std::thread::spawn(move || {
                let mut executor = |command: &str| {
                    let started = Instant::now();
                    let output = match command {
                        "say hi" => "hi\nthere".to_string(),
                        slow if slow.starts_with("slow") => {
                            std::thread::sleep(SLOW_COMMAND);
                            "done".to_string()
                        }
                        other => other.to_string(),
                    };

                    runs.lock().push(Run {
                        command: command.to_string(),
                        started,
                        finished: Instant::now(),
                    });
                    output
                };

                while running.load(Ordering::SeqCst) {
                    if !service.tick(&mut executor) {
                        std::thread::sleep(Duration::from_millis(2));
                    }
                }
                service.stop();
            })
        };

        Self {
            addr,
            runs,
            running,
            host: Some(host),
        }
    }

    fn runs(&self) -> Vec<Run> {
        self.runs.lock().clone()
    }

    fn executed(&self) -> Vec<String> {
        self.runs().into_iter().map(|run| run.command).collect()
    }

    async fn connect(&self) -> Connection {
        let conn = Connection::new(
            ConnectionConfig::new(self.addr).with_request_timeout(Duration::from_secs(5)),
        );
        conn.connect().await.unwrap();
        conn
    }

    async fn login(&self) -> Client {
        let client = Client::new(
            ConnectionConfig::new(self.addr).with_request_timeout(Duration::from_secs(5)),
        );
        client.connect().await.unwrap();
        client.login(PASSWORD).await.unwrap();
        client
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(host) = self.host.take() {
            let _ = host.join();
        }
    }
}

fn is_closed(result: Result<Packet, ClientError>) -> bool {
    matches!(
        result,
        Err(ClientError::ConnectionClosed) | Err(ClientError::Io(_))
    )
}

#[tokio::test]
async fn test_login_then_command() {
    let server = TestServer::start();
    let conn = server.connect().await;

    let reply = conn.request(&Packet::login(7, PASSWORD)).await.unwrap();
    assert_eq!(reply.request_id, 7);
    assert_eq!(reply.packet_type, PacketType::AUTH_RESPONSE);
    assert_eq!(reply.payload, "");

    let reply = conn.request(&Packet::command(8, "say hi")).await.unwrap();
    assert_eq!(reply.request_id, 8);
    assert_eq!(reply.packet_type, PacketType::RESPONSE_VALUE);
    assert_eq!(reply.payload, "hi\r\nthere");

    assert_eq!(server.executed(), vec!["say hi".to_string()]);
}

#[tokio::test]
async fn test_wrong_password() {
    let server = TestServer::start();
    let conn = server.connect().await;

    let reply = conn.request(&Packet::login(7, "guess")).await.unwrap();
    assert_eq!(reply.request_id, AUTH_FAILURE_ID);
    assert_eq!(reply.packet_type, PacketType::AUTH_RESPONSE);
    assert_eq!(reply.payload, "");

    assert!(is_closed(conn.read_packet().await));
}

#[tokio::test]
async fn test_non_utf8_password_rejected() {
    let server = TestServer::start();
    let conn = server.connect().await;

    // "séc" in Latin-1
    let reply = conn
        .request(&Packet::login(5, [0x73, 0xe9, 0x63]))
        .await
        .unwrap();
    assert_eq!(reply.request_id, AUTH_FAILURE_ID);
    assert_eq!(reply.packet_type, PacketType::AUTH_RESPONSE);
    assert_eq!(reply.payload, "");

    assert!(is_closed(conn.read_packet().await));
}

#[tokio::test]
async fn test_non_utf8_command_executed() {
    let server = TestServer::start();
    let conn = server.connect().await;
    conn.request(&Packet::login(1, PASSWORD)).await.unwrap();

    let reply = conn
        .request(&Packet::command(2, b"say caf\xe9"))
        .await
        .unwrap();
    assert_eq!(reply.request_id, 2);
    assert_eq!(reply.text(), "say caf\u{fffd}");
    assert_eq!(server.executed(), vec!["say caf\u{fffd}".to_string()]);
}

#[tokio::test]
async fn test_command_before_login_disconnects() {
    let server = TestServer::start();
    let conn = server.connect().await;

    conn.send_packet(&Packet::command(1, "stop")).await.unwrap();
    assert!(is_closed(conn.read_packet().await));
    assert!(server.executed().is_empty());
}

#[tokio::test]
async fn test_second_login_disconnects() {
    let server = TestServer::start();
    let conn = server.connect().await;

    conn.request(&Packet::login(1, PASSWORD)).await.unwrap();
    conn.send_packet(&Packet::login(2, PASSWORD)).await.unwrap();
    assert!(is_closed(conn.read_packet().await));
}

#[tokio::test]
async fn test_oversized_packet_disconnects() {
    let server = TestServer::start();

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(&70_000i32.to_le_bytes()).await.unwrap();

    let conn = server.connect().await;
    // The offending connection is closed; the service keeps serving others
    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(5), async {
        stream.readable().await.unwrap();
        stream.try_read(&mut buf).unwrap_or(0)
    })
    .await
    .unwrap();
    assert_eq!(n, 0);

    let reply = conn.request(&Packet::login(3, PASSWORD)).await.unwrap();
    assert_eq!(reply.request_id, 3);
}

#[tokio::test]
async fn test_negative_size_disconnects() {
    let server = TestServer::start();
    let conn = server.connect().await;

    conn.request(&Packet::login(1, PASSWORD)).await.unwrap();

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(&(-1i32).to_le_bytes()).await.unwrap();
    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(5), async {
        stream.readable().await.unwrap();
        stream.try_read(&mut buf).unwrap_or(0)
    })
    .await
    .unwrap();
    assert_eq!(n, 0);

    // Unaffected
    let reply = conn.request(&Packet::command(2, "list")).await.unwrap();
    assert_eq!(reply.payload, "list");
}

#[tokio::test]
async fn test_auth_timeout() {
    let config = ServiceConfig::new(PASSWORD, "127.0.0.1:0".parse().unwrap())
        .with_auth_timeout(Duration::from_millis(300))
        .with_poll_interval(Duration::from_millis(50));
    let server = TestServer::start_with(config);

    let idle = server.connect().await;
    let started = Instant::now();
    let chatty = server.login().await;

    // The logged-in client keeps the worker busy the whole time.
    let (closed_after, sent) = tokio::join!(
        async {
            assert!(is_closed(idle.read_packet().await));
            started.elapsed()
        },
        async {
            let mut sent = 0;
            while started.elapsed() < Duration::from_millis(600) {
                assert_eq!(chatty.command("ping").await.unwrap(), "ping");
                sent += 1;
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            sent
        }
    );

    assert!(sent > 0);
    assert!(closed_after >= Duration::from_millis(250));
    assert!(closed_after < Duration::from_secs(4));
    assert_eq!(chatty.command("still here").await.unwrap(), "still here");
}

#[tokio::test]
async fn test_logged_in_connection_outlives_auth_timeout() {
    let config = ServiceConfig::new(PASSWORD, "127.0.0.1:0".parse().unwrap())
        .with_auth_timeout(Duration::from_millis(200))
        .with_poll_interval(Duration::from_millis(50));
    let server = TestServer::start_with(config);

    let client = server.login().await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(client.command("still here").await.unwrap(), "still here");
}

#[tokio::test]
async fn test_connection_limit() {
    let config =
        ServiceConfig::new(PASSWORD, "127.0.0.1:0".parse().unwrap()).with_max_clients(2);
    let server = TestServer::start_with(config);

    let first = server.login().await;
    let second = server.login().await;

    // Rejected without any packet exchange
    let third = server.connect().await;
    assert!(is_closed(third.read_packet().await));

    assert_eq!(first.command("one").await.unwrap(), "one");
    assert_eq!(second.command("two").await.unwrap(), "two");

    // A freed slot can be reused
    first.close().await.unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let client = Client::new(ConnectionConfig::new(server.addr));
        client.connect().await.unwrap();
        if client.login(PASSWORD).await.is_ok() {
            break;
        }
        assert!(Instant::now() < deadline, "slot was never freed");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn test_empty_command_gets_no_reply() {
    let server = TestServer::start();
    let conn = server.connect().await;
    conn.request(&Packet::login(1, PASSWORD)).await.unwrap();

    conn.send_packet(&Packet::command(2, "")).await.unwrap();
    let reply = conn.request(&Packet::command(3, "list")).await.unwrap();

    // The first reply belongs to the second command
    assert_eq!(reply.request_id, 3);
    assert_eq!(server.executed(), vec!["list".to_string()]);
}

#[tokio::test]
async fn test_leading_whitespace_stripped() {
    let server = TestServer::start();
    let client = server.login().await;

    assert_eq!(client.command("   list").await.unwrap(), "list");
    assert_eq!(server.executed(), vec!["list".to_string()]);
}

#[tokio::test]
async fn test_pipelined_packets() {
    let server = TestServer::start();

    let mut bytes = Packet::login(1, PASSWORD).encode().unwrap();
    Packet::command(2, "first").encode_to(&mut bytes).unwrap();
    Packet::command(3, "second").encode_to(&mut bytes).unwrap();

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(&bytes).await.unwrap();

    let mut decoder = rcond_protocol::Decoder::new();
    let mut replies = Vec::new();
    let mut buf = [0u8; 1024];
    tokio::time::timeout(Duration::from_secs(5), async {
        while replies.len() < 3 {
            stream.readable().await.unwrap();
            match stream.try_read(&mut buf) {
                Ok(0) => break,
                Ok(n) => decoder.extend(&buf[..n]),
                Err(_) => continue,
            }
            while let Some(packet) = decoder.decode_packet().unwrap() {
                replies.push(packet);
            }
        }
    })
    .await
    .unwrap();

    let ids: Vec<i32> = replies.iter().map(|p| p.request_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(replies[2].payload, "second");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_commands_are_serialized() {
    let server = TestServer::start();
    let first = server.login().await;
    let second = server.login().await;

    let timed = |client: &Client, command: &'static str| {
        let client = client.connection();
        async move {
            let id = client.next_request_id();
            let reply = client.request(&Packet::command(id, command)).await.unwrap();
            assert_eq!(reply.payload, "done");
            Instant::now()
        }
    };
    let (a_replied, b_replied) =
        tokio::join!(timed(&first, "slow a"), timed(&second, "slow b"));

    let runs = server.runs();
    assert_eq!(runs.len(), 2);
    let (earlier, later) = (&runs[0], &runs[1]);

    // No overlap on the host
    assert!(later.started >= earlier.finished);

    // The first reply is delivered while the second command is still running,
    // not batched with it.
    let earlier_replied = if earlier.command == "slow a" {
        a_replied
    } else {
        b_replied
    };
    let later_replied = a_replied.max(b_replied);
    assert_eq!(earlier_replied, a_replied.min(b_replied));
    assert!(earlier_replied < later.finished);
    assert!(later_replied >= later.finished);
}

#[tokio::test]
async fn test_many_clients() {
    let server = TestServer::start();

    let mut clients = Vec::new();
    for _ in 0..10 {
        clients.push(server.login().await);
    }
    for (i, client) in clients.iter().enumerate() {
        let output = client.command(&format!("echo {}", i)).await.unwrap();
        assert_eq!(output, format!("echo {}", i));
    }
}
