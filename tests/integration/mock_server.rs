//! Mock lottery server for integration testing.
//!
//! Accepts one request line per connection, records it, and answers the
//! way the real server does: an acknowledgement for bet batches and the
//! next scripted reply for result polls. All state is in-memory and
//! inspectable from test code.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// How the server treats each connection.
#[derive(Clone)]
enum Behavior {
    /// Ack batches (if enabled) and pop poll replies from the script.
    /// Polls beyond the script get `WAIT`.
    Scripted {
        ack_batches: bool,
        polls: Arc<Mutex<VecDeque<String>>>,
    },
    /// Read the request, then hold the connection open without replying.
    Silent,
}

pub struct MockServer {
    address: String,
    received: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
}

impl MockServer {
    /// Start a server that answers polls with `poll_replies`, in order.
    pub async fn start(poll_replies: &[&str], ack_batches: bool) -> Self {
        let polls = poll_replies.iter().map(|r| r.to_string()).collect();
        Self::spawn(Behavior::Scripted {
            ack_batches,
            polls: Arc::new(Mutex::new(polls)),
        })
        .await
    }

    /// Start a server that never replies.
    pub async fn silent() -> Self {
        Self::spawn(Behavior::Silent).await
    }

    async fn spawn(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let (rx, conns) = (received.clone(), connections.clone());
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                conns.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(handle(socket, behavior.clone(), rx.clone()));
            }
        });

        Self {
            address,
            received,
            connections,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Request lines received so far, delimiter stripped, in arrival order.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    /// Poll requests received so far.
    pub fn polls(&self) -> usize {
        self.received()
            .iter()
            .filter(|line| line.ends_with("Awaiting results"))
            .count()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

async fn handle(socket: TcpStream, behavior: Behavior, received: Arc<Mutex<Vec<String>>>) {
    let (read_half, mut write_half) = socket.into_split();
    let mut line = String::new();
    if BufReader::new(read_half).read_line(&mut line).await.is_err() {
        return;
    }
    let line = line.trim_end_matches('\n').to_string();
    received.lock().unwrap().push(line.clone());

    let reply = match behavior {
        Behavior::Silent => {
            std::future::pending::<()>().await;
            return;
        }
        Behavior::Scripted { ack_batches, polls } => {
            if let Some((_, bets)) = line.split_once(" Bets -> ") {
                if !ack_batches {
                    return;
                }
                let count = bets.matches("][").count() + 1;
                format!("Apuestas recibidas | Cantidad: {count}")
            } else {
                polls
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| "WAIT".to_string())
            }
        }
    };

    let _ = write_half.write_all(format!("{reply}\n").as_bytes()).await;
}
