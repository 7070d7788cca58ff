#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use gatewayx::core::errors::ExchangeError;
use gatewayx::core::kernel::{SessionEvent, StreamConfig, WsConfig};
use gatewayx::core::traits::ListenKeyApi;
use gatewayx::core::types::AssetClass;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone)]
enum Command {
    Text(String),
    Close,
}

/// Loopback WebSocket server that records every text frame it receives and
/// the path each connection was dialed with, and can push frames or close
/// connections on demand.
pub struct MockServer {
    pub url: String,
    received: Arc<Mutex<Vec<String>>>,
    paths: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
    commands: broadcast::Sender<Command>,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let received = Arc::new(Mutex::new(Vec::new()));
        let paths = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let (commands, _) = broadcast::channel(64);

        let server = Self {
            url,
            received: Arc::clone(&received),
            paths: Arc::clone(&paths),
            connections: Arc::clone(&connections),
            commands: commands.clone(),
        };

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let paths = Arc::clone(&paths);
                let record_path = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                    paths.lock().unwrap().push(request.uri().path().to_string());
                    Ok(response)
                };
                let Ok(socket) = tokio_tungstenite::accept_hdr_async(stream, record_path).await else {
                    continue;
                };
                let mut commands = commands.subscribe();
                connections.fetch_add(1, Ordering::SeqCst);
                let (mut sink, mut source) = socket.split();
                let received = Arc::clone(&received);

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            frame = source.next() => match frame {
                                Some(Ok(Message::Text(text))) => received.lock().unwrap().push(text),
                                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                Some(Ok(_)) => {}
                            },
                            command = commands.recv() => match command {
                                Ok(Command::Text(text)) => {
                                    if sink.send(Message::Text(text)).await.is_err() {
                                        break;
                                    }
                                }
                                Ok(Command::Close) | Err(_) => {
                                    let _ = sink.send(Message::Close(None)).await;
                                    break;
                                }
                            },
                        }
                    }
                });
            }
        });

        server
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    /// Request path of every accepted connection, in order.
    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` frames arrived.
    pub async fn wait_for_frames(&self, count: usize) -> Vec<String> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let frames = self.received();
                if frames.len() >= count {
                    return frames;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("frames did not arrive in time")
    }

    /// Wait until `count` connections were accepted and can take commands.
    pub async fn wait_for_connections(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.connections() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("connection was not accepted in time");
    }

    pub fn push(&self, text: &str) {
        let _ = self.commands.send(Command::Text(text.to_string()));
    }

    pub fn close_all(&self) {
        let _ = self.commands.send(Command::Close);
    }
}

pub fn stream_config(server: &MockServer) -> StreamConfig {
    StreamConfig::new("binance", AssetClass::UsdMargined, server.url.clone(), server.url.clone()).with_ws(
        WsConfig {
            connect_timeout_ms: 2_000,
            ping_interval_ms: None,
            message_buffer_size: 64,
        },
    )
}

/// Scripted listen key source.
#[derive(Default)]
pub struct MockListenKeys {
    pub create_result: Mutex<Option<Result<String, String>>>,
    pub create_delay: Option<Duration>,
    pub fail_renewals: bool,
    pub renewed_key: Mutex<Option<String>>,
    pub renewals: AtomicUsize,
}

impl MockListenKeys {
    pub fn granting(key: &str) -> Self {
        Self {
            create_result: Mutex::new(Some(Ok(key.to_string()))),
            ..Self::default()
        }
    }

    pub fn refusing() -> Self {
        Self {
            create_result: Mutex::new(Some(Err("Invalid API-key".to_string()))),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ListenKeyApi for MockListenKeys {
    async fn create_listen_key(&self, _asset: AssetClass) -> Result<String, ExchangeError> {
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        match self.create_result.lock().unwrap().clone() {
            Some(Ok(key)) => Ok(key),
            Some(Err(message)) => Err(ExchangeError::AuthError(message)),
            None => Err(ExchangeError::AuthError("no key scripted".to_string())),
        }
    }

    async fn keepalive_listen_key(
        &self,
        _asset: AssetClass,
        _listen_key: &str,
    ) -> Result<Option<String>, ExchangeError> {
        self.renewals.fetch_add(1, Ordering::SeqCst);
        if self.fail_renewals {
            return Err(ExchangeError::NetworkError("connection reset".to_string()));
        }
        Ok(self.renewed_key.lock().unwrap().clone())
    }
}

/// Next event within a deadline.
pub async fn next_event(events: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no event in time")
        .expect("event channel closed")
}

pub fn frame_params(frame: &str) -> Vec<String> {
    let value: serde_json::Value = serde_json::from_str(frame).unwrap();
    value["params"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p.as_str().unwrap().to_string())
        .collect()
}
