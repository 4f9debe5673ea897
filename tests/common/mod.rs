//! Shared helpers: an in-process venue speaking WebSocket on 127.0.0.1
#![allow(dead_code)]

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

pub const SESSION_ID: &str = "8469308861804289383";

pub const BALANCE_FIXTURE: &str = r#"{"command":"balance","data":{"balance":995800269.43,"credit":1000.00,"equity":995985397.56,"margin":572634.43,"marginFree":995227635.00,"marginLevel":173930.41}}"#;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Check if live tests against the demo venue should run
pub fn should_run_live_tests() -> bool {
    env::var("RUN_LIVE_TESTS").unwrap_or_default() == "true"
}

pub fn print_test_result(test_name: &str, success: bool, message: &str) {
    let emoji = if success { "✅" } else { "❌" };
    println!("{} {}: {}", emoji, test_name, message);
}

pub fn print_warning(test_name: &str, message: &str) {
    println!("⚠️ {}: {}", test_name, message);
}

/// Server side of one accepted WebSocket
pub struct VenueSocket {
    ws: WebSocketStream<TcpStream>,
}

impl VenueSocket {
    /// Next text message as JSON; `None` once the client is gone
    pub async fn recv_json(&mut self) -> Option<Value> {
        while let Some(Ok(message)) = self.ws.next().await {
            match message {
                Message::Text(text) => return serde_json::from_str(&text).ok(),
                Message::Close(_) => return None,
                _ => {}
            }
        }
        None
    }

    /// Like `recv_json`, but fails the test after `timeout`
    pub async fn expect_json(&mut self, timeout: Duration) -> anyhow::Result<Value> {
        tokio::time::timeout(timeout, self.recv_json())
            .await
            .context("venue timed out waiting for a message")?
            .context("client closed the connection")
    }

    pub async fn send_text(&mut self, text: &str) -> anyhow::Result<()> {
        self.ws.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    pub async fn send_json(&mut self, value: &Value) -> anyhow::Result<()> {
        self.send_text(&value.to_string()).await
    }

    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}

async fn bind() -> anyhow::Result<(TcpListener, String)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}", listener.local_addr()?);
    Ok((listener, url))
}

/// Accept exactly one connection and hand it to `script`
pub async fn spawn_venue<F, Fut>(script: F) -> anyhow::Result<(String, tokio::task::JoinHandle<anyhow::Result<()>>)>
where
    F: FnOnce(VenueSocket) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let (listener, url) = bind().await?;
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await?;
        let ws = accept_async(stream).await?;
        script(VenueSocket { ws }).await
    });
    Ok((url, handle))
}

/// Requests seen by a call venue, in arrival order
pub type RequestLog = Arc<Mutex<Vec<Value>>>;

/// A call venue answering every request with `respond(request)`; `None` swallows it
pub async fn spawn_call_venue<F>(respond: F) -> anyhow::Result<(String, RequestLog)>
where
    F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
{
    let (listener, url) = bind().await?;
    let log = RequestLog::default();
    let respond = Arc::new(respond);

    let requests = Arc::clone(&log);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let respond = Arc::clone(&respond);
            let requests = Arc::clone(&requests);
            tokio::spawn(async move {
                let Ok(ws) = accept_async(stream).await else {
                    return;
                };
                let mut socket = VenueSocket { ws };
                while let Some(request) = socket.recv_json().await {
                    requests.lock().await.push(request.clone());
                    if let Some(response) = respond(&request) {
                        if socket.send_json(&response).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });

    Ok((url, log))
}
