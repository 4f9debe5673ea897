/// Transport kernel shared by the call and stream channels
///
/// The kernel knows nothing about the venue's commands or record schemas. It
/// provides:
///
/// - `WsWriter` / `WsReader`: the minimal socket contract (write text, read
///   message, close) with a tokio-tungstenite implementation behind `dial`
/// - `Connection`: a duplex connection with cancellable, deadline-bounded
///   `send` and `receive`, serialized writes and a single outstanding read
///
/// # Example
/// ```rust,no_run
/// use xapi_client::core::kernel::Connection;
/// use std::time::Duration;
/// use tokio::time::Instant;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let token = CancellationToken::new();
/// let conn = Connection::connect("wss://ws.xtb.com/demo", Duration::from_secs(10), &token).await?;
///
/// let deadline = Some(Instant::now() + Duration::from_millis(250));
/// conn.send(r#"{"command":"ping"}"#.to_string(), deadline, &token).await?;
/// let reply = conn.receive(deadline, &token).await?;
/// println!("{}", String::from_utf8_lossy(&reply));
///
/// conn.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub mod connection;
#[cfg(test)]
pub(crate) mod mock;
pub mod transport;

pub(crate) use connection::expire;
pub use connection::{Connection, ConnectionState};
pub use transport::{dial, TungsteniteReader, TungsteniteWriter, WsReader, WsWriter};
