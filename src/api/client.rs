use crate::api::codec::{decode_payload, decode_response, encode_request};
use crate::core::config::ApiOptions;
use crate::core::errors::{CallError, CloseError, ConnectError};
use crate::core::kernel::{expire, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Synchronous request/response client for the venue's call channel
///
/// The venue answers calls strictly in order and carries no request id, so a
/// call holds the connection exclusively from its send until its reply has
/// been read. Concurrent callers queue on that lock.
pub struct ApiClient {
    options: ApiOptions,
    conn: Mutex<Option<Connection>>,
    cancellation_token: CancellationToken,
}

impl ApiClient {
    pub fn new(options: ApiOptions) -> Self {
        Self {
            options,
            conn: Mutex::new(None),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn options(&self) -> &ApiOptions {
        &self.options
    }

    /// Token observed by every typed operation on this client
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    /// Cancel all in-flight and future typed operations on this client
    pub fn cancel_all_requests(&self) {
        self.cancellation_token.cancel();
    }

    #[instrument(skip(self), fields(url = %self.options.url))]
    pub async fn connect(&self) -> Result<(), ConnectError> {
        let conn = Connection::connect(
            &self.options.url,
            self.options.connect_timeout,
            &self.cancellation_token,
        )
        .await?;
        self.attach(conn).await;
        Ok(())
    }

    /// Use an already established connection for subsequent calls
    pub async fn attach(&self, conn: Connection) {
        *self.conn.lock().await = Some(conn);
    }

    pub async fn is_connected(&self) -> bool {
        self.conn
            .lock()
            .await
            .as_ref()
            .is_some_and(|conn| !conn.is_closed())
    }

    /// Close the call connection; waits for an in-flight call to finish
    #[instrument(skip(self), fields(url = %self.options.url))]
    pub async fn disconnect(&self) -> Result<(), CloseError> {
        let conn = self.conn.lock().await.take();
        match conn {
            Some(conn) => conn.disconnect().await,
            None => Err(CloseError::AlreadyClosed),
        }
    }

    /// Send one command and wait for its single reply
    ///
    /// `timeout` bounds the whole exchange, including the wait for exclusive
    /// access; a timeout too large to represent means no deadline. Returns the
    /// response payload (see `decode_response`).
    ///
    /// Replies are not correlated with requests: a reply that arrives after
    /// this call returned `CallError::Timeout` is read by the next call.
    #[instrument(skip_all, fields(command = %command))]
    pub async fn call<A>(
        &self,
        command: &str,
        arguments: Option<&A>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Value, CallError>
    where
        A: Serialize + ?Sized + Sync,
    {
        let deadline = Instant::now().checked_add(timeout);
        let request = encode_request(command, arguments).map_err(CallError::Encode)?;

        let guard = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CallError::Cancelled),
            () = expire(deadline) => return Err(CallError::Timeout),
            guard = self.conn.lock() => guard,
        };
        let conn = guard.as_ref().ok_or(CallError::NotConnected)?;

        debug!(bytes = request.len(), "write");
        conn.send(request, deadline, cancel).await?;
        let response = conn.receive(deadline, cancel).await?;
        drop(guard);

        decode_response(&response)
    }

    /// Typed call using the configured call timeout and the client token
    pub(crate) async fn request<A, T>(&self, command: &str, arguments: Option<&A>) -> Result<T, CallError>
    where
        A: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let payload = self
            .call(
                command,
                arguments,
                self.options.call_timeout,
                &self.cancellation_token,
            )
            .await?;
        decode_payload(command, payload)
    }
}
