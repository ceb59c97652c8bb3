//! The connection-owning client: request correlation, notification demux,
//! typed method wrappers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, warn};

use crate::jsonrpc::{Frame, Notification, Request, RpcError};
use crate::{
    HeaderNotification, HeadersChunk, TxKeysEntry, TxKeysRange, CLIENT_NAME,
    PROTOCOL_VERSION,
};

/// Default per-call timeout. Callers can override at connect time.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// In-flight requests: id → (method, response channel). The method name is
/// kept so server error objects can be classified per call site.
type PendingMap =
    Mutex<HashMap<u32, (String, oneshot::Sender<Result<Value, RpcError>>)>>;

struct Inner {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: PendingMap,
    next_id: AtomicU32,
    timeout: Duration,
}

/// A live connection to the remote indexer.
///
/// Dropping the client aborts the reader task and fails any in-flight
/// calls with a transport error.
pub struct IndexerClient {
    inner: Arc<Inner>,
    reader_task: JoinHandle<()>,
}

impl IndexerClient {
    /// Connect to `addr` ("host:port"). Returns the client plus the stream
    /// of server notifications (headers subscriptions etc.).
    pub async fn connect(
        addr: &str,
        timeout: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Notification>), RpcError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|err| RpcError::Transport(err.to_string()))?;
        let (read_half, write_half) = stream.into_split();

        let inner = Arc::new(Inner {
            writer: tokio::sync::Mutex::new(write_half),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(0),
            timeout,
        });

        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let reader_task =
            tokio::spawn(read_loop(read_half, inner.clone(), notify_tx));

        Ok((
            Self { inner, reader_task },
            notify_rx,
        ))
    }

    /// Issue one JSON-RPC call and await its correlated response.
    pub async fn call(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Value, RpcError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner
            .pending
            .lock()
            .unwrap()
            .insert(id, (method.to_owned(), tx));

        let mut line = serde_json::to_string(&Request::new(id, method, params))
            .map_err(|err| RpcError::Malformed(err.to_string()))?;
        line.push('\n');

        let write_res = {
            let mut writer = self.inner.writer.lock().await;
            writer.write_all(line.as_bytes()).await
        };
        if let Err(err) = write_res {
            self.inner.pending.lock().unwrap().remove(&id);
            return Err(RpcError::Transport(err.to_string()));
        }

        match time::timeout(self.inner.timeout, rx).await {
            Ok(Ok(result)) => result,
            // Reader task went away: connection is gone.
            Ok(Err(_recv)) =>
                Err(RpcError::Transport("connection closed".to_owned())),
            Err(_elapsed) => {
                self.inner.pending.lock().unwrap().remove(&id);
                Err(RpcError::Timeout)
            }
        }
    }

    // --- typed method wrappers --- //

    /// `server.version(clientName, protocolVersion)`
    pub async fn server_version(
        &self,
    ) -> Result<(String, String), RpcError> {
        let value = self
            .call("server.version", json!([CLIENT_NAME, PROTOCOL_VERSION]))
            .await?;
        serde_json::from_value(value).map_err(malformed)
    }

    /// `blockchain.headers.subscribe()`
    pub async fn headers_subscribe(
        &self,
    ) -> Result<HeaderNotification, RpcError> {
        let value =
            self.call("blockchain.headers.subscribe", json!([])).await?;
        serde_json::from_value(value).map_err(malformed)
    }

    /// `blockchain.block.header(height)` → 80-byte header hex
    pub async fn block_header(&self, height: u64) -> Result<String, RpcError> {
        let value =
            self.call("blockchain.block.header", json!([height])).await?;
        serde_json::from_value(value).map_err(malformed)
    }

    /// `blockchain.block.headers(start, count)`
    pub async fn block_headers(
        &self,
        start: u64,
        count: u64,
    ) -> Result<HeadersChunk, RpcError> {
        let value = self
            .call("blockchain.block.headers", json!([start, count]))
            .await?;
        serde_json::from_value(value).map_err(malformed)
    }

    /// `blockchain.block.transaction_keys(height)`
    pub async fn transaction_keys(
        &self,
        height: u64,
    ) -> Result<Vec<TxKeysEntry>, RpcError> {
        let value = self
            .call("blockchain.block.transaction_keys", json!([height]))
            .await?;
        serde_json::from_value(value).map_err(malformed)
    }

    /// `blockchain.block.transaction_keys_range(start, count?)`
    pub async fn transaction_keys_range(
        &self,
        start: u64,
        count: Option<u64>,
    ) -> Result<TxKeysRange, RpcError> {
        let params = match count {
            Some(count) => json!([start, count]),
            None => json!([start]),
        };
        let value = self
            .call("blockchain.block.transaction_keys_range", params)
            .await?;
        serde_json::from_value(value).map_err(malformed)
    }

    /// `blockchain.transaction.get_output(outputHash)` → output hex
    pub async fn transaction_get_output(
        &self,
        output_hash: &str,
    ) -> Result<String, RpcError> {
        let value = self
            .call("blockchain.transaction.get_output", json!([output_hash]))
            .await?;
        serde_json::from_value(value).map_err(malformed)
    }

    /// `blockchain.transaction.broadcast(rawHex)` → txid
    pub async fn broadcast(&self, raw_hex: &str) -> Result<String, RpcError> {
        let value = self
            .call("blockchain.transaction.broadcast", json!([raw_hex]))
            .await?;
        serde_json::from_value(value).map_err(malformed)
    }

    /// `blockchain.transaction.get(txHash, verbose?)`
    pub async fn transaction_get(
        &self,
        tx_hash: &str,
        verbose: bool,
    ) -> Result<Value, RpcError> {
        self.call("blockchain.transaction.get", json!([tx_hash, verbose]))
            .await
    }
}

impl Drop for IndexerClient {
    fn drop(&mut self) {
        self.reader_task.abort();
        fail_all_pending(&self.inner, "client dropped");
    }
}

impl HeaderNotification {
    /// Extract the payload of a `blockchain.headers.subscribe`
    /// notification; its params are a one-element array.
    pub fn from_notification(notification: &Notification) -> Option<Self> {
        let first = notification.params.get(0)?;
        serde_json::from_value(first.clone()).ok()
    }
}

fn malformed(err: serde_json::Error) -> RpcError {
    RpcError::Malformed(err.to_string())
}

fn fail_all_pending(inner: &Inner, reason: &str) {
    let pending = std::mem::take(&mut *inner.pending.lock().unwrap());
    for (_id, (_method, tx)) in pending {
        let _ = tx.send(Err(RpcError::Transport(reason.to_owned())));
    }
}

/// Reads frames off the socket until EOF or a read error, routing
/// responses to their waiting callers and notifications to subscribers.
async fn read_loop(
    read_half: OwnedReadHalf,
    inner: Arc<Inner>,
    notify_tx: mpsc::UnboundedSender<Notification>,
) {
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("indexer connection closed");
                break;
            }
            Err(err) => {
                warn!("indexer read error: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let frame: Frame = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(err) => {
                // A garbled frame cannot be correlated to a request, so
                // the waiting caller times out instead.
                warn!("malformed indexer frame: {err}");
                continue;
            }
        };

        match (frame.id, frame.method) {
            (Some(id), _) => {
                let entry = inner.pending.lock().unwrap().remove(&id);
                let Some((method, tx)) = entry else {
                    debug!("response for unknown request id {id}");
                    continue;
                };
                let result = match frame.error {
                    Some(error) => Err(error.into_rpc_error(&method)),
                    None => Ok(frame.result),
                };
                let _ = tx.send(result);
            }
            (None, Some(method)) => {
                let _ = notify_tx.send(Notification {
                    method,
                    params: frame.params,
                });
            }
            (None, None) =>
                warn!("indexer frame with neither id nor method"),
        }
    }

    fail_all_pending(&inner, "connection closed");
}
