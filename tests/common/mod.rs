//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use pool_payout::assembly::UnsignedTransaction;
use pool_payout::broadcast::{SignedTransaction, SignerError, TransactionSigner};
use pool_payout::chain::{
    BroadcastReceipt, ChainProvider, ProviderError, ProviderResult, RejectReason, TxStatus,
    UnspentOutput,
};

/// Deterministic 64-char txid built from one byte.
pub fn txid(seed: u8) -> String {
    format!("{:02x}", seed).repeat(32)
}

pub fn utxo(seed: u8, value_sats: u64, confirmations: u32) -> UnspentOutput {
    UnspentOutput {
        txid: txid(seed),
        output_index: 0,
        value_sats,
        script_pubkey: "0014deadbeef".to_string(),
        confirmations,
    }
}

pub fn rejected(reason: RejectReason, message: &str) -> ProviderError {
    ProviderError::Rejected {
        reason,
        message: message.to_string(),
    }
}

pub fn confirmed(confirmations: u64) -> TxStatus {
    TxStatus {
        confirmed: true,
        confirmations,
        block_height: Some(800_000),
    }
}

pub fn unconfirmed() -> TxStatus {
    TxStatus {
        confirmed: false,
        confirmations: 0,
        block_height: None,
    }
}

/// In-process chain provider with scripted answers.
pub struct MockProvider {
    utxos: Mutex<ProviderResult<Vec<UnspentOutput>>>,
    /// Consumed front to back; once empty every broadcast succeeds.
    broadcast_script: Mutex<VecDeque<ProviderResult<BroadcastReceipt>>>,
    broadcast_txid: Mutex<String>,
    statuses: Mutex<HashMap<String, ProviderResult<TxStatus>>>,
    hang_broadcast: AtomicBool,
    hang_status: AtomicBool,
    status_delay_ms: AtomicU32,
    pub broadcast_calls: AtomicU32,
    pub status_calls: AtomicU32,
}

impl MockProvider {
    pub fn new(utxos: Vec<UnspentOutput>) -> Arc<Self> {
        let provider = Self::empty();
        *provider.utxos.lock().unwrap() = Ok(utxos);
        Arc::new(provider)
    }

    fn empty() -> Self {
        Self {
            utxos: Mutex::new(Ok(Vec::new())),
            broadcast_script: Mutex::new(VecDeque::new()),
            broadcast_txid: Mutex::new(txid(0xaa)),
            statuses: Mutex::new(HashMap::new()),
            hang_broadcast: AtomicBool::new(false),
            hang_status: AtomicBool::new(false),
            status_delay_ms: AtomicU32::new(0),
            broadcast_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
        }
    }

    pub fn set_utxo_error(&self, err: ProviderError) {
        *self.utxos.lock().unwrap() = Err(err);
    }

    pub fn push_broadcast(&self, result: ProviderResult<BroadcastReceipt>) {
        self.broadcast_script.lock().unwrap().push_back(result);
    }

    pub fn set_broadcast_txid(&self, txid: &str) {
        *self.broadcast_txid.lock().unwrap() = txid.to_string();
    }

    pub fn hang_broadcasts(&self) {
        self.hang_broadcast.store(true, Ordering::SeqCst);
    }

    pub fn hang_status_queries(&self) {
        self.hang_status.store(true, Ordering::SeqCst);
    }

    pub fn set_status_delay(&self, ms: u32) {
        self.status_delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn set_status(&self, txid: &str, status: ProviderResult<TxStatus>) {
        self.statuses.lock().unwrap().insert(txid.to_string(), status);
    }

    pub fn broadcasts(&self) -> u32 {
        self.broadcast_calls.load(Ordering::SeqCst)
    }

    pub fn status_queries(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainProvider for MockProvider {
    async fn fetch_address_utxos(&self, _address: &str) -> ProviderResult<Vec<UnspentOutput>> {
        self.utxos.lock().unwrap().clone()
    }

    async fn broadcast_raw_transaction(&self, _raw_hex: &str) -> ProviderResult<BroadcastReceipt> {
        self.broadcast_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_broadcast.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let scripted = self.broadcast_script.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(BroadcastReceipt {
                txid: self.broadcast_txid.lock().unwrap().clone(),
                already_known: false,
            }),
        }
    }

    async fn query_tx_status(&self, txid: &str) -> ProviderResult<TxStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_status.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let delay = self.status_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        let status = self.statuses.lock().unwrap().get(txid).cloned();
        status.unwrap_or_else(|| Ok(unconfirmed()))
    }
}

/// Txid every [`MockSigner`] signature reports, in its lowercase form. It
/// matches the default broadcast receipt of [`MockProvider`].
pub const SIGNED_TXID: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

/// Signer producing a fake raw hex, or failing on demand.
#[derive(Default)]
pub struct MockSigner {
    pub fail: AtomicBool,
    pub calls: AtomicU32,
}

impl MockSigner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let signer = Self::default();
        signer.fail.store(true, Ordering::SeqCst);
        Arc::new(signer)
    }

    pub fn signatures(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionSigner for MockSigner {
    async fn sign(&self, tx: &UnsignedTransaction) -> Result<SignedTransaction, SignerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(SignerError::Unavailable("hsm offline".to_string()));
        }
        Ok(SignedTransaction {
            raw_hex: format!("0200{:04x}{:04x}", tx.inputs.len(), tx.outputs.len()),
            txid: SIGNED_TXID.to_uppercase(),
        })
    }
}

/// One HTTP request as seen by the mock explorer.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

/// Start a programmable HTTP/1.1 explorer on an ephemeral port.
///
/// `f` maps each request to `(status, body)`.
pub async fn start_mock_explorer<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(RecordedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let Some(request) = read_request(&mut socket).await else {
                            return;
                        };
                        let (status, body) = f(request).await;
                        let status_text = match status {
                            200 => "200 OK",
                            400 => "400 Bad Request",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

async fn read_request(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 2048];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length: usize = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0);

    let body_start = header_end + 4;
    while buf.len() < body_start + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let mut request_line = head.lines().next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let end = buf.len().min(body_start + content_length);
    let body = String::from_utf8_lossy(&buf[body_start..end]).to_string();

    Some(RecordedRequest { method, path, body })
}
