// VecUpload — client.rs
// Wire payloads, the HTTP transport, and the typed upsert/query client.
// Author: d65v <https://github.com/d65v>
//
// The request body is never buffered whole before sending: a scoped writer
// thread serializes the payload into a bounded pipe while the calling thread
// streams it out and drains the response. Both sides are joined before the
// response is looked at.

use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Body, Client};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::response::{classify, QueryResponse, UpsertResponse};
use crate::{Config, Result, UploadError};

pub const UPSERT_PATH: &str = "/vectors/upsert";
pub const QUERY_PATH: &str = "/query";

const PIPE_CHUNK: usize = 64 * 1024;
const PIPE_DEPTH: usize = 4;

// ── Wire Payloads ─────────────────────────────────────────────────────────────

/// One vector as uploaded to the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    namespace: &'a str,
}

/// Nearest-neighbour query against one namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub namespace: Option<String>,
    pub top_k: u32,
    pub include_values: bool,
    pub include_metadata: bool,
    pub vector: Vec<f32>,
    pub filter: Option<serde_json::Value>,
}

// ── Transport ─────────────────────────────────────────────────────────────────

/// Sends one JSON payload to a path on the index and returns the raw body.
///
/// Implementations report connection-level failures as
/// `UploadError::Transport`. The body is returned as-is whatever the service
/// put in it; deciding success is up to [`classify`].
pub trait Transport {
    fn post<P>(&self, path: &str, payload: &P) -> Result<Vec<u8>>
    where
        P: Serialize + Sync;
}

/// Blocking HTTPS transport bound to one index endpoint.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    api_key: HeaderValue,
}

impl HttpTransport {
    /// Build a transport for the index described by `config`.
    ///
    /// No request timeout is set: a stalled call blocks until the
    /// connection gives up.
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| UploadError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Self::with_client(client, config.endpoint(), &config.api_key)
    }

    /// Use an already configured client, e.g. one without proxy support.
    pub fn with_client(client: Client, base_url: impl Into<String>, api_key: &str) -> Result<Self> {
        let base_url = base_url.into();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(UploadError::Config(format!(
                "index endpoint must be an http(s) URL, got '{}'",
                base_url
            )));
        }
        let mut api_key = HeaderValue::from_str(api_key.trim())
            .map_err(|_| UploadError::Config("API key is not a valid header value".into()))?;
        api_key.set_sensitive(true);
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Transport for HttpTransport {
    fn post<P>(&self, path: &str, payload: &P) -> Result<Vec<u8>>
    where
        P: Serialize + Sync,
    {
        let url = format!("{}{}", self.base_url, path);
        let (mut writer, reader) = body_pipe(PIPE_CHUNK, PIPE_DEPTH);

        thread::scope(|scope| {
            let feeder = scope.spawn(move || -> io::Result<usize> {
                serde_json::to_writer(&mut writer, payload)?;
                writer.flush()?;
                Ok(writer.written())
            });

            let response = self
                .client
                .post(&url)
                .header("Api-Key", self.api_key.clone())
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(Body::new(reader))
                .send()
                .and_then(|resp| {
                    let status = resp.status();
                    resp.bytes().map(|body| (status, body))
                });

            let fed = feeder
                .join()
                .map_err(|_| UploadError::Transport("request body writer panicked".into()))?;

            let (status, body) = response
                .map_err(|e| UploadError::Transport(format!("POST {} failed: {}", url, e)))?;
            let sent = fed.map_err(|e| {
                UploadError::Transport(format!("writing request body for {} failed: {}", url, e))
            })?;

            if status.is_success() {
                log::debug!("POST {} -> {} ({} bytes out, {} bytes in)", path, status, sent, body.len());
            } else {
                log::warn!("POST {} -> {} ({} bytes in)", path, status, body.len());
            }
            Ok(body.to_vec())
        })
    }
}

// ── Body Pipe ─────────────────────────────────────────────────────────────────

/// Bounded in-memory pipe: `Write` on one thread, `Read` on another.
/// Dropping the writer ends the stream; dropping the reader makes further
/// writes fail with `BrokenPipe`.
fn body_pipe(chunk: usize, depth: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::sync_channel(depth);
    (
        PipeWriter {
            tx,
            buf: Vec::with_capacity(chunk),
            chunk,
            written: 0,
        },
        PipeReader {
            rx,
            current: Vec::new(),
            pos: 0,
        },
    )
}

struct PipeWriter {
    tx: SyncSender<Vec<u8>>,
    buf: Vec<u8>,
    chunk: usize,
    written: usize,
}

impl PipeWriter {
    fn written(&self) -> usize {
        self.written
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(self.chunk));
        self.tx
            .send(chunk)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "request body reader closed"))
    }
}

impl Write for PipeWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        self.written += data.len();
        if self.buf.len() >= self.chunk {
            self.send_buffered()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

struct PipeReader {
    rx: Receiver<Vec<u8>>,
    current: Vec<u8>,
    pos: usize,
}

impl Read for PipeReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        while self.pos == self.current.len() {
            match self.rx.recv() {
                Ok(next) => {
                    self.current = next;
                    self.pos = 0;
                }
                // writer gone: end of body
                Err(_) => return Ok(0),
            }
        }
        let n = out.len().min(self.current.len() - self.pos);
        out[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

// ── Typed Client ──────────────────────────────────────────────────────────────

/// Upsert and query operations on top of a [`Transport`].
pub struct PineconeClient<T = HttpTransport> {
    transport: T,
}

impl PineconeClient<HttpTransport> {
    /// Client for the index named by `config`, over HTTPS.
    pub fn connect(config: &Config) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        log::info!("Using index endpoint {}", transport.base_url());
        Ok(Self::new(transport))
    }
}

impl<T: Transport> PineconeClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Upsert `vectors` into `namespace`, returning the count the service accepted.
    ///
    /// # Errors
    /// `Transport` on connection failure, `Service` if the service answered with
    /// its error shape, `ResponseFormat` if the answer was neither.
    pub fn upsert(&self, vectors: &[VectorRecord], namespace: &str) -> Result<u64> {
        log::debug!("upserting {} vectors into '{}'", vectors.len(), namespace);
        let raw = self
            .transport
            .post(UPSERT_PATH, &UpsertRequest { vectors, namespace })?;
        let accepted: UpsertResponse = classify(&raw)?.into_result()?;
        Ok(accepted.upserted_count)
    }

    /// Run a nearest-neighbour query.
    pub fn query(&self, query: &Query) -> Result<QueryResponse> {
        log::debug!(
            "querying top {} in {:?}",
            query.top_k,
            query.namespace.as_deref().unwrap_or("")
        );
        let raw = self.transport.post(QUERY_PATH, query)?;
        classify(&raw)?.into_result()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
