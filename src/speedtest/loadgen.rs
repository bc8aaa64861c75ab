//! Sustained concurrent transfer streams
//!
//! A load generation window keeps a fixed number of HTTP transfer streams
//! alive for a wall-clock duration. Every completed stream is immediately
//! replaced while the deadline has not passed (self-replenishing pool); once
//! it has, replenishment stops and a shared cancellation flag tells in-flight
//! streams to wind down at their next check point. Streams are never killed
//! mid-I/O, so the window can overshoot by the tail of the slowest request.
//!
//! Every transferred byte flows through one shared `RateCounter`, which is
//! the only state mutated by multiple streams.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use log::{debug, info};
use rand::RngCore;
use reqwest::header::ACCEPT_ENCODING;
use reqwest::{Body, Client, Url};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::servers::Server;
use crate::speedtest::counter::RateCounter;
use crate::speedtest::errors::{SpeedtestError, SpeedtestResult};

/// Delay between successive stream launches, avoiding a synchronized
/// connection burst against the server
const STREAM_LAUNCH_STAGGER: Duration = Duration::from_millis(200);

/// Chunk size handed to upload request bodies
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Upload payload strategy
#[derive(Debug, Clone, Copy)]
pub enum PayloadMode {
    /// One pseudo-random buffer generated up front and replayed cyclically
    /// through the counter's wrap-around cursor
    PreAllocated { size_kib: usize },
    /// Stream directly from the OS random source: bounded memory, lower
    /// throughput, no cursor involved
    Random,
}

/// Outcome of one load generation window
#[derive(Debug, Clone, Copy)]
pub struct TransferResult {
    pub mbps: f64,
    pub total_bytes: u64,
}

/// What each stream in a window does
#[derive(Debug, Clone, Copy)]
enum StreamJob {
    Download,
    Upload(PayloadMode),
}

/// Everything a single stream needs, cloned per launch
#[derive(Clone)]
struct StreamContext {
    client: Client,
    url: Url,
    job: StreamJob,
    counter: Arc<RateCounter>,
    cancel: Arc<AtomicBool>,
    failures: Arc<AtomicUsize>,
}

/// Drives a fixed number of concurrent transfer streams for a wall-clock
/// duration against one server
pub struct LoadGenerator {
    client: Client,
}

impl LoadGenerator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Download window: concurrent GETs against the server's download path
    /// with the chunk-count hint, bodies drained through the shared counter
    pub async fn run_download(
        &self,
        server: &Server,
        concurrency: usize,
        chunks: usize,
        duration: Duration,
    ) -> SpeedtestResult<TransferResult> {
        let mut url = server.endpoint(&server.download_path)?;
        url.query_pairs_mut()
            .append_pair("ckSize", &chunks.to_string());

        info!(
            "download test: {concurrency} streams against {} for {duration:?}",
            server.name
        );
        let counter = Arc::new(RateCounter::new());
        self.run(url, StreamJob::Download, concurrency, duration, counter)
            .await
    }

    /// Upload window: concurrent streaming POSTs whose bodies are fed from
    /// the shared counter
    pub async fn run_upload(
        &self,
        server: &Server,
        concurrency: usize,
        mode: PayloadMode,
        duration: Duration,
    ) -> SpeedtestResult<TransferResult> {
        let url = server.endpoint(&server.upload_path)?;

        let counter = Arc::new(RateCounter::new());
        match mode {
            PayloadMode::PreAllocated { size_kib } => counter.generate_payload(size_kib),
            PayloadMode::Random => {
                info!("pre-allocation is disabled, upload throughput may be lower")
            }
        }

        info!(
            "upload test: {concurrency} streams against {} for {duration:?}",
            server.name
        );
        self.run(url, StreamJob::Upload(mode), concurrency, duration, counter)
            .await
    }

    async fn run(
        &self,
        url: Url,
        job: StreamJob,
        concurrency: usize,
        duration: Duration,
        counter: Arc<RateCounter>,
    ) -> SpeedtestResult<TransferResult> {
        let cancel = Arc::new(AtomicBool::new(false));
        let failures = Arc::new(AtomicUsize::new(0));
        let context = StreamContext {
            client: self.client.clone(),
            url,
            job,
            counter: Arc::clone(&counter),
            cancel: Arc::clone(&cancel),
            failures: Arc::clone(&failures),
        };

        counter.start();
        let mut streams = JoinSet::new();
        for launched in 0..concurrency {
            streams.spawn(run_stream(context.clone()));
            if launched + 1 < concurrency {
                tokio::time::sleep(STREAM_LAUNCH_STAGGER).await;
            }
        }

        let deadline = Instant::now() + duration;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    cancel.store(true, Ordering::Relaxed);
                    break;
                }
                joined = streams.join_next() => {
                    match joined {
                        // a stream finished early: replenish to keep
                        // concurrency at the configured level
                        Some(_) => {
                            streams.spawn(run_stream(context.clone()));
                        }
                        None => break,
                    }
                }
            }
        }

        // wind-down: in-flight streams observe the flag at their next check
        // point and finish naturally
        while streams.join_next().await.is_some() {}

        let result = TransferResult {
            mbps: counter.avg_mbps(),
            total_bytes: counter.total(),
        };
        let failed = failures.load(Ordering::Relaxed);
        if result.total_bytes == 0 && failed > 0 {
            return Err(SpeedtestError::TransferStalled {
                failed_streams: failed,
            });
        }
        debug!(
            "transfer window closed: {} bytes, {:.2} Mbps, {failed} failed streams",
            result.total_bytes, result.mbps
        );
        Ok(result)
    }
}

/// One stream from launch to completion; failures are absorbed here so the
/// pool can replenish over them
async fn run_stream(context: StreamContext) {
    let result = match context.job {
        StreamJob::Download => download_stream(&context).await,
        StreamJob::Upload(mode) => upload_stream(&context, mode).await,
    };
    if let Err(err) = result {
        if context.cancel.load(Ordering::Relaxed) {
            // wind-down after the deadline is expected, not a failure
            debug!("stream closed during wind-down: {err}");
        } else {
            context.failures.fetch_add(1, Ordering::Relaxed);
            debug!("transfer stream failed: {err}");
        }
    }
}

async fn download_stream(context: &StreamContext) -> Result<(), reqwest::Error> {
    let response = context
        .client
        .get(context.url.clone())
        .header(ACCEPT_ENCODING, "identity")
        .send()
        .await?;

    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        context.counter.record(chunk.len());
        // cooperative cancellation check point between chunks
        if context.cancel.load(Ordering::Relaxed) {
            break;
        }
    }
    Ok(())
}

async fn upload_stream(context: &StreamContext, mode: PayloadMode) -> Result<(), reqwest::Error> {
    let body = upload_body(
        mode,
        Arc::clone(&context.counter),
        Arc::clone(&context.cancel),
    );
    let response = context
        .client
        .post(context.url.clone())
        .header(ACCEPT_ENCODING, "identity")
        .body(body)
        .send()
        .await?;
    let _ = response.bytes().await;
    Ok(())
}

/// Streaming request body that yields chunks until the cancellation flag is
/// observed; returning `None` ends the chunked body so the request completes
/// naturally instead of being aborted
fn upload_body(mode: PayloadMode, counter: Arc<RateCounter>, cancel: Arc<AtomicBool>) -> Body {
    let stream = futures::stream::unfold((counter, cancel), move |(counter, cancel)| async move {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }
        let chunk = match mode {
            PayloadMode::PreAllocated { .. } => counter.next_chunk(UPLOAD_CHUNK_SIZE),
            PayloadMode::Random => random_chunk(&counter, UPLOAD_CHUNK_SIZE),
        };
        if chunk.is_empty() {
            return None;
        }
        Some((Ok::<Bytes, std::io::Error>(chunk), (counter, cancel)))
    });
    Body::wrap_stream(stream)
}

/// Bounded-memory chunk drawn from the OS random source
fn random_chunk(counter: &RateCounter, len: usize) -> Bytes {
    let mut buf = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    counter.record(buf.len());
    Bytes::from(buf)
}
