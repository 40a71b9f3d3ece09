//! HTTP range fetcher streaming bytes into a [`FileBuffer`].
//!
//! The [`Fetcher`] wraps a shared `reqwest::Client` configured once with
//! timeouts and a default User-Agent, and is cheap to clone. One byte range
//! is fetched per [`Fetcher::fetch_range`] call, against a primary URL with
//! ordered mirror fallback, under a caller-supplied connection limiter.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use rand::Rng;
use reqwest::header::{CONTENT_RANGE, RANGE, REFERER};
use reqwest::{Client, StatusCode};
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};
use url::Url;

use super::buffer::FileBuffer;
use super::constants::{
    CONNECT_TIMEOUT_SECS, MIRROR_RETRY_BASE_DELAY, MIRROR_RETRY_MAX_JITTER, READ_TIMEOUT_SECS,
};
use super::error::DownloadError;

/// Default User-Agent for stream requests (identifies the tool).
fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("avget/{version}")
}

/// HTTP client for fetching stream byte ranges.
///
/// Designed to be created once per engine and reused for every range,
/// taking advantage of connection pooling.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    referer: Option<String>,
}

impl Fetcher {
    /// Creates a fetcher with default timeouts and no Referer.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_settings(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, None)
    }

    /// Creates a fetcher with explicit timeouts and an optional Referer
    /// header attached to every request (some stream hosts reject
    /// referer-less requests).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the supplied
    /// configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_settings(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
        referer: Option<String>,
    ) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(default_user_agent())
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client, referer }
    }

    /// Probes the total size of the remote object behind `url`.
    ///
    /// Issues a two-byte range request and reads the total from the
    /// `Content-Range` header; falls back to `Content-Length` when the
    /// server ignores ranges. Returns `Ok(None)` when the size cannot be
    /// determined.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on invalid URLs, transport failures, or
    /// error status codes.
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn remote_size(&self, url: &str) -> Result<Option<u64>, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let mut request = self.client.get(url).header(RANGE, "bytes=0-1");
        if let Some(referer) = &self.referer {
            request = request.header(REFERER, referer);
        }
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;
        if !response.status().is_success() {
            return Err(DownloadError::http_status(url, response.status().as_u16()));
        }

        if response.status() == StatusCode::PARTIAL_CONTENT {
            let total = response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range_total);
            debug!(?total, "size from Content-Range");
            return Ok(total);
        }
        let total = response.content_length();
        debug!(?total, "size from Content-Length");
        Ok(total)
    }

    /// Fetches one byte range into `buffer`, trying `urls` in order.
    ///
    /// `urls[0]` is the primary source; the rest are mirrors serving
    /// identical content. Each received chunk is written at its absolute
    /// offset as it arrives, so a fallover resumes the range from the bytes
    /// already landed rather than restarting it. A `None` size streams until
    /// the connection closes.
    ///
    /// The fetch first waits for a slot on `limiter`, the process-wide bound
    /// on simultaneous connections.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::MirrorsExhausted`] once every URL has
    /// failed, carrying the final attempt's error.
    #[instrument(level = "debug", skip(self, limiter, urls, buffer), fields(url = %urls.first().map_or("", String::as_str), offset, size))]
    pub async fn fetch_range(
        &self,
        limiter: Arc<Semaphore>,
        urls: Vec<String>,
        buffer: Arc<FileBuffer>,
        offset: u64,
        size: Option<u64>,
    ) -> Result<(), DownloadError> {
        debug_assert!(!urls.is_empty(), "a selected stream always has a primary URL");
        let _permit = limiter
            .acquire_owned()
            .await
            .map_err(|_| DownloadError::LimiterClosed)?;

        let mut done: u64 = 0;
        let mut last_err: Option<DownloadError> = None;
        for (attempt, url) in urls.iter().enumerate() {
            if size.is_some_and(|s| done >= s) {
                // A source can die after delivering its final byte; the
                // range is complete regardless.
                return Ok(());
            }
            if attempt > 0 {
                tokio::time::sleep(mirror_fallover_delay()).await;
            }
            let remaining = size.map(|s| s - done);
            match self
                .stream_range(url, &buffer, offset + done, remaining, done > 0, &mut done)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        url = %url,
                        attempt = attempt + 1,
                        total_urls = urls.len(),
                        bytes_done = done,
                        error = %e,
                        "range fetch failed, falling over to next mirror"
                    );
                    last_err = Some(e);
                }
            }
        }

        let primary = urls.first().cloned().unwrap_or_default();
        let attempts = urls.len();
        Err(DownloadError::mirrors_exhausted(
            primary,
            attempts,
            last_err.unwrap_or(DownloadError::LimiterClosed),
        ))
    }

    /// Streams one (possibly partial) range from a single URL into the
    /// buffer, advancing `done` per chunk so the caller can resume from the
    /// failure point on the next mirror.
    async fn stream_range(
        &self,
        url: &str,
        buffer: &FileBuffer,
        start: u64,
        size: Option<u64>,
        resumed: bool,
        done: &mut u64,
    ) -> Result<(), DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let mut request = self.client.get(url);
        if let Some(referer) = &self.referer {
            request = request.header(REFERER, referer);
        }
        match size {
            Some(size) => {
                request = request.header(RANGE, format!("bytes={start}-{}", start + size - 1));
            }
            // Unknown total: plain GET on the first attempt, open-ended
            // range when resuming mid-stream after a mirror fallover.
            None if resumed => {
                request = request.header(RANGE, format!("bytes={start}-"));
            }
            None => {}
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;
        if !response.status().is_success() {
            return Err(DownloadError::http_status(url, response.status().as_u16()));
        }

        let mut stream = response.bytes_stream();
        let mut position = start;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                if e.is_timeout() {
                    DownloadError::timeout(url)
                } else {
                    DownloadError::network(url, e)
                }
            })?;
            buffer.write_at(position, &chunk).await?;
            position += chunk.len() as u64;
            *done += chunk.len() as u64;
        }
        Ok(())
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Short jittered pause before hitting the next mirror, so a flapping
/// primary does not hammer its fallbacks in lockstep.
fn mirror_fallover_delay() -> Duration {
    let max_jitter_ms = u64::try_from(MIRROR_RETRY_MAX_JITTER.as_millis()).unwrap_or(u64::MAX);
    let jitter = rand::thread_rng().gen_range(0..=max_jitter_ms);
    MIRROR_RETRY_BASE_DELAY + Duration::from_millis(jitter)
}

/// Parses the total size out of a `Content-Range: bytes 0-1/12345` header.
/// Returns `None` for the unknown-size form (`bytes 0-1/*`).
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_content_range_total() {
        assert_eq!(parse_content_range_total("bytes 0-1/2500000"), Some(2_500_000));
        assert_eq!(parse_content_range_total("bytes 0-1/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[tokio::test]
    async fn test_remote_size_from_content_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v.m4s"))
            .and(header("Range", "bytes=0-1"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("Content-Range", "bytes 0-1/2500000")
                    .set_body_bytes(b"\x00\x00".to_vec()),
            )
            .mount(&server)
            .await;

        let fetcher = Fetcher::new();
        let size = fetcher
            .remote_size(&format!("{}/v.m4s", server.uri()))
            .await
            .unwrap();
        assert_eq!(size, Some(2_500_000));
    }

    #[tokio::test]
    async fn test_remote_size_falls_back_to_content_length() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v.m4s"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 64]))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new();
        let size = fetcher
            .remote_size(&format!("{}/v.m4s", server.uri()))
            .await
            .unwrap();
        assert_eq!(size, Some(64));
    }

    #[tokio::test]
    async fn test_remote_size_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.m4s"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new();
        let result = fetcher.remote_size(&format!("{}/gone.m4s", server.uri())).await;
        assert!(matches!(
            result,
            Err(DownloadError::HttpStatus { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_range_writes_at_offset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v.m4s"))
            .and(header("Range", "bytes=5-9"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(b"world".to_vec()))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let buffer = Arc::new(FileBuffer::open(tmp.path().join("v.m4s"), false).await.unwrap());
        let fetcher = Fetcher::new();
        let limiter = Arc::new(Semaphore::new(2));

        fetcher
            .fetch_range(
                limiter,
                vec![format!("{}/v.m4s", server.uri())],
                Arc::clone(&buffer),
                5,
                Some(5),
            )
            .await
            .unwrap();

        buffer.write_at(0, b"hello").await.unwrap();
        assert_eq!(buffer.written_size().await, 10);
        buffer.close().await.unwrap();
        assert_eq!(std::fs::read(buffer.path()).unwrap(), b"helloworld");
    }

    #[tokio::test]
    async fn test_fetch_range_falls_over_to_mirror() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/primary.m4s"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mirror.m4s"))
            .and(header("Range", "bytes=0-3"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(b"data".to_vec()))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let buffer = Arc::new(FileBuffer::open(tmp.path().join("v.m4s"), false).await.unwrap());
        let fetcher = Fetcher::new();
        let limiter = Arc::new(Semaphore::new(2));

        fetcher
            .fetch_range(
                limiter,
                vec![
                    format!("{}/primary.m4s", server.uri()),
                    format!("{}/mirror.m4s", server.uri()),
                ],
                Arc::clone(&buffer),
                0,
                Some(4),
            )
            .await
            .unwrap();

        assert_eq!(buffer.written_size().await, 4);
        buffer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_range_exhausts_all_mirrors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let buffer = Arc::new(FileBuffer::open(tmp.path().join("v.m4s"), false).await.unwrap());
        let fetcher = Fetcher::new();
        let limiter = Arc::new(Semaphore::new(2));

        let result = fetcher
            .fetch_range(
                limiter,
                vec![
                    format!("{}/a.m4s", server.uri()),
                    format!("{}/b.m4s", server.uri()),
                    format!("{}/c.m4s", server.uri()),
                ],
                Arc::clone(&buffer),
                0,
                Some(4),
            )
            .await;

        match result {
            Err(DownloadError::MirrorsExhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, DownloadError::HttpStatus { status: 500, .. }));
            }
            other => panic!("Expected MirrorsExhausted, got: {other:?}"),
        }
        buffer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_unbounded_streams_whole_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/live.m4s"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 4096]))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let buffer = Arc::new(FileBuffer::open(tmp.path().join("live.m4s"), false).await.unwrap());
        let fetcher = Fetcher::new();
        let limiter = Arc::new(Semaphore::new(1));

        fetcher
            .fetch_range(
                limiter,
                vec![format!("{}/live.m4s", server.uri())],
                Arc::clone(&buffer),
                0,
                None,
            )
            .await
            .unwrap();

        assert_eq!(buffer.written_size().await, 4096);
        buffer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_respects_limiter_capacity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(b"xx".to_vec()))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let buffer = Arc::new(FileBuffer::open(tmp.path().join("v.m4s"), false).await.unwrap());
        let fetcher = Fetcher::new();
        // A single permit forces the two fetches to serialize; both must
        // still complete.
        let limiter = Arc::new(Semaphore::new(1));

        let first = fetcher.fetch_range(
            Arc::clone(&limiter),
            vec![format!("{}/v.m4s", server.uri())],
            Arc::clone(&buffer),
            0,
            Some(2),
        );
        let second = fetcher.fetch_range(
            Arc::clone(&limiter),
            vec![format!("{}/v.m4s", server.uri())],
            Arc::clone(&buffer),
            2,
            Some(2),
        );
        let (a, b) = tokio::join!(first, second);
        a.unwrap();
        b.unwrap();

        assert_eq!(buffer.written_size().await, 4);
        assert_eq!(limiter.available_permits(), 1);
        buffer.close().await.unwrap();
    }
}
