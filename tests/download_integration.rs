//! Integration tests for the download module.
//!
//! These tests drive the planner, fetcher, and buffer together against a
//! mock HTTP server that serves real byte ranges.

use std::sync::Arc;

use avget_core::{Fetcher, FileBuffer, plan_blocks};
use tempfile::TempDir;
use tokio::sync::Semaphore;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Deterministic test payload.
fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Mounts a 206 mock for one exact byte range of `content`.
async fn mount_range(server: &MockServer, path_str: &str, content: &[u8], start: u64, size: u64) {
    let end = start + size - 1;
    let slice = content[usize::try_from(start).unwrap()..=usize::try_from(end).unwrap()].to_vec();
    Mock::given(method("GET"))
        .and(path(path_str))
        .and(header("Range", format!("bytes={start}-{end}").as_str()))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header(
                    "Content-Range",
                    format!("bytes {start}-{end}/{}", content.len()).as_str(),
                )
                .set_body_bytes(slice),
        )
        .mount(server)
        .await;
}

/// Mounts the two-byte size probe mock.
async fn mount_size_probe(server: &MockServer, path_str: &str, total: usize) {
    Mock::given(method("GET"))
        .and(path(path_str))
        .and(header("Range", "bytes=0-1"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("Content-Range", format!("bytes 0-1/{total}").as_str())
                .set_body_bytes(vec![0u8, 0u8]),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_block_parallel_download_reassembles_content() {
    let content = payload(2500);
    let server = MockServer::start().await;
    mount_size_probe(&server, "/v.m4s", content.len()).await;
    mount_range(&server, "/v.m4s", &content, 0, 1000).await;
    mount_range(&server, "/v.m4s", &content, 1000, 1000).await;
    mount_range(&server, "/v.m4s", &content, 2000, 500).await;

    let tmp = TempDir::new().unwrap();
    let buffer = Arc::new(
        FileBuffer::open(tmp.path().join("v.m4s"), false)
            .await
            .unwrap(),
    );
    let fetcher = Fetcher::new();
    let limiter = Arc::new(Semaphore::new(4));
    let url = format!("{}/v.m4s", server.uri());

    let total = fetcher.remote_size(&url).await.unwrap();
    assert_eq!(total, Some(2500));

    let blocks = plan_blocks(buffer.written_size().await, total, Some(1000)).unwrap();
    assert_eq!(blocks.len(), 3);

    let mut handles = Vec::new();
    for block in blocks {
        let fetcher = fetcher.clone();
        let limiter = Arc::clone(&limiter);
        let buffer = Arc::clone(&buffer);
        let urls = vec![url.clone()];
        handles.push(tokio::spawn(async move {
            fetcher
                .fetch_range(limiter, urls, buffer, block.start, block.size)
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(buffer.written_size().await, 2500);
    buffer.close().await.unwrap();
    assert_eq!(std::fs::read(buffer.path()).unwrap(), content);
}

#[tokio::test]
async fn test_resume_fetches_only_missing_tail() {
    let content = payload(2000);
    let server = MockServer::start().await;
    mount_size_probe(&server, "/a.m4s", content.len()).await;
    // Only the tail ranges exist on the server; a request for the head
    // would fail the test with a 404.
    mount_range(&server, "/a.m4s", &content, 1200, 500).await;
    mount_range(&server, "/a.m4s", &content, 1700, 300).await;

    let tmp = TempDir::new().unwrap();
    let file_path = tmp.path().join("a.m4s");
    std::fs::write(&file_path, &content[..1200]).unwrap();

    let buffer = Arc::new(FileBuffer::open(&file_path, false).await.unwrap());
    assert_eq!(buffer.written_size().await, 1200);

    let fetcher = Fetcher::new();
    let limiter = Arc::new(Semaphore::new(2));
    let url = format!("{}/a.m4s", server.uri());

    let total = fetcher.remote_size(&url).await.unwrap();
    let blocks = plan_blocks(buffer.written_size().await, total, Some(500)).unwrap();
    assert_eq!(blocks.len(), 2);

    for block in blocks {
        fetcher
            .fetch_range(
                Arc::clone(&limiter),
                vec![url.clone()],
                Arc::clone(&buffer),
                block.start,
                block.size,
            )
            .await
            .unwrap();
    }

    assert_eq!(buffer.written_size().await, 2000);
    buffer.close().await.unwrap();
    assert_eq!(std::fs::read(&file_path).unwrap(), content);
}

#[tokio::test]
async fn test_overwrite_discards_partial_and_downloads_all() {
    let content = payload(1000);
    let server = MockServer::start().await;
    mount_size_probe(&server, "/v.m4s", content.len()).await;
    mount_range(&server, "/v.m4s", &content, 0, 1000).await;

    let tmp = TempDir::new().unwrap();
    let file_path = tmp.path().join("v.m4s");
    std::fs::write(&file_path, vec![0xFFu8; 400]).unwrap();

    let buffer = Arc::new(FileBuffer::open(&file_path, true).await.unwrap());
    assert_eq!(
        buffer.written_size().await,
        0,
        "overwrite discards the partial"
    );

    let fetcher = Fetcher::new();
    let url = format!("{}/v.m4s", server.uri());
    let total = fetcher.remote_size(&url).await.unwrap();
    let blocks = plan_blocks(0, total, Some(1000)).unwrap();

    for block in blocks {
        fetcher
            .fetch_range(
                Arc::new(Semaphore::new(1)),
                vec![url.clone()],
                Arc::clone(&buffer),
                block.start,
                block.size,
            )
            .await
            .unwrap();
    }

    buffer.close().await.unwrap();
    assert_eq!(std::fs::read(&file_path).unwrap(), content);
}

#[tokio::test]
async fn test_mirror_serves_range_when_primary_is_down() {
    let content = payload(800);
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/primary.m4s"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    mount_range(&server, "/mirror.m4s", &content, 0, 800).await;

    let tmp = TempDir::new().unwrap();
    let buffer = Arc::new(
        FileBuffer::open(tmp.path().join("v.m4s"), false)
            .await
            .unwrap(),
    );
    let fetcher = Fetcher::new();

    fetcher
        .fetch_range(
            Arc::new(Semaphore::new(1)),
            vec![
                format!("{}/primary.m4s", server.uri()),
                format!("{}/mirror.m4s", server.uri()),
            ],
            Arc::clone(&buffer),
            0,
            Some(800),
        )
        .await
        .unwrap();

    assert_eq!(buffer.written_size().await, 800);
    buffer.close().await.unwrap();
    assert_eq!(std::fs::read(buffer.path()).unwrap(), content);
}
