//! Integration tests for bulk batching of asset writes.

mod common;

use common::*;
use serde_json::{json, Value};
use std::{
    sync::{mpsc, Arc},
    thread,
    time::{Duration, Instant},
};
use tempfile::TempDir;
use test_log::test;
use themesync::{
    api::{ApiResponse, Method},
    config::ThrottlerConfig,
    theme::Theme,
    throttler::{Bulk, BulkOptions, PutRequest, ThemeAdminApiThrottler, ThrottlerOptions},
    upload::{UploadOptions, UploadQueue},
    ThemeSyncError,
};

fn throttler_config(max_files: usize, max_bytes: usize, flush_timeout_ms: u64) -> ThrottlerConfig {
    ThrottlerConfig {
        enabled: true,
        max_files,
        max_bytes,
        flush_timeout_ms,
        poll_interval_ms: 20,
        wait_retries: 50,
        wait_interval_ms: 100,
    }
}

#[test]
fn test_batches_respect_bounds_and_keep_order() {
    let api = Arc::new(MockAdminApi::new());
    let bulk = Bulk::new(
        api.clone(),
        BulkOptions::from(&throttler_config(3, 1024 * 1024, 200)),
    )
    .unwrap();

    let (tx, rx) = mpsc::channel::<(String, u16)>();
    let keys: Vec<String> = (0..7).map(|i| format!("snippets/s{i}.liquid")).collect();
    for key in &keys {
        let tx = tx.clone();
        let owned = key.clone();
        bulk.enqueue(PutRequest::new(
            asset_put(key, "x"),
            Box::new(move |status: u16, _body: Value, _response: &ApiResponse| {
                let _ = tx.send((owned, status));
            }),
        ))
        .unwrap();
    }
    drop(tx);

    let mut completed: Vec<(String, u16)> = Vec::new();
    while completed.len() < keys.len() {
        completed.push(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }

    let batches = api.bulk_batches();
    assert!(batches.iter().all(|batch| !batch.is_empty() && batch.len() <= 3));
    assert_eq!(batches.concat(), keys);
    assert_eq!(
        completed.iter().map(|(key, _)| key.clone()).collect::<Vec<_>>(),
        keys
    );
    assert!(completed.iter().all(|(_, status)| *status == 200));
    bulk.shutdown();
}

#[test]
fn test_byte_bound_seals_batches() {
    let api = Arc::new(MockAdminApi::new());
    let sample = asset_put("snippets/s0.liquid", "x");
    let bulk = Bulk::new(
        api.clone(),
        BulkOptions::from(&throttler_config(10, sample.body_size() * 2, 200)),
    )
    .unwrap();

    let (tx, rx) = mpsc::channel::<()>();
    for i in 0..5 {
        let tx = tx.clone();
        bulk.enqueue(PutRequest::new(
            asset_put(&format!("snippets/s{i}.liquid"), "x"),
            Box::new(move |_: u16, _: Value, _: &ApiResponse| {
                let _ = tx.send(());
            }),
        ))
        .unwrap();
    }
    for _ in 0..5 {
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    let batches = api.bulk_batches();
    assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), 5);
    assert!(batches.iter().all(|batch| batch.len() <= 2));
}

#[test]
fn test_partial_batch_flushes_after_timeout() {
    let api = Arc::new(MockAdminApi::new());
    let throttler = ThemeAdminApiThrottler::from_config(api.clone(), &throttler_config(10, 1024 * 1024, 100));

    let start = Instant::now();
    let response = throttler.put(&asset_put("sections/header.liquid", "<header/>")).unwrap();

    assert!(start.elapsed() >= Duration::from_millis(100));
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(response.status, 200);
    assert_eq!(response.body["asset"]["key"], "sections/header.liquid");
    assert_eq!(api.bulk_batches(), vec![vec!["sections/header.liquid".to_string()]]);
    assert!(api.asset_keys(Method::PUT).is_empty());
    throttler.shutdown();
}

#[test]
fn test_concurrent_puts_share_a_bulk_request() {
    let api = Arc::new(MockAdminApi::new());
    let throttler = Arc::new(ThemeAdminApiThrottler::from_config(
        api.clone(),
        &throttler_config(10, 1024 * 1024, 200),
    ));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let throttler = throttler.clone();
            thread::spawn(move || throttler.put(&asset_put(&format!("snippets/s{i}.liquid"), "x")))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap().status, 200);
    }

    assert_eq!(api.bulk_batches().len(), 1);
    assert_eq!(api.bulk_batches()[0].len(), 4);
    throttler.shutdown();
}

#[test]
fn test_oversized_request_bypasses_batching() {
    let api = Arc::new(MockAdminApi::new());
    let throttler = ThemeAdminApiThrottler::from_config(api.clone(), &throttler_config(10, 64, 200));

    let large = "x".repeat(256);
    let response = throttler.put(&asset_put("assets/large.css", &large)).unwrap();

    assert_eq!(response.status, 200);
    assert!(api.bulk_requests().is_empty());
    assert_eq!(api.asset_keys(Method::PUT), vec!["assets/large.css"]);
}

#[test]
fn test_failed_batch_falls_back_to_single_requests() {
    let api = Arc::new(MockAdminApi::new().with_bulk_status(503));
    let throttler = ThemeAdminApiThrottler::from_config(api.clone(), &throttler_config(10, 1024 * 1024, 50));

    let response = throttler.put(&asset_put("assets/theme.css", ".a{}")).unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(api.bulk_requests().len(), 1);
    assert_eq!(api.asset_keys(Method::PUT), vec!["assets/theme.css"]);
    throttler.shutdown();
}

#[test]
fn test_timeout_falls_back_to_single_request() {
    let api = Arc::new(MockAdminApi::new());
    let mut config = throttler_config(10, 1024 * 1024, 5_000);
    config.wait_retries = 2;
    config.wait_interval_ms = 20;
    let throttler = ThemeAdminApiThrottler::from_config(api.clone(), &config);

    let start = Instant::now();
    let response = throttler.put(&asset_put("assets/theme.css", ".a{}")).unwrap();

    assert_eq!(response.status, 200);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(api.asset_keys(Method::PUT), vec!["assets/theme.css"]);
    throttler.shutdown();
}

#[test]
fn test_failed_asset_in_batch_is_reported_to_its_caller() {
    let api = Arc::new(MockAdminApi::new().fail_key(
        "sections/broken.liquid",
        422,
        json!({"errors": {"asset": ["Liquid syntax error"]}}),
    ));
    let throttler = ThemeAdminApiThrottler::from_config(api.clone(), &throttler_config(10, 1024 * 1024, 50));

    let error = throttler
        .put(&asset_put("sections/broken.liquid", "{% broken %}"))
        .unwrap_err();

    match &error {
        ThemeSyncError::Api { status, .. } => assert_eq!(*status, 422),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(error.api_messages(), vec!["Liquid syntax error".to_string()]);
    assert!(api.asset_keys(Method::PUT).is_empty());
    throttler.shutdown();
}

#[test]
fn test_inactive_throttler_passes_through() {
    let api = Arc::new(MockAdminApi::new());
    let throttler = ThemeAdminApiThrottler::new(api.clone(), ThrottlerOptions::default());
    assert!(!throttler.is_active());

    throttler.put(&asset_put("assets/theme.css", ".a{}")).unwrap();
    assert_eq!(api.asset_keys(Method::PUT), vec!["assets/theme.css"]);

    throttler.activate();
    assert!(throttler.is_active());
    throttler.deactivate();
    throttler.put(&asset_put("assets/other.css", ".b{}")).unwrap();
    assert!(api.bulk_requests().is_empty());
}

#[test]
fn test_upload_queue_through_active_throttler() {
    let temp_dir = TempDir::new().unwrap();
    let root = create_test_theme(&temp_dir);
    let mut config = test_config(&root);
    config.throttler = throttler_config(10, 1024 * 1024, 50);

    let api = Arc::new(MockAdminApi::new());
    let throttler = Arc::new(ThemeAdminApiThrottler::from_config(api.clone(), &config.throttler));
    let theme = Arc::new(Theme::new(&config).unwrap());
    let queue = UploadQueue::new(theme.clone(), throttler.clone(), &config);
    queue.start_workers(4).unwrap();

    queue.upload_theme(UploadOptions::default()).unwrap();

    let uploaded: usize = api.bulk_batches().iter().map(Vec::len).sum();
    assert_eq!(uploaded, 7);
    assert!(api.asset_keys(Method::PUT).is_empty());
    assert!(!theme.file_has_changed(&theme.file("assets/logo.png")));
    assert!(queue.failures().is_empty());

    queue.shutdown();
    throttler.shutdown();
}
