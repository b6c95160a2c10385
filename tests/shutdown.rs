//! Graceful shutdown against a live listener.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use marquee::config::Config;

mod common;

#[tokio::test]
async fn shutdown_waits_for_background_tasks() {
    let mut config = Config::default();
    config.limiter.enabled = false;
    let server = common::start_server(config).await;
    let client = common::client();
    let health_url = server.url("/v1/healthcheck");

    // server is live
    let res = client.get(&health_url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let finished = Arc::new(AtomicUsize::new(0));
    for _ in 0..4 {
        let finished = finished.clone();
        server.tasks.run(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            finished.fetch_add(1, Ordering::SeqCst);
        });
    }

    let started = Instant::now();
    server.shutdown.trigger();

    // success must not be reported until all four tasks completed
    let outcome = tokio::time::timeout(Duration::from_secs(3), server.run)
        .await
        .expect("shutdown should finish inside the drain deadline")
        .expect("serve task must not panic");
    assert!(outcome.is_ok(), "expected a clean drain, got {outcome:?}");
    assert_eq!(finished.load(Ordering::SeqCst), 4);
    assert!(
        started.elapsed() >= Duration::from_millis(250),
        "shutdown reported success before the tasks could have finished"
    );

    // the listener no longer accepts new connections
    assert!(client.get(&health_url).send().await.is_err());
}

#[tokio::test]
async fn shutdown_with_no_outstanding_work_is_immediate() {
    let mut config = Config::default();
    config.limiter.enabled = false;
    let server = common::start_server(config).await;
    let client = common::client();
    let health_url = server.url("/v1/healthcheck");

    let res = client.get(&health_url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    server.shutdown.trigger();

    let outcome = tokio::time::timeout(Duration::from_secs(2), server.run)
        .await
        .expect("drain with no work should complete well inside the deadline")
        .expect("serve task must not panic");
    assert!(outcome.is_ok());
}
