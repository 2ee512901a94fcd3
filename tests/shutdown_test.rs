//! Graceful drain of a serving gateway.

mod common;

use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use common::{post_call, spawn_gateway, TestGateway};
use dispatch_gateway::accounts::AccountStore;
use dispatch_gateway::config::GatewayConfig;
use dispatch_gateway::dispatch::{HandlerError, MethodRegistry, RequestContext};
use dispatch_gateway::http::ServeError;
use dispatch_gateway::net::ListenerError;

fn slow(ctx: &RequestContext) -> BoxFuture<'_, Result<Bytes, HandlerError>> {
    let millis: u64 = ctx.param("millis").and_then(|v| v.parse().ok()).unwrap_or(2000);
    async move {
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(Bytes::from_static(br#"{"done":true}"#))
    }
    .boxed()
}

async fn gateway(max_wait: Duration) -> TestGateway {
    let registry = MethodRegistry::new().register("Slow", slow);
    spawn_gateway(
        GatewayConfig::default(),
        registry,
        AccountStore::default(),
        max_wait,
    )
    .await
}

#[tokio::test]
async fn drain_waits_for_in_flight_response() {
    let gateway = gateway(Duration::from_secs(30)).await;
    let url = gateway.url("/call");

    let in_flight = tokio::spawn(async move {
        reqwest::Client::new()
            .post(url)
            .form(&[("accountId", "1"), ("method", "Slow"), ("millis", "2000")])
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap()
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    let started = Instant::now();
    gateway.shutdown.trigger();

    let result = gateway.handle.await.unwrap();
    let elapsed = started.elapsed();
    assert!(result.is_ok(), "drain failed: {result:?}");
    assert!(elapsed >= Duration::from_millis(1200), "returned too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(10), "waited for the deadline: {elapsed:?}");

    let body = in_flight.await.unwrap();
    assert_eq!(body, r#"{"code":200,"msg":"ok","data":{"done":true}}"#);
}

#[tokio::test]
async fn drain_times_out() {
    let gateway = gateway(Duration::from_millis(300)).await;
    let url = gateway.url("/call");

    let _in_flight = tokio::spawn(async move {
        let _ = reqwest::Client::new()
            .post(url)
            .form(&[("accountId", "1"), ("method", "Slow"), ("millis", "5000")])
            .send()
            .await;
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    let started = Instant::now();
    gateway.shutdown.trigger();

    let result = gateway.handle.await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));
    match result {
        Err(ServeError::Listener(err @ ListenerError::DrainTimeout(_))) => {
            assert!(err.to_string().starts_with("cannot complete graceful shutdown in"));
        }
        other => panic!("expected drain timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn idle_keep_alive_does_not_block_drain() {
    let gateway = gateway(Duration::from_secs(10)).await;

    // The client keeps its pooled connection open after the call.
    let client = reqwest::Client::new();
    let response = client
        .post(gateway.url("/call"))
        .form(&[("accountId", "1"), ("method", "Slow"), ("millis", "10")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    response.text().await.unwrap();

    let started = Instant::now();
    gateway.shutdown.trigger();
    gateway.handle.await.unwrap().unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    drop(client);
}

#[tokio::test]
async fn drain_with_no_connections_is_immediate() {
    let gateway = gateway(Duration::from_secs(30)).await;
    let addr = gateway.addr;

    let started = Instant::now();
    gateway.shutdown.trigger();
    gateway.handle.await.unwrap().unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));

    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn requests_before_shutdown_are_served() {
    let gateway = gateway(Duration::from_secs(5)).await;

    let (status, _) = post_call(&gateway, &[("accountId", "1"), ("method", "Slow"), ("millis", "1")]).await;
    assert_eq!(status, 200);

    gateway.shutdown.trigger();
    gateway.handle.await.unwrap().unwrap();
    assert_eq!(gateway.state.pool.stats().outstanding(), 0);
}
