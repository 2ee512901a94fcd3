//! End-to-end tests of the `/call` dispatch path over real connections.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use common::{post_call, spawn_gateway, start_mock_upstream, TestGateway};
use dispatch_gateway::accounts::{AccountInfo, AccountStore};
use dispatch_gateway::config::GatewayConfig;
use dispatch_gateway::dispatch::{HandlerError, MethodRegistry, RequestContext};
use dispatch_gateway::upstream::{register_all, TokenCache, UpstreamClient};

fn boom(_: &RequestContext) -> BoxFuture<'_, Result<Bytes, HandlerError>> {
    async {
        if true {
            panic!("boom");
        }
        Ok(Bytes::new())
    }
    .boxed()
}

fn accounts() -> AccountStore {
    AccountStore::from_map(HashMap::from([(1, AccountInfo::new("wx-app-1", "secret-1"))]))
}

async fn gateway_with_upstream(upstream: std::net::SocketAddr) -> TestGateway {
    let mut config = GatewayConfig::default();
    config.upstream.api_base = format!("http://{}", upstream);
    let client = UpstreamClient::new(&config.upstream).unwrap();
    let registry = register_all(MethodRegistry::new(), Arc::new(client)).register("Boom", boom);
    spawn_gateway(config, registry, accounts(), Duration::from_secs(5)).await
}

#[tokio::test]
async fn empty_account_id_is_invalid() {
    let (upstream, _) = start_mock_upstream(|_| (200, "{}".into())).await;
    let gateway = gateway_with_upstream(upstream).await;

    let (status, body) = post_call(&gateway, &[("accountId", ""), ("method", "GetNewAccessToken")]).await;
    assert_eq!(status, 400);
    assert_eq!(body, r#"{"code":400,"msg":"invalid parameters"}"#);
}

#[tokio::test]
async fn empty_method_is_invalid() {
    let (upstream, _) = start_mock_upstream(|_| (200, "{}".into())).await;
    let gateway = gateway_with_upstream(upstream).await;

    let (status, body) = post_call(&gateway, &[("accountId", "1"), ("method", "")]).await;
    assert_eq!(status, 400);
    assert_eq!(body, r#"{"code":400,"msg":"invalid parameters"}"#);
}

#[tokio::test]
async fn access_token_is_fetched_and_embedded() {
    let (upstream, seen) = start_mock_upstream(|target| {
        if target.starts_with("/cgi-bin/token") {
            (200, r#"{"access_token":"X"}"#.into())
        } else {
            (404, "{}".into())
        }
    })
    .await;
    let gateway = gateway_with_upstream(upstream).await;

    let (status, body) =
        post_call(&gateway, &[("accountId", "1"), ("method", "GetNewAccessToken")]).await;
    assert_eq!(status, 200);
    assert_eq!(body, r#"{"code":200,"msg":"ok","data":{"access_token":"X"}}"#);

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].contains("appid=wx-app-1"));
    assert!(seen[0].contains("grant_type=client_credential"));
}

#[tokio::test]
async fn panicking_handler_reports_its_message() {
    let (upstream, _) = start_mock_upstream(|_| (200, "{}".into())).await;
    let gateway = gateway_with_upstream(upstream).await;

    let (status, body) = post_call(&gateway, &[("accountId", "1"), ("method", "Boom")]).await;
    assert_eq!(status, 500);
    assert_eq!(body, r#"{"code":500,"msg":"boom"}"#);

    // The connection task survived and the context went back to the pool.
    let (status, _) = post_call(&gateway, &[("accountId", "1"), ("method", "Boom")]).await;
    assert_eq!(status, 500);
    let stats = gateway.state.pool.stats();
    assert_eq!(stats.acquired, 2);
    assert_eq!(stats.outstanding(), 0);
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let (upstream, _) = start_mock_upstream(|_| (200, "{}".into())).await;
    let gateway = gateway_with_upstream(upstream).await;

    let response = reqwest::get(gateway.url("/unknown")).await.unwrap();
    assert_eq!(response.status().as_u16(), 404);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        response.text().await.unwrap(),
        r#"{"code":404,"msg":"path not found"}"#
    );
}

#[tokio::test]
async fn unknown_method_is_a_clean_400() {
    let (upstream, _) = start_mock_upstream(|_| (200, "{}".into())).await;
    let gateway = gateway_with_upstream(upstream).await;

    let (status, body) = post_call(&gateway, &[("accountId", "1"), ("method", "DoesNotExist")]).await;
    assert_eq!(status, 400);
    assert_eq!(body, r#"{"code":400,"msg":"unknown method"}"#);
}

#[tokio::test]
async fn upstream_failure_is_masked() {
    let (upstream, _) = start_mock_upstream(|_| (502, "bad gateway".into())).await;
    let gateway = gateway_with_upstream(upstream).await;

    let (status, body) = post_call(
        &gateway,
        &[("accountId", "1"), ("method", "WxappOauth"), ("jsCode", "c0de")],
    )
    .await;
    assert_eq!(status, 500);
    assert_eq!(body, r#"{"code":500,"msg":"system error"}"#);
}

#[tokio::test]
async fn missing_method_param_is_masked() {
    let (upstream, seen) = start_mock_upstream(|_| (200, "{}".into())).await;
    let gateway = gateway_with_upstream(upstream).await;

    let (status, body) =
        post_call(&gateway, &[("accountId", "1"), ("method", "GetWebOauthAccessToken")]).await;
    assert_eq!(status, 500);
    assert_eq!(body, r#"{"code":500,"msg":"system error"}"#);
    assert!(seen.lock().is_empty());
}

#[tokio::test]
async fn query_string_fields_are_accepted() {
    let (upstream, _) = start_mock_upstream(|_| (200, r#"{"openid":"o1"}"#.into())).await;
    let gateway = gateway_with_upstream(upstream).await;

    let response = reqwest::Client::new()
        .post(gateway.url("/call?accountId=1&method=WxappOauth&jsCode=abc"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.text().await.unwrap(),
        r#"{"code":200,"msg":"ok","data":{"openid":"o1"}}"#
    );
}

#[tokio::test]
async fn concurrent_calls_release_every_context() {
    let (upstream, _) = start_mock_upstream(|_| (200, r#"{"access_token":"T"}"#.into())).await;
    let gateway = Arc::new(gateway_with_upstream(upstream).await);

    let calls: Vec<_> = (0..16)
        .map(|i| {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move {
                let method = if i % 2 == 0 { "GetNewAccessToken" } else { "Boom" };
                post_call(&gateway, &[("accountId", "1"), ("method", method)]).await.0
            })
        })
        .collect();

    for call in calls {
        let status = call.await.unwrap();
        assert!(status == 200 || status == 500);
    }

    let stats = gateway.state.pool.stats();
    assert_eq!(stats.acquired, 16);
    assert_eq!(stats.released, 16);
    assert!(stats.created <= 16);
    assert_eq!(stats.idle as u64, stats.created);
}

#[tokio::test]
async fn cached_token_is_reused_for_code_generation() {
    let (upstream, seen) = start_mock_upstream(|target| {
        if target.starts_with("/cgi-bin/token") {
            (200, r#"{"access_token":"TOKEN1","expires_in":7200}"#.into())
        } else {
            (200, r#"{"errcode":0}"#.into())
        }
    })
    .await;

    let mut config = GatewayConfig::default();
    config.upstream.api_base = format!("http://{}", upstream);
    let tokens = TokenCache::new();
    let client = UpstreamClient::with_http(reqwest::Client::new(), &config.upstream, tokens.clone())
        .unwrap();
    let registry = register_all(MethodRegistry::new(), Arc::new(client));
    let gateway = spawn_gateway(config, registry, accounts(), Duration::from_secs(5)).await;

    for _ in 0..2 {
        let (status, _) = post_call(
            &gateway,
            &[("accountId", "1"), ("method", "GetWxappCode"), ("path", "pages/index")],
        )
        .await;
        assert_eq!(status, 200);
    }

    let seen = seen.lock();
    let token_fetches = seen.iter().filter(|t| t.starts_with("/cgi-bin/token")).count();
    assert_eq!(token_fetches, 1);
    assert_eq!(seen.iter().filter(|t| t.contains("access_token=TOKEN1")).count(), 2);
    assert_eq!(tokens.get("access_token:wx-app-1").as_deref(), Some("TOKEN1"));
}
