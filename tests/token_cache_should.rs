use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use serde_json::json;
use video_proxy::server::error::AuthError;
use video_proxy::server::services::token_services::{
    DynTokenIssuer, MockTokenIssuerTrait, TokenCache, TokenIssuerTrait, TokenServiceTrait,
    UpstreamTokenIssuer,
};
use video_proxy::server::utils::signature_utils::{Signer, TOKEN_TIMESTAMP_PLACEHOLDER};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn issuer_against(server: &MockServer) -> UpstreamTokenIssuer {
    UpstreamTokenIssuer::new(
        &server.uri(),
        Arc::new(Signer::new("test_secret".to_string())),
        HeaderMap::new(),
        Duration::from_secs(2),
    )
}

#[tokio::test]
async fn test_second_lookup_is_served_from_cache() {
    let mut issuer = MockTokenIssuerTrait::new();
    issuer
        .expect_issue_video_token()
        .times(1)
        .returning(|_| Ok("video-1".to_string()));

    let cache = TokenCache::new(Arc::new(issuer) as DynTokenIssuer);

    assert_eq!(cache.get_token("login").await.unwrap(), "video-1");
    assert_eq!(cache.get_token("login").await.unwrap(), "video-1");
}

#[tokio::test]
async fn test_credentials_are_cached_separately() {
    let mut issuer = MockTokenIssuerTrait::new();
    issuer
        .expect_issue_video_token()
        .times(2)
        .returning(|login| Ok(format!("video-for-{}", login)));

    let cache = TokenCache::new(Arc::new(issuer) as DynTokenIssuer);

    assert_eq!(cache.get_token("alice").await.unwrap(), "video-for-alice");
    assert_eq!(cache.get_token("bob").await.unwrap(), "video-for-bob");
    assert_eq!(cache.get_token("alice").await.unwrap(), "video-for-alice");
}

#[tokio::test]
async fn test_invalidate_forces_a_new_issue() {
    let mut issuer = MockTokenIssuerTrait::new();
    let mut seq = mockall::Sequence::new();
    issuer
        .expect_issue_video_token()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok("first".to_string()));
    issuer
        .expect_issue_video_token()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok("second".to_string()));

    let cache = TokenCache::new(Arc::new(issuer) as DynTokenIssuer);

    assert_eq!(cache.get_token("login").await.unwrap(), "first");
    cache.invalidate("login");
    assert_eq!(cache.get_token("login").await.unwrap(), "second");
    assert_eq!(cache.get_token("login").await.unwrap(), "second");
}

#[tokio::test]
async fn test_invalidating_unknown_credential_is_harmless() {
    let issuer = MockTokenIssuerTrait::new();
    let cache = TokenCache::new(Arc::new(issuer) as DynTokenIssuer);

    cache.invalidate("nobody");
}

#[tokio::test]
async fn test_expired_entry_is_refetched() {
    let mut issuer = MockTokenIssuerTrait::new();
    issuer
        .expect_issue_video_token()
        .times(2)
        .returning(|_| Ok("video".to_string()));

    let cache = TokenCache::with_ttl(Arc::new(issuer) as DynTokenIssuer, Duration::from_millis(50));

    cache.get_token("login").await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    cache.get_token("login").await.unwrap();
}

#[tokio::test]
async fn test_issue_failure_is_not_cached() {
    let mut issuer = MockTokenIssuerTrait::new();
    let mut seq = mockall::Sequence::new();
    issuer
        .expect_issue_video_token()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| {
            Err(AuthError::Rejected {
                code: "1".to_string(),
                message: "expired".to_string(),
            })
        });
    issuer
        .expect_issue_video_token()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok("recovered".to_string()));

    let cache = TokenCache::new(Arc::new(issuer) as DynTokenIssuer);

    assert!(cache.get_token("login").await.is_err());
    assert_eq!(cache.get_token("login").await.unwrap(), "recovered");
}

#[tokio::test]
async fn test_upstream_issuer_sends_signed_request() {
    let server = MockServer::start().await;
    let signer = Signer::new("test_secret".to_string());

    Mock::given(method("GET"))
        .and(path("/v1/auth/video/token"))
        .and(query_param("id", "0"))
        .and(header("authorization", "Bearer login-abc"))
        .and(header("xdomain-client", "web_user"))
        .and(header("xclient-version", "v1"))
        .and(header(
            "xclient-signature",
            signer.digest_for(TOKEN_TIMESTAMP_PLACEHOLDER).as_str(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "message": "",
            "data": { "token": "video-xyz" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = issuer_against(&server)
        .issue_video_token("login-abc")
        .await
        .unwrap();
    assert_eq!(token, "video-xyz");
}

#[tokio::test]
async fn test_upstream_issuer_accepts_string_code() {
    let server = MockServer::start().await;
    Mock::given(path("/v1/auth/video/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "0",
            "data": { "token": "video-str" }
        })))
        .mount(&server)
        .await;

    let token = issuer_against(&server).issue_video_token("l").await.unwrap();
    assert_eq!(token, "video-str");
}

#[tokio::test]
async fn test_upstream_issuer_surfaces_rejection_message() {
    let server = MockServer::start().await;
    Mock::given(path("/v1/auth/video/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 401,
            "message": "login expired"
        })))
        .mount(&server)
        .await;

    let err = issuer_against(&server).issue_video_token("l").await.unwrap_err();
    match err {
        AuthError::Rejected { code, message } => {
            assert_eq!(code, "401");
            assert_eq!(message, "login expired");
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_upstream_issuer_rejects_empty_token() {
    let server = MockServer::start().await;
    Mock::given(path("/v1/auth/video/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": { "token": "" }
        })))
        .mount(&server)
        .await;

    let err = issuer_against(&server).issue_video_token("l").await.unwrap_err();
    assert!(matches!(err, AuthError::Rejected { .. }));
}

#[tokio::test]
async fn test_upstream_issuer_reports_bad_status_and_bad_body() {
    let server = MockServer::start().await;
    Mock::given(path("/v1/auth/video/token"))
        .and(header("authorization", "Bearer broken-gateway"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
        .mount(&server)
        .await;
    Mock::given(path("/v1/auth/video/token"))
        .and(header("authorization", "Bearer garbage"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let issuer = issuer_against(&server);

    let err = issuer.issue_video_token("broken-gateway").await.unwrap_err();
    assert!(matches!(err, AuthError::Status(status) if status.as_u16() == 502));

    let err = issuer.issue_video_token("garbage").await.unwrap_err();
    assert!(matches!(err, AuthError::Parse(_)));
}
