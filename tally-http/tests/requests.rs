use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Method, StatusCode};
use serde_json::json;
use tally_http::{Auth, HttpClient, HttpError, RequestOpts};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn get_json_sends_query_and_auth_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/users/by"))
        .and(query_param("usernames", "alice,bob"))
        .and(header("authorization", "OAuth test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri()).unwrap();
    let got: serde_json::Value = client
        .get_json(
            "2/users/by",
            RequestOpts {
                auth: Some(Auth::Header {
                    name: AUTHORIZATION,
                    value: HeaderValue::from_static("OAuth test"),
                }),
                query: Some(vec![("usernames", "alice,bob".into())]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(got, json!({"ok": true}));
}

#[tokio::test]
async fn non_success_is_an_api_error_with_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri()).unwrap();
    let err = client
        .get_json::<serde_json::Value>("missing", RequestOpts::default())
        .await
        .unwrap_err();

    match err {
        HttpError::Api { status, ref body, .. } => {
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body, "not here");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert_eq!(err.to_string(), "request returned an error: 404 Not Found not here");
}

#[tokio::test]
async fn server_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/request_token"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri()).unwrap();
    let err = client
        .request_text(Method::POST, "oauth/request_token", RequestOpts::default())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
}

#[tokio::test]
async fn request_text_returns_form_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/access_token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("oauth_token=a&oauth_token_secret=b"),
        )
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri()).unwrap();
    let text = client
        .request_text(Method::POST, "oauth/access_token", RequestOpts::default())
        .await
        .unwrap();
    assert_eq!(text, "oauth_token=a&oauth_token_secret=b");
}

#[tokio::test]
async fn undecodable_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri()).unwrap();
    let err = client
        .get_json::<serde_json::Value>("anything", RequestOpts::default())
        .await
        .unwrap_err();
    assert!(matches!(err, HttpError::Decode(_, ref snip) if snip == "<html>"));
}
