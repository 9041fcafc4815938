//! OAuth 1.0a request signing and the PIN-based ("out-of-band") flow.
//!
//! The flow has three legs:
//! 1. `POST oauth/request_token` with `oauth_callback=oob`, signed with the
//!    consumer credentials only.
//! 2. The user opens `oauth/authorize?oauth_token=…` in a browser and reads
//!    back a PIN, collected through a [`PinPrompt`].
//! 3. `POST oauth/access_token` with `oauth_verifier=<PIN>`, signed with the
//!    request token.
//!
//! The resulting [`AccessToken`] signs every later API call through
//! [`OAuthSigner`]. Tokens live only for the current run.
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Method, StatusCode};
use sha1::Sha1;
use tally_http::{Auth, HttpClient, HttpError, RequestOpts};
use thiserror::Error;
use url::Url;

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 unreserved characters stay literal; everything else is escaped.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const REQUEST_TOKEN_PATH: &str = "oauth/request_token";
const AUTHORIZE_PATH: &str = "oauth/authorize";
const ACCESS_TOKEN_PATH: &str = "oauth/access_token";
const OUT_OF_BAND: &str = "oob";

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error(
        "there may have been an issue with the consumer_key or consumer_secret you entered: {status} {body}"
    )]
    InvalidConsumer { status: StatusCode, body: String },
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("token response is missing `{0}`")]
    MissingField(&'static str),
    #[error("request token was issued without a confirmed callback")]
    CallbackNotConfirmed,
    #[error("no PIN was entered")]
    EmptyVerifier,
    #[error("cannot build Authorization header: {0}")]
    Header(String),
    #[error("PIN prompt failed: {0}")]
    Prompt(#[source] anyhow::Error),
}

/// Application (consumer) key pair.
#[derive(Clone)]
pub struct ConsumerCredentials {
    pub key: String,
    pub secret: String,
}

impl ConsumerCredentials {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for ConsumerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerCredentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// A token/secret pair, either temporary (request token) or final (access token).
#[derive(Clone, PartialEq, Eq)]
pub struct TokenCredentials {
    pub token: String,
    pub secret: String,
}

impl std::fmt::Debug for TokenCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCredentials")
            .field("token", &self.token)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RequestToken {
    pub credentials: TokenCredentials,
}

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub credentials: TokenCredentials,
    pub user_id: Option<String>,
    pub screen_name: Option<String>,
}

/// Source of the verifier PIN shown to the user after authorizing the app.
#[async_trait]
pub trait PinPrompt: Send + Sync {
    async fn verifier(&self, authorize_url: &Url) -> anyhow::Result<String>;
}

// ==============================
// Signing
// ==============================

pub fn percent_encode(s: &str) -> String {
    utf8_percent_encode(s, OAUTH_ENCODE_SET).to_string()
}

/// Signs requests with HMAC-SHA1 for one consumer and, optionally, one token.
#[derive(Debug, Clone)]
pub struct OAuthSigner {
    consumer: ConsumerCredentials,
    token: Option<TokenCredentials>,
}

impl OAuthSigner {
    pub fn new(consumer: ConsumerCredentials, token: Option<TokenCredentials>) -> Self {
        Self { consumer, token }
    }

    /// Build the `Authorization` header for a request.
    ///
    /// `request_params` are the query/form parameters that will travel with the
    /// request; `extra_oauth` are protocol parameters such as `oauth_callback`
    /// or `oauth_verifier`.
    pub fn authorization(
        &self,
        method: &Method,
        url: &Url,
        request_params: &[(&str, &str)],
        extra_oauth: &[(&str, &str)],
    ) -> Result<HeaderValue, OAuthError> {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let header = self.header_with(method, url, request_params, extra_oauth, &nonce, timestamp)?;
        HeaderValue::from_str(&header).map_err(|e| OAuthError::Header(e.to_string()))
    }

    /// Deterministic core of [`OAuthSigner::authorization`].
    pub fn header_with(
        &self,
        method: &Method,
        url: &Url,
        request_params: &[(&str, &str)],
        extra_oauth: &[(&str, &str)],
        nonce: &str,
        timestamp: u64,
    ) -> Result<String, OAuthError> {
        let timestamp = timestamp.to_string();
        let mut oauth: Vec<(&str, &str)> = vec![
            ("oauth_consumer_key", self.consumer.key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_version", "1.0"),
        ];
        if let Some(token) = &self.token {
            oauth.push(("oauth_token", token.token.as_str()));
        }
        oauth.extend_from_slice(extra_oauth);

        let base = signature_base_string(method, url, request_params, &oauth);
        let signature = self.sign(&base)?;

        let mut header_params: Vec<(String, String)> = oauth
            .iter()
            .map(|(k, v)| (percent_encode(k), percent_encode(v)))
            .collect();
        header_params.push(("oauth_signature".into(), percent_encode(&signature)));
        header_params.sort();

        let rendered: Vec<String> = header_params
            .iter()
            .map(|(k, v)| format!("{k}=\"{v}\""))
            .collect();
        Ok(format!("OAuth {}", rendered.join(", ")))
    }

    fn sign(&self, base: &str) -> Result<String, OAuthError> {
        let token_secret = self.token.as_ref().map(|t| t.secret.as_str()).unwrap_or("");
        let key = format!(
            "{}&{}",
            percent_encode(&self.consumer.secret),
            percent_encode(token_secret)
        );
        let mut mac = HmacSha1::new_from_slice(key.as_bytes())
            .map_err(|e| OAuthError::Header(format!("invalid HMAC key: {e}")))?;
        mac.update(base.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

/// `METHOD&enc(base_url)&enc(normalized_params)` per RFC 5849 §3.4.1.
pub fn signature_base_string(
    method: &Method,
    url: &Url,
    request_params: &[(&str, &str)],
    oauth_params: &[(&str, &str)],
) -> String {
    let mut base_url = url.clone();
    base_url.set_query(None);
    base_url.set_fragment(None);

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (percent_encode(&k), percent_encode(&v)))
        .collect();
    for (k, v) in request_params {
        params.push((percent_encode(k), percent_encode(v)));
    }
    for (k, v) in oauth_params {
        params.push((percent_encode(k), percent_encode(v)));
    }
    params.sort();

    let normalized = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.as_str().to_ascii_uppercase(),
        percent_encode(base_url.as_str()),
        percent_encode(&normalized)
    )
}

fn parse_token_response(body: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(body.trim().as_bytes())
        .into_owned()
        .collect()
}

fn take_credentials(fields: &mut HashMap<String, String>) -> Result<TokenCredentials, OAuthError> {
    let token = fields
        .remove("oauth_token")
        .filter(|t| !t.is_empty())
        .ok_or(OAuthError::MissingField("oauth_token"))?;
    let secret = fields
        .remove("oauth_token_secret")
        .ok_or(OAuthError::MissingField("oauth_token_secret"))?;
    Ok(TokenCredentials { token, secret })
}

// ==============================
// Flow
// ==============================

/// Runs the three-legged PIN flow against one API host.
#[derive(Clone, Debug)]
pub struct TwitterAuth {
    http: HttpClient,
    consumer: ConsumerCredentials,
}

impl TwitterAuth {
    pub fn new(consumer: ConsumerCredentials, http: HttpClient) -> Self {
        Self { http, consumer }
    }

    /// Leg one: obtain a temporary request token.
    pub async fn request_token(&self) -> Result<RequestToken, OAuthError> {
        let signer = OAuthSigner::new(self.consumer.clone(), None);
        let body = self
            .post_signed(&signer, REQUEST_TOKEN_PATH, &[("oauth_callback", OUT_OF_BAND)])
            .await
            .map_err(|e| match e {
                OAuthError::Http(HttpError::Api { status, body, .. })
                    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN =>
                {
                    OAuthError::InvalidConsumer { status, body }
                }
                other => other,
            })?;

        let mut fields = parse_token_response(&body);
        if fields.get("oauth_callback_confirmed").map(String::as_str) != Some("true") {
            return Err(OAuthError::CallbackNotConfirmed);
        }
        let credentials = take_credentials(&mut fields)?;
        tracing::info!(oauth_token = %credentials.token, "oauth.request_token.obtained");
        Ok(RequestToken { credentials })
    }

    /// Leg two: the page the user must visit to authorize the app.
    pub fn authorize_url(&self, request_token: &RequestToken) -> Result<Url, OAuthError> {
        let mut url = self.http.url_for(AUTHORIZE_PATH)?;
        url.query_pairs_mut()
            .append_pair("oauth_token", &request_token.credentials.token);
        Ok(url)
    }

    /// Leg three: exchange the request token and PIN for an access token.
    pub async fn access_token(
        &self,
        request_token: &RequestToken,
        verifier: &str,
    ) -> Result<AccessToken, OAuthError> {
        let verifier = verifier.trim();
        if verifier.is_empty() {
            return Err(OAuthError::EmptyVerifier);
        }
        let signer = OAuthSigner::new(
            self.consumer.clone(),
            Some(request_token.credentials.clone()),
        );
        let body = self
            .post_signed(&signer, ACCESS_TOKEN_PATH, &[("oauth_verifier", verifier)])
            .await?;

        let mut fields = parse_token_response(&body);
        let credentials = take_credentials(&mut fields)?;
        let token = AccessToken {
            credentials,
            user_id: fields.remove("user_id"),
            screen_name: fields.remove("screen_name"),
        };
        tracing::info!(screen_name = ?token.screen_name, "oauth.access_token.obtained");
        Ok(token)
    }

    /// Run all three legs, asking `prompt` for the PIN.
    pub async fn authorize(&self, prompt: &dyn PinPrompt) -> Result<AccessToken, OAuthError> {
        let request_token = self.request_token().await?;
        let url = self.authorize_url(&request_token)?;
        let pin = prompt.verifier(&url).await.map_err(OAuthError::Prompt)?;
        self.access_token(&request_token, &pin).await
    }

    async fn post_signed(
        &self,
        signer: &OAuthSigner,
        path: &str,
        extra_oauth: &[(&str, &str)],
    ) -> Result<String, OAuthError> {
        let url = self.http.url_for(path)?;
        let header = signer.authorization(&Method::POST, &url, &[], extra_oauth)?;
        let text = self
            .http
            .request_text(
                Method::POST,
                path,
                RequestOpts {
                    auth: Some(Auth::Header {
                        name: AUTHORIZATION,
                        value: header,
                    }),
                    ..Default::default()
                },
            )
            .await?;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Worked example from Twitter's "Creating a signature" guide.
    fn doc_signer() -> OAuthSigner {
        OAuthSigner::new(
            ConsumerCredentials::new(
                "xvz1evFS4wEEPTGEFPHBog",
                "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
            ),
            Some(TokenCredentials {
                token: "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb".into(),
                secret: "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE".into(),
            }),
        )
    }

    const DOC_NONCE: &str = "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg";
    const DOC_TIMESTAMP: u64 = 1318622958;
    const DOC_STATUS: &str = "Hello Ladies + Gentlemen, a signed OAuth request!";

    fn doc_url() -> Url {
        Url::parse("https://api.twitter.com/1.1/statuses/update.json?include_entities=true").unwrap()
    }

    #[test]
    fn encodes_reserved_characters() {
        assert_eq!(percent_encode("Ladies + Gentlemen"), "Ladies%20%2B%20Gentlemen");
        assert_eq!(percent_encode("An encoded string!"), "An%20encoded%20string%21");
        assert_eq!(percent_encode("Dogs, Cats & Mice"), "Dogs%2C%20Cats%20%26%20Mice");
        assert_eq!(percent_encode("a-b.c_d~e"), "a-b.c_d~e");
        assert_eq!(percent_encode("☃"), "%E2%98%83");
    }

    #[test]
    fn base_string_matches_reference() {
        let oauth = [
            ("oauth_consumer_key", "xvz1evFS4wEEPTGEFPHBog"),
            ("oauth_nonce", DOC_NONCE),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", "1318622958"),
            ("oauth_token", "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb"),
            ("oauth_version", "1.0"),
        ];
        let base = signature_base_string(&Method::POST, &doc_url(), &[("status", DOC_STATUS)], &oauth);
        assert_eq!(
            base,
            "POST&https%3A%2F%2Fapi.twitter.com%2F1.1%2Fstatuses%2Fupdate.json&include_entities%3Dtrue%26oauth_consumer_key%3Dxvz1evFS4wEEPTGEFPHBog%26oauth_nonce%3DkYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg%26oauth_signature_method%3DHMAC-SHA1%26oauth_timestamp%3D1318622958%26oauth_token%3D370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb%26oauth_version%3D1.0%26status%3DHello%2520Ladies%2520%252B%2520Gentlemen%252C%2520a%2520signed%2520OAuth%2520request%2521"
        );
    }

    #[test]
    fn header_carries_reference_signature() {
        let header = doc_signer()
            .header_with(
                &Method::POST,
                &doc_url(),
                &[("status", DOC_STATUS)],
                &[],
                DOC_NONCE,
                DOC_TIMESTAMP,
            )
            .unwrap();
        assert!(header.starts_with("OAuth oauth_consumer_key=\"xvz1evFS4wEEPTGEFPHBog\", "));
        assert!(header.contains("oauth_signature=\"hCtSmYh%2BiHYCEqBWrE7C7hYmtUk%3D\""));
        assert!(!header.contains("status"));
        assert!(!header.contains("include_entities"));
    }

    #[test]
    fn consumer_only_signature_has_no_token() {
        let signer = OAuthSigner::new(ConsumerCredentials::new("ck", "cs"), None);
        let url = Url::parse("https://api.twitter.com/oauth/request_token").unwrap();
        let header = signer
            .header_with(&Method::POST, &url, &[], &[("oauth_callback", "oob")], "n", 1)
            .unwrap();
        assert!(header.contains("oauth_callback=\"oob\""));
        assert!(!header.contains("oauth_token="));
    }

    #[test]
    fn token_response_requires_token_and_secret() {
        let mut ok = parse_token_response("oauth_token=abc&oauth_token_secret=def&user_id=7\n");
        let creds = take_credentials(&mut ok).unwrap();
        assert_eq!(creds.token, "abc");
        assert_eq!(creds.secret, "def");
        assert_eq!(ok.get("user_id").map(String::as_str), Some("7"));

        let mut missing = parse_token_response("oauth_token=abc");
        assert!(matches!(
            take_credentials(&mut missing),
            Err(OAuthError::MissingField("oauth_token_secret"))
        ));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let shown = format!("{:?}", doc_signer());
        assert!(!shown.contains("kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw"));
        assert!(!shown.contains("LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE"));
    }
}
