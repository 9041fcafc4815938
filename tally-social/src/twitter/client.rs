//! User lookup client for the Twitter/X v2 API.
//!
//! Every call is signed with the OAuth1 access token obtained through
//! [`crate::twitter::oauth::TwitterAuth`]. Batches are issued one after the
//! other with a fixed pause in between; a failed batch aborts the whole fetch.
use std::collections::HashMap;
use std::time::Duration;

use crate::twitter::batch::{MAX_USERS_PER_REQUEST, UserLookupParams, make_twitter_params};
use crate::twitter::oauth::{AccessToken, ConsumerCredentials, OAuthSigner};
use crate::twitter::types::{User, UsersResponse};
use anyhow::{Context, Result, anyhow};
use reqwest::Method;
use reqwest::header::AUTHORIZATION;
use tally_http::{Auth, HttpClient, RequestOpts};

pub const DEFAULT_API_BASE: &str = "https://api.twitter.com";
const USER_LOOKUP_PATH: &str = "2/users/by";
const DEFAULT_PAUSE: Duration = Duration::from_secs(3);

/// Username → tweet count.
pub type TweetCounts = HashMap<String, u64>;

#[derive(Clone, Debug)]
pub struct TwitterApi {
    http: HttpClient,
    signer: OAuthSigner,
    batch_size: usize,
    pause: Duration,
}

impl TwitterApi {
    pub fn new(http: HttpClient, consumer: ConsumerCredentials, access: &AccessToken) -> Self {
        Self {
            http,
            signer: OAuthSigner::new(consumer, Some(access.credentials.clone())),
            batch_size: MAX_USERS_PER_REQUEST,
            pause: DEFAULT_PAUSE,
        }
    }

    /// Usernames per lookup; clamped to `1..=100`.
    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n.clamp(1, MAX_USERS_PER_REQUEST);
        self
    }

    /// Pause between consecutive lookups.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// One signed `GET /2/users/by` call.
    pub async fn lookup_users(&self, params: &UserLookupParams) -> Result<UsersResponse> {
        let url = self.http.url_for(USER_LOOKUP_PATH)?;
        let query = params.query_pairs();
        let signed: Vec<(&str, &str)> = query.iter().map(|(k, v)| (*k, v.as_ref())).collect();
        let header = self.signer.authorization(&Method::GET, &url, &signed, &[])?;

        let resp: UsersResponse = self
            .http
            .get_json(
                USER_LOOKUP_PATH,
                RequestOpts {
                    auth: Some(Auth::Header {
                        name: AUTHORIZATION,
                        value: header,
                    }),
                    query: Some(query),
                    ..Default::default()
                },
            )
            .await?;

        tracing::debug!(
            requested = params.len(),
            returned = resp.data.as_ref().map_or(0, Vec::len),
            problems = resp.errors.as_ref().map_or(0, Vec::len),
            "twitter.lookup.response"
        );
        Ok(resp)
    }

    /// Look up every username and collect their tweet counts.
    pub async fn fetch_tweet_counts(&self, users: &[String]) -> Result<TweetCounts> {
        let batches = make_twitter_params(users, self.batch_size);
        let total = batches.len();
        let mut counts = TweetCounts::with_capacity(users.len());

        for (idx, params) in batches.iter().enumerate() {
            if idx > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }

            let resp = self
                .lookup_users(params)
                .await
                .with_context(|| format!("user lookup batch {} of {} failed", idx + 1, total))?;

            for problem in resp.errors.iter().flatten() {
                tracing::warn!(
                    value = ?problem.value,
                    title = ?problem.title,
                    detail = ?problem.detail,
                    "twitter.lookup.problem"
                );
            }

            for user in resp.data.iter().flatten() {
                let (username, tweet_count) = parse_user_data(user)?;
                counts.insert(username, tweet_count);
            }
            tracing::info!(batch = idx + 1, total, collected = counts.len(), "twitter.lookup.batch_done");
        }

        Ok(counts)
    }
}

/// Extract `(username, tweet_count)` from a user record.
pub fn parse_user_data(user: &User) -> Result<(String, u64)> {
    let metrics = user
        .public_metrics
        .as_ref()
        .ok_or_else(|| anyhow!("user {} has no public_metrics", user.username))?;
    Ok((user.username.clone(), metrics.tweet_count))
}
