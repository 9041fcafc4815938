//! Username batching for `GET /2/users/by`.
//!
//! The endpoint accepts at most 100 usernames per call, so lookups are cut into
//! contiguous chunks and each chunk becomes one set of query parameters.
use std::borrow::Cow;

/// Hard ceiling the lookup endpoint enforces per request.
pub const MAX_USERS_PER_REQUEST: usize = 100;

/// Field selector asking the API to include `public_metrics` on each user.
pub const USER_FIELDS: &str = "public_metrics";

/// Query parameters for a single lookup call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserLookupParams {
    /// Comma-joined usernames, in input order.
    pub usernames: String,
    pub user_fields: &'static str,
}

impl UserLookupParams {
    fn for_batch(users: &[String]) -> Self {
        Self {
            usernames: users.join(","),
            user_fields: USER_FIELDS,
        }
    }

    /// Pairs in the shape `tally_http::RequestOpts::query` expects.
    pub fn query_pairs(&self) -> Vec<(&'static str, Cow<'_, str>)> {
        vec![
            ("usernames", Cow::Borrowed(self.usernames.as_str())),
            ("user.fields", Cow::Borrowed(self.user_fields)),
        ]
    }

    /// Number of usernames carried by this batch.
    pub fn len(&self) -> usize {
        if self.usernames.is_empty() {
            0
        } else {
            self.usernames.split(',').count()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.usernames.is_empty()
    }
}

/// Lazily split `items` into contiguous chunks of at most `size` elements.
///
/// # Panics
///
/// Panics if `size` is zero.
pub fn split_list<T>(items: &[T], size: usize) -> impl Iterator<Item = &[T]> {
    items.chunks(size)
}

/// Build one [`UserLookupParams`] per chunk of `users`.
pub fn make_twitter_params(users: &[String], max_users_per_request: usize) -> Vec<UserLookupParams> {
    split_list(users, max_users_per_request)
        .map(UserLookupParams::for_batch)
        .collect()
}
