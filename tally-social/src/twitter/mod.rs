//! Twitter/X API integration surface.
//!
//! - [`batch`] splits usernames into lookup-sized chunks
//! - [`oauth`] signs requests and runs the three-legged PIN flow
//! - [`client`] issues the lookups and folds results into [`TweetCounts`]
//! - [`types`] holds the response models
pub mod batch;
pub mod client;
pub mod oauth;
pub mod types;

pub use batch::{UserLookupParams, make_twitter_params, split_list};
pub use client::{TweetCounts, TwitterApi};
pub use oauth::{AccessToken, ConsumerCredentials, OAuthError, PinPrompt, TwitterAuth};
