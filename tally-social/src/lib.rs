//! Social network clients used by Tally.
//!
//! Only the Twitter/X user-lookup pipeline exists today: OAuth1 PIN
//! authorization, username batching, and tweet-count aggregation.
pub mod twitter;
