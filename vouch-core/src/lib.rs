//! Vouch Core - Domain model for learned source-to-source trust
//!
//! This crate provides the foundational primitives:
//! - Sources (people and syndicated feeds) and their categories
//! - Judgments (endorse / neutral / reject) on items
//! - Directional, polarity-specific connections with logit-scale weights
//! - Recommendation records produced by the engine
//! - Time periods and connection activity buckets

pub mod connection;
pub mod error;
pub mod judgment;
pub mod recommendation;
pub mod source;
pub mod time_periods;

pub use connection::*;
pub use error::*;
pub use judgment::*;
pub use recommendation::*;
pub use source::*;
pub use time_periods::*;

/// Prediction that corresponds to a log-odds weight of 0
pub const NEUTRAL_PREDICTION: f64 = 0.5;

/// Default learning rate of the online logistic regression
pub const DEFAULT_LEARNING_RATE: f64 = 0.1;

/// Default rate at which unreciprocated items pull a weight back to neutral
pub const DEFAULT_IGNORE_LEARNING_RATE: f64 = 0.1;

/// Smoothing floor added to every prior judge's share of an update
pub const DEFAULT_CONTRIBUTION: f64 = 0.1;

/// Current connection model version
pub const LOGISTIC_REGRESSION_CONNECTION: &str = "lr4";

/// Constant weight of a single endorsement when popular items are requested
pub const NOMINAL_USER_VOTE_WEIGHT: f64 = 0.0001;

/// How many co-endorsed items a connection (and a recommendation) keeps
pub const MAX_TOP_SOURCES: usize = 10;

/// How many feed urls a recommendation keeps for presentation
pub const MAX_TOP_FEEDS: usize = 10;

/// Longest accepted source identifier or url
pub const MAX_IDENTIFIER_LEN: usize = 2048;

/// Logistic function mapping log-odds to a probability
pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
