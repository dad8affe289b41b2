//! Vouch Engine
//!
//! The two algorithms at the heart of Vouch:
//! - [`ConnectionTrainer`]: turns each new judgment into updated trust
//!   weights between sources (online logistic regression plus decay)
//! - [`RecommendationEngine`]: gathers recent candidates, scores them by
//!   trust, merges, deduplicates, diversifies and ranks them

pub mod config;
pub mod diversify;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod request;
pub mod scoring;
pub mod trainer;

pub use config::*;
pub use diversify::diversify_by_key;
pub use engine::*;
pub use error::*;
pub use request::*;
pub use trainer::*;
