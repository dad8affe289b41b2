//! Vouch Store Layer
//!
//! Interfaces the trainer and the recommendation engine consume, plus an
//! in-memory backend that implements all of them:
//! - [`ConnectionStore`]: the five operations the trainer needs
//! - [`CandidateProvider`], [`ItemResolver`], [`CategoryDirectory`],
//!   [`PastRecommendationStore`]: what the engine reads
//! - [`JudgmentLog`]: where new judgments and feed items are recorded

pub mod clock;
pub mod config;
pub mod error;
pub mod items;
pub mod memory;
pub mod past;
pub mod traits;

pub use clock::*;
pub use config::*;
pub use error::*;
pub use items::*;
pub use memory::*;
pub use past::*;
pub use traits::*;
