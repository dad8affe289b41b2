//! Vouch Runtime
//!
//! Deferred work and the service façade:
//! - [`Task`]s (training, decay, past-recommendation commits) run on an
//!   at-least-once [`WorkQueue`] with retries
//! - [`Recommender`] records judgments and feed publications, schedules the
//!   resulting work and serves recommendations

pub mod config;
pub mod queue;
pub mod recommender;
pub mod task;

pub use config::*;
pub use queue::*;
pub use recommender::*;
pub use task::*;
