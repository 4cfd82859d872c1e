//! Hoardify
//!
//! Ingests the "now playing" state of a streaming account into a local,
//! deduplicated listening history while keeping upstream request volume low.

pub mod background_jobs;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod listen_store;
pub mod listening;
pub mod rate_limit;
pub mod sqlite_persistence;
pub mod upstream;

// Re-export commonly used types for convenience
pub use cache::{EphemeralCache, InMemoryCache};
pub use credentials::{AccessToken, CredentialStore, FileCredentialStore};
pub use listen_store::{ListenStore, SqliteListenStore};
pub use listening::{
    ListeningDeps, MetadataSyncer, PlaybackPoller, PollIntervalPolicy, RecentlyPlayedBackstop,
};
pub use rate_limit::AdaptiveRateLimiter;
pub use upstream::{SpotifyClient, UpstreamApi};
