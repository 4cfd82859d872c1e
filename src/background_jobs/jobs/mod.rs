//! Ingestion jobs run by the scheduler.

pub mod live_playback_poll;
pub mod metadata_backfill;
pub mod recently_played_backstop;

pub use live_playback_poll::{LivePlaybackPollJob, LIVE_PLAYBACK_POLL_JOB_ID};
pub use metadata_backfill::MetadataBackfillJob;
pub use recently_played_backstop::RecentlyPlayedBackstopJob;
