//! Common test infrastructure
//!
//! Integration tests build a [`TestHarness`]: a real SQLite listen store in a
//! temp dir, the in-memory cache and credential store, and a scripted
//! [`FakeUpstream`] standing in for the Spotify Web API.

mod constants;
mod fake_upstream;
mod fixtures;

#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use fake_upstream::FakeUpstream;
#[allow(unused_imports)]
pub use fixtures::{at, event, snapshot, track, TestHarness};
