//! Live playback poll cycles against a scripted upstream and a real SQLite store.

mod common;

use common::{at, snapshot, track, TestHarness, ALBUM_ART_URL, TRACK_1_ID, TRACK_2_ID};
use hoardify::cache::{
    album_art_cache_key, EphemeralCache, LAST_SEEN_TRACK_CACHE_KEY, NOW_PLAYING_CACHE_KEY,
};
use hoardify::listen_store::ListenStore;
use hoardify::listening::{
    ListeningDeps, PlaybackPoller, PollIntervalPolicy, PollStatus, SkipReason,
};
use hoardify::upstream::UpstreamError;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_nothing_playing_twice_leaves_cache_empty_and_store_untouched() {
    let harness = TestHarness::new();
    let poller = harness.poller();
    harness.upstream.set_playback(None);

    for _ in 0..2 {
        let outcome = poller.poll_current_playback().await;
        assert_eq!(outcome.status, PollStatus::Ok);
        assert!(!outcome.playing);
        assert!(!outcome.new_listen);
        assert_eq!(outcome.requests_made, 1);
    }

    assert!(harness.cached_now_playing().is_none());
    assert!(harness.cached_widget().is_none());
    let stats = harness.store.get_stats().unwrap();
    assert_eq!(stats.tracks, 0);
    assert_eq!(stats.plays, 0);
}

#[tokio::test(start_paused = true)]
async fn test_stopping_playback_clears_cache_and_marker() {
    let harness = TestHarness::new();
    let poller = harness.poller();

    harness
        .upstream
        .set_playback(Some(snapshot(TRACK_1_ID, 10_000, at(12, 0, 10))));
    poller.poll_current_playback().await;
    assert!(harness.cached_now_playing().is_some());

    harness.upstream.set_playback(None);
    poller.poll_current_playback().await;
    assert!(harness.cached_now_playing().is_none());
    assert!(harness.cached_widget().is_none());

    // The same track resuming counts as a new listen again.
    harness
        .upstream
        .set_playback(Some(snapshot(TRACK_1_ID, 5_000, at(12, 10, 5))));
    let outcome = poller.poll_current_playback().await;
    assert!(outcome.new_listen);
    let record = harness.store.get_track(TRACK_1_ID).unwrap().unwrap();
    assert_eq!(record.listen_count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_same_track_updates_cache_without_durable_writes() {
    let harness = TestHarness::new();
    let poller = harness.poller();

    harness
        .upstream
        .set_playback(Some(snapshot(TRACK_1_ID, 10_000, at(12, 0, 10))));
    let first = poller.poll_current_playback().await;
    assert!(first.new_listen);
    assert_eq!(
        harness.cache.ttl(NOW_PLAYING_CACHE_KEY).unwrap(),
        Some(Duration::from_secs(220))
    );

    harness
        .upstream
        .set_playback(Some(snapshot(TRACK_1_ID, 70_000, at(12, 1, 10))));
    let second = poller.poll_current_playback().await;
    assert_eq!(second.status, PollStatus::Ok);
    assert!(second.playing);
    assert!(!second.new_listen);
    assert_eq!(second.requests_made, 1);

    let record = harness.store.get_track(TRACK_1_ID).unwrap().unwrap();
    assert_eq!(record.listen_count, 1);
    assert_eq!(harness.store.count_plays_for_track(TRACK_1_ID).unwrap(), 1);

    assert_eq!(
        harness.cache.ttl(NOW_PLAYING_CACHE_KEY).unwrap(),
        Some(Duration::from_secs(160))
    );
    let cached = harness.cached_now_playing().unwrap();
    assert_eq!(cached.progress_ms, 70_000);
}

#[tokio::test(start_paused = true)]
async fn test_track_change_records_new_listen_and_syncs_metadata() {
    let harness = TestHarness::new();
    let poller = harness.poller();

    harness
        .upstream
        .set_playback(Some(snapshot(TRACK_1_ID, 10_000, at(12, 0, 10))));
    poller.poll_current_playback().await;

    harness
        .upstream
        .set_playback(Some(snapshot(TRACK_2_ID, 3_000, at(12, 3, 33))));
    let outcome = poller.poll_current_playback().await;

    assert!(outcome.new_listen);
    // Playback fetch plus one artist batch and one album batch.
    assert_eq!(outcome.requests_made, 3);

    let record = harness.store.get_track(TRACK_2_ID).unwrap().unwrap();
    assert_eq!(record.listen_count, 1);
    assert_eq!(record.first_listened, at(12, 3, 30));

    let plays = harness.store.get_plays_for_track(TRACK_2_ID).unwrap();
    assert_eq!(plays.len(), 1);
    assert_eq!(plays[0].listened_at, at(12, 3, 0));
    assert_eq!(plays[0].context.device_name.as_deref(), Some("Desk"));

    let artists = harness
        .store
        .existing_artist_ids(&["artist-track-2".to_string()])
        .unwrap();
    assert_eq!(artists.len(), 1);
    let albums = harness
        .store
        .existing_album_ids(&["album-track-2".to_string()])
        .unwrap();
    assert_eq!(albums.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_known_track_new_listen_makes_single_request() {
    let harness = TestHarness::new();
    harness
        .store
        .upsert_track(&track(TRACK_2_ID), at(9, 0, 0), true)
        .unwrap();
    harness
        .deps()
        .metadata_syncer()
        .sync_track(&track(TRACK_2_ID))
        .await;
    let calls_before = harness.upstream.metadata_calls();

    let poller = harness.poller();
    harness
        .upstream
        .set_playback(Some(snapshot(TRACK_2_ID, 1_000, at(12, 0, 1))));
    let outcome = poller.poll_current_playback().await;

    assert!(outcome.new_listen);
    assert_eq!(outcome.requests_made, 1);
    assert_eq!(harness.upstream.metadata_calls(), calls_before);

    let record = harness.store.get_track(TRACK_2_ID).unwrap().unwrap();
    assert_eq!(record.listen_count, 2);
    assert_eq!(record.first_listened, at(9, 0, 0));
    assert_eq!(record.last_listened, at(12, 0, 0));
}

#[tokio::test(start_paused = true)]
async fn test_unauthenticated_cycle_skips_without_calling_upstream() {
    let harness = TestHarness::unauthenticated();
    let poller = harness.poller();
    harness
        .upstream
        .set_playback(Some(snapshot(TRACK_1_ID, 0, at(12, 0, 0))));

    let outcome = poller.poll_current_playback().await;

    assert_eq!(outcome.status, PollStatus::Skipped);
    assert_eq!(outcome.reason, Some(SkipReason::Unauthenticated));
    assert_eq!(outcome.requests_made, 0);
    assert_eq!(outcome.next_interval_secs, 3);
    assert_eq!(harness.upstream.playback_calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.rate_limiter.requests_in_window(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_upstream_failure_is_skipped_and_counted() {
    let harness = TestHarness::new();
    let poller = harness.poller();
    harness
        .upstream
        .fail_next_playback(UpstreamError::Transport("connection reset".to_string()));
    harness
        .upstream
        .set_playback(Some(snapshot(TRACK_1_ID, 0, at(12, 0, 0))));

    let failed = poller.poll_current_playback().await;
    assert_eq!(failed.status, PollStatus::Skipped);
    assert_eq!(failed.reason, Some(SkipReason::UpstreamFailure));
    assert_eq!(failed.requests_made, 1);
    assert_eq!(harness.rate_limiter.requests_in_window(), 1);

    let recovered = poller.poll_current_playback().await;
    assert_eq!(recovered.status, PollStatus::Ok);
    assert!(recovered.new_listen);
}

#[tokio::test(start_paused = true)]
async fn test_expired_credentials_reported_by_upstream_skip_cycle() {
    let harness = TestHarness::new();
    let poller = harness.poller();
    harness
        .upstream
        .fail_next_playback(UpstreamError::Unauthenticated);

    let outcome = poller.poll_current_playback().await;
    assert_eq!(outcome.status, PollStatus::Skipped);
    assert_eq!(outcome.reason, Some(SkipReason::Unauthenticated));
    assert_eq!(outcome.requests_made, 1);
}

#[tokio::test(start_paused = true)]
async fn test_request_volume_policy_backs_off_after_metadata_fetch() {
    let harness = TestHarness::new();
    let poller = harness.poller_with_policy(PollIntervalPolicy::RequestVolume {
        single: Duration::from_secs(4),
        multiple: Duration::from_secs(8),
    });

    harness
        .upstream
        .set_playback(Some(snapshot(TRACK_1_ID, 0, at(12, 0, 0))));
    let new_track = poller.poll_current_playback().await;
    assert!(new_track.requests_made >= 2);
    assert_eq!(new_track.next_interval_secs, 8);

    let same_track = poller.poll_current_playback().await;
    assert_eq!(same_track.requests_made, 1);
    assert_eq!(same_track.next_interval_secs, 4);
}

#[tokio::test(start_paused = true)]
async fn test_widget_embeds_cached_album_art() {
    let harness = TestHarness::new();
    let poller = harness.poller();

    let mut playing = snapshot(TRACK_1_ID, 0, at(12, 0, 0));
    playing.track.album_art = Some(ALBUM_ART_URL.to_string());
    harness.upstream.set_playback(Some(playing));

    poller.poll_current_playback().await;
    poller.poll_current_playback().await;

    let svg = harness.cached_widget().unwrap();
    assert!(svg.contains("data:image/jpeg;base64,/9j/4A=="));
    assert!(svg.contains("Now Playing"));
    assert_eq!(harness.upstream.image_calls.load(Ordering::SeqCst), 1);
    assert!(harness
        .cache
        .get(&album_art_cache_key(ALBUM_ART_URL))
        .unwrap()
        .is_some());
    // Image downloads are not rate accounted.
    assert_eq!(harness.rate_limiter.requests_in_window(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_play_log_row_survives_lost_marker() {
    let harness = TestHarness::new();
    let poller = harness.poller();
    harness
        .upstream
        .set_playback(Some(snapshot(TRACK_1_ID, 20_000, at(12, 0, 50))));
    poller.poll_current_playback().await;

    // Losing the marker (cache eviction, restart) replays the same listen.
    harness.cache.delete(LAST_SEEN_TRACK_CACHE_KEY).unwrap();
    harness
        .upstream
        .set_playback(Some(snapshot(TRACK_1_ID, 25_000, at(12, 0, 55))));
    let outcome = poller.poll_current_playback().await;

    assert!(outcome.new_listen);
    assert_eq!(harness.store.count_plays_for_track(TRACK_1_ID).unwrap(), 1);
    let record = harness.store.get_track(TRACK_1_ID).unwrap().unwrap();
    assert_eq!(record.listen_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_poller_does_not_recount_current_listen() {
    let harness = TestHarness::new();
    harness
        .upstream
        .set_playback(Some(snapshot(TRACK_1_ID, 20_000, at(12, 0, 50))));
    harness.poller().poll_current_playback().await;

    // A second process with its own empty cache observes the same listen.
    let other = TestHarness::new();
    let deps = ListeningDeps {
        store: harness.store.clone(),
        ..other.deps()
    };
    other
        .upstream
        .set_playback(Some(snapshot(TRACK_1_ID, 40_000, at(12, 1, 10))));
    let poller = PlaybackPoller::new(
        deps,
        harness.syncer(),
        PollIntervalPolicy::Adaptive,
    );
    let outcome = poller.poll_current_playback().await;

    assert!(outcome.new_listen);
    let record = harness.store.get_track(TRACK_1_ID).unwrap().unwrap();
    assert_eq!(record.listen_count, 1);
    assert_eq!(harness.store.count_plays_for_track(TRACK_1_ID).unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_polls_record_one_listen() {
    let harness = TestHarness::new();
    harness
        .upstream
        .set_playback_latency(Duration::from_millis(500));
    harness
        .upstream
        .set_playback(Some(snapshot(TRACK_1_ID, 10_000, at(12, 0, 10))));
    let poller = Arc::new(harness.poller());

    let scheduled = {
        let poller = Arc::clone(&poller);
        tokio::spawn(async move { poller.poll_current_playback().await })
    };
    let (manual, scheduled) = tokio::join!(poller.poll_current_playback(), scheduled);
    let scheduled = scheduled.unwrap();

    assert_eq!(
        [manual.new_listen, scheduled.new_listen]
            .iter()
            .filter(|new| **new)
            .count(),
        1
    );
    assert_eq!(harness.upstream.playback_calls.load(Ordering::SeqCst), 2);
    assert_eq!(harness.store.count_plays_for_track(TRACK_1_ID).unwrap(), 1);
    let record = harness.store.get_track(TRACK_1_ID).unwrap().unwrap();
    assert_eq!(record.listen_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_pollers_without_shared_marker_keep_counts_consistent() {
    let harness = TestHarness::new();
    let other = TestHarness::new();
    for upstream in [&harness.upstream, &other.upstream] {
        upstream.set_playback_latency(Duration::from_millis(500));
        upstream.set_playback(Some(snapshot(TRACK_1_ID, 10_000, at(12, 0, 10))));
    }
    let first = harness.poller();
    let second = PlaybackPoller::new(
        ListeningDeps {
            store: harness.store.clone(),
            ..other.deps()
        },
        harness.syncer(),
        PollIntervalPolicy::Adaptive,
    );

    let (a, b) = tokio::join!(first.poll_current_playback(), second.poll_current_playback());

    // Each poller has its own marker, so both see a new listen.
    assert!(a.new_listen && b.new_listen);
    assert_eq!(harness.store.count_plays_for_track(TRACK_1_ID).unwrap(), 1);
    let record = harness.store.get_track(TRACK_1_ID).unwrap().unwrap();
    assert_eq!(record.listen_count, 1);
}
