#![allow(dead_code)]

use async_trait::async_trait;
use hoardify::listening::{Album, Artist, ListenEvent, PlaybackSnapshot};
use hoardify::upstream::{UpstreamApi, UpstreamError, UpstreamResult};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Scripted upstream. Every artist and album id resolves unless listed as unknown.
#[derive(Default)]
pub struct FakeUpstream {
    playback: Mutex<Option<PlaybackSnapshot>>,
    playback_errors: Mutex<VecDeque<UpstreamError>>,
    /// Simulated round trip of a playback fetch.
    playback_latency: Mutex<Option<Duration>>,
    recent: Mutex<Vec<ListenEvent>>,
    recent_errors: Mutex<VecDeque<UpstreamError>>,
    unknown_ids: Mutex<HashSet<String>>,
    /// 0-based indices of `get_albums` calls that fail.
    failing_album_calls: Mutex<HashSet<usize>>,
    pub artist_batches: Mutex<Vec<Vec<String>>>,
    pub album_batches: Mutex<Vec<Vec<String>>>,
    pub playback_calls: AtomicUsize,
    pub recent_calls: AtomicUsize,
    pub image_calls: AtomicUsize,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_playback(&self, snapshot: Option<PlaybackSnapshot>) {
        *self.playback.lock().unwrap() = snapshot;
    }

    pub fn set_playback_latency(&self, latency: Duration) {
        *self.playback_latency.lock().unwrap() = Some(latency);
    }

    /// The next playback fetch fails with `err`.
    pub fn fail_next_playback(&self, err: UpstreamError) {
        self.playback_errors.lock().unwrap().push_back(err);
    }

    pub fn set_recently_played(&self, events: Vec<ListenEvent>) {
        *self.recent.lock().unwrap() = events;
    }

    pub fn fail_next_recently_played(&self, err: UpstreamError) {
        self.recent_errors.lock().unwrap().push_back(err);
    }

    pub fn mark_unknown(&self, id: &str) {
        self.unknown_ids.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_album_call(&self, call_index: usize) {
        self.failing_album_calls.lock().unwrap().insert(call_index);
    }

    pub fn artist_batch_sizes(&self) -> Vec<usize> {
        self.artist_batches.lock().unwrap().iter().map(Vec::len).collect()
    }

    pub fn album_batch_sizes(&self) -> Vec<usize> {
        self.album_batches.lock().unwrap().iter().map(Vec::len).collect()
    }

    pub fn metadata_calls(&self) -> usize {
        self.artist_batches.lock().unwrap().len() + self.album_batches.lock().unwrap().len()
    }

    fn is_unknown(&self, id: &str) -> bool {
        self.unknown_ids.lock().unwrap().contains(id)
    }
}

#[async_trait]
impl UpstreamApi for FakeUpstream {
    async fn get_current_playback(&self) -> UpstreamResult<Option<PlaybackSnapshot>> {
        self.playback_calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.playback_latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(err) = self.playback_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self.playback.lock().unwrap().clone())
    }

    async fn get_recently_played(&self, limit: usize) -> UpstreamResult<Vec<ListenEvent>> {
        self.recent_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.recent_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self
            .recent
            .lock()
            .unwrap()
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_artists(&self, ids: &[String]) -> UpstreamResult<Vec<Option<Artist>>> {
        self.artist_batches.lock().unwrap().push(ids.to_vec());
        Ok(ids
            .iter()
            .map(|id| {
                (!self.is_unknown(id)).then(|| Artist {
                    artist_id: id.clone(),
                    name: format!("Name of {}", id),
                    genres: vec!["indie".to_string()],
                    popularity: Some(50),
                    image: None,
                })
            })
            .collect())
    }

    async fn get_albums(&self, ids: &[String]) -> UpstreamResult<Vec<Option<Album>>> {
        let call_index = {
            let mut batches = self.album_batches.lock().unwrap();
            batches.push(ids.to_vec());
            batches.len() - 1
        };
        if self.failing_album_calls.lock().unwrap().contains(&call_index) {
            return Err(UpstreamError::Status {
                status: 502,
                message: "Bad gateway".to_string(),
            });
        }
        Ok(ids
            .iter()
            .map(|id| {
                (!self.is_unknown(id)).then(|| Album {
                    album_id: id.clone(),
                    name: format!("Name of {}", id),
                    album_type: Some("album".to_string()),
                    total_tracks: Some(10),
                    release_date: Some("2020-01-01".to_string()),
                    release_date_precision: Some("day".to_string()),
                    label: None,
                    popularity: None,
                    image: None,
                    artist_ids: vec![],
                })
            })
            .collect())
    }

    async fn fetch_image(&self, _url: &str) -> UpstreamResult<Vec<u8>> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0xFF, 0xD8, 0xFF, 0xE0])
    }
}
