#![allow(dead_code)]

pub const TRACK_1_ID: &str = "track-1";
pub const TRACK_2_ID: &str = "track-2";
pub const TRACK_3_ID: &str = "track-3";

/// Every fixture track lasts 200 seconds.
pub const TRACK_DURATION_MS: i64 = 200_000;

pub const ALBUM_ART_URL: &str = "https://i.scdn.co/image/fixture";
