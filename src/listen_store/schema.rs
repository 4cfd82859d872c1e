//! SQLite schema for the listening history database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1
// =============================================================================

/// One row per track ever observed, with its listening counters.
const TRACKS_TABLE_V1: Table = Table {
    name: "tracks",
    columns: &[
        sqlite_column!("track_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("artists", &SqlType::Text, non_null = true), // JSON array
        sqlite_column!("artist_ids", &SqlType::Text, non_null = true), // JSON array
        sqlite_column!("album", &SqlType::Text, non_null = true),
        sqlite_column!("album_id", &SqlType::Text),
        sqlite_column!("album_art", &SqlType::Text),
        sqlite_column!("duration_ms", &SqlType::Integer, non_null = true),
        sqlite_column!("explicit", &SqlType::Integer),
        sqlite_column!("popularity", &SqlType::Integer),
        sqlite_column!("disc_number", &SqlType::Integer),
        sqlite_column!("track_number", &SqlType::Integer),
        sqlite_column!("isrc", &SqlType::Text),
        sqlite_column!(
            "listen_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("first_listened", &SqlType::Text, non_null = true),
        sqlite_column!("last_listened", &SqlType::Text, non_null = true),
        sqlite_column!("updated_at", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_tracks_album_id", "album_id")],
    unique_constraints: &[],
};

/// The play log. `(track_id, listened_at)` is the deduplication key and
/// `listened_at` is always minute-aligned.
const PLAYS_TABLE_V1: Table = Table {
    name: "plays",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("track_id", &SqlType::Text, non_null = true),
        sqlite_column!("listened_at", &SqlType::Text, non_null = true),
        sqlite_column!("device_name", &SqlType::Text),
        sqlite_column!("device_type", &SqlType::Text),
        sqlite_column!("context_type", &SqlType::Text),
        sqlite_column!("context_uri", &SqlType::Text),
        sqlite_column!("shuffle_state", &SqlType::Integer),
    ],
    indices: &[("idx_plays_listened_at", "listened_at DESC")],
    unique_constraints: &[&["track_id", "listened_at"]],
};

const ARTISTS_TABLE_V1: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("artist_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("genres", &SqlType::Text, non_null = true), // JSON array
        sqlite_column!("popularity", &SqlType::Integer),
        sqlite_column!("image", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

const ALBUMS_TABLE_V1: Table = Table {
    name: "albums",
    columns: &[
        sqlite_column!("album_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("album_type", &SqlType::Text),
        sqlite_column!("total_tracks", &SqlType::Integer),
        sqlite_column!("release_date", &SqlType::Text),
        sqlite_column!("release_date_precision", &SqlType::Text),
        sqlite_column!("label", &SqlType::Text),
        sqlite_column!("popularity", &SqlType::Integer),
        sqlite_column!("image", &SqlType::Text),
        sqlite_column!("artist_ids", &SqlType::Text, non_null = true), // JSON array
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

pub const LISTEN_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        TRACKS_TABLE_V1,
        PLAYS_TABLE_V1,
        ARTISTS_TABLE_V1,
        ALBUMS_TABLE_V1,
    ],
}];
