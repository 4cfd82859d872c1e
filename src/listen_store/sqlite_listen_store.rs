use super::schema::LISTEN_VERSIONED_SCHEMAS;
use super::{ListenStore, ListenStoreStats, PlayInsert, TrackUpsert};
use crate::listening::{
    Album, Artist, PlayLogEntry, PlaybackContext, TrackMetadata, TrackRecord,
};
use crate::sqlite_persistence::read_schema_version;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

pub struct SqliteListenStore {
    conn: Arc<Mutex<Connection>>,
}

/// Stored as second-precision RFC 3339 with a `Z` suffix so that text
/// ordering matches time ordering (MIN/MAX work on the column directly).
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid timestamp in database: {}", s))?
        .with_timezone(&Utc))
}

fn ids_json(ids: &[String]) -> Result<String> {
    Ok(serde_json::to_string(ids)?)
}

struct TrackRow {
    track_id: String,
    name: String,
    artists: String,
    artist_ids: String,
    album: String,
    album_id: Option<String>,
    album_art: Option<String>,
    duration_ms: i64,
    explicit: Option<bool>,
    popularity: Option<i64>,
    disc_number: Option<i64>,
    track_number: Option<i64>,
    isrc: Option<String>,
    listen_count: i64,
    first_listened: String,
    last_listened: String,
}

impl TrackRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            track_id: row.get("track_id")?,
            name: row.get("name")?,
            artists: row.get("artists")?,
            artist_ids: row.get("artist_ids")?,
            album: row.get("album")?,
            album_id: row.get("album_id")?,
            album_art: row.get("album_art")?,
            duration_ms: row.get("duration_ms")?,
            explicit: row.get("explicit")?,
            popularity: row.get("popularity")?,
            disc_number: row.get("disc_number")?,
            track_number: row.get("track_number")?,
            isrc: row.get("isrc")?,
            listen_count: row.get("listen_count")?,
            first_listened: row.get("first_listened")?,
            last_listened: row.get("last_listened")?,
        })
    }

    fn into_record(self) -> Result<TrackRecord> {
        Ok(TrackRecord {
            metadata: TrackMetadata {
                track_id: self.track_id,
                name: self.name,
                artists: serde_json::from_str(&self.artists)
                    .context("Invalid artists JSON in tracks table")?,
                artist_ids: serde_json::from_str(&self.artist_ids)
                    .context("Invalid artist_ids JSON in tracks table")?,
                album: self.album,
                album_id: self.album_id,
                album_art: self.album_art,
                duration_ms: self.duration_ms,
                explicit: self.explicit,
                popularity: self.popularity,
                disc_number: self.disc_number,
                track_number: self.track_number,
                isrc: self.isrc,
            },
            listen_count: self.listen_count,
            first_listened: parse_datetime(&self.first_listened)?,
            last_listened: parse_datetime(&self.last_listened)?,
        })
    }
}

impl SqliteListenStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open listen database at {:?}", path))?;
        conn.busy_timeout(Duration::from_secs(5))?;

        let latest = LISTEN_VERSIONED_SCHEMAS
            .last()
            .context("No listen database schema defined")?;

        match read_schema_version(&conn)? {
            None => {
                info!("Creating new listen database at {:?}", path);
                latest.create(&conn)?;
            }
            Some(db_version) => {
                let schema = LISTEN_VERSIONED_SCHEMAS
                    .iter()
                    .find(|s| s.version == db_version)
                    .with_context(|| format!("Unknown listen database version {}", db_version))?;
                schema.validate(&conn).with_context(|| {
                    format!(
                        "Listen database schema validation failed for version {}",
                        db_version
                    )
                })?;
                debug!("Opened listen database {:?} (version {})", path, db_version);
            }
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn existing_ids(&self, table: &str, column: &str, ids: &[String]) -> Result<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {column} FROM {table} WHERE {column} IN (SELECT value FROM json_each(?1))"
        ))?;
        let found = stmt
            .query_map(params![ids_json(ids)?], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(found)
    }

    fn count_rows(conn: &Connection, table: &str) -> Result<usize> {
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }
}

impl ListenStore for SqliteListenStore {
    fn upsert_track(
        &self,
        track: &TrackMetadata,
        listened_at: DateTime<Utc>,
        increment: bool,
    ) -> Result<TrackUpsert> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM tracks WHERE track_id = ?1",
                params![track.track_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        let listened_at = format_datetime(&listened_at);
        let now = format_datetime(&Utc::now());
        let increment = i64::from(increment);

        tx.execute(
            "INSERT INTO tracks (
                track_id, name, artists, artist_ids, album, album_id, album_art,
                duration_ms, explicit, popularity, disc_number, track_number, isrc,
                listen_count, first_listened, last_listened, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15, ?16)
            ON CONFLICT(track_id) DO UPDATE SET
                name = excluded.name,
                artists = excluded.artists,
                artist_ids = excluded.artist_ids,
                album = excluded.album,
                album_id = excluded.album_id,
                album_art = excluded.album_art,
                duration_ms = excluded.duration_ms,
                explicit = excluded.explicit,
                popularity = excluded.popularity,
                disc_number = excluded.disc_number,
                track_number = excluded.track_number,
                isrc = excluded.isrc,
                listen_count = listen_count + ?14,
                first_listened = MIN(first_listened, excluded.first_listened),
                last_listened = MAX(last_listened, excluded.last_listened),
                updated_at = excluded.updated_at",
            params![
                track.track_id,
                track.name,
                serde_json::to_string(&track.artists)?,
                ids_json(&track.artist_ids)?,
                track.album,
                track.album_id,
                track.album_art,
                track.duration_ms,
                track.explicit,
                track.popularity,
                track.disc_number,
                track.track_number,
                track.isrc,
                increment,
                listened_at,
                now,
            ],
        )
        .with_context(|| format!("Failed to upsert track {}", track.track_id))?;
        tx.commit()?;

        Ok(if exists {
            TrackUpsert::Updated
        } else {
            TrackUpsert::Created
        })
    }

    fn insert_play(&self, entry: &PlayLogEntry) -> Result<PlayInsert> {
        let conn = self.conn();
        let listened_at = format_datetime(&entry.listened_at);
        let context = &entry.context;

        let inserted = conn.execute(
            "INSERT INTO plays (
                track_id, listened_at, device_name, device_type,
                context_type, context_uri, shuffle_state
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(track_id, listened_at) DO NOTHING",
            params![
                entry.track_id,
                listened_at,
                context.device_name,
                context.device_type,
                context.context_type,
                context.context_uri,
                context.shuffle_state,
            ],
        )?;
        if inserted > 0 {
            return Ok(PlayInsert::Inserted);
        }

        // Same listen seen again: only fill what the first observation lacked.
        conn.execute(
            "UPDATE plays SET
                device_name = COALESCE(device_name, ?3),
                device_type = COALESCE(device_type, ?4),
                context_type = COALESCE(context_type, ?5),
                context_uri = COALESCE(context_uri, ?6),
                shuffle_state = COALESCE(shuffle_state, ?7)
            WHERE track_id = ?1 AND listened_at = ?2",
            params![
                entry.track_id,
                listened_at,
                context.device_name,
                context.device_type,
                context.context_type,
                context.context_uri,
                context.shuffle_state,
            ],
        )?;
        Ok(PlayInsert::Duplicate)
    }

    fn get_track(&self, track_id: &str) -> Result<Option<TrackRecord>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT * FROM tracks WHERE track_id = ?1",
                params![track_id],
                TrackRow::from_row,
            )
            .optional()?;
        row.map(TrackRow::into_record).transpose()
    }

    fn count_plays_for_track(&self, track_id: &str) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM plays WHERE track_id = ?1",
            params![track_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn get_plays_for_track(&self, track_id: &str) -> Result<Vec<PlayLogEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT track_id, listened_at, device_name, device_type,
                    context_type, context_uri, shuffle_state
             FROM plays WHERE track_id = ?1 ORDER BY listened_at",
        )?;
        let rows = stmt
            .query_map(params![track_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    PlaybackContext {
                        device_name: row.get(2)?,
                        device_type: row.get(3)?,
                        context_type: row.get(4)?,
                        context_uri: row.get(5)?,
                        shuffle_state: row.get(6)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(track_id, listened_at, context)| {
                Ok(PlayLogEntry {
                    track_id,
                    listened_at: parse_datetime(&listened_at)?,
                    context,
                })
            })
            .collect()
    }

    fn insert_artists(&self, artists: &[Artist]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = format_datetime(&Utc::now());
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO artists (artist_id, name, genres, popularity, image, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for artist in artists {
                inserted += stmt.execute(params![
                    artist.artist_id,
                    artist.name,
                    serde_json::to_string(&artist.genres)?,
                    artist.popularity,
                    artist.image,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn insert_albums(&self, albums: &[Album]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = format_datetime(&Utc::now());
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO albums (
                    album_id, name, album_type, total_tracks, release_date,
                    release_date_precision, label, popularity, image, artist_ids, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for album in albums {
                inserted += stmt.execute(params![
                    album.album_id,
                    album.name,
                    album.album_type,
                    album.total_tracks,
                    album.release_date,
                    album.release_date_precision,
                    album.label,
                    album.popularity,
                    album.image,
                    ids_json(&album.artist_ids)?,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn existing_artist_ids(&self, ids: &[String]) -> Result<HashSet<String>> {
        self.existing_ids("artists", "artist_id", ids)
    }

    fn existing_album_ids(&self, ids: &[String]) -> Result<HashSet<String>> {
        self.existing_ids("albums", "album_id", ids)
    }

    fn referenced_artist_ids(&self) -> Result<HashSet<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT j.value FROM tracks, json_each(tracks.artist_ids) AS j
             WHERE j.value IS NOT NULL AND j.value != ''",
        )?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    fn referenced_album_ids(&self) -> Result<HashSet<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT album_id FROM tracks WHERE album_id IS NOT NULL AND album_id != ''",
        )?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    fn get_stats(&self) -> Result<ListenStoreStats> {
        let conn = self.conn();
        Ok(ListenStoreStats {
            tracks: Self::count_rows(&conn, "tracks")?,
            plays: Self::count_rows(&conn, "plays")?,
            artists: Self::count_rows(&conn, "artists")?,
            albums: Self::count_rows(&conn, "albums")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn create_tmp_store() -> (SqliteListenStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("listens.db");
        let store = SqliteListenStore::new(&db_path).unwrap();
        (store, temp_dir)
    }

    fn track(id: &str) -> TrackMetadata {
        TrackMetadata {
            track_id: id.to_string(),
            name: format!("Track {}", id),
            artists: vec!["Band".to_string(), "Guest".to_string()],
            artist_ids: vec!["a1".to_string(), "a2".to_string()],
            album: "Record".to_string(),
            album_id: Some("al1".to_string()),
            album_art: Some("https://img/1".to_string()),
            duration_ms: 180_000,
            explicit: Some(false),
            popularity: Some(20),
            disc_number: Some(1),
            track_number: Some(2),
            isrc: None,
        }
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
    }

    fn artist(id: &str) -> Artist {
        Artist {
            artist_id: id.to_string(),
            name: format!("Artist {}", id),
            genres: vec!["rock".to_string()],
            popularity: Some(10),
            image: None,
        }
    }

    #[test]
    fn test_reopen_validates_schema() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("listens.db");
        {
            let store = SqliteListenStore::new(&db_path).unwrap();
            store.upsert_track(&track("t1"), at(12, 0, 0), true).unwrap();
        }
        let store = SqliteListenStore::new(&db_path).unwrap();
        assert!(store.get_track("t1").unwrap().is_some());
    }

    #[test]
    fn test_foreign_database_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("other.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute("CREATE TABLE something (x INTEGER)", []).unwrap();
        }
        assert!(SqliteListenStore::new(&db_path).is_err());
    }

    #[test]
    fn test_upsert_track_increment_semantics() {
        let (store, _dir) = create_tmp_store();

        assert_eq!(
            store.upsert_track(&track("t1"), at(12, 0, 0), true).unwrap(),
            TrackUpsert::Created
        );
        for _ in 0..3 {
            assert_eq!(
                store.upsert_track(&track("t1"), at(12, 5, 0), true).unwrap(),
                TrackUpsert::Updated
            );
        }
        assert_eq!(store.get_track("t1").unwrap().unwrap().listen_count, 4);

        store.upsert_track(&track("t1"), at(12, 6, 0), false).unwrap();
        assert_eq!(store.get_track("t1").unwrap().unwrap().listen_count, 4);
    }

    #[test]
    fn test_metadata_only_upsert_creates_with_zero_count() {
        let (store, _dir) = create_tmp_store();
        store.upsert_track(&track("t1"), at(12, 0, 0), false).unwrap();
        assert_eq!(store.get_track("t1").unwrap().unwrap().listen_count, 0);
    }

    #[test]
    fn test_upsert_overwrites_metadata_and_widens_timestamps() {
        let (store, _dir) = create_tmp_store();
        store.upsert_track(&track("t1"), at(12, 0, 0), true).unwrap();

        let mut renamed = track("t1");
        renamed.name = "Renamed".to_string();
        renamed.popularity = Some(90);
        store.upsert_track(&renamed, at(11, 0, 0), true).unwrap();
        store.upsert_track(&renamed, at(13, 0, 0), true).unwrap();

        let record = store.get_track("t1").unwrap().unwrap();
        assert_eq!(record.metadata.name, "Renamed");
        assert_eq!(record.metadata.popularity, Some(90));
        assert_eq!(record.metadata.artist_ids, vec!["a1", "a2"]);
        assert_eq!(record.first_listened, at(11, 0, 0));
        assert_eq!(record.last_listened, at(13, 0, 0));
    }

    #[test]
    fn test_insert_play_duplicate_minute_is_skipped() {
        let (store, _dir) = create_tmp_store();
        let first = PlayLogEntry::new("t1", at(12, 0, 37), PlaybackContext::default()).unwrap();
        let second = PlayLogEntry::new("t1", at(12, 0, 41), PlaybackContext::default()).unwrap();

        assert_eq!(store.insert_play(&first).unwrap(), PlayInsert::Inserted);
        assert_eq!(store.insert_play(&second).unwrap(), PlayInsert::Duplicate);
        assert_eq!(store.count_plays_for_track("t1").unwrap(), 1);

        let next_minute =
            PlayLogEntry::new("t1", at(12, 1, 0), PlaybackContext::default()).unwrap();
        assert_eq!(store.insert_play(&next_minute).unwrap(), PlayInsert::Inserted);
        assert_eq!(store.count_plays_for_track("t1").unwrap(), 2);
    }

    #[test]
    fn test_duplicate_play_backfills_only_missing_context() {
        let (store, _dir) = create_tmp_store();
        let sparse = PlayLogEntry::new(
            "t1",
            at(12, 0, 41),
            PlaybackContext {
                context_type: Some("album".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        store.insert_play(&sparse).unwrap();

        let rich = PlayLogEntry::new(
            "t1",
            at(12, 0, 37),
            PlaybackContext {
                device_name: Some("Phone".to_string()),
                device_type: Some("Smartphone".to_string()),
                context_type: Some("playlist".to_string()),
                context_uri: Some("spotify:playlist:p1".to_string()),
                shuffle_state: Some(true),
            },
        )
        .unwrap();
        assert_eq!(store.insert_play(&rich).unwrap(), PlayInsert::Duplicate);

        let plays = store.get_plays_for_track("t1").unwrap();
        assert_eq!(plays.len(), 1);
        let context = &plays[0].context;
        assert_eq!(context.device_name.as_deref(), Some("Phone"));
        assert_eq!(context.context_type.as_deref(), Some("album"));
        assert_eq!(context.shuffle_state, Some(true));
        assert_eq!(plays[0].listened_at, at(12, 0, 0));
    }

    #[test]
    fn test_reference_data_insert_and_existing_ids() {
        let (store, _dir) = create_tmp_store();
        assert_eq!(store.insert_artists(&[artist("a1"), artist("a2")]).unwrap(), 2);
        assert_eq!(store.insert_artists(&[artist("a1"), artist("a3")]).unwrap(), 1);

        let existing = store
            .existing_artist_ids(&["a1".to_string(), "a3".to_string(), "a9".to_string()])
            .unwrap();
        assert_eq!(existing.len(), 2);
        assert!(existing.contains("a1") && existing.contains("a3"));
        assert!(store.existing_album_ids(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_referenced_ids_come_from_tracks() {
        let (store, _dir) = create_tmp_store();
        store.upsert_track(&track("t1"), at(12, 0, 0), true).unwrap();
        let mut other = track("t2");
        other.artist_ids = vec!["a2".to_string(), "a3".to_string()];
        other.album_id = None;
        store.upsert_track(&other, at(12, 5, 0), true).unwrap();

        let artists = store.referenced_artist_ids().unwrap();
        assert_eq!(artists.len(), 3);
        let albums = store.referenced_album_ids().unwrap();
        assert_eq!(albums, HashSet::from(["al1".to_string()]));
    }

    #[test]
    fn test_stats() {
        let (store, _dir) = create_tmp_store();
        store.upsert_track(&track("t1"), at(12, 0, 0), true).unwrap();
        store
            .insert_play(&PlayLogEntry::new("t1", at(12, 0, 0), PlaybackContext::default()).unwrap())
            .unwrap();
        store.insert_artists(&[artist("a1")]).unwrap();

        let stats = store.get_stats().unwrap();
        assert_eq!(
            stats,
            ListenStoreStats {
                tracks: 1,
                plays: 1,
                artists: 1,
                albums: 0
            }
        );
    }
}
