// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! SQLite catalog: frames, monitors, OCR text and word boxes, window
//! events, embeddings, video segments and day summaries.
//!
//! WAL journal, foreign keys on, 5 s busy timeout. An FTS5 index over
//! `ocr_results.text` is kept in sync by insert/update/delete triggers.
//! Every write method commits before returning; the pool holds a single
//! connection so writes serialize on WAL's own single-writer model.

pub mod types;

use chrono::NaiveDateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub use types::*;

/// Bump when the schema changes. A database written by newer code makes
/// [`DatabaseManager::new`] refuse to start.
pub const SCHEMA_VERSION: i64 = 4;

const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS app_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS screenshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        date TEXT NOT NULL,
        width INTEGER NOT NULL DEFAULT 0,
        height INTEGER NOT NULL DEFAULT 0,
        file_size INTEGER NOT NULL DEFAULT 0,
        similarity REAL NOT NULL DEFAULT 0.0,
        storage_type TEXT NOT NULL DEFAULT 'live',
        segment_path TEXT,
        segment_offset_ms INTEGER,
        filepath_thumb TEXT
    )",
    "CREATE TABLE IF NOT EXISTS monitor_captures (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        screenshot_id INTEGER NOT NULL REFERENCES screenshots(id) ON DELETE CASCADE,
        monitor_name TEXT NOT NULL,
        monitor_index INTEGER NOT NULL,
        filepath TEXT,
        segment_path TEXT,
        segment_offset_ms INTEGER,
        x INTEGER NOT NULL DEFAULT 0,
        y INTEGER NOT NULL DEFAULT 0,
        w INTEGER NOT NULL DEFAULT 0,
        h INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS ocr_results (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        screenshot_id INTEGER NOT NULL REFERENCES screenshots(id) ON DELETE CASCADE,
        monitor_capture_id INTEGER REFERENCES monitor_captures(id) ON DELETE CASCADE,
        text TEXT NOT NULL,
        language TEXT NOT NULL DEFAULT '',
        confidence REAL NOT NULL DEFAULT 0.0
    )",
    "CREATE TABLE IF NOT EXISTS embeddings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        screenshot_id INTEGER NOT NULL REFERENCES screenshots(id) ON DELETE CASCADE,
        vector BLOB NOT NULL,
        model TEXT NOT NULL,
        dimensions INTEGER NOT NULL DEFAULT 0,
        text_hash TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS video_segments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        date TEXT NOT NULL,
        monitor_index INTEGER NOT NULL,
        filepath TEXT NOT NULL,
        start_time TEXT NOT NULL,
        end_time TEXT NOT NULL,
        frame_count INTEGER NOT NULL DEFAULT 0,
        file_size INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS ocr_words (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ocr_result_id INTEGER NOT NULL REFERENCES ocr_results(id) ON DELETE CASCADE,
        monitor_capture_id INTEGER NOT NULL REFERENCES monitor_captures(id) ON DELETE CASCADE,
        word TEXT NOT NULL,
        left_x INTEGER NOT NULL DEFAULT 0,
        top_y INTEGER NOT NULL DEFAULT 0,
        width INTEGER NOT NULL DEFAULT 0,
        height INTEGER NOT NULL DEFAULT 0,
        confidence REAL NOT NULL DEFAULT 0.0
    )",
    "CREATE TABLE IF NOT EXISTS window_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        screenshot_id INTEGER NOT NULL REFERENCES screenshots(id) ON DELETE CASCADE,
        timestamp TEXT NOT NULL,
        app_class TEXT NOT NULL DEFAULT '',
        app_name TEXT NOT NULL DEFAULT '',
        window_title TEXT NOT NULL DEFAULT '',
        desktop_file TEXT NOT NULL DEFAULT '',
        pid INTEGER NOT NULL DEFAULT 0,
        browser_domain TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS activity_day_summaries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        date TEXT NOT NULL UNIQUE,
        summary_text TEXT NOT NULL,
        model TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        event_count INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_window_events_screenshot ON window_events(screenshot_id)",
    "CREATE INDEX IF NOT EXISTS idx_window_events_date ON window_events(timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_window_events_app ON window_events(app_class)",
    "CREATE INDEX IF NOT EXISTS idx_screenshots_timestamp ON screenshots(timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_screenshots_date ON screenshots(date)",
    "CREATE INDEX IF NOT EXISTS idx_screenshots_storage ON screenshots(storage_type)",
    "CREATE INDEX IF NOT EXISTS idx_monitor_captures_screenshot ON monitor_captures(screenshot_id)",
    "CREATE INDEX IF NOT EXISTS idx_ocr_results_screenshot ON ocr_results(screenshot_id)",
    "CREATE INDEX IF NOT EXISTS idx_ocr_words_monitor_capture ON ocr_words(monitor_capture_id)",
    "CREATE INDEX IF NOT EXISTS idx_embeddings_screenshot ON embeddings(screenshot_id)",
    "CREATE INDEX IF NOT EXISTS idx_video_segments_date ON video_segments(date)",
];

const FTS_STATEMENTS: &[&str] = &[
    "CREATE VIRTUAL TABLE IF NOT EXISTS ocr_fts USING fts5(
        text,
        content='ocr_results',
        content_rowid='id',
        tokenize='unicode61 remove_diacritics 2'
    )",
    "CREATE TRIGGER IF NOT EXISTS ocr_fts_insert AFTER INSERT ON ocr_results BEGIN
        INSERT INTO ocr_fts(rowid, text) VALUES (new.id, new.text);
    END",
    "CREATE TRIGGER IF NOT EXISTS ocr_fts_delete AFTER DELETE ON ocr_results BEGIN
        INSERT INTO ocr_fts(ocr_fts, rowid, text) VALUES('delete', old.id, old.text);
    END",
    "CREATE TRIGGER IF NOT EXISTS ocr_fts_update AFTER UPDATE ON ocr_results BEGIN
        INSERT INTO ocr_fts(ocr_fts, rowid, text) VALUES('delete', old.id, old.text);
        INSERT INTO ocr_fts(rowid, text) VALUES (new.id, new.text);
    END",
];

#[derive(Debug)]
pub struct DatabaseManager {
    pub pool: SqlitePool,
}

impl DatabaseManager {
    /// Open (or create) the catalog at `database_url`, e.g.
    /// `sqlite:///path/to/screendiary.db` or `sqlite::memory:`.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_millis(5000));

        // Single connection: WAL reads are cheap and writes must
        // serialize anyway; with more connections `sqlite::memory:`
        // would also hand each one its own empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        for stmt in SCHEMA_STATEMENTS.iter().chain(FTS_STATEMENTS) {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        self.migrate().await?;
        sqlx::query("INSERT OR REPLACE INTO app_meta (key, value) VALUES ('schema_version', ?1)")
            .bind(SCHEMA_VERSION.to_string())
            .execute(&self.pool)
            .await?;
        info!("database initialized (schema v{})", SCHEMA_VERSION);
        Ok(())
    }

    /// Forward-only migrations gated on the stored schema version. A
    /// database written by newer code is refused outright.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT value FROM app_meta WHERE key = 'schema_version'")
                .fetch_optional(&self.pool)
                .await?;
        let current: i64 = stored.and_then(|v| v.parse().ok()).unwrap_or(1);

        if current > SCHEMA_VERSION {
            return Err(sqlx::Error::Configuration(
                format!(
                    "database schema v{} is newer than supported v{}",
                    current, SCHEMA_VERSION
                )
                .into(),
            ));
        }

        // Tables are created idempotently above; the version steps only
        // mark which additions a pre-existing database just picked up.
        if current < 2 {
            info!("schema migration v2: ocr_words");
        }
        if current < 3 {
            info!("schema migration v3: window_events");
        }
        if current < 4 {
            info!("schema migration v4: activity_day_summaries");
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // -- screenshots --------------------------------------------------

    pub async fn insert_screenshot(&self, s: &NewScreenshot) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO screenshots
             (timestamp, date, width, height, file_size, similarity,
              storage_type, segment_path, segment_offset_ms, filepath_thumb)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'live', NULL, NULL, ?7)",
        )
        .bind(format_ts(s.timestamp))
        .bind(&s.date)
        .bind(s.width)
        .bind(s.height)
        .bind(s.file_size)
        .bind(s.similarity)
        .bind(&s.filepath_thumb)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update_screenshot_file_size(
        &self,
        screenshot_id: i64,
        file_size: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE screenshots SET file_size = ?1 WHERE id = ?2")
            .bind(file_size)
            .bind(screenshot_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_screenshot(&self, screenshot_id: i64) -> Result<Option<Screenshot>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM screenshots WHERE id = ?1")
            .bind(screenshot_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_screenshot(&r)).transpose()
    }

    pub async fn get_screenshots(
        &self,
        date: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Screenshot>, sqlx::Error> {
        let rows = match date {
            Some(date) => {
                sqlx::query(
                    "SELECT * FROM screenshots WHERE date = ?1
                     ORDER BY timestamp DESC LIMIT ?2 OFFSET ?3",
                )
                .bind(date)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM screenshots ORDER BY timestamp DESC LIMIT ?1 OFFSET ?2")
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(row_to_screenshot).collect()
    }

    pub async fn get_screenshot_count(&self, date: Option<&str>) -> Result<i64, sqlx::Error> {
        match date {
            Some(date) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM screenshots WHERE date = ?1")
                    .bind(date)
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM screenshots")
                    .fetch_one(&self.pool)
                    .await
            }
        }
    }

    pub async fn get_dates(&self) -> Result<Vec<DateCount>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT date, COUNT(*) FROM screenshots GROUP BY date ORDER BY date DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(date, count)| DateCount { date, count })
            .collect())
    }

    /// Screenshot ids + timestamps for one day, chronological.
    pub async fn get_timeline(&self, date: &str) -> Result<Vec<TimelineEntry>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, timestamp FROM screenshots WHERE date = ?1 ORDER BY timestamp ASC",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(id, ts)| Ok(TimelineEntry { id, timestamp: decode_ts(&ts)? }))
            .collect()
    }

    // -- monitor captures ---------------------------------------------

    pub async fn insert_monitor_capture(&self, mc: &NewMonitorCapture) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO monitor_captures
             (screenshot_id, monitor_name, monitor_index, filepath,
              segment_path, segment_offset_ms, x, y, w, h)
             VALUES (?1, ?2, ?3, ?4, NULL, NULL, ?5, ?6, ?7, ?8)",
        )
        .bind(mc.screenshot_id)
        .bind(&mc.monitor_name)
        .bind(mc.monitor_index)
        .bind(&mc.filepath)
        .bind(mc.x)
        .bind(mc.y)
        .bind(mc.width)
        .bind(mc.height)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_monitor_captures(
        &self,
        screenshot_id: i64,
    ) -> Result<Vec<MonitorCapture>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM monitor_captures WHERE screenshot_id = ?1 ORDER BY monitor_index",
        )
        .bind(screenshot_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_monitor_capture).collect())
    }

    // -- OCR ----------------------------------------------------------

    pub async fn insert_ocr_result(&self, ocr: &NewOcrResult) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO ocr_results
             (screenshot_id, monitor_capture_id, text, language, confidence)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(ocr.screenshot_id)
        .bind(ocr.monitor_capture_id)
        .bind(&ocr.text)
        .bind(&ocr.language)
        .bind(ocr.confidence)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Concatenated OCR text for a screenshot across its monitors.
    pub async fn get_ocr_text(&self, screenshot_id: i64) -> Result<String, sqlx::Error> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT text FROM ocr_results WHERE screenshot_id = ?1 ORDER BY monitor_capture_id",
        )
        .bind(screenshot_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(t,)| t)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }

    /// Bulk insert word boxes in one transaction.
    pub async fn insert_ocr_words(&self, words: &[NewOcrWord]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for w in words {
            sqlx::query(
                "INSERT INTO ocr_words
                 (ocr_result_id, monitor_capture_id, word, left_x, top_y, width, height, confidence)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(w.ocr_result_id)
            .bind(w.monitor_capture_id)
            .bind(&w.word)
            .bind(w.left)
            .bind(w.top)
            .bind(w.width)
            .bind(w.height)
            .bind(w.confidence)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }

    pub async fn get_ocr_words_for_monitor(
        &self,
        monitor_capture_id: i64,
    ) -> Result<Vec<OcrWord>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM ocr_words WHERE monitor_capture_id = ?1 ORDER BY id",
        )
        .bind(monitor_capture_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| OcrWord {
                id: r.get("id"),
                ocr_result_id: r.get("ocr_result_id"),
                monitor_capture_id: r.get("monitor_capture_id"),
                word: r.get("word"),
                left: r.get("left_x"),
                top: r.get("top_y"),
                width: r.get("width"),
                height: r.get("height"),
                confidence: r.get("confidence"),
            })
            .collect())
    }

    // -- FTS search ---------------------------------------------------

    /// BM25-ordered lexical hits (smaller rank = better), snippets marked
    /// up with `<mark>…</mark>` over a 32-token window.
    pub async fn search_fts(&self, query: &str, limit: i64) -> Result<Vec<FtsHit>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT ocr_results.screenshot_id, ocr_results.text,
                    bm25(ocr_fts) AS rank,
                    snippet(ocr_fts, 0, '<mark>', '</mark>', '...', 32) AS snippet
             FROM ocr_fts
             JOIN ocr_results ON ocr_results.id = ocr_fts.rowid
             WHERE ocr_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
        )
        .bind(query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| FtsHit {
                screenshot_id: r.get("screenshot_id"),
                text: r.get("text"),
                rank: r.get("rank"),
                snippet: r.get("snippet"),
            })
            .collect())
    }

    // -- embeddings ---------------------------------------------------

    pub async fn insert_embedding(&self, emb: &NewEmbedding) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO embeddings (screenshot_id, vector, model, dimensions, text_hash)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(emb.screenshot_id)
        .bind(&emb.vector)
        .bind(&emb.model)
        .bind(emb.dimensions)
        .bind(&emb.text_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_all_embeddings(&self) -> Result<Vec<(i64, Vec<u8>)>, sqlx::Error> {
        sqlx::query_as::<_, (i64, Vec<u8>)>("SELECT screenshot_id, vector FROM embeddings")
            .fetch_all(&self.pool)
            .await
    }

    pub async fn has_embedding(
        &self,
        screenshot_id: i64,
        text_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let row: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM embeddings WHERE screenshot_id = ?1 AND text_hash = ?2",
        )
        .bind(screenshot_id)
        .bind(text_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    // -- video segments / archival ------------------------------------

    pub async fn insert_video_segment(&self, seg: &NewVideoSegment) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO video_segments
             (date, monitor_index, filepath, start_time, end_time, frame_count, file_size)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&seg.date)
        .bind(seg.monitor_index)
        .bind(&seg.filepath)
        .bind(format_ts(seg.start_time))
        .bind(format_ts(seg.end_time))
        .bind(seg.frame_count)
        .bind(seg.file_size)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update_screenshot_archived(
        &self,
        screenshot_id: i64,
        segment_path: &str,
        segment_offset_ms: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE screenshots
             SET storage_type = 'archived', segment_path = ?1, segment_offset_ms = ?2
             WHERE id = ?3",
        )
        .bind(segment_path)
        .bind(segment_offset_ms)
        .bind(screenshot_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Flips a monitor capture to the archived tier: live path cleared,
    /// segment reference set — atomically, in one statement.
    pub async fn update_monitor_capture_archived(
        &self,
        monitor_capture_id: i64,
        segment_path: &str,
        segment_offset_ms: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE monitor_captures
             SET filepath = NULL, segment_path = ?1, segment_offset_ms = ?2
             WHERE id = ?3",
        )
        .bind(segment_path)
        .bind(segment_offset_ms)
        .bind(monitor_capture_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Live screenshots strictly older than `before`, ascending.
    pub async fn get_live_screenshots_before(
        &self,
        before: NaiveDateTime,
    ) -> Result<Vec<Screenshot>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM screenshots
             WHERE storage_type = 'live' AND timestamp < ?1
             ORDER BY timestamp ASC",
        )
        .bind(format_ts(before))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_screenshot).collect()
    }

    /// Segment bytes plus live frame bytes.
    pub async fn get_total_storage_bytes(&self) -> Result<i64, sqlx::Error> {
        let archive: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(file_size), 0) FROM video_segments")
                .fetch_one(&self.pool)
                .await?;
        let live: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(file_size), 0) FROM screenshots WHERE storage_type = 'live'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(archive + live)
    }

    pub async fn get_oldest_video_segments(
        &self,
        limit: i64,
    ) -> Result<Vec<VideoSegment>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM video_segments ORDER BY start_time ASC LIMIT ?1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_video_segment).collect()
    }

    pub async fn delete_video_segment(&self, segment_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM video_segments WHERE id = ?1")
            .bind(segment_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -- window events ------------------------------------------------

    pub async fn insert_window_event(&self, event: &NewWindowEvent) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO window_events
             (screenshot_id, timestamp, app_class, app_name,
              window_title, desktop_file, pid, browser_domain)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(event.screenshot_id)
        .bind(format_ts(event.timestamp))
        .bind(&event.app_class)
        .bind(&event.app_name)
        .bind(&event.window_title)
        .bind(&event.desktop_file)
        .bind(event.pid)
        .bind(&event.browser_domain)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// All window events of one day, ascending — the activity deriver's
    /// input.
    pub async fn get_window_events_for_day(
        &self,
        date: &str,
    ) -> Result<Vec<WindowEvent>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM window_events
             WHERE timestamp LIKE ?1 || '%'
             ORDER BY timestamp ASC",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_window_event).collect()
    }

    pub async fn get_window_event_count(&self, date: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM window_events WHERE timestamp LIKE ?1 || '%'")
            .bind(date)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn get_top_apps(&self, date: &str, limit: i64) -> Result<Vec<AppUsage>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (String, String, i64)>(
            "SELECT app_class, app_name, COUNT(*) AS count
             FROM window_events
             WHERE timestamp LIKE ?1 || '%' AND app_class != ''
             GROUP BY app_class
             ORDER BY count DESC LIMIT ?2",
        )
        .bind(date)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(app_class, app_name, count)| AppUsage {
                app_class,
                app_name,
                count,
            })
            .collect())
    }

    pub async fn get_top_window_titles(
        &self,
        date: &str,
        limit: i64,
    ) -> Result<Vec<TitleUsage>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (String, String, i64)>(
            "SELECT window_title, app_class, COUNT(*) AS count
             FROM window_events
             WHERE timestamp LIKE ?1 || '%' AND window_title != ''
             GROUP BY window_title
             ORDER BY count DESC LIMIT ?2",
        )
        .bind(date)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(window_title, app_class, count)| TitleUsage {
                window_title,
                app_class,
                count,
            })
            .collect())
    }

    pub async fn get_top_browser_domains(
        &self,
        date: &str,
        limit: i64,
    ) -> Result<Vec<DomainUsage>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT browser_domain, COUNT(*) AS count
             FROM window_events
             WHERE timestamp LIKE ?1 || '%' AND browser_domain != ''
             GROUP BY browser_domain
             ORDER BY count DESC LIMIT ?2",
        )
        .bind(date)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(browser_domain, count)| DomainUsage {
                browser_domain,
                count,
            })
            .collect())
    }

    // -- day summaries / MOTD -----------------------------------------

    pub async fn get_cached_day_summary(
        &self,
        date: &str,
    ) -> Result<Option<DaySummary>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM activity_day_summaries WHERE date = ?1")
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            Ok(DaySummary {
                date: r.get("date"),
                summary_text: r.get("summary_text"),
                model: r.get("model"),
                created_at: decode_ts(r.get::<String, _>("created_at").as_str())?,
                event_count: r.get("event_count"),
            })
        })
        .transpose()
    }

    pub async fn save_day_summary(
        &self,
        date: &str,
        summary_text: &str,
        model: &str,
        event_count: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR REPLACE INTO activity_day_summaries
             (date, summary_text, model, created_at, event_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(date)
        .bind(summary_text)
        .bind(model)
        .bind(format_ts(chrono::Local::now().naive_local()))
        .bind(event_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_cached_motd(&self, date: &str) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT value FROM app_meta WHERE key = ?1")
            .bind(format!("motd_{}", date))
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn save_motd(&self, date: &str, motd: &str) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT OR REPLACE INTO app_meta (key, value) VALUES (?1, ?2)")
            .bind(format!("motd_{}", date))
            .bind(motd)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -- stats --------------------------------------------------------

    pub async fn get_stats(&self) -> Result<Stats, sqlx::Error> {
        let total = self.get_screenshot_count(None).await?;
        let live: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM screenshots WHERE storage_type = 'live'")
                .fetch_one(&self.pool)
                .await?;
        let archived: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM screenshots WHERE storage_type = 'archived'")
                .fetch_one(&self.pool)
                .await?;
        let ocr_results: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ocr_results")
            .fetch_one(&self.pool)
            .await?;
        let embeddings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
            .fetch_one(&self.pool)
            .await?;
        let video_segments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM video_segments")
            .fetch_one(&self.pool)
            .await?;
        let storage_bytes = self.get_total_storage_bytes().await?;
        Ok(Stats {
            total_screenshots: total,
            live_screenshots: live,
            archived_screenshots: archived,
            ocr_results,
            embeddings,
            video_segments,
            storage_bytes,
            storage_gb: (storage_bytes as f64 / (1024f64 * 1024.0 * 1024.0) * 100.0).round()
                / 100.0,
        })
    }
}

// -- row mapping ------------------------------------------------------

pub fn format_ts(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn decode_ts(s: &str) -> Result<NaiveDateTime, sqlx::Error> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn row_to_screenshot(row: &SqliteRow) -> Result<Screenshot, sqlx::Error> {
    Ok(Screenshot {
        id: row.get("id"),
        timestamp: decode_ts(row.get::<String, _>("timestamp").as_str())?,
        date: row.get("date"),
        width: row.get("width"),
        height: row.get("height"),
        file_size: row.get("file_size"),
        similarity: row.get("similarity"),
        storage_type: StorageType::from_db(row.get::<String, _>("storage_type").as_str()),
        segment_path: row.get("segment_path"),
        segment_offset_ms: row.get("segment_offset_ms"),
        filepath_thumb: row.get("filepath_thumb"),
    })
}

fn row_to_monitor_capture(row: &SqliteRow) -> MonitorCapture {
    MonitorCapture {
        id: row.get("id"),
        screenshot_id: row.get("screenshot_id"),
        monitor_name: row.get("monitor_name"),
        monitor_index: row.get("monitor_index"),
        filepath: row.get("filepath"),
        segment_path: row.get("segment_path"),
        segment_offset_ms: row.get("segment_offset_ms"),
        x: row.get("x"),
        y: row.get("y"),
        width: row.get("w"),
        height: row.get("h"),
    }
}

fn row_to_video_segment(row: &SqliteRow) -> Result<VideoSegment, sqlx::Error> {
    Ok(VideoSegment {
        id: row.get("id"),
        date: row.get("date"),
        monitor_index: row.get("monitor_index"),
        filepath: row.get("filepath"),
        start_time: decode_ts(row.get::<String, _>("start_time").as_str())?,
        end_time: decode_ts(row.get::<String, _>("end_time").as_str())?,
        frame_count: row.get("frame_count"),
        file_size: row.get("file_size"),
    })
}

fn row_to_window_event(row: &SqliteRow) -> Result<WindowEvent, sqlx::Error> {
    Ok(WindowEvent {
        id: row.get("id"),
        screenshot_id: row.get("screenshot_id"),
        timestamp: decode_ts(row.get::<String, _>("timestamp").as_str())?,
        app_class: row.get("app_class"),
        app_name: row.get("app_name"),
        window_title: row.get("window_title"),
        desktop_file: row.get("desktop_file"),
        pid: row.get("pid"),
        browser_domain: row.get("browser_domain"),
    })
}
