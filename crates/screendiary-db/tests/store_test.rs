// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! Catalog integration tests against `sqlite::memory:`.

use chrono::{NaiveDate, NaiveDateTime};
use screendiary_db::{
    DatabaseManager, NewEmbedding, NewMonitorCapture, NewOcrResult, NewOcrWord, NewScreenshot,
    NewVideoSegment, NewWindowEvent, StorageType,
};

fn ts(h: u32, m: u32, s: u32, micro: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 8, 1)
        .unwrap()
        .and_hms_micro_opt(h, m, s, micro)
        .unwrap()
}

async fn setup() -> DatabaseManager {
    DatabaseManager::new("sqlite::memory:").await.unwrap()
}

async fn insert_screenshot(db: &DatabaseManager, timestamp: NaiveDateTime, file_size: i64) -> i64 {
    db.insert_screenshot(&NewScreenshot {
        timestamp,
        date: "2026-08-01".to_string(),
        width: 3840,
        height: 1080,
        file_size,
        similarity: 0.5,
        filepath_thumb: Some("/data/screenshots/2026/08/01/thumb_090000_000000.webp".to_string()),
    })
    .await
    .unwrap()
}

async fn insert_capture(db: &DatabaseManager, screenshot_id: i64, index: i64) -> i64 {
    db.insert_monitor_capture(&NewMonitorCapture {
        screenshot_id,
        monitor_name: format!("DP-{}", index + 1),
        monitor_index: index,
        filepath: format!(
            "/data/screenshots/2026/08/01/monitor{}_090000_000000.webp",
            index
        ),
        x: index * 1920,
        y: 0,
        width: 1920,
        height: 1080,
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_screenshot_roundtrip_with_microseconds() {
    let db = setup().await;
    let captured = ts(9, 30, 15, 123456);
    let id = insert_screenshot(&db, captured, 4096).await;

    let s = db.get_screenshot(id).await.unwrap().unwrap();
    assert_eq!(s.timestamp, captured);
    assert_eq!(s.date, "2026-08-01");
    assert_eq!(s.storage_type, StorageType::Live);
    assert!(s.segment_path.is_none());
    assert!(s.filepath_thumb.is_some());
}

#[tokio::test]
async fn test_monitor_captures_ordered_by_index() {
    let db = setup().await;
    let id = insert_screenshot(&db, ts(9, 0, 0, 0), 0).await;
    // Insert out of order
    insert_capture(&db, id, 1).await;
    insert_capture(&db, id, 0).await;

    let captures = db.get_monitor_captures(id).await.unwrap();
    assert_eq!(captures.len(), 2);
    assert_eq!(captures[0].monitor_index, 0);
    assert_eq!(captures[1].monitor_index, 1);
    assert!(captures[0].filepath.is_some());
    assert!(captures[0].segment_path.is_none());
}

#[tokio::test]
async fn test_archival_flip_clears_live_path() {
    let db = setup().await;
    let id = insert_screenshot(&db, ts(9, 0, 0, 0), 1000).await;
    let mc_id = insert_capture(&db, id, 0).await;

    let segment = "/data/archive/2026/08/01/monitor0_0900-0905.mp4";
    db.update_monitor_capture_archived(mc_id, segment, 4000)
        .await
        .unwrap();
    db.update_screenshot_archived(id, segment, 4000).await.unwrap();

    let s = db.get_screenshot(id).await.unwrap().unwrap();
    assert_eq!(s.storage_type, StorageType::Archived);
    assert_eq!(s.segment_path.as_deref(), Some(segment));
    assert_eq!(s.segment_offset_ms, Some(4000));

    let mc = &db.get_monitor_captures(id).await.unwrap()[0];
    assert!(mc.filepath.is_none());
    assert_eq!(mc.segment_path.as_deref(), Some(segment));
    assert_eq!(mc.segment_offset_ms, Some(4000));
}

#[tokio::test]
async fn test_live_before_is_strict_and_ascending() {
    let db = setup().await;
    let cutoff = ts(9, 10, 0, 0);
    let before = insert_screenshot(&db, ts(9, 5, 0, 0), 0).await;
    let _at_cutoff = insert_screenshot(&db, cutoff, 0).await;
    let earliest = insert_screenshot(&db, ts(9, 0, 0, 0), 0).await;

    let live = db.get_live_screenshots_before(cutoff).await.unwrap();
    let ids: Vec<i64> = live.iter().map(|s| s.id).collect();
    // Strictly before the cutoff, oldest first
    assert_eq!(ids, vec![earliest, before]);

    // Archived rows drop out of the candidate set
    db.update_screenshot_archived(earliest, "/a.mp4", 0).await.unwrap();
    let live = db.get_live_screenshots_before(cutoff).await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, before);
}

#[tokio::test]
async fn test_fts_search_marks_terms() {
    let db = setup().await;
    let id = insert_screenshot(&db, ts(9, 0, 0, 0), 0).await;
    let mc_id = insert_capture(&db, id, 0).await;
    db.insert_ocr_result(&NewOcrResult {
        screenshot_id: id,
        monitor_capture_id: mc_id,
        text: "Terminal output shows the API key sk-abc was rotated today".to_string(),
        language: "deu+eng".to_string(),
        confidence: 91.0,
    })
    .await
    .unwrap();

    let hits = db.search_fts("api key", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].screenshot_id, id);
    assert!(hits[0].snippet.contains("<mark>API</mark> <mark>key</mark>"));
    // bm25 ranks are better-is-smaller; with one hit just check it's finite
    assert!(hits[0].rank.is_finite());
}

#[tokio::test]
async fn test_fts_triggers_follow_updates_and_deletes() {
    let db = setup().await;
    let id = insert_screenshot(&db, ts(9, 0, 0, 0), 0).await;
    let mc_id = insert_capture(&db, id, 0).await;
    let ocr_id = db
        .insert_ocr_result(&NewOcrResult {
            screenshot_id: id,
            monitor_capture_id: mc_id,
            text: "ephemeral quokka content".to_string(),
            language: String::new(),
            confidence: 80.0,
        })
        .await
        .unwrap();

    assert_eq!(db.search_fts("quokka", 10).await.unwrap().len(), 1);

    sqlx::query("UPDATE ocr_results SET text = 'replaced wombat content' WHERE id = ?1")
        .bind(ocr_id)
        .execute(&db.pool)
        .await
        .unwrap();
    assert!(db.search_fts("quokka", 10).await.unwrap().is_empty());
    assert_eq!(db.search_fts("wombat", 10).await.unwrap().len(), 1);

    sqlx::query("DELETE FROM ocr_results WHERE id = ?1")
        .bind(ocr_id)
        .execute(&db.pool)
        .await
        .unwrap();
    assert!(db.search_fts("wombat", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_embedding_hash_dedup() {
    let db = setup().await;
    let id = insert_screenshot(&db, ts(9, 0, 0, 0), 0).await;

    assert!(!db.has_embedding(id, "abcd1234").await.unwrap());
    db.insert_embedding(&NewEmbedding {
        screenshot_id: id,
        vector: screendiary_db::vector_to_blob(&[0.1, 0.2, 0.3]),
        model: "text-embedding-3-small".to_string(),
        dimensions: 3,
        text_hash: "abcd1234".to_string(),
    })
    .await
    .unwrap();
    assert!(db.has_embedding(id, "abcd1234").await.unwrap());
    assert!(!db.has_embedding(id, "ffff0000").await.unwrap());

    let all = db.get_all_embeddings().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(screendiary_db::blob_to_vector(&all[0].1), vec![0.1, 0.2, 0.3]);
}

#[tokio::test]
async fn test_storage_totals_and_oldest_segments() {
    let db = setup().await;
    insert_screenshot(&db, ts(9, 0, 0, 0), 500).await;
    insert_screenshot(&db, ts(9, 0, 2, 0), 700).await;

    let newer = db
        .insert_video_segment(&NewVideoSegment {
            date: "2026-08-01".to_string(),
            monitor_index: 0,
            filepath: "/data/archive/2026/08/01/monitor0_0905-0910.mp4".to_string(),
            start_time: ts(9, 5, 0, 0),
            end_time: ts(9, 10, 0, 0),
            frame_count: 150,
            file_size: 10_000,
        })
        .await
        .unwrap();
    let older = db
        .insert_video_segment(&NewVideoSegment {
            date: "2026-08-01".to_string(),
            monitor_index: 0,
            filepath: "/data/archive/2026/08/01/monitor0_0900-0905.mp4".to_string(),
            start_time: ts(9, 0, 0, 0),
            end_time: ts(9, 5, 0, 0),
            frame_count: 150,
            file_size: 20_000,
        })
        .await
        .unwrap();

    assert_eq!(db.get_total_storage_bytes().await.unwrap(), 31_200);

    let oldest = db.get_oldest_video_segments(1).await.unwrap();
    assert_eq!(oldest.len(), 1);
    assert_eq!(oldest[0].id, older);

    db.delete_video_segment(older).await.unwrap();
    let remaining = db.get_oldest_video_segments(10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, newer);
    assert_eq!(db.get_total_storage_bytes().await.unwrap(), 11_200);
}

#[tokio::test]
async fn test_window_events_day_queries() {
    let db = setup().await;
    let id = insert_screenshot(&db, ts(9, 0, 0, 0), 0).await;

    for (h, app, title, domain) in [
        (9, "firefox", "GitHub", "github.com"),
        (9, "firefox", "GitHub", "github.com"),
        (10, "codium", "main.rs", ""),
    ] {
        db.insert_window_event(&NewWindowEvent {
            screenshot_id: id,
            timestamp: ts(h, 0, 0, 0),
            app_class: app.to_string(),
            app_name: app.to_string(),
            window_title: title.to_string(),
            desktop_file: format!("org.example.{}", app),
            pid: 4242,
            browser_domain: domain.to_string(),
        })
        .await
        .unwrap();
    }

    let events = db.get_window_events_for_day("2026-08-01").await.unwrap();
    assert_eq!(events.len(), 3);
    assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(db.get_window_event_count("2026-08-01").await.unwrap(), 3);
    assert_eq!(db.get_window_event_count("2026-08-02").await.unwrap(), 0);

    let apps = db.get_top_apps("2026-08-01", 10).await.unwrap();
    assert_eq!(apps[0].app_class, "firefox");
    assert_eq!(apps[0].count, 2);

    let domains = db.get_top_browser_domains("2026-08-01", 10).await.unwrap();
    assert_eq!(domains.len(), 1);
    assert_eq!(domains[0].browser_domain, "github.com");
}

#[tokio::test]
async fn test_ocr_words_bulk_roundtrip() {
    let db = setup().await;
    let id = insert_screenshot(&db, ts(9, 0, 0, 0), 0).await;
    let mc_id = insert_capture(&db, id, 0).await;
    let ocr_id = db
        .insert_ocr_result(&NewOcrResult {
            screenshot_id: id,
            monitor_capture_id: mc_id,
            text: "hello world".to_string(),
            language: "deu+eng".to_string(),
            confidence: 88.5,
        })
        .await
        .unwrap();

    let words = vec![
        NewOcrWord {
            ocr_result_id: ocr_id,
            monitor_capture_id: mc_id,
            word: "hello".to_string(),
            left: 10,
            top: 20,
            width: 80,
            height: 24,
            confidence: 90.0,
        },
        NewOcrWord {
            ocr_result_id: ocr_id,
            monitor_capture_id: mc_id,
            word: "world".to_string(),
            left: 100,
            top: 20,
            width: 84,
            height: 24,
            confidence: 87.0,
        },
    ];
    db.insert_ocr_words(&words).await.unwrap();

    let stored = db.get_ocr_words_for_monitor(mc_id).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].word, "hello");
    assert_eq!(stored[1].left, 100);

    assert_eq!(db.get_ocr_text(id).await.unwrap(), "hello world");
}

#[tokio::test]
async fn test_cascade_delete_cleans_children() {
    let db = setup().await;
    let id = insert_screenshot(&db, ts(9, 0, 0, 0), 0).await;
    let mc_id = insert_capture(&db, id, 0).await;
    db.insert_ocr_result(&NewOcrResult {
        screenshot_id: id,
        monitor_capture_id: mc_id,
        text: "cascade target".to_string(),
        language: String::new(),
        confidence: 50.0,
    })
    .await
    .unwrap();

    sqlx::query("DELETE FROM screenshots WHERE id = ?1")
        .bind(id)
        .execute(&db.pool)
        .await
        .unwrap();

    assert!(db.get_monitor_captures(id).await.unwrap().is_empty());
    assert!(db.get_ocr_text(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_day_summary_upsert_and_motd() {
    let db = setup().await;

    assert!(db.get_cached_day_summary("2026-08-01").await.unwrap().is_none());
    db.save_day_summary("2026-08-01", "{\"summary\":\"v1\"}", "gpt-4", 100)
        .await
        .unwrap();
    db.save_day_summary("2026-08-01", "{\"summary\":\"v2\"}", "gpt-4", 140)
        .await
        .unwrap();

    let cached = db.get_cached_day_summary("2026-08-01").await.unwrap().unwrap();
    assert_eq!(cached.summary_text, "{\"summary\":\"v2\"}");
    assert_eq!(cached.event_count, 140);

    assert!(db.get_cached_motd("2026-08-01").await.unwrap().is_none());
    db.save_motd("2026-08-01", "Guten Morgen! Weiter so.").await.unwrap();
    assert_eq!(
        db.get_cached_motd("2026-08-01").await.unwrap().as_deref(),
        Some("Guten Morgen! Weiter so.")
    );
}

#[tokio::test]
async fn test_stats_counts() {
    let db = setup().await;
    let a = insert_screenshot(&db, ts(9, 0, 0, 0), 100).await;
    insert_screenshot(&db, ts(9, 0, 2, 0), 100).await;
    db.update_screenshot_archived(a, "/seg.mp4", 0).await.unwrap();

    let stats = db.get_stats().await.unwrap();
    assert_eq!(stats.total_screenshots, 2);
    assert_eq!(stats.live_screenshots, 1);
    assert_eq!(stats.archived_screenshots, 1);
    assert_eq!(stats.storage_bytes, 100);
}

#[tokio::test]
async fn test_newer_schema_is_refused() {
    let dir = tempfile::TempDir::new().unwrap();
    let url = format!("sqlite:{}", dir.path().join("screendiary.db").display());

    {
        let db = DatabaseManager::new(&url).await.unwrap();
        sqlx::query("UPDATE app_meta SET value = '99' WHERE key = 'schema_version'")
            .execute(&db.pool)
            .await
            .unwrap();
        db.close().await;
    }

    let err = DatabaseManager::new(&url).await.unwrap_err();
    assert!(err.to_string().contains("newer"));
}

#[tokio::test]
async fn test_timeline_and_dates() {
    let db = setup().await;
    insert_screenshot(&db, ts(9, 0, 2, 0), 0).await;
    insert_screenshot(&db, ts(9, 0, 0, 0), 0).await;

    let timeline = db.get_timeline("2026-08-01").await.unwrap();
    assert_eq!(timeline.len(), 2);
    assert!(timeline[0].timestamp < timeline[1].timestamp);

    let dates = db.get_dates().await.unwrap();
    assert_eq!(dates.len(), 1);
    assert_eq!(dates[0].date, "2026-08-01");
    assert_eq!(dates[0].count, 2);
}
