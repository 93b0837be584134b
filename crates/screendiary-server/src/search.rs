// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! Search over everything the recorder has seen: lexical (FTS5 with
//! BM25 ranking) and semantic (cosine similarity over stored embedding
//! vectors).

use anyhow::Result;
use screendiary_db::{blob_to_vector, DatabaseManager, FtsHit, Screenshot};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::ai::AiClient;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub screenshot: Screenshot,
    pub ocr_text: String,
    /// Larger is better. Lexical hits carry −bm25, semantic hits carry
    /// the cosine similarity.
    pub score: f64,
    pub highlights: Vec<String>,
}

pub struct SearchEngine {
    db: Arc<DatabaseManager>,
    ai: Option<Arc<AiClient>>,
}

impl SearchEngine {
    pub fn new(db: Arc<DatabaseManager>, ai: Option<Arc<AiClient>>) -> Self {
        Self { db, ai }
    }

    /// Full-text search. Hits are deduped per screenshot (best rank
    /// wins) and presented best-first with the FTS snippet as
    /// highlight.
    pub async fn text_search(&self, query: &str, limit: i64) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let hits = self.db.search_fts(query, limit).await?;

        let mut best: HashMap<i64, FtsHit> = HashMap::new();
        for hit in hits {
            match best.get(&hit.screenshot_id) {
                Some(existing) if existing.rank <= hit.rank => {}
                _ => {
                    best.insert(hit.screenshot_id, hit);
                }
            }
        }

        let mut results = Vec::with_capacity(best.len());
        for (screenshot_id, hit) in best {
            if let Some(screenshot) = self.db.get_screenshot(screenshot_id).await? {
                results.push(SearchResult {
                    screenshot,
                    ocr_text: hit.text,
                    score: -hit.rank,
                    highlights: if hit.snippet.is_empty() {
                        Vec::new()
                    } else {
                        vec![hit.snippet]
                    },
                });
            }
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(results)
    }

    /// Semantic search over stored vectors. Returns nothing when the
    /// AI subsystem is off or the query cannot be embedded.
    pub async fn semantic_search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let Some(ai) = &self.ai else {
            return Ok(Vec::new());
        };
        let Some(query_vector) = ai.embed(query).await else {
            return Ok(Vec::new());
        };

        let embeddings = self.db.get_all_embeddings().await?;
        if embeddings.is_empty() {
            return Ok(Vec::new());
        }

        // Per-screenshot maximum over its chunk vectors
        let mut scores: HashMap<i64, f64> = HashMap::new();
        for (screenshot_id, blob) in embeddings {
            let vector = blob_to_vector(&blob);
            let similarity = f64::from(cosine_similarity(&query_vector, &vector));
            scores
                .entry(screenshot_id)
                .and_modify(|s| *s = s.max(similarity))
                .or_insert(similarity);
        }

        let mut ranked: Vec<(i64, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(limit);

        let mut results = Vec::with_capacity(ranked.len());
        for (screenshot_id, score) in ranked {
            if let Some(screenshot) = self.db.get_screenshot(screenshot_id).await? {
                let ocr_text = self.db.get_ocr_text(screenshot_id).await?;
                results.push(SearchResult {
                    screenshot,
                    ocr_text,
                    score,
                    highlights: Vec::new(),
                });
            }
        }
        Ok(results)
    }
}

/// Cosine similarity with a zero-norm (and length-mismatch) guard.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm = norm_a * norm_b;
    if norm == 0.0 {
        0.0
    } else {
        dot / norm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use screendiary_db::{NewMonitorCapture, NewOcrResult, NewScreenshot};

    #[test]
    fn test_cosine_similarity_basics() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), -1.0);
    }

    #[test]
    fn test_cosine_zero_norm_guard() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    async fn seed_screenshot(db: &DatabaseManager, second: u32, text: &str) -> i64 {
        let id = db
            .insert_screenshot(&NewScreenshot {
                timestamp: NaiveDate::from_ymd_opt(2026, 8, 1)
                    .unwrap()
                    .and_hms_opt(9, 0, second)
                    .unwrap(),
                date: "2026-08-01".to_string(),
                width: 1920,
                height: 1080,
                file_size: 0,
                similarity: 0.0,
                filepath_thumb: None,
            })
            .await
            .unwrap();
        let mc_id = db
            .insert_monitor_capture(&NewMonitorCapture {
                screenshot_id: id,
                monitor_name: "DP-1".to_string(),
                monitor_index: 0,
                filepath: format!("/frames/monitor0_{}.webp", second),
                x: 0,
                y: 0,
                width: 1920,
                height: 1080,
            })
            .await
            .unwrap();
        db.insert_ocr_result(&NewOcrResult {
            screenshot_id: id,
            monitor_capture_id: mc_id,
            text: text.to_string(),
            language: "deu+eng".to_string(),
            confidence: 90.0,
        })
        .await
        .unwrap();
        id
    }

    #[tokio::test]
    async fn test_text_search_marks_and_ranks() {
        let db = Arc::new(DatabaseManager::new("sqlite::memory:").await.unwrap());
        let id = seed_screenshot(&db, 0, "Settings page shows the API key sk-abc for the staging environment").await;
        seed_screenshot(&db, 2, "Lunch menu for the cafeteria this week").await;

        let engine = SearchEngine::new(db, None);
        let results = engine.text_search("api key", 20).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].screenshot.id, id);
        assert!(results[0].highlights[0].contains("<mark>API</mark> <mark>key</mark>"));
        // Presented score is the negated bm25 rank
        assert!(results[0].score > 0.0);
    }

    #[tokio::test]
    async fn test_text_search_dedupes_per_screenshot() {
        let db = Arc::new(DatabaseManager::new("sqlite::memory:").await.unwrap());
        let id = seed_screenshot(&db, 0, "rust compiler output on the left monitor").await;
        // Second monitor of the same screenshot also mentions the term
        let mc2 = db
            .insert_monitor_capture(&NewMonitorCapture {
                screenshot_id: id,
                monitor_name: "DP-2".to_string(),
                monitor_index: 1,
                filepath: "/frames/monitor1_0.webp".to_string(),
                x: 1920,
                y: 0,
                width: 1920,
                height: 1080,
            })
            .await
            .unwrap();
        db.insert_ocr_result(&NewOcrResult {
            screenshot_id: id,
            monitor_capture_id: mc2,
            text: "rust documentation in the browser".to_string(),
            language: "deu+eng".to_string(),
            confidence: 90.0,
        })
        .await
        .unwrap();

        let engine = SearchEngine::new(db, None);
        let results = engine.text_search("rust", 20).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].screenshot.id, id);
    }

    #[tokio::test]
    async fn test_text_search_blank_query_is_empty() {
        let db = Arc::new(DatabaseManager::new("sqlite::memory:").await.unwrap());
        let engine = SearchEngine::new(db, None);
        assert!(engine.text_search("   ", 20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_semantic_search_without_ai_is_empty() {
        let db = Arc::new(DatabaseManager::new("sqlite::memory:").await.unwrap());
        let engine = SearchEngine::new(db, None);
        assert!(engine.semantic_search("anything", 10).await.unwrap().is_empty());
    }
}
