// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! OCR + embedding pipeline: a bounded queue feeding a small worker
//! pool. Workers never surface errors to the capture loop; a failed
//! screenshot is logged and dropped.

use image::DynamicImage;
use screendiary_core::text::{chunk_text, content_hash, CHUNK_OVERLAP};
use screendiary_core::Config;
use screendiary_db::{DatabaseManager, NewEmbedding, NewOcrResult, NewOcrWord};
use screendiary_vision::ocr;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};

/// Backpressure bound. The capture loop awaits `enqueue`, so a stalled
/// OCR backlog slows capture instead of growing without limit.
const QUEUE_CAPACITY: usize = 32;

/// One unit of work: a screenshot with its per-monitor images, handed
/// over in memory rather than re-read from disk.
pub struct WorkItem {
    pub screenshot_id: i64,
    pub monitor_images: Vec<(i64, Arc<DynamicImage>)>,
}

pub struct ProcessingPipeline {
    tx: mpsc::Sender<WorkItem>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl ProcessingPipeline {
    pub fn start(
        config: Arc<Config>,
        db: Arc<DatabaseManager>,
        ai: Option<Arc<crate::ai::AiClient>>,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<WorkItem>(QUEUE_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..config.ocr.workers)
            .map(|worker_id| {
                let rx = rx.clone();
                let config = config.clone();
                let db = db.clone();
                let ai = ai.clone();
                tokio::spawn(async move {
                    debug!("pipeline worker {} started", worker_id);
                    loop {
                        let item = rx.lock().await.recv().await;
                        let Some(item) = item else {
                            break;
                        };
                        let screenshot_id = item.screenshot_id;
                        if let Err(e) = process(&config, &db, ai.as_deref(), item).await {
                            error!(
                                "pipeline failed for screenshot {}: {}",
                                screenshot_id, e
                            );
                        }
                    }
                    debug!("pipeline worker {} exited", worker_id);
                })
            })
            .collect();

        info!("pipeline started with {} workers", config.ocr.workers);
        Self { tx, workers }
    }

    /// Queue a screenshot for processing. Applies backpressure when the
    /// queue is full; silently drops work once the pipeline stopped.
    pub async fn enqueue(&self, item: WorkItem) {
        if self.tx.send(item).await.is_err() {
            debug!("pipeline queue closed, dropping work item");
        }
    }

    /// Cancel the workers at their queue-get suspension and join them.
    pub async fn stop(self) {
        drop(self.tx);
        for worker in self.workers {
            worker.abort();
            let _ = worker.await;
        }
        info!("pipeline stopped");
    }
}

async fn process(
    config: &Config,
    db: &DatabaseManager,
    ai: Option<&crate::ai::AiClient>,
    item: WorkItem,
) -> anyhow::Result<()> {
    let mut text_parts: Vec<String> = Vec::new();

    for (monitor_capture_id, image) in &item.monitor_images {
        let output = ocr::ocr_image(image, &config.ocr.languages, config.ocr.psm).await?;
        if output.text.chars().count() < config.ocr.min_text_length {
            continue;
        }

        let ocr_result_id = db
            .insert_ocr_result(&NewOcrResult {
                screenshot_id: item.screenshot_id,
                monitor_capture_id: *monitor_capture_id,
                text: output.text.clone(),
                language: config.ocr.languages.clone(),
                confidence: output.confidence,
            })
            .await?;

        if !output.words.is_empty() {
            let words: Vec<NewOcrWord> = output
                .words
                .iter()
                .map(|w| NewOcrWord {
                    ocr_result_id,
                    monitor_capture_id: *monitor_capture_id,
                    word: w.word.clone(),
                    left: w.left,
                    top: w.top,
                    width: w.width,
                    height: w.height,
                    confidence: w.confidence,
                })
                .collect();
            db.insert_ocr_words(&words).await?;
        }

        text_parts.push(output.text);
    }

    if let Some(ai) = ai {
        if !text_parts.is_empty() {
            embed_screenshot(config, db, ai, item.screenshot_id, &text_parts).await?;
        }
    }

    debug!(
        "screenshot {} processed ({} text parts)",
        item.screenshot_id,
        text_parts.len()
    );
    Ok(())
}

/// Embed the combined OCR text of one screenshot, skipping work when an
/// identical text was already embedded for it.
async fn embed_screenshot(
    config: &Config,
    db: &DatabaseManager,
    ai: &crate::ai::AiClient,
    screenshot_id: i64,
    text_parts: &[String],
) -> anyhow::Result<()> {
    let combined = text_parts.join("\n\n");
    let text_hash = content_hash(&combined);

    if db.has_embedding(screenshot_id, &text_hash).await? {
        return Ok(());
    }

    let chunks = chunk_text(&combined, config.ai.chunk_max_tokens, CHUNK_OVERLAP);
    if chunks.is_empty() {
        return Ok(());
    }

    let vectors = ai.embed_batch(&chunks).await;
    for vector in vectors.into_iter().flatten() {
        db.insert_embedding(&NewEmbedding {
            screenshot_id,
            vector: screendiary_db::vector_to_blob(&vector),
            model: ai.embedding_model().to_string(),
            dimensions: vector.len() as i64,
            text_hash: text_hash.clone(),
        })
        .await?;
    }
    Ok(())
}
