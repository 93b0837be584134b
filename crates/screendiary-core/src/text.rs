// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! Text helpers shared by the embedding pipeline and search.

use sha2::{Digest, Sha256};

/// Word-overlap between consecutive chunks.
pub const CHUNK_OVERLAP: usize = 50;

/// Short content hash used to dedup re-embeddings of identical text.
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..16].to_string()
}

/// Split text into overlapping chunks of at most `max_tokens` words.
///
/// Texts that fit in a single chunk are returned whole. Each subsequent
/// chunk re-starts `overlap` words before the end of the previous one.
pub fn chunk_text(text: &str, max_tokens: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    if words.len() <= max_tokens {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < words.len() {
        let end = (start + max_tokens).min(words.len());
        chunks.push(words[start..end].join(" "));
        start = end.saturating_sub(overlap);
        if start + overlap >= words.len() {
            break;
        }
    }
    chunks
}
