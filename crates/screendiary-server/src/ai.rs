// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! Plain HTTP client for OpenAI-compatible `embeddings` and
//! `chat/completions` endpoints. When the embedding endpoint rejects
//! the model outright, embeddings stay disabled for the rest of the
//! process — there is no point hammering a capability that isn't there.

use reqwest::StatusCode;
use screendiary_core::config::AiConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Longest text (in chars) sent to the embedding endpoint.
const EMBED_MAX_CHARS: usize = 8000;

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

pub struct AiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    embeddings_disabled: AtomicBool,
}

impl AiClient {
    pub fn new(config: &AiConfig) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            embeddings_disabled: AtomicBool::new(false),
        }
    }

    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    fn auth_key(&self) -> &str {
        if self.api_key.is_empty() {
            "unused"
        } else {
            &self.api_key
        }
    }

    /// Embed one text. `None` on failure or while self-disabled.
    pub async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        if text.trim().is_empty() {
            return None;
        }
        let texts = [text.to_string()];
        let mut result = self.embed_batch(&texts).await;
        result.pop().flatten()
    }

    /// Embed a batch. The output is index-aligned to the input; failed
    /// or disabled calls yield all-`None`.
    pub async fn embed_batch(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        if self.embeddings_disabled.load(Ordering::Relaxed) || texts.is_empty() {
            return vec![None; texts.len()];
        }

        let request = EmbeddingsRequest {
            model: &self.embedding_model,
            input: texts
                .iter()
                .map(|t| truncate_chars(t, EMBED_MAX_CHARS))
                .collect(),
        };

        let response = self
            .http
            .post(format!("{}/embeddings", self.api_base))
            .bearer_auth(self.auth_key())
            .json(&request)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                error!("embedding request failed: {}", e);
                return vec![None; texts.len()];
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            self.handle_embed_error(status, &body);
            return vec![None; texts.len()];
        }

        match serde_json::from_str::<EmbeddingsResponse>(&body) {
            Ok(parsed) => {
                let mut out: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
                for item in parsed.data {
                    if item.index < out.len() {
                        out[item.index] = Some(item.embedding);
                    }
                }
                out
            }
            Err(e) => {
                error!("embedding response parse failed: {}", e);
                vec![None; texts.len()]
            }
        }
    }

    /// Bad-request-class rejections mean the model cannot embed at all;
    /// self-disable for the process lifetime. Anything else is logged
    /// and retried on the next call.
    fn handle_embed_error(&self, status: StatusCode, body: &str) {
        let lower = body.to_lowercase();
        let permanent = status == StatusCode::BAD_REQUEST
            || lower.contains("does not support")
            || lower.contains("not support embedding")
            || lower.contains("bad request");
        if permanent {
            warn!(
                "embeddings disabled for this run (model {}): {}",
                self.embedding_model,
                truncate_chars(body, 200)
            );
            self.embeddings_disabled.store(true, Ordering::Relaxed);
        } else {
            error!(
                "embedding error ({}): {}",
                status,
                truncate_chars(body, 200)
            );
        }
    }

    #[cfg(test)]
    pub fn embeddings_disabled(&self) -> bool {
        self.embeddings_disabled.load(Ordering::Relaxed)
    }

    /// Chat completion that wants JSON back. Asks for JSON mode first
    /// and retries without it for servers that reject the parameter;
    /// the reply is parsed as JSON or salvaged from the first balanced
    /// `{…}` substring.
    pub async fn chat_json(&self, prompt: &str) -> Option<Value> {
        let content = match self.send_chat(prompt, true).await {
            Ok(content) => content,
            Err(_) => match self.send_chat(prompt, false).await {
                Ok(content) => content,
                Err(e) => {
                    error!("chat request failed: {}", e);
                    return None;
                }
            },
        };

        match salvage_json(&content) {
            Some(value) => Some(value),
            None => {
                warn!("chat reply was not json: {}", truncate_chars(&content, 200));
                None
            }
        }
    }

    async fn send_chat(&self, prompt: &str, json_mode: bool) -> Result<String, anyhow::Error> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.3,
            response_format: json_mode.then(|| json!({"type": "json_object"})),
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(self.auth_key())
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let parsed: ChatResponse = response.json().await?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

/// Parse a model reply as JSON; failing that, try the outermost `{…}`
/// substring. Deeper malformations are not repaired.
pub fn salvage_json(content: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(content) {
        if value.is_object() {
            return Some(value);
        }
    }
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&content[start..=end]).ok()
}

/// Truncate to a char count without splitting a code point.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salvage_plain_json() {
        let value = salvage_json("{\"summary\": \"ok\"}").unwrap();
        assert_eq!(value["summary"], "ok");
    }

    #[test]
    fn test_salvage_json_in_prose() {
        let content = "Here is your answer:\n```json\n{\"blocks\": []}\n``` enjoy";
        let value = salvage_json(content).unwrap();
        assert!(value["blocks"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_salvage_takes_outermost_braces() {
        let content = "x {\"a\": {\"b\": 1}} y";
        let value = salvage_json(content).unwrap();
        assert_eq!(value["a"]["b"], 1);
    }

    #[test]
    fn test_salvage_gives_up_on_garbage() {
        assert!(salvage_json("no braces at all").is_none());
        assert!(salvage_json("{still broken").is_none());
    }

    #[test]
    fn test_truncate_chars_on_boundary() {
        assert_eq!(truncate_chars("häuser", 2), "hä");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_client_defaults() {
        let config = AiConfig::default();
        let client = AiClient::new(&config);
        assert!(!client.embeddings_disabled());
        assert_eq!(client.chat_model(), "gpt-4");
        assert_eq!(client.auth_key(), "unused");
    }
}
