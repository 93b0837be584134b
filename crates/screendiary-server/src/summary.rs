// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! AI day narrative: compact the sessions, build the German prompt,
//! call the chat endpoint and post-process the returned blocks into a
//! clean, non-overlapping 15-minute-grid timeline. Plus the MOTD line.

use chrono::Timelike;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::activity::{compact_sessions, ActivitySession, DayMetrics};
use crate::ai::AiClient;

/// Same-category blocks whose parsed ranges are at most this many
/// minutes apart get merged during post-processing.
const BLOCK_MERGE_GAP_MINUTES: i64 = 2;

static TIME_RANGE_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-–]").unwrap());

/// Round minutes to the nearest multiple of 15, never below 15.
pub fn round_to_quarter_hour(minutes: i64) -> i64 {
    if minutes <= 0 {
        return 15;
    }
    let rounded = ((minutes as f64 / 15.0).round() as i64) * 15;
    rounded.max(15)
}

/// Parse "HH:MM-HH:MM" (hyphen or en-dash) into minutes-of-day.
pub fn parse_time_range(time_range: &str) -> Option<(i64, i64)> {
    let parts: Vec<&str> = TIME_RANGE_SPLIT.split(time_range).collect();
    if parts.len() != 2 {
        return None;
    }
    let parse_clock = |part: &str| -> Option<i64> {
        let mut split = part.trim().split(':');
        let hours: i64 = split.next()?.parse().ok()?;
        let minutes: i64 = split.next()?.parse().ok()?;
        if split.next().is_some() {
            return None;
        }
        Some(hours * 60 + minutes)
    };
    Some((parse_clock(parts[0])?, parse_clock(parts[1])?))
}

pub fn format_time_range(start_min: i64, end_min: i64) -> String {
    format!(
        "{:02}:{:02}-{:02}:{:02}",
        start_min / 60,
        start_min % 60,
        end_min / 60,
        end_min % 60
    )
}

/// Build the day-summary prompt over compacted sessions.
pub fn build_summary_prompt(sessions: &[ActivitySession], metrics: &DayMetrics) -> String {
    let compact = compact_sessions(sessions);

    let session_lines: Vec<String> = compact
        .iter()
        .map(|s| {
            let titles = if s.window_titles.is_empty() {
                "keine Titel".to_string()
            } else {
                s.window_titles
                    .iter()
                    .take(5)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let mut line = format!(
                "- {}-{} [{}] {} ({}min): {}",
                s.start.format("%H:%M"),
                s.end.format("%H:%M"),
                s.category,
                s.app_class,
                s.duration_seconds() / 60,
                titles
            );
            if !s.browser_domains.is_empty() {
                line.push_str(&format!(
                    " | Domains: {}",
                    s.browser_domains
                        .iter()
                        .take(5)
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
            line
        })
        .collect();

    let mut categories: Vec<(&String, &i64)> = metrics.category_seconds.iter().collect();
    categories.sort_by_key(|(_, secs)| -**secs);
    let category_lines: Vec<String> = categories
        .iter()
        .map(|(cat, secs)| format!("  {}: {}h {}m", cat, **secs / 3600, (**secs % 3600) / 60))
        .collect();

    let active_h = metrics.total_active_seconds / 3600;
    let active_m = (metrics.total_active_seconds % 3600) / 60;

    format!(
        r#"Du bist ein Zeiterfassungs-Assistent. Erstelle aus den folgenden Rohdaten eine professionelle Zeiterfassung fuer den Tag.

## Rohdaten (automatisch erfasste Sessions):
{sessions_text}

## Metriken:
- Aktive Zeit: {active_h}h {active_m}m
- Pausen: {break_count} ({break_minutes}min gesamt)

## Kategorien:
{category_text}

## Regeln:
1. **Gruppiere nach TAETIGKEIT, nicht nach App-Kategorie.** "E-Mails pruefen" ist ein Block, "Am Projekt X arbeiten" ist ein Block, "Amazon-Recherche" ist ein Block — auch wenn alles im Browser war.
2. **Keine Ueberlappungen.** Jeder Block beginnt nach dem Ende des vorherigen.
3. **Jeder Block mindestens 15 Minuten.** Sehr kurze Taetigkeiten (<5min) zum passenden Nachbar-Block dazunehmen.
4. **duration_minutes**: Durch 15 teilbar. Auf naechstes 15er-Vielfaches runden (23min->30, 49min->45, 8min->15).
5. **Uhrzeiten minutengenau** (z.B. "06:46-07:12").
6. **Pausen >15min** als eigenen Block mit category "pause".
7. **Beschreibung**: Konkret was getan wurde. Nenne besuchte Websites, bearbeitete Projekte, konkrete Tools.
8. **Typisch 4-10 Bloecke pro Tag.** Nicht alles in einen Block packen, aber auch nicht jede Minute einzeln.

## Beispiel:
Aus diesen Sessions:
  06:46-06:48 firefox (ScreenDiary, NI-Toolbox)
  06:48-06:51 evolution (E-Mails)
  06:51-07:03 firefox (GitHub, Telegram Web, NI-Toolbox)
  07:03-07:14 firefox (Amazon.de)
  07:14-07:25 codium (screendiary/app.py)
  07:25-07:32 konsole (git, npm)

Werden diese Bloecke (gruppiert nach Taetigkeit):
  06:46-06:48 "Tagesbeginn" — ScreenDiary und NI-Toolbox geoeffnet (15min)
  06:48-06:51 "E-Mails" — E-Mail-Pruefung in Evolution (15min)
  06:51-07:03 "Web: interne Tools" — GitHub PRs, Telegram Nachrichten, NI-Toolbox (15min)
  07:03-07:14 "Recherche Amazon" — Produktrecherche auf Amazon.de (15min)
  07:14-07:32 "ScreenDiary Entwicklung" — Coding in codium (app.py), Terminal: git, npm build (30min)

Erstelle eine JSON-Antwort:
{{
  "summary": "Kurze Zusammenfassung des Tages (2-3 Saetze, Deutsch).",
  "blocks": [
    {{
      "time_range": "07:14-07:32",
      "duration_minutes": 30,
      "label": "ScreenDiary Entwicklung",
      "description": "Coding in codium an app.py, danach git-Befehle und npm build im Terminal.",
      "category": "coding"
    }}
  ]
}}

Antworte NUR mit dem JSON, kein anderer Text."#,
        sessions_text = session_lines.join("\n"),
        active_h = active_h,
        active_m = active_m,
        break_count = metrics.break_count,
        break_minutes = metrics.total_break_seconds / 60,
        category_text = category_lines.join("\n"),
    )
}

/// Post-process model blocks: merge adjacent same-category blocks whose
/// parsed ranges touch (gap ≤ 2 min), concatenate their descriptions,
/// then snap every duration to the 15-minute grid and rewrite each
/// `time_range` from the merged bounds.
pub fn postprocess_blocks(mut result: Value) -> Value {
    let Some(blocks) = result.get("blocks").and_then(Value::as_array).cloned() else {
        return result;
    };
    if blocks.is_empty() {
        return result;
    }

    struct ParsedBlock {
        fields: Map<String, Value>,
        range: Option<(i64, i64)>,
    }

    let parsed: Vec<ParsedBlock> = blocks
        .into_iter()
        .map(|block| {
            let fields = block.as_object().cloned().unwrap_or_default();
            let range = fields
                .get("time_range")
                .and_then(Value::as_str)
                .and_then(parse_time_range);
            ParsedBlock { fields, range }
        })
        .collect();

    let mut merged: Vec<ParsedBlock> = Vec::new();
    for block in parsed {
        let Some((start, end)) = block.range else {
            merged.push(block);
            continue;
        };

        if let Some(prev) = merged.last_mut() {
            if let Some((prev_start, prev_end)) = prev.range {
                let same_category = prev.fields.get("category") == block.fields.get("category");
                let gap = start - prev_end;
                if same_category && gap <= BLOCK_MERGE_GAP_MINUTES {
                    let new_end = prev_end.max(end);
                    prev.range = Some((prev_start, new_end));
                    prev.fields.insert(
                        "time_range".to_string(),
                        Value::String(format_time_range(prev_start, new_end)),
                    );

                    let prev_desc = prev
                        .fields
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string();
                    let new_desc = block
                        .fields
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or("");
                    if !new_desc.is_empty() && !prev_desc.contains(new_desc) {
                        let prev_clean = prev_desc.trim_end_matches(['.', ' ']);
                        let new_clean = new_desc.trim_end_matches(['.', ' ']);
                        prev.fields.insert(
                            "description".to_string(),
                            Value::String(format!("{}. {}.", prev_clean, new_clean)),
                        );
                    }
                    continue;
                }
            }
        }
        merged.push(block);
    }

    let final_blocks: Vec<Value> = merged
        .into_iter()
        .map(|mut block| {
            match block.range {
                Some((start, end)) => {
                    block.fields.insert(
                        "duration_minutes".to_string(),
                        Value::from(round_to_quarter_hour(end - start)),
                    );
                    block.fields.insert(
                        "time_range".to_string(),
                        Value::String(format_time_range(start, end)),
                    );
                }
                None => {
                    let minutes = block
                        .fields
                        .get("duration_minutes")
                        .and_then(Value::as_i64)
                        .unwrap_or(0);
                    block.fields.insert(
                        "duration_minutes".to_string(),
                        Value::from(round_to_quarter_hour(minutes)),
                    );
                }
            }
            Value::Object(block.fields)
        })
        .collect();

    result["blocks"] = Value::Array(final_blocks);
    result
}

/// Generate the AI day narrative. `None` when the model fails or the
/// reply cannot be salvaged into JSON — callers treat that as "no
/// summary" and cache nothing.
pub async fn generate_ai_summary(
    client: &AiClient,
    sessions: &[ActivitySession],
    metrics: &DayMetrics,
) -> Option<Value> {
    let prompt = build_summary_prompt(sessions, metrics);
    debug!("day summary prompt: {} chars", prompt.len());
    let result = client.chat_json(&prompt).await?;
    if result.get("blocks").is_some() {
        Some(postprocess_blocks(result))
    } else {
        Some(result)
    }
}

/// Greeting by local hour.
pub fn greeting_for_hour(hour: u32) -> &'static str {
    if hour < 12 {
        "Guten Morgen"
    } else if hour < 17 {
        "Guten Tag"
    } else {
        "Guten Abend"
    }
}

/// Build the MOTD prompt. The output must not mention times or
/// durations — the rules say so explicitly and the summary text it is
/// fed from already had its times stripped into block structure.
pub fn build_motd_prompt(summary_text: Option<&str>, date: &str, hour: u32) -> String {
    let greeting = greeting_for_hour(hour);
    let context = summary_text.unwrap_or("Keine Zusammenfassung vorhanden.");

    format!(
        r#"Erstelle eine kurze, motivierende Tagesnachricht basierend auf der Zusammenfassung des Arbeitstages.

Datum: {date}
Tageszeit-Gruss: {greeting}

## Zusammenfassung des Tages:
{context}

## Regeln:
- Maximal 1-2 Saetze
- Beginne mit "{greeting}!"
- Beziehe dich inhaltlich auf die Taetigkeiten (z.B. Projekte, Themen), NICHT auf Uhrzeiten oder Dauern
- Nenne KEINE Zeiten, Stunden, Minuten oder Dauern
- Freundlich, knapp, motivierend
- Auf Deutsch

Erstelle eine JSON-Antwort:
{{
  "motd": "Die Tagesnachricht hier"
}}

Antworte NUR mit dem JSON."#,
    )
}

/// Generate the message of the day from the cached summary text.
pub async fn generate_motd(
    client: &AiClient,
    summary_text: Option<&str>,
    date: &str,
) -> Option<String> {
    let hour = chrono::Local::now().hour();
    let prompt = build_motd_prompt(summary_text, date, hour);
    let result = client.chat_json(&prompt).await?;
    result
        .get("motd")
        .and_then(Value::as_str)
        .map(str::to_string)
}
