// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! Deterministic activity derivation: window events → merged sessions,
//! breaks between them, and day-level metrics. Everything here is a
//! pure transformation over an already-sorted event list.

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use screendiary_db::{format_ts, WindowEvent};
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::HashMap;

/// Events of the same app class merge while the inter-event gap stays
/// at or under this many seconds.
pub const DEFAULT_GAP_THRESHOLD_SECONDS: i64 = 30;

/// Gaps at or above this count as a break.
pub const DEFAULT_MIN_BREAK_SECONDS: i64 = 300;

/// Unique window titles kept per session.
const SESSION_TITLE_CAP: usize = 10;

/// Compaction: same-category neighbours merge under this gap.
const COMPACT_GAP_SECONDS: i64 = 300;
/// Compaction: sessions shorter than this get absorbed by a neighbour.
const MICRO_SESSION_SECONDS: i64 = 30;
/// Compaction keeps fewer titles than raw sessions do.
const COMPACT_TITLE_CAP: usize = 8;

/// Keyword table, category by category. Direct matches win over
/// substring matches; anything unmatched lands in "other".
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "coding",
        &[
            "code", "codium", "vscodium", "neovim", "nvim", "vim", "kate", "zed", "jetbrains",
            "pycharm", "webstorm", "intellij", "clion", "goland", "rider", "phpstorm", "rustrover",
            "sublime", "atom", "gedit",
        ],
    ),
    (
        "terminal",
        &[
            "konsole",
            "alacritty",
            "kitty",
            "wezterm",
            "foot",
            "gnome-terminal",
            "xterm",
            "terminator",
            "tilix",
            "yakuake",
        ],
    ),
    (
        "browser",
        &[
            "firefox",
            "librewolf",
            "chromium",
            "google-chrome",
            "brave",
            "vivaldi",
            "opera",
            "epiphany",
            "midori",
            "zen",
        ],
    ),
    (
        "communication",
        &[
            "thunderbird",
            "discord",
            "telegram",
            "signal",
            "slack",
            "element",
            "teams",
            "zoom",
            "skype",
            "matrix",
            "nheko",
        ],
    ),
    (
        "media",
        &[
            "mpv",
            "vlc",
            "spotify",
            "gwenview",
            "elisa",
            "audacious",
            "celluloid",
            "totem",
            "rhythmbox",
            "eog",
            "loupe",
        ],
    ),
    (
        "files",
        &["dolphin", "nautilus", "thunar", "nemo", "pcmanfm", "ranger"],
    ),
    (
        "office",
        &[
            "libreoffice",
            "okular",
            "evince",
            "zathura",
            "calibre",
            "xournalpp",
        ],
    ),
];

/// keyword → category, in declaration order (substring scan relies on it).
static KEYWORD_LIST: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    CATEGORY_KEYWORDS
        .iter()
        .flat_map(|(category, keywords)| keywords.iter().map(|kw| (*kw, *category)))
        .collect()
});

static KEYWORD_MAP: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| KEYWORD_LIST.iter().copied().collect());

/// Map an app class to its category.
pub fn categorize_app(app_class: &str) -> &'static str {
    let lower = app_class.to_lowercase();
    if let Some(category) = KEYWORD_MAP.get(lower.as_str()) {
        return category;
    }
    for (keyword, category) in KEYWORD_LIST.iter() {
        if lower.contains(keyword) {
            return category;
        }
    }
    "other"
}

/// Contiguous run of same-app-class window events.
#[derive(Debug, Clone, Serialize)]
pub struct ActivitySession {
    pub app_class: String,
    pub category: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub window_titles: Vec<String>,
    pub browser_domains: Vec<String>,
    pub event_count: i64,
}

impl ActivitySession {
    pub fn duration_seconds(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }

    fn from_event(event: &WindowEvent) -> Self {
        Self {
            app_class: event.app_class.clone(),
            category: categorize_app(&event.app_class).to_string(),
            start: event.timestamp,
            end: event.timestamp,
            window_titles: if event.window_title.is_empty() {
                Vec::new()
            } else {
                vec![event.window_title.clone()]
            },
            browser_domains: if event.browser_domain.is_empty() {
                Vec::new()
            } else {
                vec![event.browser_domain.clone()]
            },
            event_count: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityBreak {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ActivityBreak {
    pub fn duration_seconds(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DayMetrics {
    pub total_active_seconds: i64,
    pub first_activity: String,
    pub last_activity: String,
    pub total_break_seconds: i64,
    pub break_count: i64,
    pub category_seconds: BTreeMap<String, i64>,
}

/// Merge raw window events into sessions. Events must be sorted by
/// timestamp ascending. A session extends while the app class matches
/// and the gap stays within the threshold.
pub fn merge_sessions(events: &[WindowEvent], gap_threshold_seconds: i64) -> Vec<ActivitySession> {
    let Some(first) = events.first() else {
        return Vec::new();
    };

    let mut sessions = Vec::new();
    let mut session = ActivitySession::from_event(first);

    for event in &events[1..] {
        let gap_ms = (event.timestamp - session.end).num_milliseconds();
        if event.app_class == session.app_class && gap_ms <= gap_threshold_seconds * 1000 {
            session.end = event.timestamp;
            session.event_count += 1;
            if !event.window_title.is_empty()
                && !session.window_titles.contains(&event.window_title)
                && session.window_titles.len() < SESSION_TITLE_CAP
            {
                session.window_titles.push(event.window_title.clone());
            }
            if !event.browser_domain.is_empty()
                && !session.browser_domains.contains(&event.browser_domain)
            {
                session.browser_domains.push(event.browser_domain.clone());
            }
        } else {
            sessions.push(std::mem::replace(
                &mut session,
                ActivitySession::from_event(event),
            ));
        }
    }

    sessions.push(session);
    sessions
}

/// One break per inter-session gap of at least `min_break_seconds`.
pub fn detect_breaks(sessions: &[ActivitySession], min_break_seconds: i64) -> Vec<ActivityBreak> {
    sessions
        .windows(2)
        .filter_map(|pair| {
            let gap_ms = (pair[1].start - pair[0].end).num_milliseconds();
            if gap_ms >= min_break_seconds * 1000 {
                Some(ActivityBreak {
                    start: pair[0].end,
                    end: pair[1].start,
                })
            } else {
                None
            }
        })
        .collect()
}

/// Day-level totals across sessions and breaks.
pub fn compute_metrics(sessions: &[ActivitySession], breaks: &[ActivityBreak]) -> DayMetrics {
    let (Some(first), Some(last)) = (sessions.first(), sessions.last()) else {
        return DayMetrics::default();
    };

    let mut category_seconds: BTreeMap<String, i64> = BTreeMap::new();
    for session in sessions {
        *category_seconds.entry(session.category.clone()).or_insert(0) +=
            session.duration_seconds();
    }

    DayMetrics {
        total_active_seconds: sessions.iter().map(|s| s.duration_seconds()).sum(),
        first_activity: format_ts(first.start),
        last_activity: format_ts(last.end),
        total_break_seconds: breaks.iter().map(|b| b.duration_seconds()).sum(),
        break_count: breaks.len() as i64,
        category_seconds,
    }
}

fn absorb(dst: &mut ActivitySession, src: &ActivitySession) {
    if src.end > dst.end {
        dst.end = src.end;
    }
    if src.start < dst.start {
        dst.start = src.start;
    }
    dst.event_count += src.event_count;
    for title in &src.window_titles {
        if !dst.window_titles.contains(title) && dst.window_titles.len() < COMPACT_TITLE_CAP {
            dst.window_titles.push(title.clone());
        }
    }
    for domain in &src.browser_domains {
        if !dst.browser_domains.contains(domain) {
            dst.browser_domains.push(domain.clone());
        }
    }
}

/// Compact sessions for the narrative prompt: merge same-category
/// neighbours under a 5-minute gap, then fold micro-sessions into their
/// left neighbour, then into their right. Turns hundreds of
/// micro-sessions into a few dozen readable blocks.
pub fn compact_sessions(sessions: &[ActivitySession]) -> Vec<ActivitySession> {
    let Some(first) = sessions.first() else {
        return Vec::new();
    };

    let mut merged: Vec<ActivitySession> = vec![first.clone()];
    for session in &sessions[1..] {
        let current = merged.last_mut().expect("merged is never empty");
        let gap = (session.start - current.end).num_seconds();
        if session.category == current.category && gap < COMPACT_GAP_SECONDS {
            absorb(current, session);
        } else {
            merged.push(session.clone());
        }
    }

    if merged.len() <= 1 {
        return merged;
    }

    let mut folded: Vec<ActivitySession> = Vec::new();
    for session in merged {
        match folded.last_mut() {
            Some(last) if session.duration_seconds() < MICRO_SESSION_SECONDS => {
                absorb(last, &session);
            }
            _ => folded.push(session),
        }
    }

    // Leading micro-sessions could not fold left; fold them rightwards.
    let mut cleaned: Vec<ActivitySession> = Vec::new();
    let mut i = 0;
    while i < folded.len() {
        let is_micro = folded[i].duration_seconds() < MICRO_SESSION_SECONDS;
        if is_micro && !cleaned.is_empty() {
            let src = folded[i].clone();
            absorb(cleaned.last_mut().expect("cleaned is non-empty"), &src);
        } else if is_micro && i + 1 < folded.len() {
            let (left, right) = folded.split_at_mut(i + 1);
            absorb(&mut right[0], &left[i]);
        } else {
            cleaned.push(folded[i].clone());
        }
        i += 1;
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 8, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn event(timestamp: NaiveDateTime, app_class: &str, title: &str, domain: &str) -> WindowEvent {
        WindowEvent {
            id: 0,
            screenshot_id: 0,
            timestamp,
            app_class: app_class.to_string(),
            app_name: app_class.to_string(),
            window_title: title.to_string(),
            desktop_file: String::new(),
            pid: 0,
            browser_domain: domain.to_string(),
        }
    }

    fn session(app: &str, start: NaiveDateTime, end: NaiveDateTime) -> ActivitySession {
        ActivitySession {
            app_class: app.to_string(),
            category: categorize_app(app).to_string(),
            start,
            end,
            window_titles: Vec::new(),
            browser_domains: Vec::new(),
            event_count: 1,
        }
    }

    #[test]
    fn test_categorize_direct_before_substring() {
        assert_eq!(categorize_app("firefox"), "browser");
        assert_eq!(categorize_app("Konsole"), "terminal");
        // "codium" hits the direct entry, not the "code" substring scan
        assert_eq!(categorize_app("codium"), "coding");
        // substring: "org.kde.dolphin" contains "dolphin"
        assert_eq!(categorize_app("org.kde.dolphin"), "files");
        assert_eq!(categorize_app("some-unknown-app"), "other");
        assert_eq!(categorize_app(""), "other");
    }

    #[test]
    fn test_merge_gap_boundary() {
        // 30 s gap merges, 31 s gap splits
        let events = vec![
            event(ts(9, 0, 0), "codium", "a.rs", ""),
            event(ts(9, 0, 30), "codium", "b.rs", ""),
            event(ts(9, 1, 1), "codium", "c.rs", ""),
        ];
        let sessions = merge_sessions(&events, DEFAULT_GAP_THRESHOLD_SECONDS);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].start, ts(9, 0, 0));
        assert_eq!(sessions[0].end, ts(9, 0, 30));
        assert_eq!(sessions[0].event_count, 2);
        assert_eq!(sessions[1].start, ts(9, 1, 1));
        assert_eq!(sessions[1].end, ts(9, 1, 1));
    }

    #[test]
    fn test_merge_splits_on_app_change() {
        let events = vec![
            event(ts(9, 0, 0), "codium", "main.rs", ""),
            event(ts(9, 0, 2), "firefox", "GitHub", "github.com"),
            event(ts(9, 0, 4), "codium", "main.rs", ""),
        ];
        let sessions = merge_sessions(&events, 30);
        assert_eq!(sessions.len(), 3);
        assert_eq!(sessions[1].category, "browser");
        assert_eq!(sessions[1].browser_domains, vec!["github.com"]);
    }

    #[test]
    fn test_merge_dedupes_and_caps_titles() {
        let mut events = Vec::new();
        for i in 0..15 {
            events.push(event(ts(9, 0, i), "codium", &format!("file{}.rs", i), ""));
        }
        // Repeat an already-seen title
        events.push(event(ts(9, 0, 16), "codium", "file0.rs", ""));

        let sessions = merge_sessions(&events, 30);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].window_titles.len(), 10);
        assert_eq!(sessions[0].event_count, 16);
    }

    #[test]
    fn test_merge_is_idempotent_on_session_bounds() {
        let events = vec![
            event(ts(9, 0, 0), "codium", "a.rs", ""),
            event(ts(9, 0, 10), "codium", "b.rs", ""),
            event(ts(9, 5, 0), "firefox", "GitHub", "github.com"),
        ];
        let sessions = merge_sessions(&events, 30);

        // Rebuild events from each session's endpoints; merging again
        // must reproduce the same sessions.
        let mut rebuilt = Vec::new();
        for s in &sessions {
            rebuilt.push(event(s.start, &s.app_class, "", ""));
            if s.end != s.start {
                rebuilt.push(event(s.end, &s.app_class, "", ""));
            }
        }
        let remerged = merge_sessions(&rebuilt, 30);
        assert_eq!(remerged.len(), sessions.len());
        for (a, b) in remerged.iter().zip(&sessions) {
            assert_eq!(a.app_class, b.app_class);
            assert_eq!(a.start, b.start);
            assert_eq!(a.end, b.end);
        }
    }

    #[test]
    fn test_detect_breaks_threshold() {
        let sessions = vec![
            session("codium", ts(9, 0, 0), ts(9, 10, 0)),
            // 299 s gap: no break
            session("codium", ts(9, 14, 59), ts(9, 20, 0)),
            // 300 s gap: break
            session("firefox", ts(9, 25, 0), ts(9, 30, 0)),
        ];
        let breaks = detect_breaks(&sessions, DEFAULT_MIN_BREAK_SECONDS);
        assert_eq!(breaks.len(), 1);
        assert_eq!(breaks[0].start, ts(9, 20, 0));
        assert_eq!(breaks[0].end, ts(9, 25, 0));
        assert_eq!(breaks[0].duration_seconds(), 300);
    }

    #[test]
    fn test_compute_metrics_totals() {
        let sessions = vec![
            session("codium", ts(9, 0, 0), ts(9, 30, 0)),
            session("firefox", ts(9, 40, 0), ts(10, 0, 0)),
        ];
        let breaks = detect_breaks(&sessions, 300);
        let metrics = compute_metrics(&sessions, &breaks);

        assert_eq!(metrics.total_active_seconds, 1800 + 1200);
        assert_eq!(metrics.break_count, 1);
        assert_eq!(metrics.total_break_seconds, 600);
        assert_eq!(metrics.category_seconds["coding"], 1800);
        assert_eq!(metrics.category_seconds["browser"], 1200);
        assert!(metrics.first_activity.starts_with("2026-08-01T09:00:00"));
        assert!(metrics.last_activity.starts_with("2026-08-01T10:00:00"));
    }

    #[test]
    fn test_compute_metrics_empty() {
        let metrics = compute_metrics(&[], &[]);
        assert_eq!(metrics.total_active_seconds, 0);
        assert!(metrics.first_activity.is_empty());
        assert!(metrics.category_seconds.is_empty());
    }

    #[test]
    fn test_compact_merges_same_category_neighbours() {
        let sessions = vec![
            session("firefox", ts(9, 0, 0), ts(9, 5, 0)),
            // different app, same category, 2 min gap
            session("librewolf", ts(9, 7, 0), ts(9, 12, 0)),
            // different category
            session("codium", ts(9, 13, 0), ts(9, 40, 0)),
        ];
        let compact = compact_sessions(&sessions);
        assert_eq!(compact.len(), 2);
        assert_eq!(compact[0].category, "browser");
        assert_eq!(compact[0].start, ts(9, 0, 0));
        assert_eq!(compact[0].end, ts(9, 12, 0));
        assert_eq!(compact[0].event_count, 2);
    }

    #[test]
    fn test_compact_absorbs_micro_sessions() {
        let sessions = vec![
            session("codium", ts(9, 0, 0), ts(9, 10, 0)),
            // 10 s blip in another category
            session("dolphin", ts(9, 20, 0), ts(9, 20, 10)),
            session("konsole", ts(9, 30, 0), ts(9, 45, 0)),
        ];
        let compact = compact_sessions(&sessions);
        assert_eq!(compact.len(), 2);
        // The blip folded into its left neighbour, stretching its end
        assert_eq!(compact[0].end, ts(9, 20, 10));
        assert_eq!(compact[0].event_count, 2);
    }

    #[test]
    fn test_compact_leading_micro_folds_right() {
        let sessions = vec![
            session("dolphin", ts(9, 0, 0), ts(9, 0, 5)),
            session("codium", ts(9, 10, 0), ts(9, 30, 0)),
        ];
        let compact = compact_sessions(&sessions);
        assert_eq!(compact.len(), 1);
        assert_eq!(compact[0].app_class, "codium");
        assert_eq!(compact[0].start, ts(9, 0, 0));
        assert_eq!(compact[0].event_count, 2);
    }

    #[test]
    fn test_compact_empty_and_single() {
        assert!(compact_sessions(&[]).is_empty());
        let single = vec![session("codium", ts(9, 0, 0), ts(9, 0, 5))];
        assert_eq!(compact_sessions(&single).len(), 1);
    }
}
