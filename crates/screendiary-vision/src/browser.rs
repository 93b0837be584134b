// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! Best-effort browser-domain lookup: for a known browser class, read
//! the most recently visited URL straight out of the newest matching
//! history database. The database is opened read-only and immutable so
//! the live browser is never locked.

use once_cell::sync::Lazy;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::ConnectOptions;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const MOZILLA_QUERY: &str = "SELECT url FROM moz_places ORDER BY last_visit_date DESC LIMIT 1";
const CHROMIUM_QUERY: &str = "SELECT url FROM urls ORDER BY last_visit_time DESC LIMIT 1";

/// Normalized browser class names.
static BROWSER_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("navigator", "firefox"),
        ("firefox", "firefox"),
        ("firefox-esr", "firefox-esr"),
        ("librewolf", "librewolf"),
        ("google-chrome", "google-chrome"),
        ("chromium", "chromium-browser"),
        ("chromium-browser", "chromium-browser"),
        ("brave", "brave-browser"),
        ("brave-browser", "brave-browser"),
    ])
});

enum HistorySource {
    /// Profile directories, each possibly holding a `places.sqlite`.
    Mozilla(PathBuf),
    /// One fixed history file.
    Chromium(PathBuf),
}

pub fn is_browser(app_class: &str) -> bool {
    BROWSER_ALIASES.contains_key(app_class.to_lowercase().as_str())
}

fn history_source(normalized: &str) -> Option<(HistorySource, &'static str)> {
    let home = dirs::home_dir()?;
    match normalized {
        "firefox" | "firefox-esr" => Some((
            HistorySource::Mozilla(home.join(".mozilla/firefox")),
            MOZILLA_QUERY,
        )),
        "librewolf" => Some((HistorySource::Mozilla(home.join(".librewolf")), MOZILLA_QUERY)),
        "google-chrome" => Some((
            HistorySource::Chromium(home.join(".config/google-chrome/Default/History")),
            CHROMIUM_QUERY,
        )),
        "chromium-browser" => Some((
            HistorySource::Chromium(home.join(".config/chromium/Default/History")),
            CHROMIUM_QUERY,
        )),
        "brave-browser" => Some((
            HistorySource::Chromium(home.join(".config/BraveSoftware/Brave-Browser/Default/History")),
            CHROMIUM_QUERY,
        )),
        _ => None,
    }
}

/// Most recently modified `places.sqlite` across profile directories.
fn find_mozilla_db(profiles_dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(profiles_dir).ok()?;
    entries
        .flatten()
        .map(|entry| entry.path().join("places.sqlite"))
        .filter(|p| p.is_file())
        .max_by_key(|p| {
            p.metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        })
}

/// The domain of the most recently visited URL for the given browser
/// class, or empty on any failure.
pub async fn extract_domain(app_class: &str) -> String {
    let Some(&normalized) = BROWSER_ALIASES.get(app_class.to_lowercase().as_str()) else {
        return String::new();
    };
    let Some((source, query)) = history_source(normalized) else {
        return String::new();
    };

    let db_path = match source {
        HistorySource::Mozilla(profiles_dir) => match find_mozilla_db(&profiles_dir) {
            Some(p) => p,
            None => return String::new(),
        },
        HistorySource::Chromium(path) => {
            if !path.is_file() {
                return String::new();
            }
            path
        }
    };

    match read_last_url(&db_path, query).await {
        Ok(Some(url)) => domain_from_url(&url),
        Ok(None) => String::new(),
        Err(e) => {
            debug!("browser history read failed ({}): {}", normalized, e);
            String::new()
        }
    }
}

async fn read_last_url(db_path: &Path, query: &str) -> Result<Option<String>, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .immutable(true)
        .read_only(true)
        .busy_timeout(Duration::from_secs(1));
    let mut conn = options.connect().await?;
    let url: Option<String> = sqlx::query_scalar(query).fetch_optional(&mut conn).await?;
    Ok(url.filter(|u| !u.is_empty()))
}

/// Host part of a URL with a leading `www.` stripped.
pub fn domain_from_url(raw: &str) -> String {
    let Ok(parsed) = url::Url::parse(raw) else {
        return String::new();
    };
    let host = parsed.host_str().unwrap_or("");
    host.strip_prefix("www.").unwrap_or(host).to_string()
}
