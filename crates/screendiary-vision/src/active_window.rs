// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! Active-window probe for KDE Wayland. KWin exposes no direct query,
//! so a throwaway KWin script prints the active window as a JSON line
//! with a unique prefix, the line is fished out of the user journal and
//! the script is unloaded again. The whole dance must finish within 2 s
//! or the probe returns nothing.

use serde::Deserialize;
use std::io::Write;
use std::time::Duration;
use tracing::debug;

use crate::{run_tool, ToolOutput};

const DBUS_SERVICE: &str = "org.kde.KWin";
const DBUS_PATH: &str = "/Scripting";
const DBUS_IFACE: &str = "org.kde.kwin.Scripting";

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Journal settle delay before reading back the script output.
const JOURNAL_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowInfo {
    pub caption: String,
    #[serde(rename = "resourceClass")]
    pub resource_class: String,
    #[serde(rename = "resourceName")]
    pub resource_name: String,
    #[serde(rename = "desktopFileName")]
    pub desktop_file: String,
    pub pid: i64,
}

fn kwin_script(prefix: &str) -> String {
    format!(
        r#"(function() {{
    var w = workspace.activeWindow;
    if (w) {{
        print("{prefix}" + JSON.stringify({{
            caption: w.caption || "",
            resourceClass: w.resourceClass || "",
            resourceName: w.resourceName || "",
            desktopFileName: w.desktopFileName || "",
            pid: w.pid || 0
        }}));
    }} else {{
        print("{prefix}null");
    }}
}})();
"#
    )
}

async fn gdbus(args: &[&str]) -> Option<ToolOutput> {
    run_tool("gdbus", args, &[], PROBE_TIMEOUT).await
}

/// Detect the currently active window. Returns `None` whenever any step
/// fails or times out; the loaded script never leaks past this call.
pub async fn get_active_window() -> Option<WindowInfo> {
    let prefix = format!(
        "SCREENDIARY_WINDOW:{}:",
        &uuid::Uuid::new_v4().simple().to_string()[..12]
    );

    let mut script_file = tempfile::Builder::new()
        .prefix("sd_kwin_")
        .suffix(".js")
        .tempfile()
        .ok()?;
    script_file
        .write_all(kwin_script(&prefix).as_bytes())
        .ok()?;
    script_file.flush().ok()?;
    let script_path = script_file.path().to_string_lossy().into_owned();

    // Load
    let load = gdbus(&[
        "call",
        "--session",
        "--dest",
        DBUS_SERVICE,
        "--object-path",
        DBUS_PATH,
        "--method",
        &format!("{}.loadScript", DBUS_IFACE),
        &script_path,
    ])
    .await?;
    if load.code != 0 {
        debug!("kwin loadScript failed: {}", load.stderr.trim());
        return None;
    }

    // Output looks like "(int32 7,)"
    let script_id = String::from_utf8_lossy(&load.stdout)
        .trim()
        .trim_matches(|c| c == '(' || c == ')')
        .split(',')
        .next()
        .unwrap_or("")
        .replace("int32", "")
        .trim()
        .to_string();
    if script_id.is_empty() {
        debug!("kwin loadScript returned no id");
        return None;
    }

    let script_object = format!("/Scripting/Script{}", script_id);
    let run = gdbus(&[
        "call",
        "--session",
        "--dest",
        DBUS_SERVICE,
        "--object-path",
        &script_object,
        "--method",
        "org.kde.kwin.Script.run",
    ])
    .await;
    if run.map(|r| r.code) != Some(0) {
        debug!("kwin script run failed");
        unload_script(&script_id).await;
        return None;
    }

    // Give KWin a moment to flush the print into the journal.
    tokio::time::sleep(JOURNAL_DELAY).await;

    let mut journal = read_journal(&prefix, true).await;
    if journal.is_none() {
        // X11 sessions log under a different unit; retry unfiltered.
        journal = read_journal(&prefix, false).await;
    }

    unload_script(&script_id).await;

    let journal = journal?;
    parse_probe_output(&journal, &prefix)
}

async fn read_journal(prefix: &str, wayland_unit: bool) -> Option<String> {
    let mut args = vec!["--user"];
    if wayland_unit {
        args.extend(["-u", "plasma-kwin_wayland.service"]);
    }
    args.extend(["--since", "-3s", "--no-pager", "-o", "cat", "--grep", prefix]);

    let output = run_tool("journalctl", &args, &[], PROBE_TIMEOUT).await?;
    if output.code != 0 {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).into_owned();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Find the prefixed line and decode its JSON payload.
fn parse_probe_output(journal: &str, prefix: &str) -> Option<WindowInfo> {
    for line in journal.lines() {
        let Some(idx) = line.find(prefix) else {
            continue;
        };
        let payload = &line[idx + prefix.len()..];
        if payload.trim() == "null" {
            return None;
        }
        return match serde_json::from_str::<WindowInfo>(payload) {
            Ok(info) => Some(info),
            Err(e) => {
                debug!("kwin probe json parse error: {}", e);
                None
            }
        };
    }
    None
}

async fn unload_script(script_id: &str) {
    let script_object = format!("/Scripting/Script{}", script_id);
    gdbus(&[
        "call",
        "--session",
        "--dest",
        DBUS_SERVICE,
        "--object-path",
        &script_object,
        "--method",
        "org.kde.kwin.Script.stop",
    ])
    .await;
    gdbus(&[
        "call",
        "--session",
        "--dest",
        DBUS_SERVICE,
        "--object-path",
        DBUS_PATH,
        "--method",
        &format!("{}.unloadScript", DBUS_IFACE),
        script_id,
    ])
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "SCREENDIARY_WINDOW:abc123def456:";

    #[test]
    fn test_parse_probe_output_finds_prefixed_json() {
        let journal = format!(
            "unrelated line\n{}{{\"caption\":\"main.rs — Codium\",\"resourceClass\":\"codium\",\"resourceName\":\"codium\",\"desktopFileName\":\"vscodium\",\"pid\":1234}}\nmore noise",
            PREFIX
        );
        let info = parse_probe_output(&journal, PREFIX).unwrap();
        assert_eq!(info.resource_class, "codium");
        assert_eq!(info.caption, "main.rs — Codium");
        assert_eq!(info.pid, 1234);
    }

    #[test]
    fn test_parse_probe_output_null_window() {
        let journal = format!("{}null", PREFIX);
        assert!(parse_probe_output(&journal, PREFIX).is_none());
    }

    #[test]
    fn test_parse_probe_output_malformed_json() {
        let journal = format!("{}{{not json", PREFIX);
        assert!(parse_probe_output(&journal, PREFIX).is_none());
    }

    #[test]
    fn test_parse_probe_output_missing_prefix() {
        assert!(parse_probe_output("no match anywhere", PREFIX).is_none());
    }

    #[test]
    fn test_missing_fields_default() {
        let journal = format!("{}{{\"resourceClass\":\"firefox\"}}", PREFIX);
        let info = parse_probe_output(&journal, PREFIX).unwrap();
        assert_eq!(info.resource_class, "firefox");
        assert_eq!(info.caption, "");
        assert_eq!(info.pid, 0);
    }

    #[test]
    fn test_script_contains_prefix() {
        let script = kwin_script(PREFIX);
        assert!(script.contains(PREFIX));
        assert!(script.contains("workspace.activeWindow"));
    }
}
