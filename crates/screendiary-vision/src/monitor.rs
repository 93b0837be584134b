// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! Display topology via `xrandr --query`. Monitors are ordered by x
//! origin and reindexed 0..n-1 so indices stay stable left-to-right.

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tracing::info;

use crate::run_tool;

static XRANDR_CONNECTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\S+)\s+connected\s+(?:primary\s+)?(\d+)x(\d+)\+(\d+)\+(\d+)").unwrap()
});

const XRANDR_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Monitor {
    pub name: String,
    pub index: usize,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Detect connected monitors.
pub async fn detect_monitors() -> Result<Vec<Monitor>> {
    let Some(output) = run_tool("xrandr", &["--query"], &[], XRANDR_TIMEOUT).await else {
        bail!("xrandr did not complete");
    };
    if output.code != 0 {
        bail!("xrandr failed: {}", output.stderr.trim());
    }

    let monitors = parse_xrandr(&String::from_utf8_lossy(&output.stdout));
    info!(
        "monitors detected: {}",
        monitors
            .iter()
            .map(|m| format!("{}:{}x{}+{}+{}", m.name, m.width, m.height, m.x, m.y))
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(monitors)
}

/// Parse `xrandr --query` output into left-to-right ordered monitors.
pub fn parse_xrandr(output: &str) -> Vec<Monitor> {
    let mut monitors: Vec<Monitor> = output
        .lines()
        .filter_map(|line| {
            let caps = XRANDR_CONNECTED.captures(line)?;
            Some(Monitor {
                name: caps[1].to_string(),
                index: 0,
                width: caps[2].parse().ok()?,
                height: caps[3].parse().ok()?,
                x: caps[4].parse().ok()?,
                y: caps[5].parse().ok()?,
            })
        })
        .collect();

    monitors.sort_by_key(|m| m.x);
    for (i, monitor) in monitors.iter_mut().enumerate() {
        monitor.index = i;
    }
    monitors
}

/// True when count or any geometry differs between two topologies.
pub fn topology_changed(old: &[Monitor], new: &[Monitor]) -> bool {
    if old.len() != new.len() {
        return true;
    }
    old.iter().zip(new).any(|(a, b)| {
        a.name != b.name || a.width != b.width || a.height != b.height || a.x != b.x || a.y != b.y
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Screen 0: minimum 320 x 200, current 3840 x 1080, maximum 16384 x 16384
DP-2 connected 1920x1080+1920+0 (normal left inverted right x axis y axis) 527mm x 296mm
   1920x1080     60.00*+  50.00
DP-1 connected primary 1920x1080+0+0 (normal left inverted right x axis y axis) 527mm x 296mm
   1920x1080     60.00*+  50.00
HDMI-1 disconnected (normal left inverted right x axis y axis)
";

    #[test]
    fn test_parse_orders_by_x_and_reindexes() {
        let monitors = parse_xrandr(SAMPLE);
        assert_eq!(monitors.len(), 2);
        assert_eq!(monitors[0].name, "DP-1");
        assert_eq!(monitors[0].index, 0);
        assert_eq!(monitors[0].x, 0);
        assert_eq!(monitors[1].name, "DP-2");
        assert_eq!(monitors[1].index, 1);
        assert_eq!(monitors[1].x, 1920);
        assert_eq!(monitors[1].width, 1920);
        assert_eq!(monitors[1].height, 1080);
    }

    #[test]
    fn test_primary_marker_is_ignored() {
        let monitors = parse_xrandr("eDP-1 connected primary 2560x1600+0+0 (normal) 302mm x 189mm");
        assert_eq!(monitors.len(), 1);
        assert_eq!(monitors[0].width, 2560);
    }

    #[test]
    fn test_disconnected_outputs_skipped() {
        let monitors = parse_xrandr("HDMI-1 disconnected (normal)\n");
        assert!(monitors.is_empty());
    }

    #[test]
    fn test_topology_changed() {
        let a = parse_xrandr(SAMPLE);
        let mut b = a.clone();
        assert!(!topology_changed(&a, &b));

        b[1].width = 2560;
        assert!(topology_changed(&a, &b));
        assert!(topology_changed(&a, &a[..1]));
    }
}
