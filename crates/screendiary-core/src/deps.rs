// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! Preflight check for external tools the daemon shells out to.

use anyhow::{bail, Result};

/// Tools the capture daemon cannot run without.
pub const REQUIRED_TOOLS: &[&str] = &["spectacle", "tesseract", "ffmpeg"];

/// Verify that every tool resolves on PATH. The error names all missing
/// tools at once so the user fixes them in one go.
pub fn check_dependencies(tools: &[&str]) -> Result<()> {
    let missing: Vec<&str> = tools
        .iter()
        .copied()
        .filter(|tool| which::which(tool).is_err())
        .collect();

    if !missing.is_empty() {
        bail!("missing system dependencies: {}", missing.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool_named_in_error() {
        let err = check_dependencies(&["definitely-not-a-real-binary-7f3a"]).unwrap_err();
        assert!(err
            .to_string()
            .contains("definitely-not-a-real-binary-7f3a"));
    }

    #[test]
    fn test_empty_list_passes() {
        assert!(check_dependencies(&[]).is_ok());
    }
}
