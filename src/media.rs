//! Resolution of the external media tools (yt-dlp, ffmpeg).
//!
//! Lookup order: explicit environment override, a bundled copy under
//! `tools/`, then whatever the system search path provides.

use std::path::PathBuf;
use tokio::process::Command;

/// Environment override for the download tool binary.
pub const YTDLP_ENV: &str = "YTDLP_LOCATION";

/// Environment override for the transcoding tool binary.
pub const FFMPEG_ENV: &str = "FFMPEG_LOCATION";

const BUNDLED_TOOLS_DIR: &str = "tools";

/// Resolve the yt-dlp binary, if any.
pub async fn resolve_ytdlp() -> Option<PathBuf> {
    resolve_tool("yt-dlp", YTDLP_ENV).await
}

/// Resolve the ffmpeg binary, if any.
pub async fn resolve_ffmpeg() -> Option<PathBuf> {
    resolve_tool("ffmpeg", FFMPEG_ENV).await
}

async fn resolve_tool(binary: &str, env_var: &str) -> Option<PathBuf> {
    if let Ok(path) = std::env::var(env_var) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let bundled = PathBuf::from(BUNDLED_TOOLS_DIR).join(binary);
    if bundled.exists() {
        return Some(bundled);
    }

    if command_available(binary).await {
        return Some(PathBuf::from(binary));
    }

    None
}

/// Probe a command on the search path by running `--version`.
async fn command_available(command: &str) -> bool {
    Command::new(command)
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}
