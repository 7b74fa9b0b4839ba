use std::fmt::Write;

use tilawa_bridge::PlaybackState;

/// Formats a playback position or track length in a human-readable
/// `HH:MM:SS` or `MM:SS` format. Negative and non-finite values read as zero.
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() {
        seconds.max(0.0).floor() as u64
    } else {
        0
    };

    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    let mut out = String::with_capacity(8);
    let _ = if hours > 0 {
        write!(&mut out, "{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        write!(&mut out, "{:02}:{:02}", minutes, secs)
    };

    out
}

/// Formats a volume level in `[0, 1]` as a whole percentage.
pub fn format_volume(level: f64) -> String {
    format!("{}%", (level.clamp(0.0, 1.0) * 100.0).round() as u32)
}

/// One-line status, e.g. `playing 01:05 / 04:10 (80%)`.
pub fn format_status(state: &PlaybackState) -> String {
    let mode = match (state.loaded_url.is_some(), state.is_playing) {
        (false, _) => "stopped",
        (true, true) => "playing",
        (true, false) => "paused",
    };
    let volume = if state.is_muted {
        "muted".to_string()
    } else {
        format_volume(state.volume)
    };

    format!(
        "{mode} {} / {} ({volume})",
        format_time(state.current_time),
        format_time(state.duration)
    )
}
