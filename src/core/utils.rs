use std::path::Path;

/// Escapes characters that are unsafe in file names.
///
/// Replaced characters:
/// - `/` and `\` -> `_` (path separators)
/// - `:`, `*`, `?`, `<`, `>`, `|` -> `_` (reserved on Windows)
/// - `"` -> `'`
/// - control characters -> `_`
///
/// Leading and trailing whitespace and dots are trimmed; an empty result
/// becomes `unnamed`.
///
/// # Example
///
/// ```
/// use tugboat::core::utils::escape_filename;
///
/// let safe = escape_filename("song/name*.mp3");
/// assert_eq!(safe, "song_name_.mp3");
/// ```
pub fn escape_filename(filename: &str) -> String {
    let mut result = String::with_capacity(filename.len());

    for c in filename.chars() {
        match c {
            '/' | '\\' => result.push('_'),
            ':' | '*' | '?' | '<' | '>' | '|' => result.push('_'),
            '"' => result.push('\''),
            c if c.is_control() => result.push('_'),
            _ => result.push(c),
        }
    }

    let result = result.trim_matches(|c: char| c.is_whitespace() || c == '.');

    if result.is_empty() {
        "unnamed".to_string()
    } else {
        result.to_string()
    }
}

/// Formats a byte count as mebibytes with two decimals.
///
/// # Example
///
/// ```
/// use tugboat::core::utils::format_size_mb;
///
/// assert_eq!(format_size_mb(3_000_000), "2.86MB");
/// assert_eq!(format_size_mb(52_428_800), "50.00MB");
/// ```
pub fn format_size_mb(bytes: u64) -> String {
    format!("{:.2}MB", bytes as f64 / (1024.0 * 1024.0))
}

/// Formats a duration in seconds as `m:ss` or `h:mm:ss`.
///
/// # Example
///
/// ```
/// use tugboat::core::utils::format_duration;
///
/// assert_eq!(format_duration(200), "3:20");
/// assert_eq!(format_duration(3671), "1:01:11");
/// ```
pub fn format_duration(seconds: u32) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Removes a file, treating "already gone" as success. Other failures are
/// logged, never propagated; cleanup paths must not abort on them.
pub async fn remove_file_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => log::debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
    }
}
