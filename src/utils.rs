use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

/// Spinner for scans over streams of unknown length.
pub(crate) fn scan_spinner(message: &'static str) -> Result<ProgressBar> {
    let style = ProgressStyle::default_spinner()
        .template("{spinner} {msg}: {human_pos} lines [{elapsed_precise}] ({per_sec})")?;
    Ok(ProgressBar::new_spinner()
        .with_style(style)
        .with_message(message))
}

pub(crate) fn progress_bar(len: usize, message: &'static str) -> Result<ProgressBar> {
    let style = ProgressStyle::default_bar()
        .template("{msg} [{elapsed_precise}] [{wide_bar}] {pos}/{len} ({eta})")?;
    Ok(ProgressBar::new(len as u64)
        .with_style(style)
        .with_message(message))
}

/// First `max_chars` characters of `text`, for log lines.
#[inline]
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("Wireless Earbuds", 8), "Wireless");
        assert_eq!(truncate_chars("短い", 10), "短い");
        assert_eq!(truncate_chars("écouteurs", 2), "éc");
    }
}
