use std::sync::LazyLock;

use regex::Regex;

/// Instruction asking for a review that could pass for the human one it is
/// paired with.
pub fn build_review_prompt(product_title: &str, rating: u8, word_count: usize) -> String {
    let word_count = word_count.max(1);
    let unit = if word_count == 1 { "word" } else { "words" };
    format!(
        "Write a {rating}-star Amazon review for '{product_title}'. \
         Length: about {word_count} {unit}. \
         Write as a real customer who bought and used the product, in the first person. \
         Output only the review body as plain text: no title or headline line, \
         no rating or star label, no quotation marks around the review, \
         and no commentary about the review or these instructions."
    )
}

// Labels that come before the review body. Header labels own their whole line
// (`Title: Great buy`), body labels prefix the review itself (`Review: I ...`).
static LEADING_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^[\s*_#>]*(review title|review text|star rating|title|rating|stars|star|product|headline|subject|review|body)[\s*_]*:[\s*_]*",
    )
    .unwrap()
});

fn is_header_label(label: &str) -> bool {
    !matches!(
        label.to_ascii_lowercase().as_str(),
        "review" | "review text" | "body"
    )
}

/// Removes leading labels the model was told not to write and flattens the
/// text onto one line with double quotes replaced by single quotes.
pub fn clean_generated_text(raw: &str) -> String {
    let mut text = raw.trim_start();
    while let Some(captures) = LEADING_LABEL.captures(text) {
        let whole = captures.get(0).map_or(0, |m| m.end());
        let label = captures.get(1).map_or("", |m| m.as_str());
        let rest = &text[whole..];
        text = match rest.split_once('\n') {
            Some((_, remaining)) if is_header_label(label) && !remaining.trim().is_empty() => {
                remaining
            }
            _ => rest,
        }
        .trim_start();
    }

    text.replace(['"', '\u{201C}', '\u{201D}', '\u{201E}'], "'")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_mentions_rating_length_and_title() {
        let prompt = build_review_prompt("Widget", 5, 42);
        assert!(prompt.contains("5-star"));
        assert!(prompt.contains("about 42 words"));
        assert!(prompt.contains("'Widget'"));
        assert!(prompt.contains("no title"));
    }

    #[test]
    fn test_prompt_never_asks_for_zero_words() {
        let prompt = build_review_prompt("Widget", 3, 0);
        assert!(prompt.contains("about 1 word."));
        assert!(build_review_prompt("Widget", 3, 12).contains("about 12 words."));
    }

    #[test]
    fn test_header_lines_are_dropped() {
        let raw = "Title: Best purchase ever\nRating: 5/5\nThis thing works.\nWould buy again.";
        assert_eq!(clean_generated_text(raw), "This thing works. Would buy again.");
    }

    #[test]
    fn test_body_label_is_stripped_in_place() {
        assert_eq!(clean_generated_text("**Review:** Solid build."), "Solid build.");
        assert_eq!(clean_generated_text("review: fine"), "fine");
    }

    #[test]
    fn test_lone_header_keeps_its_content() {
        assert_eq!(clean_generated_text("Rating: 4 stars, decent."), "4 stars, decent.");
    }

    #[test]
    fn test_cleaned_text_never_starts_with_label() {
        let raws = [
            "Rating: 5\nTitle: Wow\nReview: Great.",
            "## Title: Loud\r\nStars: 2\r\n\r\nToo loud for me.",
            "STAR RATING: 1\nBroke in a week.",
        ];
        for raw in raws {
            let cleaned = clean_generated_text(raw);
            assert!(!LEADING_LABEL.is_match(&cleaned), "{raw:?} -> {cleaned:?}");
            assert!(!cleaned.is_empty());
        }
    }

    #[test]
    fn test_words_that_only_look_like_labels_are_kept() {
        assert_eq!(
            clean_generated_text("Titles in the menu are tiny."),
            "Titles in the menu are tiny."
        );
    }

    #[test]
    fn test_quotes_and_line_breaks_are_flattened() {
        let raw = "I said \"wow\".\r\nThe \u{201C}pro\u{201D} mode\n\nis great.";
        assert_eq!(clean_generated_text(raw), "I said 'wow'. The 'pro' mode is great.");
    }

    #[test]
    fn test_label_only_output_cleans_to_empty() {
        assert_eq!(clean_generated_text("Review:"), "");
        assert_eq!(clean_generated_text("   "), "");
    }
}
