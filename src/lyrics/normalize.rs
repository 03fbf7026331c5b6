//! Title cleanup for lyric lookups.
//!
//! Streaming services decorate titles with remaster tags, featured artists and
//! other annotations that lyric databases rarely carry.

use once_cell::sync::Lazy;
use regex::Regex;

/// Any `(...)` or `[...]` span: "(feat. X)", "[Live]", "(2011 Remix)".
static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\(\[][^\(\)\[\]]*[\)\]]").expect("bracket pattern"));

/// "- Remastered 2011", "- Stereo Mix", "- Mono" up to the end of the title.
static VERSION_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|\s)-\s*(?:remaster|stereo|mono).*$").expect("version suffix pattern")
});

/// Unbracketed "feat. X" / "ft. X" up to the end of the title.
static FEAT_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:^|\s)(?:feat|ft)\..*$").expect("feat pattern"));

static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").expect("space pattern"));

/// Strip noise from a raw track title. Pure and idempotent.
pub fn normalize(raw_title: &str) -> String {
    let mut title = raw_title.to_string();
    // Nested brackets shed one layer per pass.
    while BRACKETED.is_match(&title) {
        title = BRACKETED.replace_all(&title, " ").into_owned();
    }
    let title = VERSION_SUFFIX.replace(&title, "");
    let title = FEAT_SUFFIX.replace(&title, "");
    MULTI_SPACE.replace_all(title.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_all_noise() {
        assert_eq!(normalize("Song (feat. X) - Remastered 2011"), "Song");
        assert_eq!(normalize("Song [Live]"), "Song");
        assert_eq!(normalize("Song - Mono Version"), "Song");
        assert_eq!(normalize("Song - STEREO"), "Song");
        assert_eq!(normalize("Song feat. Someone Else"), "Song");
        assert_eq!(normalize("Song FT. Someone"), "Song");
    }

    #[test]
    fn test_keeps_clean_titles() {
        assert_eq!(normalize("Song"), "Song");
        assert_eq!(normalize("  Song  "), "Song");
        assert_eq!(normalize("Song - 2011 Remaster"), "Song - 2011 Remaster");
        assert_eq!(normalize("Monochrome"), "Monochrome");
        assert_eq!(normalize("Left-Mono"), "Left-Mono");
        assert_eq!(normalize("Defeat.Me"), "Defeat.Me");
    }

    #[test]
    fn test_inner_brackets_collapse_spacing() {
        assert_eq!(normalize("A (x) B [y] C"), "A B C");
        assert_eq!(normalize("A ((nested) deep) B"), "A B");
        assert_eq!(normalize("(Untitled)"), "");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "Song (feat. X) - Remastered 2011",
            "A - (x) Remaster",
            "Song feat. (X) - Remaster",
            "Unclosed (bracket",
            "Closed) only",
            "- Mono",
            "Title   with   gaps [and] (things) ft. Z",
            "",
            "Über Straße (Live) - Stereo",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "input: {input:?}");
        }
    }
}
