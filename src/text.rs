//! Text normalization and fuzzy similarity.
//!
//! Wake-phrase matching and the anti-echo guard both compare short
//! transcripts that arrive with inconsistent casing, punctuation and
//! Romanian diacritics. Everything is normalized first, then scored with
//! a partial-ratio similarity (best window of the shorter string inside
//! the longer one).

/// Lowercase, fold Romanian diacritics to ASCII, drop punctuation and
/// collapse whitespace.
pub fn normalize_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_space = true;
    for ch in input.chars() {
        let ch = match ch.to_lowercase().next().unwrap_or(ch) {
            'ă' | 'â' => 'a',
            'î' => 'i',
            'ș' | 'ş' => 's',
            'ț' | 'ţ' => 't',
            c => c,
        };
        if ch.is_alphanumeric() {
            out.push(ch);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Partial-ratio similarity in `0..=100`.
///
/// Slides a window the length of the shorter string across the longer one
/// and returns the best normalized-Levenshtein score. Equivalent in spirit
/// to rapidfuzz's `partial_ratio`, which the detection thresholds in this
/// crate (wake match, anti-echo at 85) were tuned against.
pub fn partial_ratio(a: &str, b: &str) -> u32 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    let short_len = short.chars().count();
    let long_chars: Vec<char> = long.chars().collect();

    let mut best = 0.0f64;
    let windows = long_chars.len().saturating_sub(short_len) + 1;
    for start in 0..windows {
        let window: String = long_chars[start..start + short_len].iter().collect();
        let score = strsim::normalized_levenshtein(short, &window);
        if score > best {
            best = score;
        }
        if best >= 1.0 {
            break;
        }
    }
    (best * 100.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases_and_strips_punctuation() {
        assert_eq!(normalize_text("Hello, Robot!"), "hello robot");
    }

    #[test]
    fn normalize_folds_romanian_diacritics() {
        assert_eq!(normalize_text("Salută roboțelul, te rog"), "saluta robotelul te rog");
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize_text("  what   time -- is it?  "), "what time is it");
    }

    #[test]
    fn partial_ratio_identical_is_100() {
        assert_eq!(partial_ratio("hello robot", "hello robot"), 100);
    }

    #[test]
    fn partial_ratio_substring_is_100() {
        assert_eq!(partial_ratio("hello robot", "well hello robot friend"), 100);
    }

    #[test]
    fn partial_ratio_unrelated_is_low() {
        assert!(partial_ratio("hello robot", "quarterly revenue went up") < 50);
    }

    #[test]
    fn partial_ratio_close_echo_scores_high() {
        let reply = "the capital of france is paris";
        let echo = "the capital of france is parisss";
        assert!(partial_ratio(reply, echo) >= 85);
    }

    #[test]
    fn partial_ratio_empty_is_zero() {
        assert_eq!(partial_ratio("", "hello"), 0);
        assert_eq!(partial_ratio("hello", ""), 0);
    }
}
