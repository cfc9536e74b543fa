/// Wake phrases, including common speech-to-text misreadings of "genie",
/// each with optional greeting prefixes. Matching is substring-based over
/// lowercased text.
pub const WAKE_PHRASES: &[&str] = &[
    "genie", "hey genie", "ok genie",
    "jeannie", "hey jeannie", "ok jeannie",
    "jeanie", "hey jeanie", "ok jeanie",
    "geni", "hey geni", "ok geni",
];

/// Feedback text surfaced the moment a wake phrase is heard, before any
/// wish text has arrived.
pub const LISTENING_PROMPT: &str = "Listening for your wish...";

/// Filler prefixes stripped from the front of a finalized wish, longest
/// first so "tell me about" wins over "tell me".
const FILLER_PREFIXES: &[&str] = &[
    "i want to know",
    "tell me about",
    "tell me",
    "what is",
    "what's",
    "i wish",
    "about",
];

/// Find the first-occurring wake phrase in `text` (expected lowercase).
///
/// Returns the matched phrase and the byte offset just past it. Ties at the
/// same position go to the longest phrase so "hey genie" beats the embedded
/// "genie".
pub fn find_wake_phrase(text: &str) -> Option<(&'static str, usize)> {
    let mut best: Option<(usize, &'static str)> = None;
    for &phrase in WAKE_PHRASES {
        if let Some(idx) = text.find(phrase) {
            best = match best {
                None => Some((idx, phrase)),
                Some((b_idx, b_phrase)) => {
                    if idx < b_idx || (idx == b_idx && phrase.len() > b_phrase.len()) {
                        Some((idx, phrase))
                    } else {
                        Some((b_idx, b_phrase))
                    }
                }
            };
        }
    }
    best.map(|(idx, phrase)| (phrase, idx + phrase.len()))
}

/// Remove every wake-phrase occurrence from a fragment, collapsing the
/// surrounding whitespace. Used while a wish is being captured so repeated
/// wake phrases never leak into the wish text.
pub fn strip_wake_phrases(text: &str) -> String {
    let mut remaining = text.to_string();
    while let Some((phrase, end)) = find_wake_phrase(&remaining) {
        let start = end - phrase.len();
        remaining.replace_range(start..end, " ");
    }
    remaining.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip leading punctuation and at most one filler prefix ("i wish",
/// "tell me about", ...) from a finalized wish.
pub fn strip_fillers(text: &str) -> String {
    let mut rest = text.trim_start_matches([',', '.', ' ']).trim();
    for &prefix in FILLER_PREFIXES {
        if let Some(after) = rest.strip_prefix(prefix) {
            if after.is_empty() || after.starts_with(' ') {
                rest = after.trim_start();
                break;
            }
        }
    }
    rest.trim().to_string()
}
