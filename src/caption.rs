use rand::{seq::SliceRandom, Rng};

use crate::error::CaptionError;

pub const EMOJIS: [&str; 8] = ["🔥", "✨", "😏", "🤗", "🎨", "👇", "💫", "🌟"];

/// Used when neither the user nor the bundled phrase file is available.
pub const FALLBACK_PHRASES: [&str; 3] = ["Wow, look at this!...", "Gorgeous!..", "On fire! 🔥"];

/// `"<phrase> <1-3 emoji>\n\n<hashtags>"`. Blank hashtags leave out the paragraph.
pub fn compose_caption<R: Rng + ?Sized>(
    rng: &mut R,
    phrases: &[String],
    hashtags: &str,
) -> Result<String, CaptionError> {
    let phrase = phrases.choose(rng).ok_or(CaptionError::EmptyPhraseList)?;

    let count = rng.gen_range(1..=3);
    let emojis: String = (0..count)
        .map(|_| EMOJIS[rng.gen_range(0..EMOJIS.len())])
        .collect();

    let mut caption = format!("{} {}", phrase, emojis);

    let hashtags = hashtags.trim();
    if !hashtags.is_empty() {
        caption.push_str("\n\n");
        caption.push_str(hashtags);
    }

    Ok(caption)
}

/// One phrase per line; lines are trimmed and blank ones dropped.
pub fn parse_phrases(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

pub fn fallback_phrases() -> Vec<String> {
    FALLBACK_PHRASES.iter().map(|p| p.to_string()).collect()
}
