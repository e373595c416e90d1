/// Characters per estimated token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Rough token estimate (≈ 4 characters per token, rounded up).
pub fn estimate_tokens(text: &str) -> usize {
    estimate_from_chars(text.chars().count())
}

pub fn estimate_from_chars(chars: usize) -> usize {
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// Largest character count that still fits in `tokens`.
pub fn max_chars_for(tokens: usize) -> usize {
    tokens * CHARS_PER_TOKEN
}
