//! UTF-8 safe string clipping helpers.
//!
//! All lengths here count Unicode scalar values (chars), never bytes, so a
//! cut can not land inside a multibyte character.

use std::borrow::Cow;

/// Number of chars in `s`.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Return the first `n` characters of `s` as a `String` (no ellipsis).
pub fn prefix_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Clip `s` to at most `n` characters, borrowing when nothing is cut.
pub fn clip_chars(s: &str, n: usize) -> Cow<'_, str> {
    match s.char_indices().nth(n) {
        Some((byte_idx, _)) => Cow::Owned(s[..byte_idx].to_string()),
        None => Cow::Borrowed(s),
    }
}

/// Return a preview of `s` up to `n` characters. If `s` is longer than `n`
/// characters, the returned string will include a trailing ellipsis `...`.
/// Used for log lines and terminal status output.
pub fn preview(s: &str, n: usize) -> String {
    match clip_chars(s, n) {
        Cow::Borrowed(all) => all.to_string(),
        Cow::Owned(mut cut) => {
            cut.push_str("...");
            cut
        }
    }
}
