pub(crate) const CR: u8 = 13;
pub(crate) const LF: u8 = 10;
pub(crate) const SP: u8 = 32;
pub(crate) const COLON: u8 = 58;

/// The blank line that terminates a request head.
pub(crate) const HEAD_TERMINATOR: &[u8] = &[CR, LF, CR, LF];

/// Returns the offset one past the end of the request head, if the head terminator is present.
///
/// `from` is a hint for where the search may start.  Only the region that could contain a
/// terminator spanning the previous and the newly read bytes is rescanned.
pub(crate) fn find_head_end(data: &[u8], from: usize) -> Option<usize> {
    let start = from.saturating_sub(HEAD_TERMINATOR.len() - 1);
    data.get(start..)?
        .windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
        .map(|i| start + i + HEAD_TERMINATOR.len())
}

/// True if the comma separated header `value` contains `token`, compared case-insensitively.
pub(crate) fn contains_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}
