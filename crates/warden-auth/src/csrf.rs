//! Double-submit CSRF check.

/// Compare the CSRF cookie with the echoed header in constant time.
/// Empty values never match.
pub fn tokens_match(cookie: &str, header: &str) -> bool {
    if cookie.is_empty() || header.is_empty() || cookie.len() != header.len() {
        return false;
    }
    cookie
        .bytes()
        .zip(header.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
