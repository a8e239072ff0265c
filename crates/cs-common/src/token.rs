use rand::RngCore;

/// Number of random bytes in a confirmation token. Hex encoding doubles this
/// for the wire length.
pub const TOKEN_BYTES: usize = 32;

/// Hex length of a token as it appears in confirmation links.
pub const TOKEN_LEN: usize = TOKEN_BYTES * 2;

/// Generate an opaque confirmation token: 32 bytes from the OS-seeded CSPRNG,
/// hex-encoded to 64 characters.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);

    use std::fmt::Write as _;
    let mut out = String::with_capacity(TOKEN_LEN);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Cheap shape check used before hitting storage with a path parameter.
pub fn looks_like_token(value: &str) -> bool {
    value.len() == TOKEN_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_fixed_length_lowercase_hex() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
    }

    #[test]
    fn tokens_do_not_repeat() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
    }

    #[test]
    fn shape_check_accepts_generated_tokens() {
        assert!(looks_like_token(&generate_token()));
        assert!(!looks_like_token("abc"));
        assert!(!looks_like_token(&"g".repeat(TOKEN_LEN)));
    }
}
