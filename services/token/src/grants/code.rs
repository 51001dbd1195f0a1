use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;

/// RFC 8628 §6.1 user code alphabet: consonants only, no vowels to avoid
/// spelling words, no easily confused characters.
pub const USER_CODE_ALPHABET: &[u8] = b"BCDFGHJKLMNPQRSTVWXZ";

/// Random values for grant codes.
pub struct CodeGenerator;

impl CodeGenerator {
    /// Opaque grant code: 32 random bytes, base64url (43 characters).
    pub fn grant_code() -> String {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; 32] = rng.gen();
        URL_SAFE_NO_PAD.encode(random_bytes)
    }

    /// Human-typed user code of `length` characters from [`USER_CODE_ALPHABET`].
    pub fn user_code(length: usize) -> String {
        let mut rng = rand::thread_rng();
        (0..length)
            .map(|_| USER_CODE_ALPHABET[rng.gen_range(0..USER_CODE_ALPHABET.len())] as char)
            .collect()
    }

    /// Canonical form of typed input: upper case, dashes and whitespace dropped.
    pub fn normalize_user_code(input: &str) -> String {
        input
            .chars()
            .filter(|c| *c != '-' && !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect()
    }

    /// Display form with a dash in the middle, e.g. `WDJB-MJHT`.
    pub fn format_user_code(code: &str) -> String {
        let mid = code.len() / 2;
        if mid == 0 || !code.is_ascii() {
            return code.to_string();
        }
        format!("{}-{}", &code[..mid], &code[mid..])
    }
}
