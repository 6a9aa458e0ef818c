//! Poll id generation and validation.
//!
//! Poll ids are opaque 12-byte identifiers rendered as 24 lowercase hex
//! characters: a 4-byte big-endian unix-seconds prefix followed by 8 random
//! bytes. The timestamp prefix makes ids roughly time-ordered, so sorting by
//! id descending surfaces the newest polls first.

use chrono::Utc;
use uuid::Uuid;

/// ID generator for poll records.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new 24-hex-char poll id.
    #[must_use]
    pub fn generate(&self) -> String {
        let seconds = Utc::now().timestamp() as u32;
        let random = Uuid::new_v4();
        let bytes = random.as_bytes();

        let mut id = String::with_capacity(24);
        for b in seconds.to_be_bytes() {
            id.push_str(&format!("{b:02x}"));
        }
        for b in &bytes[..8] {
            id.push_str(&format!("{b:02x}"));
        }
        id
    }
}

/// Returns whether `id` is a well-formed poll id (24 hex characters).
///
/// Filter layers use this to silently drop malformed ids; point reads use it
/// to reject them.
#[must_use]
pub fn is_valid_id(id: &str) -> bool {
    id.len() == 24 && id.chars().all(|c| c.is_ascii_hexdigit())
}
