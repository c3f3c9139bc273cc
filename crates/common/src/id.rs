//! ID and share token generation.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};
use ulid::{Generator, Ulid};

/// Share tokens shorter than this are lengthened to it.
pub const MIN_SHARE_TOKEN_LENGTH: usize = 10;

/// Share tokens longer than this are shortened to it (the `share_token` column width).
pub const MAX_SHARE_TOKEN_LENGTH: usize = 64;

/// Share token length used when nothing else is configured.
pub const DEFAULT_SHARE_TOKEN_LENGTH: usize = 10;

/// Minimum number of random bytes behind a share token.
const MIN_TOKEN_ENTROPY_BYTES: usize = 8;

/// ID generator for entities.
///
/// Clones share one monotonic ULID state, so IDs issued through any clone
/// sort in issue order.
#[derive(Clone)]
pub struct IdGenerator {
    inner: Arc<Mutex<Generator>>,
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Generator::new())),
        }
    }

    /// Generate a new ULID-based ID.
    ///
    /// IDs are lower-case, 26 characters long and strictly increasing for
    /// this generator, even within the same millisecond.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut generator = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // Overflow of the random part within one millisecond is the only failure.
        let ulid = generator.generate().unwrap_or_else(|_| Ulid::new());
        ulid.to_string().to_lowercase()
    }

    /// Generate a public share token of the given length.
    #[must_use]
    pub fn generate_share_token(&self, length: usize) -> String {
        generate_share_token(length)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdGenerator").finish_non_exhaustive()
    }
}

/// Generate a URL-safe random token of exactly `length` characters.
///
/// The token is drawn from the OS random source and encoded with the
/// URL-safe base64 alphabet without padding, so it never contains `+`, `/`
/// or `=`. Uniqueness is not guaranteed here; callers storing the token must
/// check for collisions.
#[must_use]
pub fn generate_share_token(length: usize) -> String {
    let mut bytes = vec![0u8; length.max(MIN_TOKEN_ENTROPY_BYTES)];
    OsRng.fill_bytes(&mut bytes);

    let mut token = URL_SAFE_NO_PAD.encode(&bytes);
    token.truncate(length);
    token
}
