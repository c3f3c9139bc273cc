//! Inputs accepted by the ledger.

use favisend_db::entities::PaymentStatus;
use serde::{Deserialize, Deserializer};
use validator::{Validate, ValidationError};

/// Longest external transaction reference a payment may carry.
pub(crate) const MAX_TRANSACTION_ID_LENGTH: usize = 256;

/// Input for creating a user.
///
/// At least one of `external_id`, `username` or `email` must be present.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct NewUser {
    /// Identity provider UID.
    #[validate(length(min = 1, max = 128))]
    pub external_id: Option<String>,

    /// Login name.
    #[validate(length(min = 1, max = 128))]
    pub username: Option<String>,

    /// Contact address, unique across users.
    #[validate(email)]
    pub email: Option<String>,

    /// Plaintext password, hashed before storage.
    #[validate(length(min = 8, max = 128))]
    pub password: Option<String>,

    /// Name shown next to the user's files.
    #[validate(length(max = 256))]
    pub display_name: Option<String>,

    /// Profile picture location.
    #[validate(length(max = 1024))]
    pub avatar_url: Option<String>,
}

impl NewUser {
    /// Whether any identity that a user can be found by is present.
    #[must_use]
    pub const fn has_identity(&self) -> bool {
        self.external_id.is_some() || self.username.is_some() || self.email.is_some()
    }
}

/// Metadata of a freshly uploaded file.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewFile {
    /// Title shown in listings.
    #[validate(length(min = 1, max = 256))]
    pub title: String,

    /// Free-form description.
    pub description: Option<String>,

    /// Original file name, offered when downloading.
    #[validate(length(min = 1, max = 256))]
    pub file_name: String,

    /// Size in bytes.
    #[validate(range(min = 0))]
    pub file_size: i64,

    /// MIME type.
    #[validate(length(min = 1, max = 128))]
    pub content_type: String,

    /// Where the bytes live in object storage.
    #[validate(length(min = 1, max = 1024))]
    pub download_url: String,

    /// Search tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update of file metadata. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct FileChanges {
    /// New title.
    #[validate(length(min = 1, max = 256))]
    pub title: Option<String>,
    /// `Some(None)` (JSON `null`) clears the description.
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    /// New file name.
    #[validate(length(min = 1, max = 256))]
    pub file_name: Option<String>,
    /// New size in bytes.
    #[validate(range(min = 0))]
    pub file_size: Option<i64>,
    /// New MIME type.
    #[validate(length(min = 1, max = 128))]
    pub content_type: Option<String>,
    /// New storage location.
    #[validate(length(min = 1, max = 1024))]
    pub download_url: Option<String>,
    /// Replacement tag list.
    pub tags: Option<Vec<String>>,
}

/// A download event.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewDownload {
    /// Downloaded file.
    pub file_id: String,

    /// Downloading user, `None` for anonymous downloads.
    pub user_id: Option<String>,

    /// Client address.
    #[validate(length(max = 64))]
    pub ip_address: Option<String>,

    /// Client `User-Agent` header.
    pub user_agent: Option<String>,

    /// Amount to credit instead of the configured per-download earnings.
    #[validate(range(min = 0))]
    pub earnings: Option<i64>,
}

impl NewDownload {
    /// Anonymous download of `file_id` with the configured earnings.
    #[must_use]
    pub fn anonymous(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            user_id: None,
            ip_address: None,
            user_agent: None,
            earnings: None,
        }
    }

    /// Download of `file_id` by a signed-in user.
    #[must_use]
    pub fn by_user(file_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::anonymous(file_id)
        }
    }
}

/// A review of a file.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewComment {
    /// Reviewed file.
    pub file_id: String,

    /// Author.
    pub user_id: String,

    /// Review text.
    #[validate(length(max = 4096), custom(function = "not_blank"))]
    pub body: String,

    /// Stars, 1 to 5.
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
}

/// A payout request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewPayment {
    /// Payee.
    pub user_id: String,

    /// Amount paid out, in the smallest currency unit.
    #[validate(range(min = 1))]
    pub amount: i64,

    /// Payout channel, e.g. `bank` or `mobile_money`.
    #[validate(length(min = 1, max = 64))]
    pub payment_method: String,

    /// Reference assigned by the payment provider.
    #[validate(length(max = 256))]
    pub transaction_id: Option<String>,

    /// Provider-specific payload.
    pub details: Option<serde_json::Value>,

    /// Ignored: new payments always start out pending.
    pub status: Option<PaymentStatus>,
}

/// Maps a present field to `Some`, so an explicit `null` becomes `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}
