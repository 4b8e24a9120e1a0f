use serde::{Deserialize, Serialize};

/// The plaintext payload of a pagination cursor, before signing.
///
/// `sort_key` is the `COALESCE(ended_at, started_at, created_at)` value of
/// the last row on the previous page (RFC3339), `id` breaks ties, and
/// `total` is carried through from the first page so later pages don't need
/// to recompute a count. Signing/verification lives in `chronicle-storage`,
/// which owns the HMAC secret; this type is just the shared wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPayload {
    pub sort_key: String,
    pub id: String,
    pub total: u64,
}
