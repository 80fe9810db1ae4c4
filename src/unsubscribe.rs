use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Derive the opaque unsubscribe token for one recipient of one send attempt.
///
/// SHA-256 over subscriber id, shared secret and the send timestamp, hex
/// encoded. The timestamp salt means tokens are deliberately not stable
/// across runs: a resumed campaign issues a fresh token for the same
/// subscriber, and no long-lived reusable link exists. No token table is
/// kept; the unsubscribe endpoint keys off the subscriber id in the URL and
/// treats the token as opaque.
pub fn derive_token(subscriber_id: &str, secret: &str, issued_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(subscriber_id.as_bytes());
    hasher.update(b":");
    hasher.update(secret.as_bytes());
    hasher.update(b":");
    hasher.update(issued_at.timestamp_millis().to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Build the unsubscribe link embedded in the footer and in the
/// `List-Unsubscribe` header.
pub fn unsubscribe_url(base_url: &str, subscriber_id: &str, token: &str) -> String {
    format!(
        "{}/unsubscribe?sid={}&token={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(subscriber_id),
        token
    )
}
