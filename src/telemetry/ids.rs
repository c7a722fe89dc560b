//! Chat message ID generation.

use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Process-wide counter so IDs minted in the same nanosecond differ.
static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new chat message ID.
///
/// Format: `m-` + 16 hex chars from SHA-256 of `(timestamp_nanos || counter)`.
pub fn generate_message_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    let counter = COUNTER.fetch_add(1, Ordering::SeqCst);

    let mut hasher = Sha256::new();
    hasher.update(timestamp.to_le_bytes());
    hasher.update(counter.to_le_bytes());
    let hash = hasher.finalize();

    let hex: String = hash[..8].iter().map(|b| format!("{b:02x}")).collect();
    format!("m-{hex}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_id_format() {
        let id = generate_message_id();
        assert!(id.starts_with("m-"));
        assert_eq!(id.len(), 18);
        assert!(id[2..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_ids_are_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_message_id()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
