use sha2::{Digest, Sha256};

use crate::models::CacheEntry;

/// Integrity envelope for enrichment cache entries held in memory.
///
/// The entry is stored as JSON next to its SHA-256 checksum. On read the
/// checksum is recomputed; a mismatch or unreadable payload is treated as a
/// cache miss, so the orchestrator fetches fresh data instead of serving a
/// corrupted profile.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SealedCacheEntry {
    /// `CacheEntry` serialised as JSON.
    pub payload: String,
    /// Hex-encoded SHA-256 of `payload`.
    pub checksum: String,
}

impl SealedCacheEntry {
    pub fn seal(entry: &CacheEntry) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_string(entry)?;
        let checksum = Self::compute_checksum(&payload);
        Ok(Self { payload, checksum })
    }

    fn compute_checksum(data: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_intact(&self) -> bool {
        Self::compute_checksum(&self.payload) == self.checksum
    }

    /// Returns the entry if the checksum matches and the payload parses.
    pub fn open(&self) -> Option<CacheEntry> {
        if !self.is_intact() {
            tracing::warn!(
                "Cache validation failed: checksum mismatch. Expected: {}, Payload length: {}",
                self.checksum,
                self.payload.len()
            );
            return None;
        }
        match serde_json::from_str(&self.payload) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Cached enrichment payload unreadable: {}", e);
                None
            }
        }
    }
}
