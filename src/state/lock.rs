//! State locking for concurrent access protection.
//!
//! Locks are per instance key and expire on their own, so a crashed holder
//! never blocks an instance for longer than [`LOCK_EXPIRY_SECS`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{HalldyllError, Result, StateError};

/// Lock expiry duration in seconds.
pub const LOCK_EXPIRY_SECS: i64 = 300;

/// Information about a state lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Unique lock identifier.
    pub lock_id: String,
    /// Who holds the lock.
    pub holder: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
    /// When the lock expires.
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    /// Creates a new lock info.
    ///
    /// An empty holder is replaced by a generated process identifier.
    #[must_use]
    pub fn new(holder: &str) -> Self {
        let now = Utc::now();
        let holder = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };

        Self {
            lock_id: Uuid::new_v4().to_string(),
            holder,
            acquired_at: now,
            expires_at: now + chrono::Duration::seconds(LOCK_EXPIRY_SECS),
        }
    }

    /// Checks if the lock has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Returns the remaining time until expiry in seconds.
    #[must_use]
    pub fn remaining_secs(&self) -> i64 {
        let remaining = self.expires_at - Utc::now();
        remaining.num_seconds().max(0)
    }

    /// Fails if this lock is still held by someone.
    ///
    /// # Errors
    ///
    /// Returns `LockedByOther` while the lock has not expired.
    pub fn ensure_expired(&self) -> Result<()> {
        if self.is_expired() {
            Ok(())
        } else {
            Err(HalldyllError::State(StateError::LockedByOther {
                holder: self.holder.clone(),
                since: self.acquired_at.to_rfc3339(),
            }))
        }
    }

    /// Parses a serialized lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not a valid lock.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| {
            HalldyllError::State(StateError::Corrupted {
                message: format!("Failed to parse lock: {e}"),
            })
        })
    }

    /// Serializes the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            HalldyllError::State(StateError::serialization(format!(
                "Failed to serialize lock: {e}"
            )))
        })
    }
}

/// Generates a unique holder identifier for the current process.
#[must_use]
pub fn generate_holder_id() -> String {
    let hostname = hostname::get()
        .map_or_else(|_| String::from("unknown"), |h| h.to_string_lossy().to_string());

    let pid = std::process::id();
    let uuid = &Uuid::new_v4().to_string()[..8];

    format!("{hostname}-{pid}-{uuid}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_creation() {
        let lock = LockInfo::new("test-holder");
        assert_eq!(lock.holder, "test-holder");
        assert!(!lock.is_expired());
        assert!(lock.remaining_secs() > 0);
        assert!(lock.ensure_expired().is_err());
    }

    #[test]
    fn test_expired_lock() {
        let mut lock = LockInfo::new("test-holder");
        lock.expires_at = Utc::now() - chrono::Duration::seconds(1);
        assert!(lock.is_expired());
        assert_eq!(lock.remaining_secs(), 0);
        assert!(lock.ensure_expired().is_ok());
    }

    #[test]
    fn test_empty_holder_gets_generated_id() {
        let lock = LockInfo::new("");
        assert!(lock.holder.contains(&std::process::id().to_string()));
    }

    #[test]
    fn test_holder_id_generation() {
        let id1 = generate_holder_id();
        let id2 = generate_holder_id();

        assert_ne!(id1, id2);

        let pid = std::process::id().to_string();
        assert!(id1.contains(&pid));
    }

    #[test]
    fn test_lock_json() {
        let lock = LockInfo::new("holder");
        let parsed = LockInfo::from_json(&lock.to_json().expect("serialize")).expect("parse");
        assert_eq!(parsed.lock_id, lock.lock_id);
        assert!(LockInfo::from_json("not json").is_err());
    }
}
