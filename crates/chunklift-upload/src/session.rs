//! Client-side view of one multipart upload session.
//!
//! The session tracks what the uploader believes the store has received; the
//! coordinator cross-checks it against the store's own listing before
//! completion. State transitions are validated so protocol phases cannot run
//! out of order.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{UploadError, UploadResult};

/// Lifecycle of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadState {
    /// No store-side session exists yet.
    Idle,
    /// The store handed out an upload id; no parts attempted.
    Initiated,
    /// Part transfers are in flight.
    PartsInFlight,
    /// The store's part listing agrees with the local view.
    PartsReconciled,
    /// Completion has been requested from the store.
    Completing,
    /// The object is assembled and the digest check passed (or was skipped).
    Completed,
    /// Terminal failure.
    Failed,
}

/// Outcome of one successful part transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartResult {
    /// Part number (1-based).
    pub part_number: u32,
    /// Identifier the store returned for the part.
    pub remote_etag: String,
    /// Hex digest computed locally before transfer.
    pub local_digest: String,
    /// Part size in bytes.
    pub size: u64,
    /// Microseconds the transfer took, including retries.
    pub latency_us: u64,
}

/// One multipart upload session, from initiation to completion or failure.
#[derive(Debug, Clone)]
pub struct UploadSession {
    upload_id: String,
    bucket: String,
    key: String,
    total_parts: usize,
    completed: Vec<PartResult>,
    state: UploadState,
}

impl UploadSession {
    /// Create a session in [`UploadState::Idle`] for `total_parts` parts.
    pub fn new(bucket: &str, key: &str, total_parts: usize) -> Self {
        Self {
            upload_id: String::new(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            total_parts,
            completed: Vec::with_capacity(total_parts),
            state: UploadState::Idle,
        }
    }

    /// The store-assigned upload id (empty until initiated).
    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    /// Target bucket.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Target object key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Number of parts this session must transfer.
    pub fn total_parts(&self) -> usize {
        self.total_parts
    }

    /// Current lifecycle state.
    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Number of parts recorded so far.
    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Whether every part has been recorded.
    pub fn is_fully_recorded(&self) -> bool {
        self.completed.len() == self.total_parts
    }

    /// Record the store-assigned upload id. `Idle` → `Initiated`.
    pub fn mark_initiated(&mut self, upload_id: &str) -> UploadResult<()> {
        if self.state != UploadState::Idle {
            return Err(UploadError::InvalidTransition {
                from: self.state,
                operation: "mark_initiated",
            });
        }
        self.upload_id = upload_id.to_string();
        self.state = UploadState::Initiated;
        Ok(())
    }

    /// Begin part transfers. `Initiated` → `PartsInFlight`.
    pub fn begin_transfer(&mut self) -> UploadResult<()> {
        if self.state != UploadState::Initiated {
            return Err(UploadError::InvalidTransition {
                from: self.state,
                operation: "begin_transfer",
            });
        }
        self.state = UploadState::PartsInFlight;
        Ok(())
    }

    /// Record one finished part. Only legal while parts are in flight; part
    /// numbers must be in range and unique.
    pub fn record_part(&mut self, result: PartResult) -> UploadResult<()> {
        if self.state != UploadState::PartsInFlight {
            return Err(UploadError::InvalidTransition {
                from: self.state,
                operation: "record_part",
            });
        }
        let number = result.part_number;
        if number == 0 || number as usize > self.total_parts {
            return Err(UploadError::InvalidTransition {
                from: self.state,
                operation: "record_part: part number out of range",
            });
        }
        if self.completed.iter().any(|p| p.part_number == number) {
            return Err(UploadError::InvalidTransition {
                from: self.state,
                operation: "record_part: duplicate part number",
            });
        }
        self.completed.push(result);
        Ok(())
    }

    /// Mark the store's listing as reconciled with the local view.
    /// `PartsInFlight` → `PartsReconciled`; requires every part recorded.
    pub fn mark_reconciled(&mut self) -> UploadResult<()> {
        if self.state != UploadState::PartsInFlight {
            return Err(UploadError::InvalidTransition {
                from: self.state,
                operation: "mark_reconciled",
            });
        }
        if !self.is_fully_recorded() {
            return Err(UploadError::InvalidTransition {
                from: self.state,
                operation: "mark_reconciled: parts missing",
            });
        }
        self.state = UploadState::PartsReconciled;
        Ok(())
    }

    /// Begin completion. `PartsReconciled` → `Completing`.
    pub fn begin_completion(&mut self) -> UploadResult<()> {
        if self.state != UploadState::PartsReconciled {
            return Err(UploadError::InvalidTransition {
                from: self.state,
                operation: "begin_completion",
            });
        }
        self.state = UploadState::Completing;
        Ok(())
    }

    /// Mark the session complete. `Completing` → `Completed`.
    pub fn mark_completed(&mut self) -> UploadResult<()> {
        if self.state != UploadState::Completing {
            return Err(UploadError::InvalidTransition {
                from: self.state,
                operation: "mark_completed",
            });
        }
        self.state = UploadState::Completed;
        Ok(())
    }

    /// Mark the session failed. Legal from every non-terminal state.
    pub fn mark_failed(&mut self) -> UploadResult<()> {
        if self.state == UploadState::Completed {
            return Err(UploadError::InvalidTransition {
                from: self.state,
                operation: "mark_failed",
            });
        }
        self.state = UploadState::Failed;
        Ok(())
    }

    /// Recorded parts sorted by part number ascending, ready for completion.
    pub fn sorted_parts(&self) -> Vec<PartResult> {
        let mut parts = self.completed.clone();
        parts.sort_by_key(|p| p.part_number);
        parts
    }

    /// Part numbers this session transferred that `listed` does not contain.
    pub fn missing_from(&self, listed: &HashSet<u32>) -> Vec<u32> {
        let mut missing: Vec<u32> = self
            .completed
            .iter()
            .map(|p| p.part_number)
            .filter(|n| !listed.contains(n))
            .collect();
        missing.sort_unstable();
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(number: u32) -> PartResult {
        PartResult {
            part_number: number,
            remote_etag: format!("etag{}", number),
            local_digest: format!("etag{}", number),
            size: 100,
            latency_us: 50,
        }
    }

    fn in_flight_session(total_parts: usize) -> UploadSession {
        let mut session = UploadSession::new("bucket", "key", total_parts);
        session.mark_initiated("upload-1").unwrap();
        session.begin_transfer().unwrap();
        session
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = UploadSession::new("bucket", "key/file", 3);
        assert_eq!(session.state(), UploadState::Idle);
        assert_eq!(session.total_parts(), 3);
        assert_eq!(session.completed_count(), 0);
        assert!(session.upload_id().is_empty());
    }

    #[test]
    fn test_full_lifecycle() {
        let mut session = UploadSession::new("bucket", "key", 2);
        session.mark_initiated("upload-1").unwrap();
        assert_eq!(session.state(), UploadState::Initiated);

        session.begin_transfer().unwrap();
        session.record_part(part(2)).unwrap();
        session.record_part(part(1)).unwrap();
        assert!(session.is_fully_recorded());

        session.mark_reconciled().unwrap();
        session.begin_completion().unwrap();
        session.mark_completed().unwrap();
        assert_eq!(session.state(), UploadState::Completed);
    }

    #[test]
    fn test_record_part_requires_in_flight() {
        let mut session = UploadSession::new("bucket", "key", 1);
        let result = session.record_part(part(1));
        assert!(matches!(
            result,
            Err(UploadError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_record_part_rejects_duplicates() {
        let mut session = in_flight_session(2);
        session.record_part(part(1)).unwrap();
        let result = session.record_part(part(1));
        assert!(matches!(
            result,
            Err(UploadError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_record_part_rejects_out_of_range() {
        let mut session = in_flight_session(2);
        assert!(session.record_part(part(0)).is_err());
        assert!(session.record_part(part(3)).is_err());
    }

    #[test]
    fn test_reconcile_requires_all_parts() {
        let mut session = in_flight_session(2);
        session.record_part(part(1)).unwrap();
        let result = session.mark_reconciled();
        assert!(matches!(
            result,
            Err(UploadError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_completion_requires_reconciled() {
        let mut session = in_flight_session(1);
        session.record_part(part(1)).unwrap();
        let result = session.begin_completion();
        assert!(matches!(
            result,
            Err(UploadError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_mark_failed_from_any_non_terminal() {
        let mut session = UploadSession::new("bucket", "key", 1);
        session.mark_failed().unwrap();
        assert_eq!(session.state(), UploadState::Failed);

        let mut session = in_flight_session(1);
        session.mark_failed().unwrap();
        assert_eq!(session.state(), UploadState::Failed);
    }

    #[test]
    fn test_mark_failed_rejected_after_completed() {
        let mut session = in_flight_session(1);
        session.record_part(part(1)).unwrap();
        session.mark_reconciled().unwrap();
        session.begin_completion().unwrap();
        session.mark_completed().unwrap();

        let result = session.mark_failed();
        assert!(matches!(
            result,
            Err(UploadError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_sorted_parts_orders_by_number() {
        let mut session = in_flight_session(3);
        session.record_part(part(3)).unwrap();
        session.record_part(part(1)).unwrap();
        session.record_part(part(2)).unwrap();

        let sorted = session.sorted_parts();
        let numbers: Vec<u32> = sorted.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_from_listing() {
        let mut session = in_flight_session(3);
        for n in 1..=3 {
            session.record_part(part(n)).unwrap();
        }

        let listed: HashSet<u32> = [1, 3].into_iter().collect();
        assert_eq!(session.missing_from(&listed), vec![2]);

        let full: HashSet<u32> = [1, 2, 3].into_iter().collect();
        assert!(session.missing_from(&full).is_empty());
    }
}
