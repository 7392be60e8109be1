//! Batch submission types and the per-record outcome report.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validate::RawReading;

/// An ordered batch of raw submissions with a correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingBatch {
    /// Correlation token echoed back in the [`BatchReport`].
    pub batch_id: String,

    /// Records in submission order. Failure indexes in the report refer
    /// to positions in this vec.
    pub records: Vec<RawReading>,
}

impl ReadingBatch {
    /// A batch with a generated v4 correlation id.
    pub fn new(records: Vec<RawReading>) -> Self {
        Self {
            batch_id: Uuid::new_v4().to_string(),
            records,
        }
    }

    /// A batch with a caller-supplied correlation id.
    pub fn with_id(batch_id: impl Into<String>, records: Vec<RawReading>) -> Self {
        Self {
            batch_id: batch_id.into(),
            records,
        }
    }
}

/// Terminal state of one submitted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordOutcome {
    /// Validated and appended to the primary topic.
    Accepted { partition: u32, offset: u64 },

    /// Rejected by validation; nothing was published.
    Rejected { reason: String },

    /// Publish retries were exhausted; the payload was parked on the dead
    /// letter topic instead.
    DeadLettered { reason: String },
}

impl RecordOutcome {
    /// Whether the record made it onto the primary topic.
    pub fn is_success(&self) -> bool {
        matches!(self, RecordOutcome::Accepted { .. })
    }

    /// The failure reason, `None` for accepted records.
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            RecordOutcome::Accepted { .. } => None,
            RecordOutcome::Rejected { reason } | RecordOutcome::DeadLettered { reason } => {
                Some(reason)
            }
        }
    }
}

/// One failed record in a batch report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFailure {
    /// Position of the record in the submitted batch.
    pub index: usize,

    /// Why it failed.
    pub reason: String,
}

/// Per-record accounting for one batch submission.
///
/// `successful + failed == total` always holds; one bad record never
/// voids the rest of the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Correlation id of the batch this report describes.
    pub batch_id: String,

    /// Number of records submitted.
    pub total: usize,

    /// Records accepted onto the primary topic.
    pub successful: usize,

    /// Records rejected or dead-lettered.
    pub failed: usize,

    /// Failures in batch order.
    pub failures: Vec<RecordFailure>,
}

impl BatchReport {
    /// Assemble a report from per-record outcomes in batch order.
    pub fn from_outcomes(batch_id: String, outcomes: &[RecordOutcome]) -> Self {
        let failures: Vec<RecordFailure> = outcomes
            .iter()
            .enumerate()
            .filter_map(|(index, outcome)| {
                outcome.failure_reason().map(|reason| RecordFailure {
                    index,
                    reason: reason.to_string(),
                })
            })
            .collect();

        Self {
            batch_id,
            total: outcomes.len(),
            successful: outcomes.len() - failures.len(),
            failed: failures.len(),
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_batch_ids_are_unique() {
        let a = ReadingBatch::new(vec![]);
        let b = ReadingBatch::new(vec![]);
        assert_ne!(a.batch_id, b.batch_id);
    }

    #[test]
    fn test_caller_supplied_id_is_kept() {
        let batch = ReadingBatch::with_id("batch-42", vec![]);
        assert_eq!(batch.batch_id, "batch-42");
    }

    #[test]
    fn test_report_counts_and_indexes() {
        let outcomes = vec![
            RecordOutcome::Accepted {
                partition: 0,
                offset: 0,
            },
            RecordOutcome::Rejected {
                reason: "Station id is empty".to_string(),
            },
            RecordOutcome::Accepted {
                partition: 1,
                offset: 0,
            },
            RecordOutcome::DeadLettered {
                reason: "Partition full: weather_data/1".to_string(),
            },
        ];

        let report = BatchReport::from_outcomes("b1".to_string(), &outcomes);
        assert_eq!(report.total, 4);
        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(report.successful + report.failed, report.total);

        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].index, 1);
        assert_eq!(report.failures[0].reason, "Station id is empty");
        assert_eq!(report.failures[1].index, 3);
    }

    #[test]
    fn test_report_all_successful() {
        let outcomes = vec![
            RecordOutcome::Accepted {
                partition: 0,
                offset: 7,
            };
            5
        ];
        let report = BatchReport::from_outcomes("b2".to_string(), &outcomes);
        assert_eq!(report.total, 5);
        assert_eq!(report.successful, 5);
        assert_eq!(report.failed, 0);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_report_empty_batch() {
        let report = BatchReport::from_outcomes("b3".to_string(), &[]);
        assert_eq!(report.total, 0);
        assert_eq!(report.successful, 0);
        assert_eq!(report.failed, 0);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_outcome_accessors() {
        let accepted = RecordOutcome::Accepted {
            partition: 2,
            offset: 11,
        };
        assert!(accepted.is_success());
        assert_eq!(accepted.failure_reason(), None);

        let rejected = RecordOutcome::Rejected {
            reason: "bad".to_string(),
        };
        assert!(!rejected.is_success());
        assert_eq!(rejected.failure_reason(), Some("bad"));

        let parked = RecordOutcome::DeadLettered {
            reason: "full".to_string(),
        };
        assert!(!parked.is_success());
        assert_eq!(parked.failure_reason(), Some("full"));
    }
}
