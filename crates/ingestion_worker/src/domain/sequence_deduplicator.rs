use std::collections::HashMap;
use tokio::sync::RwLock;

/// Decision for one (device, sequence) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Process the message. `gap` is the number of skipped sequences, if any.
    Accept { gap: Option<u64> },
    /// Drop the message; `watermark` is the last accepted sequence
    Duplicate { watermark: i64 },
}

impl Admission {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Admission::Duplicate { .. })
    }
}

/// Per-device high-water mark of accepted sequence numbers
///
/// A sequence at or below the watermark is a duplicate, including a late
/// arrival that a forward jump skipped over.
#[derive(Default)]
pub struct SequenceDeduplicator {
    watermarks: RwLock<HashMap<String, i64>>,
}

impl SequenceDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `sequence` for `device_id` and advance the watermark on accept
    pub async fn admit(&self, device_id: &str, sequence: Option<i64>) -> Admission {
        let sequence = match sequence {
            Some(seq) if seq >= 0 => seq,
            _ => return Admission::Accept { gap: None },
        };

        let mut watermarks = self.watermarks.write().await;
        match watermarks.get(device_id).copied() {
            None => {
                watermarks.insert(device_id.to_string(), sequence);
                Admission::Accept { gap: None }
            }
            Some(last) if sequence <= last => Admission::Duplicate { watermark: last },
            Some(last) => {
                watermarks.insert(device_id.to_string(), sequence);
                let missing = (sequence - last - 1) as u64;
                Admission::Accept {
                    gap: (missing > 0).then_some(missing),
                }
            }
        }
    }

    pub async fn watermark(&self, device_id: &str) -> Option<i64> {
        self.watermarks.read().await.get(device_id).copied()
    }

    pub async fn tracked_devices(&self) -> usize {
        self.watermarks.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCEPT: Admission = Admission::Accept { gap: None };

    #[tokio::test]
    async fn test_sequential_not_duplicate() {
        let dedup = SequenceDeduplicator::new();
        assert_eq!(dedup.admit("dc-meter-007", Some(0)).await, ACCEPT);
        assert_eq!(dedup.admit("dc-meter-007", Some(1)).await, ACCEPT);
        assert_eq!(dedup.admit("dc-meter-007", Some(2)).await, ACCEPT);
        assert_eq!(dedup.watermark("dc-meter-007").await, Some(2));
    }

    #[tokio::test]
    async fn test_same_sequence_is_duplicate() {
        let dedup = SequenceDeduplicator::new();
        assert_eq!(dedup.admit("dc-meter-007", Some(5)).await, ACCEPT);
        assert_eq!(
            dedup.admit("dc-meter-007", Some(5)).await,
            Admission::Duplicate { watermark: 5 }
        );
    }

    #[tokio::test]
    async fn test_older_sequence_is_duplicate_and_keeps_watermark() {
        let dedup = SequenceDeduplicator::new();
        dedup.admit("dc-meter-007", Some(5)).await;
        assert!(dedup.admit("dc-meter-007", Some(3)).await.is_duplicate());
        assert_eq!(dedup.watermark("dc-meter-007").await, Some(5));
    }

    #[tokio::test]
    async fn test_forward_jump_signals_gap_then_late_arrival_is_duplicate() {
        let dedup = SequenceDeduplicator::new();
        assert_eq!(dedup.admit("m", Some(0)).await, ACCEPT);
        assert_eq!(dedup.admit("m", Some(1)).await, ACCEPT);
        assert_eq!(dedup.admit("m", Some(2)).await, ACCEPT);
        assert_eq!(
            dedup.admit("m", Some(7)).await,
            Admission::Accept { gap: Some(4) }
        );
        assert_eq!(
            dedup.admit("m", Some(3)).await,
            Admission::Duplicate { watermark: 7 }
        );
    }

    #[tokio::test]
    async fn test_absent_or_negative_sequence_is_exempt() {
        let dedup = SequenceDeduplicator::new();
        for _ in 0..3 {
            assert_eq!(dedup.admit("legacy", None).await, ACCEPT);
            assert_eq!(dedup.admit("legacy", Some(-1)).await, ACCEPT);
        }
        assert_eq!(dedup.watermark("legacy").await, None);
        assert_eq!(dedup.tracked_devices().await, 0);
    }

    #[tokio::test]
    async fn test_exempt_sequence_leaves_existing_watermark() {
        let dedup = SequenceDeduplicator::new();
        assert_eq!(dedup.admit("m", Some(5)).await, ACCEPT);

        assert_eq!(dedup.admit("m", None).await, ACCEPT);
        assert_eq!(dedup.admit("m", Some(-1)).await, ACCEPT);
        assert_eq!(dedup.watermark("m").await, Some(5));

        assert_eq!(
            dedup.admit("m", Some(5)).await,
            Admission::Duplicate { watermark: 5 }
        );
        assert_eq!(dedup.admit("m", Some(6)).await, ACCEPT);
    }

    #[tokio::test]
    async fn test_devices_are_independent() {
        let dedup = SequenceDeduplicator::new();
        assert_eq!(dedup.admit("meter-A", Some(0)).await, ACCEPT);
        assert_eq!(dedup.admit("meter-B", Some(0)).await, ACCEPT);
        assert!(dedup.admit("meter-A", Some(0)).await.is_duplicate());
        assert_eq!(dedup.tracked_devices().await, 2);
    }

    #[tokio::test]
    async fn test_replay_is_deterministic() {
        let input = [Some(0), Some(2), Some(2), None, Some(1), Some(3), Some(-1)];

        let mut runs = Vec::new();
        for _ in 0..2 {
            let dedup = SequenceDeduplicator::new();
            let mut outcomes = Vec::new();
            for seq in input {
                outcomes.push(dedup.admit("m", seq).await);
            }
            runs.push(outcomes);
        }
        assert_eq!(runs[0], runs[1]);
    }
}
