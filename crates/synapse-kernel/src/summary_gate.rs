//! [`SummaryGate`] – decides when accumulated history should be compressed
//! and vets compressed sessions before they replace anything.
//!
//! The gate never calls the summarizer itself; the decision cycle does that
//! and hands the result back through [`SummaryGate::check_compressed`].

use synapse_types::{SessionMap, SynapseError};
use tracing::debug;

/// Combined event count above which history is compressed.
pub const DEFAULT_RETENTION_THRESHOLD: usize = 10;

/// When the summarizer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryPolicy {
    /// Summarize before every cycle.
    Always,
    /// Summarize once the combined event count exceeds the threshold.
    Threshold(usize),
    /// Never summarize.
    Disabled,
}

impl Default for SummaryPolicy {
    fn default() -> Self {
        SummaryPolicy::Threshold(DEFAULT_RETENTION_THRESHOLD)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SummaryGate {
    policy: SummaryPolicy,
}

impl SummaryGate {
    pub fn new(policy: SummaryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> SummaryPolicy {
        self.policy
    }

    /// `true` when the history should be compressed before the next
    /// assembly.
    pub fn should_summarize(&self, total_events: usize) -> bool {
        let due = match self.policy {
            SummaryPolicy::Always => true,
            SummaryPolicy::Threshold(max) => total_events > max,
            SummaryPolicy::Disabled => false,
        };
        debug!(total_events, policy = ?self.policy, due, "summary gate evaluated");
        due
    }

    /// Reject a compressed result whose keys would break the merge.
    ///
    /// Every event of every module must carry a parseable timestamp prefix.
    /// A result that fails here must not be applied at all.
    ///
    /// # Errors
    ///
    /// [`SynapseError::SummarizationFailed`] naming the first offending
    /// module and key.
    pub fn check_compressed(&self, compressed: &SessionMap) -> Result<(), SynapseError> {
        for (module, events) in compressed {
            for event in events {
                event.timestamp().map_err(|e| {
                    SynapseError::SummarizationFailed(format!(
                        "compressed session of `{module}` is unusable: {e}"
                    ))
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synapse_types::TimestampedEvent;

    #[test]
    fn threshold_trips_once_exceeded() {
        let gate = SummaryGate::default();
        assert_eq!(gate.policy(), SummaryPolicy::Threshold(10));
        assert!(!gate.should_summarize(9));
        assert!(!gate.should_summarize(10));
        // Twelve events across two modules.
        assert!(gate.should_summarize(7 + 5));
    }

    #[test]
    fn always_and_disabled_ignore_count() {
        assert!(SummaryGate::new(SummaryPolicy::Always).should_summarize(0));
        assert!(!SummaryGate::new(SummaryPolicy::Disabled).should_summarize(1_000));
    }

    #[test]
    fn well_formed_compression_passes() {
        let compressed = SessionMap::from([(
            "drive".to_string(),
            vec![TimestampedEvent::from_raw(
                "[2026-02-07 14:19:40] summary",
                "drove to the store and arrived",
            )],
        )]);
        assert!(SummaryGate::default().check_compressed(&compressed).is_ok());
    }

    #[test]
    fn compression_with_broken_prefix_is_rejected() {
        let compressed = SessionMap::from([
            (
                "arm".to_string(),
                vec![TimestampedEvent::from_raw("[2026-02-07 14:19:42] status", "ok")],
            ),
            (
                "drive".to_string(),
                vec![TimestampedEvent::from_raw("yesterday: summary", "drove around")],
            ),
        ]);
        let err = SummaryGate::default().check_compressed(&compressed).unwrap_err();
        match err {
            SynapseError::SummarizationFailed(msg) => assert!(msg.contains("drive")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn compression_with_unpadded_prefix_is_rejected() {
        let compressed = SessionMap::from([(
            "chat".to_string(),
            vec![TimestampedEvent::from_raw("[2026-2-7 9:5:0] summary", "talked")],
        )]);
        assert!(matches!(
            SummaryGate::default().check_compressed(&compressed),
            Err(SynapseError::SummarizationFailed(_))
        ));
    }
}
