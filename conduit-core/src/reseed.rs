//! Proactive rotation before an engine reaches its reseed limit.

use std::sync::OnceLock;

use tracing::info;

use crate::engine::StatefulEngine;

/// Rotate once a counter passes this share of the reseed interval.
pub const DEFAULT_THRESHOLD_PERCENT: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReseedDecision {
    /// Counters are within budget; save the advanced state.
    Persist,
    /// Retire both engines and rehandshake before further traffic.
    Rotate,
}

/// Compares engine usage counters against a cached maximum.
///
/// The maximum is read from the first engine checked and kept for the life
/// of the monitor. Share one monitor across conversations.
#[derive(Debug)]
pub struct ReseedMonitor {
    threshold_percent: u8,
    max_interval: OnceLock<u64>,
}

impl Default for ReseedMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_PERCENT)
    }
}

impl ReseedMonitor {
    pub fn new(threshold_percent: u8) -> Self {
        Self {
            threshold_percent: threshold_percent.clamp(1, 99),
            max_interval: OnceLock::new(),
        }
    }

    pub fn max_interval(&self) -> Option<u64> {
        self.max_interval.get().copied()
    }

    /// True once `counter` is strictly above the threshold share of the
    /// maximum interval.
    pub fn exceeds_threshold(&self, counter: u64, max_interval: u64) -> bool {
        u128::from(counter) * 100 > u128::from(max_interval) * u128::from(self.threshold_percent)
    }

    /// Decide for a round trip given the encoder counter (captured before
    /// the encoder was saved) and the live decoder.
    pub fn check<E: StatefulEngine>(
        &self,
        conversation_id: &str,
        encoder_counter: u64,
        decoder: &E,
    ) -> ReseedDecision {
        let max = *self.max_interval.get_or_init(|| decoder.reseed_interval());
        let decoder_counter = decoder.reseed_counter();

        if self.exceeds_threshold(encoder_counter, max)
            || self.exceeds_threshold(decoder_counter, max)
        {
            info!(
                conversation_id = %conversation_id,
                encoder_counter,
                decoder_counter,
                max_interval = max,
                "Reseed threshold reached, rotating"
            );
            ReseedDecision::Rotate
        } else {
            ReseedDecision::Persist
        }
    }
}
