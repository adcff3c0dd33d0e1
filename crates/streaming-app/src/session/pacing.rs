//! CBR pacing with residual-bit carryover.
//!
//! A server emits one packet every `packet_bits / rate`. When the pending
//! interval is cut short (liveness timeout, explicit stop), the bits
//! already "generated" during the unused part of the interval are banked
//! and shorten the next interval, so pause/resume cycles neither lose nor
//! gain bit-time.
//!
//! Bits are banked against the instant the pending timer was armed. In
//! steady state that is the last send; after a resume it is the resume
//! instant, so paused time is never credited.

use crate::rate::DataRate;
use crate::runtime::{SimTime, TimerHandle};
use std::time::Duration;

/// The single outstanding pacing timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingSend {
    handle: TimerHandle,
    /// Rate in force when the timer was armed.
    rate: DataRate,
    armed_at: SimTime,
}

/// Pacing state shared by both roles.
#[derive(Debug, Default)]
pub(crate) struct Pacer {
    residual_bits: u64,
    last_packet_time: SimTime,
    pending: Option<PendingSend>,
}

impl Pacer {
    pub(crate) fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub(crate) fn residual_bits(&self) -> u64 {
        self.residual_bits
    }

    pub(crate) fn last_packet_time(&self) -> SimTime {
        self.last_packet_time
    }

    /// Time until one more packet's worth of bits accrues at `rate`, net of
    /// bits already banked. `None` for a zero rate.
    pub(crate) fn rate_delay(&self, packet_bits: u64, rate: DataRate) -> Option<Duration> {
        rate.transmit_time(packet_bits.saturating_sub(self.residual_bits))
    }

    /// Record a freshly armed pacing timer.
    pub(crate) fn arm(&mut self, handle: TimerHandle, rate: DataRate, now: SimTime) {
        debug_assert!(self.pending.is_none(), "at most one pending send timer");
        self.pending = Some(PendingSend {
            handle,
            rate,
            armed_at: now,
        });
    }

    /// Clear the pending timer if `handle` is the one that fired.
    ///
    /// Returns false for a stale handle; the caller must then ignore the
    /// callback.
    pub(crate) fn take_fired(&mut self, handle: TimerHandle) -> bool {
        match self.pending {
            Some(pending) if pending.handle == handle => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Drop the pending timer, banking the bits accrued since it was armed.
    ///
    /// Nothing is banked when the rate has changed since arming. The bank
    /// never exceeds one packet. Returns the handle to cancel, if any.
    pub(crate) fn cancel(
        &mut self,
        now: SimTime,
        rate: DataRate,
        packet_bits: u64,
    ) -> Option<TimerHandle> {
        let pending = self.pending.take()?;
        if pending.rate == rate {
            let banked = rate.bits_in(now - pending.armed_at);
            self.residual_bits = self
                .residual_bits
                .saturating_add(banked)
                .min(packet_bits);
        }
        Some(pending.handle)
    }

    /// A packet went out: the bank is spent.
    pub(crate) fn record_sent(&mut self, now: SimTime) {
        self.last_packet_time = now;
        self.residual_bits = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACKET_BITS: u64 = 1000;

    #[test]
    fn test_rate_delay_full_packet() {
        let pacer = Pacer::default();
        let rate = DataRate::from_bps(500);

        assert_eq!(
            pacer.rate_delay(PACKET_BITS, rate),
            Some(Duration::from_secs(2))
        );
        assert_eq!(pacer.rate_delay(PACKET_BITS, DataRate::ZERO), None);
    }

    #[test]
    fn test_cancel_banks_elapsed_bits() {
        // 1000-bit packets at 500 b/s, armed at t=3s, cancelled at t=4s:
        // one second of bits is banked and the resumed interval is one second.
        let mut pacer = Pacer::default();
        let rate = DataRate::from_bps(500);

        pacer.arm(TimerHandle(1), rate, SimTime::from_millis(3_000));
        let handle = pacer.cancel(SimTime::from_millis(4_000), rate, PACKET_BITS);

        assert_eq!(handle, Some(TimerHandle(1)));
        assert!(!pacer.is_pending());
        assert_eq!(pacer.residual_bits(), 500);
        assert_eq!(
            pacer.rate_delay(PACKET_BITS, rate),
            Some(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_cancel_skips_bank_after_rate_change() {
        let mut pacer = Pacer::default();

        pacer.arm(TimerHandle(1), DataRate::from_bps(500), SimTime::ZERO);
        let handle = pacer.cancel(
            SimTime::from_millis(1_000),
            DataRate::from_bps(1_000),
            PACKET_BITS,
        );

        assert_eq!(handle, Some(TimerHandle(1)));
        assert_eq!(pacer.residual_bits(), 0);
    }

    #[test]
    fn test_cancel_without_pending_is_noop() {
        let mut pacer = Pacer::default();
        assert_eq!(
            pacer.cancel(SimTime::from_millis(10), DataRate::from_bps(500), PACKET_BITS),
            None
        );
        assert_eq!(pacer.residual_bits(), 0);
    }

    #[test]
    fn test_bank_capped_at_one_packet() {
        let mut pacer = Pacer::default();
        let rate = DataRate::from_bps(500);

        // Repeated pause/resume cycles cannot over-fill the bank
        for cycle in 0..5u64 {
            let armed = SimTime::from_millis(cycle * 10_000);
            pacer.arm(TimerHandle(cycle), rate, armed);
            pacer.cancel(SimTime::from_millis(cycle * 10_000 + 1_500), rate, PACKET_BITS);
        }

        assert_eq!(pacer.residual_bits(), PACKET_BITS);
        assert_eq!(pacer.rate_delay(PACKET_BITS, rate), Some(Duration::ZERO));
    }

    #[test]
    fn test_take_fired_rejects_stale_handle() {
        let mut pacer = Pacer::default();
        pacer.arm(TimerHandle(7), DataRate::from_bps(500), SimTime::ZERO);

        assert!(!pacer.take_fired(TimerHandle(6)));
        assert!(pacer.is_pending());
        assert!(pacer.take_fired(TimerHandle(7)));
        assert!(!pacer.is_pending());
    }

    #[test]
    fn test_send_resets_bank() {
        let mut pacer = Pacer::default();
        let rate = DataRate::from_bps(500);
        pacer.arm(TimerHandle(1), rate, SimTime::ZERO);
        pacer.cancel(SimTime::from_millis(600), rate, PACKET_BITS);
        assert_eq!(pacer.residual_bits(), 300);

        pacer.record_sent(SimTime::from_millis(2_000));
        assert_eq!(pacer.residual_bits(), 0);
        assert_eq!(pacer.last_packet_time(), SimTime::from_millis(2_000));
    }
}
