//! Probabilistic fault injection used for demonstration and testing
//! (spec.md §4.8). The three knobs are set once by the node-lifecycle
//! component at startup and read thereafter by the transport send path and
//! the referendum manager without any lock; the operator CLI is also allowed
//! to adjust them afterwards (spec.md §6, `set-loss-constant`/
//! `set-defect-rate`), so the backing storage is atomic rather than a plain
//! struct field.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use qc_wire::VoteAnswer;

/// `loss_constant`, `duplicates_mode`, and `defect_constant`, packaged for
/// sharing behind an `Arc` across the listener, every conversation task, and
/// the referendum manager.
#[derive(Debug)]
pub struct FaultConfig {
    loss_constant_bits: AtomicU64,
    duplicates_mode: AtomicU8,
    defect_constant_bits: AtomicU64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self::new(0.0, 0, 0.0)
    }
}

impl FaultConfig {
    pub fn new(loss_constant: f64, duplicates_mode: u8, defect_constant: f64) -> Self {
        Self {
            loss_constant_bits: AtomicU64::new(loss_constant.clamp(0.0, 1.0).to_bits()),
            duplicates_mode: AtomicU8::new(duplicates_mode),
            defect_constant_bits: AtomicU64::new(defect_constant.clamp(0.0, 1.0).to_bits()),
        }
    }

    pub fn loss_constant(&self) -> f64 {
        f64::from_bits(self.loss_constant_bits.load(Ordering::Relaxed))
    }

    pub fn set_loss_constant(&self, value: f64) {
        self.loss_constant_bits.store(value.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn defect_constant(&self) -> f64 {
        f64::from_bits(self.defect_constant_bits.load(Ordering::Relaxed))
    }

    pub fn set_defect_constant(&self, value: f64) {
        self.defect_constant_bits.store(value.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn duplicates_mode(&self) -> u8 {
        self.duplicates_mode.load(Ordering::Relaxed)
    }

    pub fn set_duplicates_mode(&self, value: u8) {
        self.duplicates_mode.store(value, Ordering::Relaxed);
    }

    /// True if this send attempt should be dropped. Applied at the single
    /// `send_udp`-equivalent chokepoint (spec.md §9, "Loss injection
    /// placement"), not scattered across individual callers.
    pub fn should_drop(&self) -> bool {
        let p = self.loss_constant();
        p > 0.0 && rand::random::<f64>() < p
    }

    /// How many *extra* copies of a successfully-sent datagram to emit.
    pub fn extra_duplicates(&self) -> u8 {
        self.duplicates_mode()
    }

    /// Applies defection: with probability `defect_constant`, flips a SAT/
    /// UNSAT answer. SYNTAX_ERROR and TIMEOUT are never flipped.
    pub fn maybe_defect(&self, answer: VoteAnswer) -> VoteAnswer {
        let p = self.defect_constant();
        if p > 0.0 && rand::random::<f64>() < p {
            answer.flip()
        } else {
            answer
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_loss_never_drops() {
        let cfg = FaultConfig::new(0.0, 0, 0.0);
        for _ in 0..1000 {
            assert!(!cfg.should_drop());
        }
    }

    #[test]
    fn certain_loss_always_drops() {
        let cfg = FaultConfig::new(1.0, 0, 0.0);
        for _ in 0..1000 {
            assert!(cfg.should_drop());
        }
    }

    #[test]
    fn certain_defect_flips_sat_unsat_only() {
        let cfg = FaultConfig::new(0.0, 0, 1.0);
        assert_eq!(cfg.maybe_defect(VoteAnswer::Sat), VoteAnswer::Unsat);
        assert_eq!(cfg.maybe_defect(VoteAnswer::Unsat), VoteAnswer::Sat);
        assert_eq!(cfg.maybe_defect(VoteAnswer::SyntaxError), VoteAnswer::SyntaxError);
    }

    #[test]
    fn inputs_are_clamped() {
        let cfg = FaultConfig::new(2.0, 3, -1.0);
        assert_eq!(cfg.loss_constant(), 1.0);
        assert_eq!(cfg.defect_constant(), 0.0);
        assert_eq!(cfg.duplicates_mode(), 3);
    }

    #[test]
    fn knobs_can_be_adjusted_after_construction() {
        let cfg = FaultConfig::default();
        assert_eq!(cfg.loss_constant(), 0.0);
        cfg.set_loss_constant(0.5);
        assert_eq!(cfg.loss_constant(), 0.5);
        cfg.set_defect_constant(1.0);
        assert_eq!(cfg.maybe_defect(VoteAnswer::Sat), VoteAnswer::Unsat);
        cfg.set_duplicates_mode(2);
        assert_eq!(cfg.extra_duplicates(), 2);
    }
}
