//! Completion poller
//!
//! Bounded busy-wait on the receive channel. Polling keeps the handshake's
//! timing host-observable; the budget must exceed the accelerator's worst
//! case latency for one generation.

use crate::engine::{Direction, TransferEngine};
use crate::error::{LifeError, Result};
use life_chip::regs::dma::sr;
use tracing::{debug, warn};

/// Wait for the receive channel to finish, returning the busy checks used.
///
/// Each iteration is one `is_busy` check; the loop exits the moment the
/// channel reports idle. After that the status register is read once:
/// error bits yield `TransferError` and are left unacknowledged, otherwise
/// every interrupt bit is acknowledged.
///
/// # Errors
///
/// - `PollTimeout` if the channel is still busy after `budget` checks
///   (a budget of zero times out without checking)
/// - `TransferError` if the channel went idle with error bits set
pub fn poll_completion<E: TransferEngine + ?Sized>(engine: &mut E, budget: u32) -> Result<u32> {
    let direction = Direction::DeviceToHost;
    let mut polls = 0u32;

    while polls < budget {
        polls += 1;
        if !engine.is_busy(direction) {
            return finish(engine, polls);
        }
        std::hint::spin_loop();
    }

    let status = engine.irq_status(direction);
    warn!("{direction} still busy after {polls} polls, status {status}");
    if status.has_errors() {
        warn!("{direction} error bits set: {:#x}", status.error_bits());
    }
    Err(LifeError::PollTimeout { polls, status })
}

fn finish<E: TransferEngine + ?Sized>(engine: &mut E, polls: u32) -> Result<u32> {
    let direction = Direction::DeviceToHost;
    let status = engine.irq_status(direction);
    if status.has_errors() {
        warn!("{direction} error detected during receive, status {status}");
        return Err(LifeError::TransferError { status });
    }
    engine.ack_irq(direction, sr::IRQ_ALL);
    debug!("{direction} complete after {polls} polls, status {status}");
    Ok(polls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::{ChannelSnapshot, TransferStatus};
    use std::cell::Cell;

    /// Engine that goes idle after a fixed number of busy checks.
    #[derive(Debug)]
    struct ScriptedEngine {
        config: EngineConfig,
        busy_for: Option<u32>,
        status: u32,
        busy_checks: Cell<u32>,
        acked: Vec<u32>,
    }

    impl ScriptedEngine {
        fn idle_after(checks: u32, status: u32) -> Self {
            Self {
                config: EngineConfig::simple(0),
                busy_for: Some(checks),
                status,
                busy_checks: Cell::new(0),
                acked: Vec::new(),
            }
        }

        fn stuck() -> Self {
            Self {
                busy_for: None,
                ..Self::idle_after(0, sr::HALTED)
            }
        }
    }

    impl TransferEngine for ScriptedEngine {
        fn config(&self) -> &EngineConfig {
            &self.config
        }

        fn reset(&mut self) {}

        fn reset_is_done(&self) -> bool {
            true
        }

        fn disable_interrupts(&mut self, _direction: Direction, _mask: u32) {}

        fn start_receive(&mut self, _dest: u64, _len: usize) -> Result<()> {
            Ok(())
        }

        fn is_busy(&self, direction: Direction) -> bool {
            assert_eq!(direction, Direction::DeviceToHost);
            let n = self.busy_checks.get() + 1;
            self.busy_checks.set(n);
            self.busy_for.is_none_or(|limit| n <= limit)
        }

        fn irq_status(&self, _direction: Direction) -> TransferStatus {
            TransferStatus::from_raw(self.status)
        }

        fn ack_irq(&mut self, _direction: Direction, mask: u32) {
            self.acked.push(mask);
        }

        fn snapshot(&self, _direction: Direction) -> ChannelSnapshot {
            ChannelSnapshot {
                control: 0,
                status: TransferStatus::from_raw(self.status),
                address: 0,
                length: 0,
            }
        }
    }

    #[test]
    fn idle_on_first_check_uses_one_poll() {
        let mut engine = ScriptedEngine::idle_after(0, sr::IDLE | sr::IOC_IRQ);
        let polls = poll_completion(&mut engine, 1_000).unwrap();
        assert_eq!(polls, 1);
        assert_eq!(engine.busy_checks.get(), 1);
        assert_eq!(engine.acked, vec![sr::IRQ_ALL]);
    }

    #[test]
    fn stops_the_moment_channel_goes_idle() {
        let mut engine = ScriptedEngine::idle_after(41, sr::IDLE | sr::IOC_IRQ);
        assert_eq!(poll_completion(&mut engine, 1_000).unwrap(), 42);
        assert_eq!(engine.busy_checks.get(), 42);
    }

    #[test]
    fn stuck_engine_times_out_after_exact_budget() {
        let mut engine = ScriptedEngine::stuck();
        let err = poll_completion(&mut engine, 500).unwrap_err();
        match err {
            LifeError::PollTimeout { polls, status } => {
                assert_eq!(polls, 500);
                assert!(status.is_halted());
            }
            other => panic!("expected timeout, got {other}"),
        }
        assert_eq!(engine.busy_checks.get(), 500);
        assert!(engine.acked.is_empty());
    }

    #[test]
    fn zero_budget_times_out_without_checking() {
        let mut engine = ScriptedEngine::idle_after(0, sr::IDLE);
        let err = poll_completion(&mut engine, 0).unwrap_err();
        assert!(matches!(err, LifeError::PollTimeout { polls: 0, .. }));
        assert_eq!(engine.busy_checks.get(), 0);
    }

    #[test]
    fn error_bits_fail_without_ack() {
        let mut engine = ScriptedEngine::idle_after(3, sr::IDLE | sr::DMA_DEC_ERR | sr::ERR_IRQ);
        let err = poll_completion(&mut engine, 100).unwrap_err();
        let LifeError::TransferError { status } = err else {
            panic!("expected transfer error, got {err}");
        };
        assert_eq!(status.error_bits(), sr::DMA_DEC_ERR | sr::ERR_IRQ);
        assert!(engine.acked.is_empty(), "ack only on the clean path");
    }

    #[test]
    fn never_succeeds_with_any_error_bit() {
        for raw in 0..=0x7FFFu32 {
            let mut engine = ScriptedEngine::idle_after(0, raw);
            let result = poll_completion(&mut engine, 4);
            let clean = TransferStatus::from_raw(raw).error_bits() == 0;
            assert_eq!(result.is_ok(), clean, "status {raw:#x}");
        }
    }

    #[test]
    fn never_succeeds_while_busy() {
        for budget in [1, 2, 17, 256] {
            let mut engine = ScriptedEngine::idle_after(budget, sr::IDLE);
            assert!(poll_completion(&mut engine, budget).is_err(), "budget {budget}");
            let mut engine = ScriptedEngine::idle_after(budget, sr::IDLE);
            assert_eq!(poll_completion(&mut engine, budget + 1).unwrap(), budget + 1);
        }
    }
}
