//! Generation pipeline
//!
//! One cycle receives one generation:
//!
//! ```text
//! Idle → Arming → Armed → [TriggerPending] → WaitingCompletion → Completed → Idle
//!                              gen 0 only
//! ```
//!
//! The transfer engine is brought up from scratch at the start of every
//! cycle. Any failure moves the pipeline to `Failed` and ends the run; a
//! generation is written to the output only after it landed cleanly.

use crate::board::{configure_engine, configure_port, Board};
use crate::buffer::ReceiveBuffer;
use crate::config::DriverConfig;
use crate::error::Result;
use crate::generation::Generation;
use crate::port::InjectionPorts;
use life_chip::map::GENERATION_BYTES;
use std::fmt;
use std::io::Write;
use tracing::{debug, error, info};

/// Where the pipeline is within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Between cycles
    Idle,
    /// Bringing up the engine and starting the receive
    Arming,
    /// Receive pending
    Armed,
    /// Initial state written, strobe about to fire
    TriggerPending,
    /// Polling for completion
    WaitingCompletion,
    /// Block landed, being emitted
    Completed,
    /// A stage failed; the run is over
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Arming => "arming",
            Self::Armed => "armed",
            Self::TriggerPending => "triggering",
            Self::WaitingCompletion => "waiting for completion",
            Self::Completed => "emitting",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Owns the board, the injection ports and the receive buffer
#[derive(Debug)]
pub struct GenerationPipeline<B: Board> {
    board: B,
    config: DriverConfig,
    ports: InjectionPorts<B::Port>,
    buffer: Option<ReceiveBuffer<B::Region>>,
    generation: u64,
    phase: Phase,
}

impl<B: Board> GenerationPipeline<B> {
    /// Bring up the three ports and drive the strobe low
    ///
    /// # Errors
    ///
    /// Fails fast on the first port that cannot be configured.
    pub fn bring_up(mut board: B, config: DriverConfig) -> Result<Self> {
        info!("Bringing up {} backend", board.backend_type());

        let load = configure_port(&mut board, config.load_base, "load")?;
        let data_lo = configure_port(&mut board, config.data_lo_base, "data-low")?;
        let data_hi = configure_port(&mut board, config.data_hi_base, "data-high")?;
        let ports = InjectionPorts::new(load, data_lo, data_hi);

        Ok(Self {
            board,
            config,
            ports,
            buffer: None,
            generation: 0,
            phase: Phase::Idle,
        })
    }

    /// Receive one generation and write it to `out`
    ///
    /// # Errors
    ///
    /// Any stage failure; the pipeline is left in [`Phase::Failed`].
    pub fn run_generation<W: Write>(&mut self, out: &mut W) -> Result<Generation> {
        let index = self.generation;
        match self.cycle(index, out) {
            Ok(generation) => {
                self.generation += 1;
                self.phase = Phase::Idle;
                Ok(generation)
            }
            Err(e) => {
                error!("Generation {index} failed while {}: {e}", self.phase);
                self.phase = Phase::Failed;
                Err(e)
            }
        }
    }

    fn cycle<W: Write>(&mut self, index: u64, out: &mut W) -> Result<Generation> {
        self.phase = Phase::Arming;
        let mut engine = configure_engine(&mut self.board, self.config.dma_base)?;

        let buffer = match self.buffer.take() {
            Some(buffer) => buffer,
            None => {
                let region = self
                    .board
                    .receive_region(self.config.rx_buffer_base, GENERATION_BYTES)?;
                ReceiveBuffer::new(region)?
            }
        };
        let armed = buffer.arm(&mut engine)?;
        self.phase = Phase::Armed;

        if index == 0 {
            self.phase = Phase::TriggerPending;
            self.ports.write_state(self.config.initial_state);
            self.ports.pulse_trigger(&armed);
        }

        self.phase = Phase::WaitingCompletion;
        let (landed, polls) = armed.await_landing(&mut engine, self.config.poll_budget)?;
        debug!("Generation {index} landed after {polls} polls");

        self.phase = Phase::Completed;
        let ready = landed.invalidate();
        let generation = Generation::new(index, ready.block());
        self.buffer = Some(ready.release());

        writeln!(out, "--- Generation {index} ---")?;
        write!(out, "{generation}")?;
        out.flush()?;

        Ok(generation)
    }

    /// Run generations until the configured limit (forever without one)
    ///
    /// Sleeps the idle interval after every generation except the last.
    /// Returns the number of generations received.
    ///
    /// # Errors
    ///
    /// The first failing generation ends the run.
    pub fn run<W: Write>(&mut self, out: &mut W) -> Result<u64> {
        loop {
            if let Some(limit) = self.config.generation_limit {
                if self.generation >= limit {
                    info!("Generation limit {limit} reached");
                    return Ok(self.generation);
                }
            }

            self.run_generation(out)?;

            let done = self
                .config
                .generation_limit
                .is_some_and(|limit| self.generation >= limit);
            if !done && !self.config.idle_interval.is_zero() {
                std::thread::sleep(self.config.idle_interval);
            }
        }
    }

    /// Current phase
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Generations received so far (also the index of the next one)
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Configuration in use
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Injection ports
    pub const fn ports(&self) -> &InjectionPorts<B::Port> {
        &self.ports
    }

    /// The board
    pub const fn board(&self) -> &B {
        &self.board
    }
}

/// Bring up `board` and run until the generation limit
///
/// # Errors
///
/// Bring-up or generation failures.
pub fn drive<B: Board, W: Write>(board: B, config: DriverConfig, out: &mut W) -> Result<u64> {
    let mut pipeline = GenerationPipeline::bring_up(board, config)?;
    pipeline.run(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_names() {
        assert_eq!(Phase::WaitingCompletion.to_string(), "waiting for completion");
        assert_eq!(Phase::Failed.to_string(), "failed");
    }
}
