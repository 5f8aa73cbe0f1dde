//! Error types for generation handshake operations

use crate::engine::TransferStatus;
use thiserror::Error;

/// Result type alias for Life driver operations
pub type Result<T> = std::result::Result<T, LifeError>;

/// Errors that can occur while driving the accelerator
///
/// Every variant is fatal to a run. The only retry in the driver is the
/// bounded busy-wait inside the completion poller.
#[derive(Debug, Error)]
pub enum LifeError {
    /// No device table entry for the requested base address
    #[error("No {device} configuration found for base address {base_address:#x}")]
    ConfigLookupFailed {
        /// Kind of device being looked up
        device: &'static str,
        /// Base address that was requested
        base_address: u64,
    },

    /// Device bring-up failed (mapping or initial register access)
    #[error("{device} at {base_address:#x} failed to initialize: {reason}")]
    InitFailed {
        /// Kind of device being initialized
        device: &'static str,
        /// Base address of the device
        base_address: u64,
        /// Reason for failure
        reason: String,
    },

    /// Transfer engine was built with scatter-gather support
    #[error("Transfer engine at {base_address:#x} is configured for scatter-gather mode")]
    UnsupportedMode {
        /// Base address of the engine
        base_address: u64,
    },

    /// The engine refused to start a receive transfer
    #[error("Failed to arm receive transfer: {reason}")]
    EngineStartFailed {
        /// Reason for failure
        reason: String,
    },

    /// Engine still busy after the whole poll budget
    #[error("Transfer timed out after {polls} polls (status {status})")]
    PollTimeout {
        /// Busy checks consumed
        polls: u32,
        /// Status register at the time of the timeout
        status: TransferStatus,
    },

    /// Transfer finished with error bits set
    #[error("Transfer failed with error bits {:#x} (status {status})", .status.error_bits())]
    TransferError {
        /// Status register after completion
        status: TransferStatus,
    },

    /// I/O error while opening or mapping device memory
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl LifeError {
    /// Create a configuration lookup error
    pub const fn config_lookup_failed(device: &'static str, base_address: u64) -> Self {
        Self::ConfigLookupFailed {
            device,
            base_address,
        }
    }

    /// Create an initialization error
    pub fn init_failed(device: &'static str, base_address: u64, reason: impl Into<String>) -> Self {
        Self::InitFailed {
            device,
            base_address,
            reason: reason.into(),
        }
    }

    /// Create an engine start error
    pub fn engine_start_failed(reason: impl Into<String>) -> Self {
        Self::EngineStartFailed {
            reason: reason.into(),
        }
    }

    /// Raw status bits carried by poll and transfer failures
    pub const fn status(&self) -> Option<TransferStatus> {
        match self {
            Self::PollTimeout { status, .. } | Self::TransferError { status } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use life_chip::regs::dma::sr;

    #[test]
    fn timeout_message_carries_status() {
        let err = LifeError::PollTimeout {
            polls: 10,
            status: TransferStatus::from_raw(sr::HALTED),
        };
        let msg = err.to_string();
        assert!(msg.contains("10 polls"), "{msg}");
        assert!(msg.contains("0x00000001"), "{msg}");
    }

    #[test]
    fn transfer_error_reports_error_bits() {
        let err = LifeError::TransferError {
            status: TransferStatus::from_raw(sr::IDLE | sr::DMA_SLV_ERR | sr::ERR_IRQ),
        };
        assert!(err.to_string().contains("0x4020"), "{err}");
        assert!(err.status().is_some());
    }

    #[test]
    fn setup_errors_have_no_status() {
        assert!(LifeError::config_lookup_failed("gpio", 0x1000).status().is_none());
        assert!(LifeError::UnsupportedMode { base_address: 0 }.status().is_none());
    }
}
