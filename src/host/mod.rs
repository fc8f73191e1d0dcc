pub mod mediatek;

use core::fmt::{self, Display};

use crate::common::commands::{DataBuffer, MmcCommand, MmcResponse};
use crate::regs::PollTimeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmcHostError {
    /// A bounded wait on the controller ran out.
    Timeout,
    /// Response or data CRC mismatch.
    CrcError,
    /// The command bus or the card busy line never released.
    BusBusy,
    /// The delay scan found no usable sampling window.
    TuningFailed,
    /// Transfer completed with bytes still undelivered.
    IncompleteTransfer,
    InvalidValue,
}

impl Display for MmcHostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MmcHostError::Timeout => write!(f, "Operation timed out"),
            MmcHostError::CrcError => write!(f, "CRC error"),
            MmcHostError::BusBusy => write!(f, "Bus busy"),
            MmcHostError::TuningFailed => write!(f, "Tuning failed"),
            MmcHostError::IncompleteTransfer => write!(f, "Incomplete data transfer"),
            MmcHostError::InvalidValue => write!(f, "Invalid value"),
        }
    }
}

impl From<PollTimeout> for MmcHostError {
    fn from(_: PollTimeout) -> Self {
        MmcHostError::Timeout
    }
}

pub type MmcHostResult<T = ()> = Result<T, MmcHostError>;

/// Bus timing modes selected by the card stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MmcTiming {
    #[default]
    Legacy,
    MmcHs,
    SdHs,
    UhsSdr12,
    UhsSdr25,
    UhsSdr50,
    UhsSdr104,
    UhsDdr50,
    MmcDdr52,
    MmcHs200,
    MmcHs400,
}

impl MmcTiming {
    /// Timings that latch data on both clock edges.
    pub fn is_ddr(self) -> bool {
        matches!(self, MmcTiming::UhsDdr50 | MmcTiming::MmcDdr52)
    }

    pub fn is_hs200_class(self) -> bool {
        matches!(self, MmcTiming::MmcHs200 | MmcTiming::UhsSdr104)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MmcHostInfo {
    pub timing: MmcTiming,
    pub bus_width: u8,
    pub clock: u32,
    pub clk_disable: bool,
}

impl MmcHostInfo {
    pub fn new() -> Self {
        MmcHostInfo {
            timing: MmcTiming::Legacy,
            bus_width: 1,  // Default to 1-bit bus width
            clock: 400000, // Default to 400 kHz
            clk_disable: false,
        }
    }

    pub fn set_timing(&mut self, timing: MmcTiming) {
        self.timing = timing;
    }

    pub fn set_bus_width(&mut self, bus_width: u8) {
        self.bus_width = bus_width;
    }

    pub fn set_clock(&mut self, clock: u32) {
        self.clock = clock;
    }
}

impl Default for MmcHostInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// Operations the card stack drives on a host controller.
///
/// Calls are strictly sequential; the host is not reentrant.
pub trait MmcHostOps {
    fn send_cmd(
        &mut self,
        cmd: &MmcCommand,
        data_buffer: Option<DataBuffer>,
    ) -> MmcHostResult<MmcResponse>;
    fn set_ios(&mut self, ios: &MmcHostInfo) -> MmcHostResult;
    fn get_cd(&self) -> bool;
    fn get_wp(&self) -> bool;
    fn card_busy(&self) -> bool;
    fn execute_tuning(&mut self, opcode: u8) -> MmcHostResult;
}
