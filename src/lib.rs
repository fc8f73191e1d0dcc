#![cfg_attr(not(test), no_std)]

pub mod common;
pub mod constants;
pub mod host;
pub mod regs;
#[cfg(target_arch = "aarch64")]
pub mod timer;

pub use common::{
    HostCapabilities,
    commands::{DataBuffer, MmcCommand, MmcResponse, ResponseType},
};
pub use host::mediatek::{
    DelayPhase, MsdcConfig, MsdcHost, TuningSnapshot,
    caps::{ClkDivBits, MsdcCapabilities, MsdcCompatible, MsdcFeatures},
};
pub use host::{MmcHostError, MmcHostInfo, MmcHostOps, MmcHostResult, MmcTiming};
pub use regs::{Mmio, PollTimeout, RegField, RegisterFieldExt, RegisterIo};
#[cfg(target_arch = "aarch64")]
pub use timer::GenericTimer;

pub use embedded_hal::delay::DelayNs;
