use aarch64_cpu::registers::{CNTFRQ_EL0, CNTVCT_EL0, Readable};
use embedded_hal::delay::DelayNs;

/// Busy-wait delay on the ARM generic timer virtual counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericTimer;

impl GenericTimer {
    pub const fn new() -> Self {
        GenericTimer
    }

    fn spin_ticks(ticks: u64) {
        let start = CNTVCT_EL0.get();

        while CNTVCT_EL0.get().wrapping_sub(start) < ticks {
            core::hint::spin_loop();
        }
    }
}

impl DelayNs for GenericTimer {
    fn delay_ns(&mut self, ns: u32) {
        let ticks = (CNTFRQ_EL0.get() * ns as u64).div_ceil(1_000_000_000);
        Self::spin_ticks(ticks);
    }

    fn delay_us(&mut self, us: u32) {
        let ticks = (CNTFRQ_EL0.get() * us as u64).div_ceil(1_000_000);
        Self::spin_ticks(ticks);
    }
}
