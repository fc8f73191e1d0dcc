use embedded_hal::delay::DelayNs;
use log::{debug, trace, warn};

use crate::{
    constants::*,
    host::{
        MmcHostInfo, MmcHostResult, MmcTiming,
        mediatek::{MsdcHost, caps::ClkDivBits},
    },
    regs::{RegisterFieldExt, RegisterIo},
};

/// Clock mode, divisor and resulting sampling clock for one `MSDC_CFG` update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSetting {
    pub mode: u32,
    pub div: u32,
    pub sclk: u32,
}

// CKMOD values
const CKMOD_DIV: u32 = 0x0;
const CKMOD_NO_DIV: u32 = 0x1;
const CKMOD_DDR: u32 = 0x2;

/// Pick the clock mode and divisor for a non-zero target frequency.
///
/// `sclk` is derived from the divisor before it is clamped to the field
/// width, so it never exceeds `hz`.
pub fn compute_clock(
    src_clk_freq: u32,
    hz: u32,
    timing: MmcTiming,
    div_bits: ClkDivBits,
) -> ClockSetting {
    let src = src_clk_freq as u64;
    let hz = hz.max(1) as u64;

    let (mode, div, sclk) = if timing.is_ddr() {
        if hz >= src >> 2 {
            // div = 0 means 1/4
            (CKMOD_DDR, 0, src >> 2)
        } else {
            let div = (src + (hz << 2) - 1) / (hz << 2);
            (CKMOD_DDR, div >> 1, (src >> 2) / div)
        }
    } else if hz >= src {
        (CKMOD_NO_DIV, 0, src)
    } else if hz >= src >> 1 {
        // div = 0 means 1/2
        (CKMOD_DIV, 0, src >> 1)
    } else {
        let div = (src + (hz << 2) - 1) / (hz << 2);
        (CKMOD_DIV, div, (src >> 2) / div)
    };

    ClockSetting {
        mode,
        div: div.min(div_bits.max_div() as u64) as u32,
        sclk: sclk as u32,
    }
}

/// Data timeout in units of 2^20 sampling clock cycles, as programmed into
/// `SDC_CFG.DTOC`.
pub fn timeout_cycles(sclk: u32, ns: u32, clks: u32, ddr: bool) -> u32 {
    if sclk == 0 {
        return 0;
    }

    let clk_ns = (1_000_000_000u64 / sclk as u64).max(1);
    let mut timeout = (ns as u64).div_ceil(clk_ns) + clks as u64;
    timeout = timeout.div_ceil(1 << 20);

    // DDR doubles the clock cycles needed
    if ddr {
        timeout *= 2;
    }

    timeout.saturating_sub(1).min(255) as u32
}

impl<R: RegisterIo, D: DelayNs> MsdcHost<R, D> {
    pub(crate) fn msdc_set_ios(&mut self, ios: &MmcHostInfo) -> MmcHostResult {
        debug!(
            "set_ios: clock {}, bus_width {}, timing {:?}, clk_disable {}",
            ios.clock, ios.bus_width, ios.timing, ios.clk_disable
        );

        self.set_buswidth(ios.bus_width);

        let clock = if ios.clk_disable {
            0
        } else {
            ios.clock.max(self.capabilities().f_min)
        };

        if self.mclk != clock || self.timing != ios.timing {
            self.set_mclk(ios.timing, clock);
        }

        Ok(())
    }

    pub fn set_buswidth(&mut self, width: u8) {
        let (bits, width) = match width {
            4 => (MSDC_BUS_4BITS, 4),
            8 => (MSDC_BUS_8BITS, 8),
            _ => (MSDC_BUS_1BITS, 1),
        };

        self.regs.write_field(SDC_CFG_BUSWIDTH, bits);
        self.bus_width = width;
    }

    /// Program the card clock for `timing`. `hz == 0` gates the clock and
    /// leaves the divisor untouched.
    pub fn set_mclk(&mut self, timing: MmcTiming, hz: u32) {
        if hz == 0 {
            self.mclk = 0;
            self.regs.clr_bits(MSDC_CFG, MSDC_CFG_CKPDN);
            debug!("card clock gated");
            return;
        }

        let div_bits = self.comp.clk_div_bits;
        let (hs400_bit, mode_field, div_field) = match div_bits {
            ClkDivBits::Bits8 => (MSDC_CFG_HS400_CK_MODE, MSDC_CFG_CKMOD, MSDC_CFG_CKDIV),
            ClkDivBits::Bits12 => (
                MSDC_CFG_HS400_CK_MODE_EXT,
                MSDC_CFG_CKMOD_EXT,
                MSDC_CFG_CKDIV_EXT,
            ),
        };

        self.regs.clr_bits(MSDC_CFG, hs400_bit);

        let setting = compute_clock(self.src_clk_freq, hz, timing, div_bits);
        trace!(
            "clock setting for {} Hz: mode {}, div {}, sclk {}",
            hz, setting.mode, setting.div, setting.sclk
        );

        self.regs.clr_bits(MSDC_CFG, MSDC_CFG_CKPDN);

        let mut cfg = self.regs.read_reg32(MSDC_CFG);
        cfg = mode_field.insert(cfg, setting.mode);
        cfg = div_field.insert(cfg, setting.div);
        self.regs.write_reg32(MSDC_CFG, cfg);

        // The controller runs on regardless, a missing CKSTB is only reported
        self.clock_stable = self
            .regs
            .poll_until(
                MSDC_CFG,
                |reg| reg & MSDC_CFG_CKSTB != 0,
                CLK_STABLE_TIMEOUT_US,
                &mut self.delay,
            )
            .inspect_err(|e| warn!("MSDC clock not stable: {}", e))
            .is_ok();

        self.regs.set_bits(MSDC_CFG, MSDC_CFG_CKPDN);

        self.sclk = setting.sclk;
        self.mclk = hz;
        self.timing = timing;

        self.set_timeout(self.timeout_ns, self.timeout_clks);

        // A tuned result only fits the clock it was taken at
        if self.sclk <= TUNED_SCLK_THRESHOLD {
            self.apply_tune_para(self.def_tune_para);
        } else {
            self.apply_tune_para(self.saved_tune_para);
        }

        debug!("sclk: {}, timing: {:?}", self.sclk, timing);
    }

    pub fn set_timeout(&mut self, ns: u32, clks: u32) {
        self.timeout_ns = ns;
        self.timeout_clks = clks;

        let mode = match self.comp.clk_div_bits {
            ClkDivBits::Bits8 => self.regs.read_field(MSDC_CFG_CKMOD),
            ClkDivBits::Bits12 => self.regs.read_field(MSDC_CFG_CKMOD_EXT),
        };

        let timeout = timeout_cycles(self.sclk, ns, clks, mode >= CKMOD_DDR);
        self.regs.write_field(SDC_CFG_DTOC, timeout);
    }
}
