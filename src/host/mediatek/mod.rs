pub mod block;
pub mod caps;
pub mod clock;
pub mod cmd;
pub mod tune;

#[cfg(test)]
pub(crate) mod sim;

use core::fmt::Display;
use embedded_hal::delay::DelayNs;
use log::{debug, error, info, warn};

use crate::{
    common::commands::{DataBuffer, MmcCommand, MmcResponse, ResponseType},
    constants::*,
    host::{
        MmcHostError, MmcHostInfo, MmcHostOps, MmcHostResult, MmcTiming,
        mediatek::caps::{MsdcCapabilities, MsdcCompatible, MsdcFeatures},
    },
    regs::{RegisterFieldExt, RegisterIo},
};

/// Board level settings for one MSDC instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MsdcConfig {
    /// Frequency of the source clock feeding the controller, in Hz.
    pub src_clk_freq: u32,
    /// Fixed CMD internal read delay used in HS200/SDR104.
    pub hs200_cmd_int_delay: u32,
    /// Fixed data write delay used in HS200/SDR104.
    pub hs200_write_int_delay: u32,
    pub latch_ck: u32,
    /// Sample responses on the falling edge after init.
    pub r_smpl: bool,
}

impl MsdcConfig {
    pub const fn new(src_clk_freq: u32) -> Self {
        MsdcConfig {
            src_clk_freq,
            hs200_cmd_int_delay: 0,
            hs200_write_int_delay: 0,
            latch_ck: 0,
            r_smpl: false,
        }
    }

    pub const fn mt7621_config() -> Self {
        Self::new(48_000_000)
    }
}

/// Captured sampling configuration: `MSDC_IOCON` and the pad tune register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TuningSnapshot {
    pub iocon: u32,
    pub pad_tune: u32,
}

/// Result of a delay map scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayPhase {
    pub maxlen: u8,
    pub start: u8,
    pub final_phase: u8,
}

impl DelayPhase {
    /// `final_phase` value when no bit of the map was set.
    pub const NO_WINDOW: u8 = 0xff;

    pub const fn none() -> Self {
        DelayPhase {
            maxlen: 0,
            start: 0,
            final_phase: Self::NO_WINDOW,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.final_phase != Self::NO_WINDOW
    }
}

/// MediaTek MSDC host controller driven in PIO mode.
///
/// Every bounded wait is timed through `delay`.
pub struct MsdcHost<R: RegisterIo, D: DelayNs> {
    regs: R,
    delay: D,
    comp: &'static MsdcCompatible,
    src_clk_freq: u32,
    mclk: u32,
    sclk: u32,
    timing: MmcTiming,
    bus_width: u8,
    timeout_ns: u32,
    timeout_clks: u32,
    hs200_cmd_int_delay: u32,
    hs200_write_int_delay: u32,
    latch_ck: u32,
    r_smpl: bool,
    // Consulted by the busy check of the next command
    last_resp_type: ResponseType,
    last_data_write: bool,
    def_tune_para: TuningSnapshot,
    saved_tune_para: TuningSnapshot,
    clock_stable: bool,
}

impl<R: RegisterIo, D: DelayNs> Display for MsdcHost<R, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "MsdcHost(variant: {}, src_clk: {}, mclk: {}, sclk: {}, timing: {:?}, bus_width: {})",
            self.comp.name, self.src_clk_freq, self.mclk, self.sclk, self.timing, self.bus_width,
        )
    }
}

impl<R: RegisterIo, D: DelayNs> MsdcHost<R, D> {
    pub fn new(regs: R, delay: D, comp: &'static MsdcCompatible, config: MsdcConfig) -> Self {
        MsdcHost {
            regs,
            delay,
            comp,
            src_clk_freq: config.src_clk_freq,
            mclk: 0,
            sclk: 0,
            timing: MmcTiming::Legacy,
            bus_width: 1,
            timeout_ns: DEFAULT_TIMEOUT_NS,
            timeout_clks: DEFAULT_TIMEOUT_CLKS,
            hs200_cmd_int_delay: config.hs200_cmd_int_delay,
            hs200_write_int_delay: config.hs200_write_int_delay,
            latch_ck: config.latch_ck,
            r_smpl: config.r_smpl,
            last_resp_type: ResponseType::None,
            last_data_write: false,
            def_tune_para: TuningSnapshot::default(),
            saved_tune_para: TuningSnapshot::default(),
            clock_stable: true,
        }
    }

    // Bring the controller into PIO SD/MMC mode with the variant workarounds applied
    pub fn init_host(&mut self) -> MmcHostResult {
        info!("Init MSDC controller: {}", self.comp.name);

        let tune_reg = self.tune_reg();

        // MMC/SD mode, clock free running, PIO transfers
        self.regs.set_bits(MSDC_CFG, MSDC_CFG_MODE);
        self.regs.set_bits(MSDC_CFG, MSDC_CFG_PIO);

        self.reset()?;

        // Card detect with debounce
        self.regs.write_field(MSDC_PS_CDDBCE, DEFAULT_CD_DEBOUNCE);
        self.regs.set_bits(MSDC_PS, MSDC_PS_CDEN);

        let pending = self.regs.read_reg32(MSDC_INT);
        self.regs.write_reg32(MSDC_INT, pending);

        self.regs.write_reg32(
            MSDC_INTEN,
            (MsdcInt::DATA_INTS | MsdcInt::CMD_INTS).bits(),
        );

        self.regs.write_reg32(tune_reg, 0);
        self.regs.write_reg32(MSDC_IOCON, 0);

        if self.r_smpl {
            self.regs.set_bits(MSDC_IOCON, MSDC_IOCON_RSPL);
        } else {
            self.regs.clr_bits(MSDC_IOCON, MSDC_IOCON_RSPL);
        }

        self.regs.write_reg32(MSDC_PATCH_BIT, MSDC_PATCH_BIT_DEFAULT);
        self.regs.write_reg32(MSDC_PATCH_BIT1, MSDC_PATCH_BIT1_DEFAULT);

        if self.comp.has(MsdcFeatures::STOP_CLK_FIX) {
            self.regs.write_field(MSDC_PB1_STOP_DLY, 3);
        }

        if self.comp.has(MsdcFeatures::BUSY_CHECK) {
            self.regs.clr_bits(MSDC_PATCH_BIT1, MSDC_PB1_BUSY_CHECK_SEL);
        }

        self.regs.set_bits(EMMC50_CFG0, EMMC50_CFG_CFCSTS_SEL);

        if self.comp.has(MsdcFeatures::ASYNC_FIFO) {
            self.regs.write_field(MSDC_PB2_RESPWAIT, 3);

            if self.comp.has(MsdcFeatures::ENHANCE_RX) {
                self.regs.set_bits(SDC_ADV_CFG0, SDC_RX_ENHANCE_EN);
            } else {
                self.regs.write_field(MSDC_PB2_RESPSTSENSEL, 2);
                self.regs.write_field(MSDC_PB2_CRCSTSENSEL, 2);
            }

            // The async FIFO removes the need for internal delay tuning
            self.regs.clr_bits(MSDC_PATCH_BIT2, MSDC_PB2_CFGRESP);
            self.regs.clr_bits(MSDC_PATCH_BIT2, MSDC_PB2_CFGCRCSTS);
        }

        if self.comp.has(MsdcFeatures::DATA_TUNE) {
            self.regs
                .set_bits(tune_reg, MSDC_PAD_TUNE_RD_SEL | MSDC_PAD_TUNE_CMD_SEL);
            self.regs.write_field(MSDC_INT_DAT_LATCH_CK_SEL, self.latch_ck);
        } else {
            // clock tune
            self.regs.set_bits(tune_reg, MSDC_PAD_TUNE_RXDLYSEL);
        }

        // SDIO mode is required for CMD5, the SDIO interrupt detection is not used
        self.regs.set_bits(SDC_CFG, SDC_CFG_SDIO);
        self.regs.clr_bits(SDC_CFG, SDC_CFG_SDIOIDE);

        self.regs.write_field(SDC_CFG_DTOC, 3);

        if self.comp.has(MsdcFeatures::STOP_CLK_FIX) {
            self.regs.clr_bits(SDC_FIFO_CFG, SDC_FIFO_CFG_WRVALIDSEL);
            self.regs.clr_bits(SDC_FIFO_CFG, SDC_FIFO_CFG_RDVALIDSEL);
        }

        self.def_tune_para = self.capture_tune_para();
        self.saved_tune_para = self.def_tune_para;

        debug!(
            "default tune para: iocon {:#x}, pad_tune {:#x}",
            self.def_tune_para.iocon, self.def_tune_para.pad_tune
        );
        info!("MSDC initialization completed successfully");
        Ok(())
    }

    /// Pulse the controller reset and wait for it to self-clear.
    pub fn reset(&mut self) -> MmcHostResult {
        self.regs.set_bits(MSDC_CFG, MSDC_CFG_RST);

        self.regs
            .poll_until(
                MSDC_CFG,
                |reg| reg & MSDC_CFG_RST == 0,
                RESET_TIMEOUT_US,
                &mut self.delay,
            )
            .map_err(|e| {
                error!("MSDC reset did not complete: {}", e);
                MmcHostError::Timeout
            })?;

        Ok(())
    }

    pub fn fifo_clr(&mut self) -> MmcHostResult {
        self.regs.set_bits(MSDC_FIFOCS, MSDC_FIFOCS_CLR);

        self.regs
            .poll_until(
                MSDC_FIFOCS,
                |reg| reg & MSDC_FIFOCS_CLR == 0,
                FIFO_CLR_TIMEOUT_US,
                &mut self.delay,
            )
            .map_err(|e| {
                error!("MSDC FIFO clear did not complete: {}", e);
                MmcHostError::Timeout
            })?;

        Ok(())
    }

    /// Local recovery after a failed command or transfer. Failures here are
    /// logged, the caller still reports the original error.
    pub(crate) fn recover(&mut self, clear_fifo: bool) {
        if self.reset().is_err() {
            warn!("controller still in reset after error recovery");
        }

        if clear_fifo && self.fifo_clr().is_err() {
            warn!("FIFO not cleared after error recovery");
        }
    }

    pub(crate) fn tune_reg(&self) -> u32 {
        self.comp.tune_reg()
    }

    pub(crate) fn capture_tune_para(&self) -> TuningSnapshot {
        TuningSnapshot {
            iocon: self.regs.read_reg32(MSDC_IOCON),
            pad_tune: self.regs.read_reg32(self.tune_reg()),
        }
    }

    pub(crate) fn apply_tune_para(&self, para: TuningSnapshot) {
        self.regs.write_reg32(MSDC_IOCON, para.iocon);
        self.regs.write_reg32(self.tune_reg(), para.pad_tune);
    }

    /// Card detect, the CDSTS line is active low.
    pub fn get_cd(&self) -> bool {
        self.regs.read_reg32(MSDC_PS) & MSDC_PS_CDSTS == 0
    }

    /// Write protect sensing is not wired on these boards.
    pub fn get_wp(&self) -> bool {
        false
    }

    /// The card holds DAT0 low while busy.
    pub fn card_busy(&self) -> bool {
        self.regs.read_reg32(MSDC_PS) & MSDC_PS_DAT0 == 0
    }

    pub fn capabilities(&self) -> MsdcCapabilities {
        MsdcCapabilities::new(self.comp, self.src_clk_freq)
    }

    pub fn regs(&self) -> &R {
        &self.regs
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    pub fn compatible(&self) -> &'static MsdcCompatible {
        self.comp
    }

    pub fn mclk(&self) -> u32 {
        self.mclk
    }

    pub fn sclk(&self) -> u32 {
        self.sclk
    }

    pub fn timing(&self) -> MmcTiming {
        self.timing
    }

    pub fn bus_width(&self) -> u8 {
        self.bus_width
    }

    /// Whether the last clock change saw the clock-stable status bit.
    pub fn clock_stable(&self) -> bool {
        self.clock_stable
    }

    pub fn def_tune_para(&self) -> TuningSnapshot {
        self.def_tune_para
    }

    pub fn saved_tune_para(&self) -> TuningSnapshot {
        self.saved_tune_para
    }
}

impl<R: RegisterIo, D: DelayNs> MmcHostOps for MsdcHost<R, D> {
    fn send_cmd(
        &mut self,
        cmd: &MmcCommand,
        data_buffer: Option<DataBuffer>,
    ) -> MmcHostResult<MmcResponse> {
        self.send_command(cmd, data_buffer)
    }

    fn set_ios(&mut self, ios: &MmcHostInfo) -> MmcHostResult {
        self.msdc_set_ios(ios)
    }

    fn get_cd(&self) -> bool {
        MsdcHost::get_cd(self)
    }

    fn get_wp(&self) -> bool {
        MsdcHost::get_wp(self)
    }

    fn card_busy(&self) -> bool {
        MsdcHost::card_busy(self)
    }

    fn execute_tuning(&mut self, opcode: u8) -> MmcHostResult {
        self.msdc_execute_tuning(opcode)
    }
}
