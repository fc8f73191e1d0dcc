//! Register level model of an MSDC block used by the host tests.
//!
//! Commands complete as soon as `SDC_CMD` is written. Outcomes come from a
//! queue of [`SimCommand`]s, or from a [`TuningModel`] for tuning opcodes,
//! which decides pass/fail from the sampling edge and delay currently
//! programmed into `MSDC_IOCON` and the pad tune register. Time only moves
//! when the host waits on the [`SimDelay`] handed out by [`SimRegs::delay`].

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
};

use embedded_hal::delay::DelayNs;

use crate::{
    constants::*,
    host::mediatek::{MsdcConfig, MsdcHost, caps::MsdcCompatible},
    regs::RegisterIo,
};

pub type SimHost = MsdcHost<SimRegs, SimDelay>;

/// Host over a fresh simulated register block, not yet initialised.
pub fn sim_host(comp: &'static MsdcCompatible, config: MsdcConfig) -> SimHost {
    let regs = SimRegs::new(comp.tune_reg());
    let delay = regs.delay();
    MsdcHost::new(regs, delay, comp, config)
}

/// Delay that advances the simulated clock instead of waiting.
#[derive(Debug, Clone, Default)]
pub struct SimDelay {
    now_ns: Rc<Cell<u64>>,
}

impl SimDelay {
    pub fn elapsed_us(&self) -> u64 {
        self.now_ns.get() / 1_000
    }
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.now_ns.set(self.now_ns.get() + ns as u64);
    }
}

const REG_WORDS: usize = 0x100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimOutcome {
    Ready,
    Timeout,
    CrcError,
    /// No interrupt is ever raised.
    NoResponse,
}

#[derive(Debug, Clone)]
pub struct SimCommand {
    pub outcome: SimOutcome,
    /// Values of RESP0..RESP3.
    pub resp: [u32; 4],
    pub read_data: Vec<u8>,
    /// Raise DATCRCERR once this many data bytes have moved.
    pub crc_error_after: Option<usize>,
}

impl SimCommand {
    pub fn ready(resp: [u32; 4]) -> Self {
        SimCommand {
            outcome: SimOutcome::Ready,
            resp,
            read_data: Vec::new(),
            crc_error_after: None,
        }
    }

    pub fn outcome(outcome: SimOutcome) -> Self {
        SimCommand {
            outcome,
            ..Self::ready([0; 4])
        }
    }

    pub fn with_read_data(mut self, data: Vec<u8>) -> Self {
        self.read_data = data;
        self
    }

    pub fn with_crc_error_after(mut self, bytes: usize) -> Self {
        self.crc_error_after = Some(bytes);
        self
    }
}

/// Pass maps indexed by delay phase, one per sampling edge.
#[derive(Debug, Clone, Default)]
pub struct TuningModel {
    pub cmd_rise: u32,
    pub cmd_fall: u32,
    pub data_rise: u32,
    pub data_fall: u32,
    /// The command phase fails whenever DATRRDLY holds this value.
    pub cmd_fail_at_data_delay: Option<u32>,
    /// DATRRDLY values at which the first `cmd_glitch_reads` tuning reads
    /// lose their response.
    pub cmd_glitch_delays: u32,
    pub cmd_glitch_reads: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct IssuedCmd {
    pub opcode: u32,
    pub rawcmd: u32,
    pub arg: u32,
    pub blocks: u32,
}

struct SimState {
    regs: [u32; REG_WORDS],
    tune_reg: u32,
    reset_stuck: bool,
    clock_unstable: bool,
    cmd_busy: bool,
    dat0_release_us: Option<u64>,
    cmd_glitches: [u32; PAD_DELAY_MAX as usize],
    resets: u32,
    fifo_clears: u32,
    script: VecDeque<SimCommand>,
    issued: Vec<IssuedCmd>,
    tuning: Option<TuningModel>,
    rx: VecDeque<u8>,
    rx_active: bool,
    tx: Vec<u8>,
    tx_expected: usize,
    data_moved: usize,
    crc_error_after: Option<usize>,
    byte_accesses: usize,
    word_accesses: usize,
}

pub struct SimRegs {
    state: RefCell<SimState>,
    clock: SimDelay,
}

impl SimRegs {
    /// `tune_reg` is the pad tune register the host under test uses.
    pub fn new(tune_reg: u32) -> Self {
        SimRegs {
            state: RefCell::new(SimState {
                regs: [0; REG_WORDS],
                tune_reg,
                reset_stuck: false,
                clock_unstable: false,
                cmd_busy: false,
                dat0_release_us: None,
                cmd_glitches: [0; PAD_DELAY_MAX as usize],
                resets: 0,
                fifo_clears: 0,
                script: VecDeque::new(),
                issued: Vec::new(),
                tuning: None,
                rx: VecDeque::new(),
                rx_active: false,
                tx: Vec::new(),
                tx_expected: 0,
                data_moved: 0,
                crc_error_after: None,
                byte_accesses: 0,
                word_accesses: 0,
            }),
            clock: SimDelay::default(),
        }
    }

    /// A delay sharing this block's clock.
    pub fn delay(&self) -> SimDelay {
        self.clock.clone()
    }

    /// Raw register content, bypassing read side effects.
    pub fn peek(&self, offset: u32) -> u32 {
        self.state.borrow().regs[idx(offset)]
    }

    pub fn poke(&self, offset: u32, value: u32) {
        self.state.borrow_mut().regs[idx(offset)] = value;
    }

    pub fn push_command(&self, cmd: SimCommand) {
        self.state.borrow_mut().script.push_back(cmd);
    }

    pub fn set_tuning(&self, model: TuningModel) {
        self.state.borrow_mut().tuning = Some(model);
    }

    pub fn set_reset_stuck(&self, stuck: bool) {
        self.state.borrow_mut().reset_stuck = stuck;
    }

    pub fn set_clock_unstable(&self, unstable: bool) {
        self.state.borrow_mut().clock_unstable = unstable;
    }

    pub fn set_cmd_busy(&self, busy: bool) {
        self.state.borrow_mut().cmd_busy = busy;
    }

    /// Pull DAT0 low now and release it `us` microseconds of simulated time
    /// later.
    pub fn hold_dat0_for(&self, us: u64) {
        let mut state = self.state.borrow_mut();
        state.regs[idx(MSDC_PS)] &= !MSDC_PS_DAT0;
        state.dat0_release_us = Some(self.clock.elapsed_us() + us);
    }

    pub fn resets(&self) -> u32 {
        self.state.borrow().resets
    }

    pub fn fifo_clears(&self) -> u32 {
        self.state.borrow().fifo_clears
    }

    pub fn issued(&self) -> Vec<IssuedCmd> {
        self.state.borrow().issued.clone()
    }

    pub fn tx_data(&self) -> Vec<u8> {
        self.state.borrow().tx.clone()
    }

    pub fn rx_remaining(&self) -> usize {
        self.state.borrow().rx.len()
    }

    /// 8-bit accesses to the data ports.
    pub fn byte_accesses(&self) -> usize {
        self.state.borrow().byte_accesses
    }

    /// 32-bit accesses to the data ports.
    pub fn word_accesses(&self) -> usize {
        self.state.borrow().word_accesses
    }
}

fn idx(offset: u32) -> usize {
    (offset / 4) as usize
}

impl SimState {
    fn raise(&mut self, bits: MsdcInt) {
        self.regs[idx(MSDC_INT)] |= bits.bits();
    }

    fn data_progress(&mut self, bytes: usize) {
        self.data_moved += bytes;

        if self
            .crc_error_after
            .is_some_and(|limit| self.data_moved >= limit)
        {
            self.crc_error_after = None;
            self.rx_active = false;
            self.tx_expected = 0;
            self.raise(MsdcInt::DATCRCERR);
        }
    }

    fn pop_rx(&mut self) -> u8 {
        let byte = self.rx.pop_front().unwrap_or(0);

        if self.rx_active && self.rx.is_empty() {
            self.rx_active = false;
            self.raise(MsdcInt::XFER_COMPL);
        }
        byte
    }

    fn push_tx(&mut self, byte: u8) {
        self.tx.push(byte);

        if self.tx_expected != 0 && self.tx.len() == self.tx_expected {
            self.tx_expected = 0;
            self.raise(MsdcInt::XFER_COMPL);
        }
    }

    fn fifocs(&self) -> u32 {
        let rx = self.rx.len().min(MSDC_FIFO_SIZE) as u32;
        let clr = self.regs[idx(MSDC_FIFOCS)] & MSDC_FIFOCS_CLR;
        MSDC_FIFOCS_RXCNT.insert(clr, rx)
    }

    fn clear_fifo(&mut self) {
        self.rx.clear();
        self.rx_active = false;
    }

    fn start_data(&mut self, rawcmd: u32, blocks: u32, read_data: Vec<u8>, crc: Option<usize>) {
        self.data_moved = 0;
        self.crc_error_after = crc;

        if rawcmd & SDC_CMD_WR != 0 {
            self.tx.clear();
            self.tx_expected = SDC_CMD_BLK_LEN.extract(rawcmd) as usize * blocks as usize;
        } else {
            self.rx = read_data.into();
            self.rx_active = true;
            if self.rx.is_empty() {
                self.rx_active = false;
                self.raise(MsdcInt::XFER_COMPL);
            }
        }
    }

    fn execute(&mut self, rawcmd: u32) {
        let opcode = SDC_CMD_CMD.extract(rawcmd);
        let blocks = self.regs[idx(SDC_BLK_NUM)];
        let arg = self.regs[idx(SDC_ARG)];
        self.issued.push(IssuedCmd {
            opcode,
            rawcmd,
            arg,
            blocks,
        });

        let has_data = blocks != 0;
        let is_tuning = opcode == MMC_CMD_SEND_TUNING_BLOCK as u32
            || opcode == MMC_CMD_SEND_TUNING_BLOCK_HS200 as u32;

        if let (true, Some(model)) = (is_tuning, self.tuning.clone()) {
            self.execute_tuning(&model, rawcmd, blocks);
            return;
        }

        let cmd = self
            .script
            .pop_front()
            .unwrap_or_else(|| SimCommand::ready([0; 4]));

        for (i, resp) in cmd.resp.iter().enumerate() {
            self.regs[idx(SDC_RESP0) + i] = *resp;
        }

        match cmd.outcome {
            SimOutcome::Ready => {
                self.raise(MsdcInt::CMDRDY);
                if has_data {
                    self.start_data(rawcmd, blocks, cmd.read_data, cmd.crc_error_after);
                }
            }
            SimOutcome::Timeout => self.raise(MsdcInt::CMDTMO),
            SimOutcome::CrcError => self.raise(MsdcInt::RSPCRCERR),
            SimOutcome::NoResponse => {}
        }
    }

    fn execute_tuning(&mut self, model: &TuningModel, rawcmd: u32, blocks: u32) {
        let iocon = self.regs[idx(MSDC_IOCON)];
        let tune = self.regs[idx(self.tune_reg)];
        let cmd_delay = (tune >> MSDC_PAD_TUNE_CMDRDLY_S) & MSDC_PAD_TUNE_CMDRDLY_M;
        let data_delay = (tune >> MSDC_PAD_TUNE_DATRRDLY_S) & MSDC_PAD_TUNE_DATRRDLY_M;

        let cmd_map = if iocon & MSDC_IOCON_RSPL != 0 {
            model.cmd_fall
        } else {
            model.cmd_rise
        };
        let mut cmd_ok = cmd_map & (1 << cmd_delay) != 0
            && model.cmd_fail_at_data_delay != Some(data_delay);

        let glitches = &mut self.cmd_glitches[data_delay as usize];
        let glitch = model.cmd_glitch_delays & (1 << data_delay) != 0
            && *glitches < model.cmd_glitch_reads;
        if cmd_ok && glitch {
            *glitches += 1;
            cmd_ok = false;
        }

        if !cmd_ok {
            self.raise(MsdcInt::RSPCRCERR);
            return;
        }
        self.raise(MsdcInt::CMDRDY);

        let data_map = if iocon & MSDC_IOCON_DSPL != 0 {
            model.data_fall
        } else {
            model.data_rise
        };

        let size = SDC_CMD_BLK_LEN.extract(rawcmd) as usize;
        let mut block = if size == TUNING_BLK_PATTERN_8BIT.len() {
            TUNING_BLK_PATTERN_8BIT.to_vec()
        } else {
            TUNING_BLK_PATTERN_4BIT.to_vec()
        };

        // a bad sampling point shows up as corrupted pattern data
        if data_map & (1 << data_delay) == 0 {
            block[0] ^= 0xff;
        }

        self.start_data(rawcmd, blocks, block, None);
    }
}

impl RegisterIo for SimRegs {
    fn read_reg8(&self, offset: u32) -> u8 {
        let mut state = self.state.borrow_mut();

        if offset == MSDC_RXDATA {
            state.byte_accesses += 1;
            let byte = state.pop_rx();
            state.data_progress(1);
            return byte;
        }

        drop(state);
        (self.read_reg32(offset & !3) >> ((offset & 3) * 8)) as u8
    }

    fn read_reg32(&self, offset: u32) -> u32 {
        let now_us = self.clock.elapsed_us();
        let mut state = self.state.borrow_mut();

        match offset {
            MSDC_PS => {
                if state.dat0_release_us.is_some_and(|at| now_us >= at) {
                    state.dat0_release_us = None;
                    state.regs[idx(MSDC_PS)] |= MSDC_PS_DAT0;
                }
                state.regs[idx(MSDC_PS)]
            }
            MSDC_CFG => {
                let mut reg = state.regs[idx(MSDC_CFG)];
                if !state.clock_unstable {
                    reg |= MSDC_CFG_CKSTB;
                }
                reg
            }
            MSDC_FIFOCS => state.fifocs(),
            SDC_STS => {
                if state.cmd_busy {
                    SDC_STS_CMDBUSY
                } else {
                    0
                }
            }
            MSDC_RXDATA => {
                state.word_accesses += 1;
                let bytes = [state.pop_rx(), state.pop_rx(), state.pop_rx(), state.pop_rx()];
                state.data_progress(4);
                u32::from_le_bytes(bytes)
            }
            _ => state.regs[idx(offset)],
        }
    }

    fn write_reg8(&self, offset: u32, value: u8) {
        let mut state = self.state.borrow_mut();

        if offset == MSDC_TXDATA {
            state.byte_accesses += 1;
            state.push_tx(value);
            state.data_progress(1);
            return;
        }

        let shift = (offset & 3) * 8;
        let i = idx(offset);
        state.regs[i] = (state.regs[i] & !(0xff << shift)) | ((value as u32) << shift);
    }

    fn write_reg32(&self, offset: u32, value: u32) {
        let mut state = self.state.borrow_mut();

        match offset {
            MSDC_CFG => {
                let mut value = value & !MSDC_CFG_CKSTB;
                if value & MSDC_CFG_RST != 0 {
                    state.resets += 1;
                    if !state.reset_stuck {
                        value &= !MSDC_CFG_RST;
                    }
                }
                state.regs[idx(MSDC_CFG)] = value;
            }
            MSDC_FIFOCS => {
                if value & MSDC_FIFOCS_CLR != 0 {
                    state.fifo_clears += 1;
                    state.clear_fifo();
                }
            }
            // write 1 to clear
            MSDC_INT => state.regs[idx(MSDC_INT)] &= !value,
            MSDC_TXDATA => {
                state.word_accesses += 1;
                for byte in value.to_le_bytes() {
                    state.push_tx(byte);
                }
                state.data_progress(4);
            }
            SDC_CMD => {
                state.regs[idx(SDC_CMD)] = value;
                state.execute(value);
            }
            _ => state.regs[idx(offset)] = value,
        }
    }
}
