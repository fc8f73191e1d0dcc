use embedded_hal::delay::DelayNs;
use log::{debug, error, info, warn};

use crate::{
    common::commands::{DataBuffer, MmcCommand, ResponseType},
    constants::*,
    host::{
        MmcHostError, MmcHostResult,
        mediatek::{DelayPhase, MsdcHost, caps::MsdcFeatures},
    },
    regs::{RegField, RegisterFieldExt, RegisterIo},
};

/// Tuning block reads per delay tap; the first failure ends the tap.
const SCAN_ATTEMPTS: u32 = 3;
/// Response retunes a single data tuning run may trigger.
const MAX_INLINE_RETUNE: u32 = 3;

/// Which half of a tuning block read went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TuningFault {
    Command(MmcHostError),
    Data(MmcHostError),
}

// Length of the run of set bits starting at `start`, without wrapping
fn delay_len(map: u32, start: u32) -> u32 {
    (0..PAD_DELAY_MAX - start)
        .find(|i| map & (1 << (start + i)) == 0)
        .unwrap_or(PAD_DELAY_MAX - start)
}

/// Pick the sampling phase from a pass map of the 32 delay taps.
///
/// The longest run of passing taps wins; a run of 12 or more that starts in
/// the first 4 taps ends the search early. Runs starting at tap 0 settle a
/// third of the way in, others in the middle.
pub fn get_best_delay(map: u32) -> DelayPhase {
    if map == 0 {
        warn!("phase error: [map:{:#x}]", map);
        return DelayPhase::none();
    }

    let mut start = 0;
    let mut start_final = 0;
    let mut len_final = 0;

    while start < PAD_DELAY_MAX {
        let len = delay_len(map, start);
        if len_final < len {
            start_final = start;
            len_final = len;
        }

        start += if len > 0 { len } else { 1 };
        if len >= 12 && start_final < 4 {
            break;
        }
    }

    let final_phase = if start_final == 0 {
        (start_final + len_final / 3) % PAD_DELAY_MAX
    } else {
        (start_final + len_final / 2) % PAD_DELAY_MAX
    };

    debug!(
        "phase: [map:{:#010x}] [maxlen:{}] [final:{}]",
        map, len_final, final_phase
    );

    DelayPhase {
        maxlen: len_final as u8,
        start: start_final as u8,
        final_phase: final_phase as u8,
    }
}

/// Rising edge margin good enough to skip the falling edge scan.
fn enough_margin(rise: &DelayPhase) -> bool {
    rise.maxlen >= 12 || (rise.start == 0 && rise.maxlen >= 4)
}

impl<R: RegisterIo, D: DelayNs> MsdcHost<R, D> {
    pub(crate) fn msdc_execute_tuning(&mut self, opcode: u8) -> MmcHostResult {
        info!(
            "Tuning CMD{} at {} Hz, timing {:?}, bus width {}",
            opcode, self.sclk, self.timing, self.bus_width
        );

        if let Err(e) = self.tune_response(opcode) {
            error!("Tune response fail: {}", e);
            return Err(e);
        }

        let ret = self.tune_data(opcode);
        if let Err(e) = ret {
            error!("Tune data fail: {}", e);
        }

        self.saved_tune_para = self.capture_tune_para();
        info!(
            "saved tune para: iocon {:#x}, pad_tune {:#x}",
            self.saved_tune_para.iocon, self.saved_tune_para.pad_tune
        );

        ret
    }

    fn pad_field(&self, mask: u32, shift: u32) -> RegField {
        RegField::new(self.tune_reg(), mask, shift)
    }

    /// Read one tuning block and check it against the reference pattern.
    pub(crate) fn send_tuning(&mut self, opcode: u8) -> Result<(), TuningFault> {
        let expected: &[u8] =
            if opcode == MMC_CMD_SEND_TUNING_BLOCK_HS200 && self.bus_width == 8 {
                &TUNING_BLK_PATTERN_8BIT
            } else {
                &TUNING_BLK_PATTERN_4BIT
            };
        let size = expected.len();

        let cmd = MmcCommand::new(opcode, 0, ResponseType::R1).with_data(size as u16, 1, true);
        self.start_command(&cmd).map_err(TuningFault::Command)?;

        let mut buf = [0u8; TUNING_BLK_PATTERN_8BIT.len()];
        self.start_data(&cmd, DataBuffer::Read(&mut buf[..size]))
            .map_err(TuningFault::Data)?;

        if buf[..size] != *expected {
            return Err(TuningFault::Data(MmcHostError::CrcError));
        }

        Ok(())
    }

    // Bit i of the result is set when every attempt at delay i got a response
    fn scan_response_map(&mut self, opcode: u8, field: RegField) -> u32 {
        let mut map = 0;

        for phase in 0..PAD_DELAY_MAX {
            self.regs.write_field(field, phase);

            let passed = (0..SCAN_ATTEMPTS).all(|_| {
                !matches!(self.send_tuning(opcode), Err(TuningFault::Command(_)))
            });

            if passed {
                map |= 1 << phase;
            }
        }

        map
    }

    // Bit i of the result is set when the block read at delay i matched.
    // A missing response means the response delay drifted, so it is retuned
    // in place.
    fn scan_data_map(
        &mut self,
        opcode: u8,
        field: RegField,
        retunes: &mut u32,
    ) -> MmcHostResult<u32> {
        let mut map = 0;

        for phase in 0..PAD_DELAY_MAX {
            self.regs.write_field(field, phase);

            let mut passed = true;
            for _ in 0..SCAN_ATTEMPTS {
                match self.send_tuning(opcode) {
                    Ok(()) => continue,
                    Err(TuningFault::Data(_)) => {}
                    Err(TuningFault::Command(e)) if *retunes >= MAX_INLINE_RETUNE => {
                        debug!("data delay {}: command error {}, retune budget spent", phase, e);
                    }
                    Err(TuningFault::Command(e)) => {
                        *retunes += 1;
                        info!("data delay {}: command error {}, retuning response", phase, e);
                        self.tune_response(opcode)?;
                    }
                }

                passed = false;
                break;
            }

            if passed {
                map |= 1 << phase;
            }
        }

        Ok(map)
    }

    pub(crate) fn tune_response(&mut self, opcode: u8) -> MmcHostResult {
        let cmd_delay = self.pad_field(MSDC_PAD_TUNE_CMDRDLY_M, MSDC_PAD_TUNE_CMDRDLY_S);
        let cmd_int_delay = self.pad_field(MSDC_PAD_TUNE_CMDRRDLY_M, MSDC_PAD_TUNE_CMDRRDLY_S);

        if self.timing.is_hs200_class() {
            self.regs.write_field(cmd_int_delay, self.hs200_cmd_int_delay);
        }

        self.regs.clr_bits(MSDC_IOCON, MSDC_IOCON_RSPL);
        let rise = get_best_delay(self.scan_response_map(opcode, cmd_delay));

        let fall = if enough_margin(&rise) {
            DelayPhase::none()
        } else {
            self.regs.set_bits(MSDC_IOCON, MSDC_IOCON_RSPL);
            get_best_delay(self.scan_response_map(opcode, cmd_delay))
        };

        let best = if fall.maxlen > rise.maxlen {
            self.regs.set_bits(MSDC_IOCON, MSDC_IOCON_RSPL);
            fall
        } else {
            self.regs.clr_bits(MSDC_IOCON, MSDC_IOCON_RSPL);
            rise
        };

        if !best.is_valid() {
            error!("no usable cmd pad delay");
            return Err(MmcHostError::TuningFailed);
        }
        self.regs.write_field(cmd_delay, best.final_phase as u32);

        if !self.comp.has(MsdcFeatures::ASYNC_FIFO) && self.hs200_cmd_int_delay == 0 {
            let internal_map = self.scan_response_map(opcode, cmd_int_delay);
            let internal = get_best_delay(internal_map);
            info!("Final internal delay: {:#x}", internal_map);

            if internal.is_valid() {
                self.regs.write_field(cmd_int_delay, internal.final_phase as u32);
            }
        }

        info!("Final cmd pad delay: {}", best.final_phase);
        Ok(())
    }

    pub(crate) fn tune_data(&mut self, opcode: u8) -> MmcHostResult {
        let data_delay = self.pad_field(MSDC_PAD_TUNE_DATRRDLY_M, MSDC_PAD_TUNE_DATRRDLY_S);
        let data_edge = MSDC_IOCON_DSPL | MSDC_IOCON_W_DSPL;
        let mut retunes = 0;

        self.regs.clr_bits(MSDC_IOCON, data_edge);
        let rise = get_best_delay(self.scan_data_map(opcode, data_delay, &mut retunes)?);

        let fall = if enough_margin(&rise) {
            DelayPhase::none()
        } else {
            self.regs.set_bits(MSDC_IOCON, data_edge);
            get_best_delay(self.scan_data_map(opcode, data_delay, &mut retunes)?)
        };

        let best = if fall.maxlen > rise.maxlen {
            self.regs.set_bits(MSDC_IOCON, data_edge);
            fall
        } else {
            self.regs.clr_bits(MSDC_IOCON, data_edge);
            rise
        };

        if best.is_valid() {
            self.regs.write_field(data_delay, best.final_phase as u32);
        }

        if self.timing.is_hs200_class() {
            let write_delay =
                self.pad_field(MSDC_PAD_TUNE_DATWRDLY_M, MSDC_PAD_TUNE_DATWRDLY_S);
            self.regs.write_field(write_delay, self.hs200_write_int_delay);
        }

        if !best.is_valid() {
            error!("no usable data pad delay");
            return Err(MmcHostError::TuningFailed);
        }

        info!("Final data pad delay: {}", best.final_phase);
        Ok(())
    }
}
