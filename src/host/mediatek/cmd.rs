use embedded_hal::delay::DelayNs;
use log::{debug, error, trace, warn};

use crate::{
    common::commands::{DataBuffer, MmcCommand, MmcResponse, ResponseType},
    constants::*,
    host::{MmcHostError, MmcHostResult, mediatek::MsdcHost},
    regs::{RegisterFieldExt, RegisterIo},
};

/// `SDC_CMD.RSPTYP` code for a response class. R5, R6 and R7 go out as R1.
pub fn resp_code(resp_type: ResponseType) -> u32 {
    match resp_type {
        ResponseType::None => 0x0,
        ResponseType::R1 => 0x1,
        ResponseType::R1b => 0x7,
        ResponseType::R2 => 0x2,
        ResponseType::R3 => 0x3,
    }
}

pub(crate) fn is_tuning_opcode(opcode: u8) -> bool {
    opcode == MMC_CMD_SEND_TUNING_BLOCK || opcode == MMC_CMD_SEND_TUNING_BLOCK_HS200
}

/// Compose the raw `SDC_CMD` word for `cmd`.
pub fn prepare_raw_cmd(cmd: &MmcCommand) -> u32 {
    let opcode = cmd.opcode;

    // data type: 0 none, 1 single block, 2 multiple blocks
    let mut dtype = match opcode {
        MMC_CMD_WRITE_MULTIPLE_BLOCK | MMC_CMD_READ_MULTIPLE_BLOCK => 2,
        MMC_CMD_WRITE_SINGLE_BLOCK | MMC_CMD_READ_SINGLE_BLOCK | SD_CMD_APP_SEND_SCR => 1,
        // also MMC SWITCH, SEND_EXT_CSD and SEND_STATUS
        SD_CMD_SWITCH_FUNC | SD_CMD_SEND_IF_COND | SD_CMD_APP_SD_STATUS if cmd.data_present => 1,
        _ => 0,
    };

    let mut rawcmd = 0;
    let mut blocksize = 0;

    if cmd.data_present {
        if !cmd.data_dir_read {
            rawcmd |= SDC_CMD_WR;
        }

        if cmd.block_count > 1 {
            dtype = 2;
        }

        blocksize = cmd.block_size as u32;
    }

    rawcmd = SDC_CMD_CMD.insert(rawcmd, opcode as u32);
    rawcmd = SDC_CMD_RSPTYP.insert(rawcmd, resp_code(cmd.resp_type));
    rawcmd = SDC_CMD_BLK_LEN.insert(rawcmd, blocksize);
    rawcmd = SDC_CMD_DTYPE.insert(rawcmd, dtype);

    if opcode == MMC_CMD_STOP_TRANSMISSION {
        rawcmd |= SDC_CMD_STOP;
    }

    rawcmd
}

impl<R: RegisterIo, D: DelayNs> MsdcHost<R, D> {
    // Send command, then move the data phase if one is attached
    pub fn send_command(
        &mut self,
        cmd: &MmcCommand,
        data_buffer: Option<DataBuffer>,
    ) -> MmcHostResult<MmcResponse> {
        match (&data_buffer, cmd.data_present) {
            (None, false) => {}
            (Some(buf), true)
                if buf.is_write() != cmd.data_dir_read
                    && buf.len() >= cmd.data_len()
                    && cmd.block_count as u32 <= MAX_BLOCK_COUNT => {}
            _ => {
                warn!("CMD{}: data buffer does not match the command", cmd.opcode);
                return Err(MmcHostError::InvalidValue);
            }
        }

        let resp = self.start_command(cmd)?;

        if let Some(buf) = data_buffer {
            self.start_data(cmd, buf)?;
        }

        Ok(resp)
    }

    // Wait for the CMD line and, after a busy write, for the card to release DAT0
    fn cmd_is_ready(&mut self) -> MmcHostResult {
        if let Err(e) = self.regs.poll_until(
            SDC_STS,
            |reg| reg & SDC_STS_CMDBUSY == 0,
            CMD_BUSY_TIMEOUT_US,
            &mut self.delay,
        ) {
            error!("CMD bus busy detected: {}", e);
            self.recover(false);
            return Err(MmcHostError::BusBusy);
        }

        if self.last_resp_type == ResponseType::R1b && self.last_data_write {
            if let Err(e) = self.regs.poll_until(
                MSDC_PS,
                |reg| reg & MSDC_PS_DAT0 != 0,
                CARD_BUSY_TIMEOUT_US,
                &mut self.delay,
            ) {
                error!("Card stuck in programming state: {}", e);
                self.recover(false);
                return Err(MmcHostError::BusBusy);
            }
        }

        Ok(())
    }

    /// Issue `cmd` and wait for its response. The data phase is left to the
    /// caller.
    pub(crate) fn start_command(&mut self, cmd: &MmcCommand) -> MmcHostResult<MmcResponse> {
        self.cmd_is_ready()?;

        self.fifo_clr()?;

        self.last_resp_type = cmd.resp_type;
        self.last_data_write = false;

        let rawcmd = prepare_raw_cmd(cmd);
        let blocks = if cmd.data_present {
            cmd.block_count as u32
        } else {
            0
        };

        trace!(
            "CMD{}: arg {:#x}, rawcmd {:#x}, blocks {}",
            cmd.opcode, cmd.arg, rawcmd, blocks
        );

        self.regs.write_reg32(MSDC_INT, MsdcInt::CMD_INTS.bits());
        self.regs.write_reg32(SDC_BLK_NUM, blocks);
        self.regs.write_reg32(SDC_ARG, cmd.arg);
        self.regs.write_reg32(SDC_CMD, rawcmd);

        let events = match self.regs.poll_until(
            MSDC_INT,
            |status| MsdcInt::from_bits_truncate(status).intersects(MsdcInt::CMD_INTS),
            CMD_DONE_TIMEOUT_US,
            &mut self.delay,
        ) {
            Ok(status) => MsdcInt::from_bits_truncate(status),
            Err(e) => {
                warn!("CMD{}: no completion: {}", cmd.opcode, e);
                MsdcInt::CMDTMO
            }
        };

        self.cmd_done(events, cmd)
    }

    fn cmd_done(&mut self, events: MsdcInt, cmd: &MmcCommand) -> MmcHostResult<MmcResponse> {
        let mut resp = MmcResponse::new();

        if cmd.resp_type.is_present() {
            if cmd.resp_type.is_long() {
                resp.raw = [
                    self.regs.read_reg32(SDC_RESP3),
                    self.regs.read_reg32(SDC_RESP2),
                    self.regs.read_reg32(SDC_RESP1),
                    self.regs.read_reg32(SDC_RESP0),
                ];
            } else {
                resp.raw[0] = self.regs.read_reg32(SDC_RESP0);
            }
        }

        if events.contains(MsdcInt::CMDRDY) {
            return Ok(resp);
        }

        let err = if events.contains(MsdcInt::CMDTMO) {
            MmcHostError::Timeout
        } else {
            MmcHostError::CrcError
        };

        // Tuning data may already sit in the FIFO, keep it
        if is_tuning_opcode(cmd.opcode) {
            debug!("CMD{} failed during tuning: {}", cmd.opcode, err);
        } else {
            warn!("CMD{} failed: {} (events {:?})", cmd.opcode, err, events);
            self.recover(false);
        }

        Err(err)
    }
}
