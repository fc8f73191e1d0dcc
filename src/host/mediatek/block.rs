use embedded_hal::delay::DelayNs;
use log::{error, trace, warn};

use crate::{
    common::commands::{DataBuffer, MmcCommand},
    constants::*,
    host::{MmcHostError, MmcHostResult, mediatek::MsdcHost},
    regs::{RegisterFieldExt, RegisterIo},
};

impl<R: RegisterIo, D: DelayNs> MsdcHost<R, D> {
    /// Move the data phase of `cmd` through the FIFO by PIO.
    ///
    /// On any error the controller is reset and the FIFO cleared before the
    /// error is returned.
    pub(crate) fn start_data(&mut self, cmd: &MmcCommand, data: DataBuffer) -> MmcHostResult {
        let size = cmd.data_len();

        if data.is_write() {
            self.last_data_write = true;
        }

        self.regs.write_reg32(MSDC_INT, MsdcInt::DATA_INTS.bits());

        let ret = match data {
            DataBuffer::Write(src) => self.pio_write(&src[..size]),
            DataBuffer::Read(dst) => self.pio_read(&mut dst[..size]),
        };

        if let Err(e) = ret {
            warn!("CMD{} data phase failed: {}", cmd.opcode, e);
            self.recover(true);
        }

        ret
    }

    // Read and acknowledge the pending data interrupts
    fn take_data_events(&self) -> MsdcInt {
        let status = self.regs.read_reg32(MSDC_INT);
        self.regs.write_reg32(MSDC_INT, status);

        MsdcInt::from_bits_truncate(status) & MsdcInt::DATA_INTS
    }

    fn data_error(events: MsdcInt) -> MmcHostResult {
        if events.contains(MsdcInt::DATCRCERR) {
            return Err(MmcHostError::CrcError);
        }

        if events.contains(MsdcInt::DATTMO) {
            return Err(MmcHostError::Timeout);
        }

        Ok(())
    }

    pub(crate) fn fifo_rx_bytes(&self) -> usize {
        self.regs.read_field(MSDC_FIFOCS_RXCNT) as usize
    }

    pub(crate) fn fifo_tx_bytes(&self) -> usize {
        self.regs.read_field(MSDC_FIFOCS_TXCNT) as usize
    }

    pub(crate) fn pio_read(&mut self, buf: &mut [u8]) -> MmcHostResult {
        let mut done = 0;
        let mut idle_us = 0;

        loop {
            let events = self.take_data_events();
            Self::data_error(events)?;

            if events.contains(MsdcInt::XFER_COMPL) {
                if done < buf.len() {
                    error!("data not fully read: {} of {} bytes", done, buf.len());
                    return Err(MmcHostError::IncompleteTransfer);
                }
                return Ok(());
            }

            let chunk = (buf.len() - done).min(MSDC_FIFO_SIZE);

            if chunk > 0 && self.fifo_rx_bytes() >= chunk {
                self.fifo_read(&mut buf[done..done + chunk]);
                done += chunk;
                idle_us = 0;
                continue;
            }

            if idle_us >= DATA_DONE_TIMEOUT_US {
                error!("read stalled at {} of {} bytes", done, buf.len());
                return Err(MmcHostError::Timeout);
            }
            self.delay.delay_us(1);
            idle_us += 1;
        }
    }

    pub(crate) fn pio_write(&mut self, buf: &[u8]) -> MmcHostResult {
        let mut done = 0;
        let mut idle_us = 0;

        loop {
            let events = self.take_data_events();
            Self::data_error(events)?;

            if events.contains(MsdcInt::XFER_COMPL) {
                if done < buf.len() {
                    error!("data not fully written: {} of {} bytes", done, buf.len());
                    return Err(MmcHostError::IncompleteTransfer);
                }
                return Ok(());
            }

            let chunk = (buf.len() - done).min(MSDC_FIFO_SIZE);
            let room = MSDC_FIFO_SIZE.saturating_sub(self.fifo_tx_bytes());

            if chunk > 0 && room >= chunk {
                self.fifo_write(&buf[done..done + chunk]);
                done += chunk;
                idle_us = 0;
                continue;
            }

            if idle_us >= DATA_DONE_TIMEOUT_US {
                error!("write stalled at {} of {} bytes", done, buf.len());
                return Err(MmcHostError::Timeout);
            }
            self.delay.delay_us(1);
            idle_us += 1;
        }
    }

    /// Drain `buf.len()` bytes from the RX port. Bytes up to the first 4-byte
    /// boundary of `buf` and any tail are moved with byte accesses.
    pub(crate) fn fifo_read(&self, buf: &mut [u8]) {
        let head = buf.as_ptr().align_offset(4).min(buf.len());
        let (head, body) = buf.split_at_mut(head);

        for byte in head.iter_mut() {
            *byte = self.regs.read_reg8(MSDC_RXDATA);
        }

        let mut words = body.chunks_exact_mut(4);
        for word in &mut words {
            word.copy_from_slice(&self.regs.read_reg32(MSDC_RXDATA).to_le_bytes());
        }

        for byte in words.into_remainder() {
            *byte = self.regs.read_reg8(MSDC_RXDATA);
        }

        trace!("fifo read {} bytes", buf.len());
    }

    pub(crate) fn fifo_write(&self, buf: &[u8]) {
        let head = buf.as_ptr().align_offset(4).min(buf.len());
        let (head, body) = buf.split_at(head);

        for &byte in head {
            self.regs.write_reg8(MSDC_TXDATA, byte);
        }

        let words = body.chunks_exact(4);
        let tail = words.remainder();
        for word in words {
            let word = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            self.regs.write_reg32(MSDC_TXDATA, word);
        }

        for &byte in tail {
            self.regs.write_reg8(MSDC_TXDATA, byte);
        }

        trace!("fifo write {} bytes", buf.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::commands::ResponseType,
        host::mediatek::{
            MsdcConfig,
            caps::MsdcCompatible,
            sim::{SimCommand, SimHost, sim_host},
        },
    };

    #[repr(C, align(4))]
    struct Aligned([u8; 140]);

    fn host() -> SimHost {
        let mut host = sim_host(&MsdcCompatible::MT7621, MsdcConfig::mt7621_config());
        host.init_host().unwrap();
        host
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    #[test]
    fn unaligned_read_preserves_bytes() {
        let mut host = host();
        let payload = pattern(130);
        host.regs()
            .push_command(SimCommand::ready([0; 4]).with_read_data(payload.clone()));

        let mut buf = Aligned([0; 140]);
        let dst = &mut buf.0[1..131];
        assert_eq!(dst.as_ptr() as usize % 4, 1);

        let cmd = MmcCommand::new(MMC_CMD_READ_MULTIPLE_BLOCK, 0, ResponseType::R1)
            .with_data(65, 2, true);
        let data = Some(DataBuffer::Read(dst));
        host.send_command(&cmd, data).unwrap();

        assert_eq!(&buf.0[1..131], payload.as_slice());
        assert_eq!(buf.0[0], 0);
        assert_eq!(buf.0[131], 0);
        assert_eq!(host.regs().rx_remaining(), 0);
        // head and tail bytes go through byte accesses, the rest as words
        assert!(host.regs().byte_accesses() > 0);
        assert_eq!(host.regs().byte_accesses() + 4 * host.regs().word_accesses(), 130);
    }

    #[test]
    fn unaligned_write_preserves_bytes() {
        let mut host = host();
        let payload = pattern(133);

        let mut buf = Aligned([0; 140]);
        buf.0[3..136].copy_from_slice(&payload);

        let cmd = MmcCommand::new(MMC_CMD_WRITE_SINGLE_BLOCK, 0, ResponseType::R1)
            .with_data(133, 1, false);
        let data = Some(DataBuffer::Write(&buf.0[3..136]));
        host.send_command(&cmd, data).unwrap();

        assert_eq!(host.regs().tx_data(), payload);
    }

    #[test]
    fn write_crc_error_resets_and_clears_fifo() {
        let mut host = host();
        host.regs()
            .push_command(SimCommand::ready([0; 4]).with_crc_error_after(256));

        let data = pattern(512);
        let cmd = MmcCommand::new(MMC_CMD_WRITE_SINGLE_BLOCK, 0, ResponseType::R1)
            .with_data(512, 1, false);

        let resets = host.regs().resets();
        let clears = host.regs().fifo_clears();

        assert_eq!(
            host.send_command(&cmd, Some(DataBuffer::Write(&data))),
            Err(MmcHostError::CrcError)
        );
        assert_eq!(host.regs().resets(), resets + 1);
        // one clear before the command, one for recovery
        assert_eq!(host.regs().fifo_clears(), clears + 2);
        assert!(host.regs().tx_data().len() < 512);
    }

    #[test]
    fn early_completion_is_incomplete_transfer() {
        let mut host = host();
        host.regs()
            .push_command(SimCommand::ready([0; 4]).with_read_data(pattern(128)));

        let mut buf = [0u8; 256];
        let cmd = MmcCommand::new(MMC_CMD_READ_MULTIPLE_BLOCK, 0, ResponseType::R1)
            .with_data(128, 2, true);

        assert_eq!(
            host.send_command(&cmd, Some(DataBuffer::Read(&mut buf))),
            Err(MmcHostError::IncompleteTransfer)
        );
        assert_eq!(buf[..128], pattern(128)[..]);
    }

    #[test]
    fn stalled_read_times_out_after_budget() {
        let mut host = host();
        // half a block arrives, then nothing
        host.regs()
            .push_command(SimCommand::ready([0; 4]).with_read_data(pattern(64)));

        let mut buf = [0u8; 128];
        let cmd = MmcCommand::new(MMC_CMD_READ_SINGLE_BLOCK, 0, ResponseType::R1)
            .with_data(128, 1, true);

        assert_eq!(
            host.send_command(&cmd, Some(DataBuffer::Read(&mut buf))),
            Err(MmcHostError::Timeout)
        );
        assert_eq!(host.delay().elapsed_us(), DATA_DONE_TIMEOUT_US);
        assert_eq!(host.regs().rx_remaining(), 0);
    }

    #[test]
    fn multi_block_read() {
        let mut host = host();
        let payload = pattern(2048);
        host.regs()
            .push_command(SimCommand::ready([0x900, 0, 0, 0]).with_read_data(payload.clone()));

        let mut buf = vec![0u8; 2048];
        let cmd = MmcCommand::new(MMC_CMD_READ_MULTIPLE_BLOCK, 0x800, ResponseType::R1)
            .with_data(512, 4, true);
        let data = Some(DataBuffer::Read(&mut buf));
        let resp = host.send_command(&cmd, data).unwrap();

        assert_eq!(resp.as_r1(), 0x900);
        assert_eq!(buf, payload);
        assert_eq!(host.regs().issued()[0].blocks, 4);
    }
}
