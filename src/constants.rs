//! MSDC register map, bit definitions and MMC opcodes used by the host.

use crate::regs::RegField;

pub const MSDC_CFG: u32 = 0x00;
pub const MSDC_CFG_HS400_CK_MODE_EXT: u32 = 1 << 22;
pub const MSDC_CFG_HS400_CK_MODE: u32 = 1 << 18;
pub const MSDC_CFG_CKSTB: u32 = 1 << 7;
pub const MSDC_CFG_PIO: u32 = 1 << 3;
pub const MSDC_CFG_RST: u32 = 1 << 2;
pub const MSDC_CFG_CKPDN: u32 = 1 << 1;
pub const MSDC_CFG_MODE: u32 = 1 << 0;
// 8-bit divisor layout
pub const MSDC_CFG_CKMOD: RegField = RegField::new(MSDC_CFG, 0x03, 16);
pub const MSDC_CFG_CKDIV: RegField = RegField::new(MSDC_CFG, 0xff, 8);
// 12-bit divisor layout
pub const MSDC_CFG_CKMOD_EXT: RegField = RegField::new(MSDC_CFG, 0x03, 20);
pub const MSDC_CFG_CKDIV_EXT: RegField = RegField::new(MSDC_CFG, 0xfff, 8);

pub const MSDC_IOCON: u32 = 0x04;
pub const MSDC_IOCON_W_DSPL: u32 = 1 << 8;
pub const MSDC_IOCON_DSPL: u32 = 1 << 2;
pub const MSDC_IOCON_RSPL: u32 = 1 << 1;

pub const MSDC_PS: u32 = 0x08;
pub const MSDC_PS_SDWP: u32 = 1 << 31;
pub const MSDC_PS_DAT0: u32 = 1 << 16;
pub const MSDC_PS_CDDBCE: RegField = RegField::new(MSDC_PS, 0x0f, 12);
pub const MSDC_PS_CDSTS: u32 = 1 << 1;
pub const MSDC_PS_CDEN: u32 = 1 << 0;

pub const MSDC_INT: u32 = 0x0c;
pub const MSDC_INTEN: u32 = 0x10;

pub const MSDC_FIFOCS: u32 = 0x14;
pub const MSDC_FIFOCS_CLR: u32 = 1 << 31;
pub const MSDC_FIFOCS_TXCNT: RegField = RegField::new(MSDC_FIFOCS, 0xff, 16);
pub const MSDC_FIFOCS_RXCNT: RegField = RegField::new(MSDC_FIFOCS, 0xff, 0);

pub const MSDC_TXDATA: u32 = 0x18;
pub const MSDC_RXDATA: u32 = 0x1c;

pub const SDC_CFG: u32 = 0x30;
pub const SDC_CFG_DTOC: RegField = RegField::new(SDC_CFG, 0xff, 24);
pub const SDC_CFG_SDIOIDE: u32 = 1 << 20;
pub const SDC_CFG_SDIO: u32 = 1 << 19;
pub const SDC_CFG_BUSWIDTH: RegField = RegField::new(SDC_CFG, 0x03, 16);

pub const SDC_CMD: u32 = 0x34;
pub const SDC_CMD_BLK_LEN: RegField = RegField::new(SDC_CMD, 0xfff, 16);
pub const SDC_CMD_STOP: u32 = 1 << 14;
pub const SDC_CMD_WR: u32 = 1 << 13;
pub const SDC_CMD_DTYPE: RegField = RegField::new(SDC_CMD, 0x03, 11);
pub const SDC_CMD_RSPTYP: RegField = RegField::new(SDC_CMD, 0x07, 7);
pub const SDC_CMD_CMD: RegField = RegField::new(SDC_CMD, 0x3f, 0);

pub const SDC_ARG: u32 = 0x38;

pub const SDC_STS: u32 = 0x3c;
pub const SDC_STS_CMDBUSY: u32 = 1 << 1;
pub const SDC_STS_SDCBUSY: u32 = 1 << 0;

pub const SDC_RESP0: u32 = 0x40;
pub const SDC_RESP1: u32 = 0x44;
pub const SDC_RESP2: u32 = 0x48;
pub const SDC_RESP3: u32 = 0x4c;

pub const SDC_BLK_NUM: u32 = 0x50;

pub const SDC_ADV_CFG0: u32 = 0x64;
pub const SDC_RX_ENHANCE_EN: u32 = 1 << 20;

pub const MSDC_PATCH_BIT: u32 = 0xb0;
pub const MSDC_INT_DAT_LATCH_CK_SEL: RegField = RegField::new(MSDC_PATCH_BIT, 0x07, 7);

pub const MSDC_PATCH_BIT1: u32 = 0xb4;
pub const MSDC_PB1_STOP_DLY: RegField = RegField::new(MSDC_PATCH_BIT1, 0x0f, 8);
pub const MSDC_PB1_BUSY_CHECK_SEL: u32 = 1 << 7;

pub const MSDC_PATCH_BIT2: u32 = 0xb8;
pub const MSDC_PB2_CRCSTSENSEL: RegField = RegField::new(MSDC_PATCH_BIT2, 0x07, 29);
pub const MSDC_PB2_CFGCRCSTS: u32 = 1 << 28;
pub const MSDC_PB2_RESPSTSENSEL: RegField = RegField::new(MSDC_PATCH_BIT2, 0x07, 16);
pub const MSDC_PB2_CFGRESP: u32 = 1 << 15;
pub const MSDC_PB2_RESPWAIT: RegField = RegField::new(MSDC_PATCH_BIT2, 0x03, 2);

pub const MSDC_PAD_TUNE: u32 = 0xec;
pub const MSDC_PAD_TUNE0: u32 = 0xf0;
// Field positions are shared by both pad tune registers.
pub const MSDC_PAD_TUNE_CMDRRDLY_M: u32 = 0x1f;
pub const MSDC_PAD_TUNE_CMDRRDLY_S: u32 = 22;
pub const MSDC_PAD_TUNE_CMD_SEL: u32 = 1 << 21;
pub const MSDC_PAD_TUNE_CMDRDLY_M: u32 = 0x1f;
pub const MSDC_PAD_TUNE_CMDRDLY_S: u32 = 16;
pub const MSDC_PAD_TUNE_RXDLYSEL: u32 = 1 << 15;
pub const MSDC_PAD_TUNE_RD_SEL: u32 = 1 << 13;
pub const MSDC_PAD_TUNE_DATRRDLY_M: u32 = 0x1f;
pub const MSDC_PAD_TUNE_DATRRDLY_S: u32 = 8;
pub const MSDC_PAD_TUNE_DATWRDLY_M: u32 = 0x1f;
pub const MSDC_PAD_TUNE_DATWRDLY_S: u32 = 0;

pub const PAD_DS_TUNE: u32 = 0x188;

pub const EMMC50_CFG0: u32 = 0x208;
pub const EMMC50_CFG_CFCSTS_SEL: u32 = 1 << 4;

pub const SDC_FIFO_CFG: u32 = 0x228;
pub const SDC_FIFO_CFG_WRVALIDSEL: u32 = 1 << 24;
pub const SDC_FIFO_CFG_RDVALIDSEL: u32 = 1 << 25;

pub const MSDC_BUS_1BITS: u32 = 0x0;
pub const MSDC_BUS_4BITS: u32 = 0x1;
pub const MSDC_BUS_8BITS: u32 = 0x2;

pub const MSDC_FIFO_SIZE: usize = 128;
pub const PAD_DELAY_MAX: u32 = 32;
pub const DEFAULT_CD_DEBOUNCE: u32 = 8;

pub const MSDC_PATCH_BIT_DEFAULT: u32 = 0x403c_0046;
pub const MSDC_PATCH_BIT1_DEFAULT: u32 = 0xffff_4089;

// Polling budgets, in microseconds.
pub const RESET_TIMEOUT_US: u64 = 1_000_000;
pub const FIFO_CLR_TIMEOUT_US: u64 = 1_000_000;
pub const CMD_BUSY_TIMEOUT_US: u64 = 20_000;
pub const CARD_BUSY_TIMEOUT_US: u64 = 1_000_000;
pub const CLK_STABLE_TIMEOUT_US: u64 = 1_000_000;
pub const CMD_DONE_TIMEOUT_US: u64 = 1_000_000;
/// Longest stretch a PIO transfer may go without FIFO progress.
pub const DATA_DONE_TIMEOUT_US: u64 = 1_000_000;

pub const DEFAULT_TIMEOUT_NS: u32 = 100_000_000;
pub const DEFAULT_TIMEOUT_CLKS: u32 = 3 * 1_048_576;

/// Above this sampling clock the tuned snapshot is restored on clock changes.
pub const TUNED_SCLK_THRESHOLD: u32 = 52_000_000;

pub const MAX_BLOCK_COUNT: u32 = 1024;

// MMC / SD opcodes the host treats specially
pub const MMC_CMD_GO_IDLE_STATE: u8 = 0;
pub const SD_CMD_SWITCH_FUNC: u8 = 6;
pub const MMC_CMD_SWITCH: u8 = 6;
pub const SD_CMD_SEND_IF_COND: u8 = 8;
pub const MMC_CMD_SEND_EXT_CSD: u8 = 8;
pub const MMC_CMD_STOP_TRANSMISSION: u8 = 12;
pub const MMC_CMD_SEND_STATUS: u8 = 13;
pub const SD_CMD_APP_SD_STATUS: u8 = 13;
pub const MMC_CMD_READ_SINGLE_BLOCK: u8 = 17;
pub const MMC_CMD_READ_MULTIPLE_BLOCK: u8 = 18;
pub const MMC_CMD_SEND_TUNING_BLOCK: u8 = 19;
pub const MMC_CMD_SEND_TUNING_BLOCK_HS200: u8 = 21;
pub const MMC_CMD_WRITE_SINGLE_BLOCK: u8 = 24;
pub const MMC_CMD_WRITE_MULTIPLE_BLOCK: u8 = 25;
pub const SD_CMD_APP_SEND_SCR: u8 = 51;

pub const TUNING_BLK_PATTERN_4BIT: [u8; 64] = [
    0xff, 0x0f, 0xff, 0x00, 0xff, 0xcc, 0xc3, 0xcc, 0xc3, 0x3c, 0xcc, 0xff, 0xfe, 0xff, 0xfe, 0xef,
    0xff, 0xdf, 0xff, 0xdd, 0xff, 0xfb, 0xff, 0xfb, 0xbf, 0xff, 0x7f, 0xff, 0x77, 0xf7, 0xbd, 0xef,
    0xff, 0xf0, 0xff, 0xf0, 0x0f, 0xfc, 0xcc, 0x3c, 0xcc, 0x33, 0xcc, 0xcf, 0xff, 0xef, 0xff, 0xee,
    0xff, 0xfd, 0xff, 0xfd, 0xdf, 0xff, 0xbf, 0xff, 0xbb, 0xff, 0xf7, 0xff, 0xf7, 0x7f, 0x7b, 0xde,
];

pub const TUNING_BLK_PATTERN_8BIT: [u8; 128] = [
    0xff, 0xff, 0x00, 0xff, 0xff, 0xff, 0x00, 0x00, 0xff, 0xff, 0xcc, 0xcc, 0xcc, 0x33, 0xcc, 0xcc,
    0xcc, 0x33, 0x33, 0xcc, 0xcc, 0xcc, 0xff, 0xff, 0xff, 0xee, 0xff, 0xff, 0xff, 0xee, 0xee, 0xff,
    0xff, 0xff, 0xdd, 0xff, 0xff, 0xff, 0xdd, 0xdd, 0xff, 0xff, 0xff, 0xbb, 0xff, 0xff, 0xff, 0xbb,
    0xbb, 0xff, 0xff, 0xff, 0x77, 0xff, 0xff, 0xff, 0x77, 0x77, 0xff, 0x77, 0xbb, 0xdd, 0xee, 0xff,
    0xff, 0xff, 0xff, 0x00, 0xff, 0xff, 0xff, 0x00, 0x00, 0xff, 0xff, 0xcc, 0xcc, 0xcc, 0x33, 0xcc,
    0xcc, 0xcc, 0x33, 0x33, 0xcc, 0xcc, 0xcc, 0xff, 0xff, 0xff, 0xee, 0xff, 0xff, 0xff, 0xee, 0xee,
    0xff, 0xff, 0xff, 0xdd, 0xff, 0xff, 0xff, 0xdd, 0xdd, 0xff, 0xff, 0xff, 0xbb, 0xff, 0xff, 0xff,
    0xbb, 0xbb, 0xff, 0xff, 0xff, 0x77, 0xff, 0xff, 0xff, 0x77, 0x77, 0xff, 0x77, 0xbb, 0xdd, 0xee,
];

bitflags::bitflags! {
    /// `MSDC_INT` / `MSDC_INTEN` bits. The status register is write-1-to-clear.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MsdcInt: u32 {
        const ACMDRDY = 1 << 3;
        const ACMDTMO = 1 << 4;
        const ACMDCRCERR = 1 << 5;
        const CMDRDY = 1 << 8;
        const CMDTMO = 1 << 9;
        const RSPCRCERR = 1 << 10;
        const XFER_COMPL = 1 << 12;
        const DATTMO = 1 << 14;
        const DATCRCERR = 1 << 15;

        const CMD_INTS = Self::CMDRDY.bits() | Self::RSPCRCERR.bits() | Self::CMDTMO.bits();
        const DATA_INTS = Self::XFER_COMPL.bits() | Self::DATTMO.bits() | Self::DATCRCERR.bits();
    }
}
