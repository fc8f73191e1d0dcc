use bitflags::bitflags;
use log::info;

use crate::common::{HostCapabilities, MMC_VDD_32_33, MMC_VDD_33_34};
use crate::constants::{MAX_BLOCK_COUNT, MSDC_PAD_TUNE, MSDC_PAD_TUNE0};

/// Width of the clock divisor field in `MSDC_CFG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClkDivBits {
    /// CKDIV at [15:8], CKMOD at [17:16].
    Bits8,
    /// CKDIV at [19:8], CKMOD at [21:20].
    Bits12,
}

impl ClkDivBits {
    pub const fn max_div(self) -> u32 {
        match self {
            ClkDivBits::Bits8 => 0xff,
            ClkDivBits::Bits12 => 0xfff,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MsdcFeatures: u32 {
        /// Pad delays live in `MSDC_PAD_TUNE0` instead of `MSDC_PAD_TUNE`.
        const PAD_TUNE0 = 1 << 0;
        const ASYNC_FIFO = 1 << 1;
        /// Separate data-line delay tuning.
        const DATA_TUNE = 1 << 2;
        /// Write busy-check workaround in `MSDC_PATCH_BIT1`.
        const BUSY_CHECK = 1 << 3;
        /// Stop-clock timing workaround.
        const STOP_CLK_FIX = 1 << 4;
        /// Enhanced receive sampling in `SDC_ADV_CFG0`.
        const ENHANCE_RX = 1 << 5;
    }
}

/// Per-SoC description of the controller variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsdcCompatible {
    pub name: &'static str,
    pub clk_div_bits: ClkDivBits,
    pub features: MsdcFeatures,
}

impl MsdcCompatible {
    pub const MT7620: MsdcCompatible = MsdcCompatible {
        name: "mediatek,mt7620-mmc",
        clk_div_bits: ClkDivBits::Bits8,
        features: MsdcFeatures::empty(),
    };

    pub const MT7621: MsdcCompatible = MsdcCompatible {
        name: "mediatek,mt7621-mmc",
        clk_div_bits: ClkDivBits::Bits8,
        features: MsdcFeatures::ASYNC_FIFO.union(MsdcFeatures::DATA_TUNE),
    };

    pub const MT7622: MsdcCompatible = MsdcCompatible {
        name: "mediatek,mt7622-mmc",
        clk_div_bits: ClkDivBits::Bits12,
        features: MsdcFeatures::PAD_TUNE0
            .union(MsdcFeatures::ASYNC_FIFO)
            .union(MsdcFeatures::DATA_TUNE)
            .union(MsdcFeatures::BUSY_CHECK)
            .union(MsdcFeatures::STOP_CLK_FIX),
    };

    pub const MT8183: MsdcCompatible = MsdcCompatible {
        name: "mediatek,mt8183-mmc",
        clk_div_bits: ClkDivBits::Bits12,
        features: MsdcFeatures::all(),
    };

    const SUPPORTED: [&'static MsdcCompatible; 4] =
        [&Self::MT7620, &Self::MT7621, &Self::MT7622, &Self::MT8183];

    /// Look up the variant for a device-tree compatible string.
    pub fn from_compatible(compatible: &str) -> Option<&'static MsdcCompatible> {
        let found = Self::SUPPORTED
            .iter()
            .copied()
            .find(|comp| comp.name == compatible);

        match found {
            Some(comp) => info!("MSDC variant matched: {}", comp.name),
            None => info!("No MSDC variant for: {}", compatible),
        }

        found
    }

    pub fn has(&self, feature: MsdcFeatures) -> bool {
        self.features.contains(feature)
    }

    /// The register holding the pad delay fields for this variant.
    pub fn tune_reg(&self) -> u32 {
        if self.has(MsdcFeatures::PAD_TUNE0) {
            MSDC_PAD_TUNE0
        } else {
            MSDC_PAD_TUNE
        }
    }
}

/// Host limits derived from the variant and the source clock.
#[derive(Debug, Clone)]
pub struct MsdcCapabilities {
    pub voltages: u32,
    pub f_min: u32,
    pub f_max: u32,
    pub max_block_count: u32,
}

impl MsdcCapabilities {
    pub fn new(comp: &MsdcCompatible, src_clk_freq: u32) -> Self {
        MsdcCapabilities {
            voltages: MMC_VDD_32_33 | MMC_VDD_33_34,
            f_min: src_clk_freq / (4 * comp.clk_div_bits.max_div()),
            f_max: src_clk_freq / 2,
            max_block_count: MAX_BLOCK_COUNT,
        }
    }
}

impl HostCapabilities for MsdcCapabilities {
    fn get_voltages(&self) -> u32 {
        self.voltages
    }

    fn get_f_min(&self) -> u32 {
        self.f_min
    }

    fn get_f_max(&self) -> u32 {
        self.f_max
    }

    fn get_max_block_count(&self) -> u32 {
        self.max_block_count
    }
}
