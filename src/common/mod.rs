pub mod commands;

pub const MMC_VDD_32_33: u32 = 1 << 20;
pub const MMC_VDD_33_34: u32 = 1 << 21;

/// Limits a host reports to the card stack above it.
pub trait HostCapabilities: Clone + Send + Sync {
    fn get_voltages(&self) -> u32;
    fn get_f_min(&self) -> u32;
    fn get_f_max(&self) -> u32;
    fn get_max_block_count(&self) -> u32;
}
