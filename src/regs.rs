use core::fmt;

use embedded_hal::delay::DelayNs;

/// Raw access to a controller register block.
///
/// Offsets are byte offsets from the start of the block. All accesses are
/// volatile on real hardware, so every read may observe a new value.
pub trait RegisterIo {
    fn read_reg8(&self, offset: u32) -> u8;
    fn read_reg32(&self, offset: u32) -> u32;
    fn write_reg8(&self, offset: u32, value: u8);
    fn write_reg32(&self, offset: u32, value: u32);
}

#[macro_export]
macro_rules! impl_register_io {
    ($struct_name:ident, $field_name:ident) => {
        impl $crate::regs::RegisterIo for $struct_name {
            #[inline]
            fn read_reg8(&self, offset: u32) -> u8 {
                unsafe {
                    core::ptr::read_volatile((self.$field_name + offset as usize) as *const u8)
                }
            }

            #[inline]
            fn read_reg32(&self, offset: u32) -> u32 {
                unsafe {
                    core::ptr::read_volatile((self.$field_name + offset as usize) as *const u32)
                }
            }

            #[inline]
            fn write_reg8(&self, offset: u32, value: u8) {
                unsafe {
                    core::ptr::write_volatile(
                        (self.$field_name + offset as usize) as *mut u8,
                        value,
                    )
                }
            }

            #[inline]
            fn write_reg32(&self, offset: u32, value: u32) {
                unsafe {
                    core::ptr::write_volatile(
                        (self.$field_name + offset as usize) as *mut u32,
                        value,
                    )
                }
            }
        }
    };
}

/// A memory-mapped register block.
///
/// The caller guarantees that `base_addr` maps the controller registers for
/// as long as the value is alive.
#[derive(Debug, Clone, Copy)]
pub struct Mmio {
    pub base_addr: usize,
}

impl Mmio {
    pub const fn new(base_addr: usize) -> Self {
        Mmio { base_addr }
    }
}

impl_register_io!(Mmio, base_addr);

/// A bit field inside a 32-bit register: `(reg >> shift) & mask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegField {
    pub offset: u32,
    pub mask: u32,
    pub shift: u32,
}

impl RegField {
    pub const fn new(offset: u32, mask: u32, shift: u32) -> Self {
        RegField {
            offset,
            mask,
            shift,
        }
    }

    /// Mask of the field in register position.
    #[inline]
    pub const fn bits(&self) -> u32 {
        self.mask << self.shift
    }

    #[inline]
    pub const fn extract(&self, reg: u32) -> u32 {
        (reg >> self.shift) & self.mask
    }

    #[inline]
    pub const fn insert(&self, reg: u32, value: u32) -> u32 {
        (reg & !self.bits()) | ((value & self.mask) << self.shift)
    }
}

/// A bounded poll ran out of budget. Carries the last value read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTimeout(pub u32);

impl fmt::Display for PollTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "poll timed out, last value {:#x}", self.0)
    }
}

/// Field-level helpers shared by every register block.
pub trait RegisterFieldExt: RegisterIo {
    #[inline]
    fn read_field(&self, field: RegField) -> u32 {
        field.extract(self.read_reg32(field.offset))
    }

    /// Read-modify-write of a single field; other bits are preserved.
    #[inline]
    fn write_field(&self, field: RegField, value: u32) {
        let reg = self.read_reg32(field.offset);
        self.write_reg32(field.offset, field.insert(reg, value));
    }

    #[inline]
    fn set_bits(&self, offset: u32, bits: u32) {
        let reg = self.read_reg32(offset);
        self.write_reg32(offset, reg | bits);
    }

    #[inline]
    fn clr_bits(&self, offset: u32, bits: u32) {
        let reg = self.read_reg32(offset);
        self.write_reg32(offset, reg & !bits);
    }

    /// Poll `offset` until `cond` holds or `timeout_us` microseconds elapse.
    ///
    /// Time is measured by `delay`, one microsecond per step, so the budget
    /// is never shorter than requested. The register is sampled once more
    /// after the budget is spent, so a condition that became true during the
    /// last delay is not reported as a timeout.
    fn poll_until<F, D>(
        &self,
        offset: u32,
        mut cond: F,
        timeout_us: u64,
        delay: &mut D,
    ) -> Result<u32, PollTimeout>
    where
        F: FnMut(u32) -> bool,
        D: DelayNs + ?Sized,
    {
        let mut elapsed = 0;

        loop {
            let val = self.read_reg32(offset);
            if cond(val) {
                return Ok(val);
            }

            if elapsed >= timeout_us {
                let val = self.read_reg32(offset);
                return if cond(val) {
                    Ok(val)
                } else {
                    Err(PollTimeout(val))
                };
            }

            delay.delay_us(1);
            elapsed += 1;
        }
    }
}

impl<T: RegisterIo + ?Sized> RegisterFieldExt for T {}
