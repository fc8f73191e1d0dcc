use log::debug;

/// Response format expected from the card.
///
/// R5, R6 and R7 share the R1 encoding on the wire and are sent as `R1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    None,
    /// 48-bit response with CRC.
    R1,
    /// 48-bit response, card holds DAT0 low while busy.
    R1b,
    /// 136-bit response.
    R2,
    /// 48-bit response without CRC.
    R3,
}

impl ResponseType {
    pub fn is_present(self) -> bool {
        self != ResponseType::None
    }

    pub fn is_long(self) -> bool {
        self == ResponseType::R2
    }

    pub fn is_busy(self) -> bool {
        self == ResponseType::R1b
    }
}

pub enum DataBuffer<'a> {
    Read(&'a mut [u8]),
    Write(&'a [u8]),
}

impl DataBuffer<'_> {
    pub fn len(&self) -> usize {
        match self {
            DataBuffer::Read(buf) => buf.len(),
            DataBuffer::Write(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_write(&self) -> bool {
        matches!(self, DataBuffer::Write(_))
    }
}

#[derive(Debug, Clone)]
pub struct MmcCommand {
    pub opcode: u8,
    pub arg: u32,
    pub resp_type: ResponseType,
    pub data_present: bool,
    pub data_dir_read: bool,
    pub block_size: u16,
    pub block_count: u16,
}

impl MmcCommand {
    pub fn new(opcode: u8, arg: u32, resp_type: ResponseType) -> Self {
        Self {
            opcode,
            arg,
            resp_type,
            data_present: false,
            data_dir_read: true,
            block_size: 0,
            block_count: 0,
        }
    }

    pub fn with_data(mut self, block_size: u16, block_count: u16, is_read: bool) -> Self {
        self.data_present = true;
        self.data_dir_read = is_read;
        self.block_size = block_size;
        self.block_count = block_count;
        self
    }

    /// Total number of bytes moved by the data phase.
    pub fn data_len(&self) -> usize {
        if self.data_present {
            self.block_size as usize * self.block_count as usize
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MmcResponse {
    /// Short responses use `raw[0]`; R2 is stored most significant word first.
    pub raw: [u32; 4],
}

impl MmcResponse {
    pub fn new() -> Self {
        Self { raw: [0; 4] }
    }

    pub fn as_r1(&self) -> u32 {
        self.raw[0]
    }

    pub fn as_r2(&self) -> [u32; 4] {
        debug!(
            "R2 response: {:#x} {:#x} {:#x} {:#x}",
            self.raw[0], self.raw[1], self.raw[2], self.raw[3]
        );
        self.raw
    }

    pub fn as_r3(&self) -> u32 {
        self.raw[0]
    }

    pub fn as_r6(&self) -> u32 {
        self.raw[0]
    }

    pub fn as_r7(&self) -> u32 {
        self.raw[0]
    }
}
