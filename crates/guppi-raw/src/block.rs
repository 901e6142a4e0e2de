/// GUPPI card (keyword record) size in bytes.
pub const CARD_SIZE: usize = 80;

/// Alignment unit applied to header and data sections when DIRECTIO is set.
pub const DIRECTIO_ALIGNMENT: usize = 512;

/// Padding byte used after the END card of a directio header (ASCII space).
pub const HEADER_PAD_BYTE: u8 = 0x20;

/// Padding byte used after a directio data block (zero).
pub const DATA_PAD_BYTE: u8 = 0x00;

/// How header and data sections are laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// Sections follow each other with no padding.
    Packed,
    /// Each section is padded to a multiple of [`DIRECTIO_ALIGNMENT`].
    DirectIo,
}

impl Alignment {
    /// Granularity in bytes that a section is rounded up to.
    pub const fn unit(self) -> usize {
        match self {
            Alignment::Packed => 1,
            Alignment::DirectIo => DIRECTIO_ALIGNMENT,
        }
    }

    /// On-disk length of a section holding `num_bytes` significant bytes.
    pub const fn padded_len(self, num_bytes: usize) -> usize {
        padded_byte_len(num_bytes, self.unit())
    }

    /// Number of skip bytes that follow a section of `num_bytes`.
    pub const fn padding_len(self, num_bytes: usize) -> usize {
        self.padded_len(num_bytes) - num_bytes
    }
}

/// Rounds `num_bytes` up to the next multiple of `unit`.
///
/// 0 bytes stays 0, 1 byte becomes `unit`, `unit` bytes stays `unit`,
/// `unit + 1` becomes `2 * unit`.
pub const fn padded_byte_len(num_bytes: usize, unit: usize) -> usize {
    num_bytes.div_ceil(unit) * unit
}
