//! VAG stream header: byte-exact layout, mixed endianness, 2048-byte payload
//! alignment. Implemented with explicit per-field endianness rather than any
//! host-endian helper, since the wire format mixes big- and little-endian
//! fields by design.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::error::{VagError, VagResult};

/// Non-interleaved, single-channel magic.
pub const MAGIC_NONINTERLEAVED: [u8; 4] = *b"VAGp";
/// Interleaved, multi-channel magic.
pub const MAGIC_INTERLEAVED: [u8; 4] = *b"VAGi";

/// Version the writer emits; the reader accepts any version.
pub const DEFAULT_VERSION: u32 = 0x0000_0020;

/// Bytes occupied by the fixed header fields, before alignment padding.
pub const HEADER_LEN: u64 = 48;

/// The payload always starts on a multiple of this many bytes.
pub const PAYLOAD_ALIGN: u64 = 2048;

/// Offset of the big-endian `data_length` field, used when patching it after
/// the payload has been written.
pub(crate) const DATA_LENGTH_OFFSET: u64 = 12;

/// Parsed stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub interleaved: bool,
    pub version: u32,
    pub interleave_chunk_size: u32,
    pub data_length: u32,
    pub sample_rate: u32,
    pub channel_count: u16,
}

impl Header {
    /// Reads the 48-byte fixed header. The caller is responsible for then
    /// advancing to the aligned payload offset.
    pub fn read<R: Read>(input: &mut R) -> VagResult<Self> {
        let mut magic = [0u8; 4];
        input.read_exact(&mut magic)?;
        let interleaved = match magic {
            MAGIC_NONINTERLEAVED => false,
            MAGIC_INTERLEAVED => true,
            _ => return Err(VagError::BadMagic),
        };

        let version = input.read_u32::<BigEndian>()?;
        let interleave_chunk_size = input.read_u32::<LittleEndian>()?;
        let data_length = input.read_u32::<BigEndian>()?;
        let sample_rate = input.read_u32::<BigEndian>()?;

        let mut reserved = [0u8; 10];
        input.read_exact(&mut reserved)?;
        let channel_count = input.read_u16::<LittleEndian>()?;
        let mut padding = [0u8; 16];
        input.read_exact(&mut padding)?;

        Ok(Header {
            interleaved,
            version,
            interleave_chunk_size,
            data_length,
            sample_rate,
            channel_count,
        })
    }

    /// Writes the 48-byte fixed header. The caller is responsible for then
    /// padding forward to the aligned payload offset.
    pub fn write<W: Write>(&self, out: &mut W) -> VagResult<()> {
        let magic = if self.interleaved {
            MAGIC_INTERLEAVED
        } else {
            MAGIC_NONINTERLEAVED
        };
        out.write_all(&magic)?;
        out.write_u32::<BigEndian>(self.version)?;
        out.write_u32::<LittleEndian>(self.interleave_chunk_size)?;
        out.write_u32::<BigEndian>(self.data_length)?;
        out.write_u32::<BigEndian>(self.sample_rate)?;
        out.write_all(&[0u8; 10])?;
        out.write_u16::<LittleEndian>(self.channel_count)?;
        out.write_all(&[0u8; 16])?;
        Ok(())
    }
}

/// Rounds `pos` forward to the next multiple of [`PAYLOAD_ALIGN`].
pub fn align_up(pos: u64) -> u64 {
    let rem = pos % PAYLOAD_ALIGN;
    if rem == 0 { pos } else { pos + (PAYLOAD_ALIGN - rem) }
}

/// The payload always begins here, since the fixed header is always read or
/// written starting at stream offset 0.
pub fn payload_start() -> u64 {
    align_up(HEADER_LEN)
}
