//! Compressed channel blocks
//!
//! Every channel of an archive is stored as a single block:
//!
//! ```text
//! ┌────────────────────────┐
//! │ Original size          │ varint
//! │ Compressed size        │ varint
//! │ Compressed payload     │ zstd frame, without magic number
//! └────────────────────────┘
//! ```

use std::io::{self, Read, Write};

use auto_impl::auto_impl;
use log::debug;

use crate::error::{Error, ReadError, Result};
use crate::record::Channel;
use crate::utils::{read_varint, write_varint};

/// Default zstd compression level
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Upper bound on the capacity reserved from a declared size
const MAX_PREALLOCATION: usize = 1 << 26;

/// A block compression codec
///
/// Implementations must satisfy `decompress(compress(b)) == b`.
#[auto_impl(&, Box)]
pub trait Compressor {
    /// Compresses a whole channel buffer
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>>;

    /// Decompresses a whole block payload
    ///
    /// `size_hint` is the original size declared in the block prefix.
    /// Implementations may stop one byte past it, which is enough for the
    /// caller to detect an oversized payload.
    fn decompress(&self, data: &[u8], size_hint: usize) -> io::Result<Vec<u8>>;
}

/// Zstandard frames without the leading magic number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zstd {
    pub level: i32,
}

impl Zstd {
    #[must_use]
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Default for Zstd {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL)
    }
}

impl Compressor for Zstd {
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = zstd::stream::write::Encoder::new(Vec::new(), self.level)?;
        encoder.include_magicbytes(false)?;
        encoder.write_all(data)?;
        encoder.finish()
    }

    fn decompress(&self, data: &[u8], size_hint: usize) -> io::Result<Vec<u8>> {
        let mut decoder = zstd::stream::read::Decoder::with_buffer(data)?;
        decoder.include_magicbytes(false)?;
        let mut buffer = Vec::with_capacity(size_hint.min(MAX_PREALLOCATION));
        decoder
            .take((size_hint as u64).saturating_add(1))
            .read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}

/// A compressed channel block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    channel: Channel,
    original_size: u64,
    payload: Vec<u8>,
}

impl Block {
    /// Compresses a channel buffer into a block
    pub fn compress<C: Compressor>(channel: Channel, data: &[u8], compressor: &C) -> Result<Self> {
        let payload = compressor.compress(data)?;
        debug!(
            "Compressed {} channel: {} -> {} bytes",
            channel,
            data.len(),
            payload.len()
        );
        Ok(Self {
            channel,
            original_size: data.len() as u64,
            payload,
        })
    }

    #[must_use]
    pub fn channel(&self) -> Channel {
        self.channel
    }

    #[must_use]
    pub fn original_size(&self) -> u64 {
        self.original_size
    }

    #[must_use]
    pub fn compressed_size(&self) -> u64 {
        self.payload.len() as u64
    }

    /// Reads the size prefix and the compressed payload of a block
    ///
    /// # Errors
    ///
    /// * `ReadError::TruncatedBlock` if the source ends inside the block
    pub fn read_from<R: Read>(reader: &mut R, channel: Channel) -> Result<Self> {
        let (original_size, compressed_size) = read_sizes(reader, channel)?;
        let mut payload = Vec::new();
        let n = reader.take(compressed_size).read_to_end(&mut payload)?;
        if (n as u64) < compressed_size {
            return Err(ReadError::TruncatedBlock(channel, compressed_size).into());
        }
        Ok(Self {
            channel,
            original_size,
            payload,
        })
    }

    /// Advances past a block without keeping its payload
    pub fn skip<R: Read>(reader: &mut R, channel: Channel) -> Result<()> {
        let (_, compressed_size) = read_sizes(reader, channel)?;
        let n = io::copy(&mut reader.take(compressed_size), &mut io::sink())?;
        if n < compressed_size {
            return Err(ReadError::TruncatedBlock(channel, compressed_size).into());
        }
        debug!("Skipped {channel} block ({compressed_size} bytes)");
        Ok(())
    }

    /// Decompresses the payload, checking it against the declared size
    ///
    /// # Errors
    ///
    /// * `ReadError::CorruptBlock` if the payload cannot be decompressed
    /// * `ReadError::BlockSizeMismatch` if the decompressed size is wrong
    pub fn decompress<C: Compressor>(&self, compressor: &C) -> Result<Vec<u8>> {
        let data = compressor
            .decompress(&self.payload, self.original_size as usize)
            .map_err(|source| ReadError::CorruptBlock {
                channel: self.channel,
                source,
            })?;
        if data.len() as u64 != self.original_size {
            return Err(ReadError::BlockSizeMismatch {
                channel: self.channel,
                expected: self.original_size,
                got: data.len() as u64,
            }
            .into());
        }
        debug!(
            "Decompressed {} channel: {} -> {} bytes",
            self.channel,
            self.payload.len(),
            data.len()
        );
        Ok(data)
    }

    /// Writes the size prefix and the payload
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_varint(writer, self.original_size)?;
        write_varint(writer, self.payload.len() as u64)?;
        writer.write_all(&self.payload)?;
        Ok(())
    }
}

/// Reads the original and compressed sizes prefixing a block
fn read_sizes<R: Read>(reader: &mut R, channel: Channel) -> Result<(u64, u64)> {
    let mut read = || {
        read_varint(reader).map_err(|e| match e {
            Error::IoError(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                ReadError::TruncatedBlock(channel, 0).into()
            }
            e => e,
        })
    };
    let original_size = read()?;
    let compressed_size = read()?;
    Ok((original_size, compressed_size))
}
