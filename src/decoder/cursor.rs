//! Per-channel read positions over decompressed blocks

use log::debug;

use crate::alphabet::{packed_len, unpack};
use crate::block::{Block, Compressor};
use crate::error::{ReadError, Result};
use crate::header::SequenceType;
use crate::mask::MaskCursor;
use crate::record::{Channel, Record};
use crate::utils::read_length;

/// A byte channel consumed front to back
#[derive(Debug)]
struct ChannelCursor {
    channel: Channel,
    data: Vec<u8>,
    pos: usize,
}

impl ChannelCursor {
    fn new(channel: Channel, data: Vec<u8>) -> Self {
        Self {
            channel,
            data,
            pos: 0,
        }
    }

    /// Reads a NUL-terminated string
    fn next_terminated(&mut self, index: u64) -> Result<String> {
        let rest = &self.data[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(ReadError::UnexpectedEndOfChannel(self.channel, index))?;
        let text = std::str::from_utf8(&rest[..end])
            .map_err(|_| ReadError::InvalidUtf8(self.channel, index))?
            .to_owned();
        self.pos += end + 1;
        Ok(text)
    }

    /// Reads a string of exactly `n` bytes
    fn next_exact(&mut self, n: usize, index: u64) -> Result<String> {
        let bytes = self
            .data
            .get(self.pos..self.pos + n)
            .ok_or(ReadError::UnexpectedEndOfChannel(self.channel, index))?;
        let text = std::str::from_utf8(bytes)
            .map_err(|_| ReadError::InvalidUtf8(self.channel, index))?
            .to_owned();
        self.pos += n;
        Ok(text)
    }

    /// Reads one sequence length
    fn next_length(&mut self, index: u64) -> Result<u64> {
        read_length(&self.data, &mut self.pos)
            .ok_or_else(|| ReadError::UnexpectedEndOfChannel(self.channel, index).into())
    }

    fn finish(&self) -> Result<()> {
        if self.pos == self.data.len() {
            Ok(())
        } else {
            Err(ReadError::TrailingData(self.channel).into())
        }
    }
}

/// Packed residues addressed by residue offset
#[derive(Debug)]
struct SequenceCursor {
    sequence_type: SequenceType,
    data: Vec<u8>,
    offset: usize,
}

impl SequenceCursor {
    fn next(&mut self, count: usize, index: u64) -> Result<Vec<u8>> {
        let end = self.offset + count;
        if packed_len(self.sequence_type, end) > self.data.len() {
            return Err(ReadError::UnexpectedEndOfChannel(Channel::Sequence, index).into());
        }
        let residues = unpack(&self.data, self.offset, count, self.sequence_type)?;
        self.offset = end;
        Ok(residues)
    }

    fn finish(&self) -> Result<()> {
        // an odd nucleotide count leaves a padding nibble in the last byte
        if packed_len(self.sequence_type, self.offset) == self.data.len() {
            Ok(())
        } else {
            Err(ReadError::TrailingData(Channel::Sequence).into())
        }
    }
}

/// The decompressed channels of an archive being streamed
#[derive(Debug)]
pub(crate) struct Cursors {
    ids: Option<ChannelCursor>,
    comments: Option<ChannelCursor>,
    lengths: Option<ChannelCursor>,
    mask: Option<MaskCursor>,
    sequence: Option<SequenceCursor>,
    quality: Option<ChannelCursor>,
    /// Whether lengths are reported on records or only used for splitting
    report_length: bool,
}

impl Cursors {
    /// Decompresses every block read from the archive
    pub(crate) fn new<C: Compressor>(
        blocks: Vec<Block>,
        compressor: &C,
        sequence_type: SequenceType,
        report_length: bool,
    ) -> Result<Self> {
        let mut cursors = Self {
            ids: None,
            comments: None,
            lengths: None,
            mask: None,
            sequence: None,
            quality: None,
            report_length,
        };
        for block in blocks {
            let channel = block.channel();
            let data = block.decompress(compressor)?;
            match channel {
                Channel::Id => cursors.ids = Some(ChannelCursor::new(channel, data)),
                Channel::Comment => cursors.comments = Some(ChannelCursor::new(channel, data)),
                Channel::Length => cursors.lengths = Some(ChannelCursor::new(channel, data)),
                Channel::Mask => cursors.mask = Some(MaskCursor::new(data)),
                Channel::Sequence => {
                    cursors.sequence = Some(SequenceCursor {
                        sequence_type,
                        data,
                        offset: 0,
                    });
                }
                Channel::Quality => cursors.quality = Some(ChannelCursor::new(channel, data)),
            }
        }
        Ok(cursors)
    }

    /// Decodes the record at position `index`
    pub(crate) fn next_record(&mut self, index: u64) -> Result<Record> {
        let length = match &mut self.lengths {
            Some(cursor) => Some(cursor.next_length(index)?),
            None => None,
        };
        let id = match &mut self.ids {
            Some(cursor) => Some(cursor.next_terminated(index)?),
            None => None,
        };
        let comment = match &mut self.comments {
            Some(cursor) => Some(cursor.next_terminated(index)?),
            None => None,
        };

        let sequence = match (&mut self.sequence, length) {
            (Some(cursor), Some(length)) => {
                let mut residues = cursor.next(length as usize, index)?;
                if let Some(mask) = &mut self.mask {
                    mask.apply(&mut residues)?;
                }
                let sequence = String::from_utf8(residues)
                    .map_err(|_| ReadError::InvalidUtf8(Channel::Sequence, index))?;
                Some(sequence)
            }
            _ => None,
        };

        let quality = match (&mut self.quality, length) {
            (Some(cursor), Some(length)) => Some(cursor.next_exact(length as usize, index)?),
            _ => None,
        };

        Ok(Record {
            id,
            comment,
            sequence,
            quality,
            length: length.filter(|_| self.report_length),
        })
    }

    /// Checks that no channel holds data past the last record
    pub(crate) fn finish(&mut self) -> Result<()> {
        for cursor in [&self.ids, &self.comments, &self.lengths, &self.quality]
            .into_iter()
            .flatten()
        {
            cursor.finish()?;
        }
        if let Some(cursor) = &self.sequence {
            cursor.finish()?;
        }
        if let Some(mask) = &mut self.mask {
            mask.finish()?;
        }
        debug!("All channels consumed");
        Ok(())
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::error::Error;
    use crate::utils::write_length;

    #[test]
    fn test_terminated_strings() -> Result<()> {
        let mut cursor = ChannelCursor::new(Channel::Id, b"r1\0\0r3\0".to_vec());
        assert_eq!(cursor.next_terminated(0)?, "r1");
        assert_eq!(cursor.next_terminated(1)?, "");
        assert_eq!(cursor.next_terminated(2)?, "r3");
        cursor.finish()?;
        assert!(matches!(
            cursor.next_terminated(3),
            Err(Error::ReadError(ReadError::UnexpectedEndOfChannel(Channel::Id, 3)))
        ));
        Ok(())
    }

    #[test]
    fn test_trailing_data() -> Result<()> {
        let mut cursor = ChannelCursor::new(Channel::Comment, b"a\0b\0".to_vec());
        cursor.next_terminated(0)?;
        assert!(matches!(
            cursor.finish(),
            Err(Error::ReadError(ReadError::TrailingData(Channel::Comment)))
        ));
        Ok(())
    }

    #[test]
    fn test_invalid_utf8() {
        let mut cursor = ChannelCursor::new(Channel::Quality, vec![0xC3, 0x28]);
        assert!(matches!(
            cursor.next_exact(2, 5),
            Err(Error::ReadError(ReadError::InvalidUtf8(Channel::Quality, 5)))
        ));
    }

    #[test]
    fn test_lengths() -> Result<()> {
        let mut data = Vec::new();
        write_length(&mut data, 3);
        write_length(&mut data, 5_000_000_000);
        let mut cursor = ChannelCursor::new(Channel::Length, data);
        assert_eq!(cursor.next_length(0)?, 3);
        assert_eq!(cursor.next_length(1)?, 5_000_000_000);
        assert!(cursor.next_length(2).is_err());
        cursor.finish()
    }

    #[test]
    fn test_sequence_padding() -> Result<()> {
        // ACG + T, then a padding nibble
        let mut cursor = SequenceCursor {
            sequence_type: SequenceType::Dna,
            data: vec![0x48, 0x12, 0x08],
            offset: 0,
        };
        assert_eq!(cursor.next(3, 0)?, b"ACG");
        assert_eq!(cursor.next(2, 1)?, b"TA");
        cursor.finish()?;
        assert!(matches!(
            cursor.next(2, 2),
            Err(Error::ReadError(ReadError::UnexpectedEndOfChannel(Channel::Sequence, 2)))
        ));

        let cursor = SequenceCursor {
            sequence_type: SequenceType::Dna,
            data: vec![0x48, 0x12, 0x08],
            offset: 4,
        };
        assert!(matches!(
            cursor.finish(),
            Err(Error::ReadError(ReadError::TrailingData(Channel::Sequence)))
        ));
        Ok(())
    }
}
