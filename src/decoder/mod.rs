//! Streaming archive decoder
//!
//! A [`Decoder`] parses the archive header when it is built, keeps the
//! compressed blocks of the requested channels in memory, and decompresses them
//! on the first call to [`Decoder::read`]. Records are then produced one at a
//! time by advancing a cursor on every channel.
//!
//! ```no_run
//! use nafpack::{DecoderBuilder, Result};
//!
//! fn main() -> Result<()> {
//!     let decoder = DecoderBuilder::new().quality(false).with_path("genome.naf")?;
//!     for record in decoder {
//!         let record = record?;
//!         println!("{:?} {:?}", record.id, record.length);
//!     }
//!     Ok(())
//! }
//! ```

mod cursor;

use std::fs::File;
use std::io::{self, Cursor, Read};
use std::iter::FusedIterator;
use std::path::Path;

use log::debug;
use memmap2::Mmap;

use crate::block::{Block, Compressor, Zstd};
use crate::error::{Error, Result, SourceError};
use crate::header::{read_title, ArchiveHeader, Flag, Flags, SequenceType};
use crate::record::{Channel, Record};
use cursor::Cursors;

/// Configuration of a [`Decoder`]
///
/// Every channel is decoded by default; disabling a channel skips its block
/// without decompressing it, and leaves the matching record field to `None`.
#[derive(Debug, Clone)]
#[must_use]
pub struct DecoderBuilder<C = Zstd> {
    id: bool,
    comment: bool,
    length: bool,
    sequence: bool,
    quality: bool,
    mask: bool,
    compressor: C,
}

impl Default for DecoderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DecoderBuilder {
    pub fn new() -> Self {
        Self {
            id: true,
            comment: true,
            length: true,
            sequence: true,
            quality: true,
            mask: true,
            compressor: Zstd::default(),
        }
    }

    /// Decodes only the channels set in `flags`
    pub fn from_flags<F: Into<Flags>>(flags: F) -> Self {
        let flags = flags.into();
        Self {
            id: flags.test(Flag::Id),
            comment: flags.test(Flag::Comment),
            length: flags.test(Flag::Length),
            sequence: flags.test(Flag::Sequence),
            quality: flags.test(Flag::Quality),
            mask: flags.test(Flag::Mask),
            compressor: Zstd::default(),
        }
    }
}

impl<C: Compressor> DecoderBuilder<C> {
    pub fn id(mut self, id: bool) -> Self {
        self.id = id;
        self
    }

    pub fn comment(mut self, comment: bool) -> Self {
        self.comment = comment;
        self
    }

    pub fn length(mut self, length: bool) -> Self {
        self.length = length;
        self
    }

    pub fn sequence(mut self, sequence: bool) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn quality(mut self, quality: bool) -> Self {
        self.quality = quality;
        self
    }

    /// Whether to restore the original case of sequences
    pub fn mask(mut self, mask: bool) -> Self {
        self.mask = mask;
        self
    }

    /// Uses another block codec
    pub fn compressor<D: Compressor>(self, compressor: D) -> DecoderBuilder<D> {
        DecoderBuilder {
            id: self.id,
            comment: self.comment,
            length: self.length,
            sequence: self.sequence,
            quality: self.quality,
            mask: self.mask,
            compressor,
        }
    }

    /// Whether the block of `channel` must be kept, given the archive flags
    fn keeps(&self, channel: Channel, flags: Flags) -> bool {
        let sequence = self.sequence && flags.has(Channel::Sequence);
        let quality = self.quality && flags.has(Channel::Quality);
        flags.has(channel)
            && match channel {
                Channel::Id => self.id,
                Channel::Comment => self.comment,
                Channel::Length => self.length || sequence || quality,
                Channel::Mask => self.mask && sequence,
                Channel::Sequence => sequence,
                Channel::Quality => quality,
            }
    }

    /// Parses an archive from a reader
    ///
    /// # Errors
    ///
    /// * Header errors if the archive header is invalid or inconsistent
    /// * `ReadError::TruncatedBlock` if the reader ends inside a block
    pub fn build<R: Read>(self, mut reader: R) -> Result<Decoder<R, C>> {
        let header = ArchiveHeader::from_reader(&mut reader)?;
        let title = if header.flags.test(Flag::Title) {
            Some(read_title(&mut reader)?)
        } else {
            None
        };
        debug!(
            "Parsed archive header: {} {} records, flags {:#04x}",
            header.number_of_sequences,
            header.sequence_type,
            header.flags.as_byte()
        );

        let mut blocks = Vec::new();
        for channel in Channel::ORDER {
            if !header.flags.has(channel) {
                continue;
            }
            if self.keeps(channel, header.flags) {
                blocks.push(Block::read_from(&mut reader, channel)?);
            } else {
                Block::skip(&mut reader, channel)?;
            }
        }

        Ok(Decoder {
            report_length: self.length,
            inner: reader,
            header,
            title,
            compressor: self.compressor,
            state: State::Parsed(blocks),
            index: 0,
        })
    }

    /// Parses an archive held in memory
    pub fn with_bytes(self, bytes: &[u8]) -> Result<Decoder<&[u8], C>> {
        self.build(bytes)
    }

    /// Parses an archive from a file, which is memory-mapped
    ///
    /// # Errors
    ///
    /// * `SourceError::NotFound` if the file does not exist
    /// * `SourceError::IsADirectory` if the path is a directory
    /// * Any error of [`DecoderBuilder::build`]
    pub fn with_path<P: AsRef<Path>>(self, path: P) -> Result<Decoder<Cursor<Mmap>, C>> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SourceError::NotFound(path.to_path_buf()).into(),
            _ => Error::from(e),
        })?;
        let metadata = file.metadata()?;
        if metadata.is_dir() {
            return Err(SourceError::IsADirectory(path.to_path_buf()).into());
        }
        if !metadata.is_file() {
            return Err(SourceError::IncompatibleFile(path.to_path_buf()).into());
        }

        // Safety: the file is open and won't be modified while mapped
        let mmap = unsafe { Mmap::map(&file)? };
        debug!("Mapped {} ({} bytes)", path.display(), mmap.len());
        self.build(Cursor::new(mmap))
    }
}

#[derive(Debug)]
enum State {
    /// Header parsed, requested blocks still compressed
    Parsed(Vec<Block>),
    /// Channels decompressed, records being produced
    Streaming(Cursors),
    /// Every record was produced, or an error occurred
    Exhausted,
}

/// A streaming reader of archive records
///
/// The decoder is an [`Iterator`] of `Result<Record>`. Any error is fatal: the
/// decoder becomes exhausted and produces no further records.
#[derive(Debug)]
pub struct Decoder<R, C = Zstd> {
    inner: R,
    header: ArchiveHeader,
    title: Option<String>,
    compressor: C,
    state: State,
    /// Position of the next record
    index: u64,
    report_length: bool,
}

impl<R: Read> Decoder<R> {
    /// Creates a decoder reading every channel
    pub fn new(reader: R) -> Result<Self> {
        DecoderBuilder::new().build(reader)
    }
}

impl Decoder<Cursor<Mmap>> {
    /// Creates a decoder reading every channel of a file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        DecoderBuilder::new().with_path(path)
    }
}

impl<R, C: Compressor> Decoder<R, C> {
    #[must_use]
    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    #[must_use]
    pub fn sequence_type(&self) -> SequenceType {
        self.header.sequence_type
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Number of records not yet produced
    #[must_use]
    pub fn remaining(&self) -> usize {
        match self.state {
            State::Exhausted => 0,
            _ => (self.header.number_of_sequences - self.index) as usize,
        }
    }

    /// Consumes the decoder and returns the byte source
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Reads the next record, `None` once every record was produced
    pub fn read(&mut self) -> Result<Option<Record>> {
        match self.advance() {
            Ok(record) => Ok(record),
            Err(e) => {
                debug!("Decoding stopped at record {}: {}", self.index, e);
                self.state = State::Exhausted;
                Err(e)
            }
        }
    }

    fn advance(&mut self) -> Result<Option<Record>> {
        if let State::Parsed(blocks) = &mut self.state {
            let blocks = std::mem::take(blocks);
            self.state = State::Exhausted;
            let cursors = Cursors::new(
                blocks,
                &self.compressor,
                self.header.sequence_type,
                self.report_length,
            )?;
            self.state = State::Streaming(cursors);
        }

        let State::Streaming(cursors) = &mut self.state else {
            return Ok(None);
        };
        if self.index == self.header.number_of_sequences {
            cursors.finish()?;
            self.state = State::Exhausted;
            return Ok(None);
        }

        let record = cursors.next_record(self.index)?;
        self.index += 1;
        if self.index == self.header.number_of_sequences {
            cursors.finish()?;
            self.state = State::Exhausted;
        }
        Ok(Some(record))
    }
}

impl<R, C: Compressor> Iterator for Decoder<R, C> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read().transpose()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

impl<R, C: Compressor> ExactSizeIterator for Decoder<R, C> {}

impl<R, C: Compressor> FusedIterator for Decoder<R, C> {}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::encoder::EncoderBuilder;
    use crate::error::{ErrorKind, HeaderError, ReadError};
    use crate::mask::write_runs;
    use crate::utils::{write_length, write_varint};

    /// Small DNA archive with ids, comments, a title and a mask
    fn dna_archive() -> Result<Vec<u8>> {
        let records = [
            Record::new("r1", "ACGTacgtAC").with_comment("first read"),
            Record::new("r2", "NNNN").with_comment("second read"),
            Record::new("r3", "gattaca").with_comment(""),
        ];
        let mut encoder = EncoderBuilder::new(SequenceType::Dna)
            .id(true)
            .comment(true)
            .sequence(true)
            .mask(true)
            .title("phiX")
            .build(Vec::new())?;
        for record in &records {
            encoder.write(record)?;
        }
        Ok(encoder.into_inner()?)
    }

    /// Writes a raw archive with hand-built channels
    fn raw_archive(flags: Flags, count: u64, channels: &[(Channel, &[u8])]) -> Result<Vec<u8>> {
        let mut header = ArchiveHeader::new(SequenceType::Dna, flags);
        header.number_of_sequences = count;
        let mut buffer = Vec::new();
        header.write_bytes(&mut buffer)?;
        for (channel, data) in channels {
            Block::compress(*channel, data, &Zstd::default())?.write_to(&mut buffer)?;
        }
        Ok(buffer)
    }

    #[test]
    fn test_decode_all_channels() -> Result<()> {
        let archive = dna_archive()?;
        let mut decoder = DecoderBuilder::new().with_bytes(&archive)?;
        assert_eq!(decoder.title(), Some("phiX"));
        assert_eq!(decoder.sequence_type(), SequenceType::Dna);
        assert_eq!(decoder.remaining(), 3);
        assert_eq!(decoder.len(), 3);

        let first = decoder.read()?.expect("first record");
        assert_eq!(first.id.as_deref(), Some("r1"));
        assert_eq!(first.comment.as_deref(), Some("first read"));
        assert_eq!(first.sequence.as_deref(), Some("ACGTacgtAC"));
        assert_eq!(first.length, Some(10));
        assert_eq!(first.quality, None);
        assert_eq!(decoder.remaining(), 2);

        let rest: Vec<Record> = decoder.by_ref().collect::<Result<_>>()?;
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[1].sequence.as_deref(), Some("gattaca"));
        assert_eq!(rest[1].comment.as_deref(), Some(""));
        assert_eq!(decoder.remaining(), 0);
        assert!(decoder.read()?.is_none());
        assert!(decoder.next().is_none());
        Ok(())
    }

    #[test]
    fn test_selective_channels() -> Result<()> {
        let archive = dna_archive()?;

        let decoder = DecoderBuilder::new()
            .sequence(false)
            .comment(false)
            .with_bytes(&archive)?;
        let records: Vec<Record> = decoder.collect::<Result<_>>()?;
        assert_eq!(records.len(), 3);
        for record in &records {
            assert!(record.sequence.is_none());
            assert!(record.comment.is_none());
            assert!(record.id.is_some());
        }
        assert_eq!(records[2].length, Some(7));

        let decoder = DecoderBuilder::new().mask(false).with_bytes(&archive)?;
        let records: Vec<Record> = decoder.collect::<Result<_>>()?;
        assert_eq!(records[0].sequence.as_deref(), Some("ACGTACGTAC"));
        assert_eq!(records[2].sequence.as_deref(), Some("GATTACA"));

        let decoder = DecoderBuilder::new().length(false).with_bytes(&archive)?;
        let records: Vec<Record> = decoder.collect::<Result<_>>()?;
        assert!(records.iter().all(|r| r.length.is_none()));
        assert_eq!(records[1].sequence.as_deref(), Some("NNNN"));

        let decoder = DecoderBuilder::from_flags(Flag::Id | Flag::Length).with_bytes(&archive)?;
        let records: Vec<Record> = decoder.collect::<Result<_>>()?;
        assert_eq!(records[0].id.as_deref(), Some("r1"));
        assert_eq!(records[0].length, Some(10));
        assert!(records[0].sequence.is_none());
        Ok(())
    }

    #[test]
    fn test_remaining_is_monotonic() -> Result<()> {
        let archive = dna_archive()?;
        let mut decoder = Decoder::new(archive.as_slice())?;
        let mut expected = decoder.remaining();
        while let Some(record) = decoder.next() {
            record?;
            expected -= 1;
            assert_eq!(decoder.remaining(), expected);
            assert_eq!(decoder.size_hint(), (expected, Some(expected)));
        }
        assert_eq!(expected, 0);
        Ok(())
    }

    #[test]
    fn test_empty_archive() -> Result<()> {
        let encoder = EncoderBuilder::new(SequenceType::Protein)
            .id(true)
            .sequence(true)
            .build(Vec::new())?;
        let archive = encoder.into_inner()?;
        let mut decoder = DecoderBuilder::new().with_bytes(&archive)?;
        assert_eq!(decoder.remaining(), 0);
        assert!(decoder.read()?.is_none());
        Ok(())
    }

    #[test]
    fn test_missing_and_directory_paths() {
        let missing = std::env::temp_dir().join("nafpack-does-not-exist.naf");
        let err = DecoderBuilder::new().with_path(&missing).unwrap_err();
        assert!(matches!(err, Error::SourceError(SourceError::NotFound(_))));
        assert_eq!(err.kind(), ErrorKind::Source);

        let err = Decoder::from_path(std::env::temp_dir()).unwrap_err();
        assert!(matches!(err, Error::SourceError(SourceError::IsADirectory(_))));
    }

    #[test]
    fn test_with_path() -> anyhow::Result<()> {
        let path = std::env::temp_dir().join("nafpack-decoder-with-path.naf");
        std::fs::write(&path, dna_archive()?)?;
        let records = Decoder::from_path(&path)?.collect::<Result<Vec<_>>>();
        std::fs::remove_file(&path)?;
        assert_eq!(records?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_invalid_header_fails_at_construction() {
        let err = Decoder::new(&b"\x01\xF9\xEC\x02\x00\x04\x20\x3C\x01"[..]).unwrap_err();
        assert!(matches!(
            err,
            Error::HeaderError(HeaderError::InconsistentFlags {
                channel: Channel::Mask,
                requires: Channel::Sequence,
            })
        ));

        let err = Decoder::new(&b"\x01\xF9"[..]).unwrap_err();
        assert!(matches!(err, Error::HeaderError(HeaderError::Truncated)));
    }

    #[test]
    fn test_truncated_archive() -> Result<()> {
        let archive = dna_archive()?;
        let truncated = &archive[..archive.len() - 3];
        let err = Decoder::new(truncated).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptBlock);
        Ok(())
    }

    #[test]
    fn test_channel_ends_early() -> Result<()> {
        let archive = raw_archive(Flag::Id.into(), 3, &[(Channel::Id, &b"a\0b\0"[..])])?;
        let mut decoder = Decoder::new(archive.as_slice())?;
        assert!(decoder.read()?.is_some());
        assert!(decoder.read()?.is_some());
        assert!(matches!(
            decoder.read(),
            Err(Error::ReadError(ReadError::UnexpectedEndOfChannel(Channel::Id, 2)))
        ));
        assert_eq!(decoder.remaining(), 0);
        assert!(decoder.read()?.is_none());
        Ok(())
    }

    #[test]
    fn test_trailing_channel_data() -> Result<()> {
        let archive = raw_archive(Flag::Id.into(), 1, &[(Channel::Id, &b"a\0b\0"[..])])?;
        let mut decoder = Decoder::new(archive.as_slice())?;
        assert!(matches!(
            decoder.read(),
            Err(Error::ReadError(ReadError::TrailingData(Channel::Id)))
        ));
        assert_eq!(decoder.remaining(), 0);
        Ok(())
    }

    #[test]
    fn test_mask_length_mismatch() -> Result<()> {
        let mut lengths = Vec::new();
        write_length(&mut lengths, 4);
        let mut mask = Vec::new();
        write_runs(&[2], &mut mask);
        let archive = raw_archive(
            Flag::Length | Flag::Mask | Flag::Sequence,
            1,
            &[
                (Channel::Length, lengths.as_slice()),
                (Channel::Mask, mask.as_slice()),
                (Channel::Sequence, &[0x48u8, 0x12][..]),
            ],
        )?;
        let mut decoder = Decoder::new(archive.as_slice())?;
        let err = decoder.read().unwrap_err();
        assert!(matches!(
            err,
            Error::ReadError(ReadError::MaskLengthMismatch {
                expected: 4,
                got: 2
            })
        ));
        assert_eq!(err.kind(), ErrorKind::InvalidArchive);
        Ok(())
    }

    #[test]
    fn test_corrupt_payload() -> Result<()> {
        let mut header = ArchiveHeader::new(SequenceType::Dna, Flag::Id.into());
        header.number_of_sequences = 1;
        let mut archive = Vec::new();
        header.write_bytes(&mut archive)?;
        write_varint(&mut archive, 2)?;
        write_varint(&mut archive, 4)?;
        archive.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

        let mut decoder = Decoder::new(archive.as_slice())?;
        let err = decoder.read().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptBlock);
        assert_eq!(decoder.remaining(), 0);
        Ok(())
    }

    #[test]
    fn test_into_inner() -> Result<()> {
        let archive = dna_archive()?;
        let decoder = Decoder::new(archive.as_slice())?;
        let rest = decoder.into_inner();
        assert!(rest.is_empty());
        Ok(())
    }
}
