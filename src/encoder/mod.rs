//! Archive encoder
//!
//! The [`Encoder`] splits every record it receives across per-channel buffers.
//! Nothing reaches the destination until the encoder is finalized: at that point
//! each channel is compressed as a single block, and the header, the title and
//! the blocks are written in order.
//!
//! Records are fully validated before any buffer is touched, so a rejected
//! record leaves no trace in the archive.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::{debug, error};

use crate::alphabet::Packer;
use crate::block::{Block, Compressor, Zstd};
use crate::error::{BuilderError, Error, Result, SourceError, WriteError};
use crate::header::{
    is_printable, write_title, ArchiveHeader, Flag, Flags, SequenceType, DEFAULT_LINE_LENGTH,
    DEFAULT_NAME_SEPARATOR,
};
use crate::mask::MaskBuilder;
use crate::record::{Channel, Record};
use crate::utils::write_length;

/// A builder for creating archive encoders
///
/// Channels are opt-in: an encoder built without enabling any channel writes
/// an archive holding only a record count.
#[derive(Debug, Clone)]
#[must_use]
pub struct EncoderBuilder<C = Zstd> {
    sequence_type: SequenceType,
    id: bool,
    comment: bool,
    length: bool,
    sequence: bool,
    quality: bool,
    mask: bool,
    title: Option<String>,
    line_length: u64,
    name_separator: char,
    compressor: C,
}

impl EncoderBuilder {
    /// Creates a builder for archives of the given sequence type
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use nafpack::{EncoderBuilder, Record, SequenceType};
    ///
    /// let mut encoder = EncoderBuilder::new(SequenceType::Dna)
    ///     .id(true)
    ///     .sequence(true)
    ///     .with_path("reads.naf")
    ///     .unwrap();
    /// encoder.write(&Record::new("read1", "ACGTNNacgt")).unwrap();
    /// encoder.finish().unwrap();
    /// ```
    pub fn new(sequence_type: SequenceType) -> Self {
        Self {
            sequence_type,
            id: false,
            comment: false,
            length: false,
            sequence: false,
            quality: false,
            mask: false,
            title: None,
            line_length: DEFAULT_LINE_LENGTH,
            name_separator: DEFAULT_NAME_SEPARATOR,
            compressor: Zstd::default(),
        }
    }

    /// Creates a builder enabling the channels set in `flags`
    ///
    /// The title flag is ignored, use [`EncoderBuilder::title`] instead.
    pub fn from_flags<F: Into<Flags>>(sequence_type: SequenceType, flags: F) -> Self {
        let flags = flags.into();
        Self::new(sequence_type)
            .id(flags.test(Flag::Id))
            .comment(flags.test(Flag::Comment))
            .length(flags.test(Flag::Length))
            .sequence(flags.test(Flag::Sequence))
            .quality(flags.test(Flag::Quality))
            .mask(flags.test(Flag::Mask))
    }

    /// Sets the zstd compression level of every block
    pub fn compression_level(mut self, level: i32) -> Self {
        self.compressor = Zstd::new(level);
        self
    }
}

impl<C: Compressor> EncoderBuilder<C> {
    pub fn id(mut self, id: bool) -> Self {
        self.id = id;
        self
    }

    pub fn comment(mut self, comment: bool) -> Self {
        self.comment = comment;
        self
    }

    /// Stores sequence lengths
    ///
    /// Lengths are always stored when sequences are.
    pub fn length(mut self, length: bool) -> Self {
        self.length = length;
        self
    }

    pub fn sequence(mut self, sequence: bool) -> Self {
        self.sequence = sequence;
        self
    }

    /// Stores quality strings; requires the sequence channel
    pub fn quality(mut self, quality: bool) -> Self {
        self.quality = quality;
        self
    }

    /// Stores the case of sequences; requires the sequence channel
    ///
    /// Ignored for text archives, which keep their case verbatim.
    pub fn mask(mut self, mask: bool) -> Self {
        self.mask = mask;
        self
    }

    /// Sets the archive title
    pub fn title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the line length recorded in the header (60 by default)
    pub fn line_length(mut self, line_length: u64) -> Self {
        self.line_length = line_length;
        self
    }

    /// Sets the separator between identifier and comment (space by default)
    ///
    /// The separator must be a printable ASCII character.
    pub fn name_separator(mut self, name_separator: char) -> Self {
        self.name_separator = name_separator;
        self
    }

    /// Uses another block codec
    pub fn compressor<D: Compressor>(self, compressor: D) -> EncoderBuilder<D> {
        EncoderBuilder {
            sequence_type: self.sequence_type,
            id: self.id,
            comment: self.comment,
            length: self.length,
            sequence: self.sequence,
            quality: self.quality,
            mask: self.mask,
            title: self.title,
            line_length: self.line_length,
            name_separator: self.name_separator,
            compressor,
        }
    }

    /// Checks the configuration and computes the header flags
    fn flags(&self) -> Result<Flags> {
        if self.quality && !self.sequence {
            return Err(BuilderError::MissingDependency {
                channel: Channel::Quality,
                requires: Channel::Sequence,
            }
            .into());
        }
        if self.mask && !self.sequence {
            return Err(BuilderError::MissingDependency {
                channel: Channel::Mask,
                requires: Channel::Sequence,
            }
            .into());
        }
        if !self.name_separator.is_ascii() || !is_printable(self.name_separator as u8) {
            return Err(BuilderError::InvalidNameSeparator(self.name_separator).into());
        }

        let mut flags = Flags::new();
        let enabled = [
            (Flag::Id, self.id),
            (Flag::Comment, self.comment),
            (Flag::Length, self.length || self.sequence),
            (Flag::Sequence, self.sequence),
            (Flag::Quality, self.quality),
            (
                Flag::Mask,
                self.mask && self.sequence_type.is_case_normalized(),
            ),
            (Flag::Title, self.title.is_some()),
        ];
        for (flag, on) in enabled {
            if on {
                flags.set(flag);
            }
        }
        Ok(flags)
    }

    /// Builds an encoder writing to `inner`
    ///
    /// # Parameters
    ///
    /// * `inner` - The destination of the archive, written only on finalization
    ///
    /// # Returns
    ///
    /// * `Ok(Encoder)` - An encoder ready to accept records
    /// * `Err(_)` - If the configuration is invalid
    pub fn build<W: Write>(self, inner: W) -> Result<Encoder<W, C>> {
        let flags = self.flags()?;
        let mut header = ArchiveHeader::new(self.sequence_type, flags);
        header.line_length = self.line_length;
        header.name_separator = self.name_separator;
        debug!(
            "Encoding {} archive with flags {:#04x}",
            self.sequence_type,
            flags.as_byte()
        );
        Ok(Encoder {
            inner: Some(inner),
            header,
            title: self.title,
            compressor: self.compressor,
            ids: Vec::new(),
            comments: Vec::new(),
            lengths: Vec::new(),
            sequence: Packer::new(self.sequence_type),
            mask: MaskBuilder::new(),
            quality: Vec::new(),
        })
    }

    /// Builds an encoder writing to a new file at `path`
    ///
    /// # Errors
    ///
    /// * `SourceError::IsADirectory` if the path is a directory
    /// * `SourceError::NotFound` if the parent directory does not exist
    pub fn with_path<P: AsRef<Path>>(self, path: P) -> Result<Encoder<BufWriter<File>, C>> {
        let path = path.as_ref();
        if path.is_dir() {
            return Err(SourceError::IsADirectory(path.to_path_buf()).into());
        }
        let flags = self.flags()?;
        let file = File::create(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SourceError::NotFound(path.to_path_buf()).into(),
            _ => Error::from(e),
        })?;
        debug!("Created {} (flags {:#04x})", path.display(), flags.as_byte());
        self.build(BufWriter::new(file))
    }
}

/// A writer of archive records
///
/// Records are buffered in memory until [`Encoder::finish`] is called, or the
/// encoder is dropped. Errors raised while finishing on drop can only be logged,
/// so callers should finish explicitly.
pub struct Encoder<W: Write, C: Compressor = Zstd> {
    /// Destination, `None` once finalized
    inner: Option<W>,
    header: ArchiveHeader,
    title: Option<String>,
    compressor: C,

    ids: Vec<u8>,
    comments: Vec<u8>,
    lengths: Vec<u8>,
    sequence: Packer,
    mask: MaskBuilder,
    quality: Vec<u8>,
}

impl<W: Write, C: Compressor> Encoder<W, C> {
    /// The header that will be written, with the current record count
    #[must_use]
    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    /// Number of records written so far
    #[must_use]
    pub fn number_of_sequences(&self) -> u64 {
        self.header.number_of_sequences
    }

    /// Returns the field of `channel` if that channel is enabled
    fn field<'r>(&self, channel: Channel, value: Option<&'r str>) -> Result<Option<&'r str>> {
        if !self.header.flags.has(channel) {
            return Ok(None);
        }
        let value = value.ok_or(WriteError::MissingField(channel))?;
        Ok(Some(value))
    }

    /// Length stored for `record`, if the length channel is enabled
    fn record_length(&self, record: &Record) -> Result<Option<u64>> {
        if !self.header.flags.has(Channel::Length) {
            return Ok(None);
        }
        let from_sequence = record.sequence.as_ref().map(|s| s.len() as u64);
        match (record.length, from_sequence) {
            (Some(got), Some(expected)) if got != expected => {
                Err(WriteError::InconsistentLength { expected, got }.into())
            }
            (Some(length), _) | (None, Some(length)) => Ok(Some(length)),
            (None, None) => Err(WriteError::MissingField(Channel::Length).into()),
        }
    }

    /// Adds a record to the archive
    ///
    /// # Errors
    ///
    /// * `WriteError::ClosedEncoder` if the encoder was finalized
    /// * `WriteError::MissingField` if an enabled channel has no value
    /// * `WriteError::InconsistentLength` / `InconsistentQuality` if lengths disagree
    /// * `WriteError::InteriorNul` if the id or comment holds a NUL byte
    /// * `SequenceError` if a residue is outside of the alphabet
    pub fn write(&mut self, record: &Record) -> Result<()> {
        if self.inner.is_none() {
            return Err(WriteError::ClosedEncoder.into());
        }

        let sequence = self.field(Channel::Sequence, record.sequence.as_deref())?;
        let id = self.field(Channel::Id, record.id.as_deref())?;
        let comment = self.field(Channel::Comment, record.comment.as_deref())?;
        let quality = self.field(Channel::Quality, record.quality.as_deref())?;
        let length = self.record_length(record)?;

        for (channel, text) in [(Channel::Id, id), (Channel::Comment, comment)] {
            if text.is_some_and(|t| t.contains('\0')) {
                return Err(WriteError::InteriorNul(channel).into());
            }
        }
        if let (Some(quality), Some(sequence)) = (quality, sequence) {
            if quality.len() != sequence.len() {
                return Err(WriteError::InconsistentQuality {
                    expected: sequence.len(),
                    got: quality.len(),
                }
                .into());
            }
        }

        // last fallible step, appends nothing on failure
        if let Some(sequence) = sequence {
            self.sequence.push(sequence)?;
            if self.header.flags.has(Channel::Mask) {
                self.mask.push(sequence);
            }
        }

        if let Some(id) = id {
            self.ids.extend_from_slice(id.as_bytes());
            self.ids.push(0);
        }
        if let Some(comment) = comment {
            self.comments.extend_from_slice(comment.as_bytes());
            self.comments.push(0);
        }
        if let Some(length) = length {
            write_length(&mut self.lengths, length);
        }
        if let Some(quality) = quality {
            self.quality.extend_from_slice(quality.as_bytes());
        }
        self.header.number_of_sequences += 1;
        Ok(())
    }

    /// Compresses every channel and writes the archive
    ///
    /// Returns the destination the first time, `None` afterwards.
    fn finalize(&mut self) -> Result<Option<W>> {
        let Some(mut inner) = self.inner.take() else {
            return Ok(None);
        };

        let mask = std::mem::take(&mut self.mask);
        if self.header.flags.has(Channel::Mask) && !mask.has_lowercase() {
            debug!("No lower-case residues, omitting the mask channel");
            self.header.flags.unset(Flag::Mask);
        }
        let mask = if self.header.flags.has(Channel::Mask) {
            mask.finish()
        } else {
            Vec::new()
        };

        self.header.write_bytes(&mut inner)?;
        if let Some(title) = &self.title {
            write_title(&mut inner, title)?;
        }
        for channel in Channel::ORDER {
            if !self.header.flags.has(channel) {
                continue;
            }
            let data: &[u8] = match channel {
                Channel::Id => &self.ids,
                Channel::Comment => &self.comments,
                Channel::Length => &self.lengths,
                Channel::Mask => &mask,
                Channel::Sequence => self.sequence.as_bytes(),
                Channel::Quality => &self.quality,
            };
            Block::compress(channel, data, &self.compressor)?.write_to(&mut inner)?;
        }
        inner.flush()?;

        debug!(
            "Finalized archive: {} records, flags {:#04x}",
            self.header.number_of_sequences,
            self.header.flags.as_byte()
        );
        Ok(Some(inner))
    }

    /// Writes the archive to the destination and releases it
    ///
    /// Calling `finish` more than once is a no-op. Records written afterwards
    /// are refused with `WriteError::ClosedEncoder`.
    pub fn finish(&mut self) -> Result<()> {
        self.finalize().map(|_| ())
    }

    /// Finishes the archive and returns the destination
    ///
    /// # Errors
    ///
    /// * `WriteError::ClosedEncoder` if the encoder was already finished
    pub fn into_inner(mut self) -> Result<W> {
        self.finalize()?
            .ok_or_else(|| WriteError::ClosedEncoder.into())
    }
}

impl<W: Write, C: Compressor> Drop for Encoder<W, C> {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            error!("Failed to finalize archive: {e}");
        }
    }
}
