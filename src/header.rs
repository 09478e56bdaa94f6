//! Header module for the nafpack library
//!
//! This module provides the header structure of an archive. The header holds the
//! archive-level metadata needed before any block can be interpreted: the format
//! version, the sequence type, which channels are present, and the record count.
//!
//! ```text
//! ┌──────────────────────┐
//! │ Format descriptor    │ 3 bytes (01 F9 EC)
//! │ Format version       │ 1 byte  (1 or 2)
//! │ Sequence type        │ 1 byte  (version 2 only)
//! │ Flags                │ 1 byte
//! │ Name separator       │ 1 byte
//! │ Line length          │ varint
//! │ Number of sequences  │ varint
//! │ Title (optional)     │ varint length + bytes
//! └──────────────────────┘
//! ```

use std::fmt;
use std::io::{self, Read, Write};
use std::ops::BitOr;
use std::str::FromStr;

use crate::error::{Error, HeaderError, Result};
use crate::record::Channel;
use crate::utils::{read_varint, write_varint};

/// Format descriptor opening every archive
pub const MAGIC: [u8; 3] = [0x01, 0xF9, 0xEC];

/// Default line length recorded in new archives
pub const DEFAULT_LINE_LENGTH: u64 = 60;

/// Default separator between identifier and comment
pub const DEFAULT_NAME_SEPARATOR: char = ' ';

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FormatVersion {
    /// Nucleotide-only archives, without a sequence type byte
    V1 = 1,
    #[default]
    V2 = 2,
}

impl FormatVersion {
    fn from_u8(byte: u8) -> std::result::Result<Self, HeaderError> {
        match byte {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            _ => Err(HeaderError::InvalidFormatVersion(byte)),
        }
    }
}

/// The type of sequence stored in an archive.
///
/// The sequence type selects the alphabet used to validate and pack residues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SequenceType {
    #[default]
    Dna = 0,
    Rna = 1,
    Protein = 2,
    Text = 3,
}

impl SequenceType {
    /// Check whether the sequence type is a nucleotide type.
    #[inline]
    #[must_use]
    pub fn is_nucleotide(self) -> bool {
        matches!(self, Self::Dna | Self::Rna)
    }

    /// Check whether residues are normalized to upper case before packing.
    ///
    /// Text sequences are stored verbatim and never carry a mask.
    #[inline]
    #[must_use]
    pub fn is_case_normalized(self) -> bool {
        !matches!(self, Self::Text)
    }

    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(byte: u8) -> std::result::Result<Self, HeaderError> {
        match byte {
            0 => Ok(Self::Dna),
            1 => Ok(Self::Rna),
            2 => Ok(Self::Protein),
            3 => Ok(Self::Text),
            _ => Err(HeaderError::InvalidSequenceType(byte)),
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Dna => "dna",
            Self::Rna => "rna",
            Self::Protein => "protein",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SequenceType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dna" => Ok(Self::Dna),
            "rna" => Ok(Self::Rna),
            "protein" => Ok(Self::Protein),
            "text" => Ok(Self::Text),
            _ => Err(format!("unknown sequence type: {s:?}")),
        }
    }
}

/// A single bit of the header flags byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Quality = 0x01,
    Sequence = 0x02,
    Mask = 0x04,
    Length = 0x08,
    Comment = 0x10,
    Id = 0x20,
    Title = 0x40,
    Extended = 0x80,
}

impl Flag {
    #[must_use]
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl BitOr<Flag> for Flag {
    type Output = Flags;
    fn bitor(self, rhs: Flag) -> Flags {
        Flags(self.as_byte() | rhs.as_byte())
    }
}

/// The set of flags stored in an archive header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags(u8);

impl Flags {
    #[must_use]
    pub fn new() -> Self {
        Self(0)
    }

    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    #[must_use]
    pub fn as_byte(self) -> u8 {
        self.0
    }

    #[inline]
    #[must_use]
    pub fn test(self, flag: Flag) -> bool {
        self.0 & flag.as_byte() != 0
    }

    #[inline]
    pub fn set(&mut self, flag: Flag) {
        self.0 |= flag.as_byte();
    }

    #[inline]
    pub fn unset(&mut self, flag: Flag) {
        self.0 &= !flag.as_byte();
    }

    /// Check whether the block of the given channel is present
    #[inline]
    #[must_use]
    pub fn has(self, channel: Channel) -> bool {
        self.test(channel.flag())
    }
}

impl From<Flag> for Flags {
    fn from(flag: Flag) -> Self {
        Self(flag.as_byte())
    }
}

impl BitOr<Flag> for Flags {
    type Output = Flags;
    fn bitor(self, rhs: Flag) -> Flags {
        Flags(self.0 | rhs.as_byte())
    }
}

impl BitOr<Flags> for Flags {
    type Output = Flags;
    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// Channel dependencies: the first channel cannot be decoded without the second
const DEPENDENCIES: [(Channel, Channel); 4] = [
    (Channel::Quality, Channel::Sequence),
    (Channel::Mask, Channel::Sequence),
    (Channel::Sequence, Channel::Length),
    (Channel::Quality, Channel::Length),
];

/// Header of an archive
///
/// Headers are the only mandatory section of an archive; they are followed by
/// one compressed block per channel flagged in [`Flags`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHeader {
    /// Version of the file format
    pub format_version: FormatVersion,

    /// Type of the stored sequences
    pub sequence_type: SequenceType,

    /// Channels present in the archive, plus the title bit
    pub flags: Flags,

    /// Separator placed between identifier and comment when formatting names
    pub name_separator: char,

    /// Line length to use when formatting sequences as FASTA
    pub line_length: u64,

    /// Number of records in the archive
    pub number_of_sequences: u64,
}

impl Default for ArchiveHeader {
    fn default() -> Self {
        Self::new(SequenceType::default(), Flags::default())
    }
}

impl ArchiveHeader {
    /// Creates a version 2 header with no records
    #[must_use]
    pub fn new(sequence_type: SequenceType, flags: Flags) -> Self {
        Self {
            format_version: FormatVersion::V2,
            sequence_type,
            flags,
            name_separator: DEFAULT_NAME_SEPARATOR,
            line_length: DEFAULT_LINE_LENGTH,
            number_of_sequences: 0,
        }
    }

    #[must_use]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    #[must_use]
    pub fn sequence_type(&self) -> SequenceType {
        self.sequence_type
    }

    #[must_use]
    pub fn number_of_sequences(&self) -> u64 {
        self.number_of_sequences
    }

    /// Checks that every flagged channel can be decoded
    ///
    /// # Errors
    ///
    /// * `HeaderError::ExtendedFormat` if the extended format bit is set
    /// * `HeaderError::InconsistentFlags` if a channel is missing a dependency
    pub fn validate(&self) -> Result<()> {
        if self.flags.test(Flag::Extended) {
            return Err(HeaderError::ExtendedFormat.into());
        }
        for (channel, requires) in DEPENDENCIES {
            if self.flags.has(channel) && !self.flags.has(requires) {
                return Err(HeaderError::InconsistentFlags { channel, requires }.into());
            }
        }
        Ok(())
    }

    /// Reads and validates a header from a reader
    ///
    /// The title, if flagged, is not part of the header structure and must be
    /// read separately with [`read_title`].
    ///
    /// # Errors
    ///
    /// * `HeaderError::Truncated` if the reader ends inside the header
    /// * Header validation errors (descriptor, version, sequence type, flags)
    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 3];
        read_header_bytes(reader, &mut magic)?;
        if magic != MAGIC {
            return Err(HeaderError::InvalidMagicNumber(magic).into());
        }

        let mut byte = [0u8; 1];
        read_header_bytes(reader, &mut byte)?;
        let format_version = FormatVersion::from_u8(byte[0])?;

        let sequence_type = match format_version {
            FormatVersion::V1 => SequenceType::Dna,
            FormatVersion::V2 => {
                read_header_bytes(reader, &mut byte)?;
                SequenceType::from_u8(byte[0])?
            }
        };

        read_header_bytes(reader, &mut byte)?;
        let flags = Flags::from_byte(byte[0]);

        read_header_bytes(reader, &mut byte)?;
        if !is_printable(byte[0]) {
            return Err(HeaderError::InvalidNameSeparator(byte[0]).into());
        }
        let name_separator = char::from(byte[0]);

        let line_length = read_header_varint(reader)?;
        let number_of_sequences = read_header_varint(reader)?;

        let header = Self {
            format_version,
            sequence_type,
            flags,
            name_separator,
            line_length,
            number_of_sequences,
        };
        header.validate()?;
        Ok(header)
    }

    /// Writes the header to a writer
    ///
    /// # Errors
    ///
    /// * IO errors if writing to the writer fails
    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&MAGIC)?;
        writer.write_all(&[self.format_version as u8])?;
        if self.format_version == FormatVersion::V2 {
            writer.write_all(&[self.sequence_type.as_u8()])?;
        }
        writer.write_all(&[self.flags.as_byte(), self.name_separator as u8])?;
        write_varint(writer, self.line_length)?;
        write_varint(writer, self.number_of_sequences)?;
        Ok(())
    }
}

/// Reads the title following the header
pub fn read_title<R: Read>(reader: &mut R) -> Result<String> {
    let size = read_header_varint(reader)?;
    let mut bytes = Vec::new();
    let n = reader.take(size).read_to_end(&mut bytes)?;
    if (n as u64) < size {
        return Err(HeaderError::Truncated.into());
    }
    String::from_utf8(bytes).map_err(|_| HeaderError::InvalidTitle.into())
}

/// Writes a title following the header
pub fn write_title<W: Write>(writer: &mut W, title: &str) -> Result<()> {
    write_varint(writer, title.len() as u64)?;
    writer.write_all(title.as_bytes())?;
    Ok(())
}

/// Checks for printable ASCII (space included)
#[inline]
pub(crate) fn is_printable(byte: u8) -> bool {
    (0x20..=0x7E).contains(&byte)
}

/// Reads exactly `buffer.len()` bytes, reporting EOF as a truncated header
fn read_header_bytes<R: Read>(reader: &mut R, buffer: &mut [u8]) -> Result<()> {
    reader.read_exact(buffer).map_err(truncation)
}

fn read_header_varint<R: Read>(reader: &mut R) -> Result<u64> {
    read_varint(reader).map_err(|e| match e {
        Error::IoError(e) => truncation(e),
        e => e,
    })
}

fn truncation(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        HeaderError::Truncated.into()
    } else {
        e.into()
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_parse_v1_header() -> Result<()> {
        let bytes = [0x01, 0xF9, 0xEC, 0x01, 0x3E, 0x20, 0x3C, 0x20];
        let mut input = &bytes[..];
        let header = ArchiveHeader::from_reader(&mut input)?;
        assert_eq!(header.format_version, FormatVersion::V1);
        assert_eq!(header.sequence_type, SequenceType::Dna);
        assert_eq!(header.name_separator, ' ');
        assert_eq!(header.line_length, 60);
        assert_eq!(header.number_of_sequences, 32);
        assert!(header.flags.test(Flag::Id));
        assert!(header.flags.test(Flag::Comment));
        assert!(header.flags.test(Flag::Length));
        assert!(header.flags.test(Flag::Mask));
        assert!(header.flags.test(Flag::Sequence));
        assert!(!header.flags.test(Flag::Quality));
        assert!(input.is_empty());
        Ok(())
    }

    #[test]
    fn test_write_read_header() -> Result<()> {
        let mut header = ArchiveHeader::new(
            SequenceType::Protein,
            Flag::Id | Flag::Length | Flag::Sequence,
        );
        header.number_of_sequences = 1000;
        header.line_length = 80;
        header.name_separator = '|';

        let mut buffer = Vec::new();
        header.write_bytes(&mut buffer)?;
        assert_eq!(&buffer[..6], &[0x01, 0xF9, 0xEC, 0x02, 0x02, 0x2A]);

        let parsed = ArchiveHeader::from_reader(&mut buffer.as_slice())?;
        assert_eq!(parsed, header);
        Ok(())
    }

    #[test]
    fn test_title() -> Result<()> {
        let mut buffer = Vec::new();
        write_title(&mut buffer, "phiX genomes")?;
        assert_eq!(buffer[0], 12);
        assert_eq!(read_title(&mut buffer.as_slice())?, "phiX genomes");

        let truncated = &buffer[..5];
        assert!(matches!(
            read_title(&mut &truncated[..]),
            Err(Error::HeaderError(HeaderError::Truncated))
        ));
        Ok(())
    }

    #[test]
    fn test_invalid_magic() {
        let bytes = [0x42, 0x53, 0x45, 0x51, 0x00, 0x00];
        assert!(matches!(
            ArchiveHeader::from_reader(&mut &bytes[..]),
            Err(Error::HeaderError(HeaderError::InvalidMagicNumber(_)))
        ));
    }

    #[test]
    fn test_invalid_version_and_type() {
        let bytes = [0x01, 0xF9, 0xEC, 0x03, 0x00, 0x00, 0x20, 0x3C, 0x00];
        assert!(matches!(
            ArchiveHeader::from_reader(&mut &bytes[..]),
            Err(Error::HeaderError(HeaderError::InvalidFormatVersion(3)))
        ));

        let bytes = [0x01, 0xF9, 0xEC, 0x02, 0x07, 0x00, 0x20, 0x3C, 0x00];
        assert!(matches!(
            ArchiveHeader::from_reader(&mut &bytes[..]),
            Err(Error::HeaderError(HeaderError::InvalidSequenceType(7)))
        ));
    }

    #[test]
    fn test_truncated_header() {
        for len in 0..8 {
            let bytes = [0x01, 0xF9, 0xEC, 0x02, 0x00, 0x2A, 0x20, 0x3C];
            assert!(
                matches!(
                    ArchiveHeader::from_reader(&mut &bytes[..len]),
                    Err(Error::HeaderError(HeaderError::Truncated))
                ),
                "prefix of length {len} should be truncated"
            );
        }
    }

    #[test]
    fn test_inconsistent_flags() {
        // quality without sequence
        let bytes = [0x01, 0xF9, 0xEC, 0x02, 0x00, 0x09, 0x20, 0x3C, 0x01];
        assert!(matches!(
            ArchiveHeader::from_reader(&mut &bytes[..]),
            Err(Error::HeaderError(HeaderError::InconsistentFlags {
                channel: Channel::Quality,
                requires: Channel::Sequence,
            }))
        ));

        // sequence without lengths
        let bytes = [0x01, 0xF9, 0xEC, 0x02, 0x00, 0x22, 0x20, 0x3C, 0x01];
        assert!(matches!(
            ArchiveHeader::from_reader(&mut &bytes[..]),
            Err(Error::HeaderError(HeaderError::InconsistentFlags {
                channel: Channel::Sequence,
                requires: Channel::Length,
            }))
        ));

        // extended format
        let bytes = [0x01, 0xF9, 0xEC, 0x02, 0x00, 0xA0, 0x20, 0x3C, 0x01];
        assert!(matches!(
            ArchiveHeader::from_reader(&mut &bytes[..]),
            Err(Error::HeaderError(HeaderError::ExtendedFormat))
        ));
    }

    #[test]
    fn test_sequence_type_from_str() {
        assert_eq!("dna".parse::<SequenceType>(), Ok(SequenceType::Dna));
        assert_eq!("RNA".parse::<SequenceType>(), Ok(SequenceType::Rna));
        assert_eq!("protein".parse::<SequenceType>(), Ok(SequenceType::Protein));
        assert_eq!("text".parse::<SequenceType>(), Ok(SequenceType::Text));
        assert!("amino".parse::<SequenceType>().is_err());
        assert_eq!(SequenceType::Protein.to_string(), "protein");
    }

    #[test]
    fn test_flag_operations() {
        let mut flags = Flag::Id | Flag::Sequence | Flag::Length;
        assert!(flags.has(Channel::Id));
        assert!(!flags.has(Channel::Quality));
        flags.set(Flag::Quality);
        assert!(flags.has(Channel::Quality));
        flags.unset(Flag::Id);
        assert!(!flags.has(Channel::Id));
        assert_eq!(flags.as_byte(), 0x0B);
        assert_eq!(Flags::from(Flag::Mask) | Flags::from(Flag::Id), Flag::Mask | Flag::Id);
    }
}
