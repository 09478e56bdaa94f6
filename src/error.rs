use std::path::PathBuf;

use crate::header::SequenceType;
use crate::record::Channel;

/// Custom Result type for nafpack operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the nafpack library, encompassing all possible error cases
/// that can occur while encoding or decoding an archive.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub enum Error {
    /// Errors related to opening the byte source or destination
    SourceError(#[from] SourceError),
    /// Errors related to archive header processing
    HeaderError(#[from] HeaderError),
    /// Errors that occur while decoding records
    ReadError(#[from] ReadError),
    /// Errors that occur while encoding records
    WriteError(#[from] WriteError),
    /// Errors that occur while configuring an encoder or decoder
    BuilderError(#[from] BuilderError),
    /// Residues outside of the declared alphabet
    SequenceError(#[from] SequenceError),
    /// Standard I/O errors from the Rust standard library
    IoError(#[from] std::io::Error),
}

/// Broad classification of an [`Error`].
///
/// Every error raised by the codec falls in exactly one of these categories,
/// which callers can use to decide how to report a failure without matching
/// on every individual variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The byte source could not be opened (missing file, directory, ...)
    Source,
    /// The archive is malformed (header, flags, channel contents)
    InvalidArchive,
    /// A compressed block could not be decompressed
    CorruptBlock,
    /// A residue is outside of the declared alphabet
    InvalidSequence,
    /// A required record field is absent
    MissingField,
    /// Record fields disagree with each other
    InconsistentField,
    /// A record was written after the encoder was finalized
    ClosedEncoder,
    /// Any other I/O failure of the underlying source or destination
    Io,
}

impl Error {
    /// Returns the category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceError(_) => ErrorKind::Source,
            Self::HeaderError(_) => ErrorKind::InvalidArchive,
            Self::ReadError(e) => e.kind(),
            Self::WriteError(e) => e.kind(),
            Self::BuilderError(_) => ErrorKind::InconsistentField,
            Self::SequenceError(_) => ErrorKind::InvalidSequence,
            Self::IoError(_) => ErrorKind::Io,
        }
    }
}

/// Errors raised while opening a path-based source or destination
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    /// The path does not exist
    #[error("No such file: {0}")]
    NotFound(PathBuf),

    /// The path points to a directory instead of a file
    #[error("Path is a directory: {0}")]
    IsADirectory(PathBuf),

    /// The path exists but is neither a regular file nor a directory
    #[error("File is not regular: {0}")]
    IncompatibleFile(PathBuf),
}

/// Errors specific to processing and validating archive headers
#[derive(thiserror::Error, Debug)]
pub enum HeaderError {
    /// The format descriptor at the start of the archive does not match
    ///
    /// # Arguments
    /// * `[u8; 3]` - The bytes found in place of the descriptor
    #[error("Invalid format descriptor: {0:02x?}")]
    InvalidMagicNumber([u8; 3]),

    /// The format version in the header is not supported
    ///
    /// # Arguments
    /// * `u8` - The unsupported version number that was found
    #[error("Invalid format version: {0}")]
    InvalidFormatVersion(u8),

    /// The sequence type tag is unknown
    #[error("Invalid sequence type: {0}")]
    InvalidSequenceType(u8),

    /// The name separator is not a printable ASCII character
    #[error("Invalid name separator: {0:#04x}")]
    InvalidNameSeparator(u8),

    /// The extended format flag is set, which this codec cannot read
    #[error("Extended archive format is not supported")]
    ExtendedFormat,

    /// A channel is flagged without a channel it depends on
    ///
    /// # Fields
    /// * `channel` - The channel that was found
    /// * `requires` - The channel it cannot be decoded without
    #[error("The {channel} channel requires the {requires} channel")]
    InconsistentFlags { channel: Channel, requires: Channel },

    /// A variable-length integer does not fit in 64 bits
    #[error("Variable-length integer overflows 64 bits")]
    VarintOverflow,

    /// The title is not valid UTF-8
    #[error("Archive title is not valid UTF-8")]
    InvalidTitle,

    /// The source ended before the header was complete
    #[error("Archive header is truncated")]
    Truncated,
}

/// Errors that can occur while decoding archive contents
#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    /// A block payload could not be decompressed
    ///
    /// # Fields
    /// * `channel` - The channel the block belongs to
    /// * `source` - The error reported by the compressor
    #[error("Corrupt {channel} block: {source}")]
    CorruptBlock {
        channel: Channel,
        #[source]
        source: std::io::Error,
    },

    /// The decompressed size of a block differs from the size declared in its prefix
    #[error("Corrupt {channel} block: expected {expected} bytes, decompressed {got}")]
    BlockSizeMismatch {
        channel: Channel,
        expected: u64,
        got: u64,
    },

    /// The source ended in the middle of a block
    ///
    /// # Arguments
    /// * `Channel` - The channel being read
    /// * `u64` - The declared compressed size of the block
    #[error("Truncated {0} block: expected {1} compressed bytes")]
    TruncatedBlock(Channel, u64),

    /// A channel ran out of entries before the record count was reached
    ///
    /// # Arguments
    /// * `Channel` - The exhausted channel
    /// * `u64` - The index of the record being decoded
    #[error("The {0} channel ended early at record {1}")]
    UnexpectedEndOfChannel(Channel, u64),

    /// A channel holds more data than the record count accounts for
    #[error("The {0} channel has trailing data after the last record")]
    TrailingData(Channel),

    /// The mask runs do not cover the decoded sequences exactly
    ///
    /// # Fields
    /// * `expected` - The total number of residues
    /// * `got` - The number of residues covered by the mask runs
    #[error("Mask runs cover {got} residues but sequences hold {expected}")]
    MaskLengthMismatch { expected: u64, got: u64 },

    /// A text channel holds bytes that are not valid UTF-8
    #[error("The {0} channel contains invalid UTF-8 at record {1}")]
    InvalidUtf8(Channel, u64),
}

impl ReadError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::CorruptBlock { .. } | Self::BlockSizeMismatch { .. } | Self::TruncatedBlock(..) => {
                ErrorKind::CorruptBlock
            }
            _ => ErrorKind::InvalidArchive,
        }
    }
}

/// Errors that can occur while encoding records
#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    /// A field required by an enabled channel is absent from the record
    #[error("Record is missing the {0} field")]
    MissingField(Channel),

    /// The quality string length does not match the sequence length
    ///
    /// # Fields
    /// * `expected` - The sequence length
    /// * `got` - The quality string length
    #[error("Quality length ({got}) does not match the sequence length ({expected})")]
    InconsistentQuality { expected: usize, got: usize },

    /// The declared record length does not match the sequence length
    #[error("Record length ({got}) does not match the sequence length ({expected})")]
    InconsistentLength { expected: u64, got: u64 },

    /// A NUL-terminated field contains a NUL byte
    #[error("The {0} field contains a NUL byte")]
    InteriorNul(Channel),

    /// A record was written after the encoder was finalized
    #[error("Cannot write to a finalized encoder")]
    ClosedEncoder,
}

impl WriteError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField(_) => ErrorKind::MissingField,
            Self::ClosedEncoder => ErrorKind::ClosedEncoder,
            _ => ErrorKind::InconsistentField,
        }
    }
}

/// Errors raised while configuring an encoder
#[derive(thiserror::Error, Debug)]
pub enum BuilderError {
    /// A channel was enabled without a channel it depends on
    #[error("Cannot enable the {channel} channel without the {requires} channel")]
    MissingDependency { channel: Channel, requires: Channel },

    /// The name separator is not a printable ASCII character
    #[error("Invalid name separator: {0:?}")]
    InvalidNameSeparator(char),
}

/// A residue that does not belong to the alphabet of the sequence type
///
/// # Fields
/// * `residue` - The offending character
/// * `position` - Its 0-based position within the sequence
/// * `sequence_type` - The declared sequence type
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {sequence_type} residue {residue:?} at position {position}")]
pub struct SequenceError {
    pub residue: char,
    pub position: usize,
    pub sequence_type: SequenceType,
}
