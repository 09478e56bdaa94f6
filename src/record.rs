//! Record values and the channels they are split into
//!
//! An archive does not store records contiguously: each field of a record is
//! appended to its own [`Channel`], and every channel is compressed on its own.
//! The Nth entry of every channel belongs to the Nth record.

use std::fmt;

use crate::header::Flag;

/// One field stream of an archive.
///
/// Channels are always laid out in the order given by [`Channel::ORDER`];
/// channels disabled in the header contribute no bytes at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Record identifiers, NUL-terminated
    Id,
    /// Record comments, NUL-terminated
    Comment,
    /// Sequence lengths, as length words
    Length,
    /// Case mask runs covering the concatenated sequences
    Mask,
    /// Packed residues of the concatenated sequences
    Sequence,
    /// Quality strings, concatenated
    Quality,
}

impl Channel {
    /// The on-disk order of the channel blocks
    pub const ORDER: [Channel; 6] = [
        Channel::Id,
        Channel::Comment,
        Channel::Length,
        Channel::Mask,
        Channel::Sequence,
        Channel::Quality,
    ];

    /// The header flag marking the presence of this channel
    #[must_use]
    pub fn flag(self) -> Flag {
        match self {
            Self::Id => Flag::Id,
            Self::Comment => Flag::Comment,
            Self::Length => Flag::Length,
            Self::Mask => Flag::Mask,
            Self::Sequence => Flag::Sequence,
            Self::Quality => Flag::Quality,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Comment => "comment",
            Self::Length => "length",
            Self::Mask => "mask",
            Self::Sequence => "sequence",
            Self::Quality => "quality",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single sequence record.
///
/// Every field is optional: a field is `None` when its channel is absent from
/// the archive, or when the decoder was configured not to materialize it.
///
/// ## Quality
///
/// If set, the quality string has exactly one character per residue of the
/// sequence. Since quality strings are stored as raw text, they may hold other
/// per-residue annotations as well (e.g. secondary structure).
///
/// ## Length
///
/// The length counts the bytes of the UTF-8 sequence string. Nucleotide and
/// protein alphabets are ASCII, so for them it is the residue count; a
/// [`SequenceType::Text`](crate::SequenceType::Text) sequence with non-ASCII
/// characters has a length larger than its `chars()` count. The length is
/// available even when the sequence itself was not decoded, which makes
/// length-only scans cheap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    /// The record identifier (accession number)
    pub id: Option<String>,
    /// The record comment (description)
    pub comment: Option<String>,
    /// The record sequence, case preserved
    pub sequence: Option<String>,
    /// The record quality string
    pub quality: Option<String>,
    /// The record sequence length, in bytes
    pub length: Option<u64>,
}

impl Record {
    /// Creates a record with an identifier and a sequence.
    ///
    /// The length is filled in from the byte length of the sequence.
    pub fn new<I: Into<String>, S: Into<String>>(id: I, sequence: S) -> Self {
        let sequence = sequence.into();
        Self {
            id: Some(id.into()),
            length: Some(sequence.len() as u64),
            sequence: Some(sequence),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comment = Some(comment.into());
        self
    }

    #[must_use]
    pub fn with_quality<S: Into<String>>(mut self, quality: S) -> Self {
        self.quality = Some(quality.into());
        self
    }
}
