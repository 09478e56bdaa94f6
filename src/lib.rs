//! # nafpack
//!
//! A streaming codec for Nucleotide Archive Format (NAF) sequence archives.
//!
//! An archive stores a collection of sequence records (identifier, comment,
//! sequence, quality) split into independent channels, each compressed with
//! zstd. Nucleotide sequences are packed as 4-bit IUPAC codes, and the case of
//! residues is kept in a separate run-length mask.
//!
//! ## Writing
//!
//! ```no_run
//! use nafpack::{EncoderBuilder, Record, Result, SequenceType};
//!
//! fn main() -> Result<()> {
//!     let mut encoder = EncoderBuilder::new(SequenceType::Dna)
//!         .id(true)
//!         .comment(true)
//!         .sequence(true)
//!         .mask(true)
//!         .with_path("genomes.naf")?;
//!     encoder.write(&Record::new("chr1", "ACGTacgtNN").with_comment("first"))?;
//!     encoder.finish()
//! }
//! ```
//!
//! ## Reading
//!
//! ```no_run
//! use nafpack::{Decoder, Result};
//!
//! fn main() -> Result<()> {
//!     for record in Decoder::from_path("genomes.naf")? {
//!         let record = record?;
//!         println!(">{}", record.id.unwrap_or_default());
//!     }
//!     Ok(())
//! }
//! ```

pub mod alphabet;
pub mod block;
mod decoder;
mod encoder;
pub mod error;
pub mod header;
pub mod mask;
pub mod prelude;
mod record;
pub mod utils;

pub use block::{Compressor, Zstd};
pub use decoder::{Decoder, DecoderBuilder};
pub use encoder::{Encoder, EncoderBuilder};
pub use error::{Error, ErrorKind, Result};
pub use header::{ArchiveHeader, Flag, Flags, FormatVersion, SequenceType};
pub use record::{Channel, Record};
