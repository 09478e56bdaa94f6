//! Residue alphabets and sequence packing
//!
//! Nucleotide sequences are packed as 4-bit IUPAC codes, two residues per byte
//! with the first residue in the low nibble:
//!
//! ```text
//! code:  0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15
//! base:  - T G K C Y S B A W R  D  M  H  V  N
//! ```
//!
//! RNA uses the same table with `U` in place of `T`. Protein sequences are
//! stored one upper-case symbol per byte, and text sequences are stored
//! verbatim. Packing is continuous across records: a record may start in the
//! high nibble of a byte shared with the previous record.

use crate::error::SequenceError;
use crate::header::SequenceType;

/// Decoded symbols of the DNA alphabet, indexed by code
const DNA_SYMBOLS: [u8; 16] = *b"-TGKCYSBAWRDMHVN";

/// Decoded symbols of the RNA alphabet, indexed by code
const RNA_SYMBOLS: [u8; 16] = *b"-UGKCYSBAWRDMHVN";

const INVALID: u8 = 0xFF;

/// ASCII to nucleotide code, case insensitive, accepting both `T` and `U`
const NUCLEOTIDE_CODES: [u8; 256] = {
    let mut table = [INVALID; 256];
    let mut code = 0;
    while code < 16 {
        let upper = DNA_SYMBOLS[code];
        table[upper as usize] = code as u8;
        table[upper.to_ascii_lowercase() as usize] = code as u8;
        code += 1;
    }
    table[b'U' as usize] = 1;
    table[b'u' as usize] = 1;
    table
};

/// Returns the 4-bit code of a nucleotide, `None` if it is not an IUPAC symbol
#[inline]
#[must_use]
pub fn encode_nucleotide(byte: u8) -> Option<u8> {
    match NUCLEOTIDE_CODES[byte as usize] {
        INVALID => None,
        code => Some(code),
    }
}

/// Returns the upper-case symbol of a 4-bit nucleotide code
#[inline]
#[must_use]
pub fn decode_nucleotide(code: u8, sequence_type: SequenceType) -> u8 {
    let symbols = if sequence_type == SequenceType::Rna {
        &RNA_SYMBOLS
    } else {
        &DNA_SYMBOLS
    };
    symbols[(code & 0x0F) as usize]
}

#[inline]
fn is_protein(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'*' || byte == b'-'
}

/// Checks whether a character belongs to the alphabet of a sequence type
#[must_use]
pub fn accepts(sequence_type: SequenceType, residue: char) -> bool {
    if sequence_type == SequenceType::Text {
        return true;
    }
    if !residue.is_ascii() {
        return false;
    }
    let byte = residue as u8;
    match sequence_type {
        SequenceType::Dna => {
            encode_nucleotide(byte).is_some() && !byte.eq_ignore_ascii_case(&b'U')
        }
        SequenceType::Rna => {
            encode_nucleotide(byte).is_some() && !byte.eq_ignore_ascii_case(&b'T')
        }
        SequenceType::Protein => is_protein(byte),
        SequenceType::Text => true,
    }
}

/// Checks a whole sequence against the alphabet of a sequence type.
///
/// Both cases are accepted; the reported position counts characters from 0.
pub fn validate(sequence: &str, sequence_type: SequenceType) -> Result<(), SequenceError> {
    if sequence_type == SequenceType::Text {
        return Ok(());
    }
    match sequence
        .chars()
        .enumerate()
        .find(|&(_, c)| !accepts(sequence_type, c))
    {
        Some((position, residue)) => Err(SequenceError {
            residue,
            position,
            sequence_type,
        }),
        None => Ok(()),
    }
}

/// Number of packed bytes holding `residues` residues
#[inline]
#[must_use]
pub fn packed_len(sequence_type: SequenceType, residues: usize) -> usize {
    if sequence_type.is_nucleotide() {
        residues.div_ceil(2)
    } else {
        residues
    }
}

/// Streaming sequence packer.
///
/// Sequences pushed one after another are packed back to back, sharing a
/// byte across a record boundary when a nucleotide record has odd length.
#[derive(Debug, Clone)]
pub struct Packer {
    sequence_type: SequenceType,
    buffer: Vec<u8>,
    residues: usize,
}

impl Packer {
    #[must_use]
    pub fn new(sequence_type: SequenceType) -> Self {
        Self {
            sequence_type,
            buffer: Vec::new(),
            residues: 0,
        }
    }

    /// Validates and appends a sequence.
    ///
    /// Nothing is appended if validation fails.
    pub fn push(&mut self, sequence: &str) -> Result<(), SequenceError> {
        validate(sequence, self.sequence_type)?;
        match self.sequence_type {
            SequenceType::Dna | SequenceType::Rna => {
                self.buffer.reserve(sequence.len().div_ceil(2));
                for byte in sequence.bytes() {
                    let code = NUCLEOTIDE_CODES[byte as usize];
                    if self.residues % 2 == 0 {
                        self.buffer.push(code);
                    } else if let Some(last) = self.buffer.last_mut() {
                        *last |= code << 4;
                    }
                    self.residues += 1;
                }
            }
            SequenceType::Protein => {
                self.buffer
                    .extend(sequence.bytes().map(|b| b.to_ascii_uppercase()));
                self.residues += sequence.len();
            }
            SequenceType::Text => {
                self.buffer.extend_from_slice(sequence.as_bytes());
                self.residues += sequence.len();
            }
        }
        Ok(())
    }

    /// Total number of residues pushed so far
    #[must_use]
    pub fn residues(&self) -> usize {
        self.residues
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

/// Packs a single sequence
pub fn pack(sequence: &str, sequence_type: SequenceType) -> Result<Vec<u8>, SequenceError> {
    let mut packer = Packer::new(sequence_type);
    packer.push(sequence)?;
    Ok(packer.into_inner())
}

/// Decodes `count` residues starting at residue offset `start`.
///
/// The caller guarantees `packed_len(sequence_type, start + count) <= data.len()`.
/// Nucleotide and protein residues are returned upper case; text is returned
/// as raw bytes. Protein symbols are checked again while decoding.
pub fn unpack(
    data: &[u8],
    start: usize,
    count: usize,
    sequence_type: SequenceType,
) -> Result<Vec<u8>, SequenceError> {
    match sequence_type {
        SequenceType::Dna | SequenceType::Rna => Ok((start..start + count)
            .map(|n| {
                let byte = data[n / 2];
                let code = if n % 2 == 0 { byte & 0x0F } else { byte >> 4 };
                decode_nucleotide(code, sequence_type)
            })
            .collect()),
        SequenceType::Protein => {
            let symbols = &data[start..start + count];
            if let Some(position) = symbols.iter().position(|&b| !is_protein(b)) {
                return Err(SequenceError {
                    residue: char::from(symbols[position]),
                    position,
                    sequence_type,
                });
            }
            Ok(symbols.to_ascii_uppercase())
        }
        SequenceType::Text => Ok(data[start..start + count].to_vec()),
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_nucleotide_codes() {
        for (code, &symbol) in DNA_SYMBOLS.iter().enumerate() {
            assert_eq!(encode_nucleotide(symbol), Some(code as u8));
            assert_eq!(encode_nucleotide(symbol.to_ascii_lowercase()), Some(code as u8));
            assert_eq!(decode_nucleotide(code as u8, SequenceType::Dna), symbol);
        }
        assert_eq!(encode_nucleotide(b'U'), Some(1));
        assert_eq!(decode_nucleotide(1, SequenceType::Rna), b'U');
        assert_eq!(encode_nucleotide(b'?'), None);
        assert_eq!(encode_nucleotide(b'X'), None);
    }

    #[test]
    fn test_pack_low_nibble_first() -> anyhow::Result<()> {
        assert_eq!(pack("ACGT", SequenceType::Dna)?, [0x48, 0x12]);
        assert_eq!(pack("acg", SequenceType::Dna)?, [0x48, 0x02]);
        assert_eq!(pack("", SequenceType::Dna)?, Vec::<u8>::new());
        assert_eq!(pack("ACGU", SequenceType::Rna)?, [0x48, 0x12]);
        Ok(())
    }

    #[test]
    fn test_packing_continues_across_records() -> anyhow::Result<()> {
        let mut packer = Packer::new(SequenceType::Dna);
        packer.push("A")?;
        packer.push("CG")?;
        packer.push("")?;
        packer.push("T")?;
        assert_eq!(packer.residues(), 4);
        assert_eq!(packer.as_bytes(), &[0x48, 0x12]);

        let data = packer.into_inner();
        assert_eq!(unpack(&data, 0, 1, SequenceType::Dna)?, b"A");
        assert_eq!(unpack(&data, 1, 2, SequenceType::Dna)?, b"CG");
        assert_eq!(unpack(&data, 3, 0, SequenceType::Dna)?, b"");
        assert_eq!(unpack(&data, 3, 1, SequenceType::Dna)?, b"T");
        Ok(())
    }

    #[test]
    fn test_invalid_residues() {
        let e = validate("ACG?T", SequenceType::Dna).unwrap_err();
        assert_eq!(e.residue, '?');
        assert_eq!(e.position, 3);

        let e = validate("ACGU", SequenceType::Dna).unwrap_err();
        assert_eq!((e.residue, e.position), ('U', 3));

        let e = validate("acgt", SequenceType::Rna).unwrap_err();
        assert_eq!((e.residue, e.position), ('t', 3));

        let e = validate("MKV1", SequenceType::Protein).unwrap_err();
        assert_eq!((e.residue, e.position), ('1', 3));

        let e = validate("ACé", SequenceType::Dna).unwrap_err();
        assert_eq!((e.residue, e.position), ('é', 2));

        assert!(validate("anything goes: é?1", SequenceType::Text).is_ok());
    }

    #[test]
    fn test_failed_push_appends_nothing() -> anyhow::Result<()> {
        let mut packer = Packer::new(SequenceType::Dna);
        packer.push("ACG")?;
        assert!(packer.push("TT!").is_err());
        assert_eq!(packer.residues(), 3);
        assert_eq!(packer.as_bytes(), &[0x48, 0x02]);
        Ok(())
    }

    #[test]
    fn test_protein_and_text() -> anyhow::Result<()> {
        let packed = pack("mkvL*-XBZJOU", SequenceType::Protein)?;
        assert_eq!(packed, b"MKVL*-XBZJOU");
        assert_eq!(unpack(&packed, 0, packed.len(), SequenceType::Protein)?, packed);

        let e = unpack(b"MK1", 0, 3, SequenceType::Protein).unwrap_err();
        assert_eq!(e.position, 2);

        let packed = pack("Hello, World!", SequenceType::Text)?;
        assert_eq!(packed, b"Hello, World!");
        assert_eq!(unpack(&packed, 7, 5, SequenceType::Text)?, b"World");
        Ok(())
    }

    #[test]
    fn test_random_nucleotides() -> anyhow::Result<()> {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut packer = Packer::new(SequenceType::Dna);
        let mut sequences = Vec::new();
        for _ in 0..100 {
            let len = rng.random_range(0..50);
            let sequence: String = (0..len)
                .map(|_| char::from(DNA_SYMBOLS[rng.random_range(0..16)]))
                .collect();
            packer.push(&sequence)?;
            sequences.push(sequence);
        }
        let total: usize = sequences.iter().map(String::len).sum();
        let data = packer.into_inner();
        assert_eq!(data.len(), packed_len(SequenceType::Dna, total));

        let mut offset = 0;
        for sequence in &sequences {
            let decoded = unpack(&data, offset, sequence.len(), SequenceType::Dna)?;
            assert_eq!(decoded, sequence.as_bytes());
            offset += sequence.len();
        }
        Ok(())
    }
}
