//! Case mask codec
//!
//! Residues are packed in upper case, so the original case of a sequence is kept
//! in a separate mask channel: a list of run lengths alternating between upper
//! and lower case, always starting with an upper-case run (which may be empty).
//!
//! The runs cover the concatenation of every sequence in the archive, so a
//! single run may straddle several records. Each run `n` is serialized as
//! `n / 255` bytes of `0xFF` followed by a single byte `n % 255`.

use crate::error::{ReadError, Result};
use crate::record::Channel;

const RUN_CONTINUATION: u8 = 0xFF;

/// Computes the mask runs of a single sequence.
#[must_use]
pub fn encode(sequence: &str) -> Vec<u64> {
    let mut builder = MaskBuilder::new();
    builder.push(sequence);
    builder.into_runs()
}

/// Lower-cases the residues covered by lower-case runs.
///
/// The runs must cover the sequence exactly. The sequence is left untouched
/// when they do not.
pub fn apply(sequence: &mut [u8], runs: &[u64]) -> Result<()> {
    let total: u64 = runs.iter().sum();
    if total != sequence.len() as u64 {
        return Err(ReadError::MaskLengthMismatch {
            expected: sequence.len() as u64,
            got: total,
        }
        .into());
    }
    let mut data = Vec::new();
    write_runs(runs, &mut data);
    let mut cursor = MaskCursor::new(data);
    cursor.apply(sequence)?;
    cursor.finish()
}

/// Serializes runs to the mask channel format
pub fn write_runs(runs: &[u64], buffer: &mut Vec<u8>) {
    for &run in runs {
        let full = (run / 255) as usize;
        buffer.resize(buffer.len() + full, RUN_CONTINUATION);
        buffer.push((run % 255) as u8);
    }
}

/// Parses every run of a serialized mask channel
pub fn read_runs(data: &[u8]) -> Result<Vec<u64>> {
    let mut cursor = MaskCursor::new(data);
    let mut runs = Vec::new();
    while let Some(run) = cursor.next_run()? {
        runs.push(run);
    }
    Ok(runs)
}

/// Accumulates mask runs over all the sequences of an archive
#[derive(Debug, Clone, Default)]
pub struct MaskBuilder {
    runs: Vec<u64>,
    current: u64,
    lower: bool,
    has_lowercase: bool,
}

impl MaskBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Extends the current runs with the case of `sequence`
    pub fn push(&mut self, sequence: &str) {
        for byte in sequence.bytes() {
            let lower = byte.is_ascii_lowercase();
            if lower != self.lower {
                self.runs.push(self.current);
                self.current = 0;
                self.lower = lower;
                self.has_lowercase |= lower;
            }
            self.current += 1;
        }
    }

    /// Whether any lower-case residue was pushed so far
    #[must_use]
    pub fn has_lowercase(&self) -> bool {
        self.has_lowercase
    }

    #[must_use]
    pub fn into_runs(mut self) -> Vec<u64> {
        self.runs.push(self.current);
        self.runs
    }

    /// Closes the last run and serializes the mask channel
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        let runs = self.into_runs();
        let mut buffer = Vec::with_capacity(runs.len());
        write_runs(&runs, &mut buffer);
        buffer
    }
}

/// Reads mask runs lazily and applies them record by record
#[derive(Debug)]
pub struct MaskCursor<B = Vec<u8>> {
    data: B,
    pos: usize,
    /// Case of the run in progress
    lower: bool,
    /// Residues left in the run in progress
    remaining: u64,
    /// Sum of all runs read so far
    covered: u64,
    /// Residues the cursor was applied to
    applied: u64,
}

impl<B: AsRef<[u8]>> MaskCursor<B> {
    #[must_use]
    pub fn new(data: B) -> Self {
        Self {
            data,
            pos: 0,
            // the first run read toggles this to upper case
            lower: true,
            remaining: 0,
            covered: 0,
            applied: 0,
        }
    }

    /// Reads the next run, `None` once the channel is exhausted
    pub fn next_run(&mut self) -> Result<Option<u64>> {
        let data = self.data.as_ref();
        if self.pos >= data.len() {
            return Ok(None);
        }
        let mut run = 0u64;
        while let Some(&byte) = data.get(self.pos) {
            self.pos += 1;
            run += u64::from(byte);
            if byte != RUN_CONTINUATION {
                self.covered += run;
                return Ok(Some(run));
            }
        }
        // a run made only of continuation bytes
        Err(ReadError::TrailingData(Channel::Mask).into())
    }

    /// Applies the next `sequence.len()` residues of the mask to `sequence`
    pub fn apply(&mut self, sequence: &mut [u8]) -> Result<()> {
        let mut i = 0;
        while i < sequence.len() {
            while self.remaining == 0 {
                let Some(run) = self.next_run()? else {
                    return Err(ReadError::MaskLengthMismatch {
                        expected: self.applied + sequence.len() as u64,
                        got: self.covered,
                    }
                    .into());
                };
                self.remaining = run;
                self.lower = !self.lower;
            }
            let n = self.remaining.min((sequence.len() - i) as u64) as usize;
            if self.lower {
                sequence[i..i + n].make_ascii_lowercase();
            }
            i += n;
            self.remaining -= n as u64;
        }
        self.applied += sequence.len() as u64;
        Ok(())
    }

    /// Checks that the runs covered exactly the residues applied so far
    pub fn finish(&mut self) -> Result<()> {
        while self.next_run()?.is_some() {}
        if self.covered != self.applied {
            return Err(ReadError::MaskLengthMismatch {
                expected: self.applied,
                got: self.covered,
            }
            .into());
        }
        Ok(())
    }
}
