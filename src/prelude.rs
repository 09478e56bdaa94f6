pub use crate::block::{Compressor, Zstd};
pub use crate::decoder::{Decoder, DecoderBuilder};
pub use crate::encoder::{Encoder, EncoderBuilder};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::header::{Flag, Flags, SequenceType};
pub use crate::record::{Channel, Record};
