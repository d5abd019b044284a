use std::io::{self, Read, Write};

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use log::debug;

use crate::config::ChunkCompression;
use crate::dcl;
use crate::error::{Result, SaveError};

/// Chunk length prefix marking a piece stored without compression.
pub const UNCOMPRESSED: u32 = 0x8000_0000;

/// Encodes and decodes single pieces as `[u32 length-or-sentinel][bytes]`.
///
/// Owns the scratch buffer compressed data passes through; every operation
/// takes `&mut self`, so the buffer is never shared between two in-flight
/// loads or saves.
#[derive(Debug)]
pub struct ChunkCodec {
    scratch: Vec<u8>,
    compression: ChunkCompression,
    level: Compression,
}

impl ChunkCodec {
    pub fn new(capacity: usize, compression: ChunkCompression, level: u32) -> Self {
        Self {
            scratch: vec![0u8; capacity],
            compression,
            level: Compression::new(level),
        }
    }

    pub fn capacity(&self) -> usize {
        self.scratch.len()
    }

    pub fn compression(&self) -> ChunkCompression {
        self.compression
    }

    /// Compress into the scratch buffer. `None` means the piece must be
    /// stored raw: it is too large, it does not shrink, or it does not fit.
    pub fn compress(&mut self, bytes: &[u8]) -> Option<&[u8]> {
        if bytes.is_empty() || bytes.len() > self.scratch.len() {
            return None;
        }
        // anything not strictly smaller is stored raw
        let out = &mut self.scratch[..bytes.len() - 1];
        let written = match self.compression {
            ChunkCompression::Implode => dcl::implode(bytes, out)?,
            ChunkCompression::Zlib => {
                let mut encoder = Compress::new(self.level, true);
                match encoder.compress(bytes, out, FlushCompress::Finish) {
                    Ok(Status::StreamEnd) => encoder.total_out() as usize,
                    Ok(_) | Err(_) => return None,
                }
            }
        };
        Some(&self.scratch[..written])
    }

    /// Write one chunk and return how many bytes went to `w`.
    pub fn write_chunk<W: Write>(&mut self, w: &mut W, bytes: &[u8]) -> io::Result<usize> {
        match self.compress(bytes) {
            Some(compressed) => {
                let len = compressed.len() as u32;
                debug_assert!(len < UNCOMPRESSED);
                w.write_all(&len.to_le_bytes())?;
                w.write_all(compressed)?;
                Ok(4 + compressed.len())
            }
            None => {
                w.write_all(&UNCOMPRESSED.to_le_bytes())?;
                w.write_all(bytes)?;
                Ok(4 + bytes.len())
            }
        }
    }

    /// Read one chunk into `dst`, which must be exactly the piece's
    /// decompressed size. Returns whether the chunk was stored raw.
    pub fn read_chunk<R: Read>(
        &mut self,
        r: &mut R,
        dst: &mut [u8],
        piece: &'static str,
    ) -> Result<bool> {
        let mut prefix = [0u8; 4];
        read_exact_or_short(r, &mut prefix, piece)?;
        let input_size = u32::from_le_bytes(prefix);

        if input_size == UNCOMPRESSED {
            read_exact_or_short(r, dst, piece)?;
            return Ok(true);
        }

        let input_size = input_size as usize;
        if input_size > self.scratch.len() {
            return Err(SaveError::DecompressionFailed {
                piece,
                reason: format!(
                    "compressed length {input_size} exceeds scratch capacity {}",
                    self.scratch.len()
                ),
            });
        }
        read_exact_or_short(r, &mut self.scratch[..input_size], piece)?;
        self.decompress_scratch(input_size, dst, piece)?;
        Ok(false)
    }

    /// Decompress `compressed` into `dst`, requiring an exact length match.
    pub fn decompress(
        &mut self,
        compressed: &[u8],
        dst: &mut [u8],
        piece: &'static str,
    ) -> Result<()> {
        if compressed.len() > self.scratch.len() {
            return Err(SaveError::DecompressionFailed {
                piece,
                reason: format!(
                    "compressed length {} exceeds scratch capacity {}",
                    compressed.len(),
                    self.scratch.len()
                ),
            });
        }
        self.scratch[..compressed.len()].copy_from_slice(compressed);
        self.decompress_scratch(compressed.len(), dst, piece)
    }

    /// Pick the decoder from the first byte: DCL streams open with literal
    /// mode 0, zlib streams with a deflate CMF byte.
    fn decompress_scratch(
        &mut self,
        input_size: usize,
        dst: &mut [u8],
        piece: &'static str,
    ) -> Result<()> {
        let input = &self.scratch[..input_size];
        match input.first() {
            Some(0) => explode(input, dst, piece),
            Some(cmf) if cmf & 0x0F == 8 => inflate(input, dst, piece),
            first => Err(SaveError::DecompressionFailed {
                piece,
                reason: match first {
                    Some(b) => format!("unrecognized stream header {b:#04x}"),
                    None => "empty compressed stream".to_owned(),
                },
            }),
        }
    }
}

fn explode(input: &[u8], dst: &mut [u8], piece: &'static str) -> Result<()> {
    let produced = dcl::explode(input, dst).map_err(|e| SaveError::DecompressionFailed {
        piece,
        reason: e.to_string(),
    })?;
    if produced != dst.len() {
        return Err(SaveError::DecompressionFailed {
            piece,
            reason: format!("decompressed {produced} bytes, expected {}", dst.len()),
        });
    }
    debug!("piece {piece}: exploded {} -> {produced} bytes", input.len());
    Ok(())
}

fn inflate(input: &[u8], dst: &mut [u8], piece: &'static str) -> Result<()> {
    let mut decoder = Decompress::new(true);
    let status = decoder
        .decompress(input, dst, FlushDecompress::Finish)
        .map_err(|e| SaveError::DecompressionFailed {
            piece,
            reason: e.to_string(),
        })?;
    let produced = decoder.total_out() as usize;

    match status {
        Status::StreamEnd if produced == dst.len() => {
            debug!("piece {piece}: inflated {} -> {produced} bytes", input.len());
            Ok(())
        }
        Status::StreamEnd => Err(SaveError::DecompressionFailed {
            piece,
            reason: format!("decompressed {produced} bytes, expected {}", dst.len()),
        }),
        Status::Ok | Status::BufError => Err(SaveError::DecompressionFailed {
            piece,
            reason: if produced == dst.len() {
                format!("decompressed data exceeds expected {} bytes", dst.len())
            } else {
                format!(
                    "truncated stream: decompressed {produced} bytes, expected {}",
                    dst.len()
                )
            },
        }),
    }
}

/// Read until `dst` is full or the stream ends; returns the count read.
pub(crate) fn read_up_to<R: Read>(r: &mut R, dst: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < dst.len() {
        match r.read(&mut dst[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

pub(crate) fn read_exact_or_short<R: Read>(
    r: &mut R,
    dst: &mut [u8],
    piece: &'static str,
) -> Result<()> {
    let expected = dst.len();
    let actual = read_up_to(r, dst).map_err(|source| {
        if source.kind() == io::ErrorKind::UnexpectedEof {
            SaveError::ShortRead {
                piece,
                expected,
                actual: 0,
            }
        } else {
            SaveError::ReadFailed { piece, source }
        }
    })?;
    if actual != expected {
        return Err(SaveError::ShortRead {
            piece,
            expected,
            actual,
        });
    }
    Ok(())
}
