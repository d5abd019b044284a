//! PKWare DCL "implode" streams in binary literal mode.
//!
//! A stream starts with two header bytes, the literal mode (always 0 here)
//! and the dictionary size code (4, 5 or 6 for 1, 2 or 4 KiB), followed by
//! an LSB-first bitstream of tokens. A `0` bit introduces an 8-bit literal,
//! a `1` bit a copy: a prefix-coded length, then a prefix-coded distance.
//! The length code 519 ends the stream.

/// Dictionary size code written by [`implode`]: a 4 KiB window.
pub const DICTIONARY_BITS: u8 = 6;

const LITERAL_MODE_BINARY: u8 = 0;
const WINDOW_SIZE: usize = 1 << (6 + DICTIONARY_BITS);
const MIN_MATCH: usize = 3;
const MAX_MATCH: usize = 516;
const END_OF_STREAM: usize = 517;

const HASH_BITS: u32 = 13;
const MAX_CHAIN: usize = 64;
const NIL: usize = usize::MAX;

const LEN_BASE_BITS: [u8; 16] = [3, 2, 3, 3, 4, 4, 4, 5, 5, 5, 5, 6, 6, 6, 7, 7];
const LEN_BASE_CODE: [u8; 16] = [
    0x05, 0x03, 0x01, 0x06, 0x0A, 0x02, 0x0C, 0x14, 0x04, 0x18, 0x08, 0x30, 0x10, 0x20, 0x40, 0x00,
];
const LEN_BASE_VALUE: [u16; 16] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 0x0A, 0x0E, 0x16, 0x26, 0x46, 0x86, 0x106,
];
const LEN_EXTRA_BITS: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8];

const OFFSET_BITS: [u8; 64] = [
    2, 4, 4, 5, 5, 5, 5, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
];
const OFFSET_CODE: [u8; 64] = [
    0x03, 0x0D, 0x05, 0x19, 0x09, 0x11, 0x01, 0x3E, 0x1E, 0x2E, 0x0E, 0x36, 0x16, 0x26, 0x06, 0x3A,
    0x1A, 0x2A, 0x0A, 0x32, 0x12, 0x22, 0x42, 0x02, 0x7C, 0x3C, 0x5C, 0x1C, 0x6C, 0x2C, 0x4C, 0x0C,
    0x74, 0x34, 0x54, 0x14, 0x64, 0x24, 0x44, 0x04, 0x78, 0x38, 0x58, 0x18, 0x68, 0x28, 0x48, 0x08,
    0xF0, 0x70, 0xB0, 0x30, 0xD0, 0x50, 0x90, 0x10, 0xE0, 0x60, 0xA0, 0x20, 0xC0, 0x40, 0x80, 0x00,
];

const LENGTH_JUMP: [u8; 256] = jump_table(&LEN_BASE_CODE, &LEN_BASE_BITS);
const OFFSET_JUMP: [u8; 256] = jump_table(&OFFSET_CODE, &OFFSET_BITS);

/// Map every 8-bit lookahead to the prefix code it starts with.
const fn jump_table<const N: usize>(codes: &[u8; N], bits: &[u8; N]) -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = N;
    while i > 0 {
        i -= 1;
        let mut code = codes[i] as usize;
        while code < 256 {
            table[code] = i as u8;
            code += 1 << bits[i];
        }
    }
    table
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExplodeError {
    #[error("stream is shorter than its two-byte header")]
    MissingHeader,
    #[error("literal mode {0} is not supported")]
    LiteralMode(u8),
    #[error("dictionary size code {0} is outside 4..=6")]
    DictionaryBits(u8),
    #[error("stream ends before its end-of-stream code")]
    Truncated,
    #[error("copy distance {distance} reaches before the start of {produced} bytes")]
    Distance { distance: usize, produced: usize },
    #[error("decompressed data exceeds expected {0} bytes")]
    Overflow(usize),
}

struct BitReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Up to 8 upcoming bits, zero-filled past the end of the input.
    fn peek(&self, count: u32) -> u32 {
        let first = self.pos / 8;
        let mut window = 0u32;
        for k in 0..3 {
            let byte = self.bytes.get(first + k).copied().unwrap_or(0);
            window |= u32::from(byte) << (8 * k);
        }
        (window >> (self.pos % 8)) & ((1 << count) - 1)
    }

    fn read(&mut self, count: u8) -> Result<u32, ExplodeError> {
        let count = u32::from(count);
        if self.pos + count as usize > self.bytes.len() * 8 {
            return Err(ExplodeError::Truncated);
        }
        let value = self.peek(count);
        self.pos += count as usize;
        Ok(value)
    }
}

/// Decode `input` into `output` and return the number of bytes produced.
pub fn explode(input: &[u8], output: &mut [u8]) -> Result<usize, ExplodeError> {
    let &[mode, dict_bits, ref stream @ ..] = input else {
        return Err(ExplodeError::MissingHeader);
    };
    if mode != LITERAL_MODE_BINARY {
        return Err(ExplodeError::LiteralMode(mode));
    }
    if !(4..=6).contains(&dict_bits) {
        return Err(ExplodeError::DictionaryBits(dict_bits));
    }

    let mut bits = BitReader::new(stream);
    let mut produced = 0;
    loop {
        if bits.read(1)? == 0 {
            let literal = bits.read(8)? as u8;
            let slot = output
                .get_mut(produced)
                .ok_or(ExplodeError::Overflow(produced))?;
            *slot = literal;
            produced += 1;
            continue;
        }

        let idx = usize::from(LENGTH_JUMP[bits.peek(8) as usize]);
        bits.read(LEN_BASE_BITS[idx])?;
        let value = usize::from(LEN_BASE_VALUE[idx]) + bits.read(LEN_EXTRA_BITS[idx])? as usize;
        if value == END_OF_STREAM {
            return Ok(produced);
        }
        let length = value + 2;

        let idx = usize::from(OFFSET_JUMP[bits.peek(8) as usize]);
        bits.read(OFFSET_BITS[idx])?;
        let low_bits = if length == 2 { 2 } else { dict_bits };
        let distance = ((idx << low_bits) | bits.read(low_bits)? as usize) + 1;
        if distance > produced {
            return Err(ExplodeError::Distance { distance, produced });
        }
        if produced + length > output.len() {
            return Err(ExplodeError::Overflow(output.len()));
        }
        // copies may overlap their own output
        for i in produced..produced + length {
            output[i] = output[i - distance];
        }
        produced += length;
    }
}

struct BitWriter<'a> {
    out: &'a mut [u8],
    len: usize,
    acc: u32,
    nbits: u32,
}

impl<'a> BitWriter<'a> {
    fn new(out: &'a mut [u8]) -> Self {
        Self {
            out,
            len: 0,
            acc: 0,
            nbits: 0,
        }
    }

    fn push(&mut self, byte: u8) -> Option<()> {
        *self.out.get_mut(self.len)? = byte;
        self.len += 1;
        Some(())
    }

    fn put(&mut self, value: u32, count: u8) -> Option<()> {
        self.acc |= value << self.nbits;
        self.nbits += u32::from(count);
        while self.nbits >= 8 {
            self.push(self.acc as u8)?;
            self.acc >>= 8;
            self.nbits -= 8;
        }
        Some(())
    }

    fn put_length(&mut self, value: usize) -> Option<()> {
        let idx = LEN_BASE_VALUE
            .iter()
            .rposition(|&base| usize::from(base) <= value)
            .unwrap_or(0);
        self.put(1, 1)?;
        self.put(u32::from(LEN_BASE_CODE[idx]), LEN_BASE_BITS[idx])?;
        let extra = value - usize::from(LEN_BASE_VALUE[idx]);
        self.put(extra as u32, LEN_EXTRA_BITS[idx])
    }

    fn put_copy(&mut self, length: usize, distance: usize) -> Option<()> {
        self.put_length(length - 2)?;
        let offset = distance - 1;
        let low_bits = if length == 2 { 2 } else { DICTIONARY_BITS };
        let idx = offset >> low_bits;
        self.put(u32::from(OFFSET_CODE[idx]), OFFSET_BITS[idx])?;
        self.put((offset & ((1 << low_bits) - 1)) as u32, low_bits)
    }

    fn finish(mut self) -> Option<usize> {
        if self.nbits > 0 {
            self.push(self.acc as u8)?;
        }
        Some(self.len)
    }
}

/// Hash chains over 3-byte prefixes inside the sliding window.
struct Matcher {
    head: Vec<usize>,
    prev: Vec<usize>,
}

impl Matcher {
    fn new() -> Self {
        Self {
            head: vec![NIL; 1 << HASH_BITS],
            prev: vec![NIL; WINDOW_SIZE],
        }
    }

    fn hash(bytes: &[u8]) -> usize {
        let key = u32::from(bytes[0]) << 16 | u32::from(bytes[1]) << 8 | u32::from(bytes[2]);
        (key.wrapping_mul(0x9E37_79B1) >> (32 - HASH_BITS)) as usize
    }

    fn insert(&mut self, input: &[u8], pos: usize) {
        if pos + MIN_MATCH > input.len() {
            return;
        }
        let h = Self::hash(&input[pos..]);
        self.prev[pos % WINDOW_SIZE] = self.head[h];
        self.head[h] = pos;
    }

    /// Longest earlier match for `pos` as `(length, distance)`.
    fn longest(&self, input: &[u8], pos: usize) -> (usize, usize) {
        let max = MAX_MATCH.min(input.len() - pos);
        if max < MIN_MATCH {
            return (0, 0);
        }
        let mut best = (0, 0);
        let mut candidate = self.head[Self::hash(&input[pos..])];
        for _ in 0..MAX_CHAIN {
            if candidate == NIL || candidate >= pos || pos - candidate > WINDOW_SIZE {
                break;
            }
            let length = input[candidate..]
                .iter()
                .zip(&input[pos..pos + max])
                .take_while(|(a, b)| a == b)
                .count();
            if length > best.0 {
                best = (length, pos - candidate);
                if length == max {
                    break;
                }
            }
            let next = self.prev[candidate % WINDOW_SIZE];
            if next >= candidate {
                break;
            }
            candidate = next;
        }
        best
    }
}

/// Encode `input` into `output` with a 4 KiB dictionary.
///
/// Returns the encoded length, or `None` when the stream does not fit.
pub fn implode(input: &[u8], output: &mut [u8]) -> Option<usize> {
    let mut w = BitWriter::new(output);
    w.push(LITERAL_MODE_BINARY)?;
    w.push(DICTIONARY_BITS)?;

    let mut matcher = Matcher::new();
    let mut pos = 0;
    while pos < input.len() {
        let (length, distance) = matcher.longest(input, pos);
        if length >= MIN_MATCH {
            w.put_copy(length, distance)?;
            for p in pos..pos + length {
                matcher.insert(input, p);
            }
            pos += length;
        } else {
            w.put(u32::from(input[pos]) << 1, 9)?;
            matcher.insert(input, pos);
            pos += 1;
        }
    }

    w.put_length(END_OF_STREAM)?;
    w.finish()
}
