use std::fmt;

use serde::{Deserialize, Serialize};

use crate::buffer::Buffer;
use crate::error::{Result, SaveError};

/// A named piece slot of one file family.
pub trait Field: Copy + Eq + Ord + fmt::Debug + Send + Sync + 'static {
    fn name(self) -> &'static str;
}

/// Declares a field enum together with its on-disk names and an `ALL` table
/// in declaration order.
macro_rules! field_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident => $label:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];
        }

        impl $crate::layout::Field for $name {
            fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }
    };
}

pub(crate) use field_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceSpec<F> {
    pub field: F,
    pub size: usize,
    pub compressed: bool,
}

impl<F> PieceSpec<F> {
    pub const fn new(field: F, size: usize, compressed: bool) -> Self {
        Self {
            field,
            size,
            compressed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece<F> {
    pub field: F,
    pub buf: Buffer,
    pub compressed: bool,
}

/// Ordered piece set for one format version. Piece order is on-disk order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutDescriptor<F> {
    version: i32,
    pieces: Vec<Piece<F>>,
}

impl<F: Field> LayoutDescriptor<F> {
    pub fn allocate(version: i32, specs: &[PieceSpec<F>]) -> Self {
        let mut layout = Self {
            version,
            pieces: Vec::new(),
        };
        layout.rebuild(version, specs);
        layout
    }

    /// Drop all current pieces and allocate fresh zeroed ones.
    pub fn rebuild(&mut self, version: i32, specs: &[PieceSpec<F>]) {
        self.pieces.clear();
        self.pieces.shrink_to_fit();
        self.version = version;
        self.pieces.extend(specs.iter().map(|spec| Piece {
            field: spec.field,
            buf: Buffer::new(spec.size),
            compressed: spec.compressed,
        }));
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn pieces(&self) -> &[Piece<F>] {
        &self.pieces
    }

    pub fn pieces_mut(&mut self) -> &mut [Piece<F>] {
        &mut self.pieces
    }

    pub fn contains(&self, field: F) -> bool {
        self.pieces.iter().any(|piece| piece.field == field)
    }

    pub fn index_of(&self, field: F) -> Option<usize> {
        self.pieces.iter().position(|piece| piece.field == field)
    }

    pub fn buffer(&self, field: F) -> Option<&Buffer> {
        self.pieces
            .iter()
            .find(|piece| piece.field == field)
            .map(|piece| &piece.buf)
    }

    pub fn buffer_mut(&mut self, field: F) -> Option<&mut Buffer> {
        self.pieces
            .iter_mut()
            .find(|piece| piece.field == field)
            .map(|piece| &mut piece.buf)
    }

    /// Mutable access to two distinct pieces at once.
    pub fn buffer_pair_mut(&mut self, a: F, b: F) -> Option<(&mut Buffer, &mut Buffer)> {
        let ia = self.index_of(a)?;
        let ib = self.index_of(b)?;
        if ia == ib {
            return None;
        }
        if ia < ib {
            let (head, tail) = self.pieces.split_at_mut(ib);
            Some((&mut head[ia].buf, &mut tail[0].buf))
        } else {
            let (head, tail) = self.pieces.split_at_mut(ia);
            Some((&mut tail[0].buf, &mut head[ib].buf))
        }
    }

    pub fn reset_all(&mut self) {
        for piece in &mut self.pieces {
            piece.buf.reset();
        }
    }

    pub fn total_size(&self) -> usize {
        self.pieces.iter().map(|piece| piece.buf.size()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Where one piece sat in a file that was read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPiece {
    pub name: String,
    pub size: usize,
    pub compressed: bool,
    pub stored_raw: bool,
    pub range: ByteRange,
}

/// Byte map of a file that was read: every piece's on-disk range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredLayout {
    pub start: usize,
    pub end: usize,
    pub pieces: Vec<StoredPiece>,
}

impl StoredLayout {
    pub fn validate(&self) -> Result<()> {
        let mut expected = self.start;
        for piece in &self.pieces {
            if piece.range.start != expected {
                return Err(SaveError::InvalidLayout(format!(
                    "gap/overlap around piece {}: expected start {}, got {}",
                    piece.name, expected, piece.range.start
                )));
            }
            if piece.range.end < piece.range.start {
                return Err(SaveError::InvalidLayout(format!(
                    "invalid range for piece {}: {}..{}",
                    piece.name, piece.range.start, piece.range.end
                )));
            }
            expected = piece.range.end;
        }

        if expected != self.end {
            return Err(SaveError::InvalidLayout(format!(
                "pieces do not cover the image: ended at {}, image ends at {}",
                expected, self.end
            )));
        }

        Ok(())
    }
}
