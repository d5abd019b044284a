use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::buffer::Buffer;
use crate::error::{Result, SaveError};
use crate::layout::{Field, LayoutDescriptor};

/// Offsets of the map geometry inside the 1720-byte scenario piece.
pub const SCENARIO_MAP_WIDTH_OFFSET: usize = 388;
pub const SCENARIO_MAP_HEIGHT_OFFSET: usize = 392;
pub const SCENARIO_MAP_GRID_START_OFFSET: usize = 396;
pub const SCENARIO_MAP_BORDER_OFFSET: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Translation {
    None,
    X,
    Y,
    GridOffset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signedness {
    Unsigned,
    Signed,
}

/// One field inside a repeating record that changes width or meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeItem {
    pub offset: usize,
    pub old_width: usize,
    pub new_width: usize,
    pub translation: Translation,
    pub sign: Signedness,
}

impl ChangeItem {
    pub const fn widen(
        offset: usize,
        old_width: usize,
        new_width: usize,
        translation: Translation,
    ) -> Self {
        Self {
            offset,
            old_width,
            new_width,
            translation,
            sign: Signedness::Unsigned,
        }
    }
}

/// A fixed-size record array inside one piece and the changes applied to
/// every record.
#[derive(Debug, Clone, Copy)]
pub struct RecordChangeset<F: 'static> {
    pub field: F,
    pub record_size: usize,
    pub record_count: usize,
    pub initial_offset: usize,
    pub changes: &'static [ChangeItem],
}

impl<F> RecordChangeset<F> {
    pub fn new_record_size(&self) -> usize {
        let growth: isize = self
            .changes
            .iter()
            .map(|c| c.new_width as isize - c.old_width as isize)
            .sum();
        (self.record_size as isize + growth) as usize
    }
}

/// A grid-shaped piece and its cell width in bytes.
#[derive(Debug, Clone, Copy)]
pub struct GridPiece<F: 'static> {
    pub field: F,
    pub cell_width: usize,
}

/// Everything needed to bring one historical version up to date.
#[derive(Debug)]
pub struct MigrationPlan<F: 'static> {
    pub old_grid_size: usize,
    pub scenario_field: F,
    pub camera_field: F,
    pub grid_pieces: &'static [GridPiece<F>],
    pub records: &'static [RecordChangeset<F>],
}

/// Old and new map geometry captured before the new border is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub old_edge: i64,
    pub new_edge: i64,
    pub old_border: i64,
    pub new_border: i64,
}

impl GridGeometry {
    /// Zero means "unset" and is never translated.
    pub fn translate(&self, value: i64, translation: Translation) -> i64 {
        if value == 0 {
            return value;
        }
        match translation {
            Translation::None => value,
            Translation::X => value - self.old_border / 2 + self.new_border / 2,
            Translation::Y => value - self.old_border + self.new_border,
            Translation::GridOffset => {
                let x = value % self.old_edge;
                let y = value / self.old_edge;
                (y + self.new_border) * self.new_edge + (x + self.new_border)
            }
        }
    }

    /// Inverse of [`translate`](Self::translate) for values it produced.
    pub fn untranslate(&self, value: i64, translation: Translation) -> i64 {
        if value == 0 {
            return value;
        }
        match translation {
            Translation::None => value,
            Translation::X => value - self.new_border / 2 + self.old_border / 2,
            Translation::Y => value - self.new_border + self.old_border,
            Translation::GridOffset => {
                let x = value % self.new_edge - self.new_border;
                let y = value / self.new_edge - self.new_border;
                y * self.old_edge + x
            }
        }
    }
}

/// Copy an `old_edge`-square grid into the center of a zeroed
/// `new_edge`-square grid.
pub fn resize_grid(
    new_buf: &mut Buffer,
    old_buf: &mut Buffer,
    cell_width: usize,
    old_edge: usize,
    new_edge: usize,
) -> Result<()> {
    let margin = (new_edge - old_edge) / 2;
    let new_start = margin * new_edge + margin;
    let row_bytes = old_edge * cell_width;

    new_buf.clear();
    old_buf.reset();
    let mut row = vec![0u8; row_bytes];
    for y in 0..old_edge {
        old_buf.set(y * row_bytes)?;
        old_buf.read_raw(&mut row)?;
        new_buf.set((new_start + y * new_edge) * cell_width)?;
        new_buf.write_raw(&row)?;
    }
    new_buf.reset();
    old_buf.reset();
    Ok(())
}

/// Rewrite every record of a fixed-size array, widening and translating
/// the fields the changeset names and copying everything else verbatim.
pub fn apply_changeset<F: Field>(
    new_buf: &mut Buffer,
    old_buf: &mut Buffer,
    changeset: &RecordChangeset<F>,
    geometry: &GridGeometry,
) -> Result<()> {
    let piece = changeset.field.name();
    new_buf.clear();
    old_buf.reset();

    copy_span(new_buf, old_buf, changeset.initial_offset, piece)?;

    for index in 0..changeset.record_count {
        let record_start = changeset.initial_offset + index * changeset.record_size;
        old_buf.set(record_start)?;
        let mut previous = 0;
        for change in changeset.changes {
            copy_span(new_buf, old_buf, change.offset - previous, piece)?;

            let raw = old_buf.read_uint(change.old_width)?;
            let value = match change.sign {
                Signedness::Unsigned => raw as i64,
                Signedness::Signed => sign_extend(raw, change.old_width),
            };
            let translated = geometry.translate(value, change.translation);
            let bytes = (translated as u64).to_le_bytes();
            write_bounded(new_buf, &bytes[..change.new_width], piece)?;

            previous = change.offset + change.old_width;
        }
        copy_span(new_buf, old_buf, changeset.record_size - previous, piece)?;
    }

    let trailing = old_buf.remaining();
    copy_span(new_buf, old_buf, trailing, piece)?;

    new_buf.reset();
    old_buf.reset();
    Ok(())
}

/// Read the old map geometry and camera, then write the recentered
/// geometry and shifted camera into the new pieces.
pub fn migrate_map_geometry(
    new_scenario: &mut Buffer,
    old_scenario: &mut Buffer,
    new_camera: &mut Buffer,
    old_camera: &mut Buffer,
    old_edge: usize,
    new_edge: usize,
) -> Result<GridGeometry> {
    old_scenario.set(SCENARIO_MAP_WIDTH_OFFSET)?;
    let width = old_scenario.read_i32()? as i64;
    let height = old_scenario.read_i32()? as i64;
    old_scenario.set(SCENARIO_MAP_BORDER_OFFSET)?;
    let old_border = old_scenario.read_i32()? as i64;

    old_camera.reset();
    let camera_x = old_camera.read_i32()? as i64 - old_border / 2;
    let camera_y = old_camera.read_i32()? as i64 - old_border;

    let new_edge = new_edge as i64;
    let new_border = new_edge - width;
    let grid_start = (new_edge - height) / 2 * new_edge + (new_edge - width) / 2;

    new_scenario.set(SCENARIO_MAP_GRID_START_OFFSET)?;
    new_scenario.write_i32(grid_start as i32)?;
    new_scenario.set(SCENARIO_MAP_BORDER_OFFSET)?;
    new_scenario.write_i32(new_border as i32)?;

    new_camera.reset();
    new_camera.write_i32((camera_x + new_border / 2) as i32)?;
    new_camera.write_i32((camera_y + new_border) as i32)?;

    for buf in [new_scenario, old_scenario, new_camera, old_camera] {
        buf.reset();
    }

    debug!(
        "map {width}x{height}: border {old_border} -> {new_border}, grid start {grid_start}"
    );

    Ok(GridGeometry {
        old_edge: old_edge as i64,
        new_edge,
        old_border,
        new_border,
    })
}

/// Transform a fully read old-version piece set into `new`, which must be a
/// freshly built current-version layout.
pub fn migrate<F: Field>(
    new: &mut LayoutDescriptor<F>,
    old: &mut LayoutDescriptor<F>,
    plan: &MigrationPlan<F>,
) -> Result<GridGeometry> {
    info!(
        "migrating {} pieces from version {:#x} to {:#x}",
        old.len(),
        old.version(),
        new.version()
    );
    copy_verbatim(new, old)?;

    let new_edge = grid_edge_of(new, plan)?;
    let geometry = {
        let (new_scenario, new_camera) = pair(new, plan.scenario_field, plan.camera_field)?;
        let (old_scenario, old_camera) = pair(old, plan.scenario_field, plan.camera_field)?;
        migrate_map_geometry(
            new_scenario,
            old_scenario,
            new_camera,
            old_camera,
            plan.old_grid_size,
            new_edge,
        )?
    };

    let new_edge = geometry.new_edge as usize;
    for grid in plan.grid_pieces {
        let new_buf = piece_mut(new, grid.field)?;
        let old_buf = piece_mut(old, grid.field)?;
        resize_grid(new_buf, old_buf, grid.cell_width, plan.old_grid_size, new_edge)?;
    }

    for changeset in plan.records {
        let new_buf = piece_mut(new, changeset.field)?;
        let old_buf = piece_mut(old, changeset.field)?;
        apply_changeset(new_buf, old_buf, changeset, &geometry)?;
    }

    new.reset_all();
    Ok(geometry)
}

fn copy_verbatim<F: Field>(new: &mut LayoutDescriptor<F>, old: &mut LayoutDescriptor<F>) -> Result<()> {
    for old_piece in old.pieces_mut() {
        let Some(new_buf) = new.buffer_mut(old_piece.field) else {
            debug!("piece {} dropped by current layout", old_piece.field.name());
            continue;
        };
        new_buf.reset();
        old_piece.buf.reset();
        let len = old_piece.buf.size();
        copy_span(new_buf, &mut old_piece.buf, len, old_piece.field.name())?;
        new_buf.reset();
        old_piece.buf.reset();
    }
    Ok(())
}

fn grid_edge_of<F: Field>(new: &LayoutDescriptor<F>, plan: &MigrationPlan<F>) -> Result<usize> {
    let Some(first) = plan.grid_pieces.first() else {
        return Ok(plan.old_grid_size);
    };
    let size = new
        .buffer(first.field)
        .map(Buffer::size)
        .ok_or_else(|| missing(first.field))?;
    Ok((size / first.cell_width).isqrt())
}

fn copy_span(new_buf: &mut Buffer, old_buf: &mut Buffer, len: usize, piece: &'static str) -> Result<()> {
    if len == 0 {
        return Ok(());
    }
    let bytes = old_buf.read_bytes(len)?;
    write_bounded(new_buf, &bytes, piece)
}

/// Write as much as fits; anything that does not fit must be zero.
fn write_bounded(new_buf: &mut Buffer, bytes: &[u8], piece: &'static str) -> Result<()> {
    let fit = bytes.len().min(new_buf.remaining());
    let (kept, dropped) = bytes.split_at(fit);
    if dropped.iter().any(|&b| b != 0) {
        return Err(SaveError::MigrationOverflow {
            piece,
            capacity: new_buf.size(),
            dropped: dropped.len(),
        });
    }
    new_buf.write_raw(kept)
}

fn sign_extend(raw: u64, width: usize) -> i64 {
    let shift = 64 - 8 * width.clamp(1, 8) as u32;
    ((raw << shift) as i64) >> shift
}

fn piece_mut<F: Field>(layout: &mut LayoutDescriptor<F>, field: F) -> Result<&mut Buffer> {
    layout.buffer_mut(field).ok_or_else(|| missing(field))
}

fn pair<F: Field>(
    layout: &mut LayoutDescriptor<F>,
    a: F,
    b: F,
) -> Result<(&mut Buffer, &mut Buffer)> {
    layout.buffer_pair_mut(a, b).ok_or_else(|| missing(a))
}

fn missing<F: Field>(field: F) -> SaveError {
    SaveError::InvalidLayout(format!("layout has no piece {}", field.name()))
}
