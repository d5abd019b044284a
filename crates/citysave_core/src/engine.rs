use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::codec::{ChunkCodec, read_exact_or_short};
use crate::config::EngineConfig;
use crate::error::{Result, SaveError};
use crate::format::FileFormat;
use crate::layout::{ByteRange, Field, LayoutDescriptor, StoredLayout, StoredPiece};
use crate::mapper::{StateHandler, load_from_state, save_to_state};
use crate::migrate::{GridGeometry, migrate};
use crate::savegame::{SAVEGAME_VERSION_OFFSET, Savegame, SavegameField};
use crate::scenario::{Scenario, ScenarioField, has_version_tag};
use crate::version::{Family, SCENARIO_VERSION_LEGACY, VersionEntry};

/// What a successful load did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub family: Family,
    /// Version found on disk.
    pub version: i32,
    pub migrated: bool,
    pub geometry: Option<GridGeometry>,
}

/// Structure of a file on disk, read without applying any state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub family: Family,
    pub version: i32,
    pub label: String,
    pub current_version: i32,
    pub needs_migration: bool,
    pub grid_size: usize,
    pub decompressed_size: usize,
    pub layout: StoredLayout,
}

/// Loads, migrates and saves scenario and saved game files.
///
/// The engine owns the compression scratch buffer, so every operation
/// borrows it mutably and at most one load or save runs at a time.
#[derive(Debug)]
pub struct SaveEngine {
    config: EngineConfig,
    codec: ChunkCodec,
}

impl SaveEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let codec = ChunkCodec::new(
            config.compress_buffer_size,
            config.compression,
            config.compression_level,
        );
        Ok(Self { config, codec })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn load_scenario<S>(&mut self, path: &Path, state: &mut S) -> Result<LoadReport>
    where
        S: StateHandler<ScenarioField> + ?Sized,
    {
        info!("loading scenario {}", path.display());
        let mut reader = open(path)?;
        self.load_scenario_from(&mut reader, has_version_tag(path), state)
    }

    /// Load a scenario image starting at the reader's current position.
    /// `tagged` says whether the image starts with a version piece.
    pub fn load_scenario_from<R, S>(
        &mut self,
        reader: &mut R,
        tagged: bool,
        state: &mut S,
    ) -> Result<LoadReport>
    where
        R: Read + Seek,
        S: StateHandler<ScenarioField> + ?Sized,
    {
        let version = detect_scenario_version(reader, tagged)?;
        self.load::<Scenario, _, _>(reader, version, state)
    }

    pub fn save_scenario<S>(&mut self, path: &Path, state: &S) -> Result<()>
    where
        S: StateHandler<ScenarioField> + ?Sized,
    {
        info!("saving scenario {}", path.display());
        self.save_file::<Scenario, _>(path, state)
    }

    pub fn save_scenario_to<W, S>(&mut self, writer: &mut W, state: &S) -> Result<usize>
    where
        W: Write,
        S: StateHandler<ScenarioField> + ?Sized,
    {
        self.save::<Scenario, _, _>(writer, state, "scenario stream")
    }

    pub fn load_savegame<S>(&mut self, path: &Path, state: &mut S) -> Result<LoadReport>
    where
        S: StateHandler<SavegameField> + ?Sized,
    {
        self.load_savegame_at(path, 0, state)
    }

    /// Load a save image embedded at `offset` inside a larger file.
    pub fn load_savegame_at<S>(
        &mut self,
        path: &Path,
        offset: u64,
        state: &mut S,
    ) -> Result<LoadReport>
    where
        S: StateHandler<SavegameField> + ?Sized,
    {
        info!("opening saved game {} at offset {offset}", path.display());
        let mut reader = open(path)?;
        self.load_savegame_from(&mut reader, offset, state)
    }

    pub fn load_savegame_from<R, S>(
        &mut self,
        reader: &mut R,
        offset: u64,
        state: &mut S,
    ) -> Result<LoadReport>
    where
        R: Read + Seek,
        S: StateHandler<SavegameField> + ?Sized,
    {
        let version = detect_savegame_version(reader, offset)?;
        self.load::<Savegame, _, _>(reader, version, state)
    }

    pub fn save_savegame<S>(&mut self, path: &Path, state: &S) -> Result<()>
    where
        S: StateHandler<SavegameField> + ?Sized,
    {
        info!("saving game {}", path.display());
        self.save_file::<Savegame, _>(path, state)
    }

    pub fn save_savegame_to<W, S>(&mut self, writer: &mut W, state: &S) -> Result<usize>
    where
        W: Write,
        S: StateHandler<SavegameField> + ?Sized,
    {
        self.save::<Savegame, _, _>(writer, state, "savegame stream")
    }

    pub fn delete_savegame(&self, path: &Path) -> Result<()> {
        info!("deleting game {}", path.display());
        fs::remove_file(path).map_err(|source| {
            error!("unable to delete game {}: {source}", path.display());
            SaveError::DeleteFailed {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    pub fn inspect_scenario(&mut self, path: &Path) -> Result<FileSummary> {
        let mut reader = open(path)?;
        self.inspect_scenario_from(&mut reader, has_version_tag(path))
    }

    pub fn inspect_scenario_from<R: Read + Seek>(
        &mut self,
        reader: &mut R,
        tagged: bool,
    ) -> Result<FileSummary> {
        let start = position(reader)?;
        let version = detect_scenario_version(reader, tagged)?;
        self.inspect::<Scenario, _>(reader, start, version)
    }

    pub fn inspect_savegame(&mut self, path: &Path, offset: u64) -> Result<FileSummary> {
        let mut reader = open(path)?;
        self.inspect_savegame_from(&mut reader, offset)
    }

    pub fn inspect_savegame_from<R: Read + Seek>(
        &mut self,
        reader: &mut R,
        offset: u64,
    ) -> Result<FileSummary> {
        let version = detect_savegame_version(reader, offset)?;
        self.inspect::<Savegame, _>(reader, offset, version)
    }

    fn load<T, R, S>(&mut self, reader: &mut R, version: i32, state: &mut S) -> Result<LoadReport>
    where
        T: FileFormat,
        R: Read,
        S: StateHandler<T::Field> + ?Sized,
    {
        let entry = select::<T>(version)?;
        info!("{} version {version:#x} ({})", T::FAMILY, entry.label);

        let mut layout = entry.build_layout(&self.config);
        self.read_pieces(reader, &mut layout, None)?;

        let geometry = match entry.migration {
            None => None,
            Some(plan) => {
                let mut current = T::build_layout(T::CURRENT_VERSION, &self.config)?;
                let geometry = migrate(&mut current, &mut layout, plan).inspect_err(|e| {
                    error!("failed to migrate {} version {version:#x}: {e}", T::FAMILY);
                })?;
                if let Some(buf) = current.buffer_mut(T::VERSION_FIELD) {
                    T::write_version(buf, T::CURRENT_VERSION)?;
                }
                layout = current;
                Some(geometry)
            }
        };

        load_from_state::<T, S>(&mut layout, state)?;
        Ok(LoadReport {
            family: T::FAMILY,
            version,
            migrated: geometry.is_some(),
            geometry,
        })
    }

    fn save<T, W, S>(&mut self, writer: &mut W, state: &S, target: &str) -> Result<usize>
    where
        T: FileFormat,
        W: Write,
        S: StateHandler<T::Field> + ?Sized,
    {
        let mut layout = T::build_layout(T::CURRENT_VERSION, &self.config)?;
        save_to_state::<T, S>(&mut layout, state)?;
        let written = self.write_pieces(writer, &layout, target)?;
        writer.flush().map_err(|e| SaveError::write(target, e))?;
        debug!("wrote {written} bytes to {target}");
        Ok(written)
    }

    fn save_file<T, S>(&mut self, path: &Path, state: &S) -> Result<()>
    where
        T: FileFormat,
        S: StateHandler<T::Field> + ?Sized,
    {
        let target = path.display().to_string();
        let mut layout = T::build_layout(T::CURRENT_VERSION, &self.config)?;
        save_to_state::<T, S>(&mut layout, state)?;

        let file = File::create(path).map_err(|e| {
            error!("unable to save {target}: {e}");
            SaveError::write(target.as_str(), e)
        })?;
        let mut writer = BufWriter::new(file);
        self.write_pieces(&mut writer, &layout, &target)?;
        writer.flush().map_err(|e| SaveError::write(target.as_str(), e))
    }

    fn inspect<T, R>(&mut self, reader: &mut R, start: u64, version: i32) -> Result<FileSummary>
    where
        T: FileFormat,
        R: Read,
    {
        let entry = T::entry(version).ok_or(SaveError::UnsupportedVersion {
            family: T::FAMILY,
            version,
        })?;
        let mut layout = entry.build_layout(&self.config);
        let mut capture = Capture::new(start as usize);
        self.read_pieces(reader, &mut layout, Some(&mut capture))?;

        let stored = capture.finish();
        stored.validate()?;
        Ok(FileSummary {
            family: T::FAMILY,
            version,
            label: entry.label.to_string(),
            current_version: T::CURRENT_VERSION,
            needs_migration: version != T::CURRENT_VERSION,
            grid_size: entry.grid.resolve(&self.config),
            decompressed_size: layout.total_size(),
            layout: stored,
        })
    }

    fn read_pieces<F: Field, R: Read>(
        &mut self,
        reader: &mut R,
        layout: &mut LayoutDescriptor<F>,
        mut capture: Option<&mut Capture>,
    ) -> Result<()> {
        let mut r = CountingReader::new(reader);
        let last = layout.len().saturating_sub(1);

        for (index, piece) in layout.pieces_mut().iter_mut().enumerate() {
            let name = piece.field.name();
            let start = r.count;
            let result = if piece.compressed {
                self.codec.read_chunk(&mut r, piece.buf.as_bytes_mut(), name)
            } else {
                read_exact_or_short(&mut r, piece.buf.as_bytes_mut(), name).map(|()| true)
            };

            let stored_raw = match result {
                Ok(stored_raw) => stored_raw,
                Err(e @ SaveError::ShortRead { .. }) if index == last => {
                    warn!("final piece {name} is short, keeping what was read: {e}");
                    true
                }
                Err(e) => {
                    error!("unable to read piece {index} ({name}): {e}");
                    return Err(e);
                }
            };

            if let Some(c) = capture.as_deref_mut() {
                c.record(name, piece.buf.size(), piece.compressed, stored_raw, start, r.count);
            }
        }
        Ok(())
    }

    fn write_pieces<F: Field, W: Write>(
        &mut self,
        writer: &mut W,
        layout: &LayoutDescriptor<F>,
        target: &str,
    ) -> Result<usize> {
        let mut written = 0;
        for piece in layout.pieces() {
            let bytes = piece.buf.as_bytes();
            let n = if piece.compressed {
                self.codec.write_chunk(writer, bytes)
            } else {
                writer.write_all(bytes).map(|()| bytes.len())
            };
            written += n.map_err(|e| {
                error!("unable to write piece {} to {target}: {e}", piece.field.name());
                SaveError::write(target, e)
            })?;
        }
        Ok(written)
    }
}

fn select<T: FileFormat>(version: i32) -> Result<&'static VersionEntry<T::Field>> {
    let Some(entry) = T::entry(version) else {
        error!("unsupported {} version {version:#x}", T::FAMILY);
        return Err(SaveError::UnsupportedVersion {
            family: T::FAMILY,
            version,
        });
    };
    if entry.version != T::CURRENT_VERSION && entry.migration.is_none() {
        return Err(SaveError::MigrationUnsupported {
            family: T::FAMILY,
            version,
        });
    }
    Ok(entry)
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path).map(BufReader::new).map_err(|source| {
        error!("unable to open {}: {source}", path.display());
        SaveError::FileOpenFailed {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn position<R: Seek>(reader: &mut R) -> Result<u64> {
    reader.stream_position().map_err(|e| seek_error("file_version", e))
}

fn seek<R: Seek>(reader: &mut R, to: u64) -> Result<()> {
    reader
        .seek(SeekFrom::Start(to))
        .map(|_| ())
        .map_err(|e| seek_error("file_version", e))
}

fn seek_error(piece: &'static str, source: io::Error) -> SaveError {
    debug!("seek failed while reading {piece}: {source}");
    SaveError::ReadFailed { piece, source }
}

/// Peek the u16 tag of an `.mpx` image and rewind to where it starts.
fn detect_scenario_version<R: Read + Seek>(reader: &mut R, tagged: bool) -> Result<i32> {
    if !tagged {
        return Ok(SCENARIO_VERSION_LEGACY);
    }
    let start = position(reader)?;
    let mut tag = [0u8; 2];
    read_exact_or_short(reader, &mut tag, "file_version")?;
    seek(reader, start)?;
    Ok(u16::from_le_bytes(tag) as i32)
}

/// Read the i32 tag at `offset + 4` and rewind to `offset`.
fn detect_savegame_version<R: Read + Seek>(reader: &mut R, offset: u64) -> Result<i32> {
    seek(reader, offset + SAVEGAME_VERSION_OFFSET)?;
    let mut tag = [0u8; 4];
    read_exact_or_short(reader, &mut tag, "file_version")?;
    seek(reader, offset)?;
    let version = i32::from_le_bytes(tag);
    debug!("found saved game version {version:#x}");
    Ok(version)
}

struct CountingReader<'a, R> {
    inner: &'a mut R,
    count: usize,
}

impl<'a, R: Read> CountingReader<'a, R> {
    fn new(inner: &'a mut R) -> Self {
        Self { inner, count: 0 }
    }
}

impl<R: Read> Read for CountingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n;
        Ok(n)
    }
}

struct Capture {
    start: usize,
    pieces: Vec<StoredPiece>,
}

impl Capture {
    fn new(start: usize) -> Self {
        Self {
            start,
            pieces: Vec::new(),
        }
    }

    fn record(
        &mut self,
        name: &str,
        size: usize,
        compressed: bool,
        stored_raw: bool,
        start: usize,
        end: usize,
    ) {
        self.pieces.push(StoredPiece {
            name: name.to_string(),
            size,
            compressed,
            stored_raw,
            range: ByteRange {
                start: self.start + start,
                end: self.start + end,
            },
        });
    }

    fn finish(self) -> StoredLayout {
        let end = self.pieces.last().map_or(self.start, |p| p.range.end);
        StoredLayout {
            start: self.start,
            end,
            pieces: self.pieces,
        }
    }
}
