//! Scenario files (`.map` legacy, `.mpx` current).

use std::path::Path;

use crate::buffer::Buffer;
use crate::config::LEGACY_GRID_SIZE;
use crate::error::Result;
use crate::format::FileFormat;
use crate::layout::{PieceSpec, field_enum};
use crate::mapper::{Step, Subsystem};
use crate::migrate::{GridPiece, MigrationPlan};
use crate::version::{Family, GridEdge, SCENARIO_VERSION, SCENARIO_VERSION_LEGACY, VersionEntry};

pub const SCENARIO_END_MARKER_SIZE: usize = 4;

field_enum! {
    pub enum ScenarioField {
        FileVersion => "file_version",
        GraphicIds => "graphic_ids",
        Edge => "edge",
        Terrain => "terrain",
        Bitfields => "bitfields",
        Random => "random",
        Elevation => "elevation",
        RandomIv => "random_iv",
        Camera => "camera",
        Scenario => "scenario",
        EndMarker => "end_marker",
    }
}

use ScenarioField as S;

fn map_pieces(grid: usize) -> [PieceSpec<ScenarioField>; 10] {
    let cells = grid * grid;
    [
        PieceSpec::new(S::GraphicIds, cells * 2, false),
        PieceSpec::new(S::Edge, cells, false),
        PieceSpec::new(S::Terrain, cells * 2, false),
        PieceSpec::new(S::Bitfields, cells, false),
        PieceSpec::new(S::Random, cells, false),
        PieceSpec::new(S::Elevation, cells, false),
        PieceSpec::new(S::RandomIv, 8, false),
        PieceSpec::new(S::Camera, 8, false),
        PieceSpec::new(S::Scenario, 1720, false),
        PieceSpec::new(S::EndMarker, SCENARIO_END_MARKER_SIZE, false),
    ]
}

fn legacy_pieces(grid: usize) -> Vec<PieceSpec<ScenarioField>> {
    map_pieces(grid).to_vec()
}

fn current_pieces(grid: usize) -> Vec<PieceSpec<ScenarioField>> {
    let mut pieces = vec![PieceSpec::new(S::FileVersion, 4, false)];
    pieces.extend(map_pieces(grid));
    pieces
}

static LEGACY_MIGRATION: MigrationPlan<ScenarioField> = MigrationPlan {
    old_grid_size: LEGACY_GRID_SIZE,
    scenario_field: S::Scenario,
    camera_field: S::Camera,
    grid_pieces: &[
        GridPiece { field: S::GraphicIds, cell_width: 2 },
        GridPiece { field: S::Edge, cell_width: 1 },
        GridPiece { field: S::Terrain, cell_width: 2 },
        GridPiece { field: S::Bitfields, cell_width: 1 },
        GridPiece { field: S::Random, cell_width: 1 },
        GridPiece { field: S::Elevation, cell_width: 1 },
    ],
    records: &[],
};

static REGISTRY: [VersionEntry<ScenarioField>; 2] = [
    VersionEntry {
        version: SCENARIO_VERSION_LEGACY,
        label: "legacy map",
        grid: GridEdge::Legacy,
        pieces: legacy_pieces,
        migration: Some(&LEGACY_MIGRATION),
    },
    VersionEntry {
        version: SCENARIO_VERSION,
        label: "current",
        grid: GridEdge::Configured,
        pieces: current_pieces,
        migration: None,
    },
];

static STEPS: [Step<ScenarioField>; 8] = [
    Step::new(Subsystem::MapImage, &[S::GraphicIds]),
    Step::new(Subsystem::MapTerrain, &[S::Terrain]),
    Step::new(Subsystem::MapProperty, &[S::Bitfields, S::Edge]),
    Step::new(Subsystem::MapRandom, &[S::Random]),
    Step::new(Subsystem::MapElevation, &[S::Elevation]),
    Step::new(Subsystem::ScenarioCamera, &[S::Camera]),
    Step::new(Subsystem::Random, &[S::RandomIv]),
    Step::new(Subsystem::Scenario, &[S::Scenario]),
];

/// Scenario file family marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scenario;

impl FileFormat for Scenario {
    type Field = ScenarioField;

    const FAMILY: Family = Family::Scenario;
    const CURRENT_VERSION: i32 = SCENARIO_VERSION;
    const VERSION_FIELD: ScenarioField = S::FileVersion;
    const END_MARKER: ScenarioField = S::EndMarker;

    fn registry() -> &'static [VersionEntry<ScenarioField>] {
        &REGISTRY
    }

    fn steps() -> &'static [Step<ScenarioField>] {
        &STEPS
    }

    fn write_version(buf: &mut Buffer, version: i32) -> Result<()> {
        buf.reset();
        buf.write_u16(version as u16)?;
        buf.write_u16(0)
    }

    fn read_version(buf: &mut Buffer) -> Result<i32> {
        let version = buf.read_u16()?;
        buf.skip(2)?;
        Ok(version as i32)
    }
}

/// Only `.mpx` files carry a version tag; anything else is a legacy map.
pub fn has_version_tag(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mpx"))
}
