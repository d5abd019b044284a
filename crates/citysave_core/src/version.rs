use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, LEGACY_GRID_SIZE};
use crate::layout::{Field, LayoutDescriptor, PieceSpec};
use crate::migrate::MigrationPlan;

pub const SCENARIO_VERSION_LEGACY: i32 = 0x00;
pub const SCENARIO_VERSION: i32 = 0x01;

pub const SAVE_GAME_VERSION_LEGACY: i32 = 0x66;
pub const SAVE_GAME_VERSION_EXPANDED_162: i32 = 0x76;
pub const SAVE_GAME_VERSION: i32 = 0x77;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Family {
    Scenario,
    Savegame,
}

impl Family {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scenario => "scenario",
            Self::Savegame => "saved game",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grid edge length a format version was written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridEdge {
    Legacy,
    Configured,
}

impl GridEdge {
    pub fn resolve(self, config: &EngineConfig) -> usize {
        match self {
            Self::Legacy => LEGACY_GRID_SIZE,
            Self::Configured => config.grid_size,
        }
    }
}

/// One row of a family's version registry.
pub struct VersionEntry<F: 'static> {
    pub version: i32,
    pub label: &'static str,
    pub grid: GridEdge,
    pub pieces: fn(usize) -> Vec<PieceSpec<F>>,
    pub migration: Option<&'static MigrationPlan<F>>,
}

impl<F: Field> VersionEntry<F> {
    pub fn build_layout(&self, config: &EngineConfig) -> LayoutDescriptor<F> {
        let specs = (self.pieces)(self.grid.resolve(config));
        LayoutDescriptor::allocate(self.version, &specs)
    }
}

impl<F> fmt::Debug for VersionEntry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionEntry")
            .field("version", &self.version)
            .field("label", &self.label)
            .field("grid", &self.grid)
            .field("migrates", &self.migration.is_some())
            .finish()
    }
}
