//! Persistence and version migration for city-builder scenario and saved
//! game files.
//!
//! A file is a fixed sequence of named pieces. [`SaveEngine`] detects the
//! on-disk version, reads every piece (inflating compressed chunks), brings
//! historical layouts up to the current one and hands each subsystem its
//! pieces through [`StateHandler`].

pub mod buffer;
pub mod codec;
pub mod config;
pub mod dcl;
pub mod engine;
pub mod error;
pub mod format;
pub mod layout;
pub mod mapper;
pub mod migrate;
pub mod savegame;
pub mod scenario;
pub mod version;

pub use buffer::Buffer;
pub use config::{ChunkCompression, EngineConfig};
pub use engine::{FileSummary, LoadReport, SaveEngine};
pub use error::{ErrorCode, Result, SaveError};
pub use format::FileFormat;
pub use layout::{Field, LayoutDescriptor};
pub use mapper::{FieldSet, RawState, StateHandler, Subsystem};
pub use migrate::GridGeometry;
pub use savegame::{Savegame, SavegameField};
pub use scenario::{Scenario, ScenarioField};
pub use version::Family;

pub type SavegameState = RawState<SavegameField>;
pub type ScenarioState = RawState<ScenarioField>;
