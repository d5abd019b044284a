use crate::buffer::Buffer;
use crate::config::EngineConfig;
use crate::error::{Result, SaveError};
use crate::layout::{Field, LayoutDescriptor};
use crate::mapper::Step;
use crate::version::{Family, VersionEntry};

/// Static description of one file family: its fields, its version
/// registry and its state pass.
pub trait FileFormat {
    type Field: Field;

    const FAMILY: Family;
    const CURRENT_VERSION: i32;
    /// Piece holding the version tag, absent from some legacy layouts.
    const VERSION_FIELD: Self::Field;
    const END_MARKER: Self::Field;

    fn registry() -> &'static [VersionEntry<Self::Field>];

    fn steps() -> &'static [Step<Self::Field>];

    fn write_version(buf: &mut Buffer, version: i32) -> Result<()>;

    fn read_version(buf: &mut Buffer) -> Result<i32>;

    fn entry(version: i32) -> Option<&'static VersionEntry<Self::Field>> {
        Self::registry().iter().find(|entry| entry.version == version)
    }

    fn build_layout(version: i32, config: &EngineConfig) -> Result<LayoutDescriptor<Self::Field>> {
        Self::entry(version)
            .map(|entry| entry.build_layout(config))
            .ok_or(SaveError::UnsupportedVersion {
                family: Self::FAMILY,
                version,
            })
    }
}
