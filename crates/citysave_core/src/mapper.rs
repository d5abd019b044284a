use std::collections::BTreeMap;

use log::{debug, trace};

use crate::buffer::Buffer;
use crate::error::{Result, SaveError};
use crate::format::FileFormat;
use crate::layout::{Field, LayoutDescriptor};

macro_rules! subsystems {
    ($($variant:ident => $label:literal,)+) => {
        /// Collaborator that owns a group of pieces during a state pass.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Subsystem {
            $($variant,)+
        }

        impl Subsystem {
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }
    };
}

subsystems! {
    ScenarioSettings => "scenario_settings",
    MapImage => "map_image",
    MapBuilding => "map_building",
    MapTerrain => "map_terrain",
    MapAqueduct => "map_aqueduct",
    MapFigure => "map_figure",
    MapSprite => "map_sprite",
    MapProperty => "map_property",
    MapRandom => "map_random",
    MapDesirability => "map_desirability",
    MapElevation => "map_elevation",
    Figures => "figures",
    FigureRoutes => "figure_routes",
    Formations => "formations",
    CityData => "city_data",
    Buildings => "buildings",
    Barracks => "barracks",
    CityView => "city_view",
    ScenarioCamera => "scenario_camera",
    GameTime => "game_time",
    Random => "random",
    BuildingCounts => "building_counts",
    EmperorChange => "emperor_change",
    Empire => "empire",
    EmpireCities => "empire_cities",
    TradePrices => "trade_prices",
    FigureNames => "figure_names",
    CultureCoverage => "culture_coverage",
    Scenario => "scenario",
    ScenarioCriteria => "scenario_criteria",
    Earthquake => "earthquake",
    Messages => "messages",
    CitySounds => "city_sounds",
    Traders => "traders",
    BuildingLists => "building_lists",
    Tutorial => "tutorial",
    BuildingStorages => "building_storages",
    GladiatorRevolt => "gladiator_revolt",
    TradeRoutes => "trade_routes",
    Routing => "routing",
    EnemyArmies => "enemy_armies",
    Invasion => "invasion",
    Bookmarks => "bookmarks",
}

/// One entry of a state pass: a subsystem and the pieces it owns.
#[derive(Debug)]
pub struct Step<F: 'static> {
    pub subsystem: Subsystem,
    pub fields: &'static [F],
}

impl<F> Step<F> {
    pub const fn new(subsystem: Subsystem, fields: &'static [F]) -> Self {
        Self { subsystem, fields }
    }
}

/// The buffers one step may touch.
pub struct FieldSet<'a, F: 'static> {
    layout: &'a mut LayoutDescriptor<F>,
    step: &'static Step<F>,
}

impl<'a, F: Field> FieldSet<'a, F> {
    pub fn subsystem(&self) -> Subsystem {
        self.step.subsystem
    }

    pub fn fields(&self) -> &'static [F] {
        self.step.fields
    }

    pub fn buffer(&mut self, field: F) -> Result<&mut Buffer> {
        if !self.step.fields.contains(&field) {
            return Err(SaveError::FieldNotInStep {
                field: field.name(),
                subsystem: self.step.subsystem.name(),
            });
        }
        let version = self.layout.version();
        self.layout.buffer_mut(field).ok_or_else(|| {
            SaveError::InvalidLayout(format!(
                "version {version:#x} has no piece {}",
                field.name()
            ))
        })
    }
}

/// The in-memory side of a state pass.
///
/// `save_state` serializes the subsystem into the buffers it is handed,
/// `load_state` restores it. Each call sees only the fields of one step.
pub trait StateHandler<F: Field> {
    fn save_state(&self, fields: &mut FieldSet<'_, F>) -> Result<()>;
    fn load_state(&mut self, fields: &mut FieldSet<'_, F>) -> Result<()>;
}

/// Fill every piece of a current-version layout from `state`.
pub fn save_to_state<T, S>(layout: &mut LayoutDescriptor<T::Field>, state: &S) -> Result<()>
where
    T: FileFormat,
    S: StateHandler<T::Field> + ?Sized,
{
    layout.reset_all();
    let version = layout.version();
    if let Some(buf) = layout.buffer_mut(T::VERSION_FIELD) {
        T::write_version(buf, version)?;
    }

    for step in T::steps() {
        trace!("save {} ({} pieces)", step.subsystem.name(), step.fields.len());
        let mut fields = FieldSet {
            layout: &mut *layout,
            step,
        };
        state.save_state(&mut fields)?;
    }

    if let Some(end) = layout.buffer_mut(T::END_MARKER) {
        end.clear();
    }
    layout.reset_all();
    Ok(())
}

/// Hand every piece of a fully read (and migrated) layout to `state`.
pub fn load_from_state<T, S>(layout: &mut LayoutDescriptor<T::Field>, state: &mut S) -> Result<()>
where
    T: FileFormat,
    S: StateHandler<T::Field> + ?Sized,
{
    layout.reset_all();
    if let Some(buf) = layout.buffer_mut(T::VERSION_FIELD) {
        let version = T::read_version(buf)?;
        debug!("{} version tag {version:#x}", T::FAMILY);
    }

    for step in T::steps() {
        trace!("load {} ({} pieces)", step.subsystem.name(), step.fields.len());
        let mut fields = FieldSet {
            layout: &mut *layout,
            step,
        };
        state.load_state(&mut fields)?;
    }

    layout.reset_all();
    Ok(())
}

/// State record that keeps every mapped piece's bytes verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawState<F: Field> {
    pieces: BTreeMap<F, Vec<u8>>,
}

impl<F: Field> Default for RawState<F> {
    fn default() -> Self {
        Self {
            pieces: BTreeMap::new(),
        }
    }
}

impl<F: Field> RawState<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: F) -> Option<&[u8]> {
        self.pieces.get(&field).map(Vec::as_slice)
    }

    pub fn insert(&mut self, field: F, bytes: Vec<u8>) -> Option<Vec<u8>> {
        self.pieces.insert(field, bytes)
    }

    pub fn iter(&self) -> impl Iterator<Item = (F, &[u8])> {
        self.pieces.iter().map(|(field, bytes)| (*field, bytes.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }
}

impl<F: Field> StateHandler<F> for RawState<F> {
    fn save_state(&self, fields: &mut FieldSet<'_, F>) -> Result<()> {
        for &field in fields.fields() {
            if let Some(bytes) = self.pieces.get(&field) {
                fields.buffer(field)?.write_raw(bytes)?;
            }
        }
        Ok(())
    }

    fn load_state(&mut self, fields: &mut FieldSet<'_, F>) -> Result<()> {
        for &field in fields.fields() {
            let bytes = fields.buffer(field)?.as_bytes().to_vec();
            self.pieces.insert(field, bytes);
        }
        Ok(())
    }
}
