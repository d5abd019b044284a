//! Saved game files.

use crate::buffer::Buffer;
use crate::config::LEGACY_GRID_SIZE;
use crate::error::Result;
use crate::format::FileFormat;
use crate::layout::{PieceSpec, field_enum};
use crate::mapper::{Step, Subsystem};
use crate::migrate::{ChangeItem, GridPiece, MigrationPlan, RecordChangeset, Translation};
use crate::version::{
    Family, GridEdge, SAVE_GAME_VERSION, SAVE_GAME_VERSION_EXPANDED_162, SAVE_GAME_VERSION_LEGACY,
    VersionEntry,
};

/// Byte offset of the version tag from the start of a save image.
pub const SAVEGAME_VERSION_OFFSET: u64 = 4;
pub const SAVEGAME_END_MARKER_SIZE: usize = 284;

field_enum! {
    pub enum SavegameField {
        ScenarioCampaignMission => "scenario_campaign_mission",
        FileVersion => "file_version",
        ImageGrid => "image_grid",
        EdgeGrid => "edge_grid",
        BuildingGrid => "building_grid",
        TerrainGrid => "terrain_grid",
        AqueductGrid => "aqueduct_grid",
        FigureGrid => "figure_grid",
        BitfieldsGrid => "bitfields_grid",
        SpriteGrid => "sprite_grid",
        RandomGrid => "random_grid",
        DesirabilityGrid => "desirability_grid",
        ElevationGrid => "elevation_grid",
        BuildingDamageGrid => "building_damage_grid",
        AqueductBackupGrid => "aqueduct_backup_grid",
        SpriteBackupGrid => "sprite_backup_grid",
        Figures => "figures",
        RouteFigures => "route_figures",
        RoutePaths => "route_paths",
        Formations => "formations",
        FormationTotals => "formation_totals",
        CityData => "city_data",
        CityFactionUnknown => "city_faction_unknown",
        PlayerName => "player_name",
        CityFaction => "city_faction",
        Buildings => "buildings",
        CityViewOrientation => "city_view_orientation",
        GameTime => "game_time",
        BuildingExtraHighestIdEver => "building_extra_highest_id_ever",
        RandomIv => "random_iv",
        CityViewCamera => "city_view_camera",
        BuildingCountCulture1 => "building_count_culture1",
        CityGraphOrder => "city_graph_order",
        EmperorChangeTime => "emperor_change_time",
        Empire => "empire",
        EmpireCities => "empire_cities",
        BuildingCountIndustry => "building_count_industry",
        TradePrices => "trade_prices",
        FigureNames => "figure_names",
        CultureCoverage => "culture_coverage",
        Scenario => "scenario",
        MaxGameYear => "max_game_year",
        Earthquake => "earthquake",
        EmperorChangeState => "emperor_change_state",
        Messages => "messages",
        MessageExtra => "message_extra",
        PopulationMessages => "population_messages",
        MessageCounts => "message_counts",
        MessageDelays => "message_delays",
        BuildingListBurningTotals => "building_list_burning_totals",
        FigureSequence => "figure_sequence",
        ScenarioSettings => "scenario_settings",
        InvasionWarnings => "invasion_warnings",
        ScenarioIsCustom => "scenario_is_custom",
        CitySounds => "city_sounds",
        BuildingExtraHighestId => "building_extra_highest_id",
        FigureTraders => "figure_traders",
        BuildingListBurning => "building_list_burning",
        BuildingListSmall => "building_list_small",
        BuildingListLarge => "building_list_large",
        TutorialPart1 => "tutorial_part1",
        BuildingCountMilitary => "building_count_military",
        EnemyArmyTotals => "enemy_army_totals",
        BuildingStorages => "building_storages",
        BuildingCountCulture2 => "building_count_culture2",
        BuildingCountSupport => "building_count_support",
        TutorialPart2 => "tutorial_part2",
        GladiatorRevolt => "gladiator_revolt",
        TradeRouteLimit => "trade_route_limit",
        TradeRouteTraded => "trade_route_traded",
        BuildingBarracksTowerSentry => "building_barracks_tower_sentry",
        BuildingExtraSequence => "building_extra_sequence",
        RoutingCounters => "routing_counters",
        BuildingCountCulture3 => "building_count_culture3",
        EnemyArmies => "enemy_armies",
        CityEntryExitXy => "city_entry_exit_xy",
        LastInvasionId => "last_invasion_id",
        BuildingExtraCorruptHouses => "building_extra_corrupt_houses",
        ScenarioName => "scenario_name",
        Bookmarks => "bookmarks",
        TutorialPart3 => "tutorial_part3",
        CityEntryExitGridOffset => "city_entry_exit_grid_offset",
        EndMarker => "end_marker",
    }
}

use SavegameField as G;

/// Sizes of the entity arrays that grew with the expanded format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ArraySizes {
    figures: usize,
    route_figures: usize,
    route_paths: usize,
    formations: usize,
    city_data: usize,
    buildings: usize,
    building_list_burning: usize,
    building_list_small: usize,
    building_list_large: usize,
    building_storages: usize,
}

const CLASSIC_ARRAYS: ArraySizes = ArraySizes {
    figures: 128_000,
    route_figures: 1_200,
    route_paths: 300_000,
    formations: 6_400,
    city_data: 36_136,
    buildings: 256_000,
    building_list_burning: 1_000,
    building_list_small: 1_000,
    building_list_large: 4_000,
    building_storages: 6_400,
};

/// First expanded format: five times the entities, classic record widths.
const EXPANDED_162_ARRAYS: ArraySizes = ArraySizes {
    figures: 640_000,
    route_figures: 6_000,
    route_paths: 1_500_000,
    formations: 32_000,
    city_data: 36_136,
    buildings: 1_280_000,
    building_list_burning: 5_000,
    building_list_small: 5_000,
    building_list_large: 20_000,
    building_storages: 32_000,
};

const CURRENT_ARRAYS: ArraySizes = ArraySizes {
    figures: 710_000,
    formations: 34_500,
    city_data: 36_156,
    ..EXPANDED_162_ARRAYS
};

fn pieces(grid: usize, arrays: &ArraySizes) -> Vec<PieceSpec<SavegameField>> {
    let g = grid * grid;
    let raw = |field, size| PieceSpec::new(field, size, false);
    let packed = |field, size| PieceSpec::new(field, size, true);
    vec![
        raw(G::ScenarioCampaignMission, 4),
        raw(G::FileVersion, 4),
        packed(G::ImageGrid, g * 2),
        packed(G::EdgeGrid, g),
        packed(G::BuildingGrid, g * 2),
        packed(G::TerrainGrid, g * 2),
        packed(G::AqueductGrid, g),
        packed(G::FigureGrid, g * 2),
        packed(G::BitfieldsGrid, g),
        packed(G::SpriteGrid, g),
        raw(G::RandomGrid, g),
        packed(G::DesirabilityGrid, g),
        packed(G::ElevationGrid, g),
        packed(G::BuildingDamageGrid, g),
        packed(G::AqueductBackupGrid, g),
        packed(G::SpriteBackupGrid, g),
        packed(G::Figures, arrays.figures),
        packed(G::RouteFigures, arrays.route_figures),
        packed(G::RoutePaths, arrays.route_paths),
        packed(G::Formations, arrays.formations),
        raw(G::FormationTotals, 12),
        packed(G::CityData, arrays.city_data),
        raw(G::CityFactionUnknown, 2),
        raw(G::PlayerName, 64),
        raw(G::CityFaction, 4),
        packed(G::Buildings, arrays.buildings),
        raw(G::CityViewOrientation, 4),
        raw(G::GameTime, 20),
        raw(G::BuildingExtraHighestIdEver, 8),
        raw(G::RandomIv, 8),
        raw(G::CityViewCamera, 8),
        raw(G::BuildingCountCulture1, 132),
        raw(G::CityGraphOrder, 8),
        raw(G::EmperorChangeTime, 8),
        raw(G::Empire, 12),
        packed(G::EmpireCities, 2706),
        raw(G::BuildingCountIndustry, 128),
        raw(G::TradePrices, 128),
        raw(G::FigureNames, 84),
        raw(G::CultureCoverage, 60),
        raw(G::Scenario, 1720),
        raw(G::MaxGameYear, 4),
        raw(G::Earthquake, 60),
        raw(G::EmperorChangeState, 4),
        packed(G::Messages, 16000),
        raw(G::MessageExtra, 12),
        raw(G::PopulationMessages, 10),
        raw(G::MessageCounts, 80),
        raw(G::MessageDelays, 80),
        raw(G::BuildingListBurningTotals, 8),
        raw(G::FigureSequence, 4),
        raw(G::ScenarioSettings, 12),
        packed(G::InvasionWarnings, 3232),
        raw(G::ScenarioIsCustom, 4),
        raw(G::CitySounds, 8960),
        raw(G::BuildingExtraHighestId, 4),
        raw(G::FigureTraders, 4804),
        packed(G::BuildingListBurning, arrays.building_list_burning),
        packed(G::BuildingListSmall, arrays.building_list_small),
        packed(G::BuildingListLarge, arrays.building_list_large),
        raw(G::TutorialPart1, 32),
        raw(G::BuildingCountMilitary, 16),
        raw(G::EnemyArmyTotals, 20),
        raw(G::BuildingStorages, arrays.building_storages),
        raw(G::BuildingCountCulture2, 32),
        raw(G::BuildingCountSupport, 24),
        raw(G::TutorialPart2, 4),
        raw(G::GladiatorRevolt, 16),
        packed(G::TradeRouteLimit, 1280),
        packed(G::TradeRouteTraded, 1280),
        raw(G::BuildingBarracksTowerSentry, 4),
        raw(G::BuildingExtraSequence, 4),
        raw(G::RoutingCounters, 16),
        raw(G::BuildingCountCulture3, 40),
        raw(G::EnemyArmies, 900),
        raw(G::CityEntryExitXy, 16),
        raw(G::LastInvasionId, 2),
        raw(G::BuildingExtraCorruptHouses, 8),
        raw(G::ScenarioName, 65),
        raw(G::Bookmarks, 32),
        raw(G::TutorialPart3, 4),
        raw(G::CityEntryExitGridOffset, 8),
        raw(G::EndMarker, SAVEGAME_END_MARKER_SIZE),
    ]
}

fn classic_pieces(grid: usize) -> Vec<PieceSpec<SavegameField>> {
    pieces(grid, &CLASSIC_ARRAYS)
}

fn expanded_162_pieces(grid: usize) -> Vec<PieceSpec<SavegameField>> {
    pieces(grid, &EXPANDED_162_ARRAYS)
}

fn current_pieces(grid: usize) -> Vec<PieceSpec<SavegameField>> {
    pieces(grid, &CURRENT_ARRAYS)
}

const fn xy(offset: usize, translation: Translation) -> ChangeItem {
    ChangeItem::widen(offset, 1, 2, translation)
}

const fn grid_offset(offset: usize) -> ChangeItem {
    ChangeItem::widen(offset, 2, 4, Translation::GridOffset)
}

use Translation::{X, Y};

static FIGURE_CHANGES: [ChangeItem; 12] = [
    xy(21, X),
    xy(22, Y),
    xy(23, X),
    xy(24, Y),
    grid_offset(27),
    xy(29, X),
    xy(30, Y),
    grid_offset(31),
    xy(33, X),
    xy(34, Y),
    xy(35, X),
    xy(36, Y),
];

static FORMATION_CHANGES: [ChangeItem; 10] = [
    xy(47, X),
    xy(48, Y),
    xy(49, X),
    xy(50, Y),
    xy(51, X),
    xy(52, Y),
    xy(53, X),
    xy(54, Y),
    xy(101, X),
    xy(102, Y),
];

static CITY_DATA_CHANGES: [ChangeItem; 15] = [
    xy(28172, X),
    xy(28173, Y),
    grid_offset(28174),
    xy(28176, X),
    xy(28177, Y),
    grid_offset(28178),
    xy(28180, X),
    xy(28181, Y),
    grid_offset(28182),
    xy(35264, X),
    xy(35265, Y),
    grid_offset(35266),
    xy(35597, X),
    xy(35598, Y),
    grid_offset(35599),
];

static BUILDING_CHANGES: [ChangeItem; 5] = [
    xy(6, X),
    xy(7, Y),
    grid_offset(9),
    xy(32, X),
    xy(33, Y),
];

const fn grid(field: SavegameField, cell_width: usize) -> GridPiece<SavegameField> {
    GridPiece { field, cell_width }
}

const fn records(
    field: SavegameField,
    record_count: usize,
    record_size: usize,
    changes: &'static [ChangeItem],
) -> RecordChangeset<SavegameField> {
    RecordChangeset {
        field,
        record_size,
        record_count,
        initial_offset: 0,
        changes,
    }
}

static CLASSIC_RECORDS: [RecordChangeset<SavegameField>; 4] = [
    records(G::Figures, 1000, 128, &FIGURE_CHANGES),
    records(G::Formations, 50, 128, &FORMATION_CHANGES),
    records(G::CityData, 1, 36136, &CITY_DATA_CHANGES),
    records(G::Buildings, 2000, 128, &BUILDING_CHANGES),
];

static EXPANDED_162_RECORDS: [RecordChangeset<SavegameField>; 4] = [
    records(G::Figures, 5000, 128, &FIGURE_CHANGES),
    records(G::Formations, 250, 128, &FORMATION_CHANGES),
    records(G::CityData, 1, 36136, &CITY_DATA_CHANGES),
    records(G::Buildings, 10000, 128, &BUILDING_CHANGES),
];

static GRID_PIECES: [GridPiece<SavegameField>; 14] = [
    grid(G::ImageGrid, 2),
    grid(G::EdgeGrid, 1),
    grid(G::BuildingGrid, 2),
    grid(G::TerrainGrid, 2),
    grid(G::AqueductGrid, 1),
    grid(G::FigureGrid, 2),
    grid(G::BitfieldsGrid, 1),
    grid(G::SpriteGrid, 1),
    grid(G::RandomGrid, 1),
    grid(G::DesirabilityGrid, 1),
    grid(G::ElevationGrid, 1),
    grid(G::BuildingDamageGrid, 1),
    grid(G::AqueductBackupGrid, 1),
    grid(G::SpriteBackupGrid, 1),
];

static CLASSIC_MIGRATION: MigrationPlan<SavegameField> = MigrationPlan {
    old_grid_size: LEGACY_GRID_SIZE,
    scenario_field: G::Scenario,
    camera_field: G::CityViewCamera,
    grid_pieces: &GRID_PIECES,
    records: &CLASSIC_RECORDS,
};

/// Same map migration; the record walk covers the larger entity arrays.
static EXPANDED_162_MIGRATION: MigrationPlan<SavegameField> = MigrationPlan {
    old_grid_size: LEGACY_GRID_SIZE,
    scenario_field: G::Scenario,
    camera_field: G::CityViewCamera,
    grid_pieces: &GRID_PIECES,
    records: &EXPANDED_162_RECORDS,
};

static REGISTRY: [VersionEntry<SavegameField>; 3] = [
    VersionEntry {
        version: SAVE_GAME_VERSION_LEGACY,
        label: "classic",
        grid: GridEdge::Legacy,
        pieces: classic_pieces,
        migration: Some(&CLASSIC_MIGRATION),
    },
    VersionEntry {
        version: SAVE_GAME_VERSION_EXPANDED_162,
        label: "expanded arrays, classic map",
        grid: GridEdge::Legacy,
        pieces: expanded_162_pieces,
        migration: Some(&EXPANDED_162_MIGRATION),
    },
    VersionEntry {
        version: SAVE_GAME_VERSION,
        label: "current",
        grid: GridEdge::Configured,
        pieces: current_pieces,
        migration: None,
    },
];

static STEPS: [Step<SavegameField>; 42] = [
    Step::new(
        Subsystem::ScenarioSettings,
        &[
            G::ScenarioCampaignMission,
            G::ScenarioSettings,
            G::ScenarioIsCustom,
            G::PlayerName,
            G::ScenarioName,
        ],
    ),
    Step::new(Subsystem::MapImage, &[G::ImageGrid]),
    Step::new(Subsystem::MapBuilding, &[G::BuildingGrid, G::BuildingDamageGrid]),
    Step::new(Subsystem::MapTerrain, &[G::TerrainGrid]),
    Step::new(Subsystem::MapAqueduct, &[G::AqueductGrid, G::AqueductBackupGrid]),
    Step::new(Subsystem::MapFigure, &[G::FigureGrid]),
    Step::new(Subsystem::MapSprite, &[G::SpriteGrid, G::SpriteBackupGrid]),
    Step::new(Subsystem::MapProperty, &[G::BitfieldsGrid, G::EdgeGrid]),
    Step::new(Subsystem::MapRandom, &[G::RandomGrid]),
    Step::new(Subsystem::MapDesirability, &[G::DesirabilityGrid]),
    Step::new(Subsystem::MapElevation, &[G::ElevationGrid]),
    Step::new(Subsystem::Figures, &[G::Figures, G::FigureSequence]),
    Step::new(Subsystem::FigureRoutes, &[G::RouteFigures, G::RoutePaths]),
    Step::new(Subsystem::Formations, &[G::Formations, G::FormationTotals]),
    Step::new(
        Subsystem::CityData,
        &[
            G::CityData,
            G::CityFaction,
            G::CityFactionUnknown,
            G::CityGraphOrder,
            G::CityEntryExitXy,
            G::CityEntryExitGridOffset,
        ],
    ),
    Step::new(
        Subsystem::Buildings,
        &[
            G::Buildings,
            G::BuildingExtraHighestId,
            G::BuildingExtraHighestIdEver,
            G::BuildingExtraSequence,
            G::BuildingExtraCorruptHouses,
        ],
    ),
    Step::new(Subsystem::Barracks, &[G::BuildingBarracksTowerSentry]),
    Step::new(Subsystem::CityView, &[G::CityViewOrientation, G::CityViewCamera]),
    Step::new(Subsystem::GameTime, &[G::GameTime]),
    Step::new(Subsystem::Random, &[G::RandomIv]),
    Step::new(
        Subsystem::BuildingCounts,
        &[
            G::BuildingCountIndustry,
            G::BuildingCountCulture1,
            G::BuildingCountCulture2,
            G::BuildingCountCulture3,
            G::BuildingCountMilitary,
            G::BuildingCountSupport,
        ],
    ),
    Step::new(Subsystem::EmperorChange, &[G::EmperorChangeTime, G::EmperorChangeState]),
    Step::new(Subsystem::Empire, &[G::Empire]),
    Step::new(Subsystem::EmpireCities, &[G::EmpireCities]),
    Step::new(Subsystem::TradePrices, &[G::TradePrices]),
    Step::new(Subsystem::FigureNames, &[G::FigureNames]),
    Step::new(Subsystem::CultureCoverage, &[G::CultureCoverage]),
    Step::new(Subsystem::Scenario, &[G::Scenario]),
    Step::new(Subsystem::ScenarioCriteria, &[G::MaxGameYear]),
    Step::new(Subsystem::Earthquake, &[G::Earthquake]),
    Step::new(
        Subsystem::Messages,
        &[
            G::Messages,
            G::MessageExtra,
            G::MessageCounts,
            G::MessageDelays,
            G::PopulationMessages,
        ],
    ),
    Step::new(Subsystem::CitySounds, &[G::CitySounds]),
    Step::new(Subsystem::Traders, &[G::FigureTraders]),
    Step::new(
        Subsystem::BuildingLists,
        &[
            G::BuildingListSmall,
            G::BuildingListLarge,
            G::BuildingListBurning,
            G::BuildingListBurningTotals,
        ],
    ),
    Step::new(
        Subsystem::Tutorial,
        &[G::TutorialPart1, G::TutorialPart2, G::TutorialPart3],
    ),
    Step::new(Subsystem::BuildingStorages, &[G::BuildingStorages]),
    Step::new(Subsystem::GladiatorRevolt, &[G::GladiatorRevolt]),
    Step::new(Subsystem::TradeRoutes, &[G::TradeRouteLimit, G::TradeRouteTraded]),
    Step::new(Subsystem::Routing, &[G::RoutingCounters]),
    Step::new(Subsystem::EnemyArmies, &[G::EnemyArmies, G::EnemyArmyTotals]),
    Step::new(Subsystem::Invasion, &[G::LastInvasionId, G::InvasionWarnings]),
    Step::new(Subsystem::Bookmarks, &[G::Bookmarks]),
];

/// Saved game family marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct Savegame;

impl FileFormat for Savegame {
    type Field = SavegameField;

    const FAMILY: Family = Family::Savegame;
    const CURRENT_VERSION: i32 = SAVE_GAME_VERSION;
    const VERSION_FIELD: SavegameField = G::FileVersion;
    const END_MARKER: SavegameField = G::EndMarker;

    fn registry() -> &'static [VersionEntry<SavegameField>] {
        &REGISTRY
    }

    fn steps() -> &'static [Step<SavegameField>] {
        &STEPS
    }

    fn write_version(buf: &mut Buffer, version: i32) -> Result<()> {
        buf.reset();
        buf.write_i32(version)
    }

    fn read_version(buf: &mut Buffer) -> Result<i32> {
        buf.read_i32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn every_version_has_the_same_piece_order() {
        let config = EngineConfig::default();
        for entry in Savegame::registry() {
            let layout = entry.build_layout(&config);
            let order: Vec<_> = layout.pieces().iter().map(|p| p.field).collect();
            assert_eq!(order, SavegameField::ALL, "version {:#x}", entry.version);
            assert_eq!(layout.pieces()[1].field, G::FileVersion);
        }
    }

    #[test]
    fn classic_sizes_match_162_grid() {
        let layout = Savegame::build_layout(SAVE_GAME_VERSION_LEGACY, &EngineConfig::default())
            .unwrap();
        assert_eq!(layout.buffer(G::ImageGrid).unwrap().size(), 52488);
        assert_eq!(layout.buffer(G::EdgeGrid).unwrap().size(), 26244);
        assert_eq!(layout.buffer(G::Figures).unwrap().size(), 128_000);
        assert_eq!(layout.buffer(G::Buildings).unwrap().size(), 256_000);
    }

    #[test]
    fn expanded_162_keeps_classic_grid_and_record_widths() {
        let config = EngineConfig::default();
        let v76 = Savegame::build_layout(SAVE_GAME_VERSION_EXPANDED_162, &config).unwrap();
        let v77 = Savegame::build_layout(SAVE_GAME_VERSION, &config).unwrap();
        assert_eq!(v76.buffer(G::TerrainGrid).unwrap().size(), 52488);
        assert_eq!(v77.buffer(G::TerrainGrid).unwrap().size(), 228 * 228 * 2);

        assert_eq!(v76.buffer(G::Figures).unwrap().size(), 5000 * 128);
        assert_eq!(v76.buffer(G::Formations).unwrap().size(), 250 * 128);
        assert_eq!(v76.buffer(G::CityData).unwrap().size(), 36136);
        assert_eq!(
            v76.buffer(G::RoutePaths).unwrap().size(),
            v77.buffer(G::RoutePaths).unwrap().size()
        );
        assert_eq!(
            v76.buffer(G::Buildings).unwrap().size(),
            v77.buffer(G::Buildings).unwrap().size()
        );
    }

    #[test]
    fn steps_map_every_piece_exactly_once() {
        let mut mapped: Vec<_> = STEPS.iter().flat_map(|s| s.fields.iter().copied()).collect();
        mapped.sort();
        let before = mapped.len();
        mapped.dedup();
        assert_eq!(before, mapped.len());

        let expected: Vec<_> = SavegameField::ALL
            .iter()
            .copied()
            .filter(|f| !matches!(f, G::FileVersion | G::EndMarker))
            .collect();
        assert_eq!(mapped, expected);
    }

    fn size_of(specs: &[PieceSpec<SavegameField>], field: SavegameField) -> usize {
        specs.iter().find(|s| s.field == field).map(|s| s.size).unwrap()
    }

    #[test]
    fn changesets_are_ordered_and_fit_their_records() {
        for (plan, old) in [
            (&CLASSIC_MIGRATION, classic_pieces(LEGACY_GRID_SIZE)),
            (&EXPANDED_162_MIGRATION, expanded_162_pieces(LEGACY_GRID_SIZE)),
        ] {
            for changeset in plan.records {
                let mut end = 0;
                for change in changeset.changes {
                    assert!(change.offset >= end, "{:?} overlaps at {}", changeset.field, change.offset);
                    assert!(change.new_width >= change.old_width);
                    end = change.offset + change.old_width;
                }
                assert!(end <= changeset.record_size);

                let old_span =
                    changeset.initial_offset + changeset.record_size * changeset.record_count;
                assert!(old_span <= size_of(&old, changeset.field));
            }
        }

        let current = current_pieces(LEGACY_GRID_SIZE);
        for changeset in CLASSIC_MIGRATION.records {
            let new_span =
                changeset.initial_offset + changeset.new_record_size() * changeset.record_count;
            assert!(new_span <= size_of(&current, changeset.field));
        }
    }

    #[test]
    fn expanded_162_records_walk_whole_arrays() {
        let old = expanded_162_pieces(LEGACY_GRID_SIZE);
        let current = current_pieces(LEGACY_GRID_SIZE);
        for changeset in EXPANDED_162_MIGRATION.records {
            assert_eq!(
                changeset.record_size * changeset.record_count,
                size_of(&old, changeset.field),
                "{:?}",
                changeset.field
            );
        }

        // widened figures, formations and city data fill the current arrays exactly
        for changeset in &EXPANDED_162_MIGRATION.records[..3] {
            assert_eq!(
                changeset.new_record_size() * changeset.record_count,
                size_of(&current, changeset.field),
                "{:?}",
                changeset.field
            );
        }
        let figures = &EXPANDED_162_MIGRATION.records[0];
        assert_eq!(figures.new_record_size(), 142);
        assert_eq!(EXPANDED_162_MIGRATION.records[1].new_record_size(), 138);
    }

    #[test]
    fn city_data_growth_matches_current_size() {
        let city = &CLASSIC_MIGRATION.records[2];
        assert_eq!(city.field, G::CityData);
        assert_eq!(city.new_record_size(), CURRENT_ARRAYS.city_data);
    }

    #[test]
    fn grid_table_covers_all_grid_pieces() {
        let fields: Vec<_> = CLASSIC_MIGRATION.grid_pieces.iter().map(|g| g.field).collect();
        assert_eq!(fields, &SavegameField::ALL[2..16]);
        let cells = LEGACY_GRID_SIZE * LEGACY_GRID_SIZE;
        let specs = classic_pieces(LEGACY_GRID_SIZE);
        for grid in CLASSIC_MIGRATION.grid_pieces {
            let spec = specs.iter().find(|s| s.field == grid.field).unwrap();
            assert_eq!(spec.size, cells * grid.cell_width);
        }
    }
}
