use std::fs;

use citysave_core::codec::UNCOMPRESSED;
use citysave_core::migrate::{
    SCENARIO_MAP_BORDER_OFFSET, SCENARIO_MAP_GRID_START_OFFSET, SCENARIO_MAP_WIDTH_OFFSET,
};
use citysave_core::version::{
    SAVE_GAME_VERSION, SAVE_GAME_VERSION_EXPANDED_162, SAVE_GAME_VERSION_LEGACY,
};
use citysave_core::{
    Buffer, EngineConfig, ErrorCode, FileFormat, LayoutDescriptor, SaveEngine, Savegame,
    SavegameField, SavegameState,
};

const NEW_EDGE: usize = 228;
const MAP_WIDTH: i32 = 100;
const MAP_HEIGHT: i32 = 100;
const OLD_BORDER: i32 = 62;
const NEW_BORDER: i32 = NEW_EDGE as i32 - MAP_WIDTH;

fn engine() -> SaveEngine {
    SaveEngine::new(EngineConfig::default()).expect("default config is valid")
}

fn buffer(layout: &mut LayoutDescriptor<SavegameField>, field: SavegameField) -> &mut Buffer {
    layout.buffer_mut(field).expect("piece exists in every save layout")
}

fn encode(layout: &LayoutDescriptor<SavegameField>) -> Vec<u8> {
    let mut out = Vec::new();
    for piece in layout.pieces() {
        if piece.compressed {
            out.extend_from_slice(&UNCOMPRESSED.to_le_bytes());
        }
        out.extend_from_slice(piece.buf.as_bytes());
    }
    out
}

/// A 162-edge save with one of everything the migration touches.
fn classic_save(version: i32) -> LayoutDescriptor<SavegameField> {
    let mut layout = Savegame::build_layout(version, &EngineConfig::default())
        .expect("classic versions are registered");

    buffer(&mut layout, SavegameField::FileVersion)
        .write_i32(version)
        .unwrap();
    buffer(&mut layout, SavegameField::PlayerName)
        .write_raw(b"Governor")
        .unwrap();

    let scenario = buffer(&mut layout, SavegameField::Scenario);
    scenario.set(SCENARIO_MAP_WIDTH_OFFSET).unwrap();
    scenario.write_i32(MAP_WIDTH).unwrap();
    scenario.write_i32(MAP_HEIGHT).unwrap();
    scenario.write_i32(31 * 162 + 31).unwrap();
    scenario.write_i32(OLD_BORDER).unwrap();

    let camera = buffer(&mut layout, SavegameField::CityViewCamera);
    camera.write_i32(60).unwrap();
    camera.write_i32(120).unwrap();

    let image = buffer(&mut layout, SavegameField::ImageGrid);
    image.write_u16(0xABCD).unwrap();

    // figure 0: destination (40, 50) at grid offset (1, 1)
    let figures = buffer(&mut layout, SavegameField::Figures);
    figures.set(20).unwrap();
    figures.write_u8(0x11).unwrap();
    figures.write_u8(40).unwrap();
    figures.write_u8(50).unwrap();
    figures.set(27).unwrap();
    figures.write_u16(163).unwrap();
    figures.set(127).unwrap();
    figures.write_u8(0x7F).unwrap();

    // building 1: position (10, 20), grid offset (10, 20)
    let buildings = buffer(&mut layout, SavegameField::Buildings);
    buildings.set(128 + 6).unwrap();
    buildings.write_u8(10).unwrap();
    buildings.write_u8(20).unwrap();
    buildings.set(128 + 9).unwrap();
    buildings.write_u16(20 * 162 + 10).unwrap();

    layout
}

fn load_migrated(bytes: &[u8]) -> (citysave_core::LoadReport, SavegameState) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("classic.sav");
    fs::write(&path, bytes).unwrap();

    let mut state = SavegameState::new();
    let report = engine()
        .load_savegame(&path, &mut state)
        .expect("classic save migrates");
    (report, state)
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    read_u32(bytes, at) as i32
}

#[test]
fn classic_save_reports_geometry() {
    let (report, _) = load_migrated(&encode(&classic_save(SAVE_GAME_VERSION_LEGACY)));
    assert!(report.migrated);
    assert_eq!(report.version, SAVE_GAME_VERSION_LEGACY);

    let geometry = report.geometry.expect("migration captures geometry");
    assert_eq!(geometry.old_edge, 162);
    assert_eq!(geometry.new_edge, NEW_EDGE as i64);
    assert_eq!(geometry.old_border, OLD_BORDER as i64);
    assert_eq!(geometry.new_border, NEW_BORDER as i64);
}

#[test]
fn classic_save_keeps_untouched_pieces() {
    let (_, state) = load_migrated(&encode(&classic_save(SAVE_GAME_VERSION_LEGACY)));
    let name = state.get(SavegameField::PlayerName).unwrap();
    assert_eq!(name.len(), 64);
    assert_eq!(&name[..8], b"Governor");
    assert!(state.get(SavegameField::FileVersion).is_none());
}

#[test]
fn classic_save_rewrites_map_geometry_and_camera() {
    let (_, state) = load_migrated(&encode(&classic_save(SAVE_GAME_VERSION_LEGACY)));

    let scenario = state.get(SavegameField::Scenario).unwrap();
    assert_eq!(read_i32(scenario, SCENARIO_MAP_WIDTH_OFFSET), MAP_WIDTH);
    assert_eq!(read_i32(scenario, SCENARIO_MAP_BORDER_OFFSET), NEW_BORDER);
    let edge = NEW_EDGE as i32;
    assert_eq!(
        read_i32(scenario, SCENARIO_MAP_GRID_START_OFFSET),
        (edge - MAP_HEIGHT) / 2 * edge + (edge - MAP_WIDTH) / 2
    );

    let camera = state.get(SavegameField::CityViewCamera).unwrap();
    assert_eq!(read_i32(camera, 0), 60 - OLD_BORDER / 2 + NEW_BORDER / 2);
    assert_eq!(read_i32(camera, 4), 120 - OLD_BORDER + NEW_BORDER);
}

#[test]
fn classic_save_centers_grids() {
    let (_, state) = load_migrated(&encode(&classic_save(SAVE_GAME_VERSION_LEGACY)));
    let image = state.get(SavegameField::ImageGrid).unwrap();
    assert_eq!(image.len(), NEW_EDGE * NEW_EDGE * 2);

    let margin = (NEW_EDGE - 162) / 2;
    let cell = (margin * NEW_EDGE + margin) * 2;
    assert_eq!(read_u16(image, cell), 0xABCD);
    assert_eq!(image.iter().filter(|&&b| b != 0).count(), 2);
}

#[test]
fn classic_save_widens_and_translates_figures() {
    let (_, state) = load_migrated(&encode(&classic_save(SAVE_GAME_VERSION_LEGACY)));
    let figures = state.get(SavegameField::Figures).unwrap();
    assert_eq!(figures.len(), 710_000);

    assert_eq!(figures[20], 0x11);
    assert_eq!(read_u16(figures, 21) as i32, 40 - OLD_BORDER / 2 + NEW_BORDER / 2);
    assert_eq!(read_u16(figures, 23) as i32, 50 - OLD_BORDER + NEW_BORDER);
    // unset previous tile stays zero
    assert_eq!(read_u16(figures, 25), 0);
    assert_eq!(read_u16(figures, 27), 0);

    let border = NEW_BORDER as u32;
    let expected = (1 + border) * NEW_EDGE as u32 + (1 + border);
    assert_eq!(read_u32(figures, 31), expected);

    // the last byte of figure 0 moves by the record growth
    assert_eq!(figures[127 + 14], 0x7F);
    assert!(figures[142..].iter().all(|&b| b == 0));
}

#[test]
fn classic_save_translates_building_offsets() {
    let (_, state) = load_migrated(&encode(&classic_save(SAVE_GAME_VERSION_LEGACY)));
    let buildings = state.get(SavegameField::Buildings).unwrap();
    let record = 134;
    let border = NEW_BORDER as u32;

    assert_eq!(read_u16(buildings, record + 6) as i32, 10 - OLD_BORDER / 2 + NEW_BORDER / 2);
    assert_eq!(read_u16(buildings, record + 8) as i32, 20 - OLD_BORDER + NEW_BORDER);
    // offset 9 shifts by the two widened bytes before it
    assert_eq!(
        read_u32(buildings, record + 11),
        (20 + border) * NEW_EDGE as u32 + (10 + border)
    );
    assert!(buildings[..record].iter().all(|&b| b == 0));
}

#[test]
fn expanded_162_save_migrates_every_record() {
    let mut layout = classic_save(SAVE_GAME_VERSION_EXPANDED_162);
    assert_eq!(layout.buffer(SavegameField::Figures).unwrap().size(), 640_000);
    assert_eq!(layout.buffer(SavegameField::Formations).unwrap().size(), 32_000);
    assert_eq!(layout.buffer(SavegameField::CityData).unwrap().size(), 36_136);

    // the last figure and formation slots only exist in the expanded arrays
    let figures = buffer(&mut layout, SavegameField::Figures);
    figures.set(4999 * 128 + 21).unwrap();
    figures.write_u8(70).unwrap();
    figures.write_u8(80).unwrap();
    let formations = buffer(&mut layout, SavegameField::Formations);
    formations.set(249 * 128 + 101).unwrap();
    formations.write_u8(12).unwrap();

    let (report, state) = load_migrated(&encode(&layout));
    assert_eq!(report.version, SAVE_GAME_VERSION_EXPANDED_162);

    let figures = state.get(SavegameField::Figures).unwrap();
    assert_eq!(figures.len(), 710_000);
    assert_eq!(read_u16(figures, 21) as i32, 40 - OLD_BORDER / 2 + NEW_BORDER / 2);
    let last = 4999 * 142;
    assert_eq!(read_u16(figures, last + 21) as i32, 70 - OLD_BORDER / 2 + NEW_BORDER / 2);
    assert_eq!(read_u16(figures, last + 23) as i32, 80 - OLD_BORDER + NEW_BORDER);

    let formations = state.get(SavegameField::Formations).unwrap();
    assert_eq!(formations.len(), 34_500);
    // offset 101 moves by the eight widened bytes before it
    assert_eq!(
        read_u16(formations, 249 * 138 + 109) as i32,
        12 - OLD_BORDER / 2 + NEW_BORDER / 2
    );

    assert_eq!(state.get(SavegameField::CityData).unwrap().len(), 36_156);
}

#[test]
fn expanded_162_route_pieces_follow_figures() {
    let mut layout = classic_save(SAVE_GAME_VERSION_EXPANDED_162);
    buffer(&mut layout, SavegameField::RouteFigures)
        .write_raw(&[9; 6000])
        .unwrap();

    let (_, state) = load_migrated(&encode(&layout));
    assert_eq!(state.get(SavegameField::RouteFigures).unwrap(), &[9; 6000][..]);
}

#[test]
fn expanded_162_overflowing_buildings_are_rejected() {
    let mut layout = classic_save(SAVE_GAME_VERSION_EXPANDED_162);
    let buildings = buffer(&mut layout, SavegameField::Buildings);
    buildings.set(1_279_999).unwrap();
    buildings.write_u8(1).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("overflow.sav");
    fs::write(&path, encode(&layout)).unwrap();

    let mut state = SavegameState::new();
    let err = engine().load_savegame(&path, &mut state).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MigrationOverflow);
    assert!(state.is_empty());
}

#[test]
fn migrated_save_is_written_back_as_current() {
    let (_, state) = load_migrated(&encode(&classic_save(SAVE_GAME_VERSION_LEGACY)));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("upgraded.sav");
    let mut engine = engine();
    engine.save_savegame(&path, &state).unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(read_i32(&bytes, 4), SAVE_GAME_VERSION);

    let mut reloaded = SavegameState::new();
    let report = engine.load_savegame(&path, &mut reloaded).unwrap();
    assert!(!report.migrated);
    assert_eq!(reloaded, state);
}
