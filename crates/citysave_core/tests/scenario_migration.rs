use std::fs;
use std::path::Path;

use citysave_core::migrate::{SCENARIO_MAP_BORDER_OFFSET, SCENARIO_MAP_WIDTH_OFFSET};
use citysave_core::version::{SCENARIO_VERSION, SCENARIO_VERSION_LEGACY};
use citysave_core::{
    EngineConfig, ErrorCode, FileFormat, LayoutDescriptor, SaveEngine, Scenario, ScenarioField,
    ScenarioState,
};

const LEGACY_EDGE: usize = 162;

fn engine(grid_size: usize) -> SaveEngine {
    SaveEngine::new(EngineConfig::default().with_grid_size(grid_size)).expect("valid grid size")
}

fn legacy_map() -> LayoutDescriptor<ScenarioField> {
    let mut layout = Scenario::build_layout(SCENARIO_VERSION_LEGACY, &EngineConfig::default())
        .expect("legacy scenarios are registered");

    let terrain = layout.buffer_mut(ScenarioField::Terrain).unwrap();
    terrain.set((5 * LEGACY_EDGE + 5) * 2).unwrap();
    terrain.write_u16(0x0402).unwrap();

    let elevation = layout.buffer_mut(ScenarioField::Elevation).unwrap();
    elevation.set(LEGACY_EDGE * LEGACY_EDGE - 1).unwrap();
    elevation.write_u8(9).unwrap();

    let scenario = layout.buffer_mut(ScenarioField::Scenario).unwrap();
    scenario.set(SCENARIO_MAP_WIDTH_OFFSET).unwrap();
    scenario.write_i32(80).unwrap();
    scenario.write_i32(60).unwrap();
    scenario.write_i32(0).unwrap();
    scenario.write_i32(82).unwrap();

    let camera = layout.buffer_mut(ScenarioField::Camera).unwrap();
    camera.write_i32(45).unwrap();
    camera.write_i32(90).unwrap();

    layout
}

fn write_image(path: &Path, layout: &LayoutDescriptor<ScenarioField>) {
    let bytes: Vec<u8> = layout
        .pieces()
        .iter()
        .flat_map(|piece| piece.buf.as_bytes().iter().copied())
        .collect();
    fs::write(path, bytes).unwrap();
}

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

#[test]
fn legacy_map_terrain_moves_to_centered_window() {
    for new_edge in [228usize, 164, 262] {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("valley.map");
        write_image(&path, &legacy_map());

        let mut state = ScenarioState::new();
        let report = engine(new_edge).load_scenario(&path, &mut state).unwrap();
        assert!(report.migrated);
        assert_eq!(report.version, SCENARIO_VERSION_LEGACY);

        let terrain = state.get(ScenarioField::Terrain).unwrap();
        assert_eq!(terrain.len(), new_edge * new_edge * 2);
        let shift = (new_edge - LEGACY_EDGE) / 2;
        let cell = ((5 + shift) * new_edge + (5 + shift)) * 2;
        assert_eq!(&terrain[cell..cell + 2], &[0x02, 0x04]);
        assert_eq!(terrain.iter().filter(|&&b| b != 0).count(), 2);

        let elevation = state.get(ScenarioField::Elevation).unwrap();
        let last = (LEGACY_EDGE - 1 + shift) * new_edge + (LEGACY_EDGE - 1 + shift);
        assert_eq!(elevation[last], 9);
    }
}

#[test]
fn legacy_map_geometry_and_camera_follow_new_border() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("valley.map");
    write_image(&path, &legacy_map());

    let mut state = ScenarioState::new();
    engine(228).load_scenario(&path, &mut state).unwrap();

    let new_border = 228 - 80;
    let scenario = state.get(ScenarioField::Scenario).unwrap();
    assert_eq!(read_i32(scenario, SCENARIO_MAP_BORDER_OFFSET), new_border);
    assert_eq!(
        read_i32(scenario, SCENARIO_MAP_BORDER_OFFSET - 4),
        (228 - 60) / 2 * 228 + (228 - 80) / 2
    );

    let camera = state.get(ScenarioField::Camera).unwrap();
    assert_eq!(read_i32(camera, 0), 45 - 82 / 2 + new_border / 2);
    assert_eq!(read_i32(camera, 4), 90 - 82 + new_border);
}

#[test]
fn current_scenario_roundtrips_through_mpx() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("valley.MPX");
    let mut engine = engine(228);

    let mut state = ScenarioState::new();
    state.insert(ScenarioField::RandomIv, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    state.insert(ScenarioField::Terrain, vec![0xAA; 228 * 228 * 2]);
    engine.save_scenario(&path, &state).unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[..4], &[SCENARIO_VERSION as u8, 0, 0, 0]);
    let total: usize = Scenario::build_layout(SCENARIO_VERSION, engine.config())
        .unwrap()
        .total_size();
    assert_eq!(bytes.len(), total);

    let mut restored = ScenarioState::new();
    let report = engine.load_scenario(&path, &mut restored).unwrap();
    assert!(!report.migrated);
    assert_eq!(report.version, SCENARIO_VERSION);
    assert_eq!(restored.get(ScenarioField::RandomIv).unwrap(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(
        restored.get(ScenarioField::Terrain).unwrap(),
        state.get(ScenarioField::Terrain).unwrap()
    );
}

#[test]
fn unknown_scenario_version_leaves_state_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.mpx");
    let mut bytes = vec![0u8; 64];
    bytes[0] = (SCENARIO_VERSION + 1) as u8;
    fs::write(&path, bytes).unwrap();

    let mut state = ScenarioState::new();
    state.insert(ScenarioField::Camera, vec![7; 8]);
    let err = engine(228).load_scenario(&path, &mut state).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedVersion);
    assert_eq!(state.len(), 1);
    assert_eq!(state.get(ScenarioField::Camera).unwrap(), &[7; 8]);
}

#[test]
fn truncated_legacy_map_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.map");
    fs::write(&path, vec![0u8; 1000]).unwrap();

    let mut state = ScenarioState::new();
    let err = engine(228).load_scenario(&path, &mut state).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ShortRead);
    assert!(state.is_empty());
}
