//! Integration tests for ki-qihe
//!
//! These run the whole export pipeline against a copy of the sample board
//! in a temporary directory.

use ki_qihe::{
    activity::{ActivityBuffer, ActivityLog, Verbosity},
    board::{Board, Side},
    exporter::{self, Exporter},
    options::{MappingLocation, Options, OptionsStore},
};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tempfile::TempDir;

const DEMO_BOARD: &str = include_str!("data/board/demo.kicad_pcb");

const DEMO_MAPPING: &str = "\
# demo mapping
1, L1, 10k
2, L2, 100nF
E, , ^TP
P, , FIDUCIAL
";

struct Workspace {
    _dir: TempDir,
    board: PathBuf,
    plugin_dir: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let board = dir.path().join("demo.kicad_pcb");
        fs::write(&board, DEMO_BOARD).expect("Failed to write board");
        let plugin_dir = dir.path().join("plugin");
        fs::create_dir_all(&plugin_dir).expect("Failed to create plugin dir");

        Self {
            _dir: dir,
            board,
            plugin_dir,
        }
    }

    fn with_mapping(self, content: &str) -> Self {
        fs::write(self.plugin_dir.join("component_mapping.txt"), content)
            .expect("Failed to write mapping");
        self
    }

    fn output(&self, suffix: &str) -> PathBuf {
        self.board
            .parent()
            .expect("board has a parent")
            .join(format!("demo_{}.csv", suffix))
    }

    fn export(&self, options: Options) -> (Option<exporter::ExportStats>, Arc<ActivityBuffer>) {
        let buffer = Arc::new(ActivityBuffer::new());
        let activity = ActivityLog::new(buffer.clone(), Verbosity::Minimal);
        let stats = exporter::export_board(
            &self.board,
            options,
            self.plugin_dir.clone(),
            activity,
            false,
        );
        (stats, buffer)
    }
}

fn data_lines(path: &Path) -> Vec<String> {
    let content = fs::read_to_string(path).expect("Failed to read output");
    content
        .split("\r\n")
        .skip(1)
        .take_while(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[test]
fn test_sample_board_is_read() {
    let board = Board::load(Path::new("tests/data/board/demo.kicad_pcb")).expect("board loads");

    assert_eq!(board.footprints().len(), 8);
    assert_eq!(board.footprints_on(Side::Top).count(), 7);
    assert_eq!(board.footprints_on(Side::Bottom).count(), 1);
    assert_eq!(board.base_name().unwrap(), "demo");
}

#[test]
fn test_full_export() {
    let workspace = Workspace::new().with_mapping(DEMO_MAPPING);

    let (stats, buffer) = workspace.export(Options::default());
    let stats = stats.expect("export succeeds");

    assert_eq!(
        data_lines(&workspace.output("TOP-COORDS")),
        vec![
            "FID1,1/2,None,95.00,45.00,270.00,0.00,100,None,True,PRIO FIDUCIAL FID1",
            "C1,2,L2,110.50,50.00,0.00,0.00,100,None,True,100nF C1",
            "R1,1,L1,100.00,50.00,270.00,0.00,100,None,True,10k R1",
            "U1,1/2,None,130.00,40.00,270.00,0.00,100,None,True,STM32F103C8Tx U1",
        ]
    );
    assert_eq!(
        data_lines(&workspace.output("BOTTOM-COORDS")),
        vec!["C2,2,L2,120.00,60.00,90.00,0.00,100,None,True,100nF C2"]
    );

    let top = &stats.layers[0];
    assert_eq!(top.side, Side::Top);
    assert_eq!(top.stats.total, 7);
    assert_eq!(top.stats.priority, 1);
    assert_eq!(top.stats.mapped, 2);
    assert_eq!(top.stats.unmapped, 1);
    assert_eq!(top.stats.excluded_by_pattern, 1);
    assert_eq!(top.stats.excluded_by_attribute, 2);

    assert!(buffer.contains("Board loaded successfully."));
    assert!(buffer.contains("Generating QIHE files:"));
    assert!(buffer.contains("- Excluded (pattern/attribute): 1 / 2"));
    assert!(buffer.contains("Successfully written to file:"));
    assert!(buffer.contains("Processed bottom layer."));
}

#[test]
fn test_attribute_excluded_mapped_part_is_not_written() {
    let workspace = Workspace::new().with_mapping(DEMO_MAPPING);

    workspace.export(Options::default());

    // C3 carries a mapped value but is marked "exclude from BOM"
    let lines = data_lines(&workspace.output("TOP-COORDS"));
    assert!(lines.iter().any(|line| line.starts_with("C1,2,L2,")));
    assert!(!lines.iter().any(|line| line.starts_with("C3,")));
}

#[test]
fn test_output_ends_with_puzzle_block() {
    let workspace = Workspace::new().with_mapping(DEMO_MAPPING);
    workspace.export(Options::default());

    let content = fs::read_to_string(workspace.output("BOTTOM-COORDS")).unwrap();
    let mut trailer = String::from("\r\nPuzzle\r\n");
    for _ in 0..8 {
        trailer.push_str("0.00\r\n\r\n");
    }
    trailer.push_str("\r\n\r\n");

    assert!(content.starts_with("Designator,NozzleNum,StackNum,Mid X,Mid Y,Rotation,"));
    assert!(content.ends_with(&trailer));
}

#[test]
fn test_missing_mapping_creates_template() {
    let workspace = Workspace::new();

    let (stats, buffer) = workspace.export(Options::default());

    assert!(stats.is_some());
    assert!(workspace.plugin_dir.join("component_mapping.txt").exists());
    assert!(buffer.contains("Default mapping file created"));

    // with an empty table every placed footprint is unmapped
    let lines = data_lines(&workspace.output("TOP-COORDS"));
    assert_eq!(lines.len(), 5);
    assert!(lines.iter().all(|line| line.contains(",1/2,None,")));
}

#[test]
fn test_board_folder_mapping_and_suffixes() {
    let workspace = Workspace::new();
    let board_dir = workspace.board.parent().unwrap().to_path_buf();
    fs::write(board_dir.join("parts.txt"), "3, F9, STM32F103C8Tx").unwrap();

    let options = Options {
        mapping_location: MappingLocation::BoardFolder,
        mapping_file_name: "parts.txt".to_string(),
        process_bottom_layer: false,
        top_layer_prefix: "F".to_string(),
        x_offset: -10.0,
        ..Options::default()
    };
    let (stats, _) = workspace.export(options);

    assert_eq!(stats.expect("export succeeds").mapping_file, board_dir.join("parts.txt"));
    assert!(!workspace.output("BOTTOM-COORDS").exists());
    let lines = data_lines(&workspace.output("F"));
    assert!(lines.contains(&"U1,3,F9,120.00,40.00,270.00,0.00,100,None,True,STM32F103C8Tx U1".to_string()));
}

#[test]
fn test_no_layers_selected() {
    let workspace = Workspace::new().with_mapping(DEMO_MAPPING);
    let options = Options {
        process_top_layer: false,
        process_bottom_layer: false,
        ..Options::default()
    };

    let (stats, buffer) = workspace.export(options);

    assert!(stats.expect("run completes").layers.is_empty());
    assert!(buffer.contains("No layer(s) selected."));
    assert!(!workspace.output("TOP-COORDS").exists());
}

#[test]
fn test_rerun_overwrites_previous_output() {
    let workspace = Workspace::new().with_mapping(DEMO_MAPPING);
    fs::write(workspace.output("TOP-COORDS"), "stale").unwrap();

    workspace.export(Options::default());

    let content = fs::read_to_string(workspace.output("TOP-COORDS")).unwrap();
    assert!(!content.contains("stale"));
}

#[test]
fn test_invalid_board_is_logged() {
    let workspace = Workspace::new();
    fs::write(&workspace.board, "(not_a_board)").unwrap();

    let (stats, buffer) = workspace.export(Options::default());

    assert!(stats.is_none());
    assert!(buffer.contains("Unhandled exception in export run"));
    let log = fs::read_to_string(workspace.plugin_dir.join("save_restore_error.log"))
        .expect("error log written");
    assert!(log.starts_with("ERROR: "));
}

#[test]
fn test_spawned_export_streams_activity() {
    let workspace = Workspace::new().with_mapping(DEMO_MAPPING);
    let (tx, rx) = std::sync::mpsc::channel::<String>();
    let activity = ActivityLog::new(Arc::new(tx), Verbosity::Minimal);

    let handle = exporter::spawn_export(
        workspace.board.clone(),
        Options {
            log_verbosity: 2,
            ..Options::default()
        },
        workspace.plugin_dir.clone(),
        activity,
    );
    let stats = handle.join().expect("worker finishes");

    assert_eq!(stats.expect("export succeeds").files_written(), 2);
    let lines: Vec<String> = rx.try_iter().collect();
    assert!(lines
        .iter()
        .any(|line| line == "Processing R1: Layer=F.Cu, Value='10k' - Mapped N:1, F:L1"));
}

#[test]
fn test_options_round_trip_through_store() {
    let workspace = Workspace::new();
    let store = OptionsStore::in_dir(&workspace.plugin_dir);
    let options = Options {
        mapping_location: MappingLocation::BoardFolder,
        log_verbosity: 1,
        ..Options::default()
    };

    store.save(&options).expect("options saved");
    let loaded = store.load();
    assert_eq!(loaded, options);

    let board = Board::load(&workspace.board).expect("board loads");
    let exporter = Exporter::new(board, loaded, workspace.plugin_dir.clone(), ActivityLog::silent());
    assert_eq!(
        exporter.mapping_file_path(),
        workspace.board.parent().unwrap().join("component_mapping.txt")
    );
}
