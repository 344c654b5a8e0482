//! Export run
//!
//! One run loads the mapping file, then classifies and writes the
//! coordinate file of each selected side in turn. Runs are started from
//! the CLI in the foreground or from the GUI on a background thread.

use crate::{
    activity::ActivityLog,
    board::{Board, Side},
    classify::{LayerPlan, LayerStats},
    editor,
    error::{QiheError, Result, ResultExt},
    log_file::ErrorLog,
    mapping::{self, ComponentMapping},
    options::{MappingLocation, Options},
    placement::{output_file_path, write_coords_file},
    progress::ProgressTracker,
};
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{error, info};

/// Outcome of one side
#[derive(Debug, Clone, PartialEq)]
pub struct LayerReport {
    pub side: Side,
    pub output: PathBuf,
    pub stats: LayerStats,
    pub written: bool,
}

/// Statistics about an export run
#[derive(Debug, Clone, Default)]
pub struct ExportStats {
    pub mapping_file: PathBuf,
    pub layers: Vec<LayerReport>,
}

impl ExportStats {
    pub fn files_written(&self) -> usize {
        self.layers.iter().filter(|layer| layer.written).count()
    }
}

/// The export engine for one board
pub struct Exporter {
    board: Board,
    options: Options,
    plugin_dir: PathBuf,
    activity: ActivityLog,
    progress_tracker: ProgressTracker,
    error_log: ErrorLog,
}

impl Exporter {
    /// Create an exporter; the activity verbosity follows `options`
    pub fn new(board: Board, options: Options, plugin_dir: PathBuf, activity: ActivityLog) -> Self {
        let activity = activity.with_verbosity(options.verbosity());
        let error_log = ErrorLog::in_dir(&plugin_dir);

        Self {
            board,
            options,
            plugin_dir,
            activity,
            progress_tracker: ProgressTracker::new(false),
            error_log,
        }
    }

    /// Show a spinner per side while writing
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress_tracker = ProgressTracker::new(enabled);
        self
    }

    pub fn mapping_file_path(&self) -> PathBuf {
        self.options
            .mapping_file_path(&self.plugin_dir, self.board.file_name())
    }

    /// Run the complete export
    pub fn run(&self) -> Result<ExportStats> {
        let start = Instant::now();
        self.activity.info("Starting export run");
        self.activity.info("Board loaded successfully.");

        let mapping_file = self.mapping_file_path();
        self.activity.info(format!(
            "Using component mapping file at: {}",
            mapping_file.display()
        ));

        let mapping = ComponentMapping::load_or_create(&mapping_file, &self.activity)
            .context("Failed to load component mapping")?;

        let mut stats = ExportStats {
            mapping_file,
            layers: Vec::new(),
        };

        let sides = self.options.selected_sides();
        if sides.is_empty() {
            self.activity.info("No layer(s) selected.");
            return Ok(stats);
        }

        self.activity.info("Generating QIHE files:");
        for side in sides {
            stats.layers.push(self.export_side(side, &mapping)?);
        }

        info!("Export completed in {} ms", start.elapsed().as_millis());
        Ok(stats)
    }

    /// Run the export, recording any failure instead of returning it
    pub fn run_guarded(&self) -> Option<ExportStats> {
        match self.run() {
            Ok(stats) => Some(stats),
            Err(e) => {
                report_failure(&self.error_log, &self.activity, "Unhandled exception in export run", &e);
                None
            }
        }
    }

    /// Classify and write one side. A write failure is reported and does
    /// not stop the remaining sides.
    fn export_side(&self, side: Side, mapping: &ComponentMapping) -> Result<LayerReport> {
        let output = output_file_path(&self.board, self.options.suffix(side))
            .with_layer_context(side.label())?;

        let progress = self
            .progress_tracker
            .create_spinner(&format!("Writing {}...", side.label()));

        let plan = LayerPlan::build(&self.board, side, mapping, &self.activity);
        let rows = plan.rows(mapping, self.options.offset());
        let stats = plan.stats();

        let written = match write_coords_file(&output, &rows) {
            Ok(()) => {
                ProgressTracker::finish_progress(progress, &format!("{} written", side.label()));
                self.report_stats(side, &stats);
                self.activity.info(format!(
                    "Successfully written to file: {}",
                    output.display()
                ));
                self.activity.info(match side {
                    Side::Top => "Processed top layer.",
                    Side::Bottom => "Processed bottom layer.",
                });
                true
            }
            Err(e) => {
                ProgressTracker::finish_with_error(progress, &format!("{} failed", side.label()));
                let context = format!("Error writing to file {}", output.display());
                report_failure(&self.error_log, &self.activity, &context, &e);
                false
            }
        };

        Ok(LayerReport {
            side,
            output,
            stats,
            written,
        })
    }

    fn report_stats(&self, side: Side, stats: &LayerStats) {
        self.activity.info("###########################");
        self.activity.info(format!("{}:", side.label()));
        self.activity
            .info(format!("- Total components: {}", stats.total));
        self.activity
            .info(format!("- Mapped components: {}", stats.mapped));
        self.activity
            .info(format!("- Priority components: {}", stats.priority));
        self.activity.info(format!(
            "- Excluded (pattern/attribute): {} / {}",
            stats.excluded_by_pattern, stats.excluded_by_attribute
        ));
        self.activity
            .info(format!("- Unmapped components: {}", stats.unmapped));
    }
}

fn report_failure(error_log: &ErrorLog, activity: &ActivityLog, context: &str, err: &anyhow::Error) {
    error!("{}: {:#}", context, err);
    error_log.record_error(context, err);
    activity.warn(format!("{}: {:#}", context, err));
}

/// Load the board and run a guarded export in the calling thread
pub fn export_board(
    board_path: &Path,
    options: Options,
    plugin_dir: PathBuf,
    activity: ActivityLog,
    show_progress: bool,
) -> Option<ExportStats> {
    let board = match Board::load(board_path) {
        Ok(board) => board,
        Err(e) => {
            let error_log = ErrorLog::in_dir(&plugin_dir);
            activity.warn("No board could be loaded. Please select a saved KiCad board file.");
            report_failure(&error_log, &activity, "Unhandled exception in export run", &e);
            return None;
        }
    };

    Exporter::new(board, options, plugin_dir, activity)
        .with_progress(show_progress)
        .run_guarded()
}

/// Run `export_board` on a background thread
pub fn spawn_export(
    board_path: PathBuf,
    options: Options,
    plugin_dir: PathBuf,
    activity: ActivityLog,
) -> JoinHandle<Option<ExportStats>> {
    thread::spawn(move || export_board(&board_path, options, plugin_dir, activity, false))
}

/// Mapping file for the actions that work without an export run. The
/// board folder location needs a board to resolve against.
fn mapping_file_for(
    options: &Options,
    plugin_dir: &Path,
    board_path: Option<&Path>,
    activity: &ActivityLog,
) -> Result<PathBuf> {
    match (options.mapping_location, board_path) {
        (MappingLocation::BoardFolder, None) => {
            activity.info("Please select a KiCad board file first.");
            Err(QiheError::NoBoardSelected.into())
        }
        (_, board_path) => {
            let board_path = board_path.unwrap_or_else(|| Path::new(""));
            Ok(options.mapping_file_path(plugin_dir, board_path))
        }
    }
}

/// Force-write the default mapping template (the "Gen Mapping" action)
pub fn regenerate_mapping(
    options: &Options,
    plugin_dir: &Path,
    board_path: Option<&Path>,
    activity: &ActivityLog,
) -> Result<PathBuf> {
    let path = mapping_file_for(options, plugin_dir, board_path, activity)?;
    match mapping::write_default_template(&path) {
        Ok(()) => {
            activity.info(format!("Default mapping file created: {}", path.display()));
            Ok(path)
        }
        Err(e) => {
            report_failure(
                &ErrorLog::in_dir(plugin_dir),
                activity,
                "Error creating mapping file",
                &e,
            );
            Err(e)
        }
    }
}

/// Open the configured mapping file in the system editor (the "Edit" action)
pub fn edit_mapping(
    options: &Options,
    plugin_dir: &Path,
    board_path: Option<&Path>,
    activity: &ActivityLog,
) -> Result<()> {
    let path = mapping_file_for(options, plugin_dir, board_path, activity)?;
    match editor::open_in_editor(&path) {
        Ok(()) => {
            activity.info(format!("File opened for editing: {}", path.display()));
            Ok(())
        }
        Err(e) => {
            if let Some(QiheError::MappingFileMissing { .. }) = e.downcast_ref::<QiheError>() {
                activity.info(format!("File does not exist: {}", path.display()));
                activity.info(
                    "Please create a mapping file first. Click \"Gen Mapping\" and/or check the mapping file location and name.",
                );
            } else {
                activity.warn(format!("Failed to open file: {:#}", e));
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityBuffer, Verbosity};
    use crate::board::{Footprint, Layer};
    use crate::mapping::DEFAULT_MAPPING_FILE_NAME;
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn exporter_in(dir: &Path, options: Options) -> (Exporter, Arc<ActivityBuffer>) {
        let buffer = Arc::new(ActivityBuffer::new());
        let board = Board::new(
            dir.join("demo.kicad_pcb"),
            vec![
                Footprint::new("R1", "10k", Layer::FrontCopper).at_mm(10.0, 20.0, 90.0),
                Footprint::new("C1", "100nF", Layer::BackCopper).at_mm(5.0, 5.0, 0.0),
            ],
        );
        let exporter = Exporter::new(
            board,
            options,
            dir.join("plugin"),
            ActivityLog::new(buffer.clone(), Verbosity::Minimal),
        );
        (exporter, buffer)
    }

    #[test]
    fn test_activity_verbosity_follows_options() {
        let dir = tempdir().expect("Failed to create temp dir");
        let options = Options {
            log_verbosity: 2,
            ..Options::default()
        };
        let (exporter, _) = exporter_in(dir.path(), options);
        assert_eq!(exporter.activity.verbosity(), Verbosity::Verbose);
    }

    #[test]
    fn test_mapping_file_location() {
        let dir = tempdir().expect("Failed to create temp dir");
        let options = Options {
            mapping_location: MappingLocation::BoardFolder,
            ..Options::default()
        };
        let (exporter, _) = exporter_in(dir.path(), options);
        assert_eq!(
            exporter.mapping_file_path(),
            dir.path().join("component_mapping.txt")
        );
    }

    #[test]
    fn test_run_writes_both_sides() {
        let dir = tempdir().expect("Failed to create temp dir");
        let (exporter, buffer) = exporter_in(dir.path(), Options::default());

        let stats = exporter.run().expect("run succeeds");

        assert_eq!(stats.files_written(), 2);
        assert!(dir.path().join("demo_TOP-COORDS.csv").exists());
        assert!(dir.path().join("demo_BOTTOM-COORDS.csv").exists());
        assert!(dir.path().join("plugin").join("component_mapping.txt").exists());
        assert!(buffer.contains("Processed top layer."));
        assert!(buffer.contains("Processed bottom layer."));
    }

    #[test]
    fn test_no_layers_selected() {
        let dir = tempdir().expect("Failed to create temp dir");
        let options = Options {
            process_top_layer: false,
            process_bottom_layer: false,
            ..Options::default()
        };
        let (exporter, buffer) = exporter_in(dir.path(), options);

        let stats = exporter.run().expect("run succeeds");

        assert!(stats.layers.is_empty());
        assert!(buffer.contains("No layer(s) selected."));
        assert!(!dir.path().join("demo_TOP-COORDS.csv").exists());
    }

    #[test]
    fn test_write_failure_does_not_stop_other_side() {
        let dir = tempdir().expect("Failed to create temp dir");
        // a directory where the top file should go makes that write fail
        fs::create_dir(dir.path().join("demo_TOP-COORDS.csv")).unwrap();
        let (exporter, buffer) = exporter_in(dir.path(), Options::default());

        let stats = exporter.run().expect("run continues");

        assert!(!stats.layers[0].written);
        assert!(stats.layers[1].written);
        assert!(buffer.contains("Error writing to file"));
        let log = fs::read_to_string(dir.path().join("plugin").join("save_restore_error.log"))
            .expect("error log written");
        assert!(log.starts_with("ERROR: Error writing to file"));
    }

    #[test]
    fn test_guarded_run_records_failure() {
        let dir = tempdir().expect("Failed to create temp dir");
        // the mapping path is a directory, so it exists but cannot be read
        fs::create_dir_all(dir.path().join("plugin").join("component_mapping.txt")).unwrap();
        let (exporter, buffer) = exporter_in(dir.path(), Options::default());

        assert!(exporter.run_guarded().is_none());
        assert!(buffer.contains("Unhandled exception in export run"));
        assert!(dir.path().join("plugin").join("save_restore_error.log").exists());
    }

    #[test]
    fn test_export_board_reports_missing_board() {
        let dir = tempdir().expect("Failed to create temp dir");
        let buffer = Arc::new(ActivityBuffer::new());

        let result = export_board(
            &dir.path().join("missing.kicad_pcb"),
            Options::default(),
            dir.path().to_path_buf(),
            ActivityLog::new(buffer.clone(), Verbosity::Minimal),
            false,
        );

        assert!(result.is_none());
        assert!(buffer.contains("No board could be loaded"));
    }

    #[test]
    fn test_edit_mapping_reports_missing_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        let buffer = Arc::new(ActivityBuffer::new());
        let activity = ActivityLog::new(buffer.clone(), Verbosity::Minimal);

        let result = edit_mapping(
            &Options::default(),
            dir.path(),
            Some(dir.path().join("demo.kicad_pcb").as_path()),
            &activity,
        );

        assert!(result.is_err());
        assert!(buffer.contains("File does not exist"));
        assert!(buffer.contains("Gen Mapping"));
    }

    #[test]
    fn test_regenerate_mapping_overwrites() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("component_mapping.txt");
        fs::write(&path, "1, L1, 10k").unwrap();

        let written = regenerate_mapping(
            &Options::default(),
            dir.path(),
            Some(dir.path().join("demo.kicad_pcb").as_path()),
            &ActivityLog::silent(),
        )
        .expect("template written");

        assert_eq!(written, path);
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with('#'));
        assert!(!content.lines().any(|line| line == "1, L1, 10k"));
    }

    #[test]
    fn test_board_folder_actions_need_a_board() {
        let dir = tempdir().expect("Failed to create temp dir");
        let buffer = Arc::new(ActivityBuffer::new());
        let activity = ActivityLog::new(buffer.clone(), Verbosity::Minimal);
        let options = Options {
            mapping_location: MappingLocation::BoardFolder,
            ..Options::default()
        };

        let generated = regenerate_mapping(&options, dir.path(), None, &activity);
        let edited = edit_mapping(&options, dir.path(), None, &activity);

        for err in [generated.unwrap_err(), edited.unwrap_err()] {
            assert!(matches!(
                err.downcast_ref::<QiheError>(),
                Some(QiheError::NoBoardSelected)
            ));
        }
        assert!(buffer.contains("Please select a KiCad board file first."));
        assert!(!buffer.contains("Default mapping file created"));
        assert!(!dir.path().join(DEFAULT_MAPPING_FILE_NAME).exists());
    }

    #[test]
    fn test_plugin_folder_actions_work_without_a_board() {
        let dir = tempdir().expect("Failed to create temp dir");

        let written = regenerate_mapping(&Options::default(), dir.path(), None, &ActivityLog::silent())
            .expect("template written");

        assert_eq!(written, dir.path().join(DEFAULT_MAPPING_FILE_NAME));
        assert!(written.exists());
    }
}
