//! ki-qihe - Export KiCad footprint placements for QIHE pick-and-place machines

use ki_qihe::{
    activity::{ActivityLog, ConsoleSink},
    config::{Action, Config},
    exporter,
    options::OptionsStore,
};
use std::sync::Arc;
use tracing::{error, info};

fn main() {
    // Parse configuration and initialize logging
    let config = Config::from_args().unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    let store = OptionsStore::in_dir(&config.plugin_dir);
    let options = config.resolve_options(store.load());

    if config.save_options {
        if let Err(e) = store.save(&options) {
            error!("Saving options failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
        println!("Settings saved to {}", store.path().display());
    }

    let activity = ActivityLog::new(Arc::new(ConsoleSink), options.verbosity());

    let board = Some(config.board.as_path());
    let succeeded = match config.action {
        Action::Export => {
            info!("Starting export of {}", config.board.display());
            exporter::export_board(
                &config.board,
                options,
                config.plugin_dir.clone(),
                activity,
                !config.no_progress,
            )
            .is_some()
        }
        Action::GenerateMapping => {
            exporter::regenerate_mapping(&options, &config.plugin_dir, board, &activity)
                .is_ok()
        }
        Action::EditMapping => {
            exporter::edit_mapping(&options, &config.plugin_dir, board, &activity)
                .is_ok()
        }
    };

    if !succeeded {
        std::process::exit(1);
    }
}
