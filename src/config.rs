//! Configuration management for ki-qihe
//!
//! This module handles CLI argument parsing. Stored options are loaded
//! separately; command-line flags only override them for one invocation
//! unless `--save-options` is given.

use crate::options::{MappingLocation, Options};
use anyhow::{anyhow, Result};
use clap::builder::styling;
use clap::{value_parser, Arg, ArgAction, ArgMatches, ColorChoice, Command};
use std::path::PathBuf;
use tracing::info;

const APP_DIR_NAME: &str = "ki-qihe";

/// Build the CLI command
pub fn build_cli() -> Command {
    let styles = styling::Styles::styled()
        .header(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .usage(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .literal(styling::AnsiColor::Blue.on_default() | styling::Effects::BOLD)
        .placeholder(styling::AnsiColor::Cyan.on_default());

    Command::new("ki-qihe")
        .about("ki-qihe - Export KiCad placements as QIHE pick-and-place files")
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("board_pos")
                .value_name("BOARD")
                .help("KiCad board file (.kicad_pcb)")
                .value_parser(value_parser!(PathBuf))
                .conflicts_with("board"),
        )
        .arg(
            Arg::new("board")
                .short('b')
                .long("board")
                .help("KiCad board file (.kicad_pcb)")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("plugin_dir")
                .long("plugin-dir")
                .help("Directory holding the options file, error log and default mapping")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("top")
                .long("top")
                .help("Export the top layer (with --bottom, selects exactly the given layers)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("bottom")
                .long("bottom")
                .help("Export the bottom layer (with --top, selects exactly the given layers)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("top_suffix")
                .long("top-suffix")
                .help("File name suffix for the top layer coordinates")
                .value_parser(value_parser!(String)),
        )
        .arg(
            Arg::new("bottom_suffix")
                .long("bottom-suffix")
                .help("File name suffix for the bottom layer coordinates")
                .value_parser(value_parser!(String)),
        )
        .arg(
            Arg::new("mapping_location")
                .long("mapping-location")
                .help("Where the mapping file is looked up")
                .value_parser(["plugin", "board"]),
        )
        .arg(
            Arg::new("mapping_file")
                .long("mapping-file")
                .help("Mapping file name")
                .value_parser(value_parser!(String)),
        )
        .arg(
            Arg::new("x_offset")
                .long("x-offset")
                .help("Millimetres added to every X coordinate")
                .allow_negative_numbers(true)
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("y_offset")
                .long("y-offset")
                .help("Millimetres added to every Y coordinate")
                .allow_negative_numbers(true)
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("log_verbosity")
                .long("log-verbosity")
                .help("Activity log detail (0 minimal, 1 normal, 2 verbose, 3 debug)")
                .value_parser(value_parser!(u8).range(0..=3)),
        )
        .arg(
            Arg::new("gen_mapping")
                .long("gen-mapping")
                .help("Write the default mapping template, replacing the existing file")
                .action(ArgAction::SetTrue)
                .conflicts_with("edit_mapping"),
        )
        .arg(
            Arg::new("edit_mapping")
                .long("edit-mapping")
                .help("Open the mapping file in the system editor")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("save_options")
                .long("save-options")
                .help("Persist the effective options before running")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no_progress")
                .long("no-progress")
                .help("Disable progress indicators")
                .action(ArgAction::SetTrue),
        )
}

/// What the invocation should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Export,
    GenerateMapping,
    EditMapping,
}

/// Option values given on the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionOverrides {
    pub top: bool,
    pub bottom: bool,
    pub top_suffix: Option<String>,
    pub bottom_suffix: Option<String>,
    pub mapping_location: Option<MappingLocation>,
    pub mapping_file: Option<String>,
    pub x_offset: Option<f64>,
    pub y_offset: Option<f64>,
    pub log_verbosity: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Board file to export
    pub board: PathBuf,

    /// Directory for options, error log and the default mapping file
    pub plugin_dir: PathBuf,

    pub action: Action,

    pub overrides: OptionOverrides,

    /// Persist the effective options
    pub save_options: bool,

    /// Enable verbose logging
    pub verbose: bool,

    /// Disable progress bars
    pub no_progress: bool,
}

impl Config {
    /// Parse arguments and apply initial configuration
    pub fn from_args() -> Result<Self> {
        let matches = build_cli().get_matches();
        let config = Self::from_arg_matches(&matches)?;

        // Set up tracing with environment variable support
        // RUST_LOG takes precedence over verbose flag
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(if config.verbose { "info" } else { "off" })
        });

        tracing_subscriber::fmt().with_env_filter(env_filter).init();

        if config.verbose {
            info!("Configuration: {:?}", config);
        }

        Ok(config)
    }

    pub fn from_arg_matches(matches: &ArgMatches) -> Result<Self> {
        let board = matches
            .get_one::<PathBuf>("board")
            .or_else(|| matches.get_one::<PathBuf>("board_pos"))
            .cloned()
            .ok_or_else(|| anyhow!("A board file is required"))?;

        let plugin_dir = matches
            .get_one::<PathBuf>("plugin_dir")
            .cloned()
            .unwrap_or_else(default_plugin_dir);

        let action = if matches.get_flag("gen_mapping") {
            Action::GenerateMapping
        } else if matches.get_flag("edit_mapping") {
            Action::EditMapping
        } else {
            Action::Export
        };

        let mapping_location = matches
            .get_one::<String>("mapping_location")
            .map(|location| match location.as_str() {
                "board" => MappingLocation::BoardFolder,
                _ => MappingLocation::PluginFolder,
            });

        let overrides = OptionOverrides {
            top: matches.get_flag("top"),
            bottom: matches.get_flag("bottom"),
            top_suffix: matches.get_one::<String>("top_suffix").cloned(),
            bottom_suffix: matches.get_one::<String>("bottom_suffix").cloned(),
            mapping_location,
            mapping_file: matches.get_one::<String>("mapping_file").cloned(),
            x_offset: matches.get_one::<f64>("x_offset").copied(),
            y_offset: matches.get_one::<f64>("y_offset").copied(),
            log_verbosity: matches.get_one::<u8>("log_verbosity").copied(),
        };

        Ok(Config {
            board,
            plugin_dir,
            action,
            overrides,
            save_options: matches.get_flag("save_options"),
            verbose: matches.get_flag("verbose"),
            no_progress: matches.get_flag("no_progress"),
        })
    }

    /// Apply command-line overrides on top of the stored options
    pub fn resolve_options(&self, stored: Options) -> Options {
        let overrides = &self.overrides;
        let mut options = stored;

        if overrides.top || overrides.bottom {
            options.process_top_layer = overrides.top;
            options.process_bottom_layer = overrides.bottom;
        }
        if let Some(suffix) = &overrides.top_suffix {
            options.top_layer_prefix = suffix.clone();
        }
        if let Some(suffix) = &overrides.bottom_suffix {
            options.bottom_layer_prefix = suffix.clone();
        }
        if let Some(location) = overrides.mapping_location {
            options.mapping_location = location;
        }
        if let Some(name) = &overrides.mapping_file {
            options.mapping_file_name = name.clone();
        }
        if let Some(x) = overrides.x_offset {
            options.x_offset = x;
        }
        if let Some(y) = overrides.y_offset {
            options.y_offset = y;
        }
        if let Some(level) = overrides.log_verbosity {
            options.log_verbosity = level;
        }
        options
    }
}

/// Per-user configuration directory, else the directory of the executable
pub fn default_plugin_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .or_else(|| {
            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(PathBuf::from))
        })
        .unwrap_or_else(|| PathBuf::from("."))
}
