//! Persisted dialog options
//!
//! Options live in a JSON file in the plugin directory. Loading never
//! fails: a missing file is replaced by the defaults, an unreadable one is
//! ignored, and any key the file lacks keeps its default value.

use crate::activity::Verbosity;
use crate::board::Side;
use crate::error::{QiheError, Result, ResultExt};
use crate::mapping::DEFAULT_MAPPING_FILE_NAME;
use crate::placement::Offset;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const OPTIONS_FILE_NAME: &str = "ki-qihe-options.json";
pub const DEFAULT_TOP_SUFFIX: &str = "TOP-COORDS";
pub const DEFAULT_BOTTOM_SUFFIX: &str = "BOTTOM-COORDS";

/// Where the mapping file is looked up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MappingLocation {
    /// Stored as 0
    #[default]
    PluginFolder,
    /// Stored as 1, next to the board file
    BoardFolder,
}

impl TryFrom<u8> for MappingLocation {
    type Error = QiheError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(MappingLocation::PluginFolder),
            1 => Ok(MappingLocation::BoardFolder),
            other => Err(QiheError::InvalidMappingLocation {
                value: other.to_string(),
            }),
        }
    }
}

impl From<MappingLocation> for u8 {
    fn from(location: MappingLocation) -> Self {
        match location {
            MappingLocation::PluginFolder => 0,
            MappingLocation::BoardFolder => 1,
        }
    }
}

impl MappingLocation {
    pub fn label(self) -> &'static str {
        match self {
            MappingLocation::PluginFolder => "Plugin folder",
            MappingLocation::BoardFolder => "PCB folder",
        }
    }
}

/// Everything an export run needs to know, fixed for the whole run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Options {
    pub mapping_location: MappingLocation,
    pub process_top_layer: bool,
    pub process_bottom_layer: bool,
    pub top_layer_prefix: String,
    pub bottom_layer_prefix: String,
    pub log_verbosity: u8,
    #[serde(rename = "ComponentMapping")]
    pub mapping_file_name: String,
    #[serde(rename = "X_Offset")]
    pub x_offset: f64,
    #[serde(rename = "Y_Offset")]
    pub y_offset: f64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            mapping_location: MappingLocation::PluginFolder,
            process_top_layer: true,
            process_bottom_layer: true,
            top_layer_prefix: DEFAULT_TOP_SUFFIX.to_string(),
            bottom_layer_prefix: DEFAULT_BOTTOM_SUFFIX.to_string(),
            log_verbosity: 0,
            mapping_file_name: DEFAULT_MAPPING_FILE_NAME.to_string(),
            x_offset: 0.0,
            y_offset: 0.0,
        }
    }
}

impl Options {
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_level(self.log_verbosity)
    }

    pub fn offset(&self) -> Offset {
        Offset {
            x: self.x_offset,
            y: self.y_offset,
        }
    }

    /// Sides to export, top first
    pub fn selected_sides(&self) -> Vec<Side> {
        let mut sides = Vec::new();
        if self.process_top_layer {
            sides.push(Side::Top);
        }
        if self.process_bottom_layer {
            sides.push(Side::Bottom);
        }
        sides
    }

    pub fn suffix(&self, side: Side) -> &str {
        match side {
            Side::Top => &self.top_layer_prefix,
            Side::Bottom => &self.bottom_layer_prefix,
        }
    }

    /// Mapping file path for the selected location
    pub fn mapping_file_path(&self, plugin_dir: &Path, board_path: &Path) -> PathBuf {
        let base = match self.mapping_location {
            MappingLocation::PluginFolder => plugin_dir.to_path_buf(),
            MappingLocation::BoardFolder => match board_path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            },
        };
        base.join(&self.mapping_file_name)
    }
}

/// Options file in the plugin directory
#[derive(Debug, Clone)]
pub struct OptionsStore {
    path: PathBuf,
}

impl OptionsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(plugin_dir: &Path) -> Self {
        Self::new(plugin_dir.join(OPTIONS_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load stored options merged over the defaults
    pub fn load(&self) -> Options {
        match self.read_stored() {
            Ok(Some(stored)) => merge_over_defaults(stored).unwrap_or_else(|e| {
                warn!("Ignoring options in {}: {}", self.path.display(), e);
                Options::default()
            }),
            Ok(None) => {
                info!("No options file at {}, creating defaults", self.path.display());
                let defaults = Options::default();
                if let Err(e) = self.save(&defaults) {
                    warn!("Could not write default options: {:#}", e);
                }
                defaults
            }
            Err(e) => {
                warn!("Could not read options, using defaults: {:#}", e);
                Options::default()
            }
        }
    }

    /// Raw JSON of the options file, `None` when there is no file
    fn read_stored(&self) -> Result<Option<Value>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_path_context("read options", &self.path),
        };
        let value: Value =
            serde_json::from_str(&content).with_path_context("decode options", &self.path)?;
        Ok(Some(value))
    }

    /// Write options as indented JSON
    pub fn save(&self, options: &Options) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_path_context("create options directory", parent)?;
        }

        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        options.serialize(&mut serializer)?;

        fs::write(&self.path, out).with_path_context("write options", &self.path)?;
        debug!("Options saved to {}", self.path.display());
        Ok(())
    }
}

/// Overlay stored keys on the defaults table, key by key
fn merge_over_defaults(stored: Value) -> Result<Options> {
    let mut merged = serde_json::to_value(Options::default())?;
    match (merged.as_object_mut(), stored) {
        (Some(defaults), Value::Object(stored)) => {
            for (key, value) in stored {
                defaults.insert(key, value);
            }
        }
        (_, other) => anyhow::bail!("expected a JSON object, found {}", other),
    }
    Ok(serde_json::from_value(merged)?)
}
