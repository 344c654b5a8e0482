//! Component mapping file
//!
//! The mapping file is a small line-oriented text file maintained by the
//! user. Comment lines start with `#`; data lines are `tag, param, values`
//! where `values` is a colon-separated list:
//!
//! - `E, , NC:TP` adds exclusion patterns,
//! - `P, , FIDUCIAL` adds priority patterns,
//! - `1, L1, 0n1:100nF` maps each component value to nozzle `1`, feeder `L1`.
//!
//! Patterns are regular expressions searched case-insensitively in the
//! footprint value. The file is re-read at the start of every run.

use crate::activity::{ActivityLog, Verbosity};
use crate::error::{QiheError, Result, ResultExt};
use regex::{Regex, RegexBuilder};
use rust_embed::RustEmbed;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

pub const DEFAULT_MAPPING_FILE_NAME: &str = "component_mapping.txt";

const TEMPLATE_NAME: &str = "component_mapping.txt";
const EXCLUDE_TAG: &str = "E";
const PRIORITY_TAG: &str = "P";

#[derive(RustEmbed)]
#[folder = "Assets/"]
struct Asset;

/// Nozzle and feeder slot a component value is placed from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub nozzle: String,
    pub stack: String,
}

impl Placement {
    pub fn new(nozzle: &str, stack: &str) -> Self {
        Self {
            nozzle: nozzle.to_string(),
            stack: stack.to_string(),
        }
    }

    /// Placeholder for values missing from the mapping table
    pub fn unmapped() -> Self {
        Self::new("1/2", "None")
    }
}

/// A value pattern as written in the mapping file, with its compiled form
#[derive(Debug, Clone)]
pub struct ValuePattern {
    source: String,
    regex: Regex,
}

impl ValuePattern {
    pub fn new(source: &str) -> std::result::Result<Self, regex::Error> {
        let regex = RegexBuilder::new(source).case_insensitive(true).build()?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Unanchored search anywhere in `value`
    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

/// Parsed mapping file: value table plus exclusion and priority patterns
#[derive(Debug, Clone, Default)]
pub struct ComponentMapping {
    entries: HashMap<String, Placement>,
    exclude: Vec<ValuePattern>,
    priority: Vec<ValuePattern>,
}

impl ComponentMapping {
    /// Parse mapping file text
    pub fn parse(content: &str, activity: &ActivityLog) -> Self {
        let mut mapping = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let parts: Vec<&str> = line.split(',').collect();
            if parts.len() < 3 {
                debug!("Skipping malformed mapping line: {}", line);
                continue;
            }
            let (tag, param, values) = (parts[0].trim(), parts[1].trim(), parts[2].trim());

            match tag {
                EXCLUDE_TAG => {
                    push_patterns(&mut mapping.exclude, values, activity);
                    activity.detail(Verbosity::Normal, || {
                        format!("Exclusion patterns loaded: {}", values)
                    });
                }
                PRIORITY_TAG => {
                    push_patterns(&mut mapping.priority, values, activity);
                    activity.detail(Verbosity::Normal, || {
                        format!("Priority patterns loaded: {}", values)
                    });
                }
                nozzle => {
                    for component in values.split(':') {
                        let component = component.trim();
                        // Later definitions of the same value replace earlier ones
                        mapping
                            .entries
                            .insert(component.to_string(), Placement::new(nozzle, param));
                        activity.detail(Verbosity::Normal, || {
                            format!(
                                "Component mapping loaded for: {} as {} in {}",
                                component, nozzle, param
                            )
                        });
                    }
                }
            }
        }

        activity.detail(Verbosity::Normal, || {
            format!(
                "Final mapping content: {} values, {} exclusion and {} priority patterns",
                mapping.entries.len(),
                mapping.exclude.len(),
                mapping.priority.len()
            )
        });
        mapping
    }

    /// Read and parse an existing mapping file
    pub fn load(path: &Path, activity: &ActivityLog) -> Result<Self> {
        let content = fs::read_to_string(path).with_path_context("read mapping", path)?;
        Ok(Self::parse(&content, activity))
    }

    /// Read the mapping file, writing the default template first when it is absent
    pub fn load_or_create(path: &Path, activity: &ActivityLog) -> Result<Self> {
        if !path.exists() {
            write_default_template(path)?;
            activity.info(format!("Default mapping file created: {}", path.display()));
        }
        Self::load(path, activity)
    }

    pub fn placement(&self, value: &str) -> Option<&Placement> {
        self.entries.get(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn exclude_patterns(&self) -> &[ValuePattern] {
        &self.exclude
    }

    pub fn priority_patterns(&self) -> &[ValuePattern] {
        &self.priority
    }

    /// First exclusion pattern found in `value`, in file order
    pub fn matching_exclusion(&self, value: &str) -> Option<&ValuePattern> {
        self.exclude.iter().find(|pattern| pattern.is_match(value))
    }

    /// First priority pattern found in `value`, in file order
    pub fn matching_priority(&self, value: &str) -> Option<&ValuePattern> {
        self.priority.iter().find(|pattern| pattern.is_match(value))
    }
}

fn push_patterns(list: &mut Vec<ValuePattern>, values: &str, activity: &ActivityLog) {
    for source in values.split(':') {
        match ValuePattern::new(source) {
            Ok(pattern) => list.push(pattern),
            Err(e) => {
                warn!("Invalid regex pattern {:?}: {}", source, e);
                activity.warn(format!("Ignoring invalid pattern '{}': {}", source, e));
            }
        }
    }
}

/// The mapping template shipped with the crate
pub fn default_template() -> Result<String> {
    let asset = Asset::get(TEMPLATE_NAME).ok_or(QiheError::MissingTemplate)?;
    Ok(String::from_utf8_lossy(asset.data.as_ref()).into_owned())
}

/// Write the default template to `path`, replacing any existing file
pub fn write_default_template(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_path_context("create mapping directory", parent)?;
    }
    fs::write(path, default_template()?).with_path_context("write default mapping", path)?;
    debug!("Default mapping template written to {}", path.display());
    Ok(())
}
