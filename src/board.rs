//! Read-only footprint model of a KiCad board
//!
//! This is the subset of the board the exporter needs: reference, value,
//! position, orientation, copper side and the exclusion attributes of
//! every footprint. Boards are either loaded from a saved `.kicad_pcb`
//! file or built in memory.

use crate::error::{QiheError, Result, ResultExt};
use crate::sexpr::{self, Sexpr};
use anyhow::Context;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// KiCad's internal length unit is the nanometre
pub const NM_PER_MM: f64 = 1_000_000.0;

/// Copper layer a footprint is placed on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Layer {
    FrontCopper,
    BackCopper,
    Other(String),
}

impl Layer {
    pub fn from_name(name: &str) -> Self {
        match name {
            "F.Cu" => Layer::FrontCopper,
            "B.Cu" => Layer::BackCopper,
            other => Layer::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Layer::FrontCopper => "F.Cu",
            Layer::BackCopper => "B.Cu",
            Layer::Other(name) => name,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Board side a coordinate file is generated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Top,
    Bottom,
}

impl Side {
    pub fn layer(self) -> Layer {
        match self {
            Side::Top => Layer::FrontCopper,
            Side::Bottom => Layer::BackCopper,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::Top => "Top layer",
            Side::Bottom => "Bottom layer",
        }
    }
}

/// Fabrication attributes that keep a footprint out of placement files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FootprintAttributes {
    pub exclude_from_pos_files: bool,
    pub exclude_from_bom: bool,
}

impl FootprintAttributes {
    pub fn excludes_from_placement(&self) -> bool {
        self.exclude_from_pos_files || self.exclude_from_bom
    }
}

/// Footprint position in nanometres
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

impl Position {
    pub fn from_mm(x: f64, y: f64) -> Self {
        Self {
            x: (x * NM_PER_MM).round() as i64,
            y: (y * NM_PER_MM).round() as i64,
        }
    }
}

/// A placed component instance
#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    pub reference: String,
    pub value: String,
    pub position: Position,
    /// Orientation in degrees, as stored by KiCad
    pub orientation: f64,
    pub layer: Layer,
    pub attributes: FootprintAttributes,
}

impl Footprint {
    /// Create a footprint with no exclusion attributes
    pub fn new(reference: &str, value: &str, layer: Layer) -> Self {
        Self {
            reference: reference.to_string(),
            value: value.to_string(),
            position: Position::default(),
            orientation: 0.0,
            layer,
            attributes: FootprintAttributes::default(),
        }
    }

    pub fn at_mm(mut self, x: f64, y: f64, orientation: f64) -> Self {
        self.position = Position::from_mm(x, y);
        self.orientation = orientation;
        self
    }

    pub fn with_attributes(mut self, attributes: FootprintAttributes) -> Self {
        self.attributes = attributes;
        self
    }
}

/// A loaded board and its footprints
#[derive(Debug, Clone)]
pub struct Board {
    file_name: PathBuf,
    footprints: Vec<Footprint>,
}

impl Board {
    pub fn new(file_name: impl Into<PathBuf>, footprints: Vec<Footprint>) -> Self {
        Self {
            file_name: file_name.into(),
            footprints,
        }
    }

    /// Load a `.kicad_pcb` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).with_path_context("read board", path)?;
        let footprints = parse_footprints(&content)
            .with_context(|| format!("Failed to parse board: {}", path.display()))?;

        info!(
            "Loaded {} footprints from {}",
            footprints.len(),
            path.display()
        );
        Ok(Self::new(path, footprints))
    }

    pub fn file_name(&self) -> &Path {
        &self.file_name
    }

    pub fn footprints(&self) -> &[Footprint] {
        &self.footprints
    }

    /// Board file name without directory or extension
    pub fn base_name(&self) -> Result<String> {
        self.file_name
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                QiheError::UnnamedBoard {
                    path: self.file_name.display().to_string(),
                }
                .into()
            })
    }

    /// Directory holding the board file
    pub fn directory(&self) -> PathBuf {
        match self.file_name.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Footprints placed on the copper layer of `side`
    pub fn footprints_on(&self, side: Side) -> impl Iterator<Item = &Footprint> {
        let layer = side.layer();
        self.footprints
            .iter()
            .filter(move |footprint| footprint.layer == layer)
    }
}

/// Extract every footprint from the text of a `.kicad_pcb` file
pub fn parse_footprints(content: &str) -> Result<Vec<Footprint>> {
    let root = sexpr::parse(content).context("Failed to parse board S-expression")?;

    if root.head() != Some("kicad_pcb") {
        return Err(QiheError::InvalidBoard {
            reason: "expected kicad_pcb root element".to_string(),
        }
        .into());
    }

    let footprints = root
        .as_list()
        .unwrap_or(&[])
        .iter()
        .filter(|node| matches!(node.head(), Some("footprint") | Some("module")))
        .filter_map(|node| {
            let footprint = parse_footprint(node);
            if footprint.is_none() {
                warn!("Skipping footprint without a layer or position");
            }
            footprint
        })
        .collect();

    Ok(footprints)
}

fn parse_footprint(node: &Sexpr) -> Option<Footprint> {
    let layer = node
        .child("layer")
        .and_then(|l| l.get(1))
        .and_then(Sexpr::as_str)
        .map(Layer::from_name)?;

    let at = node.child("at")?;
    let x = at.get(1).and_then(Sexpr::as_f64)?;
    let y = at.get(2).and_then(Sexpr::as_f64)?;
    let orientation = at.get(3).and_then(Sexpr::as_f64).unwrap_or(0.0);

    let mut reference = String::new();
    let mut value = String::new();

    // KiCad 7+ stores fields as properties, older versions as fp_text
    for property in node.children_named("property") {
        match property.get(1).and_then(Sexpr::as_str) {
            Some("Reference") => reference = text_of(property.get(2)),
            Some("Value") => value = text_of(property.get(2)),
            _ => {}
        }
    }
    for text in node.children_named("fp_text") {
        match text.get(1).and_then(Sexpr::as_atom) {
            Some("reference") if reference.is_empty() => reference = text_of(text.get(2)),
            Some("value") if value.is_empty() => value = text_of(text.get(2)),
            _ => {}
        }
    }

    let mut attributes = FootprintAttributes::default();
    if let Some(attr) = node.child("attr") {
        for flag in attr.as_list().unwrap_or(&[]).iter().skip(1) {
            match flag.as_atom() {
                Some("exclude_from_pos_files") => attributes.exclude_from_pos_files = true,
                Some("exclude_from_bom") => attributes.exclude_from_bom = true,
                // KiCad 5 marks board-only parts (logos, holes) as virtual
                Some("virtual") => {
                    attributes.exclude_from_pos_files = true;
                    attributes.exclude_from_bom = true;
                }
                _ => {}
            }
        }
    }

    debug!("Read footprint {} ({}) on {}", reference, value, layer);

    Some(Footprint {
        reference,
        value,
        position: Position::from_mm(x, y),
        orientation,
        layer,
        attributes,
    })
}

fn text_of(node: Option<&Sexpr>) -> String {
    node.and_then(Sexpr::as_str).unwrap_or("").to_string()
}
