//! QIHE coordinate file writer
//!
//! The machine software expects a fixed eleven-column layout followed by a
//! constant "Puzzle" block, whatever the board contains.

use crate::board::{Board, Footprint, NM_PER_MM};
use crate::error::{Result, ResultExt};
use crate::mapping::{ComponentMapping, Placement};
use anyhow::Context;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const HEADER: [&str; 11] = [
    "Designator",
    "NozzleNum",
    "StackNum",
    "Mid X",
    "Mid Y",
    "Rotation",
    "Height",
    "Speed",
    "Vision",
    "Check",
    "Explanation",
];

const HEIGHT: &str = "0.00";
const SPEED: &str = "100";
const VISION: &str = "None";
const CHECK: &str = "True";
const PRIORITY_PREFIX: &str = "PRIO ";
const PUZZLE_ROWS: usize = 8;
const LINE_END: &str = "\r\n";

/// Millimetre offset added to every coordinate
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Offset {
    pub x: f64,
    pub y: f64,
}

/// One machine placement line
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementRow {
    pub designator: String,
    pub nozzle: String,
    pub stack: String,
    pub mid_x: f64,
    pub mid_y: f64,
    pub rotation: f64,
    pub explanation: String,
}

impl PlacementRow {
    pub fn new(
        footprint: &Footprint,
        mapping: &ComponentMapping,
        offset: Offset,
        is_priority: bool,
    ) -> Self {
        let placement = mapping
            .placement(&footprint.value)
            .cloned()
            .unwrap_or_else(Placement::unmapped);

        let mut explanation = format!("{} {}", footprint.value, footprint.reference);
        if is_priority {
            explanation.insert_str(0, PRIORITY_PREFIX);
        }

        Self {
            designator: footprint.reference.clone(),
            nozzle: placement.nozzle,
            stack: placement.stack,
            mid_x: footprint.position.x as f64 / NM_PER_MM + offset.x,
            mid_y: footprint.position.y as f64 / NM_PER_MM + offset.y,
            rotation: machine_rotation(footprint.orientation),
            explanation,
        }
    }

    fn record(&self) -> [String; 11] {
        [
            self.designator.clone(),
            self.nozzle.clone(),
            self.stack.clone(),
            format!("{:.2}", self.mid_x),
            format!("{:.2}", self.mid_y),
            format!("{:.2}", self.rotation),
            HEIGHT.to_string(),
            SPEED.to_string(),
            VISION.to_string(),
            CHECK.to_string(),
            self.explanation.clone(),
        ]
    }
}

/// Machine rotation for a KiCad orientation: quarter turn clockwise, in [0, 360)
pub fn machine_rotation(orientation: f64) -> f64 {
    (orientation + 270.0).rem_euclid(360.0)
}

/// The fixed block that closes every coordinate file
pub fn puzzle_trailer() -> String {
    let mut trailer = String::new();
    trailer.push_str(LINE_END);
    trailer.push_str("Puzzle");
    trailer.push_str(LINE_END);
    for _ in 0..PUZZLE_ROWS {
        trailer.push_str(HEIGHT);
        trailer.push_str(LINE_END);
        trailer.push_str(LINE_END);
    }
    trailer.push_str(LINE_END);
    trailer.push_str(LINE_END);
    trailer
}

/// Write header, rows and trailer to `writer`
pub fn write_coords<W: Write>(mut writer: W, rows: &[PlacementRow]) -> Result<()> {
    {
        let mut csv = csv::WriterBuilder::new()
            .terminator(csv::Terminator::CRLF)
            .from_writer(&mut writer);

        csv.write_record(HEADER).context("Failed to write header row")?;
        for row in rows {
            csv.write_record(row.record())
                .with_context(|| format!("Failed to write row for {}", row.designator))?;
        }
        csv.flush()?;
    }

    // Blank records are not expressible through the csv writer, so the
    // constant trailer goes straight to the underlying writer
    writer.write_all(puzzle_trailer().as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Create or truncate `path` and write a coordinate file to it
pub fn write_coords_file(path: &Path, rows: &[PlacementRow]) -> Result<()> {
    let file = File::create(path).with_path_context("create coordinate", path)?;
    write_coords(BufWriter::new(file), rows).with_path_context("write coordinate", path)?;
    debug!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// `<board dir>/<board name>_<suffix>.csv`
pub fn output_file_path(board: &Board, suffix: &str) -> Result<PathBuf> {
    Ok(board
        .directory()
        .join(format!("{}_{}.csv", board.base_name()?, suffix)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityLog;
    use crate::board::Layer;

    fn render(rows: &[PlacementRow]) -> String {
        let mut out = Vec::new();
        write_coords(&mut out, rows).expect("write succeeds");
        String::from_utf8(out).expect("utf-8 output")
    }

    #[test]
    fn test_rotation() {
        assert_eq!(machine_rotation(90.0), 0.0);
        assert_eq!(machine_rotation(0.0), 270.0);
        assert_eq!(machine_rotation(180.0), 90.0);
        assert_eq!(machine_rotation(-90.0), 180.0);
        assert_eq!(machine_rotation(-180.0), 90.0);
        assert_eq!(machine_rotation(45.5), 315.5);
    }

    #[test]
    fn test_row_values() {
        let mapping = ComponentMapping::parse("2, L7, 10k", &ActivityLog::silent());
        let footprint = Footprint::new("R1", "10k", Layer::FrontCopper).at_mm(101.25, 48.5, 90.0);

        let row = PlacementRow::new(&footprint, &mapping, Offset { x: 1.0, y: -0.5 }, false);

        assert_eq!(row.designator, "R1");
        assert_eq!(row.nozzle, "2");
        assert_eq!(row.stack, "L7");
        assert_eq!(row.mid_x, 102.25);
        assert_eq!(row.mid_y, 48.0);
        assert_eq!(row.rotation, 0.0);
        assert_eq!(row.explanation, "10k R1");
    }

    #[test]
    fn test_unmapped_row_uses_placeholder() {
        let mapping = ComponentMapping::default();
        let footprint = Footprint::new("U3", "STM32F103", Layer::FrontCopper);

        let row = PlacementRow::new(&footprint, &mapping, Offset::default(), false);
        assert_eq!(row.nozzle, "1/2");
        assert_eq!(row.stack, "None");
    }

    #[test]
    fn test_priority_row_keeps_mapped_placement() {
        let mapping = ComponentMapping::parse("1, L2, FIDUCIAL", &ActivityLog::silent());
        let footprint = Footprint::new("FID1", "FIDUCIAL", Layer::FrontCopper);

        let row = PlacementRow::new(&footprint, &mapping, Offset::default(), true);
        assert_eq!(row.nozzle, "1");
        assert_eq!(row.stack, "L2");
        assert_eq!(row.explanation, "PRIO FIDUCIAL FID1");
    }

    #[test]
    fn test_empty_file_layout() {
        let output = render(&[]);
        let mut expected = String::from(
            "Designator,NozzleNum,StackNum,Mid X,Mid Y,Rotation,Height,Speed,Vision,Check,Explanation\r\n",
        );
        expected.push_str("\r\nPuzzle\r\n");
        for _ in 0..8 {
            expected.push_str("0.00\r\n\r\n");
        }
        expected.push_str("\r\n\r\n");

        assert_eq!(output, expected);
    }

    #[test]
    fn test_row_formatting() {
        let row = PlacementRow {
            designator: "C1".to_string(),
            nozzle: "1".to_string(),
            stack: "L1".to_string(),
            mid_x: 12.345,
            mid_y: -3.0,
            rotation: 270.0,
            explanation: "100nF C1".to_string(),
        };

        let output = render(&[row]);
        let line = output.lines().nth(1).expect("data row");
        assert_eq!(line, "C1,1,L1,12.35,-3.00,270.00,0.00,100,None,True,100nF C1");
    }

    #[test]
    fn test_values_with_commas_are_quoted() {
        let row = PlacementRow {
            designator: "R1".to_string(),
            nozzle: "1/2".to_string(),
            stack: "None".to_string(),
            mid_x: 0.0,
            mid_y: 0.0,
            rotation: 0.0,
            explanation: "10k,1% R1".to_string(),
        };

        let output = render(&[row]);
        assert!(output.contains(",\"10k,1% R1\"\r\n"));
    }

    #[test]
    fn test_output_file_path() {
        let board = Board::new("/work/demo/demo.kicad_pcb", Vec::new());
        assert_eq!(
            output_file_path(&board, "TOP-COORDS").unwrap(),
            PathBuf::from("/work/demo/demo_TOP-COORDS.csv")
        );
    }
}
