// SPDX-FileCopyrightText: 2025 ki-qihe contributors
// SPDX-License-Identifier: Apache-2.0

//! ki-qihe exports the footprints of a KiCad board as QIHE pick-and-place
//! coordinate files, one per board side, driven by a user-maintained
//! component mapping file.

pub mod activity;
pub mod board;
pub mod classify;
pub mod config;
pub mod editor;
pub mod error;
pub mod exporter;
pub mod log_file;
pub mod mapping;
pub mod options;
pub mod placement;
pub mod progress;
pub mod sexpr;

pub use config::Config;
pub use exporter::{ExportStats, Exporter};
pub use options::{Options, OptionsStore};
