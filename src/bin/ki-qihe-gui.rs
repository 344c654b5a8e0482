use eframe::egui;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use ki_qihe::activity::{ActivityLog, Verbosity};
use ki_qihe::config::default_plugin_dir;
use ki_qihe::exporter::{self, ExportStats};
use ki_qihe::log_file::{ErrorLog, LogLevel};
use ki_qihe::options::{MappingLocation, Options, OptionsStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const REPOSITORY: &str = env!("CARGO_PKG_REPOSITORY");

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off")),
        )
        .init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([640.0, 620.0])
            .with_min_inner_size([560.0, 520.0])
            .with_resizable(true),
        ..Default::default()
    };

    eframe::run_native(
        "QIHE Export",
        options,
        Box::new(|cc| {
            configure_custom_style(&cc.egui_ctx);
            Ok(Box::new(QiheApp::new(default_plugin_dir())))
        }),
    )
}

fn configure_custom_style(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();
    style.spacing.item_spacing = egui::vec2(10.0, 8.0);
    style.spacing.window_margin = egui::Margin::same(16.0);
    style.spacing.button_padding = egui::vec2(10.0, 6.0);
    style.visuals.widgets.noninteractive.rounding = egui::Rounding::same(6.0);
    style.visuals.widgets.inactive.rounding = egui::Rounding::same(6.0);
    style.visuals.widgets.hovered.rounding = egui::Rounding::same(6.0);
    style.visuals.widgets.active.rounding = egui::Rounding::same(6.0);
    style.visuals.window_rounding = egui::Rounding::same(10.0);
    ctx.set_style(style);
}

struct QiheApp {
    plugin_dir: PathBuf,
    store: OptionsStore,
    options: Options,
    saved_options: Options,
    board_path: Option<PathBuf>,
    log_lines: Vec<String>,
    worker: Option<JoinHandle<Option<ExportStats>>>,
    rx: Receiver<String>,
    tx: Sender<String>,
}

impl QiheApp {
    fn new(plugin_dir: PathBuf) -> Self {
        let (tx, rx) = channel();
        let store = OptionsStore::in_dir(&plugin_dir);
        let options = store.load();

        Self {
            plugin_dir,
            store,
            saved_options: options.clone(),
            options,
            board_path: None,
            log_lines: vec![format!("ki-qihe v{} loaded successfully.", VERSION)],
            worker: None,
            rx,
            tx,
        }
    }

    fn activity(&self) -> ActivityLog {
        ActivityLog::new(Arc::new(self.tx.clone()), self.options.verbosity())
    }

    fn is_dirty(&self) -> bool {
        self.options != self.saved_options
    }

    fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    fn start_export(&mut self) {
        let Some(board_path) = self.board_path.clone() else {
            self.log_lines
                .push("Please select a KiCad board file first.".to_string());
            return;
        };

        self.log_lines.clear();
        self.worker = Some(exporter::spawn_export(
            board_path,
            self.options.clone(),
            self.plugin_dir.clone(),
            self.activity(),
        ));
    }

    fn save_options(&mut self) {
        let error_log = ErrorLog::in_dir(&self.plugin_dir);
        match self.store.save(&self.options) {
            Ok(()) => {
                self.saved_options = self.options.clone();
                error_log.append(LogLevel::Info, "Settings saved");
                error_log.append(
                    LogLevel::Debug,
                    &format!("Current verbosity level: {}", self.options.log_verbosity),
                );
                self.log_lines.push(format!(
                    "Settings saved to {}",
                    self.store.path().display()
                ));
            }
            Err(e) => {
                error_log.record_error("Error saving settings", &e);
                self.log_lines.push(format!("Error saving settings: {:#}", e));
            }
        }
    }

    fn generate_mapping(&mut self) {
        let _ = exporter::regenerate_mapping(
            &self.options,
            &self.plugin_dir,
            self.board_path.as_deref(),
            &self.activity(),
        );
        self.drain_activity();
    }

    fn edit_mapping(&mut self) {
        let _ = exporter::edit_mapping(
            &self.options,
            &self.plugin_dir,
            self.board_path.as_deref(),
            &self.activity(),
        );
        self.drain_activity();
    }

    fn open_repository(&mut self) {
        if let Err(e) = open::that(REPOSITORY) {
            self.log_lines
                .push(format!("Failed to open {}: {}", REPOSITORY, e));
        }
    }

    fn drain_activity(&mut self) {
        while let Ok(line) = self.rx.try_recv() {
            self.log_lines.push(line);
        }
    }

    fn poll_worker(&mut self) {
        self.drain_activity();

        if self.worker.as_ref().is_some_and(|handle| handle.is_finished()) {
            if let Some(handle) = self.worker.take() {
                if handle.join().is_err() {
                    self.log_lines
                        .push("Export worker stopped unexpectedly.".to_string());
                }
            }
        }
    }
}

impl eframe::App for QiheApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_worker();
        if self.is_running() {
            ctx.request_repaint();
        }

        egui::TopBottomPanel::bottom("actions").show(ctx, |ui| {
            ui.add_space(6.0);
            ui.horizontal(|ui| {
                let save_label = if self.is_dirty() {
                    "Save Changes"
                } else {
                    "Save Options"
                };
                if ui.button(save_label).clicked() {
                    self.save_options();
                }
                if ui
                    .button("Gen Mapping")
                    .on_hover_text("Write the default mapping template, replacing the current file")
                    .clicked()
                {
                    self.generate_mapping();
                }

                if ui
                    .link("Repository")
                    .on_hover_text(REPOSITORY)
                    .clicked()
                {
                    self.open_repository();
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if self.is_running() {
                        ui.add(egui::Spinner::new());
                    } else {
                        let button = egui::Button::new(
                            egui::RichText::new("Generate")
                                .strong()
                                .color(egui::Color32::WHITE),
                        )
                        .min_size(egui::vec2(120.0, 32.0))
                        .fill(egui::Color32::from_rgb(0, 120, 215));
                        if ui.add(button).clicked() {
                            self.start_export();
                        }
                    }
                });
            });
            ui.add_space(6.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.board_section(ui);
            ui.add_space(8.0);
            self.mapping_section(ui);
            ui.add_space(8.0);
            self.layer_section(ui);
            ui.add_space(8.0);
            self.log_section(ui);
        });
    }
}

impl QiheApp {
    fn board_section(&mut self, ui: &mut egui::Ui) {
        group(ui, "Board", |ui| {
            ui.horizontal(|ui| {
                if ui.button("Select board...").clicked() {
                    if let Some(path) = rfd::FileDialog::new()
                        .add_filter("KiCad board", &["kicad_pcb"])
                        .pick_file()
                    {
                        self.board_path = Some(path);
                    }
                }
                let text = match &self.board_path {
                    Some(path) => smart_truncate_path(path, ui.available_width()),
                    None => "No board selected".to_string(),
                };
                ui.label(egui::RichText::new(text).monospace());
            });
        });
    }

    fn mapping_section(&mut self, ui: &mut egui::Ui) {
        group(ui, "Component mapping", |ui| {
            ui.horizontal(|ui| {
                for location in [MappingLocation::PluginFolder, MappingLocation::BoardFolder] {
                    ui.radio_value(&mut self.options.mapping_location, location, location.label());
                }
            });
            ui.horizontal(|ui| {
                ui.label("File name:");
                ui.add(
                    egui::TextEdit::singleline(&mut self.options.mapping_file_name)
                        .desired_width(240.0),
                );
                if ui.button("Edit").clicked() {
                    self.edit_mapping();
                }
            });
        });
    }

    fn layer_section(&mut self, ui: &mut egui::Ui) {
        group(ui, "Layers", |ui| {
            egui::Grid::new("layer_grid")
                .num_columns(2)
                .spacing([20.0, 8.0])
                .show(ui, |ui| {
                    ui.checkbox(&mut self.options.process_top_layer, "Top layer");
                    ui.add(
                        egui::TextEdit::singleline(&mut self.options.top_layer_prefix)
                            .desired_width(200.0),
                    );
                    ui.end_row();

                    ui.checkbox(&mut self.options.process_bottom_layer, "Bottom layer");
                    ui.add(
                        egui::TextEdit::singleline(&mut self.options.bottom_layer_prefix)
                            .desired_width(200.0),
                    );
                    ui.end_row();
                });
        });
    }

    fn log_section(&mut self, ui: &mut egui::Ui) {
        group(ui, "Activity log", |ui| {
            ui.horizontal(|ui| {
                ui.label("Verbosity:");
                for verbosity in Verbosity::ALL {
                    ui.radio_value(
                        &mut self.options.log_verbosity,
                        verbosity.level(),
                        verbosity.to_string(),
                    )
                    .on_hover_text(verbosity.description());
                }
            });

            egui::ScrollArea::vertical()
                .stick_to_bottom(true)
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    for line in &self.log_lines {
                        ui.label(egui::RichText::new(line).monospace());
                    }
                });
        });
    }
}

fn group(ui: &mut egui::Ui, title: &str, add_contents: impl FnOnce(&mut egui::Ui)) {
    egui::Frame::group(ui.style())
        .inner_margin(10.0)
        .stroke(egui::Stroke::new(1.0, egui::Color32::from_gray(60)))
        .show(ui, |ui| {
            ui.set_width(ui.available_width());
            ui.label(egui::RichText::new(title).strong());
            add_contents(ui);
        });
}

fn smart_truncate_path(path: &Path, available_width: f32) -> String {
    let text = path.to_string_lossy().to_string();
    let max_chars = (available_width / 8.0) as usize;
    let count = text.chars().count();

    if count > max_chars && max_chars > 3 {
        let tail: String = text.chars().skip(count - (max_chars - 3)).collect();
        format!("...{}", tail)
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn has_line(app: &QiheApp, needle: &str) -> bool {
        app.log_lines.iter().any(|line| line.contains(needle))
    }

    #[test]
    fn test_new_app_announces_version() {
        let dir = tempdir().expect("Failed to create temp dir");
        let app = QiheApp::new(dir.path().to_path_buf());

        assert_eq!(app.log_lines, vec![format!("ki-qihe v{} loaded successfully.", VERSION)]);
        assert!(REPOSITORY.starts_with("https://"));
    }

    #[test]
    fn test_gen_mapping_lines_show_in_the_same_frame() {
        let dir = tempdir().expect("Failed to create temp dir");
        let mut app = QiheApp::new(dir.path().to_path_buf());

        app.generate_mapping();

        assert!(has_line(&app, "Default mapping file created"));
        assert!(dir.path().join("component_mapping.txt").exists());
    }

    #[test]
    fn test_board_folder_actions_wait_for_a_board() {
        let dir = tempdir().expect("Failed to create temp dir");
        let mut app = QiheApp::new(dir.path().join("plugin"));
        app.options.mapping_location = MappingLocation::BoardFolder;

        app.generate_mapping();
        app.edit_mapping();

        assert!(has_line(&app, "Please select a KiCad board file first."));
        assert!(!has_line(&app, "Default mapping file created"));
    }
}
