//! Main application window.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use eframe::egui;
use parlance_core::model::{ManagerEvent, ModelManager};
use parlance_core::{export, DownloadState, ModelDescriptor, PiperEngine, SpeechEngine};
use tracing::warn;

use crate::event::{SynthesisPurpose, UiEvent};
use crate::playback::Player;
use crate::prefs::AppPrefs;

const LOG_CAPACITY: usize = 500;

enum VoiceAction {
    Select(String),
    Download(String),
    Cancel(String),
    Remove(String),
}

/// Main application state
pub struct ParlanceApp {
    rt: tokio::runtime::Handle,
    manager: Arc<ModelManager>,
    player: Player,
    prefs: AppPrefs,
    tx: Sender<UiEvent>,
    rx: Receiver<UiEvent>,
    egui_ctx: egui::Context,

    voices: Vec<ModelDescriptor>,
    progress: HashMap<String, (u64, u64)>,
    selected: Option<String>,
    engine: Option<(String, Arc<PiperEngine>)>,
    loading_voice: Option<String>,
    busy: Option<&'static str>,
    auto_load_attempted: bool,

    text: String,
    export_path: String,
    import_path: String,
    status: String,
    log: Vec<String>,
    models_dir: String,
}

impl ParlanceApp {
    /// Build the app and kick off the initial catalog fetch and store scan.
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        rt: tokio::runtime::Handle,
        manager: Arc<ModelManager>,
        mut manager_events: tokio::sync::mpsc::UnboundedReceiver<ManagerEvent>,
        prefs: AppPrefs,
    ) -> Self {
        let (tx, rx) = std::sync::mpsc::channel();
        let egui_ctx = cc.egui_ctx.clone();

        // Forward manager events onto the UI channel.
        {
            let tx = tx.clone();
            let ctx = egui_ctx.clone();
            rt.spawn(async move {
                while let Some(event) = manager_events.recv().await {
                    if tx.send(UiEvent::Manager(event)).is_err() {
                        break;
                    }
                    ctx.request_repaint();
                }
            });
        }

        let models_dir = {
            let manager = Arc::clone(&manager);
            rt.block_on(async move { manager.models_dir().await })
                .display()
                .to_string()
        };

        let selected = prefs.last_voice.clone();
        let app = Self {
            rt,
            manager,
            player: Player::new(),
            prefs,
            tx,
            rx,
            egui_ctx,
            voices: Vec::new(),
            progress: HashMap::new(),
            selected,
            engine: None,
            loading_voice: None,
            busy: None,
            auto_load_attempted: false,
            text: "Type or paste text here.".to_string(),
            export_path: "speech.wav".to_string(),
            import_path: String::new(),
            status: "Ready".to_string(),
            log: Vec::new(),
            models_dir,
        };

        app.fetch_catalog();
        app.refresh_voices();
        app
    }

    fn set_status(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.status = text.clone();
        let stamp = chrono::Local::now().format("%H:%M:%S");
        self.log.push(format!("{stamp}  {text}"));
        if self.log.len() > LOG_CAPACITY {
            let excess = self.log.len() - LOG_CAPACITY;
            self.log.drain(..excess);
        }
    }

    // ------------------------------------------------------------------
    // Background tasks
    // ------------------------------------------------------------------

    fn fetch_catalog(&self) {
        let manager = Arc::clone(&self.manager);
        let tx = self.tx.clone();
        let ctx = self.egui_ctx.clone();
        self.rt.spawn(async move {
            let result = manager
                .refresh_catalog()
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(UiEvent::CatalogRefreshed(result));
            ctx.request_repaint();
        });
    }

    fn refresh_voices(&self) {
        let manager = Arc::clone(&self.manager);
        let tx = self.tx.clone();
        let ctx = self.egui_ctx.clone();
        self.rt.spawn(async move {
            let voices = manager.list_available().await;
            let _ = tx.send(UiEvent::VoicesListed(voices));
            ctx.request_repaint();
        });
    }

    fn rescan_store(&self) {
        let manager = Arc::clone(&self.manager);
        let tx = self.tx.clone();
        let ctx = self.egui_ctx.clone();
        self.rt.spawn(async move {
            let message = match manager.refresh().await {
                Ok(()) => "Models rescanned".to_string(),
                Err(e) => format!("Rescan failed: {e}"),
            };
            let _ = tx.send(UiEvent::Status(message));
            ctx.request_repaint();
        });
    }

    fn start_download(&self, name: String) {
        let manager = Arc::clone(&self.manager);
        self.rt.spawn(async move {
            // Failures surface through the manager's event channel.
            let _ = manager.download(&name).await;
        });
    }

    fn remove_voice(&self, name: String) {
        let manager = Arc::clone(&self.manager);
        let tx = self.tx.clone();
        let ctx = self.egui_ctx.clone();
        self.rt.spawn(async move {
            let message = match manager.remove(&name).await {
                Ok(()) => format!("Removed: {name}"),
                Err(e) => format!("Remove failed: {e}"),
            };
            let _ = tx.send(UiEvent::Status(message));
            ctx.request_repaint();
        });
    }

    fn load_voice(&mut self, name: String) {
        self.loading_voice = Some(name.clone());
        self.set_status(format!("Loading: {name}..."));

        let manager = Arc::clone(&self.manager);
        let tx = self.tx.clone();
        let ctx = self.egui_ctx.clone();
        self.rt.spawn(async move {
            let result = async {
                let (files, lease) = manager.checkout(&name).await.map_err(|e| e.to_string())?;
                let engine = tokio::task::spawn_blocking(move || PiperEngine::load(files))
                    .await
                    .map_err(|e| e.to_string())?
                    .map_err(|e| e.to_string())?;
                drop(lease);
                Ok(Arc::new(engine))
            }
            .await;
            let _ = tx.send(UiEvent::VoiceLoaded { name, result });
            ctx.request_repaint();
        });
    }

    fn start_playback(&mut self) {
        let Some((name, engine)) = self.engine.clone() else {
            self.set_status("Load a voice model first");
            return;
        };
        let text = self.text.trim().to_string();
        if text.is_empty() {
            self.set_status("Enter text to speak");
            return;
        }

        self.busy = Some("Synthesizing...");
        self.set_status("Synthesizing...");

        let options = self.prefs.options();
        let manager = Arc::clone(&self.manager);
        let tx = self.tx.clone();
        let ctx = self.egui_ctx.clone();
        self.rt.spawn(async move {
            let result = async {
                let (_files, lease) = manager.checkout(&name).await.map_err(|e| e.to_string())?;
                let clip =
                    tokio::task::spawn_blocking(move || engine.synthesize(&text, &options))
                        .await
                        .map_err(|e| e.to_string())?
                        .map_err(|e| e.to_string())?;
                drop(lease);
                Ok(clip)
            }
            .await;
            let _ = tx.send(UiEvent::SynthesisFinished {
                purpose: SynthesisPurpose::Play,
                result,
            });
            ctx.request_repaint();
        });
    }

    fn start_export(&mut self) {
        let Some((name, engine)) = self.engine.clone() else {
            self.set_status("Load a voice model first");
            return;
        };
        let text = self.text.trim().to_string();
        if text.is_empty() {
            self.set_status("Enter text to speak");
            return;
        }
        let path = PathBuf::from(self.export_path.trim());
        if path.as_os_str().is_empty() {
            self.set_status("Enter an output path");
            return;
        }

        self.busy = Some("Exporting...");
        self.set_status("Generating WAV...");

        let options = self.prefs.options();
        let manager = Arc::clone(&self.manager);
        let tx = self.tx.clone();
        let ctx = self.egui_ctx.clone();
        self.rt.spawn(async move {
            let result = async {
                let (_files, lease) = manager.checkout(&name).await.map_err(|e| e.to_string())?;
                let export_path = path.clone();
                tokio::task::spawn_blocking(move || {
                    let clip = engine.synthesize(&text, &options)?;
                    export::export_wav(&export_path, &clip)
                })
                .await
                .map_err(|e| e.to_string())?
                .map_err(|e| e.to_string())?;
                drop(lease);
                Ok(())
            }
            .await;
            let _ = tx.send(UiEvent::ExportFinished { path, result });
            ctx.request_repaint();
        });
    }

    fn import_models(&mut self) {
        let paths: Vec<PathBuf> = self
            .import_path
            .split(';')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .collect();
        if paths.is_empty() {
            self.set_status("Enter model file paths to add");
            return;
        }

        let manager = Arc::clone(&self.manager);
        let tx = self.tx.clone();
        let ctx = self.egui_ctx.clone();
        self.rt.spawn(async move {
            let result = manager
                .import_files(&paths)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(UiEvent::ImportFinished(result));
            ctx.request_repaint();
        });
    }

    // ------------------------------------------------------------------
    // Event handling
    // ------------------------------------------------------------------

    fn drain_events(&mut self) {
        loop {
            let event = match self.rx.try_recv() {
                Ok(event) => event,
                Err(_) => break,
            };
            self.handle_event(event);
        }
    }

    fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Manager(event) => self.handle_manager_event(event),
            UiEvent::CatalogRefreshed(Ok(count)) => {
                self.set_status(format!("Catalog: {count} voices available"));
                self.refresh_voices();
            }
            UiEvent::CatalogRefreshed(Err(e)) => {
                self.set_status(format!("Catalog fetch failed: {e}"));
            }
            UiEvent::VoicesListed(voices) => {
                self.voices = voices;
                self.try_auto_load();
            }
            UiEvent::VoiceLoaded { name, result } => {
                self.loading_voice = None;
                match result {
                    Ok(engine) => {
                        self.set_status(format!(
                            "Loaded: {name} @ {} Hz",
                            engine.sample_rate()
                        ));
                        self.engine = Some((name, engine));
                    }
                    Err(e) => self.set_status(format!("Load error: {e}")),
                }
            }
            UiEvent::SynthesisFinished { purpose, result } => {
                self.busy = None;
                match (purpose, result) {
                    (SynthesisPurpose::Play, Ok(clip)) => {
                        self.set_status("Playing...");
                        let tx = self.tx.clone();
                        let ctx = self.egui_ctx.clone();
                        self.player.play(clip, move |outcome| {
                            let event = match outcome {
                                Ok(stopped) => UiEvent::PlaybackFinished { stopped },
                                Err(e) => UiEvent::Status(format!("Playback error: {e}")),
                            };
                            let _ = tx.send(event);
                            ctx.request_repaint();
                        });
                    }
                    (SynthesisPurpose::Play, Err(e)) => {
                        self.set_status(format!("Synthesis error: {e}"));
                    }
                }
            }
            UiEvent::PlaybackFinished { stopped } => {
                self.set_status(if stopped { "Stopped" } else { "Playback complete" });
            }
            UiEvent::ExportFinished { path, result } => {
                self.busy = None;
                match result {
                    Ok(()) => {
                        let name = path
                            .file_name()
                            .map_or_else(|| path.display().to_string(), |n| {
                                n.to_string_lossy().into_owned()
                            });
                        self.set_status(format!("Saved: {name}"));
                    }
                    Err(e) => self.set_status(format!("Export error: {e}")),
                }
            }
            UiEvent::ImportFinished(Ok(count)) => {
                self.set_status(format!("Added {count} file(s)"));
            }
            UiEvent::ImportFinished(Err(e)) => {
                self.set_status(format!("Import failed: {e}"));
            }
            UiEvent::Status(message) => self.set_status(message),
        }
    }

    fn handle_manager_event(&mut self, event: ManagerEvent) {
        match event {
            ManagerEvent::DownloadStarted { name } => {
                self.progress.insert(name.clone(), (0, 0));
                self.set_status(format!("Downloading: {name}..."));
                self.refresh_voices();
            }
            ManagerEvent::DownloadProgress {
                name,
                received,
                total,
            } => {
                self.progress.insert(name, (received, total));
            }
            ManagerEvent::DownloadCompleted { name } => {
                self.progress.remove(&name);
                self.set_status(format!("Downloaded: {name}"));
                self.refresh_voices();
            }
            ManagerEvent::DownloadFailed { name, error } => {
                self.progress.remove(&name);
                self.set_status(format!("Download failed: {error}"));
                self.refresh_voices();
            }
            ManagerEvent::DownloadCancelled { name } => {
                self.progress.remove(&name);
                self.set_status(format!("Cancelled: {name}"));
                self.refresh_voices();
            }
            ManagerEvent::StoreRefreshed => self.refresh_voices(),
        }
    }

    /// Load the previously selected voice once the first listing arrives.
    fn try_auto_load(&mut self) {
        if self.auto_load_attempted || self.engine.is_some() || self.loading_voice.is_some() {
            return;
        }
        let Some(name) = self.selected.clone() else {
            self.auto_load_attempted = true;
            return;
        };
        let ready = self
            .voices
            .iter()
            .any(|v| v.name == name && v.is_ready());
        self.auto_load_attempted = true;
        if ready {
            self.load_voice(name);
        }
    }

    fn apply_action(&mut self, action: VoiceAction) {
        match action {
            VoiceAction::Select(name) => {
                self.selected = Some(name.clone());
                self.prefs.last_voice = Some(name.clone());
                let ready = self
                    .voices
                    .iter()
                    .any(|v| v.name == name && v.is_ready());
                if ready {
                    self.load_voice(name);
                }
            }
            VoiceAction::Download(name) => self.start_download(name),
            VoiceAction::Cancel(name) => {
                if !self.manager.cancel_download(&name) {
                    self.set_status(format!("No download in flight for {name}"));
                }
            }
            VoiceAction::Remove(name) => self.remove_voice(name),
        }
    }

    // ------------------------------------------------------------------
    // Panels
    // ------------------------------------------------------------------

    fn header_ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("Parlance");
            ui.separator();
            match &self.engine {
                Some((name, engine)) => {
                    ui.label(
                        egui::RichText::new(format!("{name} @ {} Hz", engine.sample_rate()))
                            .strong(),
                    );
                }
                None => {
                    ui.label(egui::RichText::new("no voice loaded").weak());
                }
            }
            if self.loading_voice.is_some() || self.busy.is_some() {
                ui.spinner();
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(egui::RichText::new(&self.status).weak());
            });
        });
    }

    fn voices_ui(&mut self, ui: &mut egui::Ui) {
        let mut action = None;

        ui.horizontal(|ui| {
            ui.heading("Voices");
            if ui
                .button("Fetch catalog")
                .on_hover_text("Refresh the remote voice listing")
                .clicked()
            {
                self.fetch_catalog();
            }
            if ui
                .button("⟳")
                .on_hover_text("Rescan the models directory")
                .clicked()
            {
                self.rescan_store();
            }
        });
        ui.label(egui::RichText::new(format!("Store: {}", self.models_dir)).weak().small());
        ui.separator();

        egui::ScrollArea::vertical()
            .auto_shrink(false)
            .show(ui, |ui| {
                if self.voices.is_empty() {
                    ui.label("No voices yet. Fetch the catalog or add model files.");
                }
                for voice in &self.voices {
                    let is_selected = self.selected.as_deref() == Some(voice.name.as_str());
                    if ui.selectable_label(is_selected, &voice.name).clicked() {
                        action = Some(VoiceAction::Select(voice.name.clone()));
                    }

                    ui.horizontal(|ui| {
                        let state_text = match voice.state {
                            DownloadState::Failed => egui::RichText::new("Failed")
                                .color(ui.visuals().error_fg_color),
                            other => egui::RichText::new(other.to_string()).weak(),
                        };
                        let response = ui.label(state_text);
                        if let Some(error) = &voice.error {
                            response.on_hover_text(error.clone());
                        }

                        if voice.size_bytes > 0 {
                            ui.label(
                                egui::RichText::new(human_size(voice.size_bytes)).weak(),
                            );
                        }
                        if let Some(quality) = &voice.quality {
                            ui.label(egui::RichText::new(quality).weak());
                        }

                        match voice.state {
                            DownloadState::NotDownloaded | DownloadState::Failed
                                if !voice.remote_files.is_empty() =>
                            {
                                if ui.small_button("Download").clicked() {
                                    action = Some(VoiceAction::Download(voice.name.clone()));
                                }
                            }
                            DownloadState::Downloading => {
                                if ui.small_button("Cancel").clicked() {
                                    action = Some(VoiceAction::Cancel(voice.name.clone()));
                                }
                            }
                            _ => {}
                        }
                        if voice.local_files.is_some()
                            && voice.state != DownloadState::Downloading
                            && ui.small_button("Remove").clicked()
                        {
                            action = Some(VoiceAction::Remove(voice.name.clone()));
                        }
                    });

                    if let Some((received, total)) = self.progress.get(&voice.name) {
                        let fraction = if *total > 0 {
                            *received as f32 / *total as f32
                        } else {
                            0.0
                        };
                        ui.add(egui::ProgressBar::new(fraction).show_percentage());
                    }
                    ui.separator();
                }
            });

        if let Some(action) = action {
            self.apply_action(action);
        }
    }

    fn controls_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("Text to Speak");
        ui.add(
            egui::TextEdit::multiline(&mut self.text)
                .desired_rows(6)
                .desired_width(f32::INFINITY)
                .hint_text("Type or paste text here..."),
        );

        ui.add_space(8.0);
        ui.heading("Speech Settings");
        ui.add(egui::Slider::new(&mut self.prefs.volume, 0.0..=1.0).text("Volume"));
        ui.add(egui::Slider::new(&mut self.prefs.speed, 0.5..=2.0).text("Speed"));
        ui.add(egui::Slider::new(&mut self.prefs.noise, 0.0..=1.5).text("Noise"));
        ui.add(egui::Slider::new(&mut self.prefs.noise_w, 0.0..=1.5).text("Noise W"));
        ui.checkbox(&mut self.prefs.normalize, "Normalize audio");

        ui.add_space(8.0);
        ui.horizontal(|ui| {
            let playing = self.player.is_playing();
            let idle = self.busy.is_none();

            let play_label = if playing { "■ Stop" } else { "▶ Play" };
            if ui
                .add_enabled(idle || playing, egui::Button::new(play_label))
                .clicked()
            {
                if playing {
                    self.player.stop();
                    self.set_status("Stopping...");
                } else {
                    self.start_playback();
                }
            }

            ui.separator();
            if ui
                .add_enabled(idle && !playing, egui::Button::new("💾 Export WAV"))
                .clicked()
            {
                self.start_export();
            }
            ui.add(
                egui::TextEdit::singleline(&mut self.export_path)
                    .desired_width(240.0)
                    .hint_text("speech.wav"),
            );
        });

        ui.add_space(8.0);
        ui.horizontal(|ui| {
            if ui
                .button("＋ Add model files")
                .on_hover_text("Copy local .onnx and .onnx.json files into the store")
                .clicked()
            {
                self.import_models();
            }
            ui.add(
                egui::TextEdit::singleline(&mut self.import_path)
                    .desired_width(f32::INFINITY)
                    .hint_text("/path/to/voice.onnx;/path/to/voice.onnx.json"),
            );
        });
    }

    fn log_ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("Status Log");
            if ui.button("Copy").clicked() {
                let text = self.log.join("\n");
                ui.ctx().output_mut(|o| o.copied_text = text);
            }
            if ui.button("Clear").clicked() {
                self.log.clear();
            }
        });
        egui::ScrollArea::vertical()
            .max_height(110.0)
            .auto_shrink(false)
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for line in &self.log {
                    ui.label(egui::RichText::new(line).monospace().small());
                }
            });
    }
}

impl eframe::App for ParlanceApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events();

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.add_space(4.0);
            self.header_ui(ui);
            ui.add_space(4.0);
        });

        egui::TopBottomPanel::bottom("log")
            .resizable(false)
            .show(ctx, |ui| {
                ui.add_space(4.0);
                self.log_ui(ui);
                ui.add_space(4.0);
            });

        egui::SidePanel::left("voices")
            .resizable(true)
            .default_width(330.0)
            .show(ctx, |ui| {
                self.voices_ui(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.controls_ui(ui);
        });

        let pending = !self.progress.is_empty()
            || self.busy.is_some()
            || self.loading_voice.is_some()
            || self.player.is_playing();
        if pending {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.player.stop();
        if let Err(e) = self.prefs.save() {
            warn!("cannot save preferences: {e}");
        }
    }
}

fn human_size(bytes: u64) -> String {
    const MB: u64 = 1_000_000;
    const KB: u64 = 1_000;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} kB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(500), "500 B");
        assert_eq!(human_size(1_500), "1.5 kB");
        assert_eq!(human_size(63_201_294), "63.2 MB");
    }
}
