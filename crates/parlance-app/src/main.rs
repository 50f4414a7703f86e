//! Parlance: desktop Piper text-to-speech studio.

mod app;
mod event;
mod playback;
mod prefs;

use anyhow::Context;
use parlance_core::model::{CatalogClient, ModelManager};
use tracing_subscriber::EnvFilter;

use crate::app::ParlanceApp;
use crate::prefs::AppPrefs;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let prefs = AppPrefs::load();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("cannot start async runtime")?;

    let catalog_client = match prefs.catalog_url.as_deref() {
        Some(url) => CatalogClient::with_base_url(url),
        None => CatalogClient::new(),
    };
    let models_dir = match prefs.models_dir.clone() {
        Some(dir) => dir,
        None => ModelManager::default_models_dir()?,
    };
    tracing::info!("using models directory {}", models_dir.display());
    let (manager, manager_events) = ModelManager::new(models_dir, catalog_client)?;

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1000.0, 650.0])
            .with_min_inner_size([900.0, 600.0]),
        ..Default::default()
    };

    let handle = runtime.handle().clone();
    eframe::run_native(
        "Parlance",
        native_options,
        Box::new(move |cc| {
            Ok(Box::new(ParlanceApp::new(
                cc,
                handle,
                manager,
                manager_events,
                prefs,
            )))
        }),
    )
    .map_err(|e| anyhow::anyhow!("window error: {e}"))?;

    Ok(())
}
