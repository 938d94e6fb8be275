use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::caption;
use crate::config::{self, LoggingConfig};
use crate::controller::{self, Controller};
use crate::data::{CaptionService, HttpCaptionService};
use crate::ui;

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let config_path = config::default_path();
    let display_path = friendly_path(config_path.as_ref());

    let log_note = match init_logging(&cfg.logging) {
        Ok(Some(path)) => format!("logging to {}", friendly_path(Some(&path))),
        Ok(None) => "logging disabled".to_string(),
        Err(err) => format!("logging unavailable: {err:#}"),
    };

    let client = caption::Client::new(caption::ClientConfig {
        endpoint: cfg.service.endpoint.clone(),
        user_agent: cfg.service.user_agent.clone(),
        request_timeout: cfg.service.request_timeout,
        http_client: None,
    })
    .context("create caption client")?;
    let endpoint = client.endpoint().to_string();
    tracing::info!(%endpoint, config = %display_path, "caption-tui starting");

    let service: Arc<dyn CaptionService> = Arc::new(HttpCaptionService::new(Arc::new(client)));
    let controller = Controller::new(controller::Options {
        service,
        theme: cfg.ui.theme,
        theme_path: config_path,
    });

    let mut model = ui::Model::new(ui::Options {
        controller,
        status_message: format!(
            "Press o to choose an image. Config: {display_path}; {log_note}."
        ),
        endpoint,
    });
    model.run()
}

/// Log to a file so the alternate screen stays clean. `RUST_LOG` overrides the
/// configured level.
fn init_logging(cfg: &LoggingConfig) -> Result<Option<PathBuf>> {
    let Some(path) = cfg.file.clone() else {
        return Ok(None);
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let file = File::options()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!("{err}"))
        .context("install log subscriber")?;
    Ok(Some(path))
}

fn friendly_path(path: Option<&PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/caption-tui/config.yaml".to_string()
    }
}
