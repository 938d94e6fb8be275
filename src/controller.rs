//! The interaction controller.
//!
//! One `Controller` owns the whole session: the selected image and its
//! preview, the current caption, the caption history, the loading flag and
//! the theme. The UI reads it and calls its operations; nothing else writes
//! to it.
//!
//! `generate_caption` runs the request on a worker thread and returns at
//! once. The result comes back over a channel and is applied by `poll`, which
//! the UI loop calls every iteration, so all state changes happen on the UI
//! thread.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::caption::{CaptionError, CaptionReply};
use crate::config::{self, ThemeMode};
use crate::data::CaptionService;
use crate::history::CaptionHistory;
use crate::media::{Preview, PreviewHandle, PreviewRegistry, SelectedImage};

pub const FALLBACK_CAPTION: &str = "Could not generate caption.";
pub const FAILURE_MESSAGE: &str = "❌ Failed to generate caption. Check backend.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    Ready,
    Submitting,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Succeeded,
    Failed,
}

/// What `poll` did with a finished request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Succeeded { elapsed: Duration },
    Failed { elapsed: Duration },
    /// The selection changed while the request was in flight.
    Discarded,
}

struct CaptionResponse {
    request_id: u64,
    selection: u64,
    elapsed: Duration,
    result: Result<CaptionReply, CaptionError>,
}

/// Value of the picker's path field. Resetting it lets the same file be chosen again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilePicker {
    input: String,
}

impl FilePicker {
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn push(&mut self, ch: char) {
        self.input.push(ch);
    }

    pub fn backspace(&mut self) {
        self.input.pop();
    }

    pub fn reset(&mut self) {
        self.input.clear();
    }
}

/// Comparable view of the session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub phase: Phase,
    pub file_name: Option<String>,
    pub preview_id: Option<u64>,
    pub caption: String,
    pub history: Vec<String>,
    pub loading: bool,
    pub theme: ThemeMode,
    pub picker_input: String,
}

pub struct Options {
    pub service: Arc<dyn CaptionService>,
    pub theme: ThemeMode,
    /// Where `toggle_theme` persists the mode. `None` keeps it in memory only.
    pub theme_path: Option<PathBuf>,
}

pub struct Controller {
    service: Arc<dyn CaptionService>,
    previews: PreviewRegistry,
    selected: Option<SelectedImage>,
    preview: Option<PreviewHandle>,
    caption: String,
    history: CaptionHistory,
    loading: bool,
    outcome: Option<Outcome>,
    theme: ThemeMode,
    theme_path: Option<PathBuf>,
    picker: FilePicker,
    selection_generation: u64,
    next_request_id: u64,
    in_flight: Option<u64>,
    response_tx: Sender<CaptionResponse>,
    response_rx: Receiver<CaptionResponse>,
}

impl Controller {
    pub fn new(opts: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        Self {
            service: opts.service,
            previews: PreviewRegistry::new(),
            selected: None,
            preview: None,
            caption: String::new(),
            history: CaptionHistory::new(),
            loading: false,
            outcome: None,
            theme: opts.theme,
            theme_path: opts.theme_path,
            picker: FilePicker::default(),
            selection_generation: 0,
            next_request_id: 1,
            in_flight: None,
            response_tx,
            response_rx,
        }
    }

    /// Replace the selection. `None` is the picker's "no file chosen".
    pub fn select_image(&mut self, file: Option<SelectedImage>) {
        self.release_preview();
        self.selection_generation += 1;
        self.caption.clear();
        self.outcome = None;

        match file {
            Some(image) => {
                tracing::info!(
                    file = %image.file_name,
                    mime = %image.mime_type,
                    bytes = image.len(),
                    "image selected"
                );
                self.preview = Some(self.previews.acquire(&image));
                self.selected = Some(image);
            }
            None => {
                self.selected = None;
            }
        }
    }

    /// Start a caption request for the current image. Returns `false` (and
    /// changes nothing) when there is no image or a request is already out.
    pub fn generate_caption(&mut self) -> bool {
        if self.loading {
            tracing::debug!("generate ignored: request already in flight");
            return false;
        }
        let Some(image) = self.selected.clone() else {
            tracing::debug!("generate ignored: no image selected");
            return false;
        };

        self.loading = true;
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.in_flight = Some(request_id);
        let selection = self.selection_generation;

        tracing::info!(request_id, file = %image.file_name, "caption request dispatched");

        let service = Arc::clone(&self.service);
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let started = Instant::now();
            let result = panic::catch_unwind(AssertUnwindSafe(|| service.caption(&image)))
                .unwrap_or_else(|payload| {
                    Err(CaptionError::Panicked(panic_message(&*payload)))
                });
            let _ = tx.send(CaptionResponse {
                request_id,
                selection,
                elapsed: started.elapsed(),
                result,
            });
        });
        true
    }

    /// Apply finished requests. Returns the last completion applied, if any.
    pub fn poll(&mut self) -> Option<Completion> {
        let mut last = None;
        while let Ok(response) = self.response_rx.try_recv() {
            last = Some(self.finish_request(response));
        }
        last
    }

    fn finish_request(&mut self, response: CaptionResponse) -> Completion {
        let CaptionResponse {
            request_id,
            selection,
            elapsed,
            result,
        } = response;

        if self.in_flight != Some(request_id) {
            tracing::warn!(request_id, "response for a request that is not in flight");
        }

        let completion = if selection != self.selection_generation {
            tracing::warn!(
                request_id,
                "selection changed while captioning; discarding response"
            );
            Completion::Discarded
        } else {
            match result {
                Ok(reply) => {
                    let caption = reply.caption.unwrap_or_else(|| {
                        tracing::warn!(request_id, "response had no caption field");
                        FALLBACK_CAPTION.to_string()
                    });
                    tracing::info!(
                        request_id,
                        elapsed = %humantime::format_duration(elapsed),
                        "caption received"
                    );
                    self.caption = caption.clone();
                    self.history.push(caption);
                    self.outcome = Some(Outcome::Succeeded);
                    Completion::Succeeded { elapsed }
                }
                Err(err) => {
                    tracing::error!(request_id, "caption generation error: {err}");
                    self.caption = FAILURE_MESSAGE.to_string();
                    self.outcome = Some(Outcome::Failed);
                    Completion::Failed { elapsed }
                }
            }
        };

        self.in_flight = None;
        self.loading = false;
        completion
    }

    /// Back to `Empty`. History and theme are left alone.
    pub fn clear_all(&mut self) {
        self.release_preview();
        self.selected = None;
        self.caption.clear();
        self.outcome = None;
        self.selection_generation += 1;
        self.picker.reset();
        tracing::info!("selection cleared");
    }

    pub fn toggle_theme(&mut self) -> ThemeMode {
        self.theme = self.theme.toggled();
        if let Some(path) = &self.theme_path {
            if let Err(err) = config::save_theme(path, self.theme) {
                tracing::warn!("failed to persist theme: {err:#}");
            }
        }
        tracing::debug!(theme = %self.theme, "theme toggled");
        self.theme
    }

    fn release_preview(&mut self) {
        if let Some(handle) = self.preview.take() {
            self.previews.release(handle);
        }
    }

    pub fn phase(&self) -> Phase {
        if self.loading {
            return Phase::Submitting;
        }
        match (&self.selected, self.outcome) {
            (None, _) => Phase::Empty,
            (Some(_), None) => Phase::Ready,
            (Some(_), Some(Outcome::Succeeded)) => Phase::Succeeded,
            (Some(_), Some(Outcome::Failed)) => Phase::Failed,
        }
    }

    pub fn selected(&self) -> Option<&SelectedImage> {
        self.selected.as_ref()
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.preview
            .as_ref()
            .and_then(|handle| self.previews.resolve(handle))
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    pub fn history(&self) -> &CaptionHistory {
        &self.history
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn theme(&self) -> ThemeMode {
        self.theme
    }

    pub fn picker(&self) -> &FilePicker {
        &self.picker
    }

    pub fn picker_mut(&mut self) -> &mut FilePicker {
        &mut self.picker
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase(),
            file_name: self.selected.as_ref().map(|image| image.file_name.clone()),
            preview_id: self.preview.as_ref().map(PreviewHandle::id),
            caption: self.caption.clone(),
            history: self.history.iter().map(str::to_string).collect(),
            loading: self.loading,
            theme: self.theme,
            picker_input: self.picker.input.clone(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
