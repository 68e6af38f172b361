pub mod builder;
pub mod config;
pub mod error;
pub mod mask;
pub mod raster;
pub mod response;
pub mod transport;
mod util;
pub mod validate;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use editai_contracts::chat::{ChatEntry, ImageSource, Submission, SUGGESTED_TOPICS};
use editai_contracts::events::{EventKind, EventPayload, EventWriter};
use editai_contracts::models::{ModelRegistry, ModelSelector};
use editai_contracts::options::{Mode, OptionField};
use editai_contracts::session::{Action, SessionState, Target};
use editai_contracts::uploads::{UploadSlot, UploadedAsset};
use log::{debug, info, warn};
use serde_json::{json, Value};

pub use builder::{build_request, Endpoint, ProviderRequest, RequestBody};
pub use config::ClientConfig;
pub use error::{SubmitError, SubmitErrorKind};
pub use mask::{MaskEditor, MaskScript, Tool};
pub use transport::{transport_from_config, DryrunTransport, HttpReply, ImageTransport, OpenAiTransport};

use crate::response::interpret_reply;
use crate::util::{error_chain_text, map_object, push_unique_warning};
use crate::validate::validate_submission;

pub const DEFAULT_DOWNLOAD_NAME: &str = "ai-image.png";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub entry_index: usize,
    pub image_count: usize,
    pub model: String,
    pub warnings: Vec<String>,
}

/// Drives one chat session: owns the state, performs requests through the
/// transport and records every step in the event log.
///
/// Requests run synchronously on the caller's thread, so the in-flight flag in
/// the state only has to guard against re-entry from the same caller.
pub struct Engine {
    state: SessionState,
    selector: ModelSelector,
    transport: Box<dyn ImageTransport>,
    events: EventWriter,
    mask: Option<MaskEditor>,
}

impl Engine {
    pub fn new(transport: Box<dyn ImageTransport>, events: EventWriter) -> Self {
        let engine = Self {
            state: SessionState::new(),
            selector: ModelSelector::new(None),
            transport,
            events,
            mask: None,
        };
        engine.emit(
            EventKind::SessionStarted,
            map_object(json!({
                "transport": engine.transport.name(),
                "mode": engine.state.mode().as_str(),
            })),
        );
        engine
    }

    pub fn from_config(config: &ClientConfig, events: EventWriter) -> Result<Self> {
        Ok(Self::new(transport_from_config(config)?, events))
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.selector.registry
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn mask_editor(&self) -> Option<&MaskEditor> {
        self.mask.as_ref()
    }

    pub fn change_mode(&mut self, mode: Mode) -> Result<()> {
        self.state
            .apply(Action::ModeChanged(mode))
            .map_err(anyhow::Error::msg)?;
        self.mask = None;
        self.emit(
            EventKind::ModeChanged,
            map_object(json!({ "mode": mode.as_str() })),
        );
        Ok(())
    }

    /// Stores an option for the active mode. The returned note says when the
    /// value will not be used as given by the current model.
    pub fn set_option(&mut self, field: OptionField, raw: &str) -> Result<Option<String>> {
        self.state
            .apply(Action::OptionEdited {
                field,
                value: raw.to_string(),
            })
            .map_err(anyhow::Error::msg)?;
        let mode = self.state.mode();
        self.emit(
            EventKind::OptionChanged,
            map_object(json!({
                "mode": mode.as_str(),
                "field": field.as_str(),
                "value": self.state.options().get(field),
            })),
        );
        Ok(self.option_note(field))
    }

    pub fn set_prompt(&mut self, text: &str) -> Result<()> {
        self.state
            .apply(Action::PromptEdited(text.to_string()))
            .map_err(anyhow::Error::msg)
    }

    pub fn attach(&mut self, slot: UploadSlot, asset: Option<UploadedAsset>) -> Result<()> {
        if slot == UploadSlot::Mask && self.state.mode() != Mode::Edit {
            bail!("Masks only apply to edit mode.");
        }
        self.state
            .apply(Action::UploadAttached { slot, asset })
            .map_err(anyhow::Error::msg)?;
        if slot == UploadSlot::Image {
            self.mask = None;
        }
        Ok(())
    }

    pub fn attach_path(&mut self, slot: UploadSlot, path: &Path) -> Result<()> {
        let asset = UploadedAsset::from_path(path)?;
        debug!(
            "attached {} as {} ({}, {} bytes)",
            path.display(),
            slot.as_str(),
            asset.mime_type,
            asset.byte_len()
        );
        self.attach(slot, Some(asset))
    }

    /// Prefills the prompt with suggested topic `index` (zero-based).
    pub fn use_topic(&mut self, index: usize) -> Result<&'static str> {
        let mode = self.state.mode();
        if !mode.requires_prompt() {
            bail!("{mode} mode does not use a prompt.");
        }
        let Some(&(_, prompt)) = SUGGESTED_TOPICS.get(index) else {
            bail!(
                "No topic {}; choose 1 to {}.",
                index + 1,
                SUGGESTED_TOPICS.len()
            );
        };
        self.set_prompt(prompt)?;
        Ok(prompt)
    }

    pub fn submit(&mut self) -> Result<SubmitOutcome, SubmitError> {
        let mode = self.state.mode();
        let prompt = self.state.prompt().trim().to_string();
        let user_text = match mode {
            Mode::Variation => "Create variation".to_string(),
            Mode::Generate | Mode::Edit => prompt.clone(),
        };
        let origin = Submission {
            mode,
            options: self.state.options().clone(),
            prompt,
            uploads: self.state.uploads().clone(),
            user_index: None,
        };
        self.run_submission(origin, Some(user_text), Target::Append)
    }

    /// Reissues the request recorded on image entry `index` and swaps the
    /// result into the same slot. No user entry is added.
    pub fn regenerate(&mut self, index: usize) -> Result<SubmitOutcome, SubmitError> {
        let origin = match self.state.chat().get(index) {
            Some(ChatEntry::Image { origin, .. }) => origin.clone(),
            Some(ChatEntry::User { .. }) => {
                return Err(SubmitError::Validation(format!(
                    "Entry {index} is a prompt, not an image."
                )))
            }
            None => {
                return Err(SubmitError::Validation(format!(
                    "No chat entry at index {index}."
                )))
            }
        };
        let outcome = self.run_submission(origin, None, Target::Replace(index))?;
        self.emit(
            EventKind::EntryRegenerated,
            map_object(json!({
                "entry": index,
                "image_count": outcome.image_count,
            })),
        );
        Ok(outcome)
    }

    pub fn image_source(&self, index: usize, image: usize) -> Result<ImageSource> {
        let images = self
            .state
            .chat()
            .get(index)
            .and_then(ChatEntry::images)
            .with_context(|| format!("Entry {index} has no images."))?;
        images.get(image).cloned().with_context(|| {
            format!(
                "Entry {index} has {} image(s); index {image} is out of range.",
                images.len()
            )
        })
    }

    /// Writes image `image` of entry `index` to `dest`. A missing destination
    /// or a directory gets [`DEFAULT_DOWNLOAD_NAME`].
    pub fn download(&self, index: usize, image: usize, dest: Option<&Path>) -> Result<PathBuf> {
        let source = self.image_source(index, image)?;
        let bytes = match &source {
            ImageSource::DataUri { base64, .. } => BASE64
                .decode(base64.as_bytes())
                .context("image base64 decode failed")?,
            ImageSource::Url(url) => self.transport.fetch(url)?,
        };
        let path = match dest {
            None => PathBuf::from(DEFAULT_DOWNLOAD_NAME),
            Some(dir) if dir.is_dir() => dir.join(DEFAULT_DOWNLOAD_NAME),
            Some(path) => path.to_path_buf(),
        };
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed creating {}", parent.display()))?;
        }
        fs::write(&path, &bytes).with_context(|| format!("failed to write {}", path.display()))?;
        info!("saved entry {index} image {image} to {}", path.display());
        self.emit(
            EventKind::ImageDownloaded,
            map_object(json!({
                "entry": index,
                "image": image,
                "path": path.to_string_lossy(),
                "bytes": bytes.len(),
            })),
        );
        Ok(path)
    }

    pub fn expand(&mut self, index: usize, image: usize) -> Result<ImageSource> {
        self.state
            .apply(Action::Expanded {
                entry: index,
                image,
            })
            .map_err(anyhow::Error::msg)?;
        self.image_source(index, image)
    }

    pub fn close_expanded(&mut self) -> Result<()> {
        self.state
            .apply(Action::ExpandClosed)
            .map_err(anyhow::Error::msg)
    }

    /// Runs `script` on the mask canvas for the attached edit image and
    /// attaches the result as the mask. Successive scripts keep painting on
    /// the same canvas until the image or mode changes.
    pub fn draw_mask(&mut self, script: &MaskScript) -> Result<&MaskEditor> {
        if self.state.mode() != Mode::Edit {
            bail!("Masks are drawn in edit mode; switch with /mode edit.");
        }
        let Some(image) = self.state.uploads().image.as_ref() else {
            bail!("Attach an image before drawing a mask.");
        };
        let mut editor = match self.mask.take() {
            Some(editor) => editor,
            None => MaskEditor::for_source(image)?,
        };
        let painted = editor.run_script(script);
        let asset = painted.and_then(|()| editor.edit_mask_asset());
        let (width, height) = editor.dimensions();
        let strokes = editor.stroke_count();
        let painted_pixels = editor.painted_pixels();
        self.mask = Some(editor);
        let asset = asset?;

        self.state
            .apply(Action::UploadAttached {
                slot: UploadSlot::Mask,
                asset: Some(asset),
            })
            .map_err(anyhow::Error::msg)?;
        self.emit(
            EventKind::MaskSaved,
            map_object(json!({
                "width": width,
                "height": height,
                "strokes": strokes,
                "painted_pixels": painted_pixels,
                "attached": true,
            })),
        );
        self.mask.as_ref().context("mask editor missing after drawing")
    }

    /// Writes the drawn mask to disk: the API mask, or the canvas as drawn
    /// when `overlay` is set.
    pub fn save_mask(&self, path: &Path, overlay: bool) -> Result<PathBuf> {
        let Some(editor) = self.mask.as_ref() else {
            bail!("No mask has been drawn yet.");
        };
        let bytes = if overlay {
            editor.export_png()?
        } else {
            editor.export_edit_mask()?
        };
        fs::write(path, &bytes).with_context(|| format!("failed to write {}", path.display()))?;
        let (width, height) = editor.dimensions();
        self.emit(
            EventKind::MaskSaved,
            map_object(json!({
                "width": width,
                "height": height,
                "path": path.to_string_lossy(),
                "overlay": overlay,
            })),
        );
        Ok(path.to_path_buf())
    }

    fn run_submission(
        &mut self,
        origin: Submission,
        user_text: Option<String>,
        target: Target,
    ) -> Result<SubmitOutcome, SubmitError> {
        if self.state.is_submitting() {
            return Err(SubmitError::Busy);
        }
        let mode = origin.mode;
        let request = match self.prepare(&origin) {
            Ok(request) => request,
            Err(message) => {
                if let Err(err) = self.state.apply(Action::ValidationFailed(message.clone())) {
                    warn!("could not record validation failure: {err}");
                }
                self.emit(
                    EventKind::ValidationFailed,
                    map_object(json!({
                        "mode": mode.as_str(),
                        "message": message,
                    })),
                );
                return Err(SubmitError::Validation(message));
            }
        };

        self.state
            .apply(Action::SubmitStarted { user_text, target })
            .map_err(SubmitError::Validation)?;
        for warning in &request.warnings {
            warn!("{warning}");
        }
        let mut started = request.manifest();
        started.insert("mode".to_string(), Value::String(mode.as_str().to_string()));
        started.insert("target".to_string(), target_value(target));
        self.emit(EventKind::SubmissionStarted, started);

        let prompt = match mode {
            Mode::Variation => "Variation".to_string(),
            Mode::Generate | Mode::Edit => origin.prompt.clone(),
        };
        let result = self
            .transport
            .send(&request)
            .map_err(|err| SubmitError::Transport(error_chain_text(&err, 512)))
            .and_then(|reply| interpret_reply(&request, &reply))
            .and_then(|images| {
                let image_count = images.len();
                self.state
                    .apply(Action::ResponseArrived {
                        prompt,
                        images,
                        origin,
                    })
                    .map(|()| image_count)
                    .map_err(SubmitError::Transport)
            });

        match result {
            Ok(image_count) => {
                let entry_index = match target {
                    Target::Append => self.state.chat().len().saturating_sub(1),
                    Target::Replace(index) => index,
                };
                self.emit(
                    EventKind::SubmissionFinished,
                    map_object(json!({
                        "mode": mode.as_str(),
                        "model": request.model,
                        "entry": entry_index,
                        "image_count": image_count,
                        "warnings": request.warnings,
                    })),
                );
                Ok(SubmitOutcome {
                    entry_index,
                    image_count,
                    model: request.model,
                    warnings: request.warnings,
                })
            }
            Err(err) => {
                if let Err(state_err) = self.state.apply(Action::RequestFailed(err.message().to_string()))
                {
                    warn!("could not record request failure: {state_err}");
                }
                let status = match &err {
                    SubmitError::Http { status, .. } => Value::from(*status),
                    _ => Value::Null,
                };
                self.emit(
                    EventKind::SubmissionFailed,
                    map_object(json!({
                        "mode": mode.as_str(),
                        "model": request.model,
                        "kind": err.kind().as_str(),
                        "status": status,
                        "message": err.message(),
                    })),
                );
                Err(err)
            }
        }
    }

    /// Model selection, validation and request building; any failure here
    /// is local and nothing is sent.
    fn prepare(&self, origin: &Submission) -> Result<ProviderRequest, String> {
        let selection = self
            .selector
            .select(Some(origin.options.model.as_str()), origin.mode)?;
        validate_submission(
            &selection.model,
            origin.mode,
            &origin.options,
            &origin.prompt,
            &origin.uploads,
        )?;
        let mut request = build_request(
            &selection.model,
            origin.mode,
            &origin.options,
            &origin.prompt,
            &origin.uploads,
        )?;
        if let Some(reason) = selection.fallback_reason {
            let mut warnings = vec![reason];
            for warning in request.warnings.drain(..) {
                push_unique_warning(&mut warnings, warning);
            }
            request.warnings = warnings;
        }
        Ok(request)
    }

    fn option_note(&self, field: OptionField) -> Option<String> {
        let mode = self.state.mode();
        let options = self.state.options();
        let selection = self.selector.select(Some(options.model.as_str()), mode).ok()?;
        let model = &selection.model;
        match field {
            OptionField::Model => selection.fallback_reason,
            OptionField::Size if !model.supports_size(options.size.trim()) => Some(format!(
                "{} does not support size '{}'; {} will be used.",
                model.name,
                options.size,
                model.default_size()
            )),
            OptionField::Size => None,
            OptionField::N if mode != Mode::Edit => None,
            _ if model.rule_for(mode, field).is_none() && field != OptionField::N => {
                Some(format!(
                    "{} does not use {field} in {mode} mode; it will not be sent.",
                    model.name
                ))
            }
            OptionField::N => Some(format!(
                "{mode} mode always returns one image; n will not be sent."
            )),
            _ => None,
        }
    }

    fn emit(&self, kind: EventKind, payload: EventPayload) {
        if let Err(err) = self.events.emit(kind, payload) {
            warn!("event log write failed ({}): {err:#}", kind.as_str());
        }
    }
}

fn target_value(target: Target) -> Value {
    match target {
        Target::Append => json!("append"),
        Target::Replace(index) => json!({ "replace": index }),
    }
}
