use crate::chat::log::{ChatEntry, ChatLog, ImageSet, Submission};
use crate::options::{Mode, OptionField, RequestOptions};
use crate::uploads::{UploadSlot, UploadedAsset, Uploads};

pub const BUSY_MESSAGE: &str = "A request is already in progress.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Submitting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Append,
    Replace(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandedView {
    pub entry: usize,
    pub image: usize,
}

/// One option record per mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeOptions {
    generate: RequestOptions,
    edit: RequestOptions,
    variation: RequestOptions,
}

impl ModeOptions {
    pub fn get(&self, mode: Mode) -> &RequestOptions {
        match mode {
            Mode::Generate => &self.generate,
            Mode::Edit => &self.edit,
            Mode::Variation => &self.variation,
        }
    }

    fn get_mut(&mut self, mode: Mode) -> &mut RequestOptions {
        match mode {
            Mode::Generate => &mut self.generate,
            Mode::Edit => &mut self.edit,
            Mode::Variation => &mut self.variation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    target: Target,
    user_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ModeChanged(Mode),
    OptionEdited { field: OptionField, value: String },
    PromptEdited(String),
    UploadAttached {
        slot: UploadSlot,
        asset: Option<UploadedAsset>,
    },
    ValidationFailed(String),
    SubmitStarted {
        user_text: Option<String>,
        target: Target,
    },
    ResponseArrived {
        prompt: String,
        images: ImageSet,
        origin: Submission,
    },
    RequestFailed(String),
    Expanded { entry: usize, image: usize },
    ExpandClosed,
}

/// The whole front-end state. All changes go through [`SessionState::apply`],
/// which checks a transition before touching anything, so a rejected action
/// leaves the state as it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    mode: Mode,
    options: ModeOptions,
    prompt: String,
    uploads: Uploads,
    phase: Phase,
    pending: Option<Pending>,
    form_error: Option<String>,
    error: Option<String>,
    chat: ChatLog,
    expanded: Option<ExpandedView>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            mode: Mode::Generate,
            options: ModeOptions::default(),
            prompt: String::new(),
            uploads: Uploads::default(),
            phase: Phase::Idle,
            pending: None,
            form_error: None,
            error: None,
            chat: ChatLog::new(),
            expanded: None,
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn options(&self) -> &RequestOptions {
        self.options_for(self.mode)
    }

    pub fn options_for(&self, mode: Mode) -> &RequestOptions {
        self.options.get(mode)
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn uploads(&self) -> &Uploads {
        &self.uploads
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_submitting(&self) -> bool {
        self.phase == Phase::Submitting
    }

    pub fn form_error(&self) -> Option<&str> {
        self.form_error.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    pub fn expanded(&self) -> Option<ExpandedView> {
        self.expanded
    }

    pub fn apply(&mut self, action: Action) -> Result<(), String> {
        match action {
            Action::ModeChanged(mode) => {
                self.ensure_idle()?;
                self.mode = mode;
                self.options = ModeOptions::default();
                self.uploads = Uploads::default();
                self.prompt.clear();
                self.form_error = None;
                self.error = None;
            }
            Action::OptionEdited { field, value } => {
                self.ensure_idle()?;
                self.options.get_mut(self.mode).set(field, &value)?;
            }
            Action::PromptEdited(prompt) => {
                self.ensure_idle()?;
                self.prompt = prompt;
            }
            Action::UploadAttached { slot, asset } => {
                self.ensure_idle()?;
                *self.uploads.slot_mut(slot) = asset;
            }
            Action::ValidationFailed(message) => {
                self.ensure_idle()?;
                self.form_error = Some(message);
            }
            Action::SubmitStarted { user_text, target } => {
                self.ensure_idle()?;
                if let Target::Replace(index) = target {
                    match self.chat.get(index) {
                        Some(ChatEntry::Image { .. }) => {}
                        Some(ChatEntry::User { .. }) => {
                            return Err(format!("Entry {index} is a prompt, not an image."));
                        }
                        None => return Err(format!("No chat entry at index {index}.")),
                    }
                }
                self.form_error = None;
                self.error = None;
                let user_index = user_text.map(|text| self.chat.push(ChatEntry::User { text }));
                if user_index.is_some() {
                    self.prompt.clear();
                }
                self.phase = Phase::Submitting;
                self.pending = Some(Pending { target, user_index });
            }
            Action::ResponseArrived {
                prompt,
                images,
                mut origin,
            } => {
                let target = self
                    .pending
                    .as_ref()
                    .map(|pending| pending.target)
                    .ok_or_else(|| "No request is in progress.".to_string())?;
                // A rejected response keeps the request pending for RequestFailed.
                if let Target::Replace(index) = target {
                    if !matches!(self.chat.get(index), Some(ChatEntry::Image { .. })) {
                        return Err(format!("No image entry at index {index} to replace."));
                    }
                }
                let pending = self.take_pending()?;
                match pending.target {
                    Target::Append => {
                        origin.user_index = pending.user_index;
                        self.chat.push(ChatEntry::Image {
                            prompt,
                            images,
                            origin,
                        });
                    }
                    Target::Replace(index) => {
                        if let Some(ChatEntry::Image { origin: previous, .. }) = self.chat.get(index)
                        {
                            origin.user_index = previous.user_index;
                        }
                        let image_count = images.len();
                        self.chat.replace(
                            index,
                            ChatEntry::Image {
                                prompt,
                                images,
                                origin,
                            },
                        )?;
                        if self
                            .expanded
                            .is_some_and(|view| view.entry == index && view.image >= image_count)
                        {
                            self.expanded = None;
                        }
                    }
                }
            }
            Action::RequestFailed(message) => {
                self.take_pending()?;
                self.error = Some(message);
            }
            Action::Expanded { entry, image } => {
                let images = self
                    .chat
                    .get(entry)
                    .and_then(ChatEntry::images)
                    .ok_or_else(|| format!("Entry {entry} has no images."))?;
                if images.get(image).is_none() {
                    return Err(format!(
                        "Entry {entry} has {} image(s); index {image} is out of range.",
                        images.len()
                    ));
                }
                self.expanded = Some(ExpandedView { entry, image });
            }
            Action::ExpandClosed => {
                self.expanded = None;
            }
        }
        Ok(())
    }

    fn ensure_idle(&self) -> Result<(), String> {
        if self.is_submitting() {
            return Err(BUSY_MESSAGE.to_string());
        }
        Ok(())
    }

    fn take_pending(&mut self) -> Result<Pending, String> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| "No request is in progress.".to_string())?;
        self.phase = Phase::Idle;
        Ok(pending)
    }
}
