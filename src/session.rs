use crate::auth::check_credentials;
use crate::format::format_as_points;
use crate::transport::BotReply;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_WELCOME: &str = "👋 Hi there! Start typing to chat with us.";
pub const PDF_CONTENT_TYPE: &str = "application/pdf";
const AUTH_FAILED_TEXT: &str = "❌ Authentication failed. The file was not uploaded.";
const TIME_FORMAT: &str = "%I:%M %p";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// One chat bubble. Never mutated after it has been appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    pub time: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text.into(), false)
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(Sender::Bot, text.into(), false)
    }

    pub fn bot_error(text: impl Into<String>) -> Self {
        Self::new(Sender::Bot, text.into(), true)
    }

    fn new(sender: Sender, text: String, is_error: bool) -> Self {
        Self {
            sender,
            text,
            time: chrono::Local::now().format(TIME_FORMAT).to_string(),
            is_error,
        }
    }
}

/// A selected file held until the upload gate lets it through.
#[derive(Clone)]
pub struct PendingFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for PendingFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingFile")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Toggles that reproduce each generation of the widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetFeatures {
    pub send_history: bool,
    pub format_replies: bool,
    pub uploads: bool,
    pub auth_gate: bool,
}

impl Default for WidgetFeatures {
    fn default() -> Self {
        Self {
            send_history: true,
            format_replies: true,
            uploads: true,
            auth_gate: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    AwaitingChatResponse,
    AwaitingAuth,
    AwaitingUploadResponse,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WidgetError {
    #[error("only PDF files can be uploaded (got {content_type})")]
    NotPdf { content_type: String },
    #[error("file uploads are disabled for this widget")]
    UploadsDisabled,
    #[error("no file is waiting for credentials")]
    NoPendingFile,
}

/// Chat request that the caller must send and later settle.
#[derive(Debug, Clone)]
pub struct ChatDispatch {
    pub message: String,
    pub history: Option<Vec<Message>>,
}

/// Upload request that the caller must send and later settle.
#[derive(Debug, Clone)]
pub struct UploadDispatch {
    pub file: PendingFile,
}

#[derive(Debug)]
pub enum SelectOutcome {
    AwaitingAuth,
    Dispatch(UploadDispatch),
}

#[derive(Debug)]
pub enum CredentialsOutcome {
    Accepted(UploadDispatch),
    Rejected,
}

/// State of one mounted widget.
///
/// Transitions that start a request return a dispatch value; the owner
/// performs the I/O without holding this state and reports the result
/// through `settle_chat` / `settle_upload`.
#[derive(Debug)]
pub struct SessionState {
    features: WidgetFeatures,
    messages: Vec<Message>,
    input: String,
    popup_open: bool,
    pending_file: Option<PendingFile>,
    auth_prompt_visible: bool,
    chats_in_flight: usize,
    uploads_in_flight: usize,
}

impl SessionState {
    pub fn new(welcome: &str, features: WidgetFeatures) -> Self {
        Self {
            features,
            messages: vec![Message::bot(welcome)],
            input: String::new(),
            popup_open: false,
            pending_file: None,
            auth_prompt_visible: false,
            chats_in_flight: 0,
            uploads_in_flight: 0,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.chats_in_flight + self.uploads_in_flight > 0
    }

    pub fn pending_file(&self) -> Option<&PendingFile> {
        self.pending_file.as_ref()
    }

    pub fn auth_prompt_visible(&self) -> bool {
        self.auth_prompt_visible
    }

    pub fn phase(&self) -> Phase {
        if self.auth_prompt_visible {
            Phase::AwaitingAuth
        } else if self.uploads_in_flight > 0 {
            Phase::AwaitingUploadResponse
        } else if self.chats_in_flight > 0 {
            Phase::AwaitingChatResponse
        } else {
            Phase::Idle
        }
    }

    pub fn update_input(&mut self, text: &str) {
        self.input = text.to_string();
    }

    pub fn toggle_popup(&mut self) -> bool {
        self.popup_open = !self.popup_open;
        self.popup_open
    }

    pub fn close_popup(&mut self) {
        self.popup_open = false;
    }

    /// Optimistically append the user's text. Blank input is ignored.
    pub fn submit_text(&mut self, text: &str) -> Option<ChatDispatch> {
        if text.trim().is_empty() {
            return None;
        }
        let history = self.features.send_history.then(|| self.messages.clone());
        self.messages.push(Message::user(text));
        self.input.clear();
        self.chats_in_flight += 1;
        Some(ChatDispatch {
            message: text.to_string(),
            history,
        })
    }

    pub fn settle_chat(&mut self, reply: BotReply) {
        self.chats_in_flight = self.chats_in_flight.saturating_sub(1);
        let message = self.reply_message(reply);
        self.messages.push(message);
    }

    /// Accept a PDF. Anything else is rejected without touching the state.
    pub fn select_file(&mut self, file: PendingFile) -> Result<SelectOutcome, WidgetError> {
        if !self.features.uploads {
            return Err(WidgetError::UploadsDisabled);
        }
        if !is_pdf(&file.content_type) {
            return Err(WidgetError::NotPdf {
                content_type: file.content_type,
            });
        }
        if self.features.auth_gate {
            self.pending_file = Some(file);
            self.auth_prompt_visible = true;
            return Ok(SelectOutcome::AwaitingAuth);
        }
        Ok(SelectOutcome::Dispatch(self.begin_upload(file)))
    }

    pub fn submit_credentials(
        &mut self,
        user_id: &str,
        password: &str,
    ) -> Result<CredentialsOutcome, WidgetError> {
        if !self.auth_prompt_visible {
            return Err(WidgetError::NoPendingFile);
        }
        let file = self.pending_file.take().ok_or(WidgetError::NoPendingFile)?;
        self.auth_prompt_visible = false;
        if !check_credentials(user_id, password) {
            self.messages.push(Message::bot_error(AUTH_FAILED_TEXT));
            return Ok(CredentialsOutcome::Rejected);
        }
        Ok(CredentialsOutcome::Accepted(self.begin_upload(file)))
    }

    /// Drop the pending file. Returns whether anything was pending.
    pub fn cancel_auth(&mut self) -> bool {
        let had_file = self.pending_file.take().is_some();
        self.auth_prompt_visible = false;
        had_file
    }

    pub fn settle_upload(&mut self, reply: BotReply) {
        self.uploads_in_flight = self.uploads_in_flight.saturating_sub(1);
        // Keep a file that is still uploading or waiting on the auth prompt.
        if self.uploads_in_flight == 0 && !self.auth_prompt_visible {
            self.pending_file = None;
        }
        let message = self.reply_message(reply);
        self.messages.push(message);
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            phase: self.phase(),
            messages: self.messages().to_vec(),
            is_loading: self.is_loading(),
            input: self.input.clone(),
            popup_open: self.popup_open,
            auth_prompt_visible: self.auth_prompt_visible(),
            pending_filename: self.pending_file().map(|f| f.filename.clone()),
        }
    }

    fn begin_upload(&mut self, file: PendingFile) -> UploadDispatch {
        self.messages
            .push(Message::user(format!("📄 Uploading {}", file.filename)));
        self.pending_file = Some(file.clone());
        self.uploads_in_flight += 1;
        UploadDispatch { file }
    }

    fn reply_message(&self, reply: BotReply) -> Message {
        match reply {
            BotReply::Text(text) if self.features.format_replies => {
                Message::bot(format_as_points(&text))
            }
            BotReply::Text(text) => Message::bot(text),
            BotReply::Failed(reason) => Message::bot_error(reason),
        }
    }
}

/// Serializable projection handed to the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub phase: Phase,
    pub messages: Vec<Message>,
    pub is_loading: bool,
    pub input: String,
    pub popup_open: bool,
    pub auth_prompt_visible: bool,
    pub pending_filename: Option<String>,
}

fn is_pdf(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case(PDF_CONTENT_TYPE))
        .unwrap_or(false)
}
