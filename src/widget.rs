use crate::session::{
    CredentialsOutcome, PendingFile, SelectOutcome, SessionState, SessionView, UploadDispatch,
    WidgetError, WidgetFeatures,
};
use crate::transport::WebhookClient;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// One mounted chat widget: session state plus the webhook it talks to.
///
/// The state lock is released while a webhook call is outstanding, so a
/// chat reply and an upload reply can be pending at the same time. Each
/// one appends under the lock when it settles.
pub struct ChatWidget {
    id: String,
    state: Mutex<SessionState>,
    webhook: WebhookClient,
}

impl ChatWidget {
    pub fn new(
        id: impl Into<String>,
        welcome: &str,
        features: WidgetFeatures,
        webhook: WebhookClient,
    ) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(SessionState::new(welcome, features)),
            webhook,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn view(&self) -> SessionView {
        self.state.lock().await.view()
    }

    pub async fn update_input(&self, text: &str) -> SessionView {
        let mut state = self.state.lock().await;
        state.update_input(text);
        state.view()
    }

    pub async fn toggle_popup(&self) -> SessionView {
        let mut state = self.state.lock().await;
        let open = state.toggle_popup();
        debug!(widget = %self.id, open, "popup toggled");
        state.view()
    }

    pub async fn close_popup(&self) -> SessionView {
        let mut state = self.state.lock().await;
        state.close_popup();
        state.view()
    }

    /// Send text to the chat webhook and wait for the reply to be appended.
    /// Returns `None` when the text was blank and nothing was sent.
    pub async fn submit_text(&self, text: &str) -> Option<SessionView> {
        let dispatch = self.state.lock().await.submit_text(text)?;
        info!(widget = %self.id, "chat message dispatched");
        let reply = self
            .webhook
            .send_text(&dispatch.message, dispatch.history.as_deref())
            .await;
        let mut state = self.state.lock().await;
        state.settle_chat(reply);
        Some(state.view())
    }

    /// Take a selected file. Without the auth gate the upload runs here.
    pub async fn select_file(&self, file: PendingFile) -> Result<SessionView, WidgetError> {
        let outcome = self.state.lock().await.select_file(file)?;
        match outcome {
            SelectOutcome::AwaitingAuth => {
                debug!(widget = %self.id, "file waiting for credentials");
                Ok(self.view().await)
            }
            SelectOutcome::Dispatch(dispatch) => Ok(self.run_upload(dispatch).await),
        }
    }

    pub async fn submit_credentials(
        &self,
        user_id: &str,
        password: &str,
    ) -> Result<SessionView, WidgetError> {
        let outcome = self
            .state
            .lock()
            .await
            .submit_credentials(user_id, password)?;
        match outcome {
            CredentialsOutcome::Accepted(dispatch) => Ok(self.run_upload(dispatch).await),
            CredentialsOutcome::Rejected => {
                info!(widget = %self.id, "upload gate rejected credentials");
                Ok(self.view().await)
            }
        }
    }

    pub async fn cancel_auth(&self) -> SessionView {
        let mut state = self.state.lock().await;
        if state.cancel_auth() {
            debug!(widget = %self.id, "pending upload cancelled");
        }
        state.view()
    }

    async fn run_upload(&self, dispatch: UploadDispatch) -> SessionView {
        info!(widget = %self.id, filename = %dispatch.file.filename, "upload dispatched");
        let reply = self.webhook.send_file(&dispatch.file).await;
        let mut state = self.state.lock().await;
        state.settle_upload(reply);
        state.view()
    }
}
