use socialmarket_auth::{AuthError, AuthMode, CredentialStore, Credentials};
use socialmarket_client::{
    Backend, CampaignBrief, CampaignResponse, Classified, ErrorCategory, FreeTierStatus,
    ModeHint,
};

use crate::mode::{AuthController, AuthEvent, Effect, Prompt};

/// Result of one user submission.
#[derive(Debug)]
pub enum Outcome {
    Generated(CampaignResponse),
    /// No mode is active; nothing was sent.
    NeedsAuth(Prompt),
    /// `prompt` is set when the failure sent the user back to credential entry.
    /// `error.hint` is `Keep` whenever the mode did not change.
    Failed {
        error: Classified,
        prompt: Option<Prompt>,
    },
}

/// One client session: the auth controller plus the store and backend it
/// drives. `submit` takes `&mut self`, so only one request is ever in flight.
pub struct Session {
    backend: Box<dyn Backend>,
    store: Box<dyn CredentialStore>,
    controller: AuthController,
    free_tier: Option<FreeTierStatus>,
}

impl Session {
    pub fn start(backend: Box<dyn Backend>, store: Box<dyn CredentialStore>) -> Self {
        let controller = AuthController::resume(store.as_ref());
        Self {
            backend,
            store,
            controller,
            free_tier: None,
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.controller.mode()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.controller.credentials()
    }

    pub fn free_tier(&self) -> Option<FreeTierStatus> {
        self.free_tier
    }

    /// Re-reads the quota. A failure just means the free tier is not offered.
    pub async fn refresh_free_tier(&mut self) -> Option<FreeTierStatus> {
        self.free_tier = match self.backend.free_tier_status().await {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::warn!(error = %e, "Free tier status unavailable; requiring API keys");
                None
            }
        };
        self.free_tier
    }

    pub fn prompt(&self) -> Prompt {
        self.controller.prompt(self.free_tier.as_ref())
    }

    pub fn choose_free(&mut self) -> Result<Effect, AuthError> {
        let status = self.free_tier;
        self.handle(AuthEvent::ChooseFree(status))
    }

    pub fn submit_credentials(&mut self, credentials: Credentials) -> Result<Effect, AuthError> {
        self.handle(AuthEvent::SubmitCredentials(credentials))
    }

    pub fn switch_to_own_keys(&mut self) -> Result<Effect, AuthError> {
        self.handle(AuthEvent::SwitchToOwnKeys)
    }

    pub fn change_keys(&mut self) -> Result<Effect, AuthError> {
        self.handle(AuthEvent::ChangeKeys)
    }

    pub fn logout(&mut self) -> Result<Effect, AuthError> {
        self.handle(AuthEvent::Logout)
    }

    fn handle(&mut self, event: AuthEvent) -> Result<Effect, AuthError> {
        self.controller.apply(event, self.store.as_ref())
    }

    pub async fn submit(&mut self, brief: &CampaignBrief, wants_image: bool) -> Outcome {
        let mode = self.controller.mode();
        if mode == AuthMode::Unset {
            return Outcome::NeedsAuth(self.prompt());
        }

        let credentials = match mode {
            AuthMode::Byok => self.controller.credentials(),
            _ => None,
        };

        let err = match self
            .backend
            .dispatch(brief, mode, credentials, wants_image)
            .await
        {
            Ok(response) => return Outcome::Generated(response),
            Err(err) => err,
        };

        let mut error = err.classify();
        tracing::info!(category = %error.category, %mode, "Campaign request failed");

        match error.category {
            ErrorCategory::FreeTierExhausted => {
                if let Some(status) = self.free_tier.as_mut() {
                    status.remaining = 0;
                }
            }
            ErrorCategory::FreeTierUnavailable => self.free_tier = None,
            _ => {}
        }

        if let Err(e) = self.handle(AuthEvent::RequestFailed(error.category)) {
            tracing::warn!(error = %e, "Could not apply auth transition");
        }

        if self.controller.mode() == mode {
            error.hint = ModeHint::Keep;
        }

        let prompt = (self.controller.mode() == AuthMode::Unset).then(|| self.prompt());
        Outcome::Failed { error, prompt }
    }
}
