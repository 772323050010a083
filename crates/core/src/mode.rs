//! Auth-mode state machine.
//!
//! | From  | Event                           | To    | Effect              |
//! |-------|---------------------------------|-------|---------------------|
//! | Unset | ChooseFree (remaining > 0)      | Free  |                     |
//! | Unset | SubmitCredentials (valid pair)  | Byok  | persist credentials |
//! | Free  | SwitchToOwnKeys                 | Unset |                     |
//! | Free  | RequestFailed(free tier spent)  | Unset |                     |
//! | Byok  | ChangeKeys                      | Unset | keys stay pre-filled|
//! | Byok  | RequestFailed(invalid key)      | Unset | keys stay pre-filled|
//! | any   | Logout                          | Unset | clear store         |
//!
//! Anything else leaves the mode unchanged.

use socialmarket_auth::{AuthError, AuthMode, CredentialStore, Credentials};
use socialmarket_client::{ErrorCategory, FreeTierStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// Carries the quota as last checked; `None` means the check failed.
    ChooseFree(Option<FreeTierStatus>),
    SubmitCredentials(Credentials),
    SwitchToOwnKeys,
    ChangeKeys,
    RequestFailed(ErrorCategory),
    Logout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    PersistCredentials(Credentials),
    ClearCredentials,
    /// The event was refused; the mode did not change.
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: AuthMode,
    pub effect: Effect,
}

impl Transition {
    fn to(next: AuthMode) -> Self {
        Self {
            next,
            effect: Effect::None,
        }
    }
}

pub fn transition(mode: AuthMode, event: &AuthEvent) -> Transition {
    use AuthMode::*;

    match (mode, event) {
        (_, AuthEvent::Logout) => Transition {
            next: Unset,
            effect: Effect::ClearCredentials,
        },

        (Unset, AuthEvent::ChooseFree(status)) => match status {
            Some(s) if s.is_available() => Transition::to(Free),
            Some(_) => rejected(mode, "no free generations left today"),
            None => rejected(mode, "free tier is not available"),
        },

        (Unset, AuthEvent::SubmitCredentials(creds)) => match creds.validate() {
            Ok(()) => Transition {
                next: Byok,
                effect: Effect::PersistCredentials(creds.clone()),
            },
            Err(e) => rejected(mode, &e.to_string()),
        },

        (Free, AuthEvent::SwitchToOwnKeys) => Transition::to(Unset),
        (Free, AuthEvent::RequestFailed(ErrorCategory::FreeTierExhausted)) => Transition::to(Unset),

        (Byok, AuthEvent::ChangeKeys) => Transition::to(Unset),
        (Byok, AuthEvent::RequestFailed(ErrorCategory::InvalidKey)) => Transition::to(Unset),

        (_, _) => Transition::to(mode),
    }
}

fn rejected(mode: AuthMode, reason: &str) -> Transition {
    Transition {
        next: mode,
        effect: Effect::Rejected {
            reason: reason.to_string(),
        },
    }
}

/// What the front-end should show before the next submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// A mode is active; submit away.
    Ready,
    OfferFreeTier {
        status: FreeTierStatus,
        prefill: Option<Credentials>,
    },
    KeyEntry {
        prefill: Option<Credentials>,
    },
}

#[derive(Debug, Default)]
pub struct AuthController {
    mode: AuthMode,
    /// Active keys in `Byok`, pre-fill for key entry otherwise.
    credentials: Option<Credentials>,
}

impl AuthController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts in `Byok` when the store already holds a complete pair.
    pub fn resume(store: &dyn CredentialStore) -> Self {
        match store.load() {
            Some(creds) if creds.is_complete() => {
                tracing::info!("Resuming with stored credentials");
                Self {
                    mode: AuthMode::Byok,
                    credentials: Some(creds),
                }
            }
            partial => Self {
                mode: AuthMode::Unset,
                credentials: partial,
            },
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn prompt(&self, status: Option<&FreeTierStatus>) -> Prompt {
        if self.mode != AuthMode::Unset {
            return Prompt::Ready;
        }
        let prefill = self.credentials.clone();
        match status {
            Some(s) if s.is_available() => Prompt::OfferFreeTier {
                status: *s,
                prefill,
            },
            _ => Prompt::KeyEntry { prefill },
        }
    }

    /// Runs the transition and its side effect. Only store failures error.
    pub fn apply(
        &mut self,
        event: AuthEvent,
        store: &dyn CredentialStore,
    ) -> Result<Effect, AuthError> {
        let Transition { next, effect } = transition(self.mode, &event);

        match &effect {
            Effect::PersistCredentials(creds) => {
                store.save(creds)?;
                self.credentials = Some(creds.clone());
            }
            Effect::ClearCredentials => {
                store.clear()?;
                self.credentials = None;
            }
            Effect::Rejected { reason } => {
                tracing::debug!(mode = %self.mode, %reason, "Auth event rejected");
            }
            Effect::None => {}
        }

        if next != self.mode {
            tracing::info!(from = %self.mode, to = %next, "Auth mode changed");
            self.mode = next;
        }
        Ok(effect)
    }
}
