//! The signed-in session, held explicitly and observed through a watch
//! channel rather than looked up globally.

use std::sync::Arc;

use feedline_shared::models::Profile;
use feedline_shared::service::{AuthService, AuthSession, AuthUser};
use feedline_shared::types::UserId;
use feedline_shared::ServiceError;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{ClientError, ClientResult};
use crate::events::{ClientEvent, EventBus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: AuthUser,
    pub access_token: String,
    /// The user's profile once it has been loaded or provisioned.
    pub profile: Option<Profile>,
}

impl Session {
    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    fn from_auth(auth: AuthSession) -> Self {
        Self {
            user: auth.user,
            access_token: auth.access_token,
            profile: None,
        }
    }

    fn auth_session(&self) -> AuthSession {
        AuthSession {
            user: self.user.clone(),
            access_token: self.access_token.clone(),
        }
    }
}

/// Current identity plus sign-in/sign-up/sign-out. Cheap to clone; clones
/// share the same session.
#[derive(Clone)]
pub struct SessionStore {
    auth: Arc<dyn AuthService>,
    tx: Arc<watch::Sender<Option<Session>>>,
    events: EventBus,
}

impl SessionStore {
    pub fn new(auth: Arc<dyn AuthService>, events: EventBus) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            auth,
            tx: Arc::new(tx),
            events,
        }
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> ClientResult<Session> {
        let (email, password) = credentials(email, password)?;
        let auth = self.auth.sign_up(email, password).await.map_err(auth_error)?;
        info!(user_id = %auth.user.id, "signed up");
        Ok(self.start(Session::from_auth(auth)))
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> ClientResult<Session> {
        let (email, password) = credentials(email, password)?;
        let auth = self.auth.sign_in(email, password).await.map_err(auth_error)?;
        info!(user_id = %auth.user.id, "signed in");
        Ok(self.start(Session::from_auth(auth)))
    }

    /// Sign out. The local session is cleared even if the remote call fails.
    pub async fn sign_out(&self) -> ClientResult<()> {
        let Some(session) = self.current() else {
            return Ok(());
        };

        if let Err(e) = self.auth.sign_out(&session.auth_session()).await {
            warn!(error = %e, "remote sign-out failed");
        }
        self.replace(None);
        info!(user_id = %session.user_id(), "signed out");
        Ok(())
    }

    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.tx.borrow().as_ref().map(Session::user_id)
    }

    pub fn require_user(&self) -> ClientResult<UserId> {
        self.user_id().ok_or(ClientError::NotSignedIn)
    }

    /// Observe sign-in, sign-out and profile changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }

    /// Cache `profile` on the session if it belongs to the signed-in user.
    pub fn set_profile(&self, profile: Profile) {
        let user_id = profile.id;
        let changed = self.tx.send_if_modified(|current| match current {
            Some(session) if session.user.id == user_id => {
                if session.profile.as_ref() == Some(&profile) {
                    return false;
                }
                session.profile = Some(profile);
                true
            }
            _ => false,
        });

        if changed {
            self.events.emit(ClientEvent::ProfileChanged { user_id });
        }
    }

    fn start(&self, session: Session) -> Session {
        self.replace(Some(session.clone()));
        session
    }

    fn replace(&self, session: Option<Session>) {
        let user_id = session.as_ref().map(Session::user_id);
        self.tx.send_replace(session);
        self.events.emit(ClientEvent::SessionChanged { user_id });
    }
}

fn credentials<'a>(email: &'a str, password: &'a str) -> ClientResult<(&'a str, &'a str)> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(ClientError::Auth("Please fill in all fields".into()));
    }
    Ok((email, password))
}

fn auth_error(e: ServiceError) -> ClientError {
    warn!(error = %e, "authentication failed");
    match e {
        ServiceError::Auth(message) => ClientError::Auth(message),
        other => ClientError::Auth(other.to_string()),
    }
}
