use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::info;

/// Supplies the current credential session. Credential checks live behind it.
pub trait SessionProvider: Send + Sync + 'static {
    /// Opaque session token, or `None` when signed out.
    fn current_session(&self) -> impl Future<Output = Option<String>> + Send;

    fn sign_out(&self) -> impl Future<Output = ()> + Send;
}

/// Session given by configuration, e.g. a token provisioned for this device.
#[derive(Debug, Default)]
pub struct StaticSessionProvider {
    token: Mutex<Option<String>>,
}

impl StaticSessionProvider {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Mutex::new(token.filter(|t| !t.trim().is_empty())),
        }
    }
}

impl SessionProvider for StaticSessionProvider {
    async fn current_session(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn sign_out(&self) {
        self.token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }
}

/// Process-wide view of whether the client is signed in.
///
/// Initialised once at startup from the provider and torn down by
/// [`AuthContext::sign_out`]. Everything else only sees `is_authorized`.
pub struct AuthContext<P: SessionProvider> {
    provider: Arc<P>,
    authorized: Arc<watch::Sender<bool>>,
}

impl<P: SessionProvider> Clone for AuthContext<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            authorized: Arc::clone(&self.authorized),
        }
    }
}

impl<P: SessionProvider> AuthContext<P> {
    pub async fn init(provider: P) -> Self {
        let authorized = provider.current_session().await.is_some();
        info!(authorized, "Session context initialised");
        Self {
            provider: Arc::new(provider),
            authorized: Arc::new(watch::Sender::new(authorized)),
        }
    }

    pub fn is_authorized(&self) -> bool {
        *self.authorized.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<bool> {
        self.authorized.subscribe()
    }

    pub async fn sign_out(&self) {
        self.provider.sign_out().await;
        self.authorized.send_replace(false);
        info!("Signed out");
    }
}
