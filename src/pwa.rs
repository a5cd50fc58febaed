//! Installability handling and background worker registration.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallOutcome {
    Accepted,
    Dismissed,
}

/// A retained installability offer that can be replayed later.
#[async_trait]
pub trait DeferredPrompt: Send + Sync {
    /// Shows the install dialog.
    async fn prompt(&self) -> anyhow::Result<()>;
    /// Waits for the user to accept or dismiss the dialog.
    async fn user_choice(&self) -> InstallOutcome;
}

#[derive(Default)]
struct PromptState {
    deferred: Option<Arc<dyn DeferredPrompt>>,
    button_visible: bool,
}

const DEFAULT_CHOICE_TIMEOUT: Duration = Duration::from_secs(120);

pub struct InstallPrompt {
    state: Mutex<PromptState>,
    choice_timeout: Duration,
}

impl Default for InstallPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallPrompt {
    pub fn new() -> Self {
        Self::with_choice_timeout(DEFAULT_CHOICE_TIMEOUT)
    }

    /// `choice_timeout` bounds how long a click waits for the user's answer.
    pub fn with_choice_timeout(choice_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(PromptState::default()),
            choice_timeout,
        }
    }

    /// Handles the "app is installable" signal: the offer is retained and
    /// the install button revealed.
    pub async fn on_installable(&self, prompt: Arc<dyn DeferredPrompt>) {
        let mut state = self.state.lock().await;
        state.deferred = Some(prompt);
        state.button_visible = true;
        info!("Install prompt deferred, showing install button");
    }

    pub async fn button_visible(&self) -> bool {
        self.state.lock().await.button_visible
    }

    pub async fn has_deferred(&self) -> bool {
        self.state.lock().await.deferred.is_some()
    }

    /// Install button click. Returns `None` when there is no retained offer
    /// or no answer arrived within the choice timeout.
    ///
    /// The lock is not held while waiting on the user.
    pub async fn click(&self) -> Option<InstallOutcome> {
        let deferred = self.state.lock().await.deferred.clone()?;

        if let Err(e) = deferred.prompt().await {
            error!("Failed to show install prompt: {}", e);
            return None;
        }
        let outcome = match tokio::time::timeout(self.choice_timeout, deferred.user_choice()).await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("No install choice within {:?}", self.choice_timeout);
                return None;
            }
        };
        info!("Install prompt outcome: {:?}", outcome);

        if outcome == InstallOutcome::Accepted {
            let mut state = self.state.lock().await;
            state.button_visible = false;
            state.deferred = None;
        }
        Some(outcome)
    }
}

struct ClientInstall {
    install: Arc<InstallPrompt>,
    prompt: Arc<BrowserPrompt>,
}

/// Install state per browser, keyed by client id. A client that never
/// reported an installable signal has no entry.
pub struct InstallClients {
    clients: Mutex<HashMap<String, ClientInstall>>,
    choice_timeout: Duration,
}

impl Default for InstallClients {
    fn default() -> Self {
        Self::new(DEFAULT_CHOICE_TIMEOUT)
    }
}

impl InstallClients {
    pub fn new(choice_timeout: Duration) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            choice_timeout,
        }
    }

    /// Records a fresh offer for `client`, replacing any earlier one.
    pub async fn on_installable(&self, client: &str) {
        let prompt = Arc::new(BrowserPrompt::new());
        let mut clients = self.clients.lock().await;
        let install = match clients.get(client) {
            Some(existing) => existing.install.clone(),
            None => Arc::new(InstallPrompt::with_choice_timeout(self.choice_timeout)),
        };
        install.on_installable(prompt.clone()).await;
        clients.insert(client.to_string(), ClientInstall { install, prompt });
    }

    /// The client's install prompt, if it holds a deferred offer.
    pub async fn pending(&self, client: &str) -> Option<Arc<InstallPrompt>> {
        let install = self.clients.lock().await.get(client)?.install.clone();
        install.has_deferred().await.then_some(install)
    }

    pub async fn button_visible(&self, client: &str) -> bool {
        let install = match self.clients.lock().await.get(client) {
            Some(entry) => entry.install.clone(),
            None => return false,
        };
        install.button_visible().await
    }

    /// Delivers the user's answer to the client's current offer.
    pub async fn resolve(&self, client: &str, outcome: InstallOutcome) -> bool {
        match self.clients.lock().await.get(client) {
            Some(entry) => entry.prompt.resolve(outcome),
            None => false,
        }
    }
}

/// Offer reported by the browser. The dialog itself runs client side; the
/// choice arrives later through [`BrowserPrompt::resolve`].
pub struct BrowserPrompt {
    sender: std::sync::Mutex<Option<oneshot::Sender<InstallOutcome>>>,
    receiver: Mutex<Option<oneshot::Receiver<InstallOutcome>>>,
}

impl BrowserPrompt {
    pub fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            sender: std::sync::Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Delivers the user's choice. Returns false when a choice was already
    /// delivered.
    pub fn resolve(&self, outcome: InstallOutcome) -> bool {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(sender) => sender.send(outcome).is_ok(),
            None => false,
        }
    }
}

impl Default for BrowserPrompt {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeferredPrompt for BrowserPrompt {
    async fn prompt(&self) -> anyhow::Result<()> {
        info!("Asking browser to show install prompt");
        Ok(())
    }

    async fn user_choice(&self) -> InstallOutcome {
        let mut slot = self.receiver.lock().await;
        // An offer can only be answered once
        let Some(receiver) = slot.as_mut() else {
            return InstallOutcome::Dismissed;
        };
        // Awaiting by reference keeps the receiver if this wait is abandoned
        let outcome = receiver.await.unwrap_or(InstallOutcome::Dismissed);
        *slot = None;
        outcome
    }
}

/// Checks that the background worker script exists so it can be served.
/// Failure is logged and otherwise ignored.
pub fn register_service_worker(script: &Path) -> bool {
    match std::fs::metadata(script) {
        Ok(meta) if meta.is_file() => {
            info!("Service Worker Registered: {}", script.display());
            true
        }
        Ok(_) => {
            warn!("SW registration failed: {} is not a file", script.display());
            false
        }
        Err(e) => {
            warn!("SW registration failed: {}: {}", script.display(), e);
            false
        }
    }
}
