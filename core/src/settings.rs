//! Process-wide request hooks and timeout.
//!
//! # Design
//! One `Settings` value is installed globally and snapshotted (as an `Arc`) at
//! the start of every exchange, so replacing it never affects a request that
//! is already in flight. Hooks return a `HookVerdict` instead of a bare bool:
//! a vetoed request always settles its future with a rejection.

use std::fmt;
use std::sync::{Arc, LazyLock, RwLock};
use std::time::Duration;

use crate::http::{HttpRequest, HttpResponse};

/// Environment variable read by `Settings::from_env`, in milliseconds.
pub const TIMEOUT_ENV: &str = "RESTMODEL_TIMEOUT_MS";

/// What a before-request hook decided.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HookVerdict {
    #[default]
    Proceed,
    /// Skip the send and reject with `RestError::Aborted`.
    Abort,
    /// Skip the send and reject with `RestError::Vetoed`.
    Reject(String),
}

/// Consulted before a request is sent.
pub type BeforeHook = Arc<dyn Fn(&HttpRequest) -> HookVerdict + Send + Sync>;

/// Called once the transport settled. The response is `None` when no
/// response was received at all.
pub type AfterHook = Arc<dyn Fn(&HttpRequest, Option<&HttpResponse>) + Send + Sync>;

#[derive(Clone, Default)]
pub struct Settings {
    pub before_every_request: Option<BeforeHook>,
    pub after_every_request: Option<AfterHook>,
    pub timeout: Option<Duration>,
}

impl Settings {
    /// Settings with no hooks and the timeout taken from `RESTMODEL_TIMEOUT_MS`.
    ///
    /// A missing, unparseable or zero value means no timeout.
    pub fn from_env() -> Self {
        Self {
            timeout: parse_timeout(std::env::var(TIMEOUT_ENV).ok().as_deref()),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn before_every_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HttpRequest) -> HookVerdict + Send + Sync + 'static,
    {
        self.before_every_request = Some(Arc::new(hook));
        self
    }

    pub fn after_every_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HttpRequest, Option<&HttpResponse>) + Send + Sync + 'static,
    {
        self.after_every_request = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("before_every_request", &self.before_every_request.is_some())
            .field("after_every_request", &self.after_every_request.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn parse_timeout(raw: Option<&str>) -> Option<Duration> {
    raw.and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

static GLOBAL: LazyLock<RwLock<Arc<Settings>>> =
    LazyLock::new(|| RwLock::new(Arc::new(Settings::from_env())));

/// The currently installed settings.
pub fn current() -> Arc<Settings> {
    match GLOBAL.read() {
        Ok(guard) => Arc::clone(&guard),
        Err(poisoned) => Arc::clone(&poisoned.into_inner()),
    }
}

/// Replace the global settings. Requests already executing keep the old ones.
pub fn install(settings: Settings) {
    let settings = Arc::new(settings);
    match GLOBAL.write() {
        Ok(mut guard) => *guard = settings,
        Err(poisoned) => *poisoned.into_inner() = settings,
    }
}
