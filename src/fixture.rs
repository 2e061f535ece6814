//! Fixture manager
//!
//! Acquires one fresh isolated context per scenario and guarantees it is
//! released once, whichever way the scenario ends.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::driver::{BrowserLauncher, Context, ContextKind, Driver, HttpContext, UiSession};
use crate::scenario::{Scenario, ScenarioResult, ScenarioRunner, ScenarioStatus};
use crate::webdriver::WebDriverLauncher;

/// Lifecycle counters
#[derive(Debug, Default)]
pub struct FixtureStats {
    acquired: AtomicUsize,
    released: AtomicUsize,
    leaked: AtomicUsize,
    acquire_failures: AtomicUsize,
}

impl FixtureStats {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Fixtures dropped without an explicit release
    pub fn leaked(&self) -> usize {
        self.leaked.load(Ordering::SeqCst)
    }

    pub fn acquire_failures(&self) -> usize {
        self.acquire_failures.load(Ordering::SeqCst)
    }

    /// Acquired fixtures that are neither released nor leaked
    pub fn outstanding(&self) -> usize {
        self.acquired()
            .saturating_sub(self.released() + self.leaked())
    }
}

/// An acquired context, owned by one scenario run
pub struct Fixture {
    id: u64,
    kind: ContextKind,
    context: Option<Context>,
    stats: Arc<FixtureStats>,
}

impl Fixture {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    /// The live context; an error once released
    pub fn context(&self) -> Result<&Context> {
        self.context.as_ref().ok_or_else(|| {
            Error::Environment(format!("Fixture {} has already been released", self.id))
        })
    }

    pub fn is_released(&self) -> bool {
        self.context.is_none()
    }
}

impl std::fmt::Debug for Fixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fixture")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("released", &self.is_released())
            .finish()
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        self.stats.leaked.fetch_add(1, Ordering::SeqCst);
        tracing::warn!(fixture = self.id, kind = %self.kind, "Fixture dropped without release");

        // Can't await in drop; closing the session is best-effort.
        if let Context::Ui(session) = context {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = session.browser().close().await {
                        tracing::debug!(error = %e, "Closing leaked browser session failed");
                    }
                });
            }
        }
    }
}

/// Creates and releases isolated contexts
pub struct FixtureManager {
    default_headers: BTreeMap<String, String>,
    launcher: Option<Arc<dyn BrowserLauncher>>,
    stats: Arc<FixtureStats>,
    next_id: AtomicU64,
}

impl FixtureManager {
    pub fn new(default_headers: BTreeMap<String, String>, launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            default_headers,
            launcher: Some(launcher),
            stats: Arc::new(FixtureStats::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Manager that can only hand out HTTP contexts
    pub fn http_only(default_headers: BTreeMap<String, String>) -> Self {
        Self {
            default_headers,
            launcher: None,
            stats: Arc::new(FixtureStats::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// HTTP headers from `[http]`, browser sessions from `[ui]` via WebDriver
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.http.default_headers.clone(),
            Arc::new(WebDriverLauncher::from_config(&config.ui)),
        )
    }

    pub fn stats(&self) -> &FixtureStats {
        &self.stats
    }

    /// Establish a fresh context of the requested kind
    pub async fn acquire(&self, kind: ContextKind) -> Result<Fixture> {
        let context = match kind {
            ContextKind::Http => HttpContext::new(&self.default_headers).map(Context::Http),
            ContextKind::Ui => match &self.launcher {
                Some(launcher) => launcher.launch().await.map(|b| Context::Ui(UiSession::new(b))),
                None => Err(Error::Environment("No browser launcher configured".to_string())),
            },
        };

        let context = context.map_err(|e| {
            self.stats.acquire_failures.fetch_add(1, Ordering::SeqCst);
            match e {
                Error::Environment(_) => e,
                other => Error::Environment(format!("Failed to acquire {} context: {}", kind, other)),
            }
        })?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.stats.acquired.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(fixture = id, %kind, "Fixture acquired");

        Ok(Fixture {
            id,
            kind,
            context: Some(context),
            stats: Arc::clone(&self.stats),
        })
    }

    /// Release a fixture; later calls are no-ops
    ///
    /// The fixture counts as released even when closing the session fails;
    /// the failure is reported as an environment error.
    pub async fn release(&self, fixture: &mut Fixture) -> Result<()> {
        let Some(context) = fixture.context.take() else {
            return Ok(());
        };
        fixture.stats.released.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(fixture = fixture.id, kind = %fixture.kind, "Releasing fixture");

        match context {
            Context::Http(_) => Ok(()),
            Context::Ui(session) => session.browser().close().await.map_err(|e| {
                Error::Environment(format!("Failed to close browser session: {}", e))
            }),
        }
    }

    /// Acquire, run and release on every exit path
    pub async fn run_isolated(&self, runner: &ScenarioRunner, scenario: &Scenario, driver: &dyn Driver) -> ScenarioResult {
        let started = Instant::now();

        let acquired = tokio::select! {
            biased;
            _ = runner.cancellation().cancelled() => Err(Error::Cancelled),
            acquired = self.acquire(scenario.context) => acquired,
        };
        let mut fixture = match acquired {
            Ok(fixture) => fixture,
            Err(e) => {
                tracing::warn!(scenario = %scenario.id, error = %e, "Could not acquire fixture");
                return ScenarioResult::errored(&scenario.id, &e, started.elapsed());
            }
        };

        let outcome = runner.run(scenario, driver, &fixture).await;
        let released = self.release(&mut fixture).await;

        let mut result = match outcome {
            Ok(result) => result,
            Err(e) => ScenarioResult::errored(&scenario.id, &e, started.elapsed()),
        };
        if let Err(e) = released {
            tracing::warn!(scenario = %scenario.id, error = %e, "Fixture release failed");
            if result.status == ScenarioStatus::Passed {
                result.status = ScenarioStatus::Errored;
                result.error = Some((&e).into());
            }
        }
        result.duration_ms = started.elapsed().as_millis() as u64;
        result
    }
}
