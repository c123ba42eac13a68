//! Multi-application workflows.
//!
//! A batch is just an ordered list of apps created together. Each app runs
//! its own create workflow independently; the first failure (in app order)
//! aborts the batch. Nothing is rolled back: destroying a batch is a separate,
//! explicit step.
use crate::app::{NameAllocator, TestApp};
use crate::error::{HarnessError, HarnessResult};
use crate::lifecycle::Lifecycle;
use crate::verify::{AccessCheck, Outcome, Verifier};
use serde::Serialize;
use std::any::Any;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Budget for probes that go through the node web proxy ports.
pub const PROXY_TIMEOUT: Duration = Duration::from_secs(120);
const PROXY_HTTP_PORT: u16 = 8000;
const PROXY_HTTPS_PORT: u16 = 8443;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub apps: Vec<TestApp>,
}

impl Batch {
    pub fn names(&self) -> Vec<String> {
        self.apps.iter().map(|app| app.name.clone()).collect()
    }
}

/// A batch create that stopped early. `created` holds every app that did
/// reach live, so the caller can still record and later destroy them.
#[derive(Debug, Error)]
#[error("batch aborted at {}: {error}", .failed.name)]
pub struct BatchFailure {
    pub created: Vec<TestApp>,
    pub failed: TestApp,
    #[source]
    pub error: HarnessError,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppVerdict {
    pub app: String,
    pub check: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchVerdict {
    pub verdicts: Vec<AppVerdict>,
}

impl BatchVerdict {
    pub fn passed(&self) -> bool {
        self.verdicts.iter().all(|verdict| verdict.outcome.success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &AppVerdict> {
        self.verdicts
            .iter()
            .filter(|verdict| !verdict.outcome.success)
    }

    fn push(&mut self, app: &TestApp, check: &str, outcome: Outcome) {
        self.verdicts.push(AppVerdict {
            app: app.name.clone(),
            check: check.to_string(),
            outcome,
        });
    }
}

pub struct BatchOrchestrator<'a> {
    lifecycle: &'a Lifecycle<'a>,
    workers: usize,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(lifecycle: &'a Lifecycle<'a>) -> Self {
        BatchOrchestrator {
            workers: lifecycle.config().batch_workers.max(1),
            lifecycle,
        }
    }

    /// Create `count` apps of `app_type`, up to `workers` at a time.
    pub fn create(
        &self,
        count: usize,
        app_type: &str,
        scalable: bool,
        names: &mut NameAllocator,
    ) -> Result<Batch, Box<BatchFailure>> {
        let config = self.lifecycle.config();
        let mut pending: Vec<TestApp> = (0..count)
            .map(|_| TestApp::create_unique(app_type, scalable, config, names))
            .collect();
        tracing::info!(count, app_type, scalable, workers = self.workers, "creating batch");

        let mut created = Vec::with_capacity(count);
        while !pending.is_empty() {
            let take = self.workers.min(pending.len());
            let chunk: Vec<TestApp> = pending.drain(..take).collect();
            let results = self.create_chunk(chunk, scalable);
            let mut first_failure = None;
            for (app, result) in results {
                match result {
                    Ok(()) => created.push(app),
                    Err(error) if first_failure.is_none() => first_failure = Some((app, error)),
                    Err(error) => {
                        tracing::warn!(app = %app.name, %error, "additional batch failure");
                    }
                }
            }
            if let Some((failed, error)) = first_failure {
                tracing::warn!(app = %failed.name, %error, "batch aborted");
                return Err(Box::new(BatchFailure {
                    created,
                    failed,
                    error,
                }));
            }
        }
        Ok(Batch { apps: created })
    }

    /// Results come back in the chunk's original order.
    fn create_chunk(
        &self,
        chunk: Vec<TestApp>,
        scalable: bool,
    ) -> Vec<(TestApp, HarnessResult<()>)> {
        let lifecycle = self.lifecycle;
        if chunk.len() == 1 {
            return chunk
                .into_iter()
                .map(|mut app| {
                    let result = lifecycle.create_new(&mut app, scalable);
                    (app, result)
                })
                .collect();
        }
        thread::scope(|scope| {
            let handles: Vec<_> = chunk
                .into_iter()
                .map(|app| {
                    let mut worker_app = app.clone();
                    let handle = scope.spawn(move || {
                        let result = lifecycle.create_new(&mut worker_app, scalable);
                        (worker_app, result)
                    });
                    (app, handle)
                })
                .collect();
            handles
                .into_iter()
                .map(|(app, handle)| match handle.join() {
                    Ok(finished) => finished,
                    Err(payload) => {
                        let error = HarnessError::collaborator(
                            "create",
                            &app.name,
                            anyhow::anyhow!("worker panicked: {}", panic_message(&*payload)),
                        );
                        (app, Err(error))
                    }
                })
                .collect()
        })
    }

    /// Destroy every app in order; the first failure stops the loop.
    pub fn destroy_all(&self, batch: &mut Batch) -> HarnessResult<()> {
        for app in &mut batch.apps {
            self.lifecycle.destroy(app)?;
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Check every app over plain and secure transport. With `negate`, every
/// endpoint must instead be confirmed unreachable.
pub fn assert_accessible(verifier: &Verifier<'_>, batch: &Batch, negate: bool) -> BatchVerdict {
    let mut verdict = BatchVerdict::default();
    for app in &batch.apps {
        for (label, check) in [
            ("http", AccessCheck::insecure()),
            ("https", AccessCheck::secure()),
        ] {
            if negate {
                let outcome = verifier.is_inaccessible(app, &check);
                verdict.push(app, &format!("{label} inaccessible"), outcome);
            } else {
                let outcome = verifier.is_accessible(app, &check);
                verdict.push(app, &format!("{label} accessible"), outcome);
            }
        }
    }
    verdict
}

/// Probe of the node web proxy port for one transport.
pub fn proxy_check(secure: bool) -> AccessCheck {
    if secure {
        AccessCheck::secure().port(PROXY_HTTPS_PORT)
    } else {
        AccessCheck::insecure().port(PROXY_HTTP_PORT)
    }
}

/// Check every app through the node web proxy ports. With `negate`, the
/// proxy must instead stop answering within the normal inaccessibility budget.
pub fn assert_proxy_accessible(
    verifier: &Verifier<'_>,
    batch: &Batch,
    negate: bool,
) -> BatchVerdict {
    let mut verdict = BatchVerdict::default();
    for app in &batch.apps {
        for (label, secure) in [("proxy http", false), ("proxy https", true)] {
            let check = proxy_check(secure);
            if negate {
                let outcome = verifier.is_inaccessible(app, &check);
                verdict.push(app, &format!("{label} inaccessible"), outcome);
            } else {
                let outcome = verifier.is_accessible(app, &check.timeout(PROXY_TIMEOUT));
                verdict.push(app, label, outcome);
            }
        }
    }
    verdict
}

pub fn assert_temporarily_unavailable(verifier: &Verifier<'_>, batch: &Batch) -> BatchVerdict {
    let mut verdict = BatchVerdict::default();
    for app in &batch.apps {
        verdict.push(
            app,
            "temporarily unavailable",
            verifier.is_temporarily_unavailable(app),
        );
    }
    verdict
}
