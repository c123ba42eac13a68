//! Bounded polling of application endpoints.
//!
//! Mutations are never retried, but their effects take time to become
//! visible. Verifiers absorb that convergence delay by probing on a fixed
//! interval within a budget. Running out of budget is a failed [`Outcome`],
//! never an error.
use crate::app::TestApp;
use crate::config::HarnessConfig;
use crate::probe::{HttpProber, ProbeResponse};
use regex::Regex;
use serde::Serialize;
use std::thread;
use std::time::{Duration, Instant};

/// HTTP status the platform proxy returns for an idled or busy app.
const TEMPORARILY_UNAVAILABLE: u16 = 503;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub success: bool,
    pub attempts: u32,
    pub last_status: Option<u16>,
    pub last_body: Option<String>,
}

impl Outcome {
    fn record(&mut self, response: ProbeResponse) {
        self.attempts += 1;
        self.last_status = response.status;
        self.last_body = response.body;
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccessCheck {
    pub secure: bool,
    pub port: Option<u16>,
    /// Overrides the app's derived hostname.
    pub host: Option<String>,
    pub timeout: Option<Duration>,
}

impl AccessCheck {
    pub fn insecure() -> Self {
        AccessCheck::default()
    }

    pub fn secure() -> Self {
        AccessCheck {
            secure: true,
            ..AccessCheck::default()
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

pub struct Verifier<'a> {
    prober: &'a dyn HttpProber,
    interval: Duration,
    access_timeout: Duration,
    inaccessible_timeout: Duration,
    content_attempts: u32,
    confirmations: u32,
}

impl<'a> Verifier<'a> {
    pub fn new(prober: &'a dyn HttpProber, config: &HarnessConfig) -> Self {
        Verifier {
            prober,
            interval: config.poll_interval(),
            access_timeout: config.access_timeout(),
            inaccessible_timeout: config.inaccessible_timeout(),
            content_attempts: config.content_attempts,
            confirmations: config.inaccessible_confirmations,
        }
    }

    /// Poll until one probe succeeds or the budget runs out.
    pub fn is_accessible(&self, app: &TestApp, check: &AccessCheck) -> Outcome {
        let host = check.host.clone().unwrap_or_else(|| app.hostname());
        let budget = check.timeout.unwrap_or(self.access_timeout);
        let outcome = self.poll(budget, |outcome| {
            let response = self.prober.fetch(&host, check.port, check.secure);
            let ok = response.ok();
            outcome.record(response);
            ok
        });
        tracing::info!(
            app = %app.name,
            %host,
            secure = check.secure,
            port = ?check.port,
            attempts = outcome.attempts,
            accessible = outcome.success,
            "accessibility check"
        );
        outcome
    }

    /// Poll until the endpoint has failed `confirmations` probes in a row.
    ///
    /// A success resets the streak, so an app that is still flapping during
    /// convergence is not reported as durably down. The budget defaults to
    /// the (shorter) inaccessibility timeout.
    pub fn is_inaccessible(&self, app: &TestApp, check: &AccessCheck) -> Outcome {
        let host = check.host.clone().unwrap_or_else(|| app.hostname());
        let budget = check.timeout.unwrap_or(self.inaccessible_timeout);
        let mut streak = 0u32;
        let outcome = self.poll(budget, |outcome| {
            let response = self.prober.fetch(&host, check.port, check.secure);
            if response.ok() {
                streak = 0;
            } else {
                streak += 1;
            }
            outcome.record(response);
            streak >= self.confirmations
        });
        tracing::info!(
            app = %app.name,
            %host,
            secure = check.secure,
            port = ?check.port,
            attempts = outcome.attempts,
            inaccessible = outcome.success,
            "inaccessibility check"
        );
        outcome
    }

    /// Poll until the proxy answers with 503 for the app.
    pub fn is_temporarily_unavailable(&self, app: &TestApp) -> Outcome {
        let host = app.hostname();
        let outcome = self.poll(self.access_timeout, |outcome| {
            let response = self.prober.fetch(&host, None, false);
            let unavailable = response.status == Some(TEMPORARILY_UNAVAILABLE);
            outcome.record(response);
            unavailable
        });
        tracing::info!(
            app = %app.name,
            attempts = outcome.attempts,
            unavailable = outcome.success,
            "temporary unavailability check"
        );
        outcome
    }

    /// Probe up to `content_attempts` times for a body matching `marker`,
    /// then take one final observation and judge that.
    pub fn wait_for_content(
        &self,
        app: &TestApp,
        check: &AccessCheck,
        marker: &Regex,
    ) -> Outcome {
        let host = check.host.clone().unwrap_or_else(|| app.hostname());
        let mut outcome = Outcome::default();
        for attempt in 0..self.content_attempts {
            let response = self.prober.fetch(&host, check.port, check.secure);
            let matched = body_matches(&response, marker);
            outcome.record(response);
            if matched {
                break;
            }
            if attempt + 1 < self.content_attempts {
                thread::sleep(self.interval);
            }
        }
        let response = self.prober.fetch(&host, check.port, check.secure);
        outcome.success = body_matches(&response, marker);
        outcome.record(response);
        tracing::info!(
            app = %app.name,
            marker = marker.as_str(),
            attempts = outcome.attempts,
            matched = outcome.success,
            "content check"
        );
        outcome
    }

    fn poll(&self, budget: Duration, mut attempt: impl FnMut(&mut Outcome) -> bool) -> Outcome {
        let start = Instant::now();
        let mut outcome = Outcome::default();
        loop {
            if attempt(&mut outcome) {
                outcome.success = true;
                return outcome;
            }
            tracing::debug!(
                attempts = outcome.attempts,
                status = ?outcome.last_status,
                "probe not satisfied"
            );
            if start.elapsed() + self.interval > budget {
                return outcome;
            }
            thread::sleep(self.interval);
        }
    }
}

fn body_matches(response: &ProbeResponse, marker: &Regex) -> bool {
    response
        .body
        .as_deref()
        .is_some_and(|body| marker.is_match(body))
}

/// Compile a content marker; literal unless `is_regex`.
pub fn marker_regex(marker: &str, is_regex: bool) -> Result<Regex, regex::Error> {
    if is_regex {
        Regex::new(marker)
    } else {
        Regex::new(&regex::escape(marker))
    }
}

#[cfg(test)]
#[path = "verify_tests.rs"]
mod tests;
