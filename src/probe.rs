//! HTTP(S) probing of application endpoints.
use crate::config::HarnessConfig;
use anyhow::Result;
use std::time::Duration;

/// What a single probe observed. `status` is `None` when no response arrived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: Option<u16>,
    pub body: Option<String>,
}

impl ProbeResponse {
    pub fn unreachable() -> Self {
        ProbeResponse::default()
    }

    pub fn ok(&self) -> bool {
        matches!(self.status, Some(code) if (200..300).contains(&code))
    }
}

pub trait HttpProber: Sync {
    /// Fetch `/` from `host`. Connection failures are reported as an
    /// unreachable response rather than an error.
    fn fetch(&self, host: &str, port: Option<u16>, secure: bool) -> ProbeResponse;
}

pub fn endpoint_url(host: &str, port: Option<u16>, secure: bool) -> String {
    let scheme = if secure { "https" } else { "http" };
    match port {
        Some(port) => format!("{scheme}://{host}:{port}/"),
        None => format!("{scheme}://{host}/"),
    }
}

pub struct UreqProber {
    agent: ureq::Agent,
}

impl UreqProber {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(config.request_timeout(), config.insecure_tls)
    }

    pub fn new(timeout: Duration, insecure_tls: bool) -> Self {
        let tls = ureq::tls::TlsConfig::builder()
            .disable_verification(insecure_tls)
            .build();
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .tls_config(tls)
            .build()
            .into();
        UreqProber { agent }
    }

    fn try_fetch(&self, url: &str) -> Result<ProbeResponse> {
        let mut response = self.agent.get(url).call()?;
        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string().ok();
        Ok(ProbeResponse {
            status: Some(status),
            body,
        })
    }
}

impl HttpProber for UreqProber {
    fn fetch(&self, host: &str, port: Option<u16>, secure: bool) -> ProbeResponse {
        let url = endpoint_url(host, port, secure);
        match self.try_fetch(&url) {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(%url, error = %err, "probe failed");
                ProbeResponse::unreachable()
            }
        }
    }
}
