//! Success ping for external monitoring (healthchecks.io and friends).

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::errors::HealthcheckError;

const PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends a single GET to a configured URL.
pub struct Healthcheck {
    url: String,
    http: reqwest::Client,
}

impl Healthcheck {
    pub fn new(url: impl Into<String>) -> Result<Self, HealthcheckError> {
        let http = reqwest::Client::builder().timeout(PING_TIMEOUT).build()?;
        Ok(Self {
            url: url.into(),
            http,
        })
    }

    /// Issue the GET. Non-2xx answers are reported as errors.
    pub async fn ping(&self) -> Result<(), HealthcheckError> {
        debug!(url = %self.url, "pinging healthcheck");
        let resp = self.http.get(&self.url).send().await?;
        if !resp.status().is_success() {
            return Err(HealthcheckError::BadStatus(resp.status().as_u16()));
        }
        info!("healthcheck pinged");
        Ok(())
    }
}

/// Ping `url`, logging instead of returning failures.
pub async fn ping_best_effort(url: &str) {
    let result = match Healthcheck::new(url) {
        Ok(check) => check.ping().await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        warn!(error = %e, "healthcheck ping failed");
    }
}
