use std::time::Instant;

use async_trait::async_trait;

use helmsman_core::domain::capability::CapabilityGroup;

use super::{Capability, CapabilityArgs, CapabilityError, ParameterKind, ParameterSpec};
use crate::context::ExecutionContext;

/// Probes a URL with a GET request and reports status and latency.
pub struct GetUrl;

#[async_trait]
impl Capability for GetUrl {
    fn name(&self) -> &str {
        "getUrl"
    }

    fn description(&self) -> &str {
        "Call a URL and return the status code and response time"
    }

    fn group(&self) -> CapabilityGroup {
        CapabilityGroup::NetworkProbe
    }

    fn parameters(&self) -> &[ParameterSpec] {
        const PARAMETERS: &[ParameterSpec] = &[ParameterSpec::required(
            "url",
            ParameterKind::String,
            "Absolute http(s) URL to call",
        )];
        PARAMETERS
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        args: &CapabilityArgs,
    ) -> Result<String, CapabilityError> {
        let url = args.str("url")?.trim();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(CapabilityError::InvalidArguments(format!(
                "`{url}` is not an http(s) URL"
            )));
        }

        let started = Instant::now();
        let response = ctx
            .http()
            .get(url)
            .send()
            .await
            .map_err(|err| CapabilityError::Http(err.to_string()))?;
        let elapsed = started.elapsed();

        Ok(format!(
            "GET request to {url} returned status code {} in {}ms",
            response.status(),
            elapsed.as_millis()
        ))
    }
}
