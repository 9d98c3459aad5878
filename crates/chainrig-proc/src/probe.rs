//! Readiness probe evaluation.

use std::path::Path;
use std::time::Duration;

use tracing::trace;

use crate::spec::ReadinessProbe;

/// Timeout applied to each HTTP probe request.
pub const HTTP_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared HTTP client for probes.
pub fn probe_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_PROBE_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Evaluate `probe` once. Unreachable endpoints and missing log files count
/// as "not ready", not as errors.
pub async fn check(probe: &ReadinessProbe, log_path: &Path, client: &reqwest::Client) -> bool {
    match probe {
        ReadinessProbe::Immediate => true,
        ReadinessProbe::LogLine { pattern } => match tokio::fs::read(log_path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).contains(pattern.as_str()),
            Err(e) => {
                trace!(path = %log_path.display(), error = %e, "log not readable yet");
                false
            }
        },
        ReadinessProbe::Http { url } => match client.get(url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                trace!(url = %url, error = %e, "http probe failed");
                false
            }
        },
    }
}
