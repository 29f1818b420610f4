//! Fix actions and their target-admin contracts
//!
//! Every action shares the same `apply(context)` shape and reports
//! `{success, message}`. Adding an action means a new
//! [`FixActionKind`] variant plus a new arm here.

use futures::future::join_all;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use warden_common::config::AutoFixConfig;
use warden_common::{BreakerRegistry, FixActionKind};

const FORCE_CHECK_TIMEOUT: Duration = Duration::from_secs(15);
const WARM_UP_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything an action needs to touch the target
pub struct FixContext<'a> {
    pub client: &'a reqwest::Client,
    pub base_url: &'a str,
    /// Path of the endpoint whose failure triggered remediation
    pub endpoint: &'a str,
    /// Latency observed on the failing probe, in milliseconds
    pub baseline_latency_ms: u64,
    pub breakers: &'a BreakerRegistry,
    pub config: &'a AutoFixConfig,
    pub pattern_key: &'a str,
}

/// Result of one action application
#[derive(Debug, Clone)]
pub struct FixOutcome {
    pub success: bool,
    pub message: String,
}

impl FixOutcome {
    fn ok(message: impl Into<String>) -> Self {
        FixOutcome {
            success: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        FixOutcome {
            success: false,
            message: message.into(),
        }
    }
}

/// Apply one fix action against the target.
pub async fn apply(action: FixActionKind, ctx: &FixContext<'_>) -> FixOutcome {
    debug!(
        "applying {} for '{}' on {}",
        action.as_str(),
        ctx.pattern_key,
        ctx.endpoint
    );
    match action {
        FixActionKind::ForceHealthCheck => force_health_check(ctx).await,
        FixActionKind::ClearCache => clear_cache(ctx).await,
        FixActionKind::WarmUpApplication => warm_up(ctx).await,
        FixActionKind::ResetCircuitBreaker => reset_breaker(ctx).await,
        FixActionKind::RestartService => {
            FixOutcome::failed("remote service cannot be restarted")
        }
    }
}

/// Re-probe the affected endpoint with a cache-buster.
async fn force_health_check(ctx: &FixContext<'_>) -> FixOutcome {
    let url = format!(
        "{}{}?force=true&t={}",
        ctx.base_url,
        ctx.endpoint,
        chrono::Utc::now().timestamp_millis()
    );
    match ctx
        .client
        .get(&url)
        .timeout(FORCE_CHECK_TIMEOUT)
        .send()
        .await
    {
        Ok(response) if response.status().is_success() || response.status().is_redirection() => {
            FixOutcome::ok(format!("forced check returned {}", response.status().as_u16()))
        }
        Ok(response) => FixOutcome::failed(format!(
            "forced check returned {}",
            response.status().as_u16()
        )),
        Err(e) => FixOutcome::failed(format!("forced check failed: {}", e)),
    }
}

/// Ask the target to drop its caches through the admin route.
async fn clear_cache(ctx: &FixContext<'_>) -> FixOutcome {
    let url = format!("{}{}", ctx.base_url, ctx.config.clear_cache_path);
    match ctx
        .client
        .post(&url)
        .header("X-Auto-Fix", "true")
        .header("X-Fix-Pattern", ctx.pattern_key)
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => {
            FixOutcome::ok("cache cleared".to_string())
        }
        Ok(response) => FixOutcome::failed(format!(
            "cache clear returned {}",
            response.status().as_u16()
        )),
        Err(e) => FixOutcome::failed(format!("cache clear failed: {}", e)),
    }
}

/// Hit the main paths in parallel to repopulate caches, then verify
/// that a test request beats 80% of the failing baseline.
async fn warm_up(ctx: &FixContext<'_>) -> FixOutcome {
    let requests = ctx.config.warm_up_paths.iter().map(|path| {
        let url = format!("{}{}", ctx.base_url, path);
        async move {
            if let Err(e) = ctx.client.get(&url).send().await {
                warn!("warm-up request to {} failed: {}", url, e);
            }
        }
    });
    join_all(requests).await;

    let test_url = format!("{}/", ctx.base_url);
    let started = Instant::now();
    match ctx
        .client
        .get(&test_url)
        .timeout(WARM_UP_TEST_TIMEOUT)
        .send()
        .await
    {
        Ok(_) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            let baseline = ctx.baseline_latency_ms.max(1);
            let target = (baseline as f64) * 0.8;
            if (elapsed_ms as f64) < target {
                FixOutcome::ok(format!(
                    "warmed up; test latency {}ms beats baseline {}ms",
                    elapsed_ms, baseline
                ))
            } else {
                FixOutcome::failed(format!(
                    "warm-up test latency {}ms did not beat 80% of baseline {}ms",
                    elapsed_ms, baseline
                ))
            }
        }
        Err(e) => FixOutcome::failed(format!("warm-up test request failed: {}", e)),
    }
}

/// Reset the breaker guarding the affected endpoint.
async fn reset_breaker(ctx: &FixContext<'_>) -> FixOutcome {
    match ctx.breakers.get(ctx.endpoint) {
        Some(breaker) => {
            breaker.reset().await;
            FixOutcome::ok(format!("breaker for {} reset", ctx.endpoint))
        }
        None => FixOutcome::failed(format!("no breaker registered for {}", ctx.endpoint)),
    }
}
