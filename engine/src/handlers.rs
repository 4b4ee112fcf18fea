//! Command handlers for CLI operations
//!
//! - agent: Run the launchers until Ctrl-C
//! - bench: Run the wait-strategy harness and print the reports

use anyhow::{Context, Result};
use serde_json::json;

use crate::agent::{Agent, Backends};
use crate::config::Config;
use crate::launcher::ServiceState;
use crate::strategies::{run_strategy, StrategyKind, StrategyReport};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Run the agent until Ctrl-C
///
/// Fails after shutdown if the service never became ready.
pub async fn handle_agent(config: &Config, format: OutputFormat) -> Result<()> {
    let backends = Backends::from_config(config)?;
    run_agent(config, backends, format).await
}

async fn run_agent(config: &Config, backends: Backends, format: OutputFormat) -> Result<()> {
    let agent = Agent::start(config, backends)?;

    let outcome = tokio::select! {
        ready = agent.wait_ready(config.observe.timeout()) => match ready {
            Ok(service) => {
                report_ready(&agent, &service, format).await?;
                tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Received shutdown signal");
                Ok(())
            }
            Err(e) => {
                tracing::error!("agent did not become ready: {}", e);
                match format {
                    OutputFormat::Text => println!("✗ Agent not ready: {}", e),
                    OutputFormat::Json => {
                        let output = json!({ "status": "failed", "error": e.to_string() });
                        println!("{}", serde_json::to_string_pretty(&output)?);
                    }
                }
                Err(e)
            }
        },
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Received shutdown signal");
            Ok(())
        }
    };

    agent.shutdown(config.launcher.shutdown_grace()).await?;
    outcome.context("Agent did not become ready")
}

async fn report_ready(agent: &Agent, service: &ServiceState, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("✓ Service {} is running ({:?})", service.name, service.membership);
        }
        OutputFormat::Json => {
            let output = json!({
                "status": "ready",
                "service": service,
                "observables": agent.status().await?,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Run one or all wait strategies
pub async fn handle_bench(
    config: &Config,
    requests: Option<usize>,
    strategy: Option<StrategyKind>,
    format: OutputFormat,
) -> Result<()> {
    let mut bench = config.bench.clone();
    if let Some(requests) = requests {
        bench.requests = requests;
    }

    let kinds = match strategy {
        Some(kind) => vec![kind],
        None => StrategyKind::ALL.to_vec(),
    };

    let mut reports = Vec::with_capacity(kinds.len());
    for kind in kinds {
        reports.push(run_strategy(kind, &bench).await?);
    }

    match format {
        OutputFormat::Text => print_reports(&reports),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
    }

    Ok(())
}

fn print_reports(reports: &[StrategyReport]) {
    println!(
        "{:<10} {:>9} {:>14} {:>12} {:>12} {:>12}",
        "strategy", "completed", "total (ms)", "mean (ms)", "max (ms)", "max ping"
    );
    for report in reports {
        println!(
            "{:<10} {:>9} {:>14.3} {:>12.3} {:>12.3} {:>12.3}",
            report.strategy.to_string(),
            format!("{}/{}", report.completed, report.requests),
            report.total_latency_ms,
            report.mean_latency_ms,
            report.max_latency_ms,
            report.max_ping_ms
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::{DryRunOverlay, ServiceBackend, ServiceSpec};
    use async_trait::async_trait;
    use sdk::errors::EngineError;
    use std::sync::Arc;

    struct BrokenService;

    #[async_trait]
    impl ServiceBackend for BrokenService {
        fn name(&self) -> &str {
            "broken"
        }

        async fn ensure(&self, _spec: &ServiceSpec) -> anyhow::Result<ServiceState> {
            anyhow::bail!("container runtime unavailable")
        }
    }

    #[tokio::test]
    async fn test_agent_not_ready_is_an_error() {
        let mut config = Config::default();
        config.observe.timeout_secs = 1;
        config.launcher.shutdown_grace_secs = 1;
        let backends = Backends {
            overlay: Arc::new(DryRunOverlay),
            service: Arc::new(BrokenService),
        };

        let err = run_agent(&config, backends, OutputFormat::Json)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::ObserveTimeout { pending, .. }) if pending == &vec!["service".to_string()]
        ));
    }

    #[tokio::test]
    async fn test_disabled_dry_run_fails_before_start() {
        let mut config = Config::default();
        config.launcher.dry_run = false;

        let err = handle_agent(&config, OutputFormat::Text).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::Launcher(_))
        ));
    }
}
