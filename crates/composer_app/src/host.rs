//! Wires configuration, collaborators and the stdio transport around the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use composer_engine::{
    read_inbound, Collaborators, FileDocumentStore, HttpProbe, InboundLine, JsonLinesSink,
    Orchestrator, OrchestratorHandle, ProviderSet,
};
use engine_logging::{engine_info, engine_warn};
use tokio::io::BufReader;

use crate::actions::HostAction;
use crate::config::AppConfig;

/// Runs until stdin closes or a `quit` action arrives, then disposes and flushes.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let store = FileDocumentStore::new(config.document_dir.clone());
    let html = store
        .load(&config.title)
        .with_context(|| format!("loading document {:?}", config.title))?
        .unwrap_or_default();

    let providers = ProviderSet::from_settings(&config.provider_settings()?)
        .context("building provider clients")?;
    let quota = config.quota.build().context("building quota gate")?;
    let probe = HttpProbe::new(Duration::from_millis(config.probe_timeout_ms))
        .context("building liveness probe")?;
    engine_info!(
        "Starting composer host for {:?} with {} providers",
        config.title,
        providers.len()
    );

    let collaborators =
        Collaborators::new(providers, Arc::from(quota), Arc::new(store)).with_probe(Arc::new(probe));
    let (orchestrator, handle) = Orchestrator::new(
        config.orchestrator.clone(),
        config.title.clone(),
        html,
        collaborators,
    );
    let sink = Arc::new(JsonLinesSink::new(std::io::stdout()));
    let running = tokio::spawn(orchestrator.run(sink));

    let rejected = read_inbound(BufReader::new(tokio::io::stdin()), |line| {
        route(&handle, line)
    })
    .await
    .context("reading stdin")?;
    if rejected > 0 {
        engine_warn!("Rejected {} inbound lines", rejected);
    }

    handle.dispose();
    let state = running.await.context("orchestrator task failed")?;
    engine_info!(
        "Composer host stopped; {} jobs in history",
        state.registry().history().count()
    );
    Ok(())
}

/// Forwards one inbound line; `false` ends the session.
fn route(handle: &OrchestratorHandle, line: InboundLine) -> bool {
    match line {
        InboundLine::Surface(event) => handle.surface_event(event),
        InboundLine::Control(value) => match serde_json::from_value::<HostAction>(value) {
            Ok(action) => match action.into_msg() {
                Some(msg) => handle.send(msg),
                None => {
                    engine_info!("Quit requested");
                    false
                }
            },
            Err(err) => {
                engine_warn!("Ignoring host action: {}", err);
                true
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use composer_core::{OrchestratorConfig, SurfaceEvent};
    use composer_engine::UnlimitedQuota;
    use serde_json::json;
    use tempfile::TempDir;

    fn handle(dir: &TempDir) -> (Orchestrator, OrchestratorHandle) {
        let collaborators = Collaborators::new(
            ProviderSet::new(),
            Arc::new(UnlimitedQuota),
            Arc::new(FileDocumentStore::new(dir.path().to_path_buf())),
        );
        Orchestrator::new(OrchestratorConfig::default(), "Doc", "", collaborators)
    }

    #[test]
    fn quit_ends_the_session() {
        let temp = TempDir::new().unwrap();
        let (_orchestrator, handle) = handle(&temp);
        assert!(!route(&handle, InboundLine::Control(json!({"action": "quit"}))));
    }

    #[test]
    fn malformed_actions_are_skipped() {
        let temp = TempDir::new().unwrap();
        let (_orchestrator, handle) = handle(&temp);
        assert!(route(&handle, InboundLine::Control(json!({"action": "generate"}))));
        assert!(route(&handle, InboundLine::Surface(SurfaceEvent::Ready)));
    }

    #[test]
    fn closed_orchestrator_ends_the_session() {
        let temp = TempDir::new().unwrap();
        let (orchestrator, handle) = handle(&temp);
        drop(orchestrator);
        assert!(!route(&handle, InboundLine::Surface(SurfaceEvent::Ready)));
    }
}
