use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use gridmap_cli::cli::{Cli, Commands};
use gridmap_cli::{render_progress, render_tree, render_warnings, resolve_network};
use gridmap_core::geo::flatten_to_tree;
use gridmap_core::{ConnectionRequestId, ScenarioId, ScenarioSummary};
use gridmap_session::{
    init_logging, run_feed, FixedBackoff, GridmapConfig, HttpGridApi, MemoryMapSink, ProgressEvent,
    ProgressTracker, ScenarioQuery, SessionService, WsConnector,
};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

fn load_config(cli: &Cli) -> Result<GridmapConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = GridmapConfig::load_from(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            config.apply_env_overrides();
            config
        }
        None => GridmapConfig::load().context("reading config")?,
    };
    if let Some(url) = &cli.api_url {
        config.api.base_url = url.clone();
    }
    Ok(config)
}

fn network(net: Option<&str>, config: &GridmapConfig) -> Result<String> {
    resolve_network(net, config)
        .context("no network given: pass --net or set session.default_network_id")
}

fn connect(config: &GridmapConfig) -> Result<SessionService> {
    let api = Arc::new(HttpGridApi::new(&config.api)?);
    Ok(SessionService::new(api, Arc::new(MemoryMapSink::new())).with_config(config.clone()))
}

fn read_json(path: &Path) -> Result<Value> {
    let text = if path == Path::new("-") {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        text
    } else {
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };
    serde_json::from_str(&text).context("parsing JSON")
}

fn run_tree(path: &Path, as_json: bool) -> Result<()> {
    let tree = flatten_to_tree(&read_json(path)?);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
    } else {
        print!("{}", render_tree(&tree));
    }
    Ok(())
}

async fn run_warnings(
    config: &GridmapConfig,
    net: String,
    scenario: String,
    requests: Vec<String>,
) -> Result<()> {
    let service = connect(config)?;
    service.switch_network(net.into()).await?;
    if !service.select_scenario(Some(scenario.into())).await? {
        bail!("scenario changed while loading");
    }

    if !requests.is_empty() {
        let wanted: Vec<ConnectionRequestId> =
            requests.iter().map(|id| id.as_str().into()).collect();
        let found = service.find_connection_requests(&wanted).await?;

        if let Some(missing) = wanted.iter().find(|id| !found.iter().any(|r| &r.id == *id)) {
            bail!("connection request {missing} not found");
        }
        for request in found {
            service.select_request(request);
        }
    }

    let state = service.state();
    let warnings: BTreeMap<&str, _> = state
        .warnings
        .iter()
        .map(|(id, w)| (id.as_str(), w))
        .collect();
    print!("{}", render_warnings(warnings));
    for issue in state.diagnostics.issues_by_category("reference") {
        eprintln!("note: {}", issue.message);
    }
    Ok(())
}

async fn run_watch(config: &GridmapConfig, net: String, scenarios: Vec<String>) -> Result<()> {
    let service = connect(config)?;
    service.switch_network(net.into()).await?;

    let query = ScenarioQuery {
        limit: Some(config.api.request_limit),
        ..Default::default()
    };
    let listed = service.list_scenarios(&query).await?.items;
    let wanted: Vec<ScenarioId> = scenarios.iter().map(|id| id.as_str().into()).collect();
    let watched: Vec<ScenarioSummary> = listed
        .into_iter()
        .filter(|s| wanted.is_empty() || s.id.as_ref().is_some_and(|id| wanted.contains(id)))
        .collect();
    if watched.is_empty() {
        bail!("no scenarios to watch");
    }

    let names: BTreeMap<ScenarioId, String> = watched
        .iter()
        .filter_map(|s| Some((s.id.clone()?, s.name.clone())))
        .collect();
    let tracker = ProgressTracker::shared();
    tracker.watch(watched);
    let mut events = tracker.subscribe();

    let url = config.api.events_url();
    info!(%url, scenarios = names.len(), "watching scenario progress");
    let cancel = CancellationToken::new();
    let feed = {
        let (tracker, cancel) = (tracker.clone(), cancel.clone());
        let backoff = FixedBackoff(Duration::from_millis(config.feed.reconnect_delay_ms));
        tokio::spawn(async move {
            let connector = WsConnector::new(url);
            run_feed(&connector, &tracker, &backoff, cancel).await;
        })
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(ProgressEvent::Updated(update)) => {
                    let name = names
                        .get(&update.scenario_id)
                        .map(String::as_str)
                        .unwrap_or(update.scenario_id.as_str());
                    println!("{}", render_progress(name, &update));
                }
                Ok(ProgressEvent::Notice(notice)) => println!("{notice}"),
                Ok(ProgressEvent::Feed(state)) => debug!(?state, "event stream"),
                Ok(ProgressEvent::WatchChanged { .. }) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    cancel.cancel();
    feed.await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match &cli.command {
        Commands::Tree { file, json } => run_tree(file, *json),
        Commands::Warnings {
            net,
            scenario,
            requests,
        } => {
            let config = load_config(&cli)?;
            let net = network(net.as_deref(), &config)?;
            run_warnings(&config, net, scenario.clone(), requests.clone()).await
        }
        Commands::Watch { net, scenarios } => {
            let config = load_config(&cli)?;
            let net = network(net.as_deref(), &config)?;
            run_watch(&config, net, scenarios.clone()).await
        }
    }
}
