// ── Runner ──
//
// One `Gateway` per resolved profile, each with a watcher task that logs
// its lifecycle notifications. Runs until Ctrl-C, then disconnects all.

use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use deconz_api::ClientEvent;
use deconz_core::{ConnectionState, Gateway, GatewayConfig, SyncEvent};

use crate::cli::Cli;
use crate::error::SyncdError;

struct Running {
    name: String,
    gateway: Gateway,
    watcher: JoinHandle<()>,
}

pub async fn run(cli: Cli) -> Result<(), SyncdError> {
    let path = cli.config.clone().unwrap_or_else(deconz_config::config_path);
    let gateways = resolve_gateways(&cli, &path)?;
    if gateways.is_empty() {
        return Err(SyncdError::NoGateways {
            path: path.display().to_string(),
        });
    }

    // Keys created for ad-hoc hosts have no profile to go into.
    let persist = cli.host.is_none().then_some(path);

    let mut running = Vec::with_capacity(gateways.len());
    for (name, config) in gateways {
        match start(&name, config, persist.clone()).await {
            Ok(r) => running.push(r),
            Err(e) => {
                shutdown(running).await;
                return Err(e);
            }
        }
    }

    info!(gateways = running.len(), "synchronizing, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    shutdown(running).await;
    Ok(())
}

fn resolve_gateways(cli: &Cli, path: &Path) -> Result<Vec<(String, GatewayConfig)>, SyncdError> {
    if let Some(ref host) = cli.host {
        let mut config = GatewayConfig::new(host.clone());
        config.api_key = cli.api_key.clone().map(SecretString::from);
        config.stream_enabled = !cli.no_stream;
        return Ok(vec![(host.clone(), config)]);
    }

    debug!(path = %path.display(), "loading settings");
    let cfg = deconz_config::load_config_from(path)?;
    let mut gateways = deconz_config::gateway_configs(&cfg, cli.gateway.as_deref())?;
    if cli.no_stream {
        for (_, config) in &mut gateways {
            config.stream_enabled = false;
        }
    }
    Ok(gateways)
}

async fn start(
    name: &str,
    config: GatewayConfig,
    persist: Option<PathBuf>,
) -> Result<Running, SyncdError> {
    let gateway = Gateway::new(config).map_err(|e| SyncdError::gateway(name, e))?;

    // Subscribe before connecting so key creation and the first pass are seen.
    let watcher = tokio::spawn(watch_gateway(
        name.to_owned(),
        gateway.events(),
        gateway.connection_state(),
        gateway.client().subscribe(),
        persist,
    ));

    if let Err(e) = gateway.connect().await {
        watcher.abort();
        return Err(SyncdError::gateway(name, e));
    }

    Ok(Running {
        name: name.to_owned(),
        gateway,
        watcher,
    })
}

async fn shutdown(running: Vec<Running>) {
    for r in running {
        r.gateway.disconnect().await;
        r.watcher.abort();
        debug!(gateway = %r.name, "stopped");
    }
}

async fn watch_gateway(
    name: String,
    mut events: broadcast::Receiver<SyncEvent>,
    mut state: watch::Receiver<ConnectionState>,
    mut requests: broadcast::Receiver<ClientEvent>,
    persist: Option<PathBuf>,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => log_event(&name, event, persist.as_deref()),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(gateway = %name, skipped = n, "notification receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                debug!(gateway = %name, state = ?current, "connection state");
            }
            request = requests.recv() => match request {
                Ok(ClientEvent::Error { id, path, message, api_type, fatal: true, .. }) => {
                    debug!(
                        gateway = %name,
                        id,
                        %path,
                        ?api_type,
                        error = %message,
                        "request failed"
                    );
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

fn log_event(name: &str, event: SyncEvent, persist: Option<&Path>) {
    match event {
        SyncEvent::DeviceAdded(device) => info!(
            gateway = name,
            device_id = device.id(),
            device_name = device.name().unwrap_or_default(),
            resources = device.len(),
            "device added"
        ),
        SyncEvent::DeviceRemoved { device_id } => {
            info!(gateway = name, %device_id, "device removed");
        }
        SyncEvent::DeviceNeedsReExpose { device_id } => {
            info!(gateway = name, %device_id, "device changed, re-exposing");
        }
        SyncEvent::DevicePolled(device) => {
            trace!(gateway = name, device_id = device.id(), "device polled");
        }
        SyncEvent::ResourceChanged { path, body } => {
            debug!(gateway = name, %path, %body, "resource changed");
        }
        SyncEvent::PollFailed { error } => warn!(gateway = name, %error, "poll failed"),
        SyncEvent::ApiKeyCreated { key } => store_key(name, &key, persist),
    }
}

fn store_key(name: &str, key: &SecretString, persist: Option<&Path>) {
    let Some(path) = persist else {
        info!(
            gateway = name,
            api_key = key.expose_secret(),
            "API key created, pass it with --api-key next time"
        );
        return;
    };
    match deconz_config::store_api_key(path, name, key.expose_secret()) {
        Ok(()) => info!(gateway = name, path = %path.display(), "API key created and saved"),
        Err(e) => warn!(gateway = name, error = %e, "API key created but could not be saved"),
    }
}
