/*
 * Copyright © 2025, United States Government, as represented by the Administrator of
 * the National Aeronautics and Space Administration. All rights reserved.
 *
 * The “ODIN” software is licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License. You may obtain a copy
 * of the License at http://www.apache.org/licenses/LICENSE-2.0.
 *
 * Unless required by applicable law or agreed to in writing, software distributed under
 * the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND,
 * either express or implied. See the License for the specific language governing permissions
 * and limitations under the License.
 */


use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error,info,warn};
use tracing_subscriber::EnvFilter;

use skytrack_store::{open_store, StoreConfig};
use skytrack_telemetry::TelemetryHub;
use skytrack_server::{build_router, config::load_config, serve};

#[derive(Parser, Debug)]
#[command(version, about, long_about = "flight telemetry server")]
pub struct Args {
    /// RON config file (default is local/config/skytrack.ron if it exists)
    #[arg(short,long)]
    pub config: Option<PathBuf>,

    /// socket address to listen on, overrides the config
    #[arg(short,long)]
    pub addr: Option<SocketAddr>,

    /// use a non-persistent in-memory store
    #[arg(long)]
    pub memory: bool,
}

#[tokio::main]
async fn main()->Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter( EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = load_config( args.config.as_deref())?;
    if let Some(addr) = args.addr { config.server.sock_addr = addr }
    if args.memory { config.store = StoreConfig::Memory }

    let shutdown = CancellationToken::new();
    install_panic_hook( shutdown.clone());
    spawn_signal_handler( shutdown.clone());

    let store = open_store( &config.store).await?;
    let hub = Arc::new( TelemetryHub::new( store, config.telemetry.clone()));
    hub.start();

    let router = build_router( hub.clone(), &config.server);
    let mut server_task = tokio::spawn({
        let server_config = config.server.clone();
        let token = shutdown.clone();
        async move { serve( &server_config, router, async move { token.cancelled().await }).await }
    });

    let mut server_done = false;
    tokio::select! {
        _ = shutdown.cancelled() => {}
        res = &mut server_task => {
            server_done = true;
            match res {
                Ok(Ok(())) => warn!("server terminated"),
                Ok(Err(e)) => error!("server failed: {e}"),
                Err(e) => error!("server task failed: {e}")
            }
        }
    }
    shutdown.cancel();

    // open push connections only end once the hub drops its subscribers
    info!("shutting down..");
    let orderly = async {
        let report = hub.shutdown().await;
        if !server_done {
            if let Ok(Err(e)) = server_task.await { warn!("server error during shutdown: {e}") }
        }
        report
    };

    match tokio::time::timeout( config.shutdown_timeout, orderly).await {
        Ok(report) => {
            info!("shutdown complete ({} samples persisted in final flush)", report.inserted);
            Ok(())
        }
        Err(_) => {
            error!("shutdown did not complete within {:?}, exiting", config.shutdown_timeout);
            std::process::exit(1)
        }
    }
}

/// unhandled panics still run the default hook but also initiate an orderly shutdown
fn install_panic_hook (token: CancellationToken) {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook( Box::new( move |info| {
        error!("panic: {info}");
        token.cancel();
        original_hook(info);
    }));
}

fn spawn_signal_handler (token: CancellationToken) {
    tokio::spawn( async move {
        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal( tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => { sig.recv().await; }
                Err(e) => { warn!("cannot install SIGTERM handler: {e}"); std::future::pending::<()>().await }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res { warn!("cannot listen for ctrl-c: {e}"); return }
                info!("received interrupt");
            }
            _ = terminate => info!("received terminate signal"),
        }
        token.cancel();
    });
}
