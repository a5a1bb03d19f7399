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


//! the HTTP and WebSocket front end of skytrack. This is a thin layer that maps routes to
//! [`TelemetryHub`] operations and their results to status codes.

use std::{future::Future, net::SocketAddr, sync::Arc};
use axum::{http::{header, HeaderValue, Method}, routing::{get, post}, Json, Router};
use serde::{Serialize,Deserialize};
use serde_json::json;
use tower_http::{cors::{AllowOrigin, CorsLayer}, trace::TraceLayer};
use tracing::{info,warn};

use skytrack_telemetry::TelemetryHub;

pub mod errors;
pub mod config;
pub mod api;
pub mod flights;
pub mod telemetry;
pub mod ws;

use errors::Result;

pub const DEFAULT_ORIGIN: &str = "http://localhost:5173";

#[derive(Deserialize,Serialize,Debug,Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub sock_addr: SocketAddr,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default()->Self {
        ServerConfig {
            sock_addr: SocketAddr::from(([127,0,0,1], 3000)),
            allowed_origins: vec![ DEFAULT_ORIGIN.to_string() ]
        }
    }
}

impl ServerConfig {
    pub fn url (&self)->String { format!("http://{}", self.sock_addr) }
}

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<TelemetryHub>
}

/// the origins we actually allow. An empty list or a lone "*" falls back to the default origin,
/// wildcards have to be replaced by explicit origins
pub fn effective_origins (configured: &[String])->Vec<String> {
    let origins: Vec<String> = configured.iter().map(|o| o.trim().to_string()).filter(|o| !o.is_empty()).collect();
    if origins.is_empty() || (origins.len() == 1 && origins[0] == "*") {
        vec![ DEFAULT_ORIGIN.to_string() ]
    } else {
        origins
    }
}

pub fn cors_layer (configured: &[String])->CorsLayer {
    let origins: Vec<HeaderValue> = effective_origins( configured).iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => { warn!("ignoring invalid origin {o:?}"); None }
        })
        .collect();

    CorsLayer::new()
        .allow_origin( AllowOrigin::list( origins))
        .allow_methods( [Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers( [header::CONTENT_TYPE])
}

async fn health ()->Json<serde_json::Value> {
    Json( json!({ "ok": true }))
}

pub fn build_router (hub: Arc<TelemetryHub>, config: &ServerConfig)->Router {
    Router::new()
        .route( "/health", get( health))
        .route( "/flights", get( flights::list_flights).post( flights::create_flight))
        .route( "/flights/{id}/sim/start", post( flights::start_sim))
        .route( "/flights/{id}/sim/stop", post( flights::stop_sim))
        .route( "/sim", get( flights::list_runs))
        .route( "/telemetry", get( telemetry::range).post( telemetry::ingest))
        .route( "/telemetry/latest", get( telemetry::latest))
        .route( "/telemetry/window", get( telemetry::window))
        .route( "/telemetry/nearest", get( telemetry::nearest))
        .route( "/ws", get( ws::ws_handler))
        .layer( cors_layer( &config.allowed_origins))
        .layer( TraceLayer::new_for_http())
        .with_state( AppState { hub })
}

/// serve `router` until `shutdown` completes. New connections are refused once shutdown
/// started, open ones are allowed to finish
pub async fn serve<F> (config: &ServerConfig, router: Router, shutdown: F)->Result<()> where F: Future<Output=()> + Send + 'static {
    let listener = tokio::net::TcpListener::bind( config.sock_addr).await?;
    info!("serving {}", config.url());

    axum::serve( listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown( shutdown)
        .await?;

    Ok(())
}
