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


use std::time::Duration;
use axum::{body::Bytes, extract::{Path, State}, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use skytrack_store::FlightId;
use skytrack_telemetry::flights::FlightInput;
use crate::{api::{ApiError, ApiResult}, AppState};

fn parse_flight_id (s: &str)->ApiResult<FlightId> {
    s.parse().map_err(|_| ApiError::NotFound("flight not found".to_string()))
}

pub async fn list_flights (State(state): State<AppState>)->ApiResult<impl IntoResponse> {
    Ok( Json( state.hub.flights.list().await?))
}

pub async fn create_flight (State(state): State<AppState>, body: Bytes)->ApiResult<impl IntoResponse> {
    let input: FlightInput = if body.is_empty() { FlightInput::default() } else { serde_json::from_slice( &body)? };
    let flight = state.hub.flights.create( input).await?;
    Ok( (StatusCode::CREATED, Json(flight)) )
}

/// optional overrides of the configured simulation parameters
#[derive(Debug,Default,Deserialize)]
#[serde(rename_all="camelCase")]
pub struct SimStartParams {
    pub period_ms: Option<u64>,
    pub step: Option<f64>,
}

pub async fn start_sim (State(state): State<AppState>, Path(id): Path<String>, body: Bytes)->ApiResult<impl IntoResponse> {
    let params: SimStartParams = if body.is_empty() { SimStartParams::default() } else { serde_json::from_slice( &body)? };
    let cfg = &state.hub.config;

    let period = params.period_ms.map_or( cfg.sim_period, Duration::from_millis);
    if period.is_zero() { return Err( ApiError::BadRequest("periodMs has to be positive".to_string())) }
    let step = params.step.unwrap_or( cfg.sim_step);
    if !(step > 0.0 && step <= 1.0) { return Err( ApiError::BadRequest("step has to be within (0,1]".to_string())) }

    let flight = state.hub.flights.get( parse_flight_id( &id)?).await?;
    if state.hub.sim.start( &flight, period, step)? {
        Ok( (StatusCode::ACCEPTED, Json( json!({ "flightId": flight.id, "running": true, "started": true }))) )
    } else {
        Ok( (StatusCode::OK, Json( json!({ "flightId": flight.id, "running": true, "started": false }))) )
    }
}

pub async fn stop_sim (State(state): State<AppState>, Path(id): Path<String>)->ApiResult<impl IntoResponse> {
    let id = parse_flight_id( &id)?;
    let body = match state.hub.sim.stop( id).await {
        Some(report) => json!({ "flightId": id, "stopped": true, "flushed": report.inserted }),
        None => json!({ "flightId": id, "stopped": false })
    };
    Ok( Json(body) )
}

pub async fn list_runs (State(state): State<AppState>)->impl IntoResponse {
    Json( state.hub.sim.active_runs())
}
