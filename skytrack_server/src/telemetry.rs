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


use axum::{body::Bytes, extract::{Query, State}, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::{json, Value};

use skytrack_telemetry::{ingest::IngestOutcome, query::{LatestParams, NearestParams, RangeParams, WindowParams}};
use crate::{api::{ApiError, ApiResult}, AppState};

pub async fn ingest (State(state): State<AppState>, body: Bytes)->ApiResult<Response> {
    let payload: Value = serde_json::from_slice( &body)?;

    let response = match state.hub.ingest.ingest( &payload).await? {
        IngestOutcome::Rejected(msg) => ApiError::BadRequest(msg).into_response(),
        IngestOutcome::NoneResolved(failed) => {
            let body = json!({ "error": "no valid items", "code": "NOT_FOUND", "failed": failed });
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
        IngestOutcome::Accepted(report) => (StatusCode::CREATED, Json(report)).into_response()
    };
    Ok(response)
}

pub async fn range (State(state): State<AppState>, Query(params): Query<RangeParams>)->ApiResult<impl IntoResponse> {
    Ok( Json( state.hub.query.range( &params).await?))
}

pub async fn latest (State(state): State<AppState>, Query(params): Query<LatestParams>)->ApiResult<impl IntoResponse> {
    Ok( Json( state.hub.query.latest( &params).await?))
}

pub async fn window (State(state): State<AppState>, Query(params): Query<WindowParams>)->ApiResult<impl IntoResponse> {
    Ok( Json( state.hub.query.window( &params).await?))
}

pub async fn nearest (State(state): State<AppState>, Query(params): Query<NearestParams>)->ApiResult<impl IntoResponse> {
    Ok( Json( state.hub.query.nearest( &params).await?))
}
