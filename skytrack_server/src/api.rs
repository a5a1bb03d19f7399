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


//! uniform JSON error responses: `{"error": <message>, "code": <code>}`

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use tracing::error;

use skytrack_store::errors::StoreError;
use skytrack_telemetry::errors::TelemetryError;

#[derive(Debug,Clone,PartialEq)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl ApiError {
    pub fn status (&self)->StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code (&self)->&'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Unavailable(_) => "UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    pub fn message (&self)->&str {
        match self {
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) | ApiError::Conflict(msg) | ApiError::Unavailable(msg) | ApiError::Internal(msg) => msg
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response (self)->Response {
        let body = json!({ "error": self.message(), "code": self.code() });
        (self.status(), Json(body)).into_response()
    }
}

impl From<TelemetryError> for ApiError {
    fn from (e: TelemetryError)->Self {
        match e {
            TelemetryError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            TelemetryError::FlightNotFound(_) => ApiError::NotFound("flight not found".to_string()),
            TelemetryError::StoreError(StoreError::DuplicateCode(_)) => ApiError::Conflict("flightCode already exists".to_string()),
            TelemetryError::ShuttingDown => ApiError::Unavailable("shutting down".to_string()),
            e => {
                error!("request failed: {e}");
                ApiError::Internal("internal server error".to_string())
            }
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from (e: serde_json::Error)->Self {
        ApiError::BadRequest( format!("invalid JSON: {e}"))
    }
}

pub type ApiResult<T> = std::result::Result<T,ApiError>;
