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

use thiserror::Error;
use skytrack_store::errors::StoreError;

pub type Result<T> = std::result::Result<T,TelemetryError>;

#[derive(Error,Debug)]
pub enum TelemetryError {

    #[error("flight not found: {0}")]
    FlightNotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("store error {0}")]
    StoreError( #[from] StoreError),

    #[error("shutting down")]
    ShuttingDown,
}

pub fn invalid_request (msg: impl ToString)->TelemetryError {
    TelemetryError::InvalidRequest(msg.to_string())
}

pub fn flight_not_found (flight_ref: impl ToString)->TelemetryError {
    TelemetryError::FlightNotFound(flight_ref.to_string())
}
