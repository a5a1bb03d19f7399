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


//! the RON configuration of a skytrack server process

use std::{path::{Path,PathBuf}, time::Duration};
use serde::{Serialize,Deserialize};
use tracing::info;

use skytrack_common::datetime::{deserialize_duration, serialize_duration};
use skytrack_store::StoreConfig;
use skytrack_telemetry::TelemetryConfig;
use crate::{errors::{config_error, Result}, ServerConfig};

pub const DEFAULT_CONFIG_PATH: &str = "local/config/skytrack.ron";

#[derive(Debug,Clone,Serialize,Deserialize)]
#[serde(default)]
pub struct SkytrackConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub telemetry: TelemetryConfig,

    /// max time we wait for the orderly shutdown before the process exits anyway
    #[serde(deserialize_with="deserialize_duration", serialize_with="serialize_duration")]
    pub shutdown_timeout: Duration,
}

impl Default for SkytrackConfig {
    fn default()->Self {
        SkytrackConfig {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            telemetry: TelemetryConfig::default(),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

pub fn load_config_path<C,P> (path: P)->Result<C> where C: for <'a> Deserialize<'a>, P: AsRef<Path> {
    let data = std::fs::read_to_string( path.as_ref())?;
    Ok( ron::from_str( &data)? )
}

/// load the config from an explicitly given path (which has to exist), or from the default
/// location if there is a file, or fall back to built-in defaults
pub fn load_config (path: Option<&Path>)->Result<SkytrackConfig> {
    match path {
        Some(path) => {
            if !path.is_file() { return Err( config_error( format!("config file not found: {}", path.display()))) }
            info!("loading config {}", path.display());
            load_config_path( path)
        }
        None => {
            let path = PathBuf::from( DEFAULT_CONFIG_PATH);
            if path.is_file() {
                info!("loading config {}", path.display());
                load_config_path( &path)
            } else {
                info!("no config file, using defaults");
                Ok( SkytrackConfig::default())
            }
        }
    }
}
