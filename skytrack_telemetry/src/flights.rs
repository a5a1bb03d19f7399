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

use std::sync::Arc;
use serde::Deserialize;
use tracing::info;

use skytrack_common::{datetime::parse_datetime, geo::GeoPos};
use skytrack_store::{Flight, FlightId, NewFlight, TelemetryStore};
use crate::{broadcast::{BroadcastRegistry, TelemetryEvent}, errors::{flight_not_found, invalid_request, Result}};

/// the client provided data for a new flight. Everything is optional here so that we can report
/// missing fields ourselves
#[derive(Debug,Clone,Default,Deserialize)]
pub struct FlightInput {
    #[serde(rename="flightCode")]
    pub code: Option<String>,
    pub departure_lat: Option<f64>,
    pub departure_long: Option<f64>,
    pub destination_lat: Option<f64>,
    pub destination_long: Option<f64>,
    #[serde(rename="departureTime")]
    pub departure_time: Option<String>,
}

impl FlightInput {
    pub fn validate (self)->Result<NewFlight> {
        let (Some(code), Some(dep_lat), Some(dep_lng), Some(dst_lat), Some(dst_lng), Some(departure_time)) =
            (self.code, self.departure_lat, self.departure_long, self.destination_lat, self.destination_long, self.departure_time)
        else {
            return Err( invalid_request("missing required fields"))
        };

        let code = code.trim().to_string();
        if code.is_empty() { return Err( invalid_request("missing required fields")) }

        let departure = GeoPos::new( dep_lat, dep_lng);
        let destination = GeoPos::new( dst_lat, dst_lng);
        if !departure.is_valid() || !destination.is_valid() {
            return Err( invalid_request("invalid coordinates"))
        }

        let departure_time = parse_datetime( &departure_time).ok_or_else(|| invalid_request("invalid departureTime"))?;

        Ok( NewFlight { code, departure, destination, departure_time } )
    }
}

/// flight registration and lookup. New flights are announced to push subscribers
pub struct FlightRegistry {
    store: Arc<dyn TelemetryStore>,
    registry: Arc<BroadcastRegistry>,
}

impl FlightRegistry {
    pub fn new (store: Arc<dyn TelemetryStore>, registry: Arc<BroadcastRegistry>)->Self {
        FlightRegistry { store, registry }
    }

    pub async fn list (&self)->Result<Vec<Flight>> {
        Ok( self.store.list_flights().await? )
    }

    pub async fn get (&self, id: FlightId)->Result<Flight> {
        self.store.find_flight( id).await?.ok_or_else(|| flight_not_found( id))
    }

    /// fails with a `StoreError::DuplicateCode` if the code is taken
    pub async fn create (&self, input: FlightInput)->Result<Flight> {
        let flight = self.store.insert_flight( input.validate()?).await?;
        info!("created flight {} ({})", flight.code, flight.id);

        self.registry.broadcast( &TelemetryEvent::FlightCreated { flight: flight.clone() });
        Ok(flight)
    }
}
