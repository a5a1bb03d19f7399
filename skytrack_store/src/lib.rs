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

//! the persistent store for flights and their telemetry samples.
//!
//! The store is accessed through the object-safe [`TelemetryStore`] trait so that the realtime
//! components do not have to know about the backend. We provide two implementations:
//! [`memory::MemoryStore`] (tests and throw-away demo runs) and [`sqlite::SqliteStore`].
//!
//! Sample inserts are *unordered*: a batch can partially succeed, in which case the store
//! reports which rows were persisted and which were rejected (see [`InsertOutcome`]). Only
//! failures that affect the whole batch are returned as `Err`.

use std::{fmt, str::FromStr, sync::Arc};
use async_trait::async_trait;
use chrono::{DateTime,Utc};
use serde::{Serialize,Deserialize,Serializer,ser::SerializeStruct};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

use skytrack_common::{datetime::{ser_iso_millis, to_iso_millis}, geo::GeoPos};

pub mod errors;
use errors::{Result,StoreError};

pub mod memory;
pub mod sqlite;

/* #region ids ************************************************************************************************/

/// opaque flight identifier. On input we accept both JSON numbers and numeric strings
#[serde_as]
#[derive(Debug,Clone,Copy,PartialEq,Eq,Hash,PartialOrd,Ord,Serialize,Deserialize)]
pub struct FlightId( #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")] pub i64);

impl fmt::Display for FlightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl FromStr for FlightId {
    type Err = std::num::ParseIntError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> { Ok( FlightId( s.trim().parse()?)) }
}

/// store assigned sample id. Ids increase in insertion order, which we use to break ties between
/// samples that have the same time stamp
#[derive(Debug,Clone,Copy,PartialEq,Eq,Hash,PartialOrd,Ord,Serialize,Deserialize)]
pub struct SampleId(pub i64);

/* #endregion ids */

/* #region flights ********************************************************************************************/

/// the data model for a flight. Flights are immutable once created
#[derive(Debug,Clone,PartialEq)]
pub struct Flight {
    pub id: FlightId,
    pub code: String,
    pub departure: GeoPos,
    pub destination: GeoPos,
    pub departure_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// this has to be kept compatible with the flight JSON format processed by clients
impl Serialize for Flight {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> where S: Serializer {
        let mut state = serializer.serialize_struct("Flight", 8)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("flightCode", &self.code)?;
        state.serialize_field("departure_lat", &self.departure.lat)?;
        state.serialize_field("departure_long", &self.departure.lng)?;
        state.serialize_field("destination_lat", &self.destination.lat)?;
        state.serialize_field("destination_long", &self.destination.lng)?;
        state.serialize_field("departureTime", &to_iso_millis(&self.departure_time))?;
        state.serialize_field("createdAt", &to_iso_millis(&self.created_at))?;
        state.end()
    }
}

#[derive(Debug,Clone,PartialEq)]
pub struct NewFlight {
    pub code: String,
    pub departure: GeoPos,
    pub destination: GeoPos,
    pub departure_time: DateTime<Utc>,
}

/* #endregion flights */

/* #region samples ********************************************************************************************/

/// a persisted telemetry sample (one timestamped position observation of a flight)
#[derive(Debug,Clone,PartialEq,Serialize)]
pub struct Sample {
    pub id: SampleId,
    pub flight: FlightId,
    pub lat: f64,
    pub lng: f64,
    #[serde(serialize_with="ser_iso_millis")]
    pub ts: DateTime<Utc>,
}

/// a sample that has not been persisted yet
#[derive(Debug,Clone,PartialEq)]
pub struct NewSample {
    pub flight: FlightId,
    pub lat: f64,
    pub lng: f64,
    pub ts: DateTime<Utc>,
}

impl NewSample {
    pub fn new (flight: FlightId, pos: GeoPos, ts: DateTime<Utc>)->Self {
        NewSample { flight, lat: pos.lat, lng: pos.lng, ts }
    }

    pub fn into_sample (self, id: SampleId)->Sample {
        Sample { id, flight: self.flight, lat: self.lat, lng: self.lng, ts: self.ts }
    }
}

/// a row of an insert batch that was rejected by the store
#[derive(Debug,Clone,PartialEq)]
pub struct InsertFailure {
    pub index: usize, // position within the submitted batch
    pub reason: String,
}

/// result of an unordered batch insert. `inserted` only contains rows that are durable
#[derive(Debug,Clone,Default)]
pub struct InsertOutcome {
    pub inserted: Vec<Sample>,
    pub failed: Vec<InsertFailure>,
}

impl InsertOutcome {
    pub fn is_partial (&self)->bool { !self.failed.is_empty() }
}

#[derive(Debug,Clone,Copy,PartialEq,Eq,Default)]
pub enum SortOrder {
    #[default] Ascending,
    Descending
}

impl SortOrder {
    /// anything but "desc" is ascending
    pub fn parse (s: Option<&str>)->Self {
        match s {
            Some(s) if s.trim().eq_ignore_ascii_case("desc") => SortOrder::Descending,
            _ => SortOrder::Ascending
        }
    }
}

/// samples of one flight within an (inclusive) time range
#[derive(Debug,Clone)]
pub struct SampleRange {
    pub flight: FlightId,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub order: SortOrder,
    pub limit: usize,
}

/// earliest and latest sample time stamp of a flight
#[derive(Debug,Clone,Copy,PartialEq)]
pub struct FlightTimeBounds {
    pub flight: FlightId,
    pub min: DateTime<Utc>,
    pub max: DateTime<Utc>,
}

/* #endregion samples */

/// the store abstraction used by the realtime components.
/// All time stamps are UTC with millisecond resolution. Where several samples of a flight share the
/// same boundary time stamp, the one with the lowest [`SampleId`] is returned
#[async_trait]
pub trait TelemetryStore: Send + Sync + 'static {

    //--- flights

    async fn find_flight (&self, id: FlightId)->Result<Option<Flight>>;

    async fn find_flight_by_code (&self, code: &str)->Result<Option<Flight>>;

    /// batched lookup, unknown ids are silently skipped
    async fn find_flights (&self, ids: &[FlightId])->Result<Vec<Flight>>;

    /// batched lookup, unknown codes are silently skipped
    async fn find_flights_by_code (&self, codes: &[String])->Result<Vec<Flight>>;

    /// all flights sorted by departure time
    async fn list_flights (&self)->Result<Vec<Flight>>;

    /// fails with [`StoreError::DuplicateCode`] if the code is already used
    async fn insert_flight (&self, flight: NewFlight)->Result<Flight>;

    //--- samples

    /// unordered insert - rows that are rejected do not affect the other rows of the batch
    async fn insert_samples (&self, samples: Vec<NewSample>)->Result<InsertOutcome>;

    async fn samples_in_range (&self, range: &SampleRange)->Result<Vec<Sample>>;

    /// the sample with the greatest time stamp <= `at`
    async fn latest_sample (&self, flight: FlightId, at: DateTime<Utc>)->Result<Option<Sample>>;

    /// min/max sample time stamps <= `at` for each of the given flights (all flights if None).
    /// Flights without such samples are not included
    async fn time_bounds (&self, flights: Option<&[FlightId]>, at: DateTime<Utc>)->Result<Vec<FlightTimeBounds>>;

    /// for each flight the sample with the greatest time stamp <= `at` (at most one per flight)
    async fn nearest_before (&self, flights: &[FlightId], at: DateTime<Utc>)->Result<Vec<Sample>>;

    /// for each flight the sample with the smallest time stamp >= `at` (at most one per flight)
    async fn nearest_after (&self, flights: &[FlightId], at: DateTime<Utc>)->Result<Vec<Sample>>;

    async fn sample_count (&self, flight: Option<FlightId>)->Result<usize>;

    /// release backend resources. The store should not be used afterwards
    async fn close (&self);
}

/// store backend selection as it appears in the configuration file
#[derive(Debug,Clone,Serialize,Deserialize)]
pub enum StoreConfig {
    Memory,
    Sqlite { url: String }
}

impl Default for StoreConfig {
    fn default()->Self { StoreConfig::Sqlite { url: "sqlite://skytrack.db".to_string() } }
}

pub async fn open_store (config: &StoreConfig)->Result<Arc<dyn TelemetryStore>> {
    match config {
        StoreConfig::Memory => Ok( Arc::new( memory::MemoryStore::new())),
        StoreConfig::Sqlite{url} => Ok( Arc::new( sqlite::SqliteStore::connect( url).await?))
    }
}
