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
#![allow(unused)]

//! test helpers shared by the integration tests of this crate

use std::sync::{Arc, atomic::{AtomicBool,AtomicUsize,Ordering}};
use async_trait::async_trait;
use chrono::{DateTime,Utc};
use tokio::sync::Semaphore;

use skytrack_common::{datetime::parse_datetime, geo::GeoPos};
use skytrack_store::{
    errors::{op_failed, Result}, memory::MemoryStore,
    Flight, FlightId, FlightTimeBounds, InsertFailure, InsertOutcome, NewFlight, NewSample, Sample, SampleRange, TelemetryStore
};

pub fn t (s: &str)->DateTime<Utc> { parse_datetime(s).unwrap() }

pub fn new_flight (code: &str)->NewFlight {
    NewFlight {
        code: code.to_string(),
        departure: GeoPos::new( 41.2753, 28.7519),
        destination: GeoPos::new( 40.9778, 28.821),
        departure_time: t("2025-10-26T09:30:00Z")
    }
}

/// latitude that makes [`FlakyStore`] reject a row
pub const REJECTED_LAT: f64 = 13.0;

/// a MemoryStore wrapper that can be told to fail inserts (as a whole or per row), and to
/// hold inserts until released
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_inserts: AtomicBool,
    pub fail_flight: std::sync::Mutex<Option<FlightId>>,
    pub insert_calls: AtomicUsize,
    pub gated: AtomicBool,
    pub gate: Semaphore,
}

impl FlakyStore {
    pub fn new()->Self {
        FlakyStore {
            inner: MemoryStore::new(),
            fail_inserts: AtomicBool::new(false),
            fail_flight: std::sync::Mutex::new(None),
            insert_calls: AtomicUsize::new(0),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }

    pub fn insert_calls (&self)->usize { self.insert_calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl TelemetryStore for FlakyStore {
    async fn find_flight (&self, id: FlightId)->Result<Option<Flight>> { self.inner.find_flight(id).await }
    async fn find_flight_by_code (&self, code: &str)->Result<Option<Flight>> { self.inner.find_flight_by_code(code).await }
    async fn find_flights (&self, ids: &[FlightId])->Result<Vec<Flight>> { self.inner.find_flights(ids).await }
    async fn find_flights_by_code (&self, codes: &[String])->Result<Vec<Flight>> { self.inner.find_flights_by_code(codes).await }
    async fn list_flights (&self)->Result<Vec<Flight>> { self.inner.list_flights().await }
    async fn insert_flight (&self, flight: NewFlight)->Result<Flight> { self.inner.insert_flight(flight).await }

    async fn insert_samples (&self, samples: Vec<NewSample>)->Result<InsertOutcome> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);

        if self.gated.load(Ordering::SeqCst) {
            self.gate.acquire().await.unwrap().forget();
        }
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err( op_failed("store unavailable"))
        }
        let fail_flight = *self.fail_flight.lock().unwrap();
        if samples.iter().any(|s| Some(s.flight) == fail_flight) {
            return Err( op_failed("flight partition unavailable"))
        }

        // split off the rows we reject, keeping original batch indices
        let mut accepted = Vec::new();
        let mut accepted_idx = Vec::new();
        let mut failed = Vec::new();
        for (index, s) in samples.into_iter().enumerate() {
            if s.lat == REJECTED_LAT {
                failed.push( InsertFailure { index, reason: "rejected".to_string() });
            } else {
                accepted_idx.push(index);
                accepted.push(s);
            }
        }

        let mut outcome = self.inner.insert_samples( accepted).await?;
        for f in outcome.failed.iter_mut() { f.index = accepted_idx[f.index]; }
        outcome.failed.extend( failed);
        Ok(outcome)
    }

    async fn samples_in_range (&self, range: &SampleRange)->Result<Vec<Sample>> { self.inner.samples_in_range(range).await }
    async fn latest_sample (&self, flight: FlightId, at: DateTime<Utc>)->Result<Option<Sample>> { self.inner.latest_sample(flight, at).await }
    async fn time_bounds (&self, flights: Option<&[FlightId]>, at: DateTime<Utc>)->Result<Vec<FlightTimeBounds>> { self.inner.time_bounds(flights, at).await }
    async fn nearest_before (&self, flights: &[FlightId], at: DateTime<Utc>)->Result<Vec<Sample>> { self.inner.nearest_before(flights, at).await }
    async fn nearest_after (&self, flights: &[FlightId], at: DateTime<Utc>)->Result<Vec<Sample>> { self.inner.nearest_after(flights, at).await }
    async fn sample_count (&self, flight: Option<FlightId>)->Result<usize> { self.inner.sample_count(flight).await }
    async fn close (&self) {}
}

/// collect everything currently queued for a subscription
pub fn drain_frames (rx: &mut tokio::sync::mpsc::Receiver<Arc<str>>)->Vec<serde_json::Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push( serde_json::from_str( &frame).unwrap());
    }
    frames
}

/// compare a JSON number with tolerance (parsed floats can be off in the last digit)
pub fn assert_close (v: &serde_json::Value, expected: f64) {
    let x = v.as_f64().unwrap();
    assert!( (x - expected).abs() < 1e-9, "{x} != {expected}");
}
