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

//! a non-persistent [`TelemetryStore`] that keeps everything in memory. Samples are kept in
//! insertion (id) order so that "first match wins" scans implement the lowest-id tie-break

use std::{collections::{BTreeMap,HashSet}, sync::{RwLock,RwLockReadGuard,RwLockWriteGuard}};
use async_trait::async_trait;
use chrono::{DateTime,Utc};

use skytrack_common::datetime::utc_now;
use crate::{
    errors::{op_failed, Result, StoreError},
    Flight, FlightId, FlightTimeBounds, InsertFailure, InsertOutcome, NewFlight, NewSample,
    Sample, SampleId, SampleRange, SortOrder, TelemetryStore
};

#[derive(Default)]
struct Tables {
    flights: BTreeMap<FlightId,Flight>,
    samples: Vec<Sample>,
    last_flight_id: i64,
    last_sample_id: i64,
}

pub struct MemoryStore {
    tables: RwLock<Tables>
}

impl MemoryStore {
    pub fn new()->Self {
        MemoryStore { tables: RwLock::new( Tables::default()) }
    }

    fn read (&self)->Result<RwLockReadGuard<'_,Tables>> {
        self.tables.read().map_err(|_| op_failed("memory store lock poisoned"))
    }

    fn write (&self)->Result<RwLockWriteGuard<'_,Tables>> {
        self.tables.write().map_err(|_| op_failed("memory store lock poisoned"))
    }
}

impl Default for MemoryStore {
    fn default()->Self { Self::new() }
}

fn check_sample (tables: &Tables, s: &NewSample)->std::result::Result<(),String> {
    if !tables.flights.contains_key(&s.flight) {
        Err( format!("unknown flight {}", s.flight))
    } else if !s.lat.is_finite() || !skytrack_common::geo::is_valid_lat(s.lat) {
        Err( format!("latitude out of range: {}", s.lat))
    } else if !s.lng.is_finite() || !skytrack_common::geo::is_valid_lng(s.lng) {
        Err( format!("longitude out of range: {}", s.lng))
    } else {
        Ok(())
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {

    async fn find_flight (&self, id: FlightId)->Result<Option<Flight>> {
        Ok( self.read()?.flights.get(&id).cloned())
    }

    async fn find_flight_by_code (&self, code: &str)->Result<Option<Flight>> {
        Ok( self.read()?.flights.values().find(|f| f.code == code).cloned())
    }

    async fn find_flights (&self, ids: &[FlightId])->Result<Vec<Flight>> {
        let tables = self.read()?;
        let ids: HashSet<&FlightId> = ids.iter().collect();
        Ok( tables.flights.values().filter(|f| ids.contains(&f.id)).cloned().collect())
    }

    async fn find_flights_by_code (&self, codes: &[String])->Result<Vec<Flight>> {
        let tables = self.read()?;
        let codes: HashSet<&str> = codes.iter().map(|c| c.as_str()).collect();
        Ok( tables.flights.values().filter(|f| codes.contains(f.code.as_str())).cloned().collect())
    }

    async fn list_flights (&self)->Result<Vec<Flight>> {
        let mut list: Vec<Flight> = self.read()?.flights.values().cloned().collect();
        list.sort_by(|a,b| a.departure_time.cmp(&b.departure_time).then(a.id.cmp(&b.id)));
        Ok(list)
    }

    async fn insert_flight (&self, flight: NewFlight)->Result<Flight> {
        let mut tables = self.write()?;
        if tables.flights.values().any(|f| f.code == flight.code) {
            return Err( StoreError::DuplicateCode(flight.code))
        }

        tables.last_flight_id += 1;
        let f = Flight {
            id: FlightId(tables.last_flight_id),
            code: flight.code,
            departure: flight.departure,
            destination: flight.destination,
            departure_time: flight.departure_time,
            created_at: utc_now(),
        };
        tables.flights.insert( f.id, f.clone());
        Ok(f)
    }

    async fn insert_samples (&self, samples: Vec<NewSample>)->Result<InsertOutcome> {
        let mut tables = self.write()?;
        let mut outcome = InsertOutcome::default();

        for (index, s) in samples.into_iter().enumerate() {
            match check_sample( &tables, &s) {
                Ok(()) => {
                    tables.last_sample_id += 1;
                    let sample = s.into_sample( SampleId(tables.last_sample_id));
                    tables.samples.push( sample.clone());
                    outcome.inserted.push( sample);
                }
                Err(reason) => outcome.failed.push( InsertFailure { index, reason })
            }
        }
        Ok(outcome)
    }

    async fn samples_in_range (&self, range: &SampleRange)->Result<Vec<Sample>> {
        let tables = self.read()?;
        let mut list: Vec<Sample> = tables.samples.iter()
            .filter(|s| s.flight == range.flight)
            .filter(|s| range.from.map_or( true, |from| s.ts >= from))
            .filter(|s| range.to.map_or( true, |to| s.ts <= to))
            .cloned()
            .collect();

        list.sort_by(|a,b| a.ts.cmp(&b.ts).then(a.id.cmp(&b.id)));
        if range.order == SortOrder::Descending {
            list.reverse();
        }
        list.truncate( range.limit);
        Ok(list)
    }

    async fn latest_sample (&self, flight: FlightId, at: DateTime<Utc>)->Result<Option<Sample>> {
        let tables = self.read()?;
        Ok( latest_before( &tables.samples, flight, at).cloned())
    }

    async fn time_bounds (&self, flights: Option<&[FlightId]>, at: DateTime<Utc>)->Result<Vec<FlightTimeBounds>> {
        let tables = self.read()?;
        let filter: Option<HashSet<&FlightId>> = flights.map(|ids| ids.iter().collect());
        let mut bounds: BTreeMap<FlightId,FlightTimeBounds> = BTreeMap::new();

        for s in tables.samples.iter().filter(|s| s.ts <= at) {
            if let Some(ref filter) = filter {
                if !filter.contains(&s.flight) { continue }
            }
            bounds.entry(s.flight)
                .and_modify(|b| {
                    if s.ts < b.min { b.min = s.ts }
                    if s.ts > b.max { b.max = s.ts }
                })
                .or_insert( FlightTimeBounds { flight: s.flight, min: s.ts, max: s.ts });
        }

        Ok( bounds.into_values().collect())
    }

    async fn nearest_before (&self, flights: &[FlightId], at: DateTime<Utc>)->Result<Vec<Sample>> {
        let tables = self.read()?;
        Ok( unique(flights).into_iter()
            .filter_map(|id| latest_before( &tables.samples, id, at).cloned())
            .collect())
    }

    async fn nearest_after (&self, flights: &[FlightId], at: DateTime<Utc>)->Result<Vec<Sample>> {
        let tables = self.read()?;
        Ok( unique(flights).into_iter()
            .filter_map(|id| earliest_after( &tables.samples, id, at).cloned())
            .collect())
    }

    async fn sample_count (&self, flight: Option<FlightId>)->Result<usize> {
        let tables = self.read()?;
        Ok( match flight {
            Some(id) => tables.samples.iter().filter(|s| s.flight == id).count(),
            None => tables.samples.len()
        })
    }

    async fn close (&self) {}
}

fn unique (ids: &[FlightId])->Vec<FlightId> {
    let mut seen = HashSet::new();
    ids.iter().filter(|id| seen.insert(**id)).cloned().collect()
}

// samples are in id order, strict comparison keeps the first (lowest id) of equal time stamps

fn latest_before (samples: &[Sample], flight: FlightId, at: DateTime<Utc>)->Option<&Sample> {
    let mut found: Option<&Sample> = None;
    for s in samples.iter().filter(|s| s.flight == flight && s.ts <= at) {
        if found.map_or( true, |f| s.ts > f.ts) { found = Some(s) }
    }
    found
}

fn earliest_after (samples: &[Sample], flight: FlightId, at: DateTime<Utc>)->Option<&Sample> {
    let mut found: Option<&Sample> = None;
    for s in samples.iter().filter(|s| s.flight == flight && s.ts >= at) {
        if found.map_or( true, |f| s.ts < f.ts) { found = Some(s) }
    }
    found
}
