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

//! read-only temporal queries over persisted samples. Buffered samples that were not flushed yet
//! are not visible here.
//!
//! The parameter structs are deserialized directly from URL queries, which is why all their fields are
//! optional strings - parsing and validation happens in the engine so that it is the same for all callers.

use std::{collections::{BTreeMap,HashSet}, sync::Arc};
use chrono::{DateTime,Utc};
use serde::{Serialize,Deserialize};

use skytrack_common::{datetime::{parse_datetime, parse_optional_datetime_or, ser_iso_millis, ser_iso_millis_option, utc_now}, is_none, split_list};
use skytrack_store::{Flight, FlightId, Sample, SampleRange, SortOrder, TelemetryStore};
use crate::errors::{flight_not_found, invalid_request, Result};

pub const DEFAULT_LIMIT: usize = 1000;
pub const MAX_LIMIT: usize = 5000;

/// how a single flight is referenced by a query
#[derive(Debug,Clone,PartialEq)]
pub enum FlightRef {
    Id(String),
    Code(String),
}

impl FlightRef {
    /// ids take precedence over codes, empty values count as absent
    pub fn from_params (id: Option<&str>, code: Option<&str>)->Option<FlightRef> {
        match (id.filter(|s| !s.is_empty()), code.filter(|s| !s.is_empty())) {
            (Some(id), _) => Some( FlightRef::Id(id.to_string())),
            (None, Some(code)) => Some( FlightRef::Code(code.to_string())),
            (None, None) => None
        }
    }
}

impl std::fmt::Display for FlightRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlightRef::Id(id) => write!(f, "id {id}"),
            FlightRef::Code(code) => write!(f, "code {code}")
        }
    }
}

#[derive(Debug,Clone,Default,Deserialize)]
#[serde(rename_all="camelCase")]
pub struct RangeParams {
    pub flight_id: Option<String>,
    pub flight_code: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<String>,
    pub sort: Option<String>,
}

#[derive(Debug,Clone,Default,Deserialize)]
#[serde(rename_all="camelCase")]
pub struct LatestParams {
    pub flight_id: Option<String>,
    pub flight_code: Option<String>,
    pub at: Option<String>,
}

#[derive(Debug,Clone,Default,Deserialize)]
#[serde(rename_all="camelCase")]
pub struct WindowParams {
    pub flight_ids: Option<String>,   // comma separated
    pub flight_codes: Option<String>, // comma separated
    pub at: Option<String>,
}

#[derive(Debug,Clone,Default,Deserialize)]
#[serde(rename_all="camelCase")]
pub struct NearestParams {
    pub flight_ids: Option<String>, // comma separated, required
    pub at: Option<String>,         // required
}

#[derive(Debug,Clone,Copy,PartialEq,Default,Serialize)]
pub struct TimeSpan {
    #[serde(serialize_with="ser_iso_millis_option")]
    pub min: Option<DateTime<Utc>>,
    #[serde(serialize_with="ser_iso_millis_option")]
    pub max: Option<DateTime<Utc>>,
}

#[derive(Debug,Clone,PartialEq,Default,Serialize)]
#[serde(rename_all="camelCase")]
pub struct WindowResult {
    pub by_flight: BTreeMap<FlightId,TimeSpan>,
    pub global: TimeSpan,
}

#[derive(Debug,Clone,Copy,PartialEq,Serialize)]
pub struct SamplePoint {
    pub lat: f64,
    pub lng: f64,
    #[serde(serialize_with="ser_iso_millis")]
    pub ts: DateTime<Utc>,
}

impl From<&Sample> for SamplePoint {
    fn from (s: &Sample)->Self { SamplePoint { lat: s.lat, lng: s.lng, ts: s.ts } }
}

/// the samples straddling a reference time. Either of them can be missing
#[derive(Debug,Clone,Copy,PartialEq,Default,Serialize)]
pub struct NearestPair {
    #[serde(skip_serializing_if="is_none")]
    pub prev: Option<SamplePoint>,
    #[serde(skip_serializing_if="is_none")]
    pub next: Option<SamplePoint>,
}

pub type NearestResult = BTreeMap<FlightId,NearestPair>;

/// parse a page size leniently (leading digits), falling back to the default for anything that is
/// not a positive number and capping at [`MAX_LIMIT`]
pub fn parse_limit (spec: Option<&str>)->usize {
    let n = spec.map(|s| {
        let s = s.trim();
        let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse::<usize>().unwrap_or(0)
    }).unwrap_or(0);

    if n == 0 { DEFAULT_LIMIT } else { n.min( MAX_LIMIT) }
}

fn parse_time_param (name: &str, spec: Option<&str>)->Result<Option<DateTime<Utc>>> {
    match spec.filter(|s| !s.is_empty()) {
        Some(s) => parse_datetime(s).map(Some).ok_or_else(|| invalid_request( format!("invalid {name} param"))),
        None => Ok(None)
    }
}

fn parse_at (spec: Option<&str>)->Result<DateTime<Utc>> {
    parse_optional_datetime_or( spec.filter(|s| !s.is_empty()), utc_now).ok_or_else(|| invalid_request("invalid at param"))
}

pub struct QueryEngine {
    store: Arc<dyn TelemetryStore>
}

impl QueryEngine {
    pub fn new (store: Arc<dyn TelemetryStore>)->Self {
        QueryEngine { store }
    }

    /// look up a single flight. Ids that are not numeric can't exist and are reported as not found
    pub async fn resolve (&self, flight_ref: &FlightRef)->Result<Flight> {
        let flight = match flight_ref {
            FlightRef::Id(s) => match s.parse::<FlightId>() {
                Ok(id) => self.store.find_flight( id).await?,
                Err(_) => None
            }
            FlightRef::Code(code) => self.store.find_flight_by_code( code).await?
        };
        flight.ok_or_else(|| flight_not_found( flight_ref))
    }

    async fn resolve_params (&self, id: Option<&str>, code: Option<&str>)->Result<Flight> {
        let flight_ref = FlightRef::from_params( id, code).ok_or_else(|| invalid_request("flightId or flightCode is required"))?;
        self.resolve( &flight_ref).await
    }

    /// samples of one flight within optional (inclusive) bounds
    pub async fn range (&self, params: &RangeParams)->Result<Vec<Sample>> {
        let flight = self.resolve_params( params.flight_id.as_deref(), params.flight_code.as_deref()).await?;

        let range = SampleRange {
            flight: flight.id,
            from: parse_time_param( "from", params.from.as_deref())?,
            to: parse_time_param( "to", params.to.as_deref())?,
            order: SortOrder::parse( params.sort.as_deref()),
            limit: parse_limit( params.limit.as_deref())
        };
        Ok( self.store.samples_in_range( &range).await? )
    }

    /// the most recent sample at or before `at` (default now)
    pub async fn latest (&self, params: &LatestParams)->Result<Option<Sample>> {
        let flight = self.resolve_params( params.flight_id.as_deref(), params.flight_code.as_deref()).await?;
        let at = parse_at( params.at.as_deref())?;

        Ok( self.store.latest_sample( flight.id, at).await? )
    }

    /// first and last sample time stamps at or before `at`, per flight and overall. Without flight
    /// references this covers all flights. References that don't resolve are ignored
    pub async fn window (&self, params: &WindowParams)->Result<WindowResult> {
        let at = parse_at( params.at.as_deref())?;

        let ids: Vec<FlightId> = params.flight_ids.as_deref().map_or( Vec::new(), |s| {
            split_list(s).into_iter().filter_map(|e| e.parse().ok()).collect()
        });
        let codes: Vec<String> = params.flight_codes.as_deref().map_or( Vec::new(), |s| {
            split_list(s).into_iter().map(|e| e.to_string()).collect()
        });
        let has_refs = params.flight_ids.as_deref().is_some_and(|s| !split_list(s).is_empty())
            || params.flight_codes.as_deref().is_some_and(|s| !split_list(s).is_empty());

        let bounds = if has_refs {
            let mut flights: Vec<FlightId> = self.store.find_flights( &ids).await?.into_iter().map(|f| f.id).collect();
            let mut seen: HashSet<FlightId> = flights.iter().copied().collect();
            for f in self.store.find_flights_by_code( &codes).await? {
                if seen.insert(f.id) { flights.push(f.id) }
            }
            if flights.is_empty() {
                return Ok( WindowResult::default())
            }
            self.store.time_bounds( Some(&flights), at).await?
        } else {
            self.store.time_bounds( None, at).await?
        };

        let mut result = WindowResult::default();
        for b in bounds {
            result.by_flight.insert( b.flight, TimeSpan { min: Some(b.min), max: Some(b.max) });
            if result.global.min.is_none_or(|min| b.min < min) { result.global.min = Some(b.min) }
            if result.global.max.is_none_or(|max| b.max > max) { result.global.max = Some(b.max) }
        }
        Ok(result)
    }

    /// for each requested flight the samples immediately at-or-before and at-or-after `at`.
    /// Every syntactically valid id is included in the result, even if it has no samples
    pub async fn nearest (&self, params: &NearestParams)->Result<NearestResult> {
        let ids_spec = params.flight_ids.as_deref().filter(|s| !s.is_empty()).ok_or_else(|| invalid_request("flightIds is required"))?;
        let at = params.at.as_deref().and_then( parse_datetime).ok_or_else(|| invalid_request("invalid at param"))?;

        let mut ids: Vec<FlightId> = Vec::new();
        let mut seen: HashSet<FlightId> = HashSet::new();
        for id in split_list( ids_spec).into_iter().filter_map(|e| e.parse::<FlightId>().ok()) {
            if seen.insert(id) { ids.push(id) }
        }
        if ids.is_empty() {
            return Err( invalid_request("no valid flightIds"))
        }

        let (before, after) = tokio::join!( self.store.nearest_before( &ids, at), self.store.nearest_after( &ids, at));

        let mut result: NearestResult = ids.iter().map(|id| (*id, NearestPair::default())).collect();
        for s in before? {
            if let Some(pair) = result.get_mut(&s.flight) { pair.prev = Some( SamplePoint::from(&s)) }
        }
        for s in after? {
            if let Some(pair) = result.get_mut(&s.flight) { pair.next = Some( SamplePoint::from(&s)) }
        }
        Ok(result)
    }
}
