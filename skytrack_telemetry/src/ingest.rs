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

//! externally reported samples.
//!
//! Requests are validated as a whole before we touch the store. Flight references are then resolved
//! with one batched lookup per reference kind, and all resolved samples are written with a single
//! unordered insert. Only the rows the store confirms are broadcast.

use std::{collections::{HashMap,HashSet}, sync::Arc};
use chrono::{DateTime,Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug,error,warn};

use skytrack_common::{datetime::{from_epoch_millis, parse_datetime, utc_now}, geo::{is_valid_lat, is_valid_lng}};
use skytrack_store::{FlightId, InsertOutcome, NewSample, TelemetryStore};
use crate::{broadcast::{BroadcastRegistry, TelemetryEvent}, errors::Result};

/// an item that could not be ingested. `ref` echoes the flight id or code of the input item
#[derive(Debug,Clone,PartialEq,Serialize)]
pub struct IngestFailure {
    #[serde(rename="ref")]
    pub flight_ref: String,
    pub reason: String,
}

#[derive(Debug,Clone,PartialEq,Serialize)]
pub struct IngestReport {
    pub inserted: usize,
    pub failed: Vec<IngestFailure>,
}

/// the three distinguishable results of an ingest request
#[derive(Debug,Clone,PartialEq)]
pub enum IngestOutcome {
    /// validation failed, nothing was looked up or written
    Rejected(String),
    /// none of the items referenced a known flight
    NoneResolved(Vec<IngestFailure>),
    /// at least one item was resolved and handed to the store (which might still have rejected it)
    Accepted(IngestReport),
}

#[derive(Debug,Clone,PartialEq)]
enum Ident {
    Id(String),
    Code(String),
}

impl Ident {
    fn as_ref_string (&self)->String {
        match self { Ident::Id(s) | Ident::Code(s) => s.clone() }
    }
}

#[derive(Debug,Clone)]
struct SampleInput {
    ident: Ident,
    lat: f64,
    lng: f64,
    ts: DateTime<Utc>,
}

const MSG_REQUIRED: &str = "flightId/flightCode and lat,lng are required";
const MSG_COORDS: &str = "invalid coordinates";
const MSG_TS: &str = "invalid ts";

fn field<'a> (obj: &'a Map<String,Value>, names: &[&str])->Option<&'a Value> {
    names.iter().filter_map(|n| obj.get(*n)).find(|v| !v.is_null())
}

/// ids and codes can be passed as strings or numbers. Empty strings count as absent
fn ref_string (v: Option<&Value>)->Option<String> {
    match v? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None
    }
}

/// coordinates can be JSON numbers or numeric strings such as "41.2"
fn coord (v: &Value)->Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|x| x.is_finite()),
        _ => None
    }
}

fn parse_ts (v: Option<&Value>, now: DateTime<Utc>)->Option<DateTime<Utc>> {
    match v {
        None => Some(now),
        Some(Value::String(s)) if s.is_empty() => Some(now),
        Some(Value::String(s)) => parse_datetime(s),
        Some(Value::Number(n)) => n.as_i64().and_then( from_epoch_millis),
        Some(_) => None
    }
}

/// validate a single item in the order presence, ranges, time stamp
fn parse_item (v: &Value, now: DateTime<Utc>)->std::result::Result<SampleInput,&'static str> {
    let obj = v.as_object().ok_or(MSG_REQUIRED)?;

    let id = ref_string( field( obj, &["flightId", "entityId"]));
    let code = ref_string( field( obj, &["flightCode", "entityCode"]));
    let lat = field( obj, &["lat"]);
    let lng = field( obj, &["lng"]);

    let ident = match (id, code) {
        (Some(id), _) => Ident::Id(id),
        (None, Some(code)) => Ident::Code(code),
        (None, None) => return Err(MSG_REQUIRED)
    };
    let (Some(lat), Some(lng)) = (lat, lng) else { return Err(MSG_REQUIRED) };

    let lat = coord( lat).filter(|lat| is_valid_lat(*lat)).ok_or(MSG_COORDS)?;
    let lng = coord( lng).filter(|lng| is_valid_lng(*lng)).ok_or(MSG_COORDS)?;

    let ts = parse_ts( field( obj, &["ts"]), now).ok_or(MSG_TS)?;

    Ok( SampleInput { ident, lat, lng, ts } )
}

/// all-or-nothing validation of a request payload (single object or array of objects)
fn parse_payload (payload: &Value)->std::result::Result<Vec<SampleInput>,&'static str> {
    let now = utc_now();
    match payload {
        Value::Array(items) => items.iter().map(|v| parse_item( v, now)).collect(),
        v => Ok( vec![ parse_item( v, now)? ])
    }
}

pub struct IngestGateway {
    store: Arc<dyn TelemetryStore>,
    registry: Arc<BroadcastRegistry>,
    retries: u32,
}

impl IngestGateway {
    pub fn new (store: Arc<dyn TelemetryStore>, registry: Arc<BroadcastRegistry>, retries: u32)->Self {
        IngestGateway { store, registry, retries }
    }

    /// validate, resolve, persist and broadcast. Errors are only returned for failed flight lookups,
    /// a failing insert is logged and reported as zero inserted rows
    pub async fn ingest (&self, payload: &Value)->Result<IngestOutcome> {
        let inputs = match parse_payload( payload) {
            Ok(inputs) => inputs,
            Err(msg) => return Ok( IngestOutcome::Rejected( msg.to_string()))
        };

        let (samples, failed) = self.resolve( inputs).await?;
        if samples.is_empty() {
            return Ok( IngestOutcome::NoneResolved( failed))
        }

        let outcome = self.insert( samples).await;
        for s in &outcome.inserted {
            self.registry.broadcast( &TelemetryEvent::from(s));
        }
        debug!("ingested {} samples, {} unresolved, {} rejected by store", outcome.inserted.len(), failed.len(), outcome.failed.len());

        Ok( IngestOutcome::Accepted( IngestReport { inserted: outcome.inserted.len(), failed }))
    }

    async fn resolve (&self, inputs: Vec<SampleInput>)->Result<(Vec<NewSample>,Vec<IngestFailure>)> {
        let mut ids: Vec<FlightId> = Vec::new();
        let mut codes: Vec<String> = Vec::new();
        let mut seen_ids: HashSet<FlightId> = HashSet::new();
        let mut seen_codes: HashSet<&str> = HashSet::new();
        for input in &inputs {
            match &input.ident {
                Ident::Id(s) => if let Ok(id) = s.parse::<FlightId>() { if seen_ids.insert(id) { ids.push(id) } },
                Ident::Code(c) => if seen_codes.insert( c.as_str()) { codes.push( c.clone()) }
            }
        }

        let (by_id, by_code) = tokio::join!( self.store.find_flights( &ids), self.store.find_flights_by_code( &codes));
        let known_ids: HashSet<FlightId> = by_id?.into_iter().map(|f| f.id).collect();
        let known_codes: HashMap<String,FlightId> = by_code?.into_iter().map(|f| (f.code, f.id)).collect();

        let mut samples = Vec::with_capacity( inputs.len());
        let mut failed = Vec::new();
        for input in inputs {
            let resolved = match &input.ident {
                Ident::Id(s) => s.parse::<FlightId>().ok().filter(|id| known_ids.contains(id)),
                Ident::Code(c) => known_codes.get(c).copied()
            };
            match resolved {
                Some(flight) => samples.push( NewSample { flight, lat: input.lat, lng: input.lng, ts: input.ts }),
                None => failed.push( IngestFailure { flight_ref: input.ident.as_ref_string(), reason: "flight not found".to_string() })
            }
        }

        Ok( (samples, failed) )
    }

    async fn insert (&self, samples: Vec<NewSample>)->InsertOutcome {
        let mut attempt = 0;
        loop {
            match self.store.insert_samples( samples.clone()).await {
                Ok(outcome) => {
                    if outcome.is_partial() {
                        warn!("{} of {} ingested samples rejected by store", outcome.failed.len(), samples.len());
                    }
                    return outcome
                }
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!("ingest insert failed ({e}), retry {attempt} of {}", self.retries);
                }
                Err(e) => {
                    error!("ingest insert of {} samples failed: {e}", samples.len());
                    return InsertOutcome::default()
                }
            }
        }
    }
}
