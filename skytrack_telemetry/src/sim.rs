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

//! the flight simulation engine.
//!
//! Each running flight is driven by its own tokio task that advances a normalized phase along the
//! straight line between departure and destination. Every tick is broadcast, every n-th tick is also
//! handed to the [`SampleBuffer`] (with the same position and time stamp).

use std::{sync::{Arc, atomic::{AtomicBool,Ordering}}, time::Duration};
use chrono::{DateTime,Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use serde::Serialize;
use tokio::{task::JoinHandle, time::{interval_at, Instant, MissedTickBehavior}};
use tracing::{debug,info};

use skytrack_common::{datetime::{ser_iso_millis, utc_now}, geo::{interpolate, GeoPos}};
use skytrack_store::{Flight, FlightId, NewSample};
use crate::{broadcast::{BroadcastRegistry, TelemetryEvent}, buffer::{FlushReport, SampleBuffer}, errors::{Result, TelemetryError}};

/// the part of a flight record the simulation needs
#[derive(Debug,Clone,PartialEq)]
pub struct FlightSnapshot {
    pub id: FlightId,
    pub code: String,
    pub departure: GeoPos,
    pub destination: GeoPos,
}

impl From<&Flight> for FlightSnapshot {
    fn from (f: &Flight)->Self {
        FlightSnapshot { id: f.id, code: f.code.clone(), departure: f.departure, destination: f.destination }
    }
}

/// the state of one simulation run. This is owned by the run task, nobody else mutates it
#[derive(Debug,Clone)]
pub struct SimRun {
    snapshot: FlightSnapshot,
    phase: f64,
    step: f64,
    tick: u64,
    write_every_n: u64,
}

impl SimRun {
    pub fn new (snapshot: FlightSnapshot, step: f64, write_every_n: u64)->Self {
        SimRun { snapshot, phase: 0.0, step, tick: 0, write_every_n: write_every_n.max(1) }
    }

    pub fn phase (&self)->f64 { self.phase }
    pub fn ticks (&self)->u64 { self.tick }

    /// compute the next position and whether it should be persisted. Once the phase passes 1
    /// it restarts at the departure point
    pub fn advance (&mut self)->(GeoPos,bool) {
        let next = self.phase + self.step;
        self.phase = if next > 1.0 { 0.0 } else { next };

        let pos = interpolate( &self.snapshot.departure, &self.snapshot.destination, self.phase);
        let persist = self.tick % self.write_every_n == 0;
        self.tick += 1;

        (pos, persist)
    }
}

/// publicly visible info about an active run
#[derive(Debug,Clone,Serialize)]
#[serde(rename_all="camelCase")]
pub struct RunInfo {
    pub flight_id: FlightId,
    pub flight_code: String,
    pub period_ms: u64,
    pub step: f64,
    #[serde(serialize_with="ser_iso_millis")]
    pub started_at: DateTime<Utc>,
}

struct RunHandle {
    info: RunInfo,
    task: JoinHandle<()>,
}

pub struct SimEngine {
    runs: DashMap<FlightId,RunHandle>,
    buffer: Arc<SampleBuffer>,
    registry: Arc<BroadcastRegistry>,
    write_every_n: u64,
    closed: AtomicBool,
}

impl SimEngine {
    pub fn new (buffer: Arc<SampleBuffer>, registry: Arc<BroadcastRegistry>, write_every_n: u64)->Self {
        SimEngine { runs: DashMap::new(), buffer, registry, write_every_n: write_every_n.max(1), closed: AtomicBool::new(false) }
    }

    /// start a run for `flight` unless there already is one, in which case this returns `Ok(false)`.
    /// The first tick happens one `period` after the call. Fails with [`TelemetryError::ShuttingDown`]
    /// once the engine is closed
    pub fn start (&self, flight: &Flight, period: Duration, step: f64)->Result<bool> {
        // the closed check has to happen under the entry lock, otherwise a run could slip past stop_all
        match self.runs.entry( flight.id) {
            _ if self.is_closed() => Err( TelemetryError::ShuttingDown),
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(e) => {
                let period = period.max( Duration::from_millis(1)); // zero periods would panic the timer
                let run = SimRun::new( FlightSnapshot::from(flight), step, self.write_every_n);
                let task = tokio::spawn( run_loop( run, period, self.buffer.clone(), self.registry.clone()));
                let info = RunInfo {
                    flight_id: flight.id,
                    flight_code: flight.code.clone(),
                    period_ms: period.as_millis() as u64,
                    step,
                    started_at: utc_now()
                };
                e.insert( RunHandle { info, task });
                info!("started simulation of flight {} ({}) with period {period:?} and step {step}", flight.code, flight.id);
                Ok(true)
            }
        }
    }

    /// refuse new runs from now on. Runs that are already active are not affected (see [`stop_all`](Self::stop_all))
    pub fn close (&self) {
        self.closed.store( true, Ordering::SeqCst);
    }

    pub fn is_closed (&self)->bool { self.closed.load(Ordering::SeqCst) }

    /// stop the run for `id` and persist what it has buffered so far. Returns `None` if there was no run
    pub async fn stop (&self, id: FlightId)->Option<FlushReport> {
        let (_,handle) = self.runs.remove(&id)?;
        handle.task.abort();
        let _ = handle.task.await; // make sure there is no tick in flight before we flush

        let report = self.buffer.flush_one( id).await;
        info!("stopped simulation of flight {id}, flushed {} samples", report.inserted);
        Some(report)
    }

    pub async fn stop_all (&self)->usize {
        let ids: Vec<FlightId> = self.runs.iter().map(|e| *e.key()).collect();
        let mut n = 0;
        for id in ids {
            if self.stop(id).await.is_some() { n += 1 }
        }
        n
    }

    pub fn is_running (&self, id: FlightId)->bool { self.runs.contains_key(&id) }

    pub fn active_runs (&self)->Vec<RunInfo> {
        let mut list: Vec<RunInfo> = self.runs.iter().map(|e| e.value().info.clone()).collect();
        list.sort_by_key(|r| r.flight_id);
        list
    }
}

/// one tick: broadcast always, buffer if due. This does not await anything so that a run
/// cannot be cancelled between the two
fn emit (run: &mut SimRun, buffer: &SampleBuffer, registry: &BroadcastRegistry) {
    let (pos, persist) = run.advance();
    let ts = utc_now();
    let id = run.snapshot.id;

    registry.broadcast( &TelemetryEvent::telemetry( id, pos.lat, pos.lng, ts));
    if persist {
        buffer.push( NewSample::new( id, pos, ts));
    }
}

async fn run_loop (mut run: SimRun, period: Duration, buffer: Arc<SampleBuffer>, registry: Arc<BroadcastRegistry>) {
    let mut timer = interval_at( Instant::now() + period, period);
    timer.set_missed_tick_behavior( MissedTickBehavior::Skip);

    loop {
        timer.tick().await;
        emit( &mut run, &buffer, &registry);
        if run.ticks() % 100 == 0 {
            debug!("flight {} at phase {:.2} after {} ticks", run.snapshot.code, run.phase(), run.ticks());
        }
    }
}
