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

//! per-flight in-memory staging of samples that are persisted in batches.
//!
//! Producers call [`SampleBuffer::push`], which never touches the store. A scheduler task
//! (see [`spawn_flush_scheduler`]) periodically detaches up to `batch_size` of the oldest samples
//! of each flight and hands them to the store. A sample leaves the buffer exactly once - if the
//! store fails it is logged and lost, there is no re-queueing.

use std::{sync::Arc, time::Duration};
use dashmap::DashMap;
use tokio::{sync::Mutex, task::JoinHandle, time::{interval_at, Instant, MissedTickBehavior}};
use tokio_util::sync::CancellationToken;
use tracing::{debug,error,info,warn};

use skytrack_store::{FlightId, NewSample, TelemetryStore};

/// statistics of a flush operation
#[derive(Debug,Clone,Default,PartialEq)]
pub struct FlushReport {
    pub batches: usize,
    pub inserted: usize,
    pub failed: usize,  // rows rejected by the store or lost in failed batches
    pub errors: usize,  // number of batches that failed as a whole
}

impl FlushReport {
    pub fn is_empty (&self)->bool { self.batches == 0 }
}

pub struct SampleBuffer {
    pending: DashMap<FlightId,Vec<NewSample>>,
    store: Arc<dyn TelemetryStore>,
    batch_size: usize,
    flush_guard: Mutex<()>,
}

impl SampleBuffer {
    pub fn new (store: Arc<dyn TelemetryStore>, batch_size: usize)->Self {
        SampleBuffer {
            pending: DashMap::new(),
            store,
            batch_size: batch_size.max(1),
            flush_guard: Mutex::new(())
        }
    }

    pub fn push (&self, sample: NewSample) {
        self.pending.entry( sample.flight).or_default().push( sample);
    }

    pub fn pending (&self, id: FlightId)->usize {
        self.pending.get(&id).map_or( 0, |v| v.len())
    }

    pub fn pending_total (&self)->usize {
        self.pending.iter().map(|e| e.value().len()).sum()
    }

    fn flight_ids (&self)->Vec<FlightId> {
        self.pending.iter().map(|e| *e.key()).collect()
    }

    /// detach up to `max` of the oldest samples for `id`
    fn take (&self, id: FlightId, max: usize)->Vec<NewSample> {
        let batch: Vec<NewSample> = match self.pending.get_mut(&id) {
            Some(mut samples) => {
                let n = samples.len().min(max);
                samples.drain(..n).collect()
            }
            None => return Vec::new()
        };
        self.pending.remove_if( &id, |_,samples| samples.is_empty());
        batch
    }

    async fn persist (&self, id: FlightId, batch: Vec<NewSample>, report: &mut FlushReport) {
        let len = batch.len();
        report.batches += 1;

        match self.store.insert_samples( batch).await {
            Ok(outcome) => {
                report.inserted += outcome.inserted.len();
                report.failed += outcome.failed.len();
                if outcome.is_partial() {
                    warn!("flight {id}: {} of {len} buffered samples rejected by store", outcome.failed.len());
                }
            }
            Err(e) => {
                report.errors += 1;
                report.failed += len;
                error!("flight {id}: failed to persist {len} buffered samples: {e}");
            }
        }
    }

    async fn drain_flight (&self, id: FlightId, report: &mut FlushReport) {
        loop {
            let batch = self.take( id, self.batch_size);
            if batch.is_empty() { break }
            self.persist( id, batch, report).await;
        }
    }

    /// one scheduled pass: at most one batch per flight. Returns `None` if another flush
    /// is still running, in which case this pass is skipped
    pub async fn flush_pass (&self)->Option<FlushReport> {
        let _guard = self.flush_guard.try_lock().ok()?;
        let mut report = FlushReport::default();

        for id in self.flight_ids() {
            let batch = self.take( id, self.batch_size);
            if !batch.is_empty() {
                self.persist( id, batch, &mut report).await;
            }
        }
        Some(report)
    }

    /// persist everything that is buffered for `id`
    pub async fn flush_one (&self, id: FlightId)->FlushReport {
        let mut report = FlushReport::default();
        self.drain_flight( id, &mut report).await;
        if !report.is_empty() {
            debug!("flushed flight {id}: {report:?}");
        }
        report
    }

    /// persist everything that is buffered. This waits for a running scheduled pass to finish
    pub async fn flush_all (&self)->FlushReport {
        let _guard = self.flush_guard.lock().await;
        let mut report = FlushReport::default();

        for id in self.flight_ids() {
            self.drain_flight( id, &mut report).await;
        }
        report
    }
}

/// run [`SampleBuffer::flush_pass`] every `interval` until `cancel` is triggered. The first pass
/// happens one interval after the call. Each pass runs in its own task so that a slow store does not
/// delay the schedule - overlapping passes are skipped by the buffer itself
pub fn spawn_flush_scheduler (buffer: Arc<SampleBuffer>, interval: Duration, cancel: CancellationToken)->JoinHandle<()> {
    tokio::spawn( async move {
        let mut timer = interval_at( Instant::now() + interval, interval);
        timer.set_missed_tick_behavior( MissedTickBehavior::Skip);
        info!("flush scheduler started with interval {interval:?}");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {
                    let buffer = buffer.clone();
                    tokio::spawn( async move {
                        match buffer.flush_pass().await {
                            Some(report) if !report.is_empty() => debug!("flush pass: {report:?}"),
                            Some(_) => {}
                            None => debug!("flush pass skipped, previous pass still running")
                        }
                    });
                }
            }
        }
        info!("flush scheduler stopped");
    })
}
