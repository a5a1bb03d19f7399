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

//! the realtime telemetry core of skytrack.
//!
//! Samples enter either through the [`sim::SimEngine`] (simulated flights) or the
//! [`ingest::IngestGateway`] (externally reported positions). Simulated samples are staged in the
//! [`buffer::SampleBuffer`] and persisted in batches by the flush scheduler, ingested ones are
//! written directly. Both paths publish through the [`broadcast::BroadcastRegistry`]. Queries
//! ([`query::QueryEngine`]) only see what has been persisted.
//!
//! [`TelemetryHub`] wires all of this together for a given store and owns the shutdown sequence.

use std::{sync::{Arc,Mutex}, time::Duration};
use serde::{Serialize,Deserialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info,warn};

use skytrack_common::datetime::{deserialize_duration, serialize_duration};
use skytrack_store::TelemetryStore;

pub mod errors;
pub mod broadcast;
pub mod buffer;
pub mod sim;
pub mod ingest;
pub mod query;
pub mod flights;

use broadcast::BroadcastRegistry;
use buffer::{spawn_flush_scheduler, FlushReport, SampleBuffer};
use flights::FlightRegistry;
use ingest::IngestGateway;
use query::QueryEngine;
use sim::SimEngine;

#[derive(Debug,Clone,Serialize,Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// how often buffered simulation samples are persisted
    #[serde(deserialize_with="deserialize_duration", serialize_with="serialize_duration")]
    pub flush_interval: Duration,

    /// max number of samples per flight and flush pass
    pub batch_size: usize,

    /// only every n-th simulated position is persisted (all of them are broadcast)
    pub write_every_n: u64,

    /// default simulation tick period
    #[serde(deserialize_with="deserialize_duration", serialize_with="serialize_duration")]
    pub sim_period: Duration,

    /// default normalized progress per tick
    pub sim_step: f64,

    /// max number of queued frames per push subscriber before it is dropped
    pub subscriber_capacity: usize,

    /// additional attempts if an ingest insert fails as a whole
    pub ingest_retries: u32,
}

impl Default for TelemetryConfig {
    fn default()->Self {
        TelemetryConfig {
            flush_interval: Duration::from_millis(1000),
            batch_size: 200,
            write_every_n: 5,
            sim_period: Duration::from_millis(200),
            sim_step: 0.01,
            subscriber_capacity: 256,
            ingest_retries: 0,
        }
    }
}

pub struct TelemetryHub {
    pub config: TelemetryConfig,
    pub store: Arc<dyn TelemetryStore>,
    pub registry: Arc<BroadcastRegistry>,
    pub buffer: Arc<SampleBuffer>,
    pub sim: SimEngine,
    pub ingest: IngestGateway,
    pub query: QueryEngine,
    pub flights: FlightRegistry,

    cancel: CancellationToken,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl TelemetryHub {
    pub fn new (store: Arc<dyn TelemetryStore>, config: TelemetryConfig)->Self {
        let registry = Arc::new( BroadcastRegistry::new( config.subscriber_capacity));
        let buffer = Arc::new( SampleBuffer::new( store.clone(), config.batch_size));

        TelemetryHub {
            sim: SimEngine::new( buffer.clone(), registry.clone(), config.write_every_n),
            ingest: IngestGateway::new( store.clone(), registry.clone(), config.ingest_retries),
            query: QueryEngine::new( store.clone()),
            flights: FlightRegistry::new( store.clone(), registry.clone()),
            config,
            store,
            registry,
            buffer,
            cancel: CancellationToken::new(),
            flush_task: Mutex::new(None),
        }
    }

    /// start the flush scheduler. Calling this more than once has no effect
    pub fn start (&self) {
        let mut flush_task = self.flush_task.lock().unwrap_or_else(|e| e.into_inner());
        if flush_task.is_none() && !self.cancel.is_cancelled() {
            *flush_task = Some( spawn_flush_scheduler( self.buffer.clone(), self.config.flush_interval, self.cancel.clone()));
        }
    }

    /// refuse new simulation runs and stop the active ones, stop the flush scheduler, persist whatever is still buffered,
    /// disconnect push subscribers and close the store. The store must not be used after this returns
    pub async fn shutdown (&self)->FlushReport {
        self.sim.close();
        let n_runs = self.sim.stop_all().await;
        info!("stopped {n_runs} simulation runs");

        self.cancel.cancel();
        let flush_task = self.flush_task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = flush_task {
            if let Err(e) = task.await {
                warn!("flush scheduler terminated abnormally: {e}");
            }
        }

        let report = self.buffer.flush_all().await;
        info!("final flush: {} inserted, {} failed", report.inserted, report.failed);

        self.registry.clear();
        self.store.close().await;
        report
    }
}
