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

//! fan-out of telemetry events to connected push clients.
//!
//! Each subscriber gets a bounded channel of pre-serialized JSON frames. Sending never waits:
//! a subscriber whose channel is full (slow consumer) or closed (connection gone) is dropped
//! from the registry. Delivery is best effort, there are no retries.

use std::{collections::HashMap, sync::{Arc,Mutex,MutexGuard}};
use chrono::{DateTime,Utc};
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug,error,warn};

use skytrack_common::datetime::ser_epoch_millis;
use skytrack_store::{Flight, FlightId, Sample};

pub type ConnectionId = u64;

/// the messages we push to subscribers. Time stamps are sent as epoch millis
#[derive(Debug,Clone,Serialize)]
#[serde(tag="type")]
pub enum TelemetryEvent {
    #[serde(rename="telemetry", rename_all="camelCase")]
    Telemetry {
        flight_id: FlightId,
        lat: f64,
        lng: f64,
        #[serde(serialize_with="ser_epoch_millis")]
        ts: DateTime<Utc>
    },

    #[serde(rename="flight.created")]
    FlightCreated { flight: Flight },

    #[serde(rename="hello")]
    Hello { ok: bool }
}

impl TelemetryEvent {
    pub fn telemetry (flight_id: FlightId, lat: f64, lng: f64, ts: DateTime<Utc>)->Self {
        TelemetryEvent::Telemetry { flight_id, lat, lng, ts }
    }

    pub fn hello ()->Self { TelemetryEvent::Hello { ok: true } }

    pub fn to_json (&self)->serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<&Sample> for TelemetryEvent {
    fn from (s: &Sample)->Self {
        TelemetryEvent::telemetry( s.flight, s.lat, s.lng, s.ts)
    }
}

/// what a connection handler gets when registering
pub struct Subscription {
    pub id: ConnectionId,
    pub rx: mpsc::Receiver<Arc<str>>
}

#[derive(Default)]
struct Subscribers {
    last_id: ConnectionId,
    senders: HashMap<ConnectionId,mpsc::Sender<Arc<str>>>
}

pub struct BroadcastRegistry {
    subscribers: Mutex<Subscribers>,
    capacity: usize,
}

impl BroadcastRegistry {
    pub fn new (capacity: usize)->Self {
        BroadcastRegistry { subscribers: Mutex::new( Subscribers::default()), capacity: capacity.max(1) }
    }

    // the critical sections never panic, but we don't want to propagate a poisoned lock if they did
    fn lock (&self)->MutexGuard<'_,Subscribers> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register (&self)->Subscription {
        let (tx,rx) = mpsc::channel( self.capacity);
        let mut subs = self.lock();
        subs.last_id += 1;
        let id = subs.last_id;
        subs.senders.insert( id, tx);
        debug!("registered subscriber {id} ({} total)", subs.senders.len());

        Subscription { id, rx }
    }

    pub fn unregister (&self, id: ConnectionId)->bool {
        let removed = self.lock().senders.remove(&id).is_some();
        if removed { debug!("unregistered subscriber {id}") }
        removed
    }

    /// drop all subscribers, which ends their receive loops
    pub fn clear (&self) {
        let n = { let mut subs = self.lock(); let n = subs.senders.len(); subs.senders.clear(); n };
        if n > 0 { debug!("dropped {n} subscribers") }
    }

    pub fn len (&self)->usize { self.lock().senders.len() }

    pub fn is_empty (&self)->bool { self.len() == 0 }

    /// send to all registered subscribers, returning the number of successful deliveries
    pub fn broadcast (&self, event: &TelemetryEvent)->usize {
        let frame: Arc<str> = match event.to_json() {
            Ok(json) => json.into(),
            Err(e) => { error!("failed to serialize event: {e}"); return 0 }
        };

        // snapshot so that we don't hold the lock while sending
        let targets: Vec<(ConnectionId,mpsc::Sender<Arc<str>>)> = {
            let subs = self.lock();
            if subs.senders.is_empty() { return 0 }
            subs.senders.iter().map(|(id,tx)| (*id, tx.clone())).collect()
        };

        let mut n_sent = 0;
        let mut dropped: Vec<ConnectionId> = Vec::new();
        for (id,tx) in targets {
            match tx.try_send( frame.clone()) {
                Ok(()) => n_sent += 1,
                Err(TrySendError::Full(_)) => { warn!("subscriber {id} is not keeping up, dropping it"); dropped.push(id) }
                Err(TrySendError::Closed(_)) => dropped.push(id)
            }
        }

        if !dropped.is_empty() {
            let mut subs = self.lock();
            for id in &dropped { subs.senders.remove(id); }
        }
        n_sent
    }

    /// send to a single subscriber (e.g. a greeting). Same drop policy as [`Self::broadcast`]
    pub fn send_to (&self, id: ConnectionId, event: &TelemetryEvent)->bool {
        let tx = match self.lock().senders.get(&id) {
            Some(tx) => tx.clone(),
            None => return false
        };

        let sent = match event.to_json() {
            Ok(json) => tx.try_send( json.into()).is_ok(),
            Err(e) => { error!("failed to serialize event: {e}"); return false }
        };
        if !sent { self.unregister(id); }
        sent
    }
}
