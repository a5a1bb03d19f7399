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

mod common;
use common::*;

use std::sync::{Arc, atomic::Ordering};
use serde_json::json;

use skytrack_store::{Flight, TelemetryStore};
use skytrack_telemetry::{
    broadcast::{BroadcastRegistry, Subscription},
    ingest::{IngestFailure, IngestGateway, IngestOutcome, IngestReport}
};

struct Setup {
    store: Arc<FlakyStore>,
    gateway: IngestGateway,
    sub: Subscription,
    flight: Flight,
}

async fn setup (retries: u32)->Setup {
    let store = Arc::new( FlakyStore::new());
    let flight = store.insert_flight( new_flight("TK1")).await.unwrap();
    let registry = Arc::new( BroadcastRegistry::new(64));
    let sub = registry.register();
    let gateway = IngestGateway::new( store.clone(), registry, retries);
    Setup { store, gateway, sub, flight }
}

fn rejected (msg: &str)->IngestOutcome { IngestOutcome::Rejected( msg.to_string()) }

// run with "cargo test test_validation -- --nocapture"
#[tokio::test]
async fn test_validation() {
    let mut s = setup(0).await;
    let id = s.flight.id.0;

    let cases = [
        (json!({"lat": 41.0, "lng": 28.0}), "flightId/flightCode and lat,lng are required"),
        (json!({"flightId": id, "lng": 28.0}), "flightId/flightCode and lat,lng are required"),
        (json!({"flightId": id, "lat": null, "lng": 28.0}), "flightId/flightCode and lat,lng are required"),
        (json!("not an object"), "flightId/flightCode and lat,lng are required"),
        (json!({"flightId": id, "lat": 91.0, "lng": 28.0}), "invalid coordinates"),
        (json!({"flightCode": "TK1", "lat": 41.0, "lng": -180.5}), "invalid coordinates"),
        (json!({"flightId": id, "lat": "north", "lng": 28.0}), "invalid coordinates"),
        (json!({"flightId": id, "lat": "91.5", "lng": 28.0}), "invalid coordinates"),
        (json!({"flightId": id, "lat": 41.0, "lng": "NaN"}), "invalid coordinates"),
        (json!({"flightId": id, "lat": 41.0, "lng": 28.0, "ts": "yesterday"}), "invalid ts"),
        // one bad item rejects the whole batch
        (json!([{"flightId": id, "lat": 41.0, "lng": 28.0}, {"flightId": id, "lat": 41.0}]), "flightId/flightCode and lat,lng are required"),
    ];

    for (payload, msg) in cases {
        println!("{payload} -> {msg}");
        assert_eq!( s.gateway.ingest( &payload).await.unwrap(), rejected(msg));
    }

    assert_eq!( s.store.insert_calls(), 0);
    assert!( drain_frames( &mut s.sub.rx).is_empty());
}

#[tokio::test]
async fn test_resolution() {
    let mut s = setup(0).await;
    let id = s.flight.id.0;

    let payload = json!([
        {"flightId": id, "lat": 41.0, "lng": 28.0, "ts": "2025-10-26T10:00:00Z"},
        {"flightId": id.to_string(), "lat": 41.1, "lng": 28.1, "ts": 1761472810000i64},
        {"entityCode": "TK1", "lat": 41.2, "lng": 28.2},
        {"flightCode": "XX999", "lat": 41.3, "lng": 28.3},
        {"flightId": "abc", "lat": 41.4, "lng": 28.4},
    ]);

    let outcome = s.gateway.ingest( &payload).await.unwrap();
    assert_eq!( outcome, IngestOutcome::Accepted( IngestReport {
        inserted: 3,
        failed: vec![
            IngestFailure { flight_ref: "XX999".to_string(), reason: "flight not found".to_string() },
            IngestFailure { flight_ref: "abc".to_string(), reason: "flight not found".to_string() },
        ]
    }));

    let frames = drain_frames( &mut s.sub.rx);
    assert_eq!( frames.len(), 3);
    assert_eq!( frames[0]["ts"], 1761472800000i64);
    assert_eq!( frames[1]["ts"], 1761472810000i64);
    assert_eq!( s.store.sample_count(None).await.unwrap(), 3);

    let json = serde_json::to_value( &IngestReport { inserted: 0, failed: vec![
        IngestFailure { flight_ref: "XX999".to_string(), reason: "flight not found".to_string() }
    ]}).unwrap();
    assert_eq!( json, json!({"inserted": 0, "failed": [{"ref": "XX999", "reason": "flight not found"}]}));
}

#[tokio::test]
async fn test_numeric_string_coordinates() {
    let mut s = setup(0).await;
    let id = s.flight.id.0;

    // repeated references to the same flight all resolve
    let mut items: Vec<serde_json::Value> = (0..40).map(|_| json!({"flightCode": "TK1", "lat": 41.0, "lng": 28.0})).collect();
    items.push( json!({"flightId": id, "lat": "41.2", "lng": " 28.9 "}));

    let outcome = s.gateway.ingest( &json!(items)).await.unwrap();
    assert_eq!( outcome, IngestOutcome::Accepted( IngestReport { inserted: 41, failed: vec![] }));

    let frames = drain_frames( &mut s.sub.rx);
    assert_eq!( frames.len(), 41);
    assert_close( &frames[40]["lat"], 41.2);
    assert_close( &frames[40]["lng"], 28.9);
}

#[tokio::test]
async fn test_none_resolved() {
    let mut s = setup(0).await;

    let outcome = s.gateway.ingest( &json!({"flightCode": "NOPE", "lat": 1.0, "lng": 2.0})).await.unwrap();
    match outcome {
        IngestOutcome::NoneResolved(failed) => assert_eq!( failed[0].flight_ref, "NOPE"),
        other => panic!("unexpected outcome {other:?}")
    }
    assert_eq!( s.store.insert_calls(), 0);

    let outcome = s.gateway.ingest( &json!([])).await.unwrap();
    assert_eq!( outcome, IngestOutcome::NoneResolved( vec![]));
}

#[tokio::test]
async fn test_only_confirmed_rows_are_broadcast() {
    let mut s = setup(0).await;
    let id = s.flight.id.0;

    let payload = json!([
        {"flightId": id, "lat": 41.0, "lng": 28.0},
        {"flightId": id, "lat": REJECTED_LAT, "lng": 28.0},
        {"flightId": id, "lat": 42.0, "lng": 28.0},
    ]);
    match s.gateway.ingest( &payload).await.unwrap() {
        IngestOutcome::Accepted(report) => {
            assert_eq!( report.inserted, 2);
            assert!( report.failed.is_empty());
        }
        other => panic!("unexpected outcome {other:?}")
    }

    let frames = drain_frames( &mut s.sub.rx);
    let lats: Vec<f64> = frames.iter().map(|f| f["lat"].as_f64().unwrap()).collect();
    assert_eq!( lats, vec![41.0, 42.0]);
}

#[tokio::test]
async fn test_insert_failure_is_swallowed() {
    let mut s = setup(0).await;
    s.store.fail_inserts.store( true, Ordering::SeqCst);

    let outcome = s.gateway.ingest( &json!({"flightId": s.flight.id.0, "lat": 1.0, "lng": 2.0})).await.unwrap();
    assert_eq!( outcome, IngestOutcome::Accepted( IngestReport { inserted: 0, failed: vec![] }));
    assert_eq!( s.store.insert_calls(), 1);
    assert!( drain_frames( &mut s.sub.rx).is_empty());
}

#[tokio::test]
async fn test_insert_retries() {
    let s = setup(2).await;
    s.store.fail_inserts.store( true, Ordering::SeqCst);

    s.gateway.ingest( &json!({"flightId": s.flight.id.0, "lat": 1.0, "lng": 2.0})).await.unwrap();
    assert_eq!( s.store.insert_calls(), 3);
}
