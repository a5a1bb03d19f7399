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

use std::sync::Arc;
use chrono::{DateTime,Utc};
use skytrack_common::{datetime::parse_datetime, geo::GeoPos};
use skytrack_store::{
    errors::StoreError, memory::MemoryStore, open_store, sqlite::SqliteStore,
    FlightId, NewFlight, NewSample, SampleRange, SortOrder, StoreConfig, TelemetryStore
};

/// the same checks are run against all store backends
/// run with "cargo test test_memory_store -- --nocapture"

fn t (s: &str)->DateTime<Utc> { parse_datetime(s).unwrap() }

fn new_flight (code: &str, departure_time: &str)->NewFlight {
    NewFlight {
        code: code.to_string(),
        departure: GeoPos::new( 41.2753, 28.7519),
        destination: GeoPos::new( 40.9778, 28.821),
        departure_time: t(departure_time)
    }
}

fn sample (flight: FlightId, lat: f64, lng: f64, ts: &str)->NewSample {
    NewSample { flight, lat, lng, ts: t(ts) }
}

async fn check_flights (store: &dyn TelemetryStore) {
    let b = store.insert_flight( new_flight("TK2", "2025-10-26T12:00:00Z")).await.unwrap();
    let a = store.insert_flight( new_flight("TK1", "2025-10-26T08:00:00Z")).await.unwrap();
    assert_ne!( a.id, b.id);

    match store.insert_flight( new_flight("TK1", "2025-10-27T08:00:00Z")).await {
        Err(StoreError::DuplicateCode(code)) => assert_eq!( code, "TK1"),
        other => panic!("expected duplicate code error, got {other:?}")
    }

    let list = store.list_flights().await.unwrap();
    let codes: Vec<&str> = list.iter().map(|f| f.code.as_str()).collect();
    assert_eq!( codes, vec!["TK1", "TK2"]);

    assert_eq!( store.find_flight( a.id).await.unwrap().unwrap().code, "TK1");
    assert_eq!( store.find_flight_by_code("TK2").await.unwrap().unwrap().id, b.id);
    assert!( store.find_flight( FlightId(9999)).await.unwrap().is_none());

    let found = store.find_flights( &[a.id, FlightId(9999), b.id]).await.unwrap();
    assert_eq!( found.len(), 2);
    let found = store.find_flights_by_code( &["TK2".to_string(), "XX0".to_string()]).await.unwrap();
    assert_eq!( found.len(), 1);
    assert!( store.find_flights( &[]).await.unwrap().is_empty());
}

async fn check_samples (store: &dyn TelemetryStore) {
    let f1 = store.insert_flight( new_flight("S1", "2025-10-26T08:00:00Z")).await.unwrap().id;
    let f2 = store.insert_flight( new_flight("S2", "2025-10-26T09:00:00Z")).await.unwrap().id;

    let outcome = store.insert_samples( vec![
        sample( f1, 41.0, 28.0, "2025-10-26T10:00:00Z"),
        sample( f1, 41.1, 28.1, "2025-10-26T10:00:10Z"),
        sample( FlightId(9999), 41.2, 28.2, "2025-10-26T10:00:20Z"), // unknown flight
        sample( f1, 95.0, 28.3, "2025-10-26T10:00:30Z"),              // bad latitude
        sample( f1, 41.4, 28.4, "2025-10-26T10:00:40Z"),
        sample( f2, 40.0, 27.0, "2025-10-26T10:00:05Z"),
    ]).await.unwrap();

    assert!( outcome.is_partial());
    assert_eq!( outcome.inserted.len(), 4);
    let failed: Vec<usize> = outcome.failed.iter().map(|f| f.index).collect();
    assert_eq!( failed, vec![2, 3]);
    assert_eq!( store.sample_count( Some(f1)).await.unwrap(), 3);
    assert_eq!( store.sample_count( None).await.unwrap(), 4);

    //--- range
    let range = SampleRange { flight: f1, from: None, to: None, order: SortOrder::Ascending, limit: 1000 };
    let list = store.samples_in_range( &range).await.unwrap();
    assert_eq!( list.len(), 3);
    assert!( list.windows(2).all(|w| w[0].ts <= w[1].ts));

    let range = SampleRange { from: Some(t("2025-10-26T10:00:10Z")), to: Some(t("2025-10-26T10:00:40Z")), order: SortOrder::Descending, ..range };
    let list = store.samples_in_range( &range).await.unwrap();
    assert_eq!( list.len(), 2); // bounds are inclusive
    assert_eq!( list[0].ts, t("2025-10-26T10:00:40Z"));

    let range = SampleRange { limit: 1, ..range };
    assert_eq!( store.samples_in_range( &range).await.unwrap().len(), 1);

    //--- latest
    let s = store.latest_sample( f1, t("2025-10-26T10:00:39Z")).await.unwrap().unwrap();
    assert_eq!( s.ts, t("2025-10-26T10:00:10Z"));
    let s = store.latest_sample( f1, t("2025-10-26T10:00:40Z")).await.unwrap().unwrap();
    assert_eq!( s.ts, t("2025-10-26T10:00:40Z"));
    assert!( store.latest_sample( f1, t("2025-10-26T09:00:00Z")).await.unwrap().is_none());

    //--- time bounds
    let bounds = store.time_bounds( None, t("2025-10-26T11:00:00Z")).await.unwrap();
    assert_eq!( bounds.len(), 2);
    let b1 = bounds.iter().find(|b| b.flight == f1).unwrap();
    assert_eq!( b1.min, t("2025-10-26T10:00:00Z"));
    assert_eq!( b1.max, t("2025-10-26T10:00:40Z"));

    let bounds = store.time_bounds( Some(&[f2]), t("2025-10-26T10:00:01Z")).await.unwrap();
    assert!( bounds.is_empty()); // f2 has nothing before that time

    //--- nearest
    let before = store.nearest_before( &[f1, f2], t("2025-10-26T10:00:07Z")).await.unwrap();
    assert_eq!( before.len(), 2);
    let after = store.nearest_after( &[f1, f2], t("2025-10-26T10:00:07Z")).await.unwrap();
    assert_eq!( after.len(), 1);
    assert_eq!( after[0].flight, f1);
    assert_eq!( after[0].ts, t("2025-10-26T10:00:10Z"));
}

async fn check_tie_break (store: &dyn TelemetryStore) {
    let f = store.insert_flight( new_flight("TIE", "2025-10-26T08:00:00Z")).await.unwrap().id;
    let outcome = store.insert_samples( vec![
        sample( f, 10.0, 10.0, "2025-10-26T10:00:00Z"),
        sample( f, 20.0, 20.0, "2025-10-26T10:00:00Z"),
    ]).await.unwrap();
    let first_id = outcome.inserted[0].id;

    let at = t("2025-10-26T10:00:00Z");
    let before = store.nearest_before( &[f], at).await.unwrap();
    let after = store.nearest_after( &[f], at).await.unwrap();
    assert_eq!( before[0].id, first_id);
    assert_eq!( after[0].id, first_id);
    assert_eq!( store.latest_sample( f, at).await.unwrap().unwrap().id, first_id);
}

async fn check_all (store: Arc<dyn TelemetryStore>) {
    check_flights( store.as_ref()).await;
    check_samples( store.as_ref()).await;
    check_tie_break( store.as_ref()).await;
    store.close().await;
}

#[tokio::test]
async fn test_memory_store() {
    check_all( Arc::new( MemoryStore::new())).await;
}

#[tokio::test]
async fn test_sqlite_store() {
    let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
    check_all( Arc::new(store)).await;
}

// a failure that is not a constraint violation aborts the whole batch
#[tokio::test]
async fn test_sqlite_batch_abort() {
    let path = std::env::temp_dir().join( format!("skytrack-abort-{}.db", std::process::id()));
    let _ = std::fs::remove_file( &path);
    let url = format!("sqlite://{}", path.display());

    let store = SqliteStore::connect( &url).await.unwrap();
    let f = store.insert_flight( new_flight("AB1", "2025-10-26T08:00:00Z")).await.unwrap().id;
    let outcome = store.insert_samples( vec![ sample( f, 41.0, 28.0, "2025-10-26T10:00:00Z")]).await.unwrap();
    assert_eq!( outcome.inserted.len(), 1);

    // pull the table out from under the store through a separate connection
    let pool = sqlx::SqlitePool::connect( &url).await.unwrap();
    sqlx::query("DROP TABLE samples").execute( &pool).await.unwrap();
    pool.close().await;

    let res = store.insert_samples( vec![
        sample( f, 41.1, 28.1, "2025-10-26T10:00:10Z"),
        sample( f, 41.2, 28.2, "2025-10-26T10:00:20Z"),
    ]).await;
    assert!( matches!( res, Err(StoreError::SqlError(_))), "expected abort, got {res:?}");

    store.close().await;
    let _ = std::fs::remove_file( &path);
}

#[tokio::test]
async fn test_open_store() {
    let store = open_store( &StoreConfig::Memory).await.unwrap();
    assert_eq!( store.sample_count(None).await.unwrap(), 0);

    let cfg: StoreConfig = ron::from_str(r#"Sqlite( url: "sqlite::memory:" )"#).unwrap();
    let store = open_store( &cfg).await.unwrap();
    assert!( store.list_flights().await.unwrap().is_empty());
}
