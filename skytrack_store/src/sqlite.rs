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

//! [`TelemetryStore`] implementation on top of a SQLite database (via sqlx).
//!
//! Time stamps are stored as epoch milliseconds. Tables and indexes are created if they do not
//! exist yet - there is no schema migration.

use std::str::FromStr;
use async_trait::async_trait;
use chrono::{DateTime,Utc};
use sqlx::{
    FromRow, QueryBuilder, Sqlite, SqlitePool,
    error::ErrorKind,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions}
};
use tracing::{debug,info,warn};

use skytrack_common::{datetime::{from_epoch_millis, utc_now}, geo::GeoPos};
use crate::{
    errors::{invalid_record, Result, StoreError},
    Flight, FlightId, FlightTimeBounds, InsertFailure, InsertOutcome, NewFlight, NewSample,
    Sample, SampleId, SampleRange, SortOrder, TelemetryStore
};

const SCHEMA: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS flights (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        code TEXT NOT NULL UNIQUE,
        departure_lat REAL NOT NULL,
        departure_lng REAL NOT NULL,
        destination_lat REAL NOT NULL,
        destination_lng REAL NOT NULL,
        departure_time INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS samples (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        flight_id INTEGER NOT NULL REFERENCES flights(id),
        lat REAL NOT NULL CHECK (lat >= -90.0 AND lat <= 90.0),
        lng REAL NOT NULL CHECK (lng >= -180.0 AND lng <= 180.0),
        ts INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS samples_flight_ts ON samples (flight_id, ts)",
    "CREATE INDEX IF NOT EXISTS samples_ts ON samples (ts)",
];

const FLIGHT_COLUMNS: &str = "id, code, departure_lat, departure_lng, destination_lat, destination_lng, departure_time, created_at";
const SAMPLE_COLUMNS: &str = "id, flight_id, lat, lng, ts";

#[derive(FromRow)]
struct FlightRow {
    id: i64,
    code: String,
    departure_lat: f64,
    departure_lng: f64,
    destination_lat: f64,
    destination_lng: f64,
    departure_time: i64,
    created_at: i64,
}

impl TryFrom<FlightRow> for Flight {
    type Error = StoreError;

    fn try_from (row: FlightRow)->Result<Flight> {
        Ok( Flight {
            id: FlightId(row.id),
            departure: GeoPos::new( row.departure_lat, row.departure_lng),
            destination: GeoPos::new( row.destination_lat, row.destination_lng),
            departure_time: to_datetime( row.departure_time)?,
            created_at: to_datetime( row.created_at)?,
            code: row.code,
        })
    }
}

#[derive(FromRow)]
struct SampleRow {
    id: i64,
    flight_id: i64,
    lat: f64,
    lng: f64,
    ts: i64,
}

impl TryFrom<SampleRow> for Sample {
    type Error = StoreError;

    fn try_from (row: SampleRow)->Result<Sample> {
        Ok( Sample {
            id: SampleId(row.id),
            flight: FlightId(row.flight_id),
            lat: row.lat,
            lng: row.lng,
            ts: to_datetime( row.ts)?
        })
    }
}

#[derive(FromRow)]
struct BoundsRow {
    flight_id: i64,
    min_ts: i64,
    max_ts: i64,
}

fn to_datetime (millis: i64)->Result<DateTime<Utc>> {
    from_epoch_millis( millis).ok_or_else(|| invalid_record( format!("time stamp out of range: {millis}")))
}

fn convert_all<R,T> (rows: Vec<R>)->Result<Vec<T>> where T: TryFrom<R,Error=StoreError> {
    rows.into_iter().map( T::try_from).collect()
}

fn is_memory_url (url: &str)->bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// constraint violations only reject the offending row, anything else aborts the whole batch
fn is_row_violation (kind: ErrorKind)->bool {
    matches!( kind, ErrorKind::UniqueViolation | ErrorKind::ForeignKeyViolation | ErrorKind::NotNullViolation | ErrorKind::CheckViolation)
}

pub struct SqliteStore {
    pool: SqlitePool
}

impl SqliteStore {

    /// open (and if necessary create) the database at `url`, e.g. "sqlite://skytrack.db" or "sqlite::memory:"
    pub async fn connect (url: &str)->Result<Self> {
        let opts = SqliteConnectOptions::from_str( url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // every connection to an in-memory db would get its own database, so we have to keep exactly one alive
        let pool_opts = if is_memory_url( url) {
            SqlitePoolOptions::new().max_connections(1).min_connections(1).idle_timeout(None).max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(8)
        };

        let pool = pool_opts.connect_with( opts).await?;
        for stmt in SCHEMA {
            sqlx::query( stmt).execute( &pool).await?;
        }
        info!("opened telemetry store {url}");

        Ok( SqliteStore { pool } )
    }

    async fn nearest (&self, flights: &[FlightId], at: DateTime<Utc>, before: bool)->Result<Vec<Sample>> {
        if flights.is_empty() { return Ok(Vec::new()) }

        let (cmp, order) = if before { ("<=", "DESC") } else { (">=", "ASC") };
        let mut qb = QueryBuilder::<Sqlite>::new( format!(
            "SELECT {SAMPLE_COLUMNS} FROM (SELECT {SAMPLE_COLUMNS}, ROW_NUMBER() OVER (PARTITION BY flight_id ORDER BY ts {order}, id ASC) AS rn FROM samples WHERE ts {cmp} "
        ));
        qb.push_bind( at.timestamp_millis());
        qb.push(" AND flight_id IN (");
        push_ids( &mut qb, flights);
        qb.push(")) WHERE rn = 1 ORDER BY flight_id");

        let rows: Vec<SampleRow> = qb.build_query_as().fetch_all( &self.pool).await?;
        convert_all( rows)
    }
}

fn push_ids (qb: &mut QueryBuilder<'_,Sqlite>, ids: &[FlightId]) {
    let mut sep = qb.separated(", ");
    for id in ids {
        sep.push_bind( id.0);
    }
}

#[async_trait]
impl TelemetryStore for SqliteStore {

    async fn find_flight (&self, id: FlightId)->Result<Option<Flight>> {
        let row: Option<FlightRow> = sqlx::query_as( &format!("SELECT {FLIGHT_COLUMNS} FROM flights WHERE id = ?"))
            .bind( id.0)
            .fetch_optional( &self.pool).await?;
        row.map( Flight::try_from).transpose()
    }

    async fn find_flight_by_code (&self, code: &str)->Result<Option<Flight>> {
        let row: Option<FlightRow> = sqlx::query_as( &format!("SELECT {FLIGHT_COLUMNS} FROM flights WHERE code = ?"))
            .bind( code)
            .fetch_optional( &self.pool).await?;
        row.map( Flight::try_from).transpose()
    }

    async fn find_flights (&self, ids: &[FlightId])->Result<Vec<Flight>> {
        if ids.is_empty() { return Ok(Vec::new()) }

        let mut qb = QueryBuilder::<Sqlite>::new( format!("SELECT {FLIGHT_COLUMNS} FROM flights WHERE id IN ("));
        push_ids( &mut qb, ids);
        qb.push(")");

        let rows: Vec<FlightRow> = qb.build_query_as().fetch_all( &self.pool).await?;
        convert_all( rows)
    }

    async fn find_flights_by_code (&self, codes: &[String])->Result<Vec<Flight>> {
        if codes.is_empty() { return Ok(Vec::new()) }

        let mut qb = QueryBuilder::<Sqlite>::new( format!("SELECT {FLIGHT_COLUMNS} FROM flights WHERE code IN ("));
        let mut sep = qb.separated(", ");
        for code in codes {
            sep.push_bind( code.as_str());
        }
        sep.push_unseparated(")");

        let rows: Vec<FlightRow> = qb.build_query_as().fetch_all( &self.pool).await?;
        convert_all( rows)
    }

    async fn list_flights (&self)->Result<Vec<Flight>> {
        let rows: Vec<FlightRow> = sqlx::query_as( &format!("SELECT {FLIGHT_COLUMNS} FROM flights ORDER BY departure_time ASC, id ASC"))
            .fetch_all( &self.pool).await?;
        convert_all( rows)
    }

    async fn insert_flight (&self, flight: NewFlight)->Result<Flight> {
        let created_at = utc_now();
        let res = sqlx::query("INSERT INTO flights (code, departure_lat, departure_lng, destination_lat, destination_lng, departure_time, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)")
            .bind( &flight.code)
            .bind( flight.departure.lat)
            .bind( flight.departure.lng)
            .bind( flight.destination.lat)
            .bind( flight.destination.lng)
            .bind( flight.departure_time.timestamp_millis())
            .bind( created_at.timestamp_millis())
            .execute( &self.pool).await;

        match res {
            Ok(res) => Ok( Flight {
                id: FlightId( res.last_insert_rowid()),
                code: flight.code,
                departure: flight.departure,
                destination: flight.destination,
                departure_time: flight.departure_time,
                created_at
            }),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err( StoreError::DuplicateCode( flight.code)),
            Err(e) => Err( e.into())
        }
    }

    async fn insert_samples (&self, samples: Vec<NewSample>)->Result<InsertOutcome> {
        let mut outcome = InsertOutcome::default();
        if samples.is_empty() { return Ok(outcome) }

        // a failing statement only aborts itself, not the transaction, so rows are independent
        let mut tx = self.pool.begin().await?;
        for (index, s) in samples.into_iter().enumerate() {
            let res = sqlx::query("INSERT INTO samples (flight_id, lat, lng, ts) VALUES (?, ?, ?, ?)")
                .bind( s.flight.0)
                .bind( s.lat)
                .bind( s.lng)
                .bind( s.ts.timestamp_millis())
                .execute( &mut *tx).await;

            match res {
                Ok(res) => {
                    let id = SampleId( res.last_insert_rowid());
                    outcome.inserted.push( s.into_sample( id));
                }
                Err(sqlx::Error::Database(e)) if is_row_violation( e.kind()) => {
                    debug!("sample {index} of flight {} rejected: {e}", s.flight);
                    outcome.failed.push( InsertFailure { index, reason: e.message().to_string() });
                }
                Err(e) => {
                    warn!("sample insert aborted: {e}");
                    tx.rollback().await?;
                    return Err( e.into())
                }
            }
        }
        tx.commit().await?;

        Ok(outcome)
    }

    async fn samples_in_range (&self, range: &SampleRange)->Result<Vec<Sample>> {
        let mut qb = QueryBuilder::<Sqlite>::new( format!("SELECT {SAMPLE_COLUMNS} FROM samples WHERE flight_id = "));
        qb.push_bind( range.flight.0);
        if let Some(from) = range.from {
            qb.push(" AND ts >= ");
            qb.push_bind( from.timestamp_millis());
        }
        if let Some(to) = range.to {
            qb.push(" AND ts <= ");
            qb.push_bind( to.timestamp_millis());
        }
        qb.push( match range.order {
            SortOrder::Ascending => " ORDER BY ts ASC, id ASC LIMIT ",
            SortOrder::Descending => " ORDER BY ts DESC, id DESC LIMIT "
        });
        qb.push_bind( range.limit as i64);

        let rows: Vec<SampleRow> = qb.build_query_as().fetch_all( &self.pool).await?;
        convert_all( rows)
    }

    async fn latest_sample (&self, flight: FlightId, at: DateTime<Utc>)->Result<Option<Sample>> {
        let row: Option<SampleRow> = sqlx::query_as( &format!("SELECT {SAMPLE_COLUMNS} FROM samples WHERE flight_id = ? AND ts <= ? ORDER BY ts DESC, id ASC LIMIT 1"))
            .bind( flight.0)
            .bind( at.timestamp_millis())
            .fetch_optional( &self.pool).await?;
        row.map( Sample::try_from).transpose()
    }

    async fn time_bounds (&self, flights: Option<&[FlightId]>, at: DateTime<Utc>)->Result<Vec<FlightTimeBounds>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT flight_id, MIN(ts) AS min_ts, MAX(ts) AS max_ts FROM samples WHERE ts <= ");
        qb.push_bind( at.timestamp_millis());
        if let Some(ids) = flights {
            if ids.is_empty() { return Ok(Vec::new()) }
            qb.push(" AND flight_id IN (");
            push_ids( &mut qb, ids);
            qb.push(")");
        }
        qb.push(" GROUP BY flight_id ORDER BY flight_id");

        let rows: Vec<BoundsRow> = qb.build_query_as().fetch_all( &self.pool).await?;
        rows.into_iter().map( |r| Ok( FlightTimeBounds {
            flight: FlightId(r.flight_id),
            min: to_datetime( r.min_ts)?,
            max: to_datetime( r.max_ts)?
        })).collect()
    }

    async fn nearest_before (&self, flights: &[FlightId], at: DateTime<Utc>)->Result<Vec<Sample>> {
        self.nearest( flights, at, true).await
    }

    async fn nearest_after (&self, flights: &[FlightId], at: DateTime<Utc>)->Result<Vec<Sample>> {
        self.nearest( flights, at, false).await
    }

    async fn sample_count (&self, flight: Option<FlightId>)->Result<usize> {
        let n: i64 = match flight {
            Some(id) => sqlx::query_scalar("SELECT COUNT(*) FROM samples WHERE flight_id = ?").bind( id.0).fetch_one( &self.pool).await?,
            None => sqlx::query_scalar("SELECT COUNT(*) FROM samples").fetch_one( &self.pool).await?
        };
        Ok( n as usize)
    }

    async fn close (&self) {
        self.pool.close().await;
        info!("telemetry store closed");
    }
}
