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

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize,Serializer,Deserializer};
use std::time::Duration;
use parse_duration::parse;

/// this should be used wherever we might have to use sim clock instead of wall clock.
/// Note the result is truncated to milliseconds since that is what we store and broadcast
#[inline]
pub fn utc_now()->DateTime<Utc> {
    trunc_millis( Utc::now())
}

pub fn from_epoch_millis (millis: i64)->Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
}

/// drop sub-millisecond precision
pub fn trunc_millis (dt: DateTime<Utc>)->DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis( dt.timestamp_millis()).unwrap_or(dt)
}

/// the ISO-8601 format we use on the wire, e.g. "2025-10-26T09:30:00.000Z"
pub fn to_iso_millis (dt: &DateTime<Utc>)->String {
    dt.to_rfc3339_opts( SecondsFormat::Millis, true)
}

//--- misc string format parsing

/// parse an ISO-8601 date/time spec into a UTC DateTime (truncated to millis).
/// We accept full RFC 3339 ("2025-10-26T09:30:00+02:00"), zone-less date-times (interpreted
/// as UTC) and plain dates (midnight UTC)
pub fn parse_datetime (s: &str)->Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() { return None }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some( trunc_millis( dt.to_utc()))
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some( trunc_millis( ndt.and_utc()))
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
        .and_then( |nd| nd.and_hms_opt(0, 0, 0))
        .map( |ndt| ndt.and_utc())
}

/// parse an optional spec, using `f` if there is none.
/// Returns None if there is a spec but it is not a valid date/time
pub fn parse_optional_datetime_or<F> (spec: Option<&str>, f: F)->Option<DateTime<Utc>> where F: FnOnce()->DateTime<Utc> {
    match spec {
        Some(s) => parse_datetime(s),
        None => Some(f())
    }
}

//--- support for serde

pub fn ser_iso_millis<S: Serializer> (dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error>  {
    s.serialize_str( &to_iso_millis(dt))
}

/// NOTE - this serializes None as null. Add #[serde(skip_serializing_if="skytrack_common::is_none")] to omit
pub fn ser_iso_millis_option<S: Serializer> (opt: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error>  {
    match opt {
        Some(dt) => s.serialize_str( &to_iso_millis(dt)),
        None => s.serialize_none()
    }
}

pub fn ser_epoch_millis<S: Serializer> (dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error>  {
    s.serialize_i64(dt.timestamp_millis())
}

pub fn deserialize_duration <'a,D>(deserializer: D) -> Result<Duration,D::Error>
    where D: Deserializer<'a>
{
    String::deserialize(deserializer).and_then( |string| {
        parse(string.as_str())
            .map_err( |e| serde::de::Error::custom(format!("{:?}",e)))
    })
}

pub fn serialize_duration<S: Serializer> (dur: &Duration, s: S) -> Result<S::Ok, S::Error>  {
    let dfm = format!("{:?}", dur);
    s.serialize_str(&dfm)
}
