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

use std::fmt;
use serde::{Serialize,Deserialize};

pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;
pub const MIN_LNG: f64 = -180.0;
pub const MAX_LNG: f64 = 180.0;

/// a geodetic position in degrees. Unlike a full WGS84 point this does not normalize its
/// coordinates - out-of-range values are rejected by the ingestion layer instead of being wrapped
#[derive(Debug,Clone,Copy,PartialEq,Serialize,Deserialize)]
pub struct GeoPos {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPos {
    pub fn new (lat: f64, lng: f64)->Self { GeoPos { lat, lng } }

    pub fn is_valid (&self)->bool { is_valid_lat(self.lat) && is_valid_lng(self.lng) }
}

impl fmt::Display for GeoPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.lat, self.lng)
    }
}

// NaN fails both range checks
#[inline] pub fn is_valid_lat (lat: f64)->bool { lat >= MIN_LAT && lat <= MAX_LAT }
#[inline] pub fn is_valid_lng (lng: f64)->bool { lng >= MIN_LNG && lng <= MAX_LNG }

#[inline]
pub fn lerp (a: f64, b: f64, t: f64)->f64 {
    a + (b - a) * t
}

/// linear per-axis interpolation between `a` and `b` at normalized progress `t`.
/// There is no clamping - callers have to keep `t` within [0,1]
#[inline]
pub fn interpolate (a: &GeoPos, b: &GeoPos, t: f64)->GeoPos {
    GeoPos { lat: lerp(a.lat, b.lat, t), lng: lerp(a.lng, b.lng, t) }
}
