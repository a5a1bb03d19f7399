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

//! small, dependency-light building blocks shared by all skytrack crates: time stamps and
//! their wire formats, geographic positions and the interpolator used by the flight simulation

pub mod datetime;
pub mod geo;

// a global fn that can be used with serde(skip_serializing_if="skytrack_common::is_none")
#[inline] pub fn is_none<T> (opt: &Option<T>)->bool { opt.is_none() }

/// split a comma separated list, trimming elements and dropping empty ones.
/// This is how multi-valued query parameters (e.g. `flightIds=1,2, 3`) are passed in
pub fn split_list (s: &str)->Vec<&str> {
    s.split(',').map(|e| e.trim()).filter(|e| !e.is_empty()).collect()
}
