// Copyright 2025 Dustin McAfee
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Links libjpeg-turbo when the `turbojpeg` feature is on.
//!
//! `TURBOJPEG_LIB_DIR` overrides the search path; otherwise the usual
//! Homebrew prefixes are tried on macOS and the system paths elsewhere.

use std::env;
use std::path::Path;

/// Homebrew install locations (Apple Silicon first, then Intel).
const HOMEBREW_LIB_DIRS: [&str; 2] = [
    "/opt/homebrew/opt/jpeg-turbo/lib",
    "/usr/local/opt/jpeg-turbo/lib",
];

fn main() {
    println!("cargo:rerun-if-env-changed=TURBOJPEG_LIB_DIR");
    if env::var_os("CARGO_FEATURE_TURBOJPEG").is_none() {
        return;
    }

    let search_dir = env::var("TURBOJPEG_LIB_DIR").ok().or_else(|| {
        let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
        if target_os != "macos" {
            return None;
        }
        HOMEBREW_LIB_DIRS
            .iter()
            .find(|dir| Path::new(dir).exists())
            .map(|dir| (*dir).to_string())
    });

    if let Some(dir) = search_dir {
        println!("cargo:rustc-link-search=native={dir}");
    }
    println!("cargo:rustc-link-lib=turbojpeg");
}
