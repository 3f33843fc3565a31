// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the fan-out annotator

/// Semantic version number
pub const VERSION_NUMBER: &str = env!("CARGO_PKG_VERSION");

/// Build date
pub const BUILD_DATE: &str = "2026-10-19";

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "sentinel-completion",
    "liveness-poll-completion",
    "bounded-result-channel",
    "explicit-error-results",
    "batched-annotation",
    "content-addressed-model-store",
    "subprocess-annotator",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("fanout-annotator {} ({})", VERSION_NUMBER, BUILD_DATE)
}
