// Copyright 2022 Zinc Labs Inc. and Contributors
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

use std::sync::Arc;

use aggregator::exposition::CONTENT_TYPE;
use axum::{extract::State, http::header, response::IntoResponse};

use crate::AppState;

/// Serves one freshly aggregated snapshot followed by our own metrics.
///
/// Always answers 200; upstream trouble shows up as missing series.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = state.aggregator.scrape().await;
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], body)
}
