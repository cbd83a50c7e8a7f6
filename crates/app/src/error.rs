// Copyright 2025 svckit contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AppError {
    #[snafu(display("Failed to load configuration: {source}"))]
    Config { source: config::ConfigError },

    #[snafu(display("Queue '{name}' failed: {source}"))]
    Queue {
        name:   String,
        source: svckit_queue::QueueError,
    },

    #[snafu(display("Metrics error: {source}"))]
    Metrics { source: prometheus::Error },
}

pub type Result<T> = std::result::Result<T, AppError>;
