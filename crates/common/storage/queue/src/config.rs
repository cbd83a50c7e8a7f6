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

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::ensure;

use crate::{Result, error::InvalidConfigSnafu};

/// Where a queue lives and how large its pages are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct QueueConfig {
    /// Queue name; prefixes every file the queue owns.
    #[default = "queue"]
    pub name:               String,
    /// Directory exclusively owned by this queue instance.
    #[default(_code = "PathBuf::from(\"./queue_data\")")]
    pub working_dir:        PathBuf,
    /// Items per page before the back page is spilled to disk.
    #[default = 1000]
    pub max_items_per_page: usize,
}

impl QueueConfig {
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        ensure!(
            self.max_items_per_page > 0,
            InvalidConfigSnafu {
                reason: "max_items_per_page must be at least 1",
            }
        );
        Ok(())
    }
}

/// Queue names become file name prefixes, so they must be a single path
/// component.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    ensure!(
        !name.is_empty(),
        InvalidConfigSnafu {
            reason: "queue name is empty",
        }
    );
    ensure!(
        name != "." && name != "..",
        InvalidConfigSnafu {
            reason: format!("queue name {name:?} is reserved"),
        }
    );
    ensure!(
        !name
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_whitespace() || c.is_control()),
        InvalidConfigSnafu {
            reason: format!("queue name {name:?} contains a separator or whitespace"),
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.name, "queue");
        assert_eq!(config.working_dir, PathBuf::from("./queue_data"));
        assert_eq!(config.max_items_per_page, 1000);
        assert!(config.validate().is_ok());
    }

    #[test_case("", 10 ; "empty name")]
    #[test_case("..", 10 ; "parent dir")]
    #[test_case("a/b", 10 ; "path separator")]
    #[test_case("a b", 10 ; "whitespace")]
    #[test_case("ok", 0 ; "zero page size")]
    fn test_invalid_config(name: &str, max_items_per_page: usize) {
        let config = QueueConfig {
            name: name.to_string(),
            max_items_per_page,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: QueueConfig =
            serde_json::from_str(r#"{"name":"outbound","max_items_per_page":50}"#).unwrap();
        assert_eq!(config.name, "outbound");
        assert_eq!(config.max_items_per_page, 50);
        assert_eq!(config.working_dir, PathBuf::from("./queue_data"));
    }
}
