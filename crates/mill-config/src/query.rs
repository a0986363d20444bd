//! Pagination defaults for list operations.

use serde::{Deserialize, Serialize};

const fn default_limit() -> u32 {
    10
}

const fn default_max_limit() -> u32 {
    100
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    /// Page size used when a caller does not pass `limit`.
    #[serde(default = "default_limit")]
    pub default_limit: u32,

    /// Largest page size a caller may request.
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_correct() {
        let config = QueryConfig::default();
        assert_eq!(config.default_limit, 10);
        assert_eq!(config.max_limit, 100);
    }
}
