/// The configuration file looked up in the workspace root.
pub const CONFIGURATION_FILE: &str = "uref.toml";

/// Prefix for environment overrides: `UNITY_SCANNER_<SECTION>_<KEY>`.
pub const ENVIRONMENT_PREFIX: &str = "UNITY_SCANNER";

/// Environment variable controlling log filtering.
pub const LOG_FILTER_VARIABLE: &str = "UREF_LOG";
