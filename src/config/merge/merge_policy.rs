//! Merge rules: defaults, override order, conflict handling.
//!
//! Later sources replace scalar keys and merge tables key by key; arrays such as
//! `generators` are replaced wholesale by the highest source that sets them.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment};

/// Prefix for `TILEBOARD__SECTION__KEY` overrides
pub const ENV_PREFIX: &str = "TILEBOARD";
/// Separator between prefix, section and key
pub const ENV_SEPARATOR: &str = "__";

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("routing.preferred", "openai")?
        .set_default("routing.alternate", "anthropic")?
        .set_default("retry.attempts_per_provider", 2)?
        .set_default("retry.backoff_base_ms", 1000)?
        .set_default("retry.backoff_multiplier", 2.0)?
        .set_default("circuit.failure_threshold", 5)?
        .set_default("circuit.persistent", true)?
        .set_default("storage.path", ".tileboard/state")?
        .set_default("storage.record_attempts", true)
}

/// Environment overrides, applied last.
pub fn environment_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}
