use tracing_subscriber::EnvFilter;

/// Environment variable taking precedence over the `--log-level` flag, it
/// accepts full filter directives.
pub const LOG_ENV: &str = "WORKSPACES_SD_LOG";

/// Turn a plain level into filter directives scoped to this crate, anything
/// else is passed through as directives.
pub fn directives(level: &str) -> String {
    match level {
        "off" | "error" | "warn" | "info" | "debug" | "trace" => {
            format!("workspaces_sd={level}")
        }
        other => other.to_string(),
    }
}

pub fn init(color: bool, levels: &str) -> crate::Result<()> {
    let filter = EnvFilter::try_new(levels)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(color)
        .with_target(false)
        .try_init()
}
