use clap::ColorChoice;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber.
///
/// The default level can be overridden through the given environment
/// variable (standard `EnvFilter` syntax).
pub fn initialize_logger(default_level: LevelFilter, environment_variable: &str, color_choice: ColorChoice) {
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var(environment_variable)
        .from_env_lossy();

    let use_ansi = match color_choice {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::IsTerminal::is_terminal(&std::io::stderr()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(use_ansi)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
