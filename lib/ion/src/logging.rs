pub use slog::{crit, debug, error, info, o, trace, warn, Discard, Drain, Logger};

use sloggers::{Config, LoggerConfig};

/// Builds the root terminal logger used by the server and client executables.
/// Components receive children of this logger, or `Discard` when constructed
/// without one.
pub fn init() -> Logger {
    let config: LoggerConfig = serdeconv::from_toml_str(
        r#"
type = "terminal"
level = "debug"
destination = "stderr"
"#,
    )
    .expect("Error parsing logging config");

    config.build_logger().expect("Error building logger")
}
