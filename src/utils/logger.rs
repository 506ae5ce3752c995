use env_logger::{Builder, Env};
use std::io::Write;

/// Initialise `env_logger`. `RUST_LOG` always wins over the verbosity flag.
pub fn init(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };

    Builder::from_env(Env::default().default_filter_or(default_filter))
        .format(|buf, record| {
            let level = record.level();
            let style = buf.default_level_style(level);
            writeln!(buf, "{style}{:<5}{style:#} {}", level, record.args())
        })
        .init();
}
