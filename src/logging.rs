use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt, prelude::*};

use crate::config::{Config, data_dir};
use crate::constants::constants;

/// Level directive from `-v` count, falling back to the config file, then `warn`.
pub fn level_for(verbose: u8, config: &Config) -> String {
  match verbose {
    0 => config.log_level.clone().unwrap_or_else(|| "warn".to_string()),
    1 => "info".to_string(),
    2 => "debug".to_string(),
    _ => "trace".to_string(),
  }
}

/// Log to `imgsearch.log` in the data dir, with warnings echoed to stderr.
/// `RUST_LOG` overrides the computed level. Keep the guard alive until exit
/// so buffered lines are flushed.
pub fn init(verbose: u8, config: &Config) -> Option<WorkerGuard> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_for(verbose, config)));

  let dir = data_dir();
  let (file_layer, guard) = match std::fs::create_dir_all(&dir) {
    Ok(()) => {
      let appender = tracing_appender::rolling::never(&dir, &constants().log_file_name);
      let (writer, guard) = tracing_appender::non_blocking(appender);
      (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
    }
    Err(_) => (None, None),
  };

  let _ = tracing_subscriber::registry()
    .with(filter)
    .with(file_layer)
    .with(fmt::layer().with_writer(std::io::stderr).with_target(false).with_filter(LevelFilter::WARN))
    .try_init();
  guard
}
