//! Wires up both logging stacks this workspace carries: `tracing` for the engine's
//! span-scoped diagnostics (one span per contig flush) and `log`/`log4rs` for everything
//! that only reaches the plain `log` facade (region loading warnings, third-party crates).

use std::path::Path;

use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::json::JsonEncoder;
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes logging for the `bamcoverage` binary. When `log_filepath` is given,
/// diagnostics are mirrored there (as JSON) in addition to stderr.
pub fn init_logging(log_filepath: Option<&Path>) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(env_filter).with_target(false);

    match log_filepath {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "bamcoverage.log".to_string());
            let appender = tracing_appender::rolling::never(
                dir.unwrap_or_else(|| Path::new(".")),
                file_name,
            );
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            // Intentionally leaked: the guard must outlive every tracing event for the
            // remainder of the process, and this is a one-shot CLI initialization.
            Box::leak(Box::new(guard));
            builder.json().with_writer(non_blocking).init();
        }
        None => {
            builder.init();
        }
    }

    bridge_log_crate(log_filepath);
}

/// Routes the plain `log` facade (used for non-fatal `BadRegion` warnings) into log4rs so
/// those diagnostics land in the same place as the `tracing` output.
fn bridge_log_crate(log_filepath: Option<&Path>) {
    let console = ConsoleAppender::builder().build();
    let mut config = Config::builder().appender(Appender::builder().build("stderr", Box::new(console)));
    let mut root = Root::builder().appender("stderr");

    if let Some(path) = log_filepath {
        if let Ok(file) = FileAppender::builder()
            .encoder(Box::new(JsonEncoder::new()))
            .build(path)
        {
            config = config.appender(Appender::builder().build("file", Box::new(file)));
            root = root.appender("file");
        }
    }

    if let Ok(config) = config.build(root.build(log::LevelFilter::Info)) {
        let _ = log4rs::init_config(config);
    }
}
