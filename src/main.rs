use clap::Parser;
use std::path::Path;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vigil::cli::Cli;
use vigil::config::{AppConfig, LoggingConfig};

#[tokio::main]
async fn main() {
    // Secrets may live in .env; a missing file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    if cli.command.is_one_shot() {
        init_logging_simple();
    } else {
        // Logging settings come from the same layered config as everything else
        let logging = AppConfig::load_from(&cli.config_dir)
            .map(|c| c.logging)
            .unwrap_or_default();
        init_logging(&logging);
    }

    if let Err(e) = cli.run(shutdown_signal()).await {
        error!("{}", e);
        eprintln!("\x1b[31m✗ {}\x1b[0m", e);
        std::process::exit(e.exit_code());
    }
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::Layer;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},vigil=debug", logging.level)));

    // `tracing_appender::rolling::daily` panics if it can't create the
    // initial log file, so preflight writability.
    let log_dir = logging.dir.as_path();
    let file_writer = if log_dir_writable(log_dir) {
        let file_appender = tracing_appender::rolling::daily(log_dir, "vigil.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // Keep the guard alive by leaking it (acceptable for long-running process)
        Box::leak(Box::new(guard));
        Some(non_blocking)
    } else {
        None
    };
    let file_logging_enabled = file_writer.is_some();

    let (console_layer, file_layer) = if logging.json {
        (
            tracing_subscriber::fmt::layer().json().with_target(true).boxed(),
            file_writer.map(|w| {
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(w)
                    .with_target(true)
                    .boxed()
            }),
        )
    } else {
        (
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .boxed(),
            file_writer.map(|w| {
                tracing_subscriber::fmt::layer()
                    .with_writer(w)
                    .with_ansi(false) // No color codes in file
                    .with_target(true)
                    .boxed()
            }),
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if file_logging_enabled {
        eprintln!("Logging to: {}/vigil.log", log_dir.display());
    }
}

fn log_dir_writable(log_dir: &Path) -> bool {
    if let Err(e) = std::fs::create_dir_all(log_dir) {
        eprintln!(
            "Warning: Could not create log directory {} ({}), file logging disabled",
            log_dir.display(),
            e
        );
        return false;
    }

    let test_path = log_dir.join(".vigil_write_test");
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&test_path)
    {
        Ok(_) => {
            let _ = std::fs::remove_file(&test_path);
            true
        }
        Err(e) => {
            eprintln!(
                "Warning: Could not write to log directory {} ({}), file logging disabled",
                log_dir.display(),
                e
            );
            false
        }
    }
}

fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
