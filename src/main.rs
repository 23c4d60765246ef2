//! Caldera command line tool
//!
//! Assembles the proxy options (defaults, optional JSON file, command line
//! and environment) and runs the proxy until Ctrl+C.

use std::future::Future;
use std::io;
use std::path::PathBuf;

use clap::Parser;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use caldera::common::{init_logger, tap_catch, Result};
use caldera::config::{
    log_config, PortOptions, ProxyOptions, CERT_PATH_STR, HOSTNAME_STR, KEY_PATH_STR, LOG_LEVEL_STR, TIMEOUT_MS,
};
use caldera::{APP_NAME, VERSION};

/// Caldera: an authenticating HTTP/HTTPS CONNECT tunnel proxy
///
/// Every option can also be given as a `CALDERA_*` environment variable.
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Credential store: a JSON file path, or inline JSON starting with `{`
    #[clap(long, env = "CALDERA_AUTH")]
    auth: Option<String>,

    /// Plaintext listener port; 0 or absent disables it
    #[clap(long = "port.http", env = "CALDERA_PORT_HTTP")]
    port_http: Option<i64>,

    /// TLS listener port; 0 or absent disables it
    #[clap(long = "port.https", env = "CALDERA_PORT_HTTPS")]
    port_https: Option<i64>,

    /// Upstream connect timeout in milliseconds, 0 for unbounded [default: 500]
    #[clap(long, env = "CALDERA_TIMEOUT")]
    timeout: Option<u64>,

    /// PEM certificate chain for the TLS listener [default: server.crt]
    #[clap(long, env = "CALDERA_CRT")]
    crt: Option<PathBuf>,

    /// PEM private key for the TLS listener [default: server.key]
    #[clap(long, env = "CALDERA_KEY")]
    key: Option<PathBuf>,

    /// Address the listeners bind to [default: 0.0.0.0]
    #[clap(long, env = "CALDERA_HOSTNAME")]
    hostname: Option<String>,

    /// Load options from a JSON file; command line and environment win
    #[clap(long, env = "CALDERA_CONFIG")]
    config: Option<PathBuf>,

    /// Log level
    #[clap(long, env = "CALDERA_LOG_LEVEL", default_value = LOG_LEVEL_STR)]
    log_level: String,
}

impl Args {
    /// Options given on the command line or through the environment
    fn options(&self) -> ProxyOptions {
        ProxyOptions {
            auth: self.auth.clone(),
            hostname: self.hostname.clone(),
            port: PortOptions {
                http: self.port_http,
                https: self.port_https,
            },
            timeout: self.timeout,
            crt: self.crt.clone(),
            key: self.key.clone(),
        }
    }
}

fn default_options() -> ProxyOptions {
    ProxyOptions {
        hostname: Some(HOSTNAME_STR.to_string()),
        timeout: Some(TIMEOUT_MS),
        crt: Some(CERT_PATH_STR.into()),
        key: Some(KEY_PATH_STR.into()),
        ..Default::default()
    }
}

/// Cancel `shutdown` once `signal` fires
///
/// A signal handler that cannot be installed leaves the proxy running.
async fn cancel_on_signal<F>(signal: F, shutdown: CancellationToken)
where
    F: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down");
            shutdown.cancel();
        }
        Err(e) => warn!("Unable to listen for Ctrl+C, stop the process another way: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logger(&args.log_level);

    info!("Starting {} v{}", APP_NAME, VERSION);

    let mut opts = default_options();
    if let Some(ref path) = args.config {
        info!("Loading configuration from file: {}", path.display());
        opts = opts.merge(ProxyOptions::from_file(path).map_err(tap_catch)?);
    }
    let opts = opts.merge(args.options());

    log_config(&opts);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), signal));

    info!("Proxy service ready, press Ctrl+C to stop");
    caldera::run(&opts, shutdown).await.map_err(tap_catch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signal_cancels_shutdown() {
        let shutdown = CancellationToken::new();
        cancel_on_signal(async { Ok(()) }, shutdown.clone()).await;
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_failed_signal_handler_keeps_running() {
        let shutdown = CancellationToken::new();
        let failed = async { Err(io::Error::new(io::ErrorKind::Other, "no signal handler")) };
        cancel_on_signal(failed, shutdown.clone()).await;
        assert!(!shutdown.is_cancelled());
    }

    #[test]
    fn test_command_line_wins_over_defaults() {
        let args = Args::parse_from(["caldera", "--port.http", "8080", "--timeout", "0"]);
        let opts = default_options().merge(args.options());

        assert_eq!(opts.port.http, Some(8080));
        assert_eq!(opts.port.https, None);
        assert_eq!(opts.timeout, Some(0));
        assert_eq!(opts.crt, Some(PathBuf::from(CERT_PATH_STR)));
    }
}
