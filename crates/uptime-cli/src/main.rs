mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::{fmt, EnvFilter};

use uptime_core::{
    notification_channel, validate_spec, EmailDispatcher, EngineConfig, EventKind, Mailer,
    MonitorSpec, ProbeRegistry, Scheduler, SmtpMailer,
};

fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");

    if GIT_HASH.is_empty() {
        // Leak is fine — called once, lives for the program's lifetime.
        Box::leak(VERSION.to_string().into_boxed_str())
    } else {
        Box::leak(format!("{VERSION} ({GIT_HASH})").into_boxed_str())
    }
}

/// Service uptime monitor — probe HTTP and TCP targets and alert on outages.
#[derive(Parser)]
#[command(name = "uptime-monitor", version = version_string(), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the monitoring engine and HTTP API server.
    Serve {
        /// Listen address (e.g. 0.0.0.0:8080). Overrides config file.
        #[arg(short, long)]
        listen: Option<SocketAddr>,

        /// Path to TOML config file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Monitor a single target from the command line (no API server).
    Watch {
        /// Target URL (http(s)://... or host:port for TCP).
        url: String,

        /// Monitor type: HTTP, POST or TCP.
        #[arg(long = "type", value_name = "TYPE", default_value = "HTTP")]
        monitor_type: String,

        /// Probe interval in seconds.
        #[arg(long, default_value_t = 10)]
        interval: u64,

        /// Probe timeout in seconds.
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { listen, config } => {
            run_serve(listen, config).await;
        }
        Commands::Watch {
            url,
            monitor_type,
            interval,
            timeout,
        } => {
            fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
                )
                .init();
            run_watch(url, monitor_type, interval, timeout).await;
        }
    }
}

async fn run_serve(listen_override: Option<SocketAddr>, config_path: Option<PathBuf>) {
    let app_config = if let Some(ref path) = config_path {
        match config::AppConfig::load(path) {
            Ok(c) => {
                init_tracing(&c.server.log_format);
                tracing::info!(path = %path.display(), "Loaded config file");
                Some(c)
            }
            Err(e) => {
                init_tracing("pretty");
                tracing::error!("{}", e);
                std::process::exit(1);
            }
        }
    } else {
        init_tracing("pretty");
        None
    };

    let listen = listen_override
        .or(app_config.as_ref().map(|c| c.server.listen))
        .unwrap_or_else(|| "0.0.0.0:8080".parse().unwrap());

    let engine_config = app_config
        .as_ref()
        .map(|c| c.defaults.to_engine_config())
        .unwrap_or_default();

    let (notification_tx, notification_rx) = notification_channel();

    let dispatcher_handle = match app_config.as_ref().and_then(|c| c.smtp.as_ref()) {
        Some(smtp_section) => {
            // Port and notify_on were validated at load time.
            let smtp_config = match smtp_section.to_smtp_config() {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!("{}", e);
                    std::process::exit(1);
                }
            };
            let mailer = match SmtpMailer::new(&smtp_config) {
                Ok(m) => Arc::new(m) as Arc<dyn Mailer>,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to set up SMTP transport");
                    std::process::exit(1);
                }
            };
            // Validated at load time; fall back to the stock set if absent.
            let notify_on = app_config
                .as_ref()
                .and_then(|c| c.defaults.notify_on_kinds().ok())
                .unwrap_or_else(|| vec![EventKind::OutageStarted, EventKind::Recovered]);
            let dispatcher =
                EmailDispatcher::new(notification_rx, mailer).with_notify_on(notify_on);
            tracing::info!(host = %smtp_config.host, "Email dispatcher started");
            tokio::spawn(dispatcher.run())
        }
        None => {
            // No SMTP configured: drain the channel so senders never stall.
            tokio::spawn(async move {
                let mut rx = notification_rx;
                while rx.recv().await.is_some() {}
            })
        }
    };

    let client = uptime_core::probe::build_client(engine_config.probe_timeout);
    let registry = Arc::new(ProbeRegistry::with_defaults(client));
    let scheduler = Arc::new(Scheduler::new(
        engine_config,
        registry,
        Some(notification_tx.clone()),
    ));

    if let Some(ref app_config) = app_config {
        for spec in &app_config.monitor {
            if let Err(e) = scheduler.register(spec.clone()) {
                tracing::error!(monitor = %spec.name, error = %e, "Failed to start monitor");
                continue;
            }
        }
        tracing::info!(count = scheduler.len(), "Monitors started from config");
    }

    let state = uptime_api::state::AppState::new(Arc::clone(&scheduler));

    tracing::info!(%listen, "Starting uptime monitor API server");
    if let Err(e) = uptime_api::serve_with_state(listen, state, uptime_api::shutdown_signal()).await
    {
        tracing::error!(error = %e, "Server failed");
        std::process::exit(1);
    }

    tracing::info!("Shutdown signal received, stopping monitors...");
    scheduler.stop().await;

    drop(notification_tx);

    match tokio::time::timeout(std::time::Duration::from_secs(5), dispatcher_handle).await {
        Ok(_) => tracing::info!("Email dispatcher shut down"),
        Err(_) => tracing::warn!("Email dispatcher did not shut down in time, aborting"),
    }

    tracing::info!("Shutdown complete");
}

async fn run_watch(url: String, monitor_type: String, interval: u64, timeout: u64) {
    let spec = MonitorSpec {
        name: "target".to_string(),
        monitor_type,
        url: url.clone(),
        interval_seconds: interval,
        headers: None,
        payload: None,
        notify_emails: None,
    };

    if let Err(e) = validate_spec(1, &spec) {
        eprintln!("{} {}", style("error:").red().bold(), e);
        std::process::exit(1);
    }

    let engine_config = EngineConfig::default()
        .with_probe_timeout(std::time::Duration::from_secs(timeout))
        .with_reminder_every(1);

    let client = uptime_core::probe::build_client(engine_config.probe_timeout);
    let registry = Arc::new(ProbeRegistry::with_defaults(client));
    let (notification_tx, mut notification_rx) = notification_channel();
    let scheduler = Scheduler::new(engine_config, registry, Some(notification_tx));

    let multi = MultiProgress::new();
    let msg_style = ProgressStyle::with_template("{wide_msg}").expect("valid template");

    multi
        .println(format!(
            "{} {}",
            style("uptime-monitor").bold(),
            style(env!("CARGO_PKG_VERSION")).dim()
        ))
        .ok();
    multi
        .println(format!(
            "  {} {}",
            style("url:     ").dim(),
            style(&url).bold()
        ))
        .ok();
    multi
        .println(format!(
            "  {} {}",
            style("type:    ").dim(),
            spec.monitor_type
        ))
        .ok();
    multi
        .println(format!("  {} {}s", style("interval:").dim(), interval))
        .ok();
    multi
        .println(format!("  {} {}s", style("timeout: ").dim(), timeout))
        .ok();
    multi.println("").ok();
    multi
        .println(format!("{}", style("Press Ctrl+C to stop").dim()))
        .ok();
    multi.println("").ok();

    if let Err(e) = scheduler.register(spec) {
        eprintln!("{} {}", style("error:").red().bold(), e);
        std::process::exit(1);
    }

    let status_bar = multi.add(ProgressBar::new_spinner().with_style(msg_style));
    status_bar.set_message(format!(
        "  {}",
        style("Waiting for first probe...").dim()
    ));

    let shutdown = uptime_api::shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {}
            notification = notification_rx.recv() => {
                if let Some(n) = notification {
                    let ev = &n.event;
                    let ts = ev.occurred_at.format("%H:%M:%S");
                    let kind_str = format!("{:<18}", ev.kind.to_string());
                    let colored_kind = match ev.kind {
                        EventKind::OutageStarted => style(kind_str).red().bold(),
                        EventKind::OutageContinuing => style(kind_str).yellow(),
                        EventKind::Recovered => style(kind_str).green().bold(),
                    };
                    multi
                        .println(format!(
                            "  {}  {} {}",
                            style(ts).dim(),
                            colored_kind,
                            ev.error_detail.as_deref().unwrap_or(""),
                        ))
                        .ok();
                }
            }
            _ = &mut shutdown => {
                status_bar.finish_and_clear();
                multi.println(format!("\n{}", style("Monitor stopped.").dim())).ok();
                scheduler.stop().await;
                return;
            }
        }

        if let Some(status) = scheduler.status("target") {
            let badge = match status.status {
                uptime_core::HealthStatus::Healthy => style("UP  ").green().bold(),
                uptime_core::HealthStatus::Outage => style("DOWN").red().bold(),
                uptime_core::HealthStatus::OngoingOutage => style("DOWN").red().bold(),
            };
            let latency = status
                .latency_ms
                .map(|l| format!("{l}ms"))
                .unwrap_or_else(|| "-".to_string());
            let checked = status
                .last_checked
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "never".to_string());
            status_bar.set_message(format!(
                "  {}  latency={:<8} failures={:<4} last check {}",
                badge, latency, status.consecutive_failures, checked
            ));
        }
    }
}

fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format {
        "json" => {
            fmt().with_env_filter(filter).json().init();
        }
        _ => {
            fmt().with_env_filter(filter).init();
        }
    }
}
