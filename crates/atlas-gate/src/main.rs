use std::env;
use std::io::{self, IsTerminal, Write};
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use log::{LevelFilter, debug, info, warn};
use serde::Serialize;
use tokio::net::TcpListener;

use atlas_gate::api::{self, GateState, ProxyState};
use atlas_gate::auth::Role;
use atlas_gate::gate::{Credentials, Gate, Outcome, normalize_path};
use atlas_gate::policy::UnlistedPolicy;
use atlas_gate::settings::{self, APP_NAME, AppConfig};

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn async_serve(ctx: RuntimeContext, cmd: ServeCommand) -> Result<()> {
    handle_serve(&ctx, cmd).await
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging()?;
    debug!("config file: {}", ctx.config_file.display());

    match cli.command {
        Command::Serve(cmd) => async_serve(ctx, cmd),
        Command::Check(cmd) => handle_check(&ctx, cmd),
        Command::Permissions => handle_permissions(&ctx),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "atlas-gate - request-time authorization gateway.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Output machine readable JSON
    #[arg(long, global = true, conflicts_with = "yaml")]
    json: bool,
    /// Output machine readable YAML
    #[arg(long, global = true)]
    yaml: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    no_color: bool,
    /// Control color output (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    color: ColorOption,
    /// Do not change anything on disk
    #[arg(long = "dry-run", global = true)]
    dry_run: bool,
    /// Emit additional diagnostics for troubleshooting
    #[arg(long = "diagnostics", global = true)]
    diagnostics: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorOption {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the gateway
    Serve(ServeCommand),
    /// Evaluate one request offline and print the outcome
    Check(CheckCommand),
    /// List the permission table, public paths and exclusions
    Permissions,
    /// Inspect and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct ServeCommand {
    /// Host address to bind to (overrides server.host)
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on (overrides server.port)
    #[arg(short, long)]
    port: Option<u16>,
    /// Upstream base URL (overrides server.upstream)
    #[arg(long, value_name = "URL")]
    upstream: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct CheckCommand {
    /// Request path
    #[arg(long)]
    path: String,
    /// Access token
    #[arg(long, env = "ATLAS_GATE_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// URL-encoded session state
    #[arg(long)]
    session: Option<String>,
    /// Evaluate at this time (Unix milliseconds) instead of now
    #[arg(long, value_name = "MILLIS")]
    now_ms: Option<i64>,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Output the effective configuration
    Show,
    /// Print the resolved config file path
    Path,
    /// Regenerate the default configuration file
    Reset,
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    config_file: PathBuf,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let config_file = settings::config_file_path(common.config.clone())?;
        if !config_file.exists() && !common.dry_run {
            settings::write_default_config(&config_file)?;
        }
        let config = settings::load(&config_file)?;
        Ok(Self {
            common,
            config_file,
            config,
        })
    }

    fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }

        let level = match self.effective_log_level() {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        };

        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("atlas_gate={level},tower_http={level}"))
        });

        if self.common.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .ok();
        } else {
            let force_color = matches!(self.common.color, ColorOption::Always)
                || env::var_os("FORCE_COLOR").is_some();
            let disable_color = self.common.no_color
                || matches!(self.common.color, ColorOption::Never)
                || env::var_os("NO_COLOR").is_some()
                || (!force_color && !io::stderr().is_terminal());

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(!disable_color)
                        .with_target(self.common.diagnostics)
                        .with_file(self.common.diagnostics)
                        .with_line_number(self.common.diagnostics),
                )
                .try_init()
                .ok();
        }

        // The library logs through `log`. tracing-subscriber's try_init above
        // normally installs the log bridge already, so this only takes effect
        // when that failed.
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
        builder.filter_level(self.effective_log_level());
        builder.try_init().ok();

        Ok(())
    }

    fn effective_log_level(&self) -> LevelFilter {
        if self.common.trace {
            LevelFilter::Trace
        } else if self.common.debug {
            LevelFilter::Debug
        } else {
            match self.common.verbose {
                0 => self
                    .config
                    .logging
                    .level
                    .parse()
                    .unwrap_or(LevelFilter::Info),
                1 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    fn build_gate(&self) -> Result<Gate> {
        let gate = Gate::from_config(&self.config.auth, &self.config.policy)
            .context("invalid auth/policy configuration")?;
        if gate.resolver().unlisted_policy() == UnlistedPolicy::Allow {
            warn!(
                "policy.unlisted_policy = \"allow\": authenticated users of any role may reach paths without a rule"
            );
        }
        if !gate.validator().verifies_signature() {
            info!("token signatures are not verified (auth.verify_secret unset)");
        }
        Ok(gate)
    }

    fn print<T: Serialize + ?Sized>(&self, value: &T) -> Result<bool> {
        if self.common.json {
            println!(
                "{}",
                serde_json::to_string_pretty(value).context("serializing to JSON")?
            );
            Ok(true)
        } else if self.common.yaml {
            println!(
                "{}",
                serde_yaml::to_string(value).context("serializing to YAML")?
            );
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

async fn handle_serve(ctx: &RuntimeContext, cmd: ServeCommand) -> Result<()> {
    let server = &ctx.config.server;
    let host = cmd.host.unwrap_or_else(|| server.host.clone());
    let port = cmd.port.unwrap_or(server.port);
    let upstream = cmd.upstream.unwrap_or_else(|| server.upstream.clone());

    let gate = ctx.build_gate()?;
    let headers = server.security_headers()?;
    let gate_state = GateState::new(gate, ctx.config.auth.clone(), headers);
    let proxy = ProxyState::new(&upstream).context("invalid upstream")?;

    let app = api::create_router(gate_state, api::proxy_router(proxy));

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .context("invalid address")?;

    info!("Listening on http://{addr}, forwarding to {upstream}");

    let listener = TcpListener::bind(addr)
        .await
        .context("binding to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running server")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[derive(Debug, Serialize)]
struct CheckReport {
    path: String,
    excluded: bool,
    outcome: Outcome,
    location: Option<String>,
    reason: Option<&'static str>,
}

fn handle_check(ctx: &RuntimeContext, cmd: CheckCommand) -> Result<()> {
    let gate = ctx.build_gate()?;
    let now_ms = cmd.now_ms.unwrap_or_else(|| Utc::now().timestamp_millis());
    let credentials = Credentials {
        token: cmd.token.as_deref(),
        session: cmd.session.as_deref(),
    };

    let path = normalize_path(&cmd.path)
        .ok_or_else(|| anyhow!("path {:?} does not decode to UTF-8", cmd.path))?;
    let excluded = gate.is_excluded(&path);
    let (outcome, reason) = if excluded {
        (Outcome::Proceed, None)
    } else {
        match gate.authorize(&path, credentials, now_ms) {
            Ok(_) => (Outcome::Proceed, None),
            Err(err) => (Gate::outcome_for(&err, &path), Some(err.code())),
        }
    };

    let report = CheckReport {
        location: gate.location(&outcome),
        path,
        excluded,
        outcome,
        reason,
    };
    if ctx.print(&report)? {
        return Ok(());
    }

    match (&report.location, report.reason) {
        (None, _) if report.excluded => println!("{}: excluded, proceed", report.path),
        (None, _) => println!("{}: proceed", report.path),
        (Some(location), reason) => println!(
            "{}: redirect 307 {} ({})",
            report.path,
            location,
            reason.unwrap_or("denied")
        ),
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct RuleReport {
    prefix: String,
    roles: Vec<Role>,
}

#[derive(Debug, Serialize)]
struct PermissionsReport {
    unlisted_policy: UnlistedPolicy,
    rules: Vec<RuleReport>,
    public_paths: Vec<String>,
    public_prefixes: Vec<String>,
    excluded_prefixes: Vec<String>,
    excluded_extensions: Vec<String>,
}

fn handle_permissions(ctx: &RuntimeContext) -> Result<()> {
    let gate = ctx.build_gate()?;
    let resolver = gate.resolver();
    let matcher = gate.matcher();

    let report = PermissionsReport {
        unlisted_policy: resolver.unlisted_policy(),
        rules: resolver
            .table()
            .iter()
            .map(|rule| RuleReport {
                prefix: rule.prefix().to_string(),
                roles: rule.roles().cloned().collect(),
            })
            .collect(),
        public_paths: resolver
            .public_paths()
            .paths()
            .into_iter()
            .map(str::to_string)
            .collect(),
        public_prefixes: resolver.public_paths().prefixes().to_vec(),
        excluded_prefixes: matcher.excluded_prefixes().to_vec(),
        excluded_extensions: matcher.excluded_extensions().to_vec(),
    };
    if ctx.print(&report)? {
        return Ok(());
    }

    println!(
        "Rules ({}, longest prefix wins):",
        resolver.table().len()
    );
    for rule in &report.rules {
        let roles: Vec<&str> = rule.roles.iter().map(Role::as_str).collect();
        println!("  {:<16} {}", rule.prefix, roles.join(", "));
    }
    println!("Unlisted paths: {:?}", report.unlisted_policy);
    println!("Public paths: {}", report.public_paths.join(" "));
    println!("Public prefixes: {}", report.public_prefixes.join(" "));
    println!("Excluded prefixes: {}", report.excluded_prefixes.join(" "));
    if !report.excluded_extensions.is_empty() {
        println!(
            "Excluded extensions (outside rule prefixes): {}",
            report.excluded_extensions.join(" ")
        );
    }
    Ok(())
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            if !ctx.print(&ctx.config)? {
                println!("{:#?}", ctx.config);
            }
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.config_file.display());
            Ok(())
        }
        ConfigCommand::Reset => {
            if ctx.common.dry_run {
                info!(
                    "dry-run: would reset config at {}",
                    ctx.config_file.display()
                );
                return Ok(());
            }
            settings::write_default_config(&ctx.config_file)
        }
    }
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}
