//! tcpchat CLI - runs the TCP messaging agents from a terminal.
//!
//! This is the main binary entry point. See the `tcpchat` library for the
//! core functionality.

use std::cell::Cell;
use std::io::BufRead;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;

use tcpchat::constants::TICK_INTERVAL;
use tcpchat::{runner, Agent, ConfigGate, IpConfig, LogView, TcpClientAgent, TcpServerAgent};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Global flag for signal-triggered shutdown (as Arc for signal-hook compatibility)
static SHUTDOWN_FLAG: std::sync::LazyLock<Arc<AtomicBool>> =
    std::sync::LazyLock::new(|| Arc::new(AtomicBool::new(false)));

// CLI
#[derive(Parser)]
#[command(name = "tcpchat")]
#[command(version)]
#[command(about = "Send and receive plain-text messages over TCP")]
struct Cli {
    /// Path to the config file (defaults to TCPCHAT_CONFIG or the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen and print every message received
    Server,
    /// Send one message to the configured server and exit
    Send {
        /// Message text (words are joined with spaces)
        #[arg(required = true)]
        words: Vec<String>,
    },
    /// Run a server and a client together; each stdin line is sent
    Chat,
    /// Write a default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn register_signals() -> Result<()> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::flag;
    flag::register(SIGINT, Arc::clone(&SHUTDOWN_FLAG))?;
    flag::register(SIGTERM, Arc::clone(&SHUTDOWN_FLAG))?;
    flag::register(SIGHUP, Arc::clone(&SHUTDOWN_FLAG))?;
    Ok(())
}

/// Background config load whose failure is fatal to the host loop.
struct ConfigLoad {
    handle: Option<JoinHandle<Result<()>>>,
}

impl ConfigLoad {
    fn spawn(gate: &ConfigGate, path: PathBuf) -> Result<Self> {
        Ok(Self {
            handle: Some(gate.spawn_loader(path)?),
        })
    }

    /// Surface the loader's result once it has finished.
    fn poll(&mut self) -> Result<()> {
        if !self.handle.as_ref().is_some_and(JoinHandle::is_finished) {
            return Ok(());
        }
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(result)) => result,
            Some(Err(_panic)) => Err(anyhow!("Config loader panicked")),
            None => Ok(()),
        }
    }
}

/// Listen and print received messages until a signal arrives.
fn run_server(config_path: PathBuf) -> Result<()> {
    register_signals()?;

    let gate = ConfigGate::new();
    let mut loader = ConfigLoad::spawn(&gate, config_path)?;
    let mut server = TcpServerAgent::new(gate);

    let view = LogView;
    server.subscribe(move |msg| view.print_received(msg));
    view.print_notification("Waiting for incoming messages. Press Ctrl-C to stop.");

    let mut failure = None;
    runner::run_until(&SHUTDOWN_FLAG, TICK_INTERVAL, || {
        if let Err(e) = loader.poll() {
            failure = Some(e);
            return ControlFlow::Break(());
        }
        server.tick();
        ControlFlow::Continue(())
    });

    println!("Shutting down...");
    server.shutdown();
    failure.map_or(Ok(()), Err)
}

/// Send one message and wait for its local echo.
fn run_send(config_path: &Path, text: &str) -> Result<()> {
    register_signals()?;

    let config = IpConfig::load(config_path)?;
    let deadline = Instant::now() + config.client_config().timeout + Duration::from_secs(1);
    let mut client = TcpClientAgent::new(ConfigGate::ready(config)?);

    let view = LogView;
    let delivered = Rc::new(Cell::new(false));
    let flag = Rc::clone(&delivered);
    client.subscribe(move |msg| {
        view.print_sent(msg);
        flag.set(true);
    });

    client.tick();
    if !client.enqueue_message(text) {
        bail!("Message was not accepted for sending");
    }

    runner::run_until(&SHUTDOWN_FLAG, TICK_INTERVAL, || {
        client.tick();
        if delivered.get() || Instant::now() >= deadline {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    client.shutdown();

    if delivered.get() {
        Ok(())
    } else {
        bail!("Message could not be delivered (see log for details)")
    }
}

/// Server and client in one process, fed by stdin.
fn run_chat(config_path: PathBuf) -> Result<()> {
    register_signals()?;

    let gate = ConfigGate::new();
    let mut loader = ConfigLoad::spawn(&gate, config_path)?;
    let mut server = TcpServerAgent::new(gate.clone());
    let mut client = TcpClientAgent::new(gate);

    let view = LogView;
    server.subscribe(move |msg| view.print_received(msg));
    client.subscribe(move |msg| view.print_sent(msg));
    view.print_notification("Welcome! Type a message and press Enter to send it.");

    let (line_tx, line_rx) = mpsc::channel::<String>();
    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn stdin reader")?;

    let mut failure = None;
    runner::run_until(&SHUTDOWN_FLAG, TICK_INTERVAL, || {
        if let Err(e) = loader.poll() {
            failure = Some(e);
            return ControlFlow::Break(());
        }
        loop {
            match line_rx.try_recv() {
                Ok(line) => {
                    client.enqueue_message(line.trim_end());
                }
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => return ControlFlow::Break(()),
            }
        }
        runner::tick_all(&mut [&mut server, &mut client]);
        ControlFlow::Continue(())
    });

    println!("Shutting down...");
    runner::shutdown_all(&mut [&mut server, &mut client]);
    failure.map_or(Ok(()), Err)
}

fn init_config(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "Config file already exists: {} (use --force to overwrite)",
            config_path.display()
        );
    }
    IpConfig::default().save(config_path)?;
    println!("Wrote default config to {}", config_path.display());
    Ok(())
}

fn init_logging() -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();
    if let Ok(path) = std::env::var("TCPCHAT_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    builder.init();
    Ok(())
}

fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(IpConfig::default_path);

    match cli.command {
        Commands::Server => run_server(config_path),
        Commands::Send { words } => run_send(&config_path, &words.join(" ")),
        Commands::Chat => run_chat(config_path),
        Commands::InitConfig { force } => init_config(&config_path, force),
    }
}
