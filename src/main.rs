//! guestrelayd - privileged host-side guest agent relay daemon.
//!
//! Entry point: CLI parsing, logging setup, daemonization, signal handling,
//! and handing off to [`guestrelayd::Daemon`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use guestrelayd::config::CliOverrides;
use guestrelayd::{Config, Daemon};

/// `guestrelayd` CLI surface.
#[derive(Parser, Debug)]
#[command(name = "guestrelayd")]
#[command(version, about = "Relays the host's remote-desktop client to the active guest session", long_about = None)]
struct Args {
    /// Increase log verbosity (repeatable: info, debug, trace)
    #[arg(short = 'd', action = clap::ArgAction::Count)]
    debug: u8,

    /// Virtio serial port device path
    #[arg(short = 's', value_name = "PATH")]
    virtio_port: Option<PathBuf>,

    /// Agent-facing unix stream socket path
    #[arg(short = 'S', value_name = "PATH")]
    agent_socket: Option<PathBuf>,

    /// uinput device path
    #[arg(short = 'u', value_name = "PATH")]
    uinput_device: Option<PathBuf>,

    /// Log what the tablet sink would do instead of issuing real uinput ioctls
    #[arg(short = 'f')]
    fake_uinput: bool,

    /// Stay attached to the controlling terminal instead of daemonizing
    #[arg(short = 'x')]
    foreground: bool,

    /// Exit once the host channel has been up and has closed, instead of reconnecting
    #[arg(short = 'o')]
    one_shot: bool,

    /// Disable session-info integration; fall back to connect/disconnect counting
    #[arg(short = 'X')]
    disable_session_info: bool,
}

static QUIT: AtomicBool = AtomicBool::new(false);

extern "C" fn on_terminating_signal(_: libc::c_int) {
    QUIT.store(true, Ordering::SeqCst);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug)?;

    info!("starting guestrelayd v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::default_config()?.with_overrides(CliOverrides {
        virtio_port_path: args.virtio_port,
        agent_socket_path: args.agent_socket,
        uinput_device_path: args.uinput_device,
        fake_uinput: args.fake_uinput,
        foreground: args.foreground,
        one_shot: args.one_shot,
        disable_session_info: args.disable_session_info,
        debug_level: args.debug,
    });

    if !config.foreground {
        daemonize().context("failed to daemonize")?;
    }
    write_pidfile(&config.pidfile_path).context("failed to write pidfile")?;
    install_signal_handlers().context("failed to install signal handlers")?;

    let pidfile_path = config.pidfile_path.clone();
    let daemon = Daemon::new(config).await.context("failed to initialize daemon")?;
    let result = daemon.run(&QUIT).await;

    let _ = std::fs::remove_file(&pidfile_path);

    if let Err(e) = &result {
        warn!(error = %e, "daemon exited with error");
    }
    result
}

fn init_logging(debug_level: u8) -> Result<()> {
    let log_level = match debug_level {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("guestrelayd={log_level},warn")));

    match std::env::var("GUESTRELAYD_LOG_FORMAT").as_deref() {
        Ok("json") => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        Ok("compact") => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().compact())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

/// Classic double-fork daemonization: detach from the controlling terminal,
/// become session leader, and redirect the standard streams to `/dev/null`.
fn daemonize() -> Result<()> {
    use nix::unistd::{fork, setsid, ForkResult};

    match unsafe { fork() }.context("first fork failed")? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    setsid().context("setsid failed")?;

    match unsafe { fork() }.context("second fork failed")? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    std::env::set_current_dir("/").context("chdir(\"/\") failed")?;
    redirect_stdio_to_dev_null()?;
    Ok(())
}

fn redirect_stdio_to_dev_null() -> Result<()> {
    use std::os::fd::AsRawFd;

    let devnull = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .context("opening /dev/null")?;
    let fd = devnull.as_raw_fd();
    for target in [0, 1, 2] {
        nix::unistd::dup2(fd, target).context("dup2 onto standard stream")?;
    }
    Ok(())
}

fn write_pidfile(path: &std::path::Path) -> Result<()> {
    std::fs::write(path, format!("{}\n", std::process::id())).with_context(|| format!("writing pidfile {path:?}"))
}

/// Install handlers for `SIGINT`/`SIGHUP`/`SIGTERM`/`SIGQUIT` that set
/// [`QUIT`]; the event loop polls it once per iteration rather than racing
/// an async signal stream against every other event source.
fn install_signal_handlers() -> Result<()> {
    use nix::sys::signal::{sigaction, SigAction, SigHandler, SaFlags, SigSet, Signal};

    let action = SigAction::new(SigHandler::Handler(on_terminating_signal), SaFlags::SA_RESTART, SigSet::empty());
    for signal in [Signal::SIGINT, Signal::SIGHUP, Signal::SIGTERM, Signal::SIGQUIT] {
        unsafe { sigaction(signal, &action) }.with_context(|| format!("sigaction({signal:?})"))?;
    }
    Ok(())
}
