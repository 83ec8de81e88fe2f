//! Composition root: turns parsed arguments into a download batch and runs it.

use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cdownloader_core::user_agent::preset_names;
use cdownloader_core::{
    ClientOptions, DownloadEngine, HttpClient, MemoryWatchdog, ProgressLayout,
    ProgressRegistry, SystemMemory, TaskOptions, UserAgentChoice, resolve_user_agent,
};
use tracing::{debug, info, warn};

use crate::ProcessExit;
use crate::app::prompt::TerminalPrompt;
use crate::app::{exit_handler, input_processor, terminal};
use crate::cli::Args;

/// Time given to cancel a run whose `--user-agent` looks like a misspelt preset.
const MISTYPED_PRESET_GRACE: Duration = Duration::from_secs(3);

pub(crate) async fn run_cdl(args: Args) -> Result<ProcessExit> {
    let live_progress = terminal::should_use_live_progress(
        io::stderr().is_terminal(),
        args.quiet,
        terminal::is_dumb_terminal(),
    );
    let registry = Arc::new(if live_progress {
        ProgressRegistry::stderr(ProgressLayout::for_width(terminal::terminal_width()))
    } else {
        ProgressRegistry::hidden()
    });
    terminal::init_tracing(
        terminal::default_level(args.quiet, args.verbose),
        terminal::no_color_env_requested() || terminal::is_dumb_terminal(),
        registry.multi(),
    );
    debug!(
        urls = args.urls.len(),
        output_directory = %args.output_directory.display(),
        buffer = args.buffer,
        live_progress,
        "CLI arguments parsed"
    );

    let requests = input_processor::process_input(&args)?;
    let cookie_header = input_processor::load_cookie_header(args.cookies.as_deref())?;

    let choice = resolve_user_agent(&args.user_agent);
    match &choice {
        UserAgentChoice::Preset { name, .. } => info!(preset = *name, "using user agent preset"),
        UserAgentChoice::Custom { user_agent } if choice.looks_like_mistyped_preset() => {
            warn!(
                user_agent = %user_agent,
                presets = %preset_names().join(", "),
                "user agent looks like a preset name that does not exist; \
                 press Ctrl-C within 3 seconds to cancel"
            );
            if interrupted_within(MISTYPED_PRESET_GRACE).await {
                warn!("cancelled before any download started");
                return Ok(ProcessExit::Interrupted);
            }
        }
        UserAgentChoice::Custom { user_agent } => {
            info!(user_agent = %user_agent, "using custom user agent");
        }
    }

    if args.buffer {
        warn!("downloads are held in memory until complete; if interrupted, data will be lost");
    }

    let client = HttpClient::new(ClientOptions {
        user_agent: choice.user_agent().to_string(),
        connect_timeout: seconds(args.connect_timeout, "--connect-timeout")?,
        read_timeout: seconds(args.read_timeout, "--read-timeout")?,
        follow_redirects: !args.ignore_redirects,
        cookie_header,
    })
    .context("failed to build HTTP client")?;

    let options = TaskOptions {
        buffered: args.buffer,
        chunk_size: args.chunk_size,
        probe_with_head: !args.no_head_probe,
    };
    let engine = DownloadEngine::new(
        client,
        Arc::clone(&registry),
        Arc::new(TerminalPrompt),
        options,
    )
    .with_memory_watchdog(
        MemoryWatchdog::from_gib(args.ram_warning_at),
        Arc::new(SystemMemory::default()),
    );

    let report = engine.run(requests, interrupt_signal()).await;
    Ok(exit_handler::determine_exit_outcome(&report))
}

fn seconds(value: f64, flag: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("{flag} {value} is out of range"))
}

/// Resolves on Ctrl-C. Never resolves when the signal cannot be watched.
async fn interrupt_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "cannot listen for Ctrl-C; downloads cannot be interrupted cleanly");
        std::future::pending::<()>().await;
    }
}

/// True when Ctrl-C arrives before `grace` elapses.
async fn interrupted_within(grace: Duration) -> bool {
    tokio::select! {
        () = interrupt_signal() => true,
        () = tokio::time::sleep(grace) => false,
    }
}
