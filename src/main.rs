//! `dapc` — a command-line harness that spawns a debug adapter, drives it
//! through `initialize`/`launch`, and prints a thread/stack snapshot once
//! the debuggee stops.
//!
//! This binary exists to exercise `dap_client::dap::Session` end to end; it
//! is not itself an IDE integration (spec's Non-goal: no UI).

use std::time::Duration;

use clap::Parser;
use log::{info, warn};

use dap_client::dap::capabilities::InitializeRequestArguments;
use dap_client::dap::state::{ConnectionState, LaunchKind};
use dap_client::dap::{EndSessionHow, Session, TickOutcome};
use dap_client::log::LOGGER_SWITCHER;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the debug adapter executable to spawn.
    adapter: String,

    /// Arguments passed to the adapter process.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    adapter_args: Vec<String>,

    /// Program the adapter should launch (sent as `launch`'s `program`
    /// argument). Omit this and pass `--attach` to attach instead.
    #[arg(long)]
    program: Option<String>,

    /// Attach instead of launch; `program` is ignored.
    #[arg(long)]
    attach: bool,

    /// How long to wait for a frame on each tick, in milliseconds.
    #[arg(long, default_value_t = 200)]
    tick_timeout_ms: u64,
}

fn main() -> anyhow::Result<()> {
    let logger = env_logger::Logger::from_default_env();
    let filter = logger.filter();
    LOGGER_SWITCHER.switch(logger, filter);

    let args = Args::parse();

    let mut session = Session::new(args.adapter.clone(), args.adapter_args.clone());

    let init_args = InitializeRequestArguments {
        adapter_id: args.adapter.clone(),
        lines_start_at1: true,
        columns_start_at1: true,
        supports_variable_type: true,
        supports_run_in_terminal_request: false,
        supports_progress_reporting: true,
        supports_invalidated_event: true,
        ..Default::default()
    };

    let (launch_kind, launch_args) = if args.attach {
        (LaunchKind::Attach, serde_json::json!({}))
    } else {
        (
            LaunchKind::Launch,
            serde_json::json!({ "program": args.program }),
        )
    };

    session.begin_session(init_args, launch_kind, launch_args)?;
    info!(target: "dap", "spawned adapter `{}`, handshake underway", args.adapter);

    let tick_timeout = Duration::from_millis(args.tick_timeout_ms);
    let mut stopped_thread: Option<i64> = None;

    loop {
        match session.tick(tick_timeout) {
            Ok(TickOutcome::Idle) => {}
            Ok(TickOutcome::ReverseRequest(request)) => {
                warn!(
                    target: "dap",
                    "adapter sent reverse request `{:?}`; this client does not spawn terminals, rejecting",
                    request.command
                );
                session.answer_reverse_request(
                    &request,
                    false,
                    serde_json::json!({ "error": "unsupported by this client" }),
                )?;
            }
            Err(err) => {
                warn!(target: "dap", "tick failed: {err}");
                if err.is_fatal() {
                    return Err(err.into());
                }
            }
        }

        if stopped_thread.is_none() {
            if let Some((&id, _)) = session.store().threads.first() {
                stopped_thread = Some(id);
                session.fetch_thread_state(id, true, true)?;
            }
        }

        if let Some(id) = stopped_thread {
            let frames = session
                .store()
                .thread_state
                .get(&id)
                .and_then(|state| state.stack_frames.as_ref());
            if let Some(frames) = frames {
                for frame in frames {
                    println!(
                        "#{} {} @ {}:{}",
                        frame.id, frame.name, frame.line, frame.column
                    );
                }
                break;
            }
        }
    }

    session.end_session(EndSessionHow::Disconnect)?;
    while !matches!(session.connection().state(), ConnectionState::Initialized) {
        session.tick(tick_timeout)?;
    }

    let status = session.wait_for_exit()?;
    info!(target: "dap", "adapter exited with {status}");
    Ok(())
}
