//! End-to-end handshake test against a scripted fake adapter.
//!
//! No compiled fixture binary is built for this (the toolchain is not
//! invoked by this test suite's authors); the fake adapter is a small
//! inline Python script, spawned as a child process exactly the way a real
//! debug adapter would be. The test is skipped, not failed, if no `python3`
//! is on `PATH`.

use std::process::Command;
use std::time::Duration;

use dap_client::dap::capabilities::InitializeRequestArguments;
use dap_client::dap::state::{ConnectionState, LaunchKind};
use dap_client::dap::{EndSessionHow, Session, TickOutcome};

const FAKE_ADAPTER: &str = r#"
import sys, json

def read_message():
    headers = {}
    while True:
        line = sys.stdin.buffer.readline()
        if not line:
            sys.exit(0)
        line = line.decode().rstrip("\r\n")
        if line == "":
            break
        if ":" in line:
            k, v = line.split(":", 1)
            headers[k.strip()] = v.strip()
    length = int(headers["Content-Length"])
    body = sys.stdin.buffer.read(length)
    return json.loads(body)

def write_message(msg):
    data = json.dumps(msg).encode()
    sys.stdout.buffer.write(("Content-Length: %d\r\n\r\n" % len(data)).encode())
    sys.stdout.buffer.write(data)
    sys.stdout.buffer.flush()

_seq = [1]
def next_seq():
    _seq[0] += 1
    return _seq[0] - 1

def respond(req, body, success=True):
    write_message({
        "seq": next_seq(),
        "type": "response",
        "request_seq": req["seq"],
        "success": success,
        "command": req["command"],
        "body": body,
    })

def event(name, body):
    write_message({"seq": next_seq(), "type": "event", "event": name, "body": body})

pending_launch = [None]

while True:
    req = read_message()
    cmd = req["command"]
    if cmd == "initialize":
        respond(req, {"supportsConfigurationDoneRequest": True})
        event("initialized", {})
    elif cmd == "launch":
        # Mirrors debugpy/cppdbg: the launch response is withheld until
        # configurationDone arrives, so a client that waits for it before
        # sending configurationDone deadlocks.
        pending_launch[0] = req
    elif cmd == "configurationDone":
        if pending_launch[0] is not None:
            respond(pending_launch[0], {})
            pending_launch[0] = None
        respond(req, {})
        event("stopped", {"reason": "breakpoint", "threadId": 1, "allThreadsStopped": True})
    elif cmd == "threads":
        respond(req, {"threads": [{"id": 1, "name": "main"}]})
    elif cmd == "stackTrace":
        respond(req, {"stackFrames": [{"id": 10, "name": "main", "line": 5, "column": 1}]})
    elif cmd == "scopes":
        respond(req, {"scopes": []})
    elif cmd == "disconnect":
        respond(req, {})
        sys.exit(0)
    else:
        respond(req, {}, success=False)
"#;

fn python3_available() -> bool {
    Command::new("python3")
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success())
}

#[test]
fn full_handshake_reaches_a_stopped_thread_with_a_stack() {
    if !python3_available() {
        eprintln!("skipping: no python3 on PATH");
        return;
    }

    let mut session = Session::new("python3", vec!["-c".to_string(), FAKE_ADAPTER.to_string()]);

    let init_args = InitializeRequestArguments {
        adapter_id: "fake".to_string(),
        lines_start_at1: true,
        columns_start_at1: true,
        ..Default::default()
    };
    session
        .begin_session(
            init_args,
            LaunchKind::Launch,
            serde_json::json!({ "program": "irrelevant" }),
        )
        .expect("begin_session");

    let tick_timeout = Duration::from_millis(200);
    let mut fetched_stack = false;
    for _ in 0..200 {
        match session.tick(tick_timeout) {
            Ok(TickOutcome::Idle) => {}
            Ok(TickOutcome::ReverseRequest(_)) => {}
            Err(err) => panic!("unexpected tick error: {err}"),
        }

        if session.connection().fully_initialized() && !fetched_stack {
            if let Some((&id, _)) = session.store().threads.first() {
                session.fetch_thread_state(id, true, true).unwrap();
                fetched_stack = true;
            }
        }

        if let Some((_, state)) = session.store().thread_state.iter().next() {
            if state.stack_frames.is_some() {
                break;
            }
        }
    }

    assert!(session.connection().fully_initialized());
    let (_, thread_state) = session
        .store()
        .thread_state
        .iter()
        .next()
        .expect("thread state was fetched");
    let frames = thread_state
        .stack_frames
        .as_ref()
        .expect("stack frames were fetched");
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].name, "main");

    session
        .end_session(EndSessionHow::Disconnect)
        .expect("end_session");
    for _ in 0..50 {
        if matches!(session.connection().state(), ConnectionState::Initialized) {
            break;
        }
        session.tick(tick_timeout).expect("tick during disconnect");
    }
    assert_eq!(session.connection().state(), ConnectionState::Initialized);
    session.wait_for_exit().expect("adapter exits");
}
