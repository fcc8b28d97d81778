//! Exercises `WireCodec` against a real child process (`cat`, which simply
//! echoes its stdin to its stdout), the way the teacher's own DAP tests
//! drive a real spawned process rather than an in-memory double.

use std::process::{Command, Stdio};
use std::time::Duration;

use dap_client::dap::codec::WireCodec;
use serde_json::json;

#[test]
fn frame_survives_a_round_trip_through_a_real_pipe() {
    let mut child = Command::new("cat")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn `cat`");
    let stdin = child.stdin.take().unwrap();
    let stdout = child.stdout.take().unwrap();
    let mut codec = WireCodec::new(stdin, stdout);

    let message = json!({
        "seq": 1,
        "type": "request",
        "command": "initialize",
        "arguments": { "adapterID": "test" },
    });
    codec.write_frame(&message).expect("write frame");

    let mut received = None;
    for _ in 0..20 {
        if let Some(value) = codec.poll_frame(Duration::from_millis(200)).expect("poll frame") {
            received = Some(value);
            break;
        }
    }

    let received = received.expect("frame arrived within the retry budget");
    assert_eq!(received, message);

    drop(codec);
    let _ = child.kill();
}

#[test]
fn poll_frame_times_out_with_no_data_available() {
    let mut child = Command::new("cat")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn `cat`");
    let stdin = child.stdin.take().unwrap();
    let stdout = child.stdout.take().unwrap();
    let mut codec = WireCodec::new(stdin, stdout);

    let result = codec
        .poll_frame(Duration::from_millis(30))
        .expect("poll frame");
    assert!(result.is_none());

    drop(codec);
    let _ = child.kill();
}
