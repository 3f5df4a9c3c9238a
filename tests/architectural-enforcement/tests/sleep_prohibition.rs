//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the host crates MUST NOT sleep to wait for
//! something. The backend handshake, subsystem shutdown and event routing all
//! wait on channels or I/O; periodic work uses `tokio::time::interval`.

use architectural_enforcement::{assert_clean, find_violations, Rule};

const SLEEP: Rule = Rule {
    name: "sleep call",
    patterns: &["thread::sleep", "time::sleep(", "sleep_until("],
};

#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_violations(&SLEEP);
    assert_clean(
        &SLEEP,
        &violations,
        &[
            "✅ Wait on a oneshot/mpsc channel or a JoinHandle",
            "✅ Use tokio::time::interval for periodic work",
            "✅ Use tokio::time::timeout to bound a wait",
        ],
    );
}
