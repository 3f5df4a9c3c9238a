//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Process and socket I/O in the host crates goes through tokio.
//! Address types from `std::net` are fine; blocking sockets are not.

use architectural_enforcement::{assert_clean, find_violations, Rule};

const BLOCKING_IO: Rule = Rule {
    name: "blocking I/O",
    patterns: &[
        "std::process::Command",
        "std::net::TcpStream",
        "std::net::TcpListener",
        "std::net::UdpSocket",
        "reqwest::blocking",
    ],
};

#[test]
fn test_no_blocking_io_in_production_code() {
    let violations = find_violations(&BLOCKING_IO);
    assert_clean(
        &BLOCKING_IO,
        &violations,
        &[
            "✅ tokio::process::Command",
            "✅ tokio::net::TcpListener / TcpStream",
        ],
    );
}
