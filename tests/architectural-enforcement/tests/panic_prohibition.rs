//! Integration Test: Panic Prohibition
//!
//! **Policy**: Production code propagates errors with `?` or turns them into
//! structured replies. `unwrap()` and `expect()` belong in tests only.

use architectural_enforcement::{assert_clean, find_violations, Rule};

const PANICS: Rule = Rule {
    name: "unwrap/expect",
    patterns: &[".unwrap()", ".expect("],
};

#[test]
fn test_no_unwrap_in_production_code() {
    let violations = find_violations(&PANICS);
    assert_clean(
        &PANICS,
        &violations,
        &[
            "✅ Return Result and use ?",
            "✅ Map provider faults into {success: false, error}",
        ],
    );
}
