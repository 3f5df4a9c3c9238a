//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles
//! on the host crates:
//! - No sleep() calls in production code
//! - No blocking process or socket I/O
//! - No unwrap()/expect() outside tests
//!
//! The scanner is line based. Everything from the first `#[cfg(test)]` of a
//! file onward is treated as test code, and `//` comments are ignored.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source roots, relative to the workspace root
pub const PRODUCTION_ROOTS: &[&str] = &["host/core/src", "host/daemon/src"];

/// A forbidden pattern found in production code
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// File the pattern was found in
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// Which rule fired
    pub rule: &'static str,
    /// The offending line, trimmed
    pub text: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.rule,
            self.text
        )
    }
}

/// A named set of forbidden substrings
#[derive(Clone, Copy, Debug)]
pub struct Rule {
    /// Name printed with every violation
    pub name: &'static str,
    /// Substrings that trigger the rule
    pub patterns: &'static [&'static str],
}

/// The workspace root
#[must_use]
pub fn workspace_root() -> PathBuf {
    // tests/architectural-enforcement -> workspace
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Every `.rs` file under the production roots
#[must_use]
pub fn production_sources() -> Vec<PathBuf> {
    let root = workspace_root();
    let mut files: Vec<PathBuf> = PRODUCTION_ROOTS
        .iter()
        .map(|dir| root.join(dir))
        .filter(|dir| dir.exists())
        .flat_map(|dir| {
            walkdir::WalkDir::new(dir)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("rs"))
                .map(walkdir::DirEntry::into_path)
        })
        .collect();
    files.sort();
    files
}

/// Lines of `content` that count as production code, with 1-based numbers
///
/// Comments are stripped and scanning stops at the first test module.
#[must_use]
pub fn production_lines(content: &str) -> Vec<(usize, &str)> {
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| !line.trim_start().starts_with("#[cfg(test)]"))
        .map(|(idx, line)| (idx + 1, line.split("//").next().unwrap_or(line)))
        .filter(|(_, code)| !code.trim().is_empty())
        .collect()
}

/// Check one file's content against `rule`
#[must_use]
pub fn check_content(path: &Path, content: &str, rule: &Rule) -> Vec<Violation> {
    production_lines(content)
        .into_iter()
        .filter(|(_, code)| rule.patterns.iter().any(|p| code.contains(p)))
        .map(|(line, _)| Violation {
            path: path.to_path_buf(),
            line,
            rule: rule.name,
            text: content.lines().nth(line - 1).unwrap_or_default().trim().to_string(),
        })
        .collect()
}

/// Check every production source against `rule`
#[must_use]
pub fn find_violations(rule: &Rule) -> Vec<Violation> {
    production_sources()
        .iter()
        .filter_map(|path| fs::read_to_string(path).ok().map(|c| (path, c)))
        .flat_map(|(path, content)| check_content(path, &content, rule))
        .collect()
}

/// Panic with a readable report when `violations` is non-empty
pub fn assert_clean(rule: &Rule, violations: &[Violation], advice: &[&str]) {
    if violations.is_empty() {
        return;
    }

    eprintln!("\n❌ CRITICAL: {} found in production code!\n", rule.name);
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    eprintln!();
    for line in advice {
        eprintln!("  {line}");
    }

    panic!(
        "\nFound {} {} violation(s) in production code.\nFix these before merging!",
        violations.len(),
        rule.name
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: Rule = Rule {
        name: "sample",
        patterns: &["thread::sleep"],
    };

    #[test]
    fn test_comments_and_test_modules_are_skipped() {
        let content = "fn a() {\n    // std::thread::sleep(d);\n    std::thread::sleep(d);\n}\n#[cfg(test)]\nmod tests {\n    fn b() { std::thread::sleep(d); }\n}\n";
        let violations = check_content(Path::new("x.rs"), content, &SAMPLE);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].line, 3);
        assert_eq!(violations[0].text, "std::thread::sleep(d);");
    }

    #[test]
    fn test_production_roots_exist() {
        assert!(!production_sources().is_empty());
    }
}
