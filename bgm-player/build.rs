//! Stamps bgm-player with the identity it logs in its startup banner
//!
//! `main.rs` reads these through `env!`:
//! - `GIT_HASH`: short commit of the checkout, or "unknown" for a tarball build
//! - `BUILD_TIMESTAMP`: UTC time of this build script run, RFC 3339
//! - `BUILD_PROFILE`: cargo profile (debug/release)

use std::process::Command;

fn git_short_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?;
    Some(hash.trim().to_string())
}

fn stamp(key: &str, value: &str) {
    println!("cargo:rustc-env={}={}", key, value);
}

fn main() {
    stamp(
        "GIT_HASH",
        &git_short_hash().unwrap_or_else(|| "unknown".to_string()),
    );
    stamp(
        "BUILD_TIMESTAMP",
        &chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    );
    stamp(
        "BUILD_PROFILE",
        &std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string()),
    );
}
