use std::process::Command;

fn main() {
    // Short commit SHA for `mirrorsync version`; container builds without
    // a .git directory pass GIT_SHA in the environment instead.
    let git_sha = std::env::var("GIT_SHA").ok().filter(|sha| !sha.is_empty()).unwrap_or_else(|| {
        Command::new("git")
            .args(["rev-parse", "--short", "HEAD"])
            .output()
            .ok()
            .filter(|output| output.status.success())
            .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    });

    println!("cargo:rustc-env=GIT_SHA={git_sha}");

    println!("cargo:rerun-if-env-changed=GIT_SHA");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
