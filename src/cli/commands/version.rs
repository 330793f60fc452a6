use anyhow::Result;
use clap::Args;

use crate::cli::EXIT_SUCCESS;
use crate::git::GitTransport;

#[derive(Args, Clone, Debug, Default)]
pub struct VersionArgs {
    /// Show detailed version information
    #[arg(short = 'd', long = "detailed")]
    pub detailed: bool,
}

pub async fn execute(args: VersionArgs) -> Result<i32> {
    println!("mirrorsync {} ({})", crate::VERSION, env!("GIT_SHA"));
    if args.detailed {
        let git = match GitTransport::locate("git").and_then(|transport| transport.version()) {
            Ok(version) => version,
            Err(error) => format!("unavailable ({error})"),
        };
        println!("Git: {git}");
        println!("Rust Edition: 2024");
        println!("Repository: {}", env!("CARGO_PKG_REPOSITORY"));
        println!("License: {}", env!("CARGO_PKG_LICENSE"));
    }
    Ok(EXIT_SUCCESS)
}
