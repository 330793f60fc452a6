use clap::Parser;

use mirrorsync::cli::{Cli, Output, exit_code_for};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let quiet = cli.quiet;

    let code = match cli.run().await {
        Ok(code) => code,
        Err(error) => {
            Output::new(false, quiet).error(&format!("{error:#}"));
            exit_code_for(&error)
        }
    };
    std::process::exit(code);
}
