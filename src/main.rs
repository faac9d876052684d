//! NodeForge Packager - build, sign, notarize, and package a macOS app.

use nodeforge_packager::cli;
use nodeforge_packager::cli::OutputManager;
use std::process;

#[tokio::main]
async fn main() {
    // Stage progress is reported through the log; show it by default.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match cli::run().await {
        Ok(exit_code) => {
            process::exit(exit_code);
        }
        Err(e) => {
            let output = OutputManager::new();
            output.error(&format!("Fatal error: {e}"));
            process::exit(1);
        }
    }
}
