//! Release pipeline binary.
//!
//! Builds the source archive for the current release and publishes configured
//! uploads, reporting each stage's outcome.

use kodegen_release_pipeline::cli;
use kodegen_release_pipeline::cli::OutputManager;
use std::process;

#[tokio::main]
async fn main() {
    env_logger::init();

    match cli::run().await {
        Ok(exit_code) => {
            process::exit(exit_code);
        }
        Err(e) => {
            // Never quiet for fatal errors
            let output = OutputManager::new(false, false);
            output.error(&format!("Fatal error: {e}"));

            let suggestions = e.recovery_suggestions();
            if !suggestions.is_empty() {
                let _ = output.indent("");
                let _ = output.indent("💡 Recovery suggestions:");
                for suggestion in suggestions {
                    let _ = output.indent(&format!("  {suggestion}"));
                }
            }

            process::exit(1);
        }
    }
}
