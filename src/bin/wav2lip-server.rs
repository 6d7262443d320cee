//! Wav2Lip server binary
//!
//! HTTP API and command-line renderer for lip-synchronized video generation.

#[cfg(feature = "cli")]
use wav2lip_server::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
