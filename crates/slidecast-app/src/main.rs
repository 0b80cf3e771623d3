#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]

//! Slidecast service binary: one process hosting the HTTP API and a pool of
//! pipeline workers over shared dependencies.

mod bootstrap;
mod telemetry;

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init();
    match bootstrap::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %format!("{error:#}"), "slidecast terminated");
            ExitCode::FAILURE
        }
    }
}
