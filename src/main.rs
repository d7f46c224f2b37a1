//! Binary entrypoint for the parlance chat server.

use std::process::ExitCode;

use parlance::bootstrap;

/// Start the server: initialize the store (running the legacy migration),
/// wire the Ollama gateway, and serve the chat API until ctrl-c.
fn main() -> ExitCode {
    bootstrap::run()
}
