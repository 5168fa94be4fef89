mod app;

use std::process::ExitCode;

use tracing::error;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let wiring = match app::bootstrap::build_app(&args) {
        Ok(wiring) => wiring,
        Err(err) => {
            error!(error = %err, "startup_failed");
            return ExitCode::FAILURE;
        }
    };
    app::loop_runner::run(wiring)
}
