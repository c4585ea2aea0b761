use std::process::ExitCode;

use engine::{run_app, GameState};
use tracing::error;

use super::bootstrap::AppWiring;
use super::gameplay;

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring {
        config,
        game,
        images_dir,
    } = app;
    let result = run_app(config, GameState::new(), |runtime| {
        gameplay::install(runtime, &game, images_dir.as_deref()).map(|_| ())
    });
    if let Err(err) = result {
        error!(error = %err, "run_failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
