//! Entrypoint for the recording server.

use anyhow::Result;
use talk_recording::Application;

fn main() -> Result<()> {
    let app = Application::new();
    let exit_code = app.run()?;
    std::process::exit(exit_code);
}
