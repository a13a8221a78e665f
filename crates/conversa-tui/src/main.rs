use std::time::Duration;

use anyhow::Result;
use conversa_core::Config;

mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

const TICK_RATE: Duration = Duration::from_millis(300);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    let log_path = logging::init(&config.data_dir()?)?;
    tracing::info!(log = %log_path.display(), "Starting Conversa v{}", env!("CARGO_PKG_VERSION"));

    let mut app = App::new(config).await?;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, &mut app).await;
    tui::restore()?;

    if let Err(e) = &result {
        tracing::error!(error = %e, "exited with error");
    }
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App) -> Result<()> {
    let mut events = EventHandler::new(TICK_RATE);

    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        let Some(event) = events.next().await else {
            break;
        };
        handler::handle_event(app, event).await?;
        app.poll_reply().await;
    }

    Ok(())
}
