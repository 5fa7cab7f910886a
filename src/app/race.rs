//! Interactive reaction race in the terminal

use std::future::Future;
use std::io::{self, Write};
use std::pin::Pin;

use tracing::{info, warn};

use crate::input::{forward_keys, TerminalGuard};
use crate::race::coordinator::UserAction;
use crate::race::runtime::{create_session, Session};
use crate::util::time::RaceTiming;

use super::display::{render, Roster};
use super::state::AppState;

/// Print lines with explicit carriage returns; the terminal is in raw mode
fn say(lines: &[String]) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    for line in lines {
        write!(stdout, "{}\r\n", line)?;
    }
    stdout.flush()
}

/// Create a race on the service and play it until the user quits.
/// A new game requested after game over gets a fresh service game.
pub async fn run<F>(state: &AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let _guard = TerminalGuard::enter()?;
    tokio::pin!(shutdown);
    let mut stopping = false;

    loop {
        let new_game = play_session(state, shutdown.as_mut(), &mut stopping).await?;
        if !new_game || stopping {
            return Ok(());
        }
        say(&["Creating a new game...".to_string()])?;
    }
}

/// Play one service game; returns whether the user asked for another
async fn play_session<F>(
    state: &AppState,
    mut shutdown: Pin<&mut F>,
    stopping: &mut bool,
) -> anyhow::Result<bool>
where
    F: Future<Output = ()>,
{
    let request = state.create_request();
    let Session {
        runtime,
        handle,
        mut notices,
    } = create_session(
        state.service.clone(),
        &request,
        RaceTiming::default(),
        state.config.race_seed,
    )
    .await?;

    let roster = Roster::from_game(runtime.coordinator().game());
    let mut intro = vec![format!(
        "Reaction race: {} players, {} rounds",
        request.player_count, request.round_count
    )];
    intro.extend(roster.describe());
    intro.push("g start  n next round  r retry  c new game  Esc quit".to_string());
    say(&intro)?;

    let coordinator_task = tokio::spawn(runtime.run());
    let input_task = tokio::spawn(forward_keys(handle.clone()));

    loop {
        tokio::select! {
            notice = notices.recv() => match notice {
                Some(notice) => say(&render(&notice, &roster))?,
                None => break,
            },
            _ = shutdown.as_mut(), if !*stopping => {
                *stopping = true;
                handle.action(UserAction::Reset).await;
            }
        }
    }

    input_task.abort();
    if let Ok(Err(e)) = input_task.await {
        warn!(error = %e, "Keyboard input failed");
    }

    let coordinator = coordinator_task.await?;
    info!(
        game_id = %coordinator.game().game_id,
        rounds = coordinator.round(),
        new_game = coordinator.new_game_requested(),
        "Race session ended"
    );
    Ok(coordinator.new_game_requested())
}
