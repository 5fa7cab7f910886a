//! Number guessing over stdin

use std::time::Instant;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::guess::{BestScore, GuessFeedback, GuessGame, GuessOutcome};
use crate::util::time::format_mm_ss;

use super::state::AppState;

const HELP: &str = "Type a number from 1 to 100, or: new, history, clear, forget-best, quit";

/// Play rounds until the user quits or stdin closes
pub async fn run(state: &mut AppState) -> anyhow::Result<()> {
    let mut best = BestScore::load(&state.storage);
    let mut game = GuessGame::new(state.config.race_seed, Instant::now());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Guess the number!");
    match best.get() {
        Some(attempts) => println!("Best score: {} attempts", attempts),
        None => println!("Best score: none yet"),
    }
    println!("{}", HELP);

    while let Some(line) = lines.next_line().await? {
        let now = Instant::now();
        match line.trim() {
            "" => continue,
            "quit" | "q" => break,
            "new" => {
                if game.is_active() && game.attempts() > 0 {
                    println!("Abandoning the current game after {} attempts", game.attempts());
                }
                game.new_game(now);
                println!("New game started");
            }
            "clear" => {
                if game.clear_history() {
                    println!("History cleared");
                }
            }
            "forget-best" => {
                best.clear(&mut state.storage)?;
                println!("Best score cleared");
            }
            "history" => {
                if game.history().is_empty() {
                    println!("No guesses yet");
                }
                for (i, record) in game.history().iter().enumerate() {
                    let hint = match record.outcome {
                        GuessOutcome::Win => "correct",
                        GuessOutcome::Low => "too low",
                        GuessOutcome::High => "too high",
                    };
                    println!(
                        "  #{:<2} {:>3}  {:<8} {}",
                        i + 1,
                        record.number,
                        hint,
                        format_mm_ss(record.elapsed)
                    );
                }
            }
            input => {
                let result = GuessGame::parse(input).and_then(|n| game.guess(n, now));
                match result {
                    Ok(GuessFeedback::Hint { outcome, proximity, range }) => {
                        let direction = if outcome == GuessOutcome::Low {
                            "Go higher"
                        } else {
                            "Go lower"
                        };
                        println!(
                            "{} {} ({}-{})  attempts: {}  time: {}  progress: {}%",
                            proximity.label(),
                            direction,
                            range.0,
                            range.1,
                            game.attempts(),
                            format_mm_ss(game.elapsed(now)),
                            game.progress_percent()
                        );
                    }
                    Ok(GuessFeedback::Won { target, attempts, elapsed, achievement }) => {
                        println!(
                            "Correct! It was {}. {} attempts in {}",
                            target,
                            attempts,
                            format_mm_ss(elapsed)
                        );
                        if best.record(attempts, &mut state.storage)? {
                            println!("New record: {} attempts", attempts);
                        }
                        if let Some(achievement) = achievement {
                            println!("{}", achievement.label());
                        }
                        println!("Type 'new' to play again");
                    }
                    Err(e) => println!("{}", e),
                }
            }
        }
    }

    Ok(())
}
