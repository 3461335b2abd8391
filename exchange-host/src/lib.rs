use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use exchange_core::{
    default_roster, normalize_roster, Assignment, DrawProvider, Exchange, ExchangeError,
    ExchangeView, GamePhase, Notification, Observer, Participant, RngDraw,
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, Lines};
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

mod render;

pub use render::render_text;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Spin the gift exchange wheel from a terminal")]
pub struct Args {
    /// Newline-delimited list of participants. The built-in roster is used when omitted.
    #[arg(short, long, env = "GIFT_ROSTER")]
    pub roster: Option<PathBuf>,

    /// Seed for the wheel; fresh entropy when omitted.
    #[arg(long, env = "GIFT_SEED")]
    pub seed: Option<u64>,

    /// Pick spinners at random and spin without waiting for input.
    #[arg(long)]
    pub auto: bool,

    /// How long each spin takes, in milliseconds.
    #[arg(long, default_value_t = 0, env = "GIFT_SPIN_MS")]
    pub spin_ms: u64,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[arg(long, default_value = "info", env = "GIFT_LOG")]
    pub log_level: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct HostConfig {
    pub roster: Vec<Participant>,
    pub seed: Option<u64>,
    pub auto: bool,
    pub spin: Duration,
    pub format: OutputFormat,
}

impl HostConfig {
    pub async fn from_args(args: &Args) -> Result<Self, HostError> {
        let roster = match &args.roster {
            Some(path) => {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| HostError::RosterFile {
                        path: path.clone(),
                        source,
                    })?;
                normalize_roster(text.lines())
            }
            None => default_roster(),
        };

        Ok(Self {
            roster,
            seed: args.seed,
            auto: args.auto,
            spin: Duration::from_millis(args.spin_ms),
            format: args.format,
        })
    }
}

/// Everything the renderer is asked to show.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum HostMessage {
    State(ExchangeView),
    Event(Notification),
    Prompt { text: String },
    Error { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("failed to read roster {}: {source}", path.display())]
    RosterFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("input closed before the game finished")]
    InputClosed,
    #[error("game error: {0}")]
    Exchange(#[from] ExchangeError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("renderer task failed: {0}")]
    Renderer(#[from] tokio::task::JoinError),
    #[error("controller cannot act in phase {0:?}")]
    UnexpectedPhase(GamePhase),
}

struct Broadcaster {
    tx: mpsc::UnboundedSender<HostMessage>,
}

impl Observer for Broadcaster {
    fn notify(&mut self, notification: &Notification) {
        // No receiver just means nobody is rendering.
        let _ = self.tx.send(HostMessage::Event(notification.clone()));
    }
}

/// Plays one game to the end, rendering to `output`. Returns the final
/// assignments together with the writer.
pub async fn run<R, W>(
    config: HostConfig,
    input: R,
    output: W,
) -> Result<(Vec<Assignment>, W), HostError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let session_id = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();
    let renderer = tokio::spawn(render::forward(rx, output, config.format));

    let errors = tx.clone();
    let result = play(&config, tx, input)
        .instrument(info_span!("session", id = %session_id))
        .await;
    if let Err(err) = &result {
        let _ = errors.send(HostMessage::Error {
            message: err.to_string(),
        });
    }
    drop(errors);

    let output = renderer.await??;
    result.map(|assignments| (assignments, output))
}

async fn play<R>(
    config: &HostConfig,
    tx: mpsc::UnboundedSender<HostMessage>,
    input: R,
) -> Result<Vec<Assignment>, HostError>
where
    R: AsyncBufRead + Unpin,
{
    let mut game = Exchange::with_observer(Broadcaster { tx: tx.clone() });
    game.set_roster(&config.roster)?;
    game.start_game()?;
    let _ = tx.send(HostMessage::State(game.view()));

    let rng = config
        .seed
        .map(ChaCha8Rng::seed_from_u64)
        .unwrap_or_else(|| ChaCha8Rng::from_entropy());
    let mut draw = RngDraw::new(rng);
    let mut lines = input.lines();

    info!(participants = game.roster().len(), auto = config.auto, "game on");
    loop {
        match game.phase() {
            GamePhase::Complete => break,
            GamePhase::AwaitingSelection => {
                let candidates = game.request_player_selection()?;
                let choice = if config.auto {
                    candidates
                        .choose(draw.rng_mut())
                        .cloned()
                        .ok_or(ExchangeError::NoSelectableParticipants)?
                } else {
                    prompt_selection(&tx, &mut lines, &candidates).await?
                };
                match game.select_player(&choice) {
                    Ok(()) => debug!(player = %choice, "spinner chosen"),
                    Err(err) if err.is_recoverable() => {
                        let _ = tx.send(HostMessage::Error {
                            message: err.to_string(),
                        });
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            GamePhase::ReadyToSpin => {
                if !config.auto {
                    let spinner = game.current_player().unwrap_or_default();
                    let _ = tx.send(HostMessage::Prompt {
                        text: format!("{spinner}, press Enter to spin"),
                    });
                    next_line(&mut lines).await?;
                }
                let wheel = game.begin_spin()?;
                if !config.spin.is_zero() {
                    tokio::time::sleep(config.spin).await;
                }
                let index = draw.draw(&wheel);
                game.resolve_spin(index, &wheel)?;
                let _ = tx.send(HostMessage::State(game.view()));
            }
            phase => return Err(HostError::UnexpectedPhase(phase)),
        }
    }

    let summary = game.summary()?.to_vec();
    info!(assignments = summary.len(), "game complete");
    Ok(summary)
}

async fn prompt_selection<R>(
    tx: &mpsc::UnboundedSender<HostMessage>,
    lines: &mut Lines<R>,
    candidates: &[Participant],
) -> Result<Participant, HostError>
where
    R: AsyncBufRead + Unpin,
{
    let listing = candidates
        .iter()
        .enumerate()
        .map(|(i, name)| format!("  {}. {name}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    loop {
        let _ = tx.send(HostMessage::Prompt {
            text: format!("Who spins next? (number or name)\n{listing}"),
        });
        let line = next_line(lines).await?;
        match parse_choice(&line, candidates) {
            Some(name) => return Ok(name),
            None => {
                let _ = tx.send(HostMessage::Error {
                    message: format!("{:?} is not on the list", line.trim()),
                });
            }
        }
    }
}

async fn next_line<R>(lines: &mut Lines<R>) -> Result<String, HostError>
where
    R: AsyncBufRead + Unpin,
{
    lines.next_line().await?.ok_or(HostError::InputClosed)
}

/// Matches an exact name first, then a 1-based position in `candidates`.
pub fn parse_choice(input: &str, candidates: &[Participant]) -> Option<Participant> {
    let input = input.trim();
    if let Some(name) = candidates.iter().find(|c| c.as_str() == input) {
        return Some(name.clone());
    }
    let position = input.parse::<usize>().ok()?;
    candidates.get(position.checked_sub(1)?).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn config(names: &[&str], auto: bool, seed: u64, format: OutputFormat) -> HostConfig {
        HostConfig {
            roster: names.iter().map(|n| n.to_string()).collect(),
            seed: Some(seed),
            auto,
            spin: Duration::ZERO,
            format,
        }
    }

    fn json_lines(output: &[u8]) -> Vec<HostMessage> {
        String::from_utf8(output.to_vec())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn auto_play_finishes_and_renders_json() {
        let names = ["alice", "bob", "carol", "dave"];
        let (assignments, output) = run(
            config(&names, true, 42, OutputFormat::Json),
            &b""[..],
            Vec::new(),
        )
        .await
        .unwrap();

        assert_eq!(assignments.len(), 4);
        let players: HashSet<_> = assignments.iter().map(|a| a.player.as_str()).collect();
        let gifts: HashSet<_> = assignments.iter().map(|a| a.gift.as_str()).collect();
        assert_eq!(players.len(), 4);
        assert_eq!(gifts.len(), 4);

        let messages = json_lines(&output);
        let completions = messages
            .iter()
            .filter(|m| matches!(m, HostMessage::Event(Notification::GameComplete { .. })))
            .count();
        assert_eq!(completions, 1);
        match messages.last() {
            Some(HostMessage::State(view)) => {
                assert_eq!(view.phase, GamePhase::Complete);
                assert_eq!(view.assignments, assignments);
            }
            other => panic!("expected final state, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn same_seed_replays_the_same_game() {
        let names = ["a", "b", "c", "d", "e", "f"];
        let (first, _) = run(config(&names, true, 9, OutputFormat::Text), &b""[..], Vec::new())
            .await
            .unwrap();
        let (second, _) = run(config(&names, true, 9, OutputFormat::Text), &b""[..], Vec::new())
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn interactive_selection_retries_until_valid() {
        let mut script = String::from("nobody\n2\n");
        script.push_str(&"1\n".repeat(20));

        let (assignments, output) = run(
            config(&["A", "B", "C"], false, 3, OutputFormat::Text),
            script.as_bytes(),
            Vec::new(),
        )
        .await
        .unwrap();

        assert_eq!(assignments.len(), 3);
        assert_eq!(assignments[0].player, "B");
        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("! \"nobody\" is not on the list"), "{text}");
        assert!(text.contains("B, press Enter to spin"), "{text}");
        assert!(text.contains("Summary"), "{text}");
    }

    #[tokio::test]
    async fn fast_invalid_input_loses_no_output() {
        let mut script = "nobody\n".repeat(60);
        script.push_str(&"1\n".repeat(10));

        let (assignments, output) = run(
            config(&["A", "B"], false, 5, OutputFormat::Json),
            script.as_bytes(),
            Vec::new(),
        )
        .await
        .unwrap();

        assert_eq!(assignments.len(), 2);
        let messages = json_lines(&output);
        assert!(
            matches!(
                messages.first(),
                Some(HostMessage::Event(Notification::SelectionRequired { .. }))
            ),
            "{:?}",
            messages.first()
        );
        let errors = messages
            .iter()
            .filter(|m| matches!(m, HostMessage::Error { .. }))
            .count();
        assert_eq!(errors, 60);
        assert!(matches!(
            messages.last(),
            Some(HostMessage::State(view)) if view.phase == GamePhase::Complete
        ));
    }

    #[tokio::test]
    async fn closed_input_aborts_interactive_game() {
        let err = run(
            config(&["A", "B"], false, 1, OutputFormat::Text),
            &b""[..],
            Vec::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HostError::InputClosed));
    }

    #[tokio::test]
    async fn short_roster_is_reported() {
        let err = run(config(&["solo"], true, 1, OutputFormat::Json), &b""[..], Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HostError::Exchange(ExchangeError::InsufficientParticipants { count: 1, .. })
        ));
    }

    #[test]
    fn parse_choice_accepts_names_and_positions() {
        let candidates = vec!["7".to_string(), "bob".to_string(), "carol".to_string()];
        assert_eq!(parse_choice(" bob ", &candidates).as_deref(), Some("bob"));
        assert_eq!(parse_choice("3", &candidates).as_deref(), Some("carol"));
        // An exact name wins over a position.
        assert_eq!(parse_choice("7", &candidates).as_deref(), Some("7"));
        assert_eq!(parse_choice("0", &candidates), None);
        assert_eq!(parse_choice("4", &candidates), None);
        assert_eq!(parse_choice("dave", &candidates), None);
    }

    #[test]
    fn parses_cli_flags() {
        // Every env-backed flag is given explicitly so GIFT_* variables cannot leak in.
        let args = Args::parse_from([
            "gift-exchange",
            "--roster",
            "guests.txt",
            "--log-level",
            "debug",
            "--seed",
            "7",
            "--auto",
            "--spin-ms",
            "250",
            "--format",
            "json",
        ]);
        assert_eq!(args.seed, Some(7));
        assert!(args.auto);
        assert_eq!(args.spin_ms, 250);
        assert_eq!(args.format, OutputFormat::Json);
        assert_eq!(args.roster, Some(PathBuf::from("guests.txt")));
        assert_eq!(args.log_level, "debug");
    }

    #[tokio::test]
    async fn config_reads_roster_file() {
        let path = std::env::temp_dir().join(format!("roster_{}.txt", Uuid::new_v4()));
        tokio::fs::write(&path, "  alice\n\nbob \ncarol\n").await.unwrap();

        let args = Args::parse_from(["gift-exchange", "--roster", path.to_str().unwrap()]);
        let config = HostConfig::from_args(&args).await.unwrap();
        assert_eq!(config.roster, ["alice", "bob", "carol"]);
        assert!(!config.auto);
        let _ = tokio::fs::remove_file(&path).await;

        let missing = std::env::temp_dir().join(format!("missing_{}.txt", Uuid::new_v4()));
        let args = Args::parse_from(["gift-exchange", "--roster", missing.to_str().unwrap()]);
        assert!(matches!(
            HostConfig::from_args(&args).await,
            Err(HostError::RosterFile { .. })
        ));
    }

    #[tokio::test]
    async fn config_falls_back_to_default_roster() {
        let args = Args {
            roster: None,
            seed: None,
            auto: false,
            spin_ms: 0,
            format: OutputFormat::Text,
            log_level: "info".into(),
        };
        let config = HostConfig::from_args(&args).await.unwrap();
        assert_eq!(config.roster, default_roster());
        assert_eq!(config.seed, None);
        assert_eq!(config.spin, Duration::ZERO);
    }
}
