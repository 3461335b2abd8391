use exchange_core::{NextTurn, Notification, Outcome, SelectionReason, SpinMode};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::{HostMessage, OutputFormat};

/// Writes every message to `out` until all senders are gone, then hands the
/// writer back.
pub(crate) async fn forward<W>(
    mut rx: mpsc::UnboundedReceiver<HostMessage>,
    mut out: W,
    format: OutputFormat,
) -> std::io::Result<W>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let rendered = match format {
            OutputFormat::Json => serde_json::to_string(&message)?,
            OutputFormat::Text => render_text(&message),
        };
        if rendered.is_empty() {
            continue;
        }
        out.write_all(rendered.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
    }
    Ok(out)
}

pub fn render_text(message: &HostMessage) -> String {
    match message {
        HostMessage::Prompt { text } => text.clone(),
        HostMessage::Error { message } => format!("! {message}"),
        HostMessage::State(view) => format!(
            "[{} played, {} still to spin]",
            view.played.len(),
            view.available.len()
        ),
        HostMessage::Event(event) => render_event(event),
    }
}

fn render_event(event: &Notification) -> String {
    match event {
        Notification::CandidatesChanged { names, mode } => match mode {
            SpinMode::Normal => format!("Wheel: {}", names.join(" | ")),
            SpinMode::Swap => format!(
                "No unclaimed gifts left, spinning to swap with: {}",
                names.join(" | ")
            ),
        },
        Notification::SpinResolved { outcome } => render_outcome(outcome),
        Notification::SelectionRequired { candidates } => {
            format!("Choose the next spinner ({} eligible)", candidates.len())
        }
        Notification::GameComplete { assignments } => {
            let mut lines = vec![format!("Summary ({} gifts, latest first)", assignments.len())];
            lines.extend(
                assignments
                    .iter()
                    .rev()
                    .map(|a| format!("  {} <- {}", a.player, a.gift)),
            );
            lines.join("\n")
        }
    }
}

fn render_outcome(outcome: &Outcome) -> String {
    let mut lines = vec![format!(
        "{} gets the gift from {}",
        outcome.player_who_spun, outcome.gift_owner
    )];
    if let Some(victim) = &outcome.swap_victim {
        lines.push(format!(
            "  swapped with {victim}, who now holds {}'s gift",
            outcome.player_who_spun
        ));
    }
    match &outcome.next {
        NextTurn::Spinner { player } => lines.push(format!("{player} spins next")),
        NextTurn::Selection { reason } => lines.push(
            match reason {
                SelectionReason::GiftOwnerAlreadyPlayed => {
                    format!("{} already spun", outcome.gift_owner)
                }
                SelectionReason::GiftAlreadyClaimed => {
                    format!("{}'s gift was already taken", outcome.gift_owner)
                }
                SelectionReason::AfterSwap => "swap done".to_string(),
            },
        ),
        NextTurn::Complete => {}
    }
    lines.join("\n")
}
