//! Turn and assignment rules for the gift exchange wheel.
//!
//! One participant spins at a time. The spin lands on the owner of an
//! unclaimed gift; the spinner receives that gift and the owner spins next.
//! When the owner has already spun, a new spinner is picked by hand. If the
//! spinner's own gift is the last one unclaimed, the wheel switches to swap
//! mode and the spinner trades with someone who already holds a gift.

mod draw;
mod notify;

pub use draw::{DrawProvider, RngDraw};
pub use notify::{Notification, Observer, Recorder};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info, warn};

pub type Participant = String;

pub const MIN_PARTICIPANTS: usize = 2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Setup,
    AwaitingSelection,
    ReadyToSpin,
    Spinning,
    Complete,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpinMode {
    Normal,
    Swap,
}

/// `player` received the gift brought by `gift`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    pub player: Participant,
    pub gift: Participant,
    /// Set once a later swap replaced the gift on this entry.
    #[serde(default)]
    pub swapped: bool,
}

impl Assignment {
    pub fn new(player: impl Into<Participant>, gift: impl Into<Participant>) -> Self {
        Self {
            player: player.into(),
            gift: gift.into(),
            swapped: false,
        }
    }
}

/// The slices for one spin, captured when the spin starts.
///
/// Only the engine builds wheels, so a wheel always has at least one slice.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Wheel {
    spinner: Participant,
    names: Vec<Participant>,
    mode: SpinMode,
}

impl Wheel {
    pub fn spinner(&self) -> &str {
        &self.spinner
    }

    pub fn names(&self) -> &[Participant] {
        &self.names
    }

    pub fn mode(&self) -> SpinMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    GiftOwnerAlreadyPlayed,
    GiftAlreadyClaimed,
    AfterSwap,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum NextTurn {
    Spinner { player: Participant },
    Selection { reason: SelectionReason },
    Complete,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Outcome {
    pub player_who_spun: Participant,
    pub gift_owner: Participant,
    pub swapped: bool,
    pub swap_victim: Option<Participant>,
    pub next: NextTurn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input from the user; nothing changed and the call can be retried.
    Validation,
    /// The caller or draw provider handed over something it should not have.
    Range,
    /// A broken invariant. The game has to be restarted.
    Fatal,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("need at least {required} participants, have {count}")]
    InsufficientParticipants { count: usize, required: usize },
    #[error("participant {0:?} is listed more than once")]
    DuplicateParticipant(Participant),
    #[error("roster is locked once the game has started")]
    RosterLocked,
    #[error("game is {actual:?}, expected {expected:?}")]
    WrongPhase {
        expected: GamePhase,
        actual: GamePhase,
    },
    #[error("{0:?} cannot be selected to spin")]
    InvalidSelection(Participant),
    #[error("draw index {index} is outside a wheel of {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("wheel for {spinner:?} does not match the spin in flight")]
    StaleWheel { spinner: Participant },
    #[error("no participant is left to select")]
    NoSelectableParticipants,
    #[error("nobody besides {player:?} is on the roster")]
    Deadlock { player: Participant },
    #[error("swap victim {0:?} holds no gift")]
    UnassignedSwapVictim(Participant),
}

impl ExchangeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExchangeError::InsufficientParticipants { .. }
            | ExchangeError::DuplicateParticipant(_)
            | ExchangeError::RosterLocked
            | ExchangeError::WrongPhase { .. }
            | ExchangeError::InvalidSelection(_) => ErrorKind::Validation,
            ExchangeError::IndexOutOfRange { .. } | ExchangeError::StaleWheel { .. } => {
                ErrorKind::Range
            }
            ExchangeError::NoSelectableParticipants
            | ExchangeError::Deadlock { .. }
            | ExchangeError::UnassignedSwapVictim(_) => ErrorKind::Fatal,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

/// Snapshot for rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExchangeView {
    pub phase: GamePhase,
    pub roster: Vec<Participant>,
    pub played: Vec<Participant>,
    pub claimed: Vec<Participant>,
    pub available: Vec<Participant>,
    pub current_player: Option<Participant>,
    pub assignments: Vec<Assignment>,
}

/// Trims every line and drops the blank ones. Duplicates are kept.
pub fn normalize_roster<I, S>(lines: I) -> Vec<Participant>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .map(|line| line.as_ref().trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// The roster offered when nobody typed one in.
pub fn default_roster() -> Vec<Participant> {
    ('A'..='Z')
        .enumerate()
        .map(|(i, letter)| format!("{}-Guest {letter}", i + 1))
        .collect()
}

#[derive(Debug, Clone)]
pub struct Exchange<O = ()> {
    roster: Vec<Participant>,
    played: HashSet<Participant>,
    claimed: HashSet<Participant>,
    current_player: Option<Participant>,
    assignments: Vec<Assignment>,
    phase: GamePhase,
    in_flight: Option<Wheel>,
    observer: O,
}

impl Exchange<()> {
    pub fn new() -> Self {
        Self::with_observer(())
    }
}

impl Default for Exchange<()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Observer> Exchange<O> {
    pub fn with_observer(observer: O) -> Self {
        Self {
            roster: Vec::new(),
            played: HashSet::new(),
            claimed: HashSet::new(),
            current_player: None,
            assignments: Vec::new(),
            phase: GamePhase::Setup,
            in_flight: None,
            observer,
        }
    }

    pub fn set_roster<I, S>(&mut self, lines: I) -> Result<(), ExchangeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.phase != GamePhase::Setup {
            return Err(ExchangeError::RosterLocked);
        }
        self.roster = normalize_roster(lines);
        debug!(participants = self.roster.len(), "roster updated");
        Ok(())
    }

    /// Newline-delimited form of [`Exchange::set_roster`].
    pub fn set_roster_text(&mut self, text: &str) -> Result<(), ExchangeError> {
        self.set_roster(text.lines())
    }

    pub fn start_game(&mut self) -> Result<(), ExchangeError> {
        self.expect_phase(GamePhase::Setup)?;
        if self.roster.len() < MIN_PARTICIPANTS {
            return Err(ExchangeError::InsufficientParticipants {
                count: self.roster.len(),
                required: MIN_PARTICIPANTS,
            });
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.roster.iter().find(|name| !seen.insert(*name)) {
            return Err(ExchangeError::DuplicateParticipant(dup.clone()));
        }

        self.phase = GamePhase::AwaitingSelection;
        info!(participants = self.roster.len(), "game started");
        self.observer.notify(&Notification::SelectionRequired {
            candidates: self.roster.clone(),
        });
        Ok(())
    }

    /// Who may be picked as the next spinner.
    pub fn request_player_selection(&self) -> Result<Vec<Participant>, ExchangeError> {
        if self.phase == GamePhase::Setup {
            return Err(ExchangeError::WrongPhase {
                expected: GamePhase::AwaitingSelection,
                actual: self.phase,
            });
        }
        let candidates = self.selectable();
        if candidates.is_empty() {
            return Err(ExchangeError::NoSelectableParticipants);
        }
        Ok(candidates)
    }

    pub fn select_player(&mut self, name: &str) -> Result<(), ExchangeError> {
        self.expect_phase(GamePhase::AwaitingSelection)?;
        let candidates = self.request_player_selection()?;
        if !candidates.iter().any(|c| c == name) {
            return Err(ExchangeError::InvalidSelection(name.to_string()));
        }
        let wheel = self.wheel_for(name)?;

        self.current_player = Some(name.to_string());
        self.phase = GamePhase::ReadyToSpin;
        debug!(player = name, "player selected");
        self.observer.notify(&Notification::CandidatesChanged {
            names: wheel.names,
            mode: wheel.mode,
        });
        Ok(())
    }

    /// The wheel the current player would spin right now.
    pub fn compute_wheel_candidates(&self) -> Result<Wheel, ExchangeError> {
        let player = self
            .current_player
            .as_deref()
            .ok_or(ExchangeError::WrongPhase {
                expected: GamePhase::ReadyToSpin,
                actual: self.phase,
            })?;
        self.wheel_for(player)
    }

    /// Locks in the wheel for the pending spin. Exactly one
    /// [`Exchange::resolve_spin`] must follow with the same wheel.
    pub fn begin_spin(&mut self) -> Result<Wheel, ExchangeError> {
        self.expect_phase(GamePhase::ReadyToSpin)?;
        let wheel = self.compute_wheel_candidates()?;
        self.in_flight = Some(wheel.clone());
        self.phase = GamePhase::Spinning;
        debug!(player = %wheel.spinner, slices = wheel.len(), mode = ?wheel.mode, "spin started");
        Ok(wheel)
    }

    pub fn resolve_spin(
        &mut self,
        selected_index: usize,
        wheel: &Wheel,
    ) -> Result<Outcome, ExchangeError> {
        self.expect_phase(GamePhase::Spinning)?;
        if self.in_flight.as_ref() != Some(wheel) {
            return Err(ExchangeError::StaleWheel {
                spinner: wheel.spinner.clone(),
            });
        }
        let drawn = wheel
            .names
            .get(selected_index)
            .cloned()
            .ok_or(ExchangeError::IndexOutOfRange {
                index: selected_index,
                len: wheel.len(),
            })?;
        let player = wheel.spinner.clone();

        // The drawn owner's own gift is never on their wheel, so this spin's
        // claim does not change it and it can be checked before committing.
        let chained = match wheel.mode {
            SpinMode::Normal
                if !self.played.contains(&drawn) && !self.claimed.contains(&drawn) =>
            {
                Some(self.wheel_for(&drawn)?)
            }
            _ => None,
        };

        let mut outcome = match wheel.mode {
            SpinMode::Normal => self.take_unclaimed(player, drawn, chained.as_ref()),
            SpinMode::Swap => self.swap_with(player, drawn)?,
        };
        self.in_flight = None;

        if self.is_complete() {
            outcome.next = NextTurn::Complete;
        }
        match &outcome.next {
            NextTurn::Spinner { player } => {
                self.current_player = Some(player.clone());
                self.phase = GamePhase::ReadyToSpin;
            }
            NextTurn::Selection { .. } => {
                self.current_player = None;
                self.phase = GamePhase::AwaitingSelection;
            }
            NextTurn::Complete => {
                self.current_player = None;
                self.phase = GamePhase::Complete;
            }
        }

        info!(
            player = %outcome.player_who_spun,
            gift = %outcome.gift_owner,
            swapped = outcome.swapped,
            played = self.played.len(),
            "spin resolved"
        );
        self.observer.notify(&Notification::SpinResolved {
            outcome: outcome.clone(),
        });
        self.announce_next(&outcome.next, chained);
        Ok(outcome)
    }

    fn take_unclaimed(
        &mut self,
        player: Participant,
        gift_owner: Participant,
        chained: Option<&Wheel>,
    ) -> Outcome {
        let owner_claimed = self.claimed.contains(&gift_owner);

        self.assignments
            .push(Assignment::new(player.clone(), gift_owner.clone()));
        self.played.insert(player.clone());
        self.claimed.insert(gift_owner.clone());

        let next = match chained {
            Some(wheel) => NextTurn::Spinner {
                player: wheel.spinner.clone(),
            },
            None if owner_claimed => NextTurn::Selection {
                reason: SelectionReason::GiftAlreadyClaimed,
            },
            None => NextTurn::Selection {
                reason: SelectionReason::GiftOwnerAlreadyPlayed,
            },
        };

        Outcome {
            player_who_spun: player,
            gift_owner,
            swapped: false,
            swap_victim: None,
            next,
        }
    }

    fn swap_with(
        &mut self,
        player: Participant,
        victim: Participant,
    ) -> Result<Outcome, ExchangeError> {
        let slot = self
            .assignments
            .iter()
            .position(|a| a.player == victim)
            .ok_or_else(|| ExchangeError::UnassignedSwapVictim(victim.clone()))?;

        let entry = &mut self.assignments[slot];
        let victim_old_gift = std::mem::replace(&mut entry.gift, player.clone());
        entry.swapped = true;

        self.assignments
            .push(Assignment::new(player.clone(), victim_old_gift.clone()));
        self.played.insert(player.clone());
        self.claimed.insert(player.clone());

        info!(player = %player, victim = %victim, gift = %victim_old_gift, "gifts swapped");
        Ok(Outcome {
            player_who_spun: player,
            gift_owner: victim_old_gift,
            swapped: true,
            swap_victim: Some(victim),
            next: NextTurn::Selection {
                reason: SelectionReason::AfterSwap,
            },
        })
    }

    /// `chained` is the wheel already checked for a spinner the draw hands
    /// the turn to.
    fn announce_next(&mut self, next: &NextTurn, chained: Option<Wheel>) {
        let notification = match (next, chained) {
            (NextTurn::Complete, _) => Notification::GameComplete {
                assignments: self.assignments.clone(),
            },
            (NextTurn::Spinner { .. }, Some(wheel)) => Notification::CandidatesChanged {
                names: wheel.names,
                mode: wheel.mode,
            },
            _ => {
                let candidates = self.selectable();
                if candidates.is_empty() {
                    warn!(?next, "selection required but nobody is selectable");
                }
                Notification::SelectionRequired { candidates }
            }
        };
        self.observer.notify(&notification);
    }

    fn wheel_for(&self, spinner: &str) -> Result<Wheel, ExchangeError> {
        let everyone_else: Vec<Participant> = self
            .roster
            .iter()
            .filter(|p| p.as_str() != spinner)
            .cloned()
            .collect();
        if everyone_else.is_empty() {
            return Err(ExchangeError::Deadlock {
                player: spinner.to_string(),
            });
        }

        let unclaimed: Vec<Participant> = everyone_else
            .iter()
            .filter(|p| !self.claimed.contains(*p))
            .cloned()
            .collect();
        if !unclaimed.is_empty() {
            return Ok(Wheel {
                spinner: spinner.to_string(),
                names: unclaimed,
                mode: SpinMode::Normal,
            });
        }

        debug!(player = spinner, "no unclaimed gifts left, wheel switches to swap");
        Ok(Wheel {
            spinner: spinner.to_string(),
            names: everyone_else,
            mode: SpinMode::Swap,
        })
    }

    fn selectable(&self) -> Vec<Participant> {
        if self.played.is_empty() {
            return self.roster.clone();
        }
        self.roster
            .iter()
            .filter(|p| !self.claimed.contains(*p))
            .cloned()
            .collect()
    }

    fn expect_phase(&self, expected: GamePhase) -> Result<(), ExchangeError> {
        if self.phase != expected {
            return Err(ExchangeError::WrongPhase {
                expected,
                actual: self.phase,
            });
        }
        Ok(())
    }

    /// Drops all play state and returns to setup with the same roster.
    pub fn restart(&mut self) {
        self.played.clear();
        self.claimed.clear();
        self.current_player = None;
        self.assignments.clear();
        self.in_flight = None;
        self.phase = GamePhase::Setup;
        info!("game restarted");
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn roster(&self) -> &[Participant] {
        &self.roster
    }

    pub fn current_player(&self) -> Option<&str> {
        self.current_player.as_deref()
    }

    pub fn has_played(&self, name: &str) -> bool {
        self.played.contains(name)
    }

    pub fn is_claimed(&self, name: &str) -> bool {
        self.claimed.contains(name)
    }

    pub fn played(&self) -> Vec<Participant> {
        self.in_roster_order(&self.played)
    }

    pub fn claimed(&self) -> Vec<Participant> {
        self.in_roster_order(&self.claimed)
    }

    /// Participants who have not spun yet.
    pub fn available(&self) -> Vec<Participant> {
        self.roster
            .iter()
            .filter(|p| !self.played.contains(*p))
            .cloned()
            .collect()
    }

    pub fn played_count(&self) -> usize {
        self.played.len()
    }

    pub fn remaining_count(&self) -> usize {
        self.roster.len().saturating_sub(self.played.len())
    }

    pub fn is_complete(&self) -> bool {
        !self.roster.is_empty() && self.played.len() == self.roster.len()
    }

    /// Chronological log, including entries still in play.
    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn summary(&self) -> Result<&[Assignment], ExchangeError> {
        self.expect_phase(GamePhase::Complete)?;
        Ok(&self.assignments)
    }

    pub fn summary_latest_first(&self) -> Result<Vec<Assignment>, ExchangeError> {
        Ok(self.summary()?.iter().rev().cloned().collect())
    }

    pub fn view(&self) -> ExchangeView {
        ExchangeView {
            phase: self.phase,
            roster: self.roster.clone(),
            played: self.played(),
            claimed: self.claimed(),
            available: self.available(),
            current_player: self.current_player.clone(),
            assignments: self.assignments.clone(),
        }
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn into_observer(self) -> O {
        self.observer
    }

    fn in_roster_order(&self, set: &HashSet<Participant>) -> Vec<Participant> {
        self.roster
            .iter()
            .filter(|p| set.contains(*p))
            .cloned()
            .collect()
    }
}
