//! Message handlers wiring incoming traffic into the game actor.
//!
//! Each handler owns a [`GameHandle`] and, where a message can lead to a
//! follow-up publish, a [`Publisher`]. A follow-up that fails to publish
//! turns into [`Disposition::RetryLater`] so the broker redelivers the
//! message instead of it being lost.

use std::future::Future;

use peril_game::{ArmyMove, GameHandle, MoveOutcome, PlayingState, RecognitionOfWar};
use peril_pubsub::{Disposition, Handler};

use crate::Publisher;

/// Applies coordinator pause/resume broadcasts.
pub struct PauseHandler {
    game: GameHandle,
}

impl PauseHandler {
    pub fn new(game: GameHandle) -> Self {
        Self { game }
    }
}

impl Handler<PlayingState> for PauseHandler {
    fn handle(&self, state: PlayingState) -> impl Future<Output = Disposition> + Send {
        async move {
            match self.game.apply_pause(state).await {
                Ok(()) => Disposition::Accept,
                Err(e) => {
                    tracing::error!(error = %e, "pause not applied");
                    Disposition::RetryLater
                }
            }
        }
    }
}

/// Applies other players' moves and declares war on incursions.
pub struct MoveHandler {
    game: GameHandle,
    publisher: Publisher,
}

impl MoveHandler {
    pub fn new(game: GameHandle, publisher: Publisher) -> Self {
        Self { game, publisher }
    }

    async fn declare_war(&self, mv: ArmyMove) -> Disposition {
        let local = match self.game.snapshot().await {
            Ok(state) => state.player().clone(),
            Err(e) => {
                tracing::error!(error = %e, "cannot read state to declare war");
                return Disposition::RetryLater;
            }
        };
        let war = RecognitionOfWar {
            attacker: local,
            defender: mv.player,
        };

        match self.publisher.war(&war).await {
            Ok(()) => {
                tracing::info!(
                    defender = %war.defender.username,
                    location = %mv.to,
                    "war declared"
                );
                Disposition::Accept
            }
            Err(e) => {
                tracing::warn!(error = %e, "publishing war declaration failed");
                Disposition::RetryLater
            }
        }
    }
}

impl Handler<ArmyMove> for MoveHandler {
    fn handle(&self, mv: ArmyMove) -> impl Future<Output = Disposition> + Send {
        async move {
            let outcome = match self.game.apply_move(mv.clone()).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, "move not applied");
                    return Disposition::RetryLater;
                }
            };

            match outcome {
                MoveOutcome::Safe => {
                    tracing::info!(
                        player = %mv.player.username,
                        units = mv.units.len(),
                        from = %mv.from,
                        to = %mv.to,
                        "opponent moved"
                    );
                    Disposition::Accept
                }
                MoveOutcome::SamePlayerIgnored => Disposition::Discard,
                MoveOutcome::TriggersWar => self.declare_war(mv).await,
            }
        }
    }
}

/// Resolves wars involving the local player and records the result.
pub struct WarHandler {
    game: GameHandle,
    publisher: Publisher,
}

impl WarHandler {
    pub fn new(game: GameHandle, publisher: Publisher) -> Self {
        Self { game, publisher }
    }
}

impl Handler<RecognitionOfWar> for WarHandler {
    fn handle(&self, war: RecognitionOfWar) -> impl Future<Output = Disposition> + Send {
        async move {
            let outcome = match self.game.apply_war(war).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, "war not applied");
                    return Disposition::RetryLater;
                }
            };

            let Some(message) = outcome.log_message() else {
                return Disposition::Discard;
            };
            if let Some(b) = outcome.battle() {
                tracing::info!(
                    attacker = %b.attacker,
                    defender = %b.defender,
                    location = %b.location,
                    attacker_power = b.attacker_power,
                    defender_power = b.defender_power,
                    "{message}"
                );
            }

            match self.publisher.game_log(message).await {
                Ok(()) => Disposition::Accept,
                Err(e) => {
                    tracing::warn!(error = %e, "publishing war log failed");
                    Disposition::RetryLater
                }
            }
        }
    }
}
