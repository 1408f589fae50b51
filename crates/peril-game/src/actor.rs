//! Game actor: the one task that owns a player's [`GameState`].
//!
//! Subscription workers and the command loop all reach the state through a
//! [`GameHandle`], so transitions never interleave.

use tokio::sync::{mpsc, oneshot};

use crate::{
    ArmyMove, CommandError, GameError, GameState, Location, MoveOutcome, PlayingState, Rank,
    RecognitionOfWar, Unit, WarOutcome,
};

enum GameCommand {
    Pause {
        state: PlayingState,
        reply: oneshot::Sender<()>,
    },
    Move {
        mv: ArmyMove,
        reply: oneshot::Sender<MoveOutcome>,
    },
    War {
        war: RecognitionOfWar,
        reply: oneshot::Sender<WarOutcome>,
    },
    IssueMove {
        to: Location,
        unit_ids: Vec<u32>,
        reply: oneshot::Sender<Result<ArmyMove, CommandError>>,
    },
    IssueSpawn {
        location: Location,
        rank: Rank,
        reply: oneshot::Sender<Result<Unit, CommandError>>,
    },
    Snapshot {
        reply: oneshot::Sender<GameState>,
    },
    Shutdown,
}

/// Handle to a running game actor. Cheap to clone.
#[derive(Clone)]
pub struct GameHandle {
    username: String,
    sender: mpsc::Sender<GameCommand>,
}

impl GameHandle {
    pub fn username(&self) -> &str {
        &self.username
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> GameCommand,
    ) -> Result<T, GameError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| self.unavailable())?;
        reply_rx.await.map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> GameError {
        GameError::Unavailable(self.username.clone())
    }

    pub async fn apply_pause(&self, state: PlayingState) -> Result<(), GameError> {
        self.call(|reply| GameCommand::Pause { state, reply }).await
    }

    pub async fn apply_move(&self, mv: ArmyMove) -> Result<MoveOutcome, GameError> {
        self.call(|reply| GameCommand::Move { mv, reply }).await
    }

    pub async fn apply_war(&self, war: RecognitionOfWar) -> Result<WarOutcome, GameError> {
        self.call(|reply| GameCommand::War { war, reply }).await
    }

    pub async fn issue_move(&self, to: Location, unit_ids: Vec<u32>) -> Result<ArmyMove, GameError> {
        let result = self
            .call(|reply| GameCommand::IssueMove {
                to,
                unit_ids,
                reply,
            })
            .await?;
        Ok(result?)
    }

    pub async fn issue_spawn(&self, location: Location, rank: Rank) -> Result<Unit, GameError> {
        let result = self
            .call(|reply| GameCommand::IssueSpawn {
                location,
                rank,
                reply,
            })
            .await?;
        Ok(result?)
    }

    /// A copy of the current state.
    pub async fn snapshot(&self) -> Result<GameState, GameError> {
        self.call(|reply| GameCommand::Snapshot { reply }).await
    }

    /// Stops the actor. Later calls on any clone fail with `Unavailable`.
    pub async fn shutdown(&self) -> Result<(), GameError> {
        self.sender
            .send(GameCommand::Shutdown)
            .await
            .map_err(|_| self.unavailable())
    }
}

struct GameActor {
    state: GameState,
    receiver: mpsc::Receiver<GameCommand>,
}

impl GameActor {
    async fn run(mut self) {
        tracing::debug!(player = %self.state.username(), "game actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                GameCommand::Pause { state, reply } => {
                    self.state.apply_pause(state);
                    tracing::info!(
                        player = %self.state.username(),
                        paused = state.is_paused,
                        "playing state changed"
                    );
                    let _ = reply.send(());
                }
                GameCommand::Move { mv, reply } => {
                    let outcome = self.state.apply_move(&mv);
                    tracing::debug!(
                        player = %self.state.username(),
                        mover = %mv.player.username,
                        to = %mv.to,
                        ?outcome,
                        "move applied"
                    );
                    let _ = reply.send(outcome);
                }
                GameCommand::War { war, reply } => {
                    let outcome = self.state.apply_war(&war);
                    tracing::debug!(
                        player = %self.state.username(),
                        attacker = %war.attacker.username,
                        defender = %war.defender.username,
                        ?outcome,
                        "war applied"
                    );
                    let _ = reply.send(outcome);
                }
                GameCommand::IssueMove {
                    to,
                    unit_ids,
                    reply,
                } => {
                    let _ = reply.send(self.state.issue_move(to, &unit_ids));
                }
                GameCommand::IssueSpawn {
                    location,
                    rank,
                    reply,
                } => {
                    let _ = reply.send(self.state.issue_spawn(location, rank));
                }
                GameCommand::Snapshot { reply } => {
                    let _ = reply.send(self.state.clone());
                }
                GameCommand::Shutdown => break,
            }
        }

        tracing::debug!(player = %self.state.username(), "game actor stopped");
    }
}

/// Spawns the actor task for `state` and returns its handle.
///
/// `channel_size` bounds the number of queued commands; callers wait when it
/// is full.
pub fn spawn_game(state: GameState, channel_size: usize) -> GameHandle {
    let (tx, rx) = mpsc::channel(channel_size.max(1));
    let username = state.username().to_string();

    tokio::spawn(
        GameActor {
            state,
            receiver: rx,
        }
        .run(),
    );

    GameHandle {
        username,
        sender: tx,
    }
}
