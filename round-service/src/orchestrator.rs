// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Round lifecycle: open a prompt, score the first qualifying reaction,
//! then open the next round, a tie-break, or a new game.

use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use theorose_common::{
    ALL_PLAYERS, ChannelId, GameOutcome, GameState, MessageId, Player, TIEBREAKER_ROUND, UserId,
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{platform::ChatPlatform, store::StateStore};

/// A reaction added to some message in a channel the service can see.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReactionEvent {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub selector: String,
    pub user_id: UserId,
    #[serde(default)]
    pub is_self: bool,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IgnoreReason {
    SelfReaction,
    UnknownSelector,
    NoOpenRound,
    NotRoundMessage,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NextStep {
    Round {
        round: u32,
    },
    Tiebreak {
        round: u32,
    },
    GameOver {
        winner: Player,
        theo_points: u32,
        rose_points: u32,
        next_game_id: u64,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReactionOutcome {
    Ignored {
        reason: IgnoreReason,
    },
    Scored {
        player: Player,
        round: u32,
        theo_points: u32,
        rose_points: u32,
        next: NextStep,
    },
}

pub struct RoundOrchestrator {
    store: Arc<StateStore>,
    platform: Arc<dyn ChatPlatform>,
    announce_channel: RwLock<Option<ChannelId>>,
}

impl RoundOrchestrator {
    pub fn new(
        store: Arc<StateStore>,
        platform: Arc<dyn ChatPlatform>,
        announce_channel: Option<ChannelId>,
    ) -> Self {
        Self {
            store,
            platform,
            announce_channel: RwLock::new(announce_channel),
        }
    }

    pub async fn set_announce_channel(&self, channel_id: ChannelId) {
        *self.announce_channel.write().await = Some(channel_id);
        info!(channel_id, "announcement channel changed");
    }

    pub async fn announce_channel(&self) -> Option<ChannelId> {
        *self.announce_channel.read().await
    }

    /// Posts a round prompt in `channel_id` and records it as the open round.
    pub async fn open_round(
        &self,
        channel_id: ChannelId,
        round: u32,
        tiebreaker: bool,
    ) -> anyhow::Result<MessageId> {
        let content = prompt_text(round, tiebreaker);
        let message_id = self
            .platform
            .send_message(channel_id, &content)
            .await
            .context("failed to post round prompt")?;

        for player in ALL_PLAYERS {
            if let Err(error) = self
                .platform
                .add_reaction(channel_id, message_id, player.selector())
                .await
            {
                warn!(message_id, player = %player, error = %error, "failed to add vote reaction");
            }
        }

        let (envelope, ()) = self
            .store
            .update(|state, _| state.open_round(round, tiebreaker, message_id))
            .await?;
        info!(
            game_id = envelope.state.game_id,
            round,
            tiebreaker,
            channel_id,
            message_id,
            "round opened"
        );
        Ok(message_id)
    }

    /// Scores the open round if `event` is its first qualifying reaction.
    pub async fn on_reaction(&self, event: &ReactionEvent) -> anyhow::Result<ReactionOutcome> {
        if event.is_self {
            return Ok(ReactionOutcome::Ignored {
                reason: IgnoreReason::SelfReaction,
            });
        }
        let Some(player) = Player::from_selector(&event.selector) else {
            debug!(
                selector = %event.selector,
                message_id = event.message_id,
                "ignoring unrelated reaction"
            );
            return Ok(ReactionOutcome::Ignored {
                reason: IgnoreReason::UnknownSelector,
            });
        };

        let (envelope, decision) = self
            .store
            .try_update(|state, lifetime| {
                if !state.round_open {
                    return Err(IgnoreReason::NoOpenRound);
                }
                if !state.accepts_vote(event.message_id) {
                    return Err(IgnoreReason::NotRoundMessage);
                }
                let round = state.round;
                state.award_point(player);
                lifetime.record_point(player);
                state.close_round();
                let decided = state.clone();
                if let GameOutcome {
                    over: true,
                    winner: Some(winner),
                    ..
                } = decided.outcome()
                {
                    lifetime.record_win(winner);
                    state.start_next_game();
                }
                Ok((round, decided))
            })
            .await?;

        let (round, state) = match decision {
            Ok(decided) => decided,
            Err(reason) => {
                debug!(message_id = event.message_id, ?reason, "reaction does not decide a round");
                return Ok(ReactionOutcome::Ignored { reason });
            }
        };

        info!(
            game_id = state.game_id,
            round,
            player = %player,
            user_id = event.user_id,
            channel_id = event.channel_id,
            message_id = event.message_id,
            selector = %event.selector,
            theo_points = state.theo_points,
            rose_points = state.rose_points,
            "round decided by reaction"
        );

        self.close_prompt(event.channel_id, event.message_id, round, player, &state)
            .await;
        let next = self
            .advance(event.channel_id, &state, &envelope.state)
            .await?;

        Ok(ReactionOutcome::Scored {
            player,
            round,
            theo_points: state.theo_points,
            rose_points: state.rose_points,
            next,
        })
    }

    /// Announces what follows the closed round and opens the next prompt.
    ///
    /// `state` is the score as the round closed it; `current` is what the
    /// store holds now, which is already the next game when `state` ended one.
    pub async fn advance(
        &self,
        channel_id: ChannelId,
        state: &GameState,
        current: &GameState,
    ) -> anyhow::Result<NextStep> {
        match state.outcome() {
            GameOutcome {
                needs_tiebreak: true,
                ..
            } => {
                self.announce(
                    channel_id,
                    &format!(
                        "Tied {}-{} after {} rounds! Round {TIEBREAKER_ROUND} decides game {}.",
                        state.theo_points,
                        state.rose_points,
                        state.theo_points.saturating_add(state.rose_points),
                        state.game_id
                    ),
                )
                .await;
                self.open_round(channel_id, TIEBREAKER_ROUND, true).await?;
                Ok(NextStep::Tiebreak {
                    round: TIEBREAKER_ROUND,
                })
            }
            GameOutcome {
                over: true,
                winner: Some(winner),
                ..
            } => {
                info!(
                    game_id = state.game_id,
                    winner = %winner,
                    theo_points = state.theo_points,
                    rose_points = state.rose_points,
                    next_game_id = current.game_id,
                    "game finished"
                );
                self.announce(
                    channel_id,
                    &format!(
                        "🏆 **{winner} wins game {}!** Final score: Theo {} - Rose {}",
                        state.game_id, state.theo_points, state.rose_points
                    ),
                )
                .await;
                self.open_round(channel_id, current.next_round_number(), false)
                    .await?;
                Ok(NextStep::GameOver {
                    winner,
                    theo_points: state.theo_points,
                    rose_points: state.rose_points,
                    next_game_id: current.game_id,
                })
            }
            _ => {
                let round = state.next_round_number();
                self.open_round(channel_id, round, false).await?;
                Ok(NextStep::Round { round })
            }
        }
    }

    /// Opens the next round on demand, whether or not one is already open.
    pub async fn force_new_round(&self, channel_id: ChannelId) -> anyhow::Result<u32> {
        let mut state = self.store.load().await?.state;
        if !state.active {
            let (envelope, ()) = self.store.update(|state, _| state.reset_scores()).await?;
            state = envelope.state;
        }
        if let Some(message_id) = state.round_message_id.filter(|_| state.round_open) {
            warn!(
                game_id = state.game_id,
                round = state.round,
                message_id,
                "opening a new round while the previous prompt is still open"
            );
        }

        let round = state.next_round_number();
        self.open_round(channel_id, round, false).await?;
        Ok(round)
    }

    /// Zeroes the current game. Lifetime totals are untouched.
    pub async fn reset(&self) -> anyhow::Result<GameState> {
        let (envelope, ()) = self.store.update(|state, _| state.reset_scores()).await?;
        info!(game_id = envelope.state.game_id, "current game reset");
        Ok(envelope.state)
    }

    pub async fn score_summary(&self) -> anyhow::Result<String> {
        let envelope = self.store.load().await?;
        let state = &envelope.state;
        let round_label = if state.tiebreaker {
            format!("tie-break round {}", state.round)
        } else {
            format!("round {}", state.round)
        };
        let status = if state.round_open { "open" } else { "closed" };

        let mut lines = vec![
            format!("**Game {}**, {round_label} ({status})", state.game_id),
            format!(
                "Theo {} - Rose {}",
                state.points(Player::Theo),
                state.points(Player::Rose)
            ),
            String::new(),
        ];
        lines.extend(lifetime_lines(&envelope.lifetime));
        Ok(lines.join("\n"))
    }

    pub async fn lifetime_summary(&self) -> anyhow::Result<String> {
        let envelope = self.store.load().await?;
        Ok(lifetime_lines(&envelope.lifetime).join("\n"))
    }

    async fn close_prompt(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        round: u32,
        player: Player,
        state: &GameState,
    ) {
        let content = format!(
            "**Round {round} closed.** Point to {player}. Theo {} - Rose {}",
            state.theo_points, state.rose_points
        );
        if let Err(error) = self
            .platform
            .edit_message(channel_id, message_id, &content)
            .await
        {
            warn!(message_id, error = %error, "failed to mark round prompt closed");
        }
        if let Err(error) = self.platform.clear_reactions(channel_id, message_id).await {
            warn!(message_id, error = %error, "failed to strip vote reactions");
        }
    }

    async fn announce(&self, fallback_channel: ChannelId, content: &str) {
        let channel_id = self.announce_channel().await.unwrap_or(fallback_channel);
        if let Err(error) = self.platform.send_message(channel_id, content).await {
            warn!(channel_id, error = %error, "failed to announce");
        }
    }
}

fn prompt_text(round: u32, tiebreaker: bool) -> String {
    let prompt = format!(
        "**Round {round} winner: react with {} for Theo or {} for Rose!**",
        Player::Theo.selector(),
        Player::Rose.selector()
    );
    if tiebreaker {
        format!("🔥 **Tie detected! Round {round} decides the winner!** 🔥\n{prompt}")
    } else {
        prompt
    }
}

fn lifetime_lines(lifetime: &theorose_common::LifetimeStats) -> Vec<String> {
    let mut entries: Vec<_> = lifetime.iter().collect();
    entries.sort_by(|(a_name, a), (b_name, b)| {
        b.wins
            .cmp(&a.wins)
            .then(b.points.cmp(&a.points))
            .then(a_name.cmp(b_name))
    });

    let mut lines = vec!["**Lifetime standings**".to_string()];
    lines.extend(entries.into_iter().map(|(name, totals)| {
        format!("{name}: {} wins, {} points", totals.wins, totals.points)
    }));
    lines
}
