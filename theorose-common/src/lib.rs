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

//! Shared model and rules for the Theo vs Rose round game.
//!
//! Everything here is free of I/O: the per-game score and lifetime totals,
//! the pure round rules, and (in [`envelope`]) the versioned encoding the
//! round service persists inside a pinned chat message.

use std::{collections::BTreeMap, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

pub mod envelope;

/// Total points after which a game can end.
pub const ROUND_LIMIT: u32 = 12;
/// Round number used for the extra round played on a tie at [`ROUND_LIMIT`].
pub const TIEBREAKER_ROUND: u32 = 13;

/// Both players in display order.
pub const ALL_PLAYERS: [Player; 2] = [Player::Theo, Player::Rose];

pub type MessageId = u64;
pub type ChannelId = u64;
pub type UserId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Player {
    Theo,
    Rose,
}

impl Player {
    pub fn name(self) -> &'static str {
        match self {
            Player::Theo => "Theo",
            Player::Rose => "Rose",
        }
    }

    /// Reaction selector that votes for this player.
    pub fn selector(self) -> &'static str {
        match self {
            Player::Theo => "🕷",
            Player::Rose => "🌹",
        }
    }

    /// Maps a reaction selector back to a player. Platforms may append the
    /// emoji presentation selector (U+FE0F), which is ignored.
    pub fn from_selector(selector: &str) -> Option<Self> {
        let bare = selector.trim().trim_end_matches('\u{fe0f}');
        ALL_PLAYERS
            .into_iter()
            .find(|player| player.selector() == bare)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        ALL_PLAYERS
            .into_iter()
            .find(|player| player.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl std::fmt::Display for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Score and round bookkeeping for the game currently in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub game_id: u64,
    pub round: u32,
    pub theo_points: u32,
    pub rose_points: u32,
    /// The open round is the tie-break round.
    pub tiebreaker: bool,
    pub active: bool,
    pub round_open: bool,
    /// Prompt message of the open round; `None` whenever no round is open.
    pub round_message_id: Option<MessageId>,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            game_id: 1,
            round: 0,
            theo_points: 0,
            rose_points: 0,
            tiebreaker: false,
            active: true,
            round_open: false,
            round_message_id: None,
        }
    }
}

impl GameState {
    pub fn points(&self, player: Player) -> u32 {
        match player {
            Player::Theo => self.theo_points,
            Player::Rose => self.rose_points,
        }
    }

    pub fn award_point(&mut self, player: Player) {
        match player {
            Player::Theo => self.theo_points = self.theo_points.saturating_add(1),
            Player::Rose => self.rose_points = self.rose_points.saturating_add(1),
        }
    }

    /// True when a reaction on `message_id` would decide the open round.
    pub fn accepts_vote(&self, message_id: MessageId) -> bool {
        self.round_open && self.round_message_id == Some(message_id)
    }

    pub fn open_round(&mut self, round: u32, tiebreaker: bool, message_id: MessageId) {
        self.round = round;
        self.tiebreaker = tiebreaker;
        self.active = true;
        self.round_open = true;
        self.round_message_id = Some(message_id);
    }

    pub fn close_round(&mut self) {
        self.round_open = false;
        self.round_message_id = None;
    }

    /// Zeroes the score of the current game without changing its id.
    pub fn reset_scores(&mut self) {
        self.round = 0;
        self.theo_points = 0;
        self.rose_points = 0;
        self.tiebreaker = false;
        self.active = true;
        self.close_round();
    }

    /// Moves on to a fresh game with the next id.
    pub fn start_next_game(&mut self) {
        self.game_id = self.game_id.saturating_add(1);
        self.reset_scores();
    }

    pub fn next_round_number(&self) -> u32 {
        next_round_number(self.theo_points, self.rose_points)
    }

    pub fn outcome(&self) -> GameOutcome {
        is_game_over(self.theo_points, self.rose_points)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerTotals {
    pub points: u64,
    pub wins: u64,
}

/// Cross-game totals keyed by player name. Counters only ever grow.
///
/// Names that are not one of [`ALL_PLAYERS`] are kept as found so an older
/// blob never loses data on a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LifetimeStats {
    players: BTreeMap<String, PlayerTotals>,
}

impl Default for LifetimeStats {
    fn default() -> Self {
        let mut stats = Self {
            players: BTreeMap::new(),
        };
        stats.ensure_known_players();
        stats
    }
}

impl LifetimeStats {
    pub fn ensure_known_players(&mut self) {
        for player in ALL_PLAYERS {
            self.players.entry(player.name().to_string()).or_default();
        }
    }

    pub fn totals(&self, player: Player) -> PlayerTotals {
        self.players
            .get(player.name())
            .copied()
            .unwrap_or_default()
    }

    pub fn record_point(&mut self, player: Player) {
        let totals = self.players.entry(player.name().to_string()).or_default();
        totals.points = totals.points.saturating_add(1);
    }

    pub fn record_win(&mut self, player: Player) {
        let totals = self.players.entry(player.name().to_string()).or_default();
        totals.wins = totals.wins.saturating_add(1);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, PlayerTotals)> {
        self.players
            .iter()
            .map(|(name, totals)| (name.as_str(), *totals))
    }
}

impl FromIterator<(String, PlayerTotals)> for LifetimeStats {
    fn from_iter<I: IntoIterator<Item = (String, PlayerTotals)>>(iter: I) -> Self {
        let mut stats = Self {
            players: iter.into_iter().collect(),
        };
        stats.ensure_known_players();
        stats
    }
}

/// Result of checking a score against the round limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GameOutcome {
    pub over: bool,
    pub winner: Option<Player>,
    pub needs_tiebreak: bool,
}

impl GameOutcome {
    pub const IN_PROGRESS: Self = Self {
        over: false,
        winner: None,
        needs_tiebreak: false,
    };

    pub const TIEBREAK: Self = Self {
        over: false,
        winner: None,
        needs_tiebreak: true,
    };

    pub fn won_by(player: Player) -> Self {
        Self {
            over: true,
            winner: Some(player),
            needs_tiebreak: false,
        }
    }
}

pub fn next_round_number(theo_points: u32, rose_points: u32) -> u32 {
    theo_points.saturating_add(rose_points).saturating_add(1)
}

/// Decides whether a score ends the game.
///
/// A tie exactly at [`ROUND_LIMIT`] asks for a tie-break instead. A tie above
/// the limit has no defined policy and is reported as still in progress.
pub fn is_game_over(theo_points: u32, rose_points: u32) -> GameOutcome {
    let total = theo_points.saturating_add(rose_points);
    if total < ROUND_LIMIT {
        return GameOutcome::IN_PROGRESS;
    }
    if total == ROUND_LIMIT && theo_points == rose_points {
        return GameOutcome::TIEBREAK;
    }
    if theo_points != rose_points {
        let winner = if theo_points > rose_points {
            Player::Theo
        } else {
            Player::Rose
        };
        return GameOutcome::won_by(winner);
    }
    GameOutcome::IN_PROGRESS
}

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var pattern is valid")
});

/// Replace `${VAR_NAME}` patterns in a string with values from environment variables.
/// Unknown or unset variables are replaced with an empty string.
pub fn expand_env_vars(input: &str) -> String {
    ENV_VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}
