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

//! Versioned text encoding of the game state.
//!
//! A blob is a marker token followed by the payload of that schema version.
//! The marker lets the round service find its blob among unrelated channel
//! messages. Older versions are decoded with their own wire types and then
//! upgraded one step at a time; encoding always emits [`SchemaVersion::LATEST`].

use std::{collections::BTreeMap, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{GameState, LifetimeStats, MessageId, PlayerTotals};

/// Common prefix of every version marker.
pub const MARKER_PREFIX: &str = "[theo-vs-rose:state";
/// Hard ceiling the chat platform puts on one message body.
pub const MESSAGE_CHAR_LIMIT: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SchemaVersion {
    /// Long field names inside a fenced code block.
    V1,
    /// Abbreviated keys, inline JSON.
    V2,
}

impl SchemaVersion {
    pub const LATEST: Self = Self::V2;

    const NEWEST_FIRST: [Self; 2] = [Self::V2, Self::V1];

    pub fn marker(self) -> &'static str {
        match self {
            Self::V1 => "[theo-vs-rose:state:v1]",
            Self::V2 => "[theo-vs-rose:state:v2]",
        }
    }

    pub fn detect(content: &str) -> Option<Self> {
        Self::NEWEST_FIRST
            .into_iter()
            .find(|version| content.contains(version.marker()))
    }
}

/// Everything persisted: the current game plus lifetime totals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub state: GameState,
    pub lifetime: LifetimeStats,
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("no state marker found in blob")]
    MissingMarker,
    #[error("{version:?} blob has no payload after its marker")]
    MissingPayload { version: SchemaVersion },
    #[error("malformed {version:?} payload: {source}")]
    Malformed {
        version: SchemaVersion,
        #[source]
        source: serde_json::Error,
    },
    #[error("encoded blob is {len} characters, above the {limit} character limit")]
    TooLarge { len: usize, limit: usize },
    #[error("failed to encode blob: {0}")]
    Encode(#[from] serde_json::Error),
}

pub fn contains_marker(content: &str) -> bool {
    content.contains(MARKER_PREFIX)
}

pub fn encode(envelope: &Envelope) -> Result<String, EnvelopeError> {
    let payload = serde_json::to_string(&EnvelopeV2::from(envelope))?;
    let blob = format!("{} {payload}", SchemaVersion::LATEST.marker());
    let len = blob.chars().count();
    if len > MESSAGE_CHAR_LIMIT {
        return Err(EnvelopeError::TooLarge {
            len,
            limit: MESSAGE_CHAR_LIMIT,
        });
    }
    Ok(blob)
}

/// Decodes a blob of any known version into the current in-memory form.
pub fn decode(content: &str) -> Result<(Envelope, SchemaVersion), EnvelopeError> {
    let version = SchemaVersion::detect(content).ok_or(EnvelopeError::MissingMarker)?;
    let Some((_, payload)) = content.split_once(version.marker()) else {
        return Err(EnvelopeError::MissingMarker);
    };

    let current = match version {
        SchemaVersion::V1 => EnvelopeV2::from(decode_v1(payload)?),
        SchemaVersion::V2 => decode_v2(payload)?,
    };
    Ok((current.into(), version))
}

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").expect("fenced block pattern is valid")
});

fn decode_v1(payload: &str) -> Result<EnvelopeV1, EnvelopeError> {
    let version = SchemaVersion::V1;
    let captures = FENCED_JSON
        .captures(payload)
        .ok_or(EnvelopeError::MissingPayload { version })?;
    serde_json::from_str(&captures[1])
        .map_err(|source| EnvelopeError::Malformed { version, source })
}

fn decode_v2(payload: &str) -> Result<EnvelopeV2, EnvelopeError> {
    let version = SchemaVersion::V2;
    // Anything after the JSON object is not ours.
    let mut values =
        serde_json::Deserializer::from_str(payload.trim_start()).into_iter::<EnvelopeV2>();
    match values.next() {
        Some(Ok(envelope)) => Ok(envelope),
        Some(Err(source)) => Err(EnvelopeError::Malformed { version, source }),
        None => Err(EnvelopeError::MissingPayload { version }),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct StateV2 {
    #[serde(rename = "gid")]
    game_id: u64,
    #[serde(rename = "r")]
    round: u32,
    #[serde(rename = "tp")]
    theo_points: u32,
    #[serde(rename = "rp")]
    rose_points: u32,
    #[serde(rename = "tb")]
    tiebreaker: bool,
    #[serde(rename = "a")]
    active: bool,
    #[serde(rename = "ro")]
    round_open: bool,
    #[serde(rename = "rm")]
    round_message_id: Option<MessageId>,
}

impl Default for StateV2 {
    fn default() -> Self {
        GameState::default().into()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
struct TotalsV2 {
    #[serde(rename = "p")]
    points: u64,
    #[serde(rename = "w")]
    wins: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EnvelopeV2 {
    s: StateV2,
    #[serde(default)]
    lt: BTreeMap<String, TotalsV2>,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(test, derive(Serialize))]
#[serde(default)]
struct StateV1 {
    game_id: u64,
    round: u32,
    theo_points: u32,
    rose_points: u32,
    tiebreaker: bool,
    active: bool,
    round_open: bool,
    round_message_id: Option<MessageId>,
}

impl Default for StateV1 {
    fn default() -> Self {
        let state = GameState::default();
        Self {
            game_id: state.game_id,
            round: state.round,
            theo_points: state.theo_points,
            rose_points: state.rose_points,
            tiebreaker: state.tiebreaker,
            active: state.active,
            round_open: state.round_open,
            round_message_id: state.round_message_id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[cfg_attr(test, derive(Serialize))]
#[serde(default)]
struct TotalsV1 {
    points: u64,
    wins: u64,
}

/// Previous layout. Unknown keys such as the old reaction `log` are skipped.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(test, derive(Serialize))]
#[serde(default)]
struct EnvelopeV1 {
    state: StateV1,
    lifetime: BTreeMap<String, TotalsV1>,
}

impl From<EnvelopeV1> for EnvelopeV2 {
    fn from(old: EnvelopeV1) -> Self {
        let s = old.state;
        Self {
            s: StateV2 {
                game_id: s.game_id,
                round: s.round,
                theo_points: s.theo_points,
                rose_points: s.rose_points,
                tiebreaker: s.tiebreaker,
                active: s.active,
                round_open: s.round_open,
                round_message_id: s.round_message_id,
            },
            lt: old
                .lifetime
                .into_iter()
                .map(|(name, totals)| {
                    (
                        name,
                        TotalsV2 {
                            points: totals.points,
                            wins: totals.wins,
                        },
                    )
                })
                .collect(),
        }
    }
}

impl From<GameState> for StateV2 {
    fn from(state: GameState) -> Self {
        Self {
            game_id: state.game_id,
            round: state.round,
            theo_points: state.theo_points,
            rose_points: state.rose_points,
            tiebreaker: state.tiebreaker,
            active: state.active,
            round_open: state.round_open,
            round_message_id: state.round_message_id,
        }
    }
}

impl From<&Envelope> for EnvelopeV2 {
    fn from(envelope: &Envelope) -> Self {
        Self {
            s: envelope.state.clone().into(),
            lt: envelope
                .lifetime
                .iter()
                .map(|(name, totals)| {
                    (
                        name.to_string(),
                        TotalsV2 {
                            points: totals.points,
                            wins: totals.wins,
                        },
                    )
                })
                .collect(),
        }
    }
}

impl From<EnvelopeV2> for Envelope {
    fn from(wire: EnvelopeV2) -> Self {
        let s = wire.s;
        Self {
            state: GameState {
                game_id: s.game_id,
                round: s.round,
                theo_points: s.theo_points,
                rose_points: s.rose_points,
                tiebreaker: s.tiebreaker,
                active: s.active,
                round_open: s.round_open,
                round_message_id: s.round_message_id,
            },
            lifetime: wire
                .lt
                .into_iter()
                .map(|(name, totals)| {
                    (
                        name,
                        PlayerTotals {
                            points: totals.points,
                            wins: totals.wins,
                        },
                    )
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Player;
    use pretty_assertions::assert_eq;

    fn sample() -> Envelope {
        let mut lifetime = LifetimeStats::default();
        for _ in 0..41 {
            lifetime.record_point(Player::Theo);
        }
        for _ in 0..38 {
            lifetime.record_point(Player::Rose);
        }
        lifetime.record_win(Player::Theo);
        lifetime.record_win(Player::Theo);
        lifetime.record_win(Player::Rose);

        Envelope {
            state: GameState {
                game_id: 4,
                round: 8,
                theo_points: 4,
                rose_points: 3,
                tiebreaker: false,
                active: true,
                round_open: true,
                round_message_id: Some(1_187_654_321_098_765_432),
            },
            lifetime,
        }
    }

    fn encode_v1(envelope: &Envelope) -> String {
        let s = &envelope.state;
        let old = EnvelopeV1 {
            state: StateV1 {
                game_id: s.game_id,
                round: s.round,
                theo_points: s.theo_points,
                rose_points: s.rose_points,
                tiebreaker: s.tiebreaker,
                active: s.active,
                round_open: s.round_open,
                round_message_id: s.round_message_id,
            },
            lifetime: envelope
                .lifetime
                .iter()
                .map(|(name, totals)| {
                    (
                        name.to_string(),
                        TotalsV1 {
                            points: totals.points,
                            wins: totals.wins,
                        },
                    )
                })
                .collect(),
        };
        let body = serde_json::to_string_pretty(&old).unwrap();
        format!("{}\n```json\n{body}\n```", SchemaVersion::V1.marker())
    }

    #[test]
    fn current_version_round_trips() {
        let envelope = sample();
        let blob = encode(&envelope).unwrap();
        assert!(blob.starts_with(SchemaVersion::V2.marker()));
        assert!(contains_marker(&blob));

        let (decoded, version) = decode(&blob).unwrap();
        assert_eq!(version, SchemaVersion::V2);
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn current_version_uses_short_keys() {
        let blob = encode(&Envelope::default()).unwrap();
        assert_eq!(
            blob,
            "[theo-vs-rose:state:v2] {\"s\":{\"gid\":1,\"r\":0,\"tp\":0,\"rp\":0,\"tb\":false,\
             \"a\":true,\"ro\":false,\"rm\":null},\"lt\":{\"Rose\":{\"p\":0,\"w\":0},\
             \"Theo\":{\"p\":0,\"w\":0}}}"
        );
    }

    #[test]
    fn previous_version_upgrades_to_same_values() {
        let envelope = sample();
        let blob = encode_v1(&envelope);
        assert!(blob.contains("\"theo_points\": 4"));

        let (decoded, version) = decode(&blob).unwrap();
        assert_eq!(version, SchemaVersion::V1);
        assert_eq!(decoded, envelope);

        let (again, version) = decode(&encode(&decoded).unwrap()).unwrap();
        assert_eq!(version, SchemaVersion::V2);
        assert_eq!(again, envelope);
    }

    #[test]
    fn previous_version_tolerates_log_and_missing_fields() {
        let blob = "[theo-vs-rose:state:v1]\n```json\n{\
            \"state\": {\"game_id\": 3, \"theo_points\": 2},\
            \"log\": [{\"player\": \"Theo\", \"delta\": 1}],\
            \"lifetime\": {\"Theo\": {\"points\": 9}}\
            }\n```";

        let (decoded, _) = decode(blob).unwrap();
        assert_eq!(decoded.state.game_id, 3);
        assert_eq!(decoded.state.theo_points, 2);
        assert_eq!(decoded.state.rose_points, 0);
        assert!(decoded.state.active);
        assert_eq!(decoded.state.round_message_id, None);
        assert_eq!(
            decoded.lifetime.totals(Player::Theo),
            PlayerTotals { points: 9, wins: 0 }
        );
        assert_eq!(decoded.lifetime.totals(Player::Rose), PlayerTotals::default());
    }

    #[test]
    fn text_around_the_blob_is_ignored() {
        let blob = format!(
            "Scoreboard storage, do not edit.\n{}\n(pinned by the bot)",
            encode(&sample()).unwrap()
        );
        let (decoded, _) = decode(&blob).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn unknown_player_names_survive_a_round_trip() {
        let blob = "[theo-vs-rose:state:v2] {\"s\":{\"gid\":2},\"lt\":{\"Guest\":{\"p\":3,\"w\":1}}}";
        let (decoded, _) = decode(blob).unwrap();
        let (again, _) = decode(&encode(&decoded).unwrap()).unwrap();
        let names: Vec<&str> = again.lifetime.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Guest", "Rose", "Theo"]);
    }

    #[test]
    fn corrupt_payloads_are_errors() {
        assert!(matches!(
            decode("just chatting"),
            Err(EnvelopeError::MissingMarker)
        ));
        assert!(matches!(
            decode("[theo-vs-rose:state:v2] {\"s\":{\"gid\":\"one\"}"),
            Err(EnvelopeError::Malformed {
                version: SchemaVersion::V2,
                ..
            })
        ));
        assert!(matches!(
            decode("[theo-vs-rose:state:v2]"),
            Err(EnvelopeError::MissingPayload {
                version: SchemaVersion::V2
            })
        ));
        assert!(matches!(
            decode("[theo-vs-rose:state:v1] no code block here"),
            Err(EnvelopeError::MissingPayload {
                version: SchemaVersion::V1
            })
        ));
    }

    #[test]
    fn oversize_blobs_are_refused() {
        let lifetime: LifetimeStats = (0..200)
            .map(|index| (format!("player-{index:04}"), PlayerTotals::default()))
            .collect();
        let envelope = Envelope {
            state: GameState::default(),
            lifetime,
        };
        assert!(matches!(
            encode(&envelope),
            Err(EnvelopeError::TooLarge {
                limit: MESSAGE_CHAR_LIMIT,
                ..
            })
        ));
    }
}
