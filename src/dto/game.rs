//! The replicated scoreboard document and the pure helpers that mutate it.
//!
//! [`GameState`] is always exchanged as a whole: every write is a full-document
//! overwrite and the last accepted write wins.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use validator::Validate;

use crate::dto::validation::validate_winner;

/// Winner label recorded when both teams finish with the same score.
pub const TIE_SENTINEL: &str = "It's a Tie!";

/// Identifies one of the two competing teams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum Team {
    /// Left-hand team (`teamA` on the wire).
    TeamA,
    /// Right-hand team (`teamB` on the wire).
    TeamB,
}

/// Display labels for both teams, empty until a game starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct TeamNames {
    pub team_a: String,
    pub team_b: String,
}

/// Current score of each team.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct Scores {
    #[validate(range(min = 0))]
    pub team_a: i64,
    #[validate(range(min = 0))]
    pub team_b: i64,
}

/// Full scoreboard document replicated between the relay and every client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase", default)]
#[validate(schema(function = "validate_winner"))]
pub struct GameState {
    /// Whether a match is in progress.
    #[serde(rename = "gameStarted")]
    pub started: bool,
    pub team_names: TeamNames,
    #[validate(nested)]
    pub scores: Scores,
    /// Name of the winning team, or [`TIE_SENTINEL`], once the match is concluded.
    pub winner: Option<String>,
}

/// Preconditions rejected by the domain helpers on [`GameState`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    /// Both team names are required to start a game.
    #[error("team name for {0:?} must not be empty")]
    EmptyTeamName(Team),
    /// A winner can only be declared for a game in progress.
    #[error("game has not been started")]
    NotStarted,
}

impl GameState {
    /// Score currently held by `team`.
    pub fn score(&self, team: Team) -> i64 {
        match team {
            Team::TeamA => self.scores.team_a,
            Team::TeamB => self.scores.team_b,
        }
    }

    /// Display name of `team`.
    pub fn team_name(&self, team: Team) -> &str {
        match team {
            Team::TeamA => &self.team_names.team_a,
            Team::TeamB => &self.team_names.team_b,
        }
    }

    /// Start a match with the given team names, keeping the current scores.
    pub fn start_game(&self, team_a: &str, team_b: &str) -> Result<Self, GameError> {
        let team_a = team_a.trim();
        let team_b = team_b.trim();
        if team_a.is_empty() {
            return Err(GameError::EmptyTeamName(Team::TeamA));
        }
        if team_b.is_empty() {
            return Err(GameError::EmptyTeamName(Team::TeamB));
        }

        Ok(Self {
            started: true,
            team_names: TeamNames {
                team_a: team_a.to_string(),
                team_b: team_b.to_string(),
            },
            scores: self.scores,
            winner: None,
        })
    }

    /// Add `delta` points to `team`, clamping the result at zero.
    pub fn update_score(&self, team: Team, delta: i64) -> Self {
        let mut next = self.clone();
        let slot = match team {
            Team::TeamA => &mut next.scores.team_a,
            Team::TeamB => &mut next.scores.team_b,
        };
        *slot = slot.saturating_add(delta).max(0);
        next
    }

    /// Conclude the match, recording the leading team's name or [`TIE_SENTINEL`].
    pub fn declare_winner(&self) -> Result<Self, GameError> {
        if !self.started {
            return Err(GameError::NotStarted);
        }

        let winner = match self.scores.team_a.cmp(&self.scores.team_b) {
            std::cmp::Ordering::Greater => self.team_names.team_a.clone(),
            std::cmp::Ordering::Less => self.team_names.team_b.clone(),
            std::cmp::Ordering::Equal => TIE_SENTINEL.to_string(),
        };

        Ok(Self {
            winner: Some(winner),
            ..self.clone()
        })
    }

    /// Reset to the zero-state used for the next match.
    pub fn next_game(&self) -> Self {
        Self::default()
    }

    /// True when the concluded match ended in a tie.
    pub fn is_tie(&self) -> bool {
        self.winner.as_deref() == Some(TIE_SENTINEL)
    }
}

/// Acknowledgement returned by `POST /api/game`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UpdateAck {
    pub success: bool,
}

impl UpdateAck {
    /// Acknowledge a successfully stored update.
    pub fn ok() -> Self {
        Self { success: true }
    }
}
