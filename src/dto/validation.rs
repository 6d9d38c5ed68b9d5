//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::dto::game::{GameState, TIE_SENTINEL};

/// Validates that a winner is only recorded once a match has been started.
///
/// # Examples
///
/// ```ignore
/// // started = false, winner = None        -> Ok
/// // started = true,  winner = Some("A")   -> Ok
/// // started = false, winner = Some("A")   -> Err
/// ```
pub fn validate_winner_requires_start(state: &GameState) -> Result<(), ValidationError> {
    if state.winner.is_some() && !state.started {
        let mut err = ValidationError::new("winner_without_start");
        err.message = Some("A winner can only be set once the game has started".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a recorded winner names one of the two teams or the tie sentinel.
pub fn validate_winner_is_known(state: &GameState) -> Result<(), ValidationError> {
    let Some(winner) = state.winner.as_deref() else {
        return Ok(());
    };
    let names = &state.team_names;
    if winner == TIE_SENTINEL || winner == names.team_a || winner == names.team_b {
        return Ok(());
    }

    let mut err = ValidationError::new("unknown_winner");
    err.message = Some(format!("`{winner}` is neither a team nor a tie").into());
    Err(err)
}

/// Schema-level checks on the winner field.
pub fn validate_winner(state: &GameState) -> Result<(), ValidationError> {
    validate_winner_requires_start(state)?;
    validate_winner_is_known(state)
}
