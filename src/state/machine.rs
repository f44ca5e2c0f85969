//! Lobby lifecycle transitions: `waiting → playing → finished → waiting`.

use std::time::SystemTime;

use thiserror::Error;

use crate::state::lobby::{Lobby, LobbyStatus, PlayerStatus, RankingEntry, RoundState};

/// Events that drive the lobby lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    /// Host starts the round from the waiting state.
    Start,
    /// The last player finished; the round is over.
    Complete,
    /// Host resets a finished lobby back to waiting.
    Restart,
}

/// Error returned when an event cannot be applied in the current status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// Status the lobby was in when the event arrived.
    pub from: LobbyStatus,
    /// Rejected event.
    pub event: GameEvent,
}

/// Reasons a lifecycle operation was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The event is illegal in the current status.
    #[error(transparent)]
    Invalid(#[from] InvalidTransition),
    /// Starting requires every member to be ready.
    #[error("cannot start: not every player is ready")]
    NotAllReady,
    /// Starting requires at least one member.
    #[error("cannot start an empty lobby")]
    EmptyLobby,
}

/// Compute the status an event would move the lobby to, without applying it.
pub fn compute_transition(
    from: LobbyStatus,
    event: GameEvent,
) -> Result<LobbyStatus, InvalidTransition> {
    match (from, event) {
        (LobbyStatus::Waiting, GameEvent::Start) => Ok(LobbyStatus::Playing),
        (LobbyStatus::Playing, GameEvent::Complete) => Ok(LobbyStatus::Finished),
        (LobbyStatus::Finished, GameEvent::Restart) => Ok(LobbyStatus::Waiting),
        (from, event) => Err(InvalidTransition { from, event }),
    }
}

/// Move a waiting lobby into a round.
///
/// Requires at least one member and every member ready (the host included —
/// readiness is always explicit). On success every accumulator is zeroed,
/// every member becomes `playing`, and the settings are frozen into the
/// round state.
pub fn start_round(lobby: &mut Lobby, now: SystemTime) -> Result<(), TransitionError> {
    let next = compute_transition(lobby.status, GameEvent::Start)?;

    if lobby.players.is_empty() {
        return Err(TransitionError::EmptyLobby);
    }
    if !lobby.all_ready() {
        return Err(TransitionError::NotAllReady);
    }

    for player in lobby.players.values_mut() {
        player.reset_round(PlayerStatus::Playing);
    }
    lobby.round = Some(RoundState {
        started_at: now,
        settings: lobby.settings.clone(),
    });
    lobby.status = next;
    Ok(())
}

/// Terminal check evaluated after every progress update: when every member
/// finished, the lobby moves to `finished` and the final rankings are
/// computed. Returns `None` while the round is still running or the lobby is
/// not playing.
pub fn check_completion(lobby: &mut Lobby) -> Option<Vec<RankingEntry>> {
    if lobby.status != LobbyStatus::Playing || !lobby.all_finished() {
        return None;
    }

    lobby.status = LobbyStatus::Finished;
    Some(lobby.rankings())
}

/// Reset a finished lobby back to waiting: round data cleared, every member
/// back to `joined` with zeroed accumulators.
pub fn restart_round(lobby: &mut Lobby) -> Result<(), TransitionError> {
    let next = compute_transition(lobby.status, GameEvent::Restart)?;

    for player in lobby.players.values_mut() {
        player.reset_round(PlayerStatus::Joined);
    }
    lobby.round = None;
    lobby.status = next;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::lobby::LobbySettings;
    use uuid::Uuid;

    fn settings() -> LobbySettings {
        LobbySettings {
            regions: vec!["world".into()],
            question_count: 2,
            max_players: 8,
        }
    }

    fn ready_lobby(members: usize) -> Lobby {
        let host = Uuid::new_v4();
        let mut lobby = Lobby::new("ABCDEF".into(), host, "host", settings());
        for index in 1..members {
            lobby.add_player(Uuid::new_v4(), format!("p{index}"));
        }
        for player in lobby.players.values_mut() {
            player.status = PlayerStatus::Ready;
        }
        lobby
    }

    #[test]
    fn only_the_three_documented_transitions_are_legal() {
        assert!(compute_transition(LobbyStatus::Waiting, GameEvent::Start).is_ok());
        assert!(compute_transition(LobbyStatus::Playing, GameEvent::Complete).is_ok());
        assert!(compute_transition(LobbyStatus::Finished, GameEvent::Restart).is_ok());

        assert!(compute_transition(LobbyStatus::Playing, GameEvent::Start).is_err());
        assert!(compute_transition(LobbyStatus::Finished, GameEvent::Start).is_err());
        assert!(compute_transition(LobbyStatus::Waiting, GameEvent::Complete).is_err());
        assert!(compute_transition(LobbyStatus::Waiting, GameEvent::Restart).is_err());
    }

    #[test]
    fn start_requires_everyone_ready() {
        let mut lobby = ready_lobby(2);
        let laggard = *lobby.players.keys().last().unwrap();
        lobby.players[&laggard].status = PlayerStatus::Joined;

        assert_eq!(
            start_round(&mut lobby, SystemTime::now()),
            Err(TransitionError::NotAllReady)
        );
        assert_eq!(lobby.status, LobbyStatus::Waiting);
        assert!(lobby.round.is_none());
    }

    #[test]
    fn start_freezes_settings_and_resets_players() {
        let mut lobby = ready_lobby(2);
        start_round(&mut lobby, SystemTime::now()).unwrap();

        assert_eq!(lobby.status, LobbyStatus::Playing);
        let round = lobby.round.as_ref().expect("round present while playing");
        assert_eq!(round.settings, lobby.settings);
        for player in lobby.players.values() {
            assert_eq!(player.status, PlayerStatus::Playing);
            assert_eq!(player.score, 0);
            assert_eq!(player.progress, 0.0);
        }
    }

    #[test]
    fn solo_lobby_can_start() {
        let mut lobby = ready_lobby(1);
        assert!(start_round(&mut lobby, SystemTime::now()).is_ok());
        assert_eq!(lobby.status, LobbyStatus::Playing);
    }

    #[test]
    fn double_start_is_a_state_conflict() {
        let mut lobby = ready_lobby(1);
        start_round(&mut lobby, SystemTime::now()).unwrap();

        let err = start_round(&mut lobby, SystemTime::now()).unwrap_err();
        assert!(matches!(err, TransitionError::Invalid(_)));
        assert_eq!(lobby.status, LobbyStatus::Playing);
    }

    #[test]
    fn completion_fires_only_when_everyone_finished() {
        let mut lobby = ready_lobby(2);
        start_round(&mut lobby, SystemTime::now()).unwrap();

        let first = *lobby.players.keys().next().unwrap();
        lobby.players[&first].status = PlayerStatus::Finished;
        lobby.players[&first].progress = 100.0;
        assert!(check_completion(&mut lobby).is_none());

        let second = *lobby.players.keys().last().unwrap();
        lobby.players[&second].status = PlayerStatus::Finished;
        lobby.players[&second].progress = 100.0;

        let rankings = check_completion(&mut lobby).expect("round complete");
        assert_eq!(rankings.len(), 2);
        assert_eq!(lobby.status, LobbyStatus::Finished);

        // Terminal until restart.
        assert!(check_completion(&mut lobby).is_none());
    }

    #[test]
    fn restart_returns_everyone_to_joined() {
        let mut lobby = ready_lobby(2);
        start_round(&mut lobby, SystemTime::now()).unwrap();
        for player in lobby.players.values_mut() {
            player.status = PlayerStatus::Finished;
            player.progress = 100.0;
            player.score = 77;
        }
        check_completion(&mut lobby).unwrap();

        restart_round(&mut lobby).unwrap();
        assert_eq!(lobby.status, LobbyStatus::Waiting);
        assert!(lobby.round.is_none());
        for player in lobby.players.values() {
            assert_eq!(player.status, PlayerStatus::Joined);
            assert_eq!(player.score, 0);
            assert_eq!(player.progress, 0.0);
        }
    }

    #[test]
    fn restart_of_a_waiting_lobby_is_rejected() {
        let mut lobby = ready_lobby(1);
        assert!(matches!(
            restart_round(&mut lobby),
            Err(TransitionError::Invalid(_))
        ));
    }
}
