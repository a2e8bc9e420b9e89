use super::{AppState, Session};
use crate::error::{GameError, GameResult};
use crate::protocol::ServerMessage;
use crate::types::*;

impl Session {
    /// Count one vote; returns the answer's new total
    pub fn cast_vote(&mut self, voter_id: &str, answer_id: &str) -> GameResult<u32> {
        if self.game.phase != GamePhase::Voting {
            return Err(GameError::WrongPhase(self.game.phase));
        }

        let voter = self.player(voter_id).ok_or(GameError::PlayerNotFound)?;
        if voter.has_voted {
            return Err(GameError::AlreadyVoted);
        }

        let answer = self
            .answers
            .iter_mut()
            .find(|a| a.id == answer_id)
            .ok_or(GameError::AnswerNotFound)?;
        if answer.player_id == voter_id {
            return Err(GameError::SelfVote);
        }
        answer.votes = answer.votes.saturating_add(1);
        let votes = answer.votes;

        if let Some(voter) = self.player_mut(voter_id) {
            voter.has_voted = true;
        }
        self.touch();
        Ok(votes)
    }

    /// A player can vote when someone else's answer is on the table
    pub fn can_vote(&self, player: &Player) -> bool {
        self.answers.iter().any(|a| a.player_id != player.id)
    }

    /// Nothing left to vote on, or every eligible player has voted
    pub fn all_voted(&self) -> bool {
        self.answers.is_empty()
            || self
                .players
                .iter()
                .filter(|p| self.can_vote(p))
                .all(|p| p.has_voted)
    }
}

impl AppState {
    pub async fn cast_vote(&self, code: &str, voter_id: &str, answer_id: &str) -> GameResult<u32> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(code)
            .ok_or_else(|| GameError::RoomNotFound(code.to_string()))?;

        let votes = session.cast_vote(voter_id, answer_id)?;
        session.announce_host(ServerMessage::VoteAccepted {
            answer_id: answer_id.to_string(),
            votes: Some(votes),
        });
        session.publish();

        tracing::debug!("Vote by {} for {} in {} ({} votes)", voter_id, answer_id, code, votes);
        Ok(votes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    fn voting_session(names: &[&str]) -> (Session, Vec<Player>, Vec<Answer>) {
        let mut s = Session::new("ABCD".to_string(), GameConfig::default());
        let players: Vec<Player> = names
            .iter()
            .map(|n| s.join(n, None, Utc::now()).unwrap())
            .collect();
        s.game.prompt = Some("The floor is lava".to_string());
        s.enter_phase(GamePhase::SubmittingAnswers, Utc::now())
            .unwrap();
        let answers = players
            .iter()
            .map(|p| {
                s.submit_answer(&p.id, &format!("{} jumps", p.name), Utc::now())
                    .unwrap()
            })
            .collect();
        s.enter_phase(GamePhase::Voting, Utc::now()).unwrap();
        (s, players, answers)
    }

    #[test]
    fn test_cast_vote_counts_and_marks_voter() {
        let (mut s, players, answers) = voting_session(&["Ada", "Bob", "Cy"]);

        assert_eq!(s.cast_vote(&players[1].id, &answers[0].id), Ok(1));
        assert_eq!(s.cast_vote(&players[2].id, &answers[0].id), Ok(2));
        assert!(s.player(&players[1].id).unwrap().has_voted);
        assert!(!s.all_voted());

        s.cast_vote(&players[0].id, &answers[1].id).unwrap();
        assert!(s.all_voted());
    }

    #[test]
    fn test_vote_rules() {
        let (mut s, players, answers) = voting_session(&["Ada", "Bob"]);

        assert_eq!(
            s.cast_vote(&players[0].id, &answers[0].id),
            Err(GameError::SelfVote)
        );
        assert_eq!(
            s.cast_vote(&players[0].id, "missing"),
            Err(GameError::AnswerNotFound)
        );

        s.cast_vote(&players[0].id, &answers[1].id).unwrap();
        assert_eq!(
            s.cast_vote(&players[0].id, &answers[1].id),
            Err(GameError::AlreadyVoted)
        );
        assert_eq!(s.answers[1].votes, 1);
    }

    #[test]
    fn test_lone_player_cannot_block_voting() {
        let (s, players, _) = voting_session(&["Ada"]);
        assert!(!s.can_vote(&players[0]));
        assert!(s.all_voted());
    }

    #[tokio::test]
    async fn test_vote_totals_reach_only_the_host_during_voting() {
        let state = AppState::new();
        let game = state.create_session().await.unwrap();
        let ada = state.join(&game.code, "Ada", None).await.unwrap();
        let bob = state.join(&game.code, "Bob", None).await.unwrap();
        state.start_round(&game.code, Utc::now()).await.unwrap();
        let answer = state
            .submit_answer(&game.code, &ada.id, "Open the chest")
            .await
            .unwrap();
        state
            .transition_phase(&game.code, GamePhase::Voting)
            .await
            .unwrap();

        let mut player_rx = state.subscribe(&game.code, Role::Player).await.unwrap();
        let mut host_rx = state.subscribe(&game.code, Role::Host).await.unwrap();
        state
            .cast_vote(&game.code, &bob.id, &answer.id)
            .await
            .unwrap();

        let mut player_msgs = 0;
        while let Ok(msg) = player_rx.try_recv() {
            player_msgs += 1;
            match msg {
                ServerMessage::VoteAccepted { .. } => panic!("vote total leaked to players"),
                ServerMessage::Snapshot { snapshot } => {
                    assert!(snapshot.answers.iter().all(|a| a.votes.is_none()));
                }
                _ => {}
            }
        }
        assert!(player_msgs > 0, "players still get the snapshot");

        let mut host_total = None;
        while let Ok(msg) = host_rx.try_recv() {
            if let ServerMessage::VoteAccepted { votes, .. } = msg {
                host_total = votes;
            }
        }
        assert_eq!(host_total, Some(1));
    }

    #[tokio::test]
    async fn test_concurrent_votes_are_all_counted() {
        let state = Arc::new(AppState::new());
        let game = state.create_session().await.unwrap();
        let code = game.code.clone();

        let author = state.join(&code, "Author", None).await.unwrap();
        let mut voters = Vec::new();
        for i in 0..7 {
            voters.push(state.join(&code, &format!("V{}", i), None).await.unwrap());
        }

        state.start_round(&code, Utc::now()).await.unwrap();
        let answer = state
            .submit_answer(&code, &author.id, "Run!")
            .await
            .unwrap();
        state
            .transition_phase(&code, GamePhase::Voting)
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for voter in &voters {
            // Each voter tries twice at the same time
            for _ in 0..2 {
                let state = state.clone();
                let code = code.clone();
                let voter_id = voter.id.clone();
                let answer_id = answer.id.clone();
                tasks.push(tokio::spawn(async move {
                    state.cast_vote(&code, &voter_id, &answer_id).await
                }));
            }
        }

        let mut accepted = 0;
        let mut rejected = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(GameError::AlreadyVoted) => rejected += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(accepted, 7);
        assert_eq!(rejected, 7);
        let snapshot = state.host_snapshot(&code).await.unwrap();
        assert_eq!(snapshot.answers[0].votes, Some(7));
    }
}
