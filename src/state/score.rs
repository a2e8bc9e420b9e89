use super::Session;
use crate::types::*;
use std::cmp::Reverse;

/// Most-voted answer; ties go to whoever submitted first.
/// An answer nobody voted for never wins.
pub fn top_answer(answers: &[Answer]) -> Option<&Answer> {
    answers
        .iter()
        .filter(|a| a.votes > 0)
        .max_by_key(|a| (a.votes, Reverse(a.seq)))
}

impl Session {
    /// Award the current round's points. Calling it twice for the same round
    /// is a no-op that returns the recorded winner.
    pub fn score_round(&mut self) -> Option<RoundWinner> {
        let round_no = self.game.round_no;
        if self.game.scored_round == Some(round_no) {
            return self
                .game
                .last_winner
                .clone()
                .filter(|w| w.round_no == round_no);
        }
        self.game.scored_round = Some(round_no);

        let Some(best) = top_answer(&self.answers).cloned() else {
            tracing::info!("Round {} in {} had no winner", round_no, self.game.code);
            return None;
        };

        let points = self.game.config.win_points;
        let player = self.player_mut(&best.player_id)?;
        player.score = player.score.saturating_add(points);

        let winner = RoundWinner {
            round_no,
            answer_id: best.id,
            player_id: player.id.clone(),
            player_name: player.name.clone(),
            content: best.content,
            votes: best.votes,
            points,
        };

        tracing::info!(
            "Round {} in {} won by {} with {} votes",
            round_no,
            self.game.code,
            winner.player_name,
            winner.votes
        );
        self.game.last_winner = Some(winner.clone());
        self.touch();
        Some(winner)
    }

    /// Players by score, highest first; join order breaks ties
    pub fn leaderboard(&self) -> Vec<&Player> {
        let mut board: Vec<&Player> = self.players.iter().collect();
        board.sort_by_key(|p| Reverse(p.score));
        board
    }
}
