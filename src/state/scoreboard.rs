use dashmap::DashMap;

/// One scored participant inside a session scoreboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreEntry {
    /// Participant identity.
    pub participant_id: String,
    /// Latest cumulative score.
    pub score: i64,
    /// Insertion sequence, the stable tie-break for equal scores.
    seq: u64,
}

/// Sorted score structure for a single session.
///
/// Entries are kept unsorted and ordered on demand: score descending, then
/// insertion order. Upserting an existing participant keeps its original
/// sequence number so ties stay stable across score updates.
#[derive(Debug, Default)]
pub struct ScoreBoard {
    entries: Vec<ScoreEntry>,
    next_seq: u64,
}

impl ScoreBoard {
    /// Insert or update a participant's score; latest write wins.
    pub fn upsert(&mut self, participant_id: &str, score: i64) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.participant_id == participant_id)
        {
            entry.score = score;
            return;
        }
        self.entries.push(ScoreEntry {
            participant_id: participant_id.to_owned(),
            score,
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }

    /// Top `limit` entries, best first.
    pub fn top(&self, limit: usize) -> Vec<ScoreEntry> {
        let mut sorted = self.entries.clone();
        sorted.sort_by(|a, b| b.score.cmp(&a.score).then(a.seq.cmp(&b.seq)));
        sorted.truncate(limit);
        sorted
    }

    /// 1-based rank of a participant, 0 when absent.
    pub fn rank_of(&self, participant_id: &str) -> usize {
        self.top(self.entries.len())
            .iter()
            .position(|entry| entry.participant_id == participant_id)
            .map(|position| position + 1)
            .unwrap_or(0)
    }
}

/// Per-session scoreboards, the sorted-score projection of the session store.
#[derive(Debug, Default)]
pub struct ScoreBoards {
    boards: DashMap<String, ScoreBoard>,
}

impl ScoreBoards {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a score into the session's board, creating the board on first use.
    pub fn update_score(&self, session_code: &str, participant_id: &str, score: i64) {
        self.boards
            .entry(session_code.to_owned())
            .or_default()
            .upsert(participant_id, score);
    }

    /// Top `limit` entries for a session; empty when no board exists.
    pub fn top(&self, session_code: &str, limit: usize) -> Vec<ScoreEntry> {
        self.boards
            .get(session_code)
            .map(|board| board.top(limit))
            .unwrap_or_default()
    }

    /// 1-based rank of a participant, 0 when unranked.
    pub fn rank_of(&self, session_code: &str, participant_id: &str) -> usize {
        self.boards
            .get(session_code)
            .map(|board| board.rank_of(participant_id))
            .unwrap_or(0)
    }

    /// Drop the session's board entirely (session teardown).
    pub fn clear(&self, session_code: &str) {
        self.boards.remove(session_code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rankings_sorted_descending() {
        let mut board = ScoreBoard::default();
        board.upsert("a", 1000);
        board.upsert("b", 2450);
        board.upsert("c", 1450);

        let top = board.top(10);
        let ids: Vec<&str> = top.iter().map(|e| e.participant_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut board = ScoreBoard::default();
        board.upsert("first", 1000);
        board.upsert("second", 1000);

        let top = board.top(10);
        assert_eq!(top[0].participant_id, "first");
        assert_eq!(top[1].participant_id, "second");

        // Updating back to the same score must not reshuffle the tie.
        board.upsert("first", 1000);
        let top = board.top(10);
        assert_eq!(top[0].participant_id, "first");
    }

    #[test]
    fn upsert_latest_write_wins() {
        let mut board = ScoreBoard::default();
        board.upsert("a", 500);
        board.upsert("a", 1500);
        assert_eq!(board.top(1)[0].score, 1500);
        assert_eq!(board.top(10).len(), 1);
    }

    #[test]
    fn rank_of_absent_is_zero() {
        let boards = ScoreBoards::new();
        boards.update_score("S1", "a", 100);
        assert_eq!(boards.rank_of("S1", "a"), 1);
        assert_eq!(boards.rank_of("S1", "ghost"), 0);
        assert_eq!(boards.rank_of("S2", "a"), 0);
    }

    #[test]
    fn clear_removes_board() {
        let boards = ScoreBoards::new();
        boards.update_score("S1", "a", 100);
        boards.clear("S1");
        assert!(boards.top("S1", 10).is_empty());
    }

    #[test]
    fn limit_truncates() {
        let mut board = ScoreBoard::default();
        for (i, id) in ["a", "b", "c", "d"].iter().enumerate() {
            board.upsert(id, 100 - i as i64);
        }
        assert_eq!(board.top(2).len(), 2);
    }
}
