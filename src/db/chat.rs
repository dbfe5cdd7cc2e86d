//! Session-scoped chat transcript storage.

use rusqlite::params;

use super::*;

/// How far back a session's transcript reaches.
pub const SESSION_WINDOW_MS: i64 = 2 * 60 * 60 * 1000;

/// How many prior turns are surfaced to the model.
pub const TRANSCRIPT_LIMIT: usize = 5;

impl DiaryDB {
    /// Write one immutable turn. `suggested_entry_ids` is attached only to
    /// assistant turns that actually showed suggestions.
    pub fn append_turn(
        &self,
        user_id: i64,
        session_id: &str,
        role: &str,
        message: &str,
        suggested_entry_ids: Option<&[i64]>,
    ) -> Result<(), MemoirError> {
        let conn = self.conn()?;
        let ids_json = suggested_entry_ids
            .map(|ids| serde_json::to_string(ids))
            .transpose()
            .map_err(|e| MemoirError::Internal(e.to_string()))?;
        conn.execute(
            "INSERT INTO chat_turns (user_id, session_id, role, message, suggested_entry_ids, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![user_id, session_id, role, message, ids_json, now_ms()],
        )?;
        Ok(())
    }

    /// Write a question and its answer as one user turn plus one assistant
    /// turn in a single transaction — a partial exchange never lands.
    pub fn append_exchange(
        &self,
        user_id: i64,
        session_id: &str,
        question: &str,
        answer: &str,
        suggested_entry_ids: Option<&[i64]>,
    ) -> Result<(), MemoirError> {
        let ids_json = suggested_entry_ids
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| MemoirError::Internal(e.to_string()))?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = now_ms();
        tx.execute(
            "INSERT INTO chat_turns (user_id, session_id, role, message, suggested_entry_ids, created_at) \
             VALUES (?1, ?2, 'user', ?3, NULL, ?4)",
            params![user_id, session_id, question, now],
        )?;
        tx.execute(
            "INSERT INTO chat_turns (user_id, session_id, role, message, suggested_entry_ids, created_at) \
             VALUES (?1, ?2, 'assistant', ?3, ?4, ?5)",
            params![user_id, session_id, answer, ids_json, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Turns for this user+session strictly inside the window, in
    /// chronological order. Fetched newest-first with `limit`, then reversed,
    /// so a long session surfaces its most recent turns.
    ///
    /// A turn stamped exactly at the window boundary is excluded.
    pub fn recent_turns(
        &self,
        user_id: i64,
        session_id: &str,
        window_ms: i64,
        limit: usize,
    ) -> Result<Vec<ChatTurn>, MemoirError> {
        let conn = self.conn()?;
        let cutoff = now_ms() - window_ms;
        let mut stmt = conn.prepare(
            "SELECT * FROM chat_turns \
             WHERE user_id = ?1 AND session_id = ?2 AND created_at > ?3 \
             ORDER BY created_at DESC, id DESC LIMIT ?4",
        )?;
        let mut turns = stmt
            .query_map(params![user_id, session_id, cutoff, limit as i64], row_to_turn)?
            .collect::<Result<Vec<_>, _>>()?;
        turns.reverse();
        Ok(turns)
    }

    /// Delete all turns older than the cutoff — across every user and
    /// session. Runs opportunistically at the start of each chat call, not
    /// as a background job.
    pub fn sweep_turns_before(&self, cutoff: i64) -> Result<usize, MemoirError> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM chat_turns WHERE created_at < ?1", params![cutoff])?;
        Ok(n)
    }

    #[cfg(test)]
    pub(crate) fn insert_turn_at(
        &self,
        user_id: i64,
        session_id: &str,
        role: &str,
        message: &str,
        created_at: i64,
    ) -> Result<(), MemoirError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO chat_turns (user_id, session_id, role, message, suggested_entry_ids, created_at) \
             VALUES (?1, ?2, ?3, ?4, NULL, ?5)",
            params![user_id, session_id, role, message, created_at],
        )?;
        Ok(())
    }
}
