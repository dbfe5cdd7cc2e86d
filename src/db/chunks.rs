//! Chunk persistence. The chunk set for an entry is always exactly the
//! segmentation of its current content — replace, never merge.

use rusqlite::params;

use super::*;

impl DiaryDB {
    /// Replace all chunks for an entry in one transaction: delete the prior
    /// batch, then insert the new one preserving order as `chunk_index`.
    /// A concurrent reader sees either the old generation or the new one,
    /// never a mix.
    pub fn replace_chunks(
        &self,
        entry_id: i64,
        owner_id: i64,
        chunks: &[(String, Vec<f32>)],
    ) -> Result<(), MemoirError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM chunks WHERE entry_id = ?1", params![entry_id])?;
        let now = now_ms();
        for (i, (text, embedding)) in chunks.iter().enumerate() {
            tx.execute(
                "INSERT INTO chunks (entry_id, owner_id, chunk_text, embedding, chunk_index, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry_id,
                    owner_id,
                    text,
                    crate::ai::embedding_to_bytes(embedding),
                    i as i64,
                    now
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Every chunk belonging to the user — the candidate pool for ranking.
    pub fn chunks_for_owner(&self, owner_id: i64) -> Result<Vec<Chunk>, MemoirError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM chunks WHERE owner_id = ?1")?;
        let rows = stmt
            .query_map(params![owner_id], row_to_chunk)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn chunk_count(&self, owner_id: i64) -> Result<usize, MemoirError> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE owner_id = ?1",
            params![owner_id],
            |r| r.get(0),
        )?;
        Ok(n as usize)
    }
}
