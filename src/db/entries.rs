//! Entry persistence. Create/update/delete live here; re-indexing after a
//! content change is the indexer's job (see `crate::index`).

use rusqlite::params;

use super::*;

impl DiaryDB {
    pub fn create_entry(&self, owner_id: i64, input: &EntryInput) -> Result<Entry, MemoirError> {
        validate_entry_input(input)?;
        let conn = self.conn()?;
        let now = now_ms();
        conn.execute(
            "INSERT INTO entries (owner_id, title, content, mood, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![owner_id, input.title.trim(), input.content, input.mood, now],
        )?;
        let id = conn.last_insert_rowid();
        Ok(Entry {
            id,
            owner_id,
            title: input.title.trim().to_string(),
            content: input.content.clone(),
            mood: input.mood.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_entry(&self, owner_id: i64, entry_id: i64) -> Result<Option<Entry>, MemoirError> {
        let conn = self.conn()?;
        let entry = conn
            .query_row(
                "SELECT * FROM entries WHERE id = ?1 AND owner_id = ?2",
                params![entry_id, owner_id],
                row_to_entry,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(entry)
    }

    /// Newest-first page of a user's entries.
    pub fn list_entries(
        &self,
        owner_id: i64,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Entry>, MemoirError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM entries WHERE owner_id = ?1 \
             ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
            .query_map(params![owner_id, limit as i64, skip as i64], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Apply a partial update. Returns the updated entry and whether the
    /// content actually changed (the caller re-indexes only in that case).
    pub fn update_entry(
        &self,
        owner_id: i64,
        entry_id: i64,
        update: &EntryUpdate,
    ) -> Result<Option<(Entry, bool)>, MemoirError> {
        let Some(existing) = self.get_entry(owner_id, entry_id)? else {
            return Ok(None);
        };

        let title = update.title.as_deref().map(str::trim).unwrap_or(&existing.title);
        let content = update.content.as_deref().unwrap_or(&existing.content);
        let mood = match &update.mood {
            Some(m) => m.as_deref(),
            None => existing.mood.as_deref(),
        };
        let content_changed = content != existing.content;

        // the merged result must pass the same limits as a fresh entry
        validate_entry_fields(title, content, mood)?;

        let conn = self.conn()?;
        let now = now_ms();
        conn.execute(
            "UPDATE entries SET title = ?1, content = ?2, mood = ?3, updated_at = ?4 \
             WHERE id = ?5 AND owner_id = ?6",
            params![title, content, mood, now, entry_id, owner_id],
        )?;

        let updated = Entry {
            id: entry_id,
            owner_id,
            title: title.to_string(),
            content: content.to_string(),
            mood: mood.map(str::to_string),
            created_at: existing.created_at,
            updated_at: now,
        };
        Ok(Some((updated, content_changed)))
    }

    /// Delete an entry. Chunks cascade via the foreign key.
    /// Returns false if no entry matched.
    pub fn delete_entry(&self, owner_id: i64, entry_id: i64) -> Result<bool, MemoirError> {
        let conn = self.conn()?;
        let n = conn.execute(
            "DELETE FROM entries WHERE id = ?1 AND owner_id = ?2",
            params![entry_id, owner_id],
        )?;
        Ok(n > 0)
    }

    /// Entries created at or after `since`, oldest first. Used by the digest.
    pub fn entries_since(&self, owner_id: i64, since: i64) -> Result<Vec<Entry>, MemoirError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM entries WHERE owner_id = ?1 AND created_at >= ?2 \
             ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![owner_id, since], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
