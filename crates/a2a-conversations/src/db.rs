use rusqlite::Connection;

use crate::error::Result;

/// Initialise the conversations/messages tables and their indices.
/// Safe to call on every startup — uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversations (
            id                        TEXT PRIMARY KEY,
            contact_id                TEXT NOT NULL,
            contact_name              TEXT,
            token_id                  TEXT NOT NULL,
            direction                 TEXT NOT NULL,
            status                    TEXT NOT NULL,
            started_at                TEXT NOT NULL,
            last_message_at           TEXT NOT NULL,
            ended_at                  TEXT,
            message_count             INTEGER NOT NULL DEFAULT 0,
            summary                   TEXT,
            owner_summary             TEXT,
            owner_relevance           TEXT,
            owner_goals_touched       TEXT,
            owner_action_items        TEXT,
            caller_action_items       TEXT,
            joint_action_items        TEXT,
            collaboration_opportunity TEXT,
            follow_up                 TEXT,
            notes                     TEXT,
            collab_state              TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_conversations_contact
            ON conversations(contact_id, last_message_at DESC);
        CREATE INDEX IF NOT EXISTS idx_conversations_token
            ON conversations(token_id);
        CREATE INDEX IF NOT EXISTS idx_conversations_status
            ON conversations(status);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL,
            timestamp       TEXT NOT NULL,
            direction       TEXT NOT NULL,
            role            TEXT NOT NULL,
            content         TEXT NOT NULL,
            metadata        TEXT,
            compressed      INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, timestamp ASC);",
    )?;
    Ok(())
}
