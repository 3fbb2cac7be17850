use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::error;

use crate::error::Result;
use crate::types::{LogEvent, LogFilter, LogStats, Level};

const SCHEMA_VERSION: i64 = 1;

/// Append-only structured event log, backed by a single SQLite file.
///
/// `write` never propagates a failure to its caller — logging must not be
/// able to take down the request path it's trying to observe. Failures are
/// counted in-process and visible via [`LogStore::write_failures`].
pub struct LogStore {
    db: Mutex<Connection>,
    write_failures: AtomicU64,
}

impl LogStore {
    /// Open (or create) the log database at `path`. If an existing file has
    /// an incompatible schema, it is renamed aside with a timestamp suffix
    /// and a fresh database is created in its place — a deliberately simple
    /// policy; forward-compatible migrations are not in scope.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = match try_open_compatible(path) {
            Ok(conn) => conn,
            Err(_) => {
                let rotated_to = rotate_aside(path)?;
                let conn = Connection::open(path)?;
                init_schema(&conn)?;
                if let Some(rotated_to) = rotated_to {
                    let event = LogEvent::new(
                        "log_store",
                        Level::Warn,
                        "log_db_rotated",
                        format!("incompatible schema, moved existing log file aside to {}", rotated_to.display()),
                    );
                    if let Err(e) = insert_event(&conn, &event) {
                        error!(error = %e, "failed to record log_db_rotated event in the new log store");
                    }
                }
                conn
            }
        };

        Ok(Self {
            db: Mutex::new(conn),
            write_failures: AtomicU64::new(0),
        })
    }

    /// Append one event. Never fails visibly — on a database error the
    /// event is dropped, the failure counter is bumped, and an `error!`
    /// line is emitted via `tracing` so the operator still sees it.
    pub fn write(&self, event: LogEvent) {
        if let Err(e) = self.try_write(&event) {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
            error!(error = %e, event = %event.event, "failed to write log event");
        }
    }

    fn try_write(&self, event: &LogEvent) -> Result<()> {
        let db = self.db.lock().unwrap();
        insert_event(&db, event)
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    pub fn list(&self, filter: &LogFilter) -> Result<Vec<LogEvent>> {
        let db = self.db.lock().unwrap();
        let mut sql = String::from(
            "SELECT id, timestamp, level, component, event, message, trace_id,
                    conversation_id, token_id, request_id, error_code, status_code, hint, data
             FROM logs WHERE 1=1",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![];
        if let Some(v) = &filter.trace_id {
            sql.push_str(" AND trace_id = ?");
            args.push(Box::new(v.clone()));
        }
        if let Some(v) = &filter.conversation_id {
            sql.push_str(" AND conversation_id = ?");
            args.push(Box::new(v.clone()));
        }
        if let Some(v) = &filter.token_id {
            sql.push_str(" AND token_id = ?");
            args.push(Box::new(v.clone()));
        }
        if let Some(v) = &filter.error_code {
            sql.push_str(" AND error_code = ?");
            args.push(Box::new(v.clone()));
        }
        if let Some(v) = &filter.component {
            sql.push_str(" AND component = ?");
            args.push(Box::new(v.clone()));
        }
        if let Some(v) = &filter.level {
            sql.push_str(" AND level = ?");
            args.push(Box::new(v.as_str().to_string()));
        }
        sql.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ?");
        args.push(Box::new(filter.limit.max(1) as i64));

        let mut stmt = db.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let rows = stmt
            .query_map(params_ref.as_slice(), row_to_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// All events sharing a trace id, in insertion order — the canonical
    /// view for reconstructing a single request's lifetime.
    pub fn get_trace(&self, trace_id: &str, limit: usize) -> Result<Vec<LogEvent>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, timestamp, level, component, event, message, trace_id,
                    conversation_id, token_id, request_id, error_code, status_code, hint, data
             FROM logs WHERE trace_id = ?1 ORDER BY id ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![trace_id, limit.max(1) as i64], row_to_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn stats(&self) -> Result<LogStats> {
        let db = self.db.lock().unwrap();
        let total: i64 = db.query_row("SELECT COUNT(*) FROM logs", [], |r| r.get(0))?;

        let mut by_level = std::collections::HashMap::new();
        let mut stmt = db.prepare("SELECT level, COUNT(*) FROM logs GROUP BY level")?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
        for row in rows {
            let (level, count) = row?;
            by_level.insert(level, count as u64);
        }

        let mut by_component = std::collections::HashMap::new();
        let mut stmt = db.prepare("SELECT component, COUNT(*) FROM logs GROUP BY component")?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
        for row in rows {
            let (component, count) = row?;
            by_component.insert(component, count as u64);
        }

        Ok(LogStats {
            total: total as u64,
            by_level,
            by_component,
        })
    }
}

fn try_open_compatible(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    let existing_tables: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='logs'",
        [],
        |r| r.get(0),
    )?;
    if existing_tables == 0 {
        init_schema(&conn)?;
        return Ok(conn);
    }
    // A `logs` table exists — verify it has the column set this version
    // expects. A mismatch here means the file predates a schema change.
    let mut stmt = conn.prepare("SELECT trace_id, error_code, status_code, hint FROM logs LIMIT 1")?;
    stmt.query([])?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS logs (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp       TEXT NOT NULL,
            level           TEXT NOT NULL,
            component       TEXT NOT NULL,
            event           TEXT NOT NULL,
            message         TEXT NOT NULL,
            trace_id        TEXT,
            conversation_id TEXT,
            token_id        TEXT,
            request_id      TEXT,
            error_code      TEXT,
            status_code     INTEGER,
            hint            TEXT,
            data            TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp DESC);
        CREATE INDEX IF NOT EXISTS idx_logs_trace ON logs(trace_id);
        CREATE INDEX IF NOT EXISTS idx_logs_conversation ON logs(conversation_id);
        CREATE INDEX IF NOT EXISTS idx_logs_token ON logs(token_id);
        CREATE INDEX IF NOT EXISTS idx_logs_error_code ON logs(error_code);
        CREATE INDEX IF NOT EXISTS idx_logs_component ON logs(component);
        CREATE INDEX IF NOT EXISTS idx_logs_level ON logs(level);
        PRAGMA user_version = 1;",
    )?;
    let _ = SCHEMA_VERSION;
    Ok(())
}

/// Renames an incompatible existing log file aside. Returns the path it was
/// moved to, or `None` if there was nothing to rotate (fresh install).
fn rotate_aside(path: &Path) -> Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let rotated: PathBuf = {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
        let mut name = path.to_path_buf();
        name.set_extension(format!("legacy.{stamp}"));
        name
    };
    std::fs::rename(path, &rotated)?;
    tracing::warn!(from = %path.display(), to = %rotated.display(), "log_db_rotated: incompatible schema, moved existing log file aside");
    Ok(Some(rotated))
}

fn insert_event(conn: &Connection, event: &LogEvent) -> Result<()> {
    let data_json = event.data.as_ref().map(|v| v.to_string());
    conn.execute(
        "INSERT INTO logs (
            timestamp, level, component, event, message, trace_id,
            conversation_id, token_id, request_id, error_code, status_code, hint, data
         ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
        params![
            event.timestamp.to_rfc3339(),
            event.level.as_str(),
            event.component,
            event.event,
            event.message,
            event.trace_id,
            event.conversation_id,
            event.token_id,
            event.request_id,
            event.error_code,
            event.status_code,
            event.hint,
            data_json,
        ],
    )?;
    Ok(())
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<LogEvent> {
    let data: Option<String> = row.get(13)?;
    Ok(LogEvent {
        id: Some(row.get(0)?),
        timestamp: row
            .get::<_, String>(1)?
            .parse()
            .unwrap_or_else(|_| chrono::Utc::now()),
        level: row.get::<_, String>(2)?.parse().unwrap_or(Level::Info),
        component: row.get(3)?,
        event: row.get(4)?,
        message: row.get(5)?,
        trace_id: row.get(6)?,
        conversation_id: row.get(7)?,
        token_id: row.get(8)?,
        request_id: row.get(9)?,
        error_code: row.get(10)?,
        status_code: row.get::<_, Option<i64>>(11)?.map(|v| v as u16),
        hint: row.get(12)?,
        data: data.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_get_trace_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::open(dir.path().join("log.db")).unwrap();
        store.write(LogEvent::new("gateway", Level::Info, "invoke_started", "start").with_trace("t-1"));
        store.write(LogEvent::new("gateway", Level::Info, "invoke_finished", "done").with_trace("t-1"));
        let events = store.get_trace("t-1", 10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "invoke_started");
        assert_eq!(events[1].event, "invoke_finished");
    }

    #[test]
    fn incompatible_schema_is_rotated_aside_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch("CREATE TABLE logs (id INTEGER PRIMARY KEY, note TEXT)").unwrap();
            conn.execute("INSERT INTO logs (note) VALUES ('legacy row')", []).unwrap();
        }
        let store = LogStore::open(&path).unwrap();
        store.write(LogEvent::new("gateway", Level::Info, "ping", "ok"));
        assert_eq!(store.write_failures(), 0);
        let rotated: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("legacy"))
            .collect();
        assert_eq!(rotated.len(), 1);

        let events = store.list(&LogFilter { component: Some("log_store".to_string()), ..Default::default() }).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "log_db_rotated");
    }
}
