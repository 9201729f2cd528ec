mod db;
mod files;

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use rusqlite::{params, Connection, OptionalExtension};
use solracer_core::{InputTrace, Race};

use crate::RaceCounts;

/// SQLite-backed race store.
///
/// Submitted traces are archived as JSON files under `{data_dir}/traces/`
/// and never rewritten. SQLite holds race and player metadata plus a
/// `trace_path` column naming the archived file.
pub struct RaceStore {
    conn: Mutex<Connection>,
    traces_dir: PathBuf,
}

const SCHEMA_MIGRATIONS: [(&str, &str, &str); 3] = [
    (
        "races",
        "settled_at",
        "ALTER TABLE races ADD COLUMN settled_at INTEGER;",
    ),
    (
        "players",
        "trace_path",
        "ALTER TABLE players ADD COLUMN trace_path TEXT;",
    ),
    (
        "players",
        "trace_frames",
        "ALTER TABLE players ADD COLUMN trace_frames INTEGER;",
    ),
];

impl RaceStore {
    /// Open (or create) the SQLite database and traces directory.
    ///
    /// On startup, player rows pointing at a trace file that no longer exists
    /// lose the reference, and trace files no row points at are removed.
    pub fn open(data_dir: &Path) -> Result<Self, String> {
        fs::create_dir_all(data_dir)
            .map_err(|e| format!("failed to create data dir {}: {e}", data_dir.display()))?;

        let traces_dir = data_dir.join("traces");
        fs::create_dir_all(&traces_dir).map_err(|e| format!("failed to create traces dir: {e}"))?;

        let db_path = data_dir.join("races.db");
        let conn = Connection::open(&db_path)
            .map_err(|e| format!("failed to open SQLite at {}: {e}", db_path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA busy_timeout=5000;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )
        .map_err(|e| format!("failed to set pragmas: {e}"))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS races (
                race_id             TEXT PRIMARY KEY,
                seed                INTEGER NOT NULL,
                token_mint          TEXT NOT NULL,
                entry_fee_lamports  INTEGER NOT NULL,
                status              TEXT NOT NULL,
                created_at          INTEGER NOT NULL,
                started_at          INTEGER,
                deadline            INTEGER,
                price_samples       TEXT NOT NULL,
                settlement          TEXT,
                settled_at          INTEGER
             );
             CREATE TABLE IF NOT EXISTS players (
                race_id             TEXT NOT NULL REFERENCES races(race_id) ON DELETE CASCADE,
                seat                INTEGER NOT NULL,
                wallet              TEXT NOT NULL,
                claimed_finish_ms   INTEGER,
                claimed_coins       INTEGER,
                input_hash          TEXT,
                verdict             TEXT,
                verified_finish_ms  INTEGER,
                verified_coins      INTEGER,
                submitted_at        INTEGER,
                trace_path          TEXT,
                trace_frames        INTEGER,
                PRIMARY KEY (race_id, seat),
                UNIQUE (race_id, wallet)
             );
             CREATE INDEX IF NOT EXISTS idx_races_status ON races(status);
             CREATE INDEX IF NOT EXISTS idx_races_lobby
                ON races(status, token_mint, entry_fee_lamports);",
        )
        .map_err(|e| format!("failed to create schema: {e}"))?;

        Self::ensure_schema(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            traces_dir,
        };

        let recovered = store.recover_on_startup()?;
        if recovered > 0 {
            tracing::warn!(recovered, "cleared references to missing trace files");
        }

        let orphans = store.cleanup_orphan_traces()?;
        if orphans > 0 {
            tracing::warn!(orphans, "removed orphaned trace files");
        }

        Ok(store)
    }

    fn ensure_schema(conn: &Connection) -> Result<(), String> {
        for (table, column, migration_sql) in SCHEMA_MIGRATIONS {
            let columns = Self::table_columns(conn, table)?;
            if columns.contains(column) {
                continue;
            }

            tracing::warn!(table, column, "applying schema migration");
            conn.execute_batch(migration_sql)
                .map_err(|e| format!("failed to add {table}.{column}: {e}"))?;
        }
        Ok(())
    }

    fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>, String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .map_err(|e| format!("failed to read {table} table info: {e}"))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(|e| format!("failed to iterate {table} columns: {e}"))?;

        let mut columns = HashSet::new();
        for row in rows {
            columns.insert(row.map_err(|e| format!("failed to parse {table} column info: {e}"))?);
        }
        Ok(columns)
    }

    fn recover_on_startup(&self) -> Result<usize, String> {
        let referenced: Vec<(String, i64, String)> = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn
                .prepare(
                    "SELECT race_id, seat, trace_path FROM players
                     WHERE trace_path IS NOT NULL",
                )
                .map_err(|e| format!("recover_on_startup query failed: {e}"))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
                .map_err(|e| format!("recover_on_startup iteration failed: {e}"))?;
            rows.filter_map(|row| row.ok()).collect()
        };

        let mut cleared = 0usize;
        for (race_id, seat, stored_path) in referenced {
            let present = self
                .trace_path_from_db_value(&stored_path)
                .map(|path| path.exists())
                .unwrap_or(false);
            if present {
                continue;
            }

            tracing::warn!(
                race_id = %race_id,
                seat,
                stored_path = %stored_path,
                "trace file missing"
            );
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "UPDATE players SET trace_path = NULL WHERE race_id = ?1 AND seat = ?2",
                params![race_id, seat],
            )
            .map_err(|e| format!("recover_on_startup update failed: {e}"))?;
            cleared += 1;
        }
        Ok(cleared)
    }

    /// First Waiting race for this lobby that `wallet` is not already in.
    pub fn find_joinable(
        &self,
        token_mint: &str,
        entry_fee_lamports: u64,
        wallet: &str,
    ) -> Result<Option<Race>, String> {
        self.find_waiting(token_mint, entry_fee_lamports, wallet, false)
    }

    /// A Waiting race this wallet created earlier for the same lobby.
    pub fn find_own_waiting(
        &self,
        token_mint: &str,
        entry_fee_lamports: u64,
        wallet: &str,
    ) -> Result<Option<Race>, String> {
        self.find_waiting(token_mint, entry_fee_lamports, wallet, true)
    }

    fn find_waiting(
        &self,
        token_mint: &str,
        entry_fee_lamports: u64,
        wallet: &str,
        own: bool,
    ) -> Result<Option<Race>, String> {
        let membership = if own { "IN" } else { "NOT IN" };
        let race_id: Option<String> = {
            let conn = self.conn.lock().unwrap();
            conn.query_row(
                &format!(
                    "SELECT race_id FROM races
                     WHERE status = 'waiting' AND token_mint = ?1 AND entry_fee_lamports = ?2
                       AND race_id {membership} (SELECT race_id FROM players WHERE wallet = ?3)
                     ORDER BY created_at ASC, race_id ASC
                     LIMIT 1"
                ),
                params![token_mint, entry_fee_lamports as i64, wallet],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| format!("find_waiting failed: {e}"))?
        };

        match race_id {
            Some(race_id) => self.get(&race_id),
            None => Ok(None),
        }
    }

    pub fn price_samples(&self, race_id: &str) -> Result<Option<Vec<f64>>, String> {
        let encoded: Option<String> = {
            let conn = self.conn.lock().unwrap();
            conn.query_row(
                "SELECT price_samples FROM races WHERE race_id = ?1",
                params![race_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| format!("price_samples lookup failed: {e}"))?
        };

        encoded
            .map(|text| {
                serde_json::from_str(&text)
                    .map_err(|e| format!("bad price_samples for race {race_id}: {e}"))
            })
            .transpose()
    }

    /// Races the sweep has to look at: Active past their deadline and
    /// Waiting past the lobby TTL.
    pub fn due_for_sweep(&self, now: u64, waiting_ttl_secs: u64) -> Result<Vec<String>, String> {
        let waiting_cutoff = now.saturating_sub(waiting_ttl_secs) as i64;
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT race_id FROM races
                 WHERE (status = 'active' AND deadline IS NOT NULL AND deadline < ?1)
                    OR (status = 'waiting' AND created_at <= ?2)
                 ORDER BY created_at ASC",
            )
            .map_err(|e| format!("due_for_sweep prepare failed: {e}"))?;
        let rows = stmt
            .query_map(params![now as i64, waiting_cutoff], |row| row.get(0))
            .map_err(|e| format!("due_for_sweep query failed: {e}"))?;
        rows.collect::<Result<Vec<String>, _>>()
            .map_err(|e| format!("due_for_sweep row decode failed: {e}"))
    }

    pub fn count_by_status(&self) -> Result<RaceCounts, String> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT
                 COUNT(*) FILTER (WHERE status = 'waiting'),
                 COUNT(*) FILTER (WHERE status = 'active'),
                 COUNT(*) FILTER (WHERE status = 'settled'),
                 COUNT(*) FILTER (WHERE status = 'voided')
             FROM races",
            [],
            |row| {
                Ok(RaceCounts {
                    waiting: row.get::<_, i64>(0)? as usize,
                    active: row.get::<_, i64>(1)? as usize,
                    settled: row.get::<_, i64>(2)? as usize,
                    voided: row.get::<_, i64>(3)? as usize,
                })
            },
        )
        .map_err(|e| format!("count_by_status failed: {e}"))
    }

    /// Write the trace to its archive file and point the player row at it.
    /// A crash between the two leaves an orphan file, removed on next start.
    pub fn archive_trace(
        &self,
        race_id: &str,
        wallet: &str,
        trace: &InputTrace,
    ) -> Result<String, String> {
        let seat = self
            .seat_of(race_id, wallet)?
            .ok_or_else(|| format!("archive_trace: {wallet} is not in race {race_id}"))?;
        let filename = Self::trace_filename(race_id, seat);
        let path = self.traces_dir.join(&filename);
        if path.exists() {
            return Err(format!("trace already archived: {filename}"));
        }

        let json =
            serde_json::to_vec(trace).map_err(|e| format!("failed to serialize trace: {e}"))?;
        fs::write(&path, json).map_err(|e| format!("failed to write trace file: {e}"))?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE players SET trace_path = ?1, trace_frames = ?2
             WHERE race_id = ?3 AND seat = ?4",
            params![filename, trace.len() as i64, race_id, seat],
        )
        .map_err(|e| format!("archive_trace update failed: {e}"))?;
        Ok(filename)
    }

    fn seat_of(&self, race_id: &str, wallet: &str) -> Result<Option<i64>, String> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT seat FROM players WHERE race_id = ?1 AND wallet = ?2",
            params![race_id, wallet],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| format!("seat lookup failed: {e}"))
    }
}
