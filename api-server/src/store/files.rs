use std::{collections::HashSet, fs, path::PathBuf};

use super::*;

impl RaceStore {
    pub(super) fn trace_filename(race_id: &str, seat: i64) -> String {
        format!("{race_id}-{seat}.json")
    }

    pub(super) fn trace_filename_from_db_value(value: &str) -> Result<String, String> {
        let filename = value.trim();

        if filename.is_empty() {
            return Err("invalid trace_path with empty filename".to_string());
        }
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return Err(format!(
                "invalid trace_path (must be a filename, not a path): {value}"
            ));
        }
        if !filename.ends_with(".json") {
            return Err(format!(
                "invalid trace_path extension (expected .json): {value}"
            ));
        }

        Ok(filename.to_string())
    }

    pub(super) fn trace_path_from_db_value(&self, value: &str) -> Result<PathBuf, String> {
        let filename = Self::trace_filename_from_db_value(value)?;
        Ok(self.traces_dir.join(filename))
    }

    /// Read back the archived trace of one seat, if any.
    pub fn load_trace(&self, race_id: &str, wallet: &str) -> Result<Option<InputTrace>, String> {
        let stored: Option<String> = {
            let conn = self.conn.lock().unwrap();
            conn.query_row(
                "SELECT trace_path FROM players WHERE race_id = ?1 AND wallet = ?2",
                params![race_id, wallet],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| format!("load_trace lookup failed: {e}"))?
            .flatten()
        };

        let Some(stored) = stored else {
            return Ok(None);
        };
        let path = self.trace_path_from_db_value(&stored)?;
        let bytes = fs::read(&path)
            .map_err(|e| format!("failed to read trace {}: {e}", path.display()))?;
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| format!("failed to deserialize trace {}: {e}", path.display()))
    }

    /// Remove trace files from disk that no player row references.
    ///
    /// Catches files written by `archive_trace` whose row update never
    /// landed because the process died in between.
    pub(super) fn cleanup_orphan_traces(&self) -> Result<usize, String> {
        let referenced: HashSet<String> = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn
                .prepare("SELECT trace_path FROM players WHERE trace_path IS NOT NULL")
                .map_err(|e| format!("orphan cleanup: query failed: {e}"))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| format!("orphan cleanup: iteration failed: {e}"))?;

            let mut set = HashSet::new();
            for row in rows {
                let stored_path =
                    row.map_err(|e| format!("orphan cleanup: row decode failed: {e}"))?;
                match Self::trace_filename_from_db_value(&stored_path) {
                    Ok(filename) => {
                        set.insert(filename);
                    }
                    Err(e) => {
                        // Archived traces are audit copies; never delete
                        // against a reference list that failed to parse.
                        tracing::warn!(
                            "orphan cleanup disabled due to invalid trace_path value: {e}"
                        );
                        return Ok(0);
                    }
                }
            }
            set
        };

        let entries = match fs::read_dir(&self.traces_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("orphan cleanup: failed to read traces dir: {e}");
                return Ok(0);
            }
        };

        let mut removed = 0usize;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if name_str.ends_with(".json") && !referenced.contains(name_str.as_ref()) {
                match fs::remove_file(entry.path()) {
                    Ok(()) => {
                        tracing::info!(file = %name_str, "removed orphaned trace file");
                        removed += 1;
                    }
                    Err(e) => {
                        tracing::warn!(
                            file = %name_str,
                            "failed to remove orphaned trace file: {e}"
                        );
                    }
                }
            }
        }

        Ok(removed)
    }
}
