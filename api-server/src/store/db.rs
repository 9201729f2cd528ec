use rusqlite::{params, Connection, OptionalExtension, Transaction};
use solracer_core::arbiter::{PlayerSlot, Submission};
use solracer_core::{
    RaceOutcome, RaceStatus, RejectReason, Settlement, Verdict, Verification,
};

use super::*;

impl RaceStore {
    /// Insert a freshly created race with its creator seat.
    pub fn insert_race(&self, race: &Race, price_samples: &[f64]) -> Result<(), String> {
        let prices = serde_json::to_string(price_samples)
            .map_err(|e| format!("failed to serialize price samples: {e}"))?;

        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| format!("insert_race begin failed: {e}"))?;
        tx.execute(
            "INSERT INTO races (
                race_id, seed, token_mint, entry_fee_lamports, status,
                created_at, started_at, deadline, price_samples, settlement
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            params![
                race.race_id,
                race.seed as i64,
                race.token_mint,
                race.entry_fee_lamports as i64,
                race.status.as_str(),
                race.created_at as i64,
                race.started_at.map(|v| v as i64),
                race.deadline.map(|v| v as i64),
                prices,
                encode_settlement(race.settlement.as_ref())?,
            ],
        )
        .map_err(|e| format!("insert race failed: {e}"))?;
        Self::write_players(&tx, race)?;
        tx.commit()
            .map_err(|e| format!("insert_race commit failed: {e}"))
    }

    /// Persist the mutable part of a race: status, timing, seats,
    /// submissions and settlement.
    pub fn save(&self, race: &Race, now: u64) -> Result<(), String> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| format!("save begin failed: {e}"))?;
        let settled_at = race.status.is_final().then_some(now as i64);
        let updated = tx
            .execute(
                "UPDATE races SET status = ?1, started_at = ?2, deadline = ?3,
                        settlement = ?4, settled_at = COALESCE(settled_at, ?5)
                 WHERE race_id = ?6",
                params![
                    race.status.as_str(),
                    race.started_at.map(|v| v as i64),
                    race.deadline.map(|v| v as i64),
                    encode_settlement(race.settlement.as_ref())?,
                    settled_at,
                    race.race_id,
                ],
            )
            .map_err(|e| format!("save race failed: {e}"))?;
        if updated == 0 {
            return Err(format!("save: race not found: {}", race.race_id));
        }
        Self::write_players(&tx, race)?;
        tx.commit().map_err(|e| format!("save commit failed: {e}"))
    }

    fn write_players(tx: &Transaction<'_>, race: &Race) -> Result<(), String> {
        for (seat, slot) in race.players.iter().enumerate() {
            let submission = slot.submission.as_ref();
            let verified = submission.and_then(|s| s.verification.verified.as_ref());
            tx.execute(
                "INSERT INTO players (
                    race_id, seat, wallet, claimed_finish_ms, claimed_coins, input_hash,
                    verdict, verified_finish_ms, verified_coins, submitted_at
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
                ON CONFLICT(race_id, seat) DO UPDATE SET
                    claimed_finish_ms = excluded.claimed_finish_ms,
                    claimed_coins = excluded.claimed_coins,
                    input_hash = excluded.input_hash,
                    verdict = excluded.verdict,
                    verified_finish_ms = excluded.verified_finish_ms,
                    verified_coins = excluded.verified_coins,
                    submitted_at = excluded.submitted_at
                WHERE players.wallet = excluded.wallet",
                params![
                    race.race_id,
                    seat as i64,
                    slot.wallet,
                    submission.map(|s| s.claimed.finish_time_ms as i64),
                    submission.map(|s| s.claimed.coins_collected as i64),
                    submission.map(|s| s.claimed.input_hash.as_str()),
                    submission.map(|s| verdict_to_str(s.verification.verdict)),
                    verified.map(|v| v.finish_time_ms as i64),
                    verified.map(|v| v.coins_collected as i64),
                    submission.map(|s| s.submitted_at as i64),
                ],
            )
            .map_err(|e| format!("write player {seat} failed: {e}"))?;
        }
        Ok(())
    }

    /// Read a race with its seats and submissions.
    pub fn get(&self, race_id: &str) -> Result<Option<Race>, String> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT race_id, seed, token_mint, entry_fee_lamports, status,
                        created_at, started_at, deadline, settlement
                 FROM races WHERE race_id = ?1",
                params![race_id],
                |row| {
                    Ok(RawRaceRow {
                        race_id: row.get(0)?,
                        seed: row.get(1)?,
                        token_mint: row.get(2)?,
                        entry_fee_lamports: row.get(3)?,
                        status: row.get(4)?,
                        created_at: row.get(5)?,
                        started_at: row.get(6)?,
                        deadline: row.get(7)?,
                        settlement: row.get(8)?,
                    })
                },
            )
            .optional()
            .map_err(|e| format!("get race failed: {e}"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let players = Self::read_players(&conn, race_id)?;
        Ok(Some(row.into_race(players)?))
    }

    fn read_players(conn: &Connection, race_id: &str) -> Result<Vec<PlayerSlot>, String> {
        let mut stmt = conn
            .prepare(
                "SELECT wallet, claimed_finish_ms, claimed_coins, input_hash, verdict,
                        verified_finish_ms, verified_coins, submitted_at
                 FROM players WHERE race_id = ?1 ORDER BY seat ASC",
            )
            .map_err(|e| format!("read_players prepare failed: {e}"))?;
        let rows = stmt
            .query_map(params![race_id], |row| {
                Ok(RawPlayerRow {
                    wallet: row.get(0)?,
                    claimed_finish_ms: row.get(1)?,
                    claimed_coins: row.get(2)?,
                    input_hash: row.get(3)?,
                    verdict: row.get(4)?,
                    verified_finish_ms: row.get(5)?,
                    verified_coins: row.get(6)?,
                    submitted_at: row.get(7)?,
                })
            })
            .map_err(|e| format!("read_players query failed: {e}"))?;

        let mut players = Vec::new();
        for row in rows {
            let row = row.map_err(|e| format!("read_players row decode failed: {e}"))?;
            players.push(row.into_slot()?);
        }
        Ok(players)
    }
}

struct RawRaceRow {
    race_id: String,
    seed: i64,
    token_mint: String,
    entry_fee_lamports: i64,
    status: String,
    created_at: i64,
    started_at: Option<i64>,
    deadline: Option<i64>,
    settlement: Option<String>,
}

impl RawRaceRow {
    fn into_race(self, players: Vec<PlayerSlot>) -> Result<Race, String> {
        let status = RaceStatus::parse(&self.status)
            .ok_or_else(|| format!("unknown race status in db: {}", self.status))?;
        let settlement = self
            .settlement
            .map(|text| {
                serde_json::from_str::<Settlement>(&text)
                    .map_err(|e| format!("bad settlement for race {}: {e}", self.race_id))
            })
            .transpose()?;

        Ok(Race {
            race_id: self.race_id,
            seed: self.seed as u32,
            token_mint: self.token_mint,
            entry_fee_lamports: self.entry_fee_lamports as u64,
            players,
            status,
            created_at: self.created_at as u64,
            started_at: self.started_at.map(|v| v as u64),
            deadline: self.deadline.map(|v| v as u64),
            settlement,
        })
    }
}

struct RawPlayerRow {
    wallet: String,
    claimed_finish_ms: Option<i64>,
    claimed_coins: Option<i64>,
    input_hash: Option<String>,
    verdict: Option<String>,
    verified_finish_ms: Option<i64>,
    verified_coins: Option<i64>,
    submitted_at: Option<i64>,
}

impl RawPlayerRow {
    fn into_slot(self) -> Result<PlayerSlot, String> {
        let Some(verdict) = self.verdict else {
            return Ok(PlayerSlot {
                wallet: self.wallet,
                submission: None,
            });
        };

        let verdict = verdict_from_str(&verdict)?;
        let input_hash = self.input_hash.unwrap_or_default();
        let claimed = RaceOutcome {
            finish_time_ms: self.claimed_finish_ms.unwrap_or(0) as u64,
            coins_collected: self.claimed_coins.unwrap_or(0) as u32,
            input_hash: input_hash.clone(),
        };
        // A verified outcome only exists once the hash matched, so the
        // claimed hash is also the verified one.
        let verified = match (self.verified_finish_ms, self.verified_coins) {
            (Some(finish_time_ms), Some(coins_collected)) => Some(RaceOutcome {
                finish_time_ms: finish_time_ms as u64,
                coins_collected: coins_collected as u32,
                input_hash,
            }),
            _ => None,
        };

        Ok(PlayerSlot {
            wallet: self.wallet,
            submission: Some(Submission {
                claimed,
                verification: Verification { verdict, verified },
                submitted_at: self.submitted_at.unwrap_or(0) as u64,
            }),
        })
    }
}

fn encode_settlement(settlement: Option<&Settlement>) -> Result<Option<String>, String> {
    settlement
        .map(|s| {
            serde_json::to_string(s).map_err(|e| format!("failed to serialize settlement: {e}"))
        })
        .transpose()
}

pub(super) fn verdict_to_str(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Accepted => "accepted",
        Verdict::Rejected(reason) => reason.as_str(),
    }
}

pub(super) fn verdict_from_str(s: &str) -> Result<Verdict, String> {
    if s == "accepted" {
        return Ok(Verdict::Accepted);
    }
    RejectReason::parse(s)
        .map(Verdict::Rejected)
        .ok_or_else(|| format!("unknown verdict in db: {s}"))
}
