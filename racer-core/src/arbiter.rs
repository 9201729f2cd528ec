//! Race lifecycle and settlement.
//!
//! All time is passed in as unix seconds; nothing here reads a clock.

use core::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ArbiterError;
use crate::verify::{RaceOutcome, RejectReason, Verdict, Verification};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceStatus {
    Waiting,
    Active,
    Settled,
    Voided,
}

impl RaceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Settled => "settled",
            Self::Voided => "voided",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "waiting" => Some(Self::Waiting),
            "active" => Some(Self::Active),
            "settled" => Some(Self::Settled),
            "voided" => Some(Self::Voided),
            _ => None,
        }
    }

    pub fn is_final(self) -> bool {
        matches!(self, Self::Settled | Self::Voided)
    }
}

impl fmt::Display for RaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub claimed: RaceOutcome,
    pub verification: Verification,
    pub submitted_at: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSlot {
    pub wallet: String,
    pub submission: Option<Submission>,
}

impl PlayerSlot {
    /// The slot as the payout side sees it. No submission is a forfeit.
    pub fn result(&self) -> PlayerResult {
        match &self.submission {
            Some(submission) => PlayerResult {
                wallet: self.wallet.clone(),
                verified_outcome: submission.verification.verified.clone(),
                verdict: submission.verification.verdict,
            },
            None => PlayerResult {
                wallet: self.wallet.clone(),
                verified_outcome: None,
                verdict: Verdict::Rejected(RejectReason::Forfeit),
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerResult {
    pub wallet: String,
    pub verified_outcome: Option<RaceOutcome>,
    pub verdict: Verdict,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    Winner { wallet: String },
    /// Same finish time and coin count. Settled without a winner and held
    /// for manual review.
    UnresolvedTie { wallets: Vec<String> },
    /// Nobody has an accepted result; entry fees go back.
    Void,
}

/// Output for the payout collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub race_id: String,
    pub winner_wallet: Option<String>,
    pub decision: Decision,
    pub needs_review: bool,
    pub player_results: Vec<PlayerResult>,
}

/// Rank accepted results by finish time, then by coins.
///
/// Depends only on the set of results, never on their order.
pub fn decide(results: &[PlayerResult]) -> Decision {
    let mut ranked: Vec<(&str, &RaceOutcome)> = results
        .iter()
        .filter(|result| result.verdict.is_accepted())
        .filter_map(|result| {
            result
                .verified_outcome
                .as_ref()
                .map(|outcome| (result.wallet.as_str(), outcome))
        })
        .collect();
    let key = |outcome: &RaceOutcome| (outcome.finish_time_ms, u32::MAX - outcome.coins_collected);
    ranked.sort_by(|a, b| key(a.1).cmp(&key(b.1)).then_with(|| a.0.cmp(b.0)));

    let Some((leader, best)) = ranked.first().copied() else {
        return Decision::Void;
    };

    let tied: Vec<String> = ranked
        .iter()
        .filter(|(_, outcome)| key(*outcome) == key(best))
        .map(|(wallet, _)| wallet.to_string())
        .collect();
    if tied.len() > 1 {
        return Decision::UnresolvedTie { wallets: tied };
    }

    Decision::Winner {
        wallet: leader.to_string(),
    }
}

pub const MAX_PLAYERS: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Race {
    pub race_id: String,
    pub seed: u32,
    pub token_mint: String,
    pub entry_fee_lamports: u64,
    pub players: Vec<PlayerSlot>,
    pub status: RaceStatus,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub deadline: Option<u64>,
    pub settlement: Option<Settlement>,
}

impl Race {
    pub fn new(
        race_id: impl Into<String>,
        seed: u32,
        token_mint: impl Into<String>,
        entry_fee_lamports: u64,
        creator_wallet: impl Into<String>,
        now: u64,
    ) -> Self {
        Self {
            race_id: race_id.into(),
            seed,
            token_mint: token_mint.into(),
            entry_fee_lamports,
            players: vec![PlayerSlot {
                wallet: creator_wallet.into(),
                submission: None,
            }],
            status: RaceStatus::Waiting,
            created_at: now,
            started_at: None,
            deadline: None,
            settlement: None,
        }
    }

    fn expect_status(&self, expected: RaceStatus) -> Result<(), ArbiterError> {
        if self.status != expected {
            return Err(ArbiterError::WrongStatus {
                expected,
                actual: self.status,
            });
        }
        Ok(())
    }

    pub fn player(&self, wallet: &str) -> Option<&PlayerSlot> {
        self.players.iter().find(|slot| slot.wallet == wallet)
    }

    pub fn has_player(&self, wallet: &str) -> bool {
        self.player(wallet).is_some()
    }

    pub fn winner_wallet(&self) -> Option<&str> {
        self.settlement
            .as_ref()
            .and_then(|settlement| settlement.winner_wallet.as_deref())
    }

    /// Second wallet pairs up; the submission window starts now.
    pub fn join(
        &mut self,
        wallet: impl Into<String>,
        now: u64,
        submission_window_secs: u64,
    ) -> Result<(), ArbiterError> {
        self.expect_status(RaceStatus::Waiting)?;
        let wallet = wallet.into();
        if self.has_player(&wallet) {
            return Err(ArbiterError::SameWallet);
        }

        self.players.push(PlayerSlot {
            wallet,
            submission: None,
        });
        self.status = RaceStatus::Active;
        self.started_at = Some(now);
        self.deadline = Some(now.saturating_add(submission_window_secs));
        Ok(())
    }

    /// Whether `wallet` may submit at `now`. Lets a caller refuse early,
    /// before paying for a replay.
    pub fn check_submission(&self, wallet: &str, now: u64) -> Result<(), ArbiterError> {
        self.expect_status(RaceStatus::Active)?;
        if let Some(deadline) = self.deadline {
            if now > deadline {
                return Err(ArbiterError::DeadlinePassed { deadline, now });
            }
        }

        let slot = self.player(wallet).ok_or_else(|| ArbiterError::UnknownPlayer {
            wallet: wallet.to_string(),
        })?;
        if slot.submission.is_some() {
            return Err(ArbiterError::DuplicateSubmission {
                wallet: wallet.to_string(),
            });
        }
        Ok(())
    }

    pub fn record_submission(
        &mut self,
        wallet: &str,
        claimed: RaceOutcome,
        verification: Verification,
        now: u64,
    ) -> Result<(), ArbiterError> {
        self.check_submission(wallet, now)?;

        let slot = self
            .players
            .iter_mut()
            .find(|slot| slot.wallet == wallet)
            .ok_or_else(|| ArbiterError::UnknownPlayer {
                wallet: wallet.to_string(),
            })?;
        slot.submission = Some(Submission {
            claimed,
            verification,
            submitted_at: now,
        });
        Ok(())
    }

    pub fn all_submitted(&self) -> bool {
        self.players.len() == MAX_PLAYERS
            && self.players.iter().all(|slot| slot.submission.is_some())
    }

    /// Settlement as it would be decided from the slots right now.
    pub fn compute_settlement(&self) -> Settlement {
        let player_results: Vec<PlayerResult> =
            self.players.iter().map(PlayerSlot::result).collect();
        let decision = decide(&player_results);
        let winner_wallet = match &decision {
            Decision::Winner { wallet } => Some(wallet.clone()),
            _ => None,
        };

        Settlement {
            race_id: self.race_id.clone(),
            winner_wallet,
            needs_review: matches!(decision, Decision::UnresolvedTie { .. }),
            decision,
            player_results,
        }
    }

    /// Settle once both players submitted or the window closed. Returns the
    /// settlement when this call made the transition.
    pub fn settle_if_ready(&mut self, now: u64) -> Option<&Settlement> {
        if self.status != RaceStatus::Active {
            return None;
        }
        let expired = self.deadline.is_some_and(|deadline| now > deadline);
        if !self.all_submitted() && !expired {
            return None;
        }

        let settlement = self.compute_settlement();
        self.status = match settlement.decision {
            Decision::Void => RaceStatus::Voided,
            _ => RaceStatus::Settled,
        };
        info!(
            race_id = %self.race_id,
            status = %self.status,
            winner = settlement.winner_wallet.as_deref().unwrap_or("-"),
            expired,
            "race settled"
        );
        self.settlement = Some(settlement);
        self.settlement.as_ref()
    }

    /// Void a race nobody joined within `ttl_secs`.
    pub fn expire_waiting(&mut self, now: u64, ttl_secs: u64) -> bool {
        if self.status != RaceStatus::Waiting || now < self.created_at.saturating_add(ttl_secs) {
            return false;
        }

        self.status = RaceStatus::Voided;
        self.settlement = Some(self.compute_settlement());
        info!(race_id = %self.race_id, "waiting race expired");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: u64 = 300;

    fn outcome(ms: u64, coins: u32) -> RaceOutcome {
        RaceOutcome {
            finish_time_ms: ms,
            coins_collected: coins,
            input_hash: format!("{ms:064x}"),
        }
    }

    fn accepted(ms: u64, coins: u32) -> Verification {
        Verification {
            verdict: Verdict::Accepted,
            verified: Some(outcome(ms, coins)),
        }
    }

    fn rejected(reason: RejectReason) -> Verification {
        Verification {
            verdict: Verdict::Rejected(reason),
            verified: None,
        }
    }

    fn result(wallet: &str, verification: Verification) -> PlayerResult {
        PlayerResult {
            wallet: wallet.into(),
            verified_outcome: verification.verified,
            verdict: verification.verdict,
        }
    }

    fn active_race() -> Race {
        let mut race = Race::new("race-1", 7, "mint", 5_000_000, "alice", 1_000);
        race.join("bob", 1_010, WINDOW).unwrap();
        race
    }

    fn submit(race: &mut Race, wallet: &str, verification: Verification, now: u64) {
        let claimed = verification
            .verified
            .clone()
            .unwrap_or_else(|| outcome(9_999, 0));
        race.record_submission(wallet, claimed, verification, now)
            .unwrap();
    }

    #[test]
    fn faster_finish_wins() {
        let decision = decide(&[
            result("alice", accepted(7_000, 3)),
            result("bob", accepted(6_900, 0)),
        ]);
        assert_eq!(
            decision,
            Decision::Winner {
                wallet: "bob".into()
            }
        );
    }

    #[test]
    fn coins_break_time_ties() {
        let decision = decide(&[
            result("alice", accepted(7_000, 3)),
            result("bob", accepted(7_000, 4)),
        ]);
        assert_eq!(
            decision,
            Decision::Winner {
                wallet: "bob".into()
            }
        );
    }

    #[test]
    fn full_tie_is_flagged_not_picked() {
        let decision = decide(&[
            result("bob", accepted(7_000, 4)),
            result("alice", accepted(7_000, 4)),
        ]);
        assert_eq!(
            decision,
            Decision::UnresolvedTie {
                wallets: vec!["alice".into(), "bob".into()]
            }
        );
    }

    #[test]
    fn rejected_players_cannot_win() {
        let decision = decide(&[
            result("alice", rejected(RejectReason::TraceTampered)),
            result("bob", accepted(9_000, 0)),
        ]);
        assert_eq!(
            decision,
            Decision::Winner {
                wallet: "bob".into()
            }
        );

        let decision = decide(&[
            result("alice", rejected(RejectReason::OutcomeMismatch)),
            result("bob", rejected(RejectReason::DidNotFinish)),
        ]);
        assert_eq!(decision, Decision::Void);
    }

    #[test]
    fn decision_ignores_argument_order() {
        let cases = [
            (accepted(7_000, 1), accepted(7_100, 9)),
            (accepted(7_000, 1), accepted(7_000, 1)),
            (accepted(7_000, 1), rejected(RejectReason::Forfeit)),
            (
                rejected(RejectReason::TraceEmpty),
                rejected(RejectReason::Forfeit),
            ),
        ];
        for (a, b) in cases {
            let forward = decide(&[result("alice", a.clone()), result("bob", b.clone())]);
            let backward = decide(&[result("bob", b), result("alice", a)]);
            assert_eq!(forward, backward);
        }
    }

    #[test]
    fn join_rules() {
        let mut race = Race::new("race-1", 7, "mint", 5_000_000, "alice", 1_000);
        assert_eq!(race.join("alice", 1_001, WINDOW), Err(ArbiterError::SameWallet));
        race.join("bob", 1_002, WINDOW).unwrap();
        assert_eq!(race.status, RaceStatus::Active);
        assert_eq!(race.deadline, Some(1_002 + WINDOW));
        assert_eq!(
            race.join("carol", 1_003, WINDOW),
            Err(ArbiterError::WrongStatus {
                expected: RaceStatus::Waiting,
                actual: RaceStatus::Active
            })
        );
    }

    #[test]
    fn submission_rules() {
        let mut race = Race::new("race-1", 7, "mint", 5_000_000, "alice", 1_000);
        assert!(matches!(
            race.record_submission("alice", outcome(1, 0), accepted(1, 0), 1_001),
            Err(ArbiterError::WrongStatus { .. })
        ));

        race.join("bob", 1_010, WINDOW).unwrap();
        assert_eq!(
            race.record_submission("mallory", outcome(1, 0), accepted(1, 0), 1_020),
            Err(ArbiterError::UnknownPlayer {
                wallet: "mallory".into()
            })
        );
        assert_eq!(race.check_submission("alice", 1_020), Ok(()));
        submit(&mut race, "alice", accepted(7_000, 2), 1_020);
        assert!(race.check_submission("alice", 1_021).is_err());
        assert_eq!(
            race.record_submission("alice", outcome(1, 0), accepted(1, 0), 1_021),
            Err(ArbiterError::DuplicateSubmission {
                wallet: "alice".into()
            })
        );
        assert_eq!(
            race.record_submission("bob", outcome(1, 0), accepted(1, 0), 1_010 + WINDOW + 1),
            Err(ArbiterError::DeadlinePassed {
                deadline: 1_010 + WINDOW,
                now: 1_010 + WINDOW + 1
            })
        );
    }

    #[test]
    fn waits_for_both_submissions() {
        let mut race = active_race();
        submit(&mut race, "alice", accepted(7_000, 2), 1_020);
        assert!(race.settle_if_ready(1_030).is_none());
        assert_eq!(race.status, RaceStatus::Active);

        submit(&mut race, "bob", accepted(7_500, 5), 1_040);
        let settlement = race.settle_if_ready(1_041).cloned().unwrap();
        assert_eq!(race.status, RaceStatus::Settled);
        assert_eq!(settlement.winner_wallet.as_deref(), Some("alice"));
        assert_eq!(race.winner_wallet(), Some("alice"));
        assert!(!settlement.needs_review);
        assert_eq!(settlement.player_results.len(), 2);

        // Already settled; nothing changes.
        assert!(race.settle_if_ready(2_000).is_none());
    }

    #[test]
    fn arrival_order_does_not_matter() {
        let mut first = active_race();
        submit(&mut first, "alice", accepted(7_000, 2), 1_020);
        submit(&mut first, "bob", accepted(7_000, 3), 1_030);

        let mut second = active_race();
        submit(&mut second, "bob", accepted(7_000, 3), 1_020);
        submit(&mut second, "alice", accepted(7_000, 2), 1_030);

        let a = first.settle_if_ready(1_040).cloned().unwrap();
        let b = second.settle_if_ready(1_040).cloned().unwrap();
        assert_eq!(a.decision, b.decision);
        assert_eq!(a.winner_wallet.as_deref(), Some("bob"));
        assert_eq!(first.compute_settlement(), a);
    }

    #[test]
    fn deadline_forfeits_missing_player() {
        let mut race = active_race();
        submit(&mut race, "bob", accepted(8_000, 0), 1_020);
        assert!(race.settle_if_ready(1_010 + WINDOW).is_none());

        let settlement = race.settle_if_ready(1_010 + WINDOW + 1).cloned().unwrap();
        assert_eq!(settlement.winner_wallet.as_deref(), Some("bob"));
        let alice = &settlement.player_results[0];
        assert_eq!(alice.wallet, "alice");
        assert_eq!(alice.verdict, Verdict::Rejected(RejectReason::Forfeit));
    }

    #[test]
    fn nobody_accepted_voids() {
        let mut race = active_race();
        submit(&mut race, "alice", rejected(RejectReason::TraceTampered), 1_020);
        let settlement = race.settle_if_ready(1_010 + WINDOW + 1).cloned().unwrap();
        assert_eq!(race.status, RaceStatus::Voided);
        assert_eq!(settlement.decision, Decision::Void);
        assert_eq!(settlement.winner_wallet, None);
    }

    #[test]
    fn tie_settles_for_review() {
        let mut race = active_race();
        submit(&mut race, "alice", accepted(7_000, 2), 1_020);
        submit(&mut race, "bob", accepted(7_000, 2), 1_030);
        let settlement = race.settle_if_ready(1_031).cloned().unwrap();
        assert_eq!(race.status, RaceStatus::Settled);
        assert!(settlement.needs_review);
        assert_eq!(settlement.winner_wallet, None);
    }

    #[test]
    fn waiting_race_expires() {
        let mut race = Race::new("race-1", 7, "mint", 5_000_000, "alice", 1_000);
        assert!(!race.expire_waiting(1_599, 600));
        assert!(race.expire_waiting(1_600, 600));
        assert_eq!(race.status, RaceStatus::Voided);
        assert_eq!(race.settlement.as_ref().unwrap().decision, Decision::Void);
        assert!(!race.expire_waiting(5_000, 600));
    }

    #[test]
    fn status_strings() {
        for status in [
            RaceStatus::Waiting,
            RaceStatus::Active,
            RaceStatus::Settled,
            RaceStatus::Voided,
        ] {
            assert_eq!(RaceStatus::parse(status.as_str()), Some(status));
        }
        assert!(RaceStatus::Voided.is_final());
        assert!(!RaceStatus::Active.is_final());
    }
}
