use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Opaque ID types for type safety
pub type ContestCode = String;
pub type MatchId = String;
pub type Username = String;

/// Final result of a match in the 3-way 1/X/2 notation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "1")]
    Home,
    #[serde(rename = "X")]
    Draw,
    #[serde(rename = "2")]
    Away,
}

impl Outcome {
    pub fn code(&self) -> &'static str {
        match self {
            Outcome::Home => "1",
            Outcome::Draw => "X",
            Outcome::Away => "2",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(Outcome::Home),
            "X" => Ok(Outcome::Draw),
            "2" => Ok(Outcome::Away),
            other => Err(other.to_string()),
        }
    }
}

/// A participant's pick for one match. `Help` is the joker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pick {
    #[serde(rename = "1")]
    Home,
    #[serde(rename = "X")]
    Draw,
    #[serde(rename = "2")]
    Away,
    #[serde(rename = "HELP")]
    Help,
}

impl Pick {
    pub fn is_joker(&self) -> bool {
        matches!(self, Pick::Help)
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Pick::Home => Some(Outcome::Home),
            Pick::Draw => Some(Outcome::Draw),
            Pick::Away => Some(Outcome::Away),
            Pick::Help => None,
        }
    }

    /// Whether this pick earns the point for a match that ended with `result`
    pub fn scores_against(&self, result: Outcome) -> bool {
        self.is_joker() || self.outcome() == Some(result)
    }
}

impl From<Outcome> for Pick {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Home => Pick::Home,
            Outcome::Draw => Pick::Draw,
            Outcome::Away => Pick::Away,
        }
    }
}

impl FromStr for Pick {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "HELP" => Ok(Pick::Help),
            other => other.parse::<Outcome>().map(Pick::from),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Match {
    pub id: MatchId,
    /// 1-based position in the round's list
    pub n: u32,
    pub date: String,
    pub time: String,
    /// `date` + `time` resolved to an instant; `None` when they don't parse
    pub starts_at: Option<DateTime<Utc>>,
    pub home: String,
    pub away: String,
    /// Postponed or cancelled
    pub off: bool,
    pub result: Option<Outcome>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LifecycleFlags {
    pub contest_started: bool,
    pub matches_locked: bool,
    pub results_locked: bool,
    pub round_closed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalWinner {
    pub username: Username,
    pub recorded_at: DateTime<Utc>,
}

/// The contest aggregate. Every successful mutation bumps `version`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contest {
    pub code: ContestCode,
    pub version: u64,
    #[serde(default)]
    pub title: Option<String>,
    pub round: u32,
    pub prize_text: String,
    pub ends_at: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    /// Usernames frozen when the contest starts
    pub eligible_users: BTreeSet<Username>,
    #[serde(flatten)]
    pub flags: LifecycleFlags,
    pub last_scored_round: u32,
    pub final_week: bool,
    pub final_winner: Option<FinalWinner>,
    pub matches: Vec<Match>,
}

impl Contest {
    pub fn new(code: ContestCode) -> Self {
        Self {
            code,
            version: 1,
            title: None,
            round: 1,
            prize_text: String::new(),
            ends_at: None,
            created_at: Utc::now(),
            started_at: None,
            eligible_users: BTreeSet::new(),
            flags: LifecycleFlags::default(),
            last_scored_round: 0,
            final_week: false,
            final_winner: None,
            matches: Vec::new(),
        }
    }

    pub fn find_match(&self, match_id: &str) -> Option<&Match> {
        self.matches.iter().find(|m| m.id == match_id)
    }

    pub fn find_match_mut(&mut self, match_id: &str) -> Option<&mut Match> {
        self.matches.iter_mut().find(|m| m.id == match_id)
    }

    /// Mark a committed mutation
    pub fn touch(&mut self) {
        self.version += 1;
    }
}

/// Per-user joker allowance for one contest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entitlement {
    pub remaining: u32,
    pub used_match_ids: Vec<MatchId>,
    pub purchased_at: DateTime<Utc>,
}

impl Entitlement {
    pub fn grant(allowance: u32) -> Self {
        Self {
            remaining: allowance,
            used_match_ids: Vec::new(),
            purchased_at: Utc::now(),
        }
    }

    pub fn is_used_on(&self, match_id: &str) -> bool {
        self.used_match_ids.iter().any(|id| id == match_id)
    }
}

/// A user as reported by the external directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub username: Username,
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
    /// Account creation time, when the directory knows it
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Cumulative points for one contest, kept as per-round contributions
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScoreLedger {
    pub by_round: BTreeMap<u32, BTreeMap<Username, u32>>,
}

impl ScoreLedger {
    /// Add one round's points on top of whatever that round already holds
    pub fn credit_round(&mut self, round: u32, points: impl IntoIterator<Item = (Username, u32)>) {
        let entry = self.by_round.entry(round).or_default();
        for (username, pts) in points {
            *entry.entry(username).or_insert(0) += pts;
        }
    }

    /// Rebuild cumulative totals by summing every round
    pub fn totals(&self) -> BTreeMap<Username, u32> {
        let mut totals = BTreeMap::new();
        for round in self.by_round.values() {
            for (username, pts) in round {
                *totals.entry(username.clone()).or_insert(0) += pts;
            }
        }
        totals
    }
}

/// Participant locked their own picks for a round
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoundLockKey {
    pub contest: ContestCode,
    pub round: u32,
    pub username: Username,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardEntry {
    pub username: Username,
    pub total_points: u32,
    pub bonus_count: u32,
    pub longest_bonus_streak: u32,
    pub near_perfect_rounds: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_parsing() {
        assert_eq!("1".parse::<Pick>(), Ok(Pick::Home));
        assert_eq!(" X ".parse::<Pick>(), Ok(Pick::Draw));
        assert_eq!("HELP".parse::<Pick>(), Ok(Pick::Help));
        assert!("x".parse::<Pick>().is_err());
        assert!("3".parse::<Outcome>().is_err());
    }

    #[test]
    fn test_pick_serde_codes() {
        assert_eq!(serde_json::to_string(&Pick::Help).unwrap(), "\"HELP\"");
        assert_eq!(serde_json::to_string(&Outcome::Draw).unwrap(), "\"X\"");
        let pick: Pick = serde_json::from_str("\"2\"").unwrap();
        assert_eq!(pick, Pick::Away);
    }

    #[test]
    fn test_joker_scores_against_any_result() {
        for result in [Outcome::Home, Outcome::Draw, Outcome::Away] {
            assert!(Pick::Help.scores_against(result));
        }
        assert!(Pick::Home.scores_against(Outcome::Home));
        assert!(!Pick::Home.scores_against(Outcome::Away));
    }

    #[test]
    fn test_ledger_totals_sum_rounds() {
        let mut ledger = ScoreLedger::default();
        ledger.credit_round(1, [("anna".to_string(), 5), ("nikos".to_string(), 2)]);
        ledger.credit_round(2, [("anna".to_string(), 1)]);

        let totals = ledger.totals();
        assert_eq!(totals.get("anna"), Some(&6));
        assert_eq!(totals.get("nikos"), Some(&2));
    }
}
