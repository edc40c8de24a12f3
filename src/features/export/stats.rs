//! Match statistics rows and their aggregation.
//!
//! Rows come from the `match_stats` table with the match and player embedded
//! as `matches` and `players`. The backend is loose about types, so counts
//! and ids are accepted as numbers, numeric strings, or null.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::RallyError;

/// The match a stat line belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchInfo {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub opponent: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub result: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub score: Option<String>,
}

impl MatchInfo {
    /// Calendar date of the match, if the stored value starts with `YYYY-MM-DD`.
    #[must_use]
    pub fn day(&self) -> Option<NaiveDate> {
        let date = self.date.as_deref()?;
        NaiveDate::parse_from_str(date.get(..10)?, "%Y-%m-%d").ok()
    }

    /// Whether the recorded result is a win (`win`, `W`, `Won`...).
    #[must_use]
    pub fn is_win(&self) -> bool {
        self.result
            .as_deref()
            .is_some_and(|r| r.trim().to_lowercase().starts_with('w'))
    }

    /// Whether the recorded result is a loss.
    #[must_use]
    pub fn is_loss(&self) -> bool {
        self.result
            .as_deref()
            .is_some_and(|r| r.trim().to_lowercase().starts_with('l'))
    }

    /// Key identifying the match when grouping rows.
    fn key(&self) -> String {
        self.id.clone().unwrap_or_else(|| {
            format!(
                "{}|{}",
                self.date.as_deref().unwrap_or_default(),
                self.opponent.as_deref().unwrap_or_default()
            )
        })
    }
}

/// The player a stat line belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub position: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub jersey_number: Option<String>,
}

impl PlayerInfo {
    #[must_use]
    pub fn full_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One player's numbers for one match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatLine {
    #[serde(default, rename = "playerId", deserialize_with = "lenient_string")]
    pub player_id: Option<String>,
    #[serde(default, rename = "matches")]
    pub game: Option<MatchInfo>,
    #[serde(default, rename = "players")]
    pub player: Option<PlayerInfo>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub serves: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    pub aces: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    pub kills: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    pub blocks: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    pub digs: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    pub assists: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    pub errors: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    pub points: u32,
}

impl StatLine {
    /// Parse the JSON array returned by a `match_stats` fetch.
    ///
    /// # Errors
    ///
    /// Returns `RallyError::Parse` if `rows` is not an array of objects.
    pub fn parse_rows(rows: &Value) -> Result<Vec<Self>, RallyError> {
        if !rows.is_array() {
            return Err(RallyError::Parse(
                "Expected an array of match_stats rows".to_string(),
            ));
        }
        Ok(Vec::<Self>::deserialize(rows)?)
    }

    #[must_use]
    pub fn day(&self) -> Option<NaiveDate> {
        self.game.as_ref().and_then(MatchInfo::day)
    }

    /// The `playerId` column, or the embedded player's id.
    #[must_use]
    pub fn player_key(&self) -> Option<&str> {
        self.player_id
            .as_deref()
            .or_else(|| self.player.as_ref()?.id.as_deref())
    }

    #[must_use]
    pub fn match_key(&self) -> Option<&str> {
        self.game.as_ref()?.id.as_deref()
    }

    /// Whether the match date falls inside `[from, to]`.
    ///
    /// Lines without a readable date only pass an unbounded range.
    #[must_use]
    pub fn in_range(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
        if from.is_none() && to.is_none() {
            return true;
        }
        self.day().is_some_and(|day| {
            from.map_or(true, |f| day >= f) && to.map_or(true, |t| day <= t)
        })
    }
}

/// Per-match averages for one player.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerAverages {
    pub player: String,
    pub matches: usize,
    pub kills: f64,
    pub aces: f64,
    pub blocks: f64,
    pub digs: f64,
    pub points: f64,
}

/// Team-level summary of a set of stat lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamSummary {
    /// Distinct matches seen
    pub matches_played: usize,
    pub wins: usize,
    pub losses: usize,
    /// wins / (wins + losses), 0 when no decided matches
    pub win_rate: f64,
    /// Sorted by player name
    pub players: Vec<PlayerAverages>,
}

#[derive(Default)]
struct PlayerTotals {
    matches: HashSet<String>,
    kills: u64,
    aces: u64,
    blocks: u64,
    digs: u64,
    points: u64,
}

impl TeamSummary {
    /// Aggregate stat lines into match results and per-player averages.
    #[must_use]
    pub fn calculate(lines: &[StatLine]) -> Self {
        let mut results: HashMap<String, &MatchInfo> = HashMap::new();
        let mut totals: BTreeMap<String, PlayerTotals> = BTreeMap::new();

        for line in lines {
            let match_key = line.game.as_ref().map(|game| {
                results.entry(game.key()).or_insert(game);
                game.key()
            });

            let name = line
                .player
                .as_ref()
                .map(PlayerInfo::full_name)
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| "Unknown".to_string());

            let entry = totals.entry(name).or_default();
            let match_key = match_key.unwrap_or_else(|| format!("#{}", entry.matches.len()));
            entry.matches.insert(match_key);
            entry.kills += u64::from(line.kills);
            entry.aces += u64::from(line.aces);
            entry.blocks += u64::from(line.blocks);
            entry.digs += u64::from(line.digs);
            entry.points += u64::from(line.points);
        }

        let wins = results.values().filter(|m| m.is_win()).count();
        let losses = results.values().filter(|m| m.is_loss()).count();
        let decided = wins + losses;

        let players = totals
            .into_iter()
            .map(|(player, t)| {
                let matches = t.matches.len();
                let per_match = |total: u64| {
                    if matches > 0 {
                        total as f64 / matches as f64
                    } else {
                        0.0
                    }
                };
                PlayerAverages {
                    player,
                    matches,
                    kills: per_match(t.kills),
                    aces: per_match(t.aces),
                    blocks: per_match(t.blocks),
                    digs: per_match(t.digs),
                    points: per_match(t.points),
                }
            })
            .collect();

        Self {
            matches_played: results.len(),
            wins,
            losses,
            win_rate: if decided > 0 {
                wins as f64 / decided as f64
            } else {
                0.0
            },
            players,
        }
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

fn lenient_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let count = match &value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    Ok(count.and_then(|c| u32::try_from(c).ok()).unwrap_or(0))
}
