use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::PER_PAGE;
use crate::normalize::NormalizeError;

/// One UI-ready leaderboard row.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub rank: u64,
    pub username: String,
    pub money: f64,
    pub country: String,
    pub daily_diff: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PlayerInfo {
    pub country: String,
    #[serde(rename = "dailydiff", alias = "dailyDiff")]
    pub daily_diff: f64,
}

pub type PlayersInfo = HashMap<String, PlayerInfo>;

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PlayerEntry {
    pub username: String,
    pub money: f64,
}

/// Player list in either of the two shapes the backend produces.
#[derive(Clone, Debug, PartialEq)]
pub enum PlayerSource {
    /// `[username, money, username, money, ...]` collapsed into pairs.
    Flattened(Vec<(String, f64)>),
    Objects(Vec<PlayerEntry>),
}

/// Body of `/api/players` and `/api/players/calculate-prize-pool`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPage {
    #[serde(default)]
    pub players: Vec<Value>,
    #[serde(default)]
    pub players_info: PlayersInfo,
    #[serde(default)]
    pub from_redis: bool,
}

impl PlayerPage {
    /// Resolves the `fromRedis` flag into a tagged source.
    pub fn into_source(self) -> Result<(PlayerSource, PlayersInfo), NormalizeError> {
        let source = if self.from_redis {
            PlayerSource::Flattened(flattened_pairs(&self.players)?)
        } else {
            let entries = self
                .players
                .into_iter()
                .enumerate()
                .map(|(index, value)| {
                    serde_json::from_value::<PlayerEntry>(value).map_err(|err| {
                        NormalizeError::Shape(format!("player entry {}: {}", index, err))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            PlayerSource::Objects(entries)
        };
        Ok((source, self.players_info))
    }
}

fn flattened_pairs(values: &[Value]) -> Result<Vec<(String, f64)>, NormalizeError> {
    if values.len() % 2 != 0 {
        return Err(NormalizeError::Shape(format!(
            "flattened player list has odd length {}",
            values.len()
        )));
    }
    values
        .chunks(2)
        .enumerate()
        .map(|(index, pair)| {
            let username = pair[0].as_str().ok_or_else(|| {
                NormalizeError::Shape(format!("username at pair {} is not a string", index))
            })?;
            let money = parse_score(&pair[1]).ok_or_else(|| {
                NormalizeError::Shape(format!("score for {} is not numeric", username))
            })?;
            Ok((username.to_string(), money))
        })
        .collect()
}

fn parse_score(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ResetResponse {
    #[serde(default)]
    pub success: bool,
}

/// One day of a weekly simulation pushed on the `simulate` channel.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationTick {
    pub day: u8,
    #[serde(default)]
    pub players: Value,
    #[serde(default)]
    pub players_info: Value,
}

/// Total player count pushed on `playerCount`; numbers or numeric strings.
pub fn parse_player_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|count| *count >= 0.0).map(|count| count as u64)),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PageWindow {
    pub rows: Vec<PlayerRecord>,
    pub offset: u64,
    pub page_count: u64,
    pub per_page: u64,
}

impl Default for PageWindow {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            offset: 0,
            page_count: 0,
            per_page: PER_PAGE,
        }
    }
}

impl PageWindow {
    pub fn current_page(&self) -> u64 {
        self.offset / self.per_page.max(1)
    }

    /// `None` when the page lies beyond the addressable offsets.
    pub fn offset_for_page(&self, page: u64) -> Option<u64> {
        page.checked_mul(self.per_page)
    }

    pub fn page_count_for(&self, player_count: u64) -> u64 {
        player_count.div_ceil(self.per_page.max(1))
    }

    /// Installs a freshly normalized page.
    pub fn replace(&mut self, mut rows: Vec<PlayerRecord>, offset: u64) {
        rows.truncate(self.per_page as usize);
        self.rows = rows;
        self.offset = offset;
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.offset = 0;
    }
}
