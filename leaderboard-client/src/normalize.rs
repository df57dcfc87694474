use thiserror::Error;

use crate::models::{PlayerRecord, PlayerSource, PlayersInfo};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("no player info for {username}")]
    MissingPlayerInfo { username: String },
    #[error("malformed player list: {0}")]
    Shape(String),
}

/// Builds ranked rows for one page. Ranks start at `offset + 1`.
///
/// A page whose metadata is missing any listed player is rejected as a whole.
pub fn normalize(
    source: &PlayerSource,
    info: &PlayersInfo,
    offset: u64,
) -> Result<Vec<PlayerRecord>, NormalizeError> {
    let entries: Vec<(&str, f64)> = match source {
        PlayerSource::Flattened(pairs) => pairs
            .iter()
            .map(|(username, money)| (username.as_str(), *money))
            .collect(),
        PlayerSource::Objects(entries) => entries
            .iter()
            .map(|entry| (entry.username.as_str(), entry.money))
            .collect(),
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, (username, money))| {
            let meta = info
                .get(username)
                .ok_or_else(|| NormalizeError::MissingPlayerInfo {
                    username: username.to_string(),
                })?;
            let rank = offset
                .checked_add(1 + index as u64)
                .ok_or_else(|| {
                    NormalizeError::Shape(format!("rank past offset {} overflows", offset))
                })?;
            Ok(PlayerRecord {
                rank,
                username: username.to_string(),
                money,
                country: meta.country.clone(),
                daily_diff: meta.daily_diff,
            })
        })
        .collect()
}
