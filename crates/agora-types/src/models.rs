use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A post joined with its vote total.
///
/// `vote_count` is never stored on the row; it is `SUM(vote)` over the post's
/// votes at read time, 0 when nobody voted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: String,
    pub vote_count: i64,
}

/// Paging facts derived from the total row count. All-zero for an empty result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub current_page: i64,
    pub page_size: i64,
    pub first_page: i64,
    pub last_page: i64,
    pub total_records: i64,
}

impl Metadata {
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records <= 0 || page_size <= 0 {
            return Self::default();
        }

        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }
}

/// One page of the post listing. Also the serialized shape of the cached
/// top-posts snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostsPage {
    pub posts: Vec<Post>,
    pub metadata: Metadata,
}

// -- Votes --

/// A single user's vote on a post: exactly +1 or -1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteValue {
    Up,
    Down,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("vote value must be 1 or -1")]
pub struct InvalidVoteValue;

impl VoteValue {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }
}

impl TryFrom<i64> for VoteValue {
    type Error = InvalidVoteValue;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Up),
            -1 => Ok(Self::Down),
            _ => Err(InvalidVoteValue),
        }
    }
}

impl FromStr for VoteValue {
    type Err = InvalidVoteValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" => Ok(Self::Up),
            "-1" => Ok(Self::Down),
            _ => Err(InvalidVoteValue),
        }
    }
}

impl fmt::Display for VoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}

/// Wire form of a vote: clients send `"1"` / `"-1"`, integers are tolerated.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawVote {
    Text(String),
    Number(i64),
}

impl TryFrom<RawVote> for VoteValue {
    type Error = InvalidVoteValue;

    fn try_from(raw: RawVote) -> Result<Self, Self::Error> {
        match raw {
            RawVote::Text(s) => s.parse(),
            RawVote::Number(n) => n.try_into(),
        }
    }
}

impl<'de> Deserialize<'de> for VoteValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawVote::deserialize(deserializer)?;
        VoteValue::try_from(raw).map_err(serde::de::Error::custom)
    }
}

impl Serialize for VoteValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_is_zero_for_empty_results() {
        assert_eq!(Metadata::calculate(0, 3, 5), Metadata::default());
    }

    #[test]
    fn metadata_rounds_last_page_up() {
        let m = Metadata::calculate(11, 2, 5);
        assert_eq!(m.current_page, 2);
        assert_eq!(m.first_page, 1);
        assert_eq!(m.last_page, 3);
        assert_eq!(m.total_records, 11);

        assert_eq!(Metadata::calculate(10, 1, 5).last_page, 2);
    }

    #[test]
    fn vote_value_allow_list() {
        assert_eq!("1".parse::<VoteValue>(), Ok(VoteValue::Up));
        assert_eq!("-1".parse::<VoteValue>(), Ok(VoteValue::Down));
        assert!("0".parse::<VoteValue>().is_err());
        assert!("+1".parse::<VoteValue>().is_err());
        assert!(VoteValue::try_from(2).is_err());
    }

    #[test]
    fn vote_value_wire_forms() {
        let v: VoteValue = serde_json::from_str("\"-1\"").unwrap();
        assert_eq!(v, VoteValue::Down);
        let v: VoteValue = serde_json::from_str("1").unwrap();
        assert_eq!(v, VoteValue::Up);
        assert!(serde_json::from_str::<VoteValue>("\"up\"").is_err());
        assert!(serde_json::from_str::<VoteValue>("0").is_err());
        assert_eq!(serde_json::to_string(&VoteValue::Down).unwrap(), "\"-1\"");
    }
}
