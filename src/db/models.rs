use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::Row;
use sqlx::postgres::PgRow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
#[error("invalid {kind} value: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        ParseEnumError {
            kind,
            value: value.to_string(),
        }
    }
}

/// Poll lifecycle states. Stored uppercase; parsed case-insensitively so
/// query params like `?status=active` match the stored values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Active,
    Pending,
    Ended,
    Cancelled,
}

impl PollStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollStatus::Active => "ACTIVE",
            PollStatus::Pending => "PENDING",
            PollStatus::Ended => "ENDED",
            PollStatus::Cancelled => "CANCELLED",
        }
    }

    /// Status a poll should have given its time window, ignoring
    /// explicit cancellation or early ending.
    pub fn for_window(now: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> PollStatus {
        if now < start {
            PollStatus::Pending
        } else if now < end {
            PollStatus::Active
        } else {
            PollStatus::Ended
        }
    }

    /// ENDED and CANCELLED polls never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PollStatus::Ended | PollStatus::Cancelled)
    }
}

impl FromStr for PollStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(PollStatus::Active),
            "PENDING" => Ok(PollStatus::Pending),
            "ENDED" => Ok(PollStatus::Ended),
            "CANCELLED" => Ok(PollStatus::Cancelled),
            _ => Err(ParseEnumError::new("status", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollType {
    SingleChoice,
    MultipleChoice,
    RankedChoice,
}

impl PollType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollType::SingleChoice => "SINGLE_CHOICE",
            PollType::MultipleChoice => "MULTIPLE_CHOICE",
            PollType::RankedChoice => "RANKED_CHOICE",
        }
    }
}

impl FromStr for PollType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SINGLE_CHOICE" => Ok(PollType::SingleChoice),
            "MULTIPLE_CHOICE" => Ok(PollType::MultipleChoice),
            "RANKED_CHOICE" => Ok(PollType::RankedChoice),
            _ => Err(ParseEnumError::new("poll type", s)),
        }
    }
}

/// Public votes carry a wallet address and a signature transaction id.
/// Private (MPC) votes carry only a verification hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteKind {
    Public,
    Private,
}

impl VoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteKind::Public => "Public",
            VoteKind::Private => "Private",
        }
    }
}

impl FromStr for VoteKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("public") {
            Ok(VoteKind::Public)
        } else if s.eq_ignore_ascii_case("private") {
            Ok(VoteKind::Private)
        } else {
            Err(ParseEnumError::new("vote kind", s))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        }
    }
}

impl FromStr for Network {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            _ => Err(ParseEnumError::new("network", s)),
        }
    }
}

macro_rules! string_enum_serde {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(D::Error::custom)
            }
        }
    };
}

string_enum_serde!(PollStatus);
string_enum_serde!(PollType);
string_enum_serde!(VoteKind);
string_enum_serde!(Network);

#[derive(Debug, Clone, Serialize)]
pub struct Poll {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub creator: String,
    pub poll_type: PollType,
    pub max_selections: i32,
    pub status: PollStatus,
    pub network: Network,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_votes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollOption {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub option_text: String,
    pub position: i32,
    pub votes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Vote {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub voter: Option<String>,
    pub kind: VoteKind,
    pub tx_id: Option<String>,
    pub verification_hash: Option<String>,
    pub network: Network,
    pub created_at: DateTime<Utc>,
}

fn decode_enum<T: FromStr<Err = ParseEnumError>>(
    row: &PgRow,
    column: &'static str,
) -> Result<T, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|e: ParseEnumError| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
}

impl Poll {
    pub fn from_row(row: &PgRow) -> Result<Poll, sqlx::Error> {
        Ok(Poll {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            creator: row.try_get("creator")?,
            poll_type: decode_enum(row, "poll_type")?,
            max_selections: row.try_get("max_selections")?,
            status: decode_enum(row, "status")?,
            network: decode_enum(row, "network")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            total_votes: row.try_get("total_votes")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl PollOption {
    pub fn from_row(row: &PgRow) -> Result<PollOption, sqlx::Error> {
        Ok(PollOption {
            id: row.try_get("id")?,
            poll_id: row.try_get("poll_id")?,
            option_text: row.try_get("option_text")?,
            position: row.try_get("position")?,
            votes: row.try_get("votes")?,
        })
    }
}

impl Vote {
    pub fn from_row(row: &PgRow) -> Result<Vote, sqlx::Error> {
        Ok(Vote {
            id: row.try_get("id")?,
            poll_id: row.try_get("poll_id")?,
            voter: row.try_get("voter")?,
            kind: decode_enum(row, "kind")?,
            tx_id: row.try_get("tx_id")?,
            verification_hash: row.try_get("verification_hash")?,
            network: decode_enum(row, "network")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("ACTIVE".parse::<PollStatus>().unwrap(), PollStatus::Active);
        assert_eq!("active".parse::<PollStatus>().unwrap(), PollStatus::Active);
        assert_eq!("Pending".parse::<PollStatus>().unwrap(), PollStatus::Pending);
        assert_eq!(
            "cancelled".parse::<PollStatus>().unwrap(),
            PollStatus::Cancelled
        );
        assert!("ARCHIVED".parse::<PollStatus>().is_err());
    }

    #[test]
    fn poll_type_parses_case_insensitively() {
        assert_eq!(
            "single_choice".parse::<PollType>().unwrap(),
            PollType::SingleChoice
        );
        assert_eq!(
            "RANKED_CHOICE".parse::<PollType>().unwrap(),
            PollType::RankedChoice
        );
        assert!("APPROVAL".parse::<PollType>().is_err());
    }

    #[test]
    fn vote_kind_and_network_round_trip() {
        for kind in [VoteKind::Public, VoteKind::Private] {
            assert_eq!(kind.as_str().parse::<VoteKind>().unwrap(), kind);
        }
        for network in [Network::Mainnet, Network::Testnet] {
            assert_eq!(network.as_str().parse::<Network>().unwrap(), network);
        }
        assert_eq!("PUBLIC".parse::<VoteKind>().unwrap(), VoteKind::Public);
        assert!("devnet".parse::<Network>().is_err());
    }

    #[test]
    fn enums_serialize_to_canonical_strings() {
        assert_eq!(
            serde_json::to_string(&PollStatus::Active).unwrap(),
            "\"ACTIVE\""
        );
        assert_eq!(
            serde_json::to_string(&PollType::MultipleChoice).unwrap(),
            "\"MULTIPLE_CHOICE\""
        );
        assert_eq!(
            serde_json::to_string(&VoteKind::Private).unwrap(),
            "\"Private\""
        );
        assert_eq!(
            serde_json::to_string(&Network::Testnet).unwrap(),
            "\"testnet\""
        );
        let status: PollStatus = serde_json::from_str("\"ended\"").unwrap();
        assert_eq!(status, PollStatus::Ended);
    }

    #[test]
    fn window_status_derivation() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 8, 0, 0, 0).unwrap();

        let before = Utc.with_ymd_and_hms(2025, 5, 31, 23, 59, 59).unwrap();
        let during = Utc.with_ymd_and_hms(2025, 6, 4, 12, 0, 0).unwrap();
        let at_end = Utc.with_ymd_and_hms(2025, 6, 8, 0, 0, 0).unwrap();

        assert_eq!(
            PollStatus::for_window(before, start, end),
            PollStatus::Pending
        );
        assert_eq!(
            PollStatus::for_window(during, start, end),
            PollStatus::Active
        );
        assert_eq!(PollStatus::for_window(at_end, start, end), PollStatus::Ended);
    }

    #[test]
    fn terminal_states() {
        assert!(PollStatus::Ended.is_terminal());
        assert!(PollStatus::Cancelled.is_terminal());
        assert!(!PollStatus::Active.is_terminal());
        assert!(!PollStatus::Pending.is_terminal());
    }
}
