use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datetime::iso_date_serde;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RentalKind {
    Rental,
    Sale,
}

impl FromStr for RentalKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rental" | "location" => Ok(Self::Rental),
            "sale" | "vente" => Ok(Self::Sale),
            other => Err(anyhow!("unknown rental kind: {other}")),
        }
    }
}

impl fmt::Display for RentalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rental => f.write_str("rental"),
            Self::Sale => f.write_str("sale"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rental {
    pub uuid: Uuid,

    pub id: u64,

    pub label: String,

    pub kind: RentalKind,

    #[serde(with = "iso_date_serde")]
    pub start_date: NaiveDate,

    /// Last day covered by rent already received.
    #[serde(default, with = "iso_date_serde::option")]
    pub end_date: Option<NaiveDate>,

    #[serde(default)]
    pub paid: bool,

    pub entry: DateTime<Utc>,

    pub modified: DateTime<Utc>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Rental {
    pub fn new(label: String, start_date: NaiveDate, now: DateTime<Utc>, id: u64) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            id,
            label,
            kind: RentalKind::Rental,
            start_date,
            end_date: None,
            paid: false,
            entry: now,
            modified: now,
            extra: BTreeMap::new(),
        }
    }
}

/// How a command line names a rental: its short id or its uuid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RentalRef {
    Id(u64),
    Uuid(Uuid),
}

impl RentalRef {
    pub fn matches(&self, rental: &Rental) -> bool {
        match self {
            Self::Id(id) => rental.id == *id,
            Self::Uuid(uuid) => rental.uuid == *uuid,
        }
    }
}

impl FromStr for RentalRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = s.parse::<u64>() {
            return Ok(Self::Id(id));
        }
        Uuid::parse_str(s)
            .map(Self::Uuid)
            .map_err(|_| anyhow!("expected a rental id or uuid, got: {s}"))
    }
}

impl fmt::Display for RentalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Uuid(uuid) => write!(f, "{uuid}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn parses_refs() {
        assert_eq!("12".parse::<RentalRef>().expect("id"), RentalRef::Id(12));
        let uuid = Uuid::new_v4();
        assert_eq!(
            uuid.to_string().parse::<RentalRef>().expect("uuid"),
            RentalRef::Uuid(uuid)
        );
        assert!("apt-3".parse::<RentalRef>().is_err());
    }

    #[test]
    fn keeps_unknown_fields() {
        let now = Utc
            .with_ymd_and_hms(2024, 1, 2, 9, 0, 0)
            .single()
            .expect("valid now");
        let start = NaiveDate::from_ymd_opt(2024, 1, 15).expect("valid date");
        let mut rental = Rental::new("Apt 3".to_string(), start, now, 1);
        rental
            .extra
            .insert("agency".to_string(), serde_json::json!("north"));

        let line = serde_json::to_string(&rental).expect("serialize");
        assert!(line.contains("\"start_date\":\"2024-01-15\""));

        let back: Rental = serde_json::from_str(&line).expect("deserialize");
        assert_eq!(back.extra.get("agency"), Some(&serde_json::json!("north")));
        assert_eq!(back.end_date, None);
        assert_eq!(back.kind, RentalKind::Rental);
    }

    #[test]
    fn parses_kinds() {
        assert_eq!("Location".parse::<RentalKind>().expect("kind"), RentalKind::Rental);
        assert_eq!("sale".parse::<RentalKind>().expect("kind"), RentalKind::Sale);
        assert!("lease".parse::<RentalKind>().is_err());
    }
}
