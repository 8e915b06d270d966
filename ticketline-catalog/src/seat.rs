use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Fare tier with its own price and inventory pool
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum SeatClass {
    Second,
    First,
    Business,
}

impl SeatClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatClass::Second => "second",
            SeatClass::First => "first",
            SeatClass::Business => "business",
        }
    }
}

impl fmt::Display for SeatClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeatClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "second" => Ok(SeatClass::Second),
            "first" => Ok(SeatClass::First),
            "business" => Ok(SeatClass::Business),
            other => Err(format!("unknown seat class: {}", other)),
        }
    }
}

/// Requested or available seat counts per class. Ordered so multi-class
/// operations always visit classes in the same sequence.
pub type SeatCounts = BTreeMap<SeatClass, u32>;

/// Seats already committed to live orders, keyed by train id
pub type HeldSeats = BTreeMap<String, SeatCounts>;

/// Sum per-class counts from an iterator of seat classes
pub fn count_seats<I>(classes: I) -> SeatCounts
where
    I: IntoIterator<Item = SeatClass>,
{
    let mut counts = SeatCounts::new();
    for class in classes {
        *counts.entry(class).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_seats() {
        let counts = count_seats([SeatClass::Second, SeatClass::First, SeatClass::Second]);
        assert_eq!(counts.get(&SeatClass::Second), Some(&2));
        assert_eq!(counts.get(&SeatClass::First), Some(&1));
        assert_eq!(counts.get(&SeatClass::Business), None);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&SeatClass::Second).unwrap(), "\"second\"");
        assert_eq!("business".parse::<SeatClass>().unwrap(), SeatClass::Business);
        assert!("economy".parse::<SeatClass>().is_err());
    }
}
