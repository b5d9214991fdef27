use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::core::{AppError, Result};

/// Formatted voucher number: `{point_of_sale:04}-{number:08}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InvoiceNumber {
    pub point_of_sale: u32,
    pub number: u64,
}

impl InvoiceNumber {
    pub fn new(point_of_sale: u32, number: u64) -> Self {
        Self {
            point_of_sale,
            number,
        }
    }
}

impl fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:08}", self.point_of_sale, self.number)
    }
}

impl FromStr for InvoiceNumber {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || AppError::validation(format!("Invalid invoice number: {}", s));

        let (point_of_sale, number) = s.trim().split_once('-').ok_or_else(invalid)?;
        let all_digits = |part: &str| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit());
        if !all_digits(point_of_sale) || !all_digits(number) {
            return Err(invalid());
        }

        Ok(Self {
            point_of_sale: point_of_sale.parse().map_err(|_| invalid())?,
            number: number.parse().map_err(|_| invalid())?,
        })
    }
}

impl Serialize for InvoiceNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InvoiceNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
