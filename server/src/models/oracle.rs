use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Number of indexes the contract assigns to every oracle.
pub const INDEXES_PER_ORACLE: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseAddressError {
    #[error("address must be 0x-prefixed")]
    MissingPrefix,
    #[error("address must be 20 bytes, got {0}")]
    InvalidLength(usize),
    #[error("invalid hex in address: {0}")]
    InvalidHex(String),
}

/// A 20-byte ledger account reference.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or(ParseAddressError::MissingPrefix)?;
        let bytes = hex::decode(digits).map_err(|e| ParseAddressError::InvalidHex(e.to_string()))?;
        let len = bytes.len();
        let raw: [u8; 20] = bytes
            .try_into()
            .map_err(|_| ParseAddressError::InvalidLength(len))?;
        Ok(Address(raw))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The three opaque indexes assigned to an oracle at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleIndexes(pub [u8; INDEXES_PER_ORACLE]);

impl OracleIndexes {
    pub fn contains(&self, index: u8) -> bool {
        self.0.contains(&index)
    }

    /// Distinct index values, in slot order.
    pub fn distinct(&self) -> Vec<u8> {
        let mut seen = Vec::with_capacity(INDEXES_PER_ORACLE);
        for index in self.0 {
            if !seen.contains(&index) {
                seen.push(index);
            }
        }
        seen
    }
}

impl fmt::Display for OracleIndexes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.0[0], self.0[1], self.0[2])
    }
}

/// A registered oracle identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Oracle {
    pub address: Address,
    pub indexes: OracleIndexes,
}

/// Flight status values understood by the FlightSurety contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum StatusCode {
    Unknown = 0,
    OnTime = 10,
    LateAirline = 20,
    LateWeather = 30,
    LateTechnical = 40,
    LateOther = 50,
}

impl StatusCode {
    pub const ALL: [StatusCode; 6] = [
        StatusCode::Unknown,
        StatusCode::OnTime,
        StatusCode::LateAirline,
        StatusCode::LateWeather,
        StatusCode::LateTechnical,
        StatusCode::LateOther,
    ];

    /// Draw a status uniformly from [`StatusCode::ALL`].
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Position in [`StatusCode::ALL`].
    pub fn ordinal(self) -> usize {
        usize::from(self.code() / 10)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown flight status code: {0}")]
pub struct UnknownStatusCode(pub u8);

impl TryFrom<u8> for StatusCode {
    type Error = UnknownStatusCode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|status| status.code() == value)
            .ok_or(UnknownStatusCode(value))
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Emitted by the contract whenever a passenger or airline asks for a flight status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestEvent {
    pub index: u8,
    pub airline: Address,
    pub flight: String,
    pub timestamp: u64,
}

/// A single oracle's answer to a [`RequestEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseSubmission {
    pub index: u8,
    pub airline: Address,
    pub flight: String,
    pub timestamp: u64,
    pub status_code: StatusCode,
    pub oracle: Address,
}

impl ResponseSubmission {
    pub fn answer(event: &RequestEvent, oracle: Address, status_code: StatusCode) -> Self {
        Self {
            index: event.index,
            airline: event.airline,
            flight: event.flight.clone(),
            timestamp: event.timestamp,
            status_code,
            oracle,
        }
    }
}

/// Emitted once the contract has reached consensus on a flight status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlightStatusInfo {
    pub airline: Address,
    pub flight: String,
    pub timestamp: u64,
    pub status: u8,
}

/// Emitted for every oracle response the contract accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OracleReport {
    pub airline: Address,
    pub flight: String,
    pub timestamp: u64,
    pub status: u8,
}

/// Decoded contract events the server subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    OracleRequest(RequestEvent),
    FlightStatusInfo(FlightStatusInfo),
    OracleReport(OracleReport),
}
