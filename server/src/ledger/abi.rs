//! Just enough of the Solidity ABI to talk to FlightSuretyApp.

use sha3::{Digest, Keccak256};

use super::{EventChannel, LedgerError};
use crate::models::{
    Address, FlightStatusInfo, LedgerEvent, OracleIndexes, OracleReport, RequestEvent,
    ResponseSubmission,
};

const WORD: usize = 32;

pub const REGISTRATION_FEE: &str = "REGISTRATION_FEE()";
pub const REGISTER_ORACLE: &str = "registerOracle()";
pub const GET_MY_INDEXES: &str = "getMyIndexes()";
pub const SUBMIT_ORACLE_RESPONSE: &str = "submitOracleResponse(uint8,address,string,uint256,uint8)";

/// A value to encode as a call argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Uint(u128),
    Address(Address),
    String(String),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(self, Token::String(_))
    }
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn event_topic(channel: EventChannel) -> [u8; 32] {
    keccak256(channel.signature().as_bytes())
}

/// Match a log's first topic back to the channel that emits it.
pub fn channel_for_topic(topic: &[u8]) -> Option<EventChannel> {
    EventChannel::ALL
        .into_iter()
        .find(|channel| event_topic(*channel).as_slice() == topic)
}

/// Selector followed by the head/tail encoding of `args`.
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut out = selector(signature).to_vec();
    out.extend(encode(args));
    out
}

pub fn encode_submission(submission: &ResponseSubmission) -> Vec<u8> {
    encode_call(
        SUBMIT_ORACLE_RESPONSE,
        &[
            Token::Uint(u128::from(submission.index)),
            Token::Address(submission.airline),
            Token::String(submission.flight.clone()),
            Token::Uint(u128::from(submission.timestamp)),
            Token::Uint(u128::from(submission.status_code.code())),
        ],
    )
}

pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            head.extend(uint_word((head_len + tail.len()) as u128));
        }
        match token {
            Token::Uint(value) => head.extend(uint_word(*value)),
            Token::Address(address) => head.extend(address_word(address)),
            Token::String(value) => {
                tail.extend(uint_word(value.len() as u128));
                tail.extend(value.as_bytes());
                tail.resize(tail.len() + padding(value.len()), 0);
            }
        }
    }

    head.extend(tail);
    head
}

fn padding(len: usize) -> usize {
    (WORD - len % WORD) % WORD
}

fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn address_word(address: &Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

/// Read-only view over ABI-encoded return data or log data.
struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn word_at(&self, offset: usize) -> Result<&'a [u8], LedgerError> {
        offset
            .checked_add(WORD)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| {
                LedgerError::Decode(format!(
                    "need a word at byte {offset}, data is {} bytes",
                    self.data.len()
                ))
            })
    }

    fn word(&self, slot: usize) -> Result<&'a [u8], LedgerError> {
        self.word_at(slot * WORD)
    }

    fn uint(&self, slot: usize, bits: u32) -> Result<u128, LedgerError> {
        word_to_uint(self.word(slot)?, bits)
    }

    fn u8(&self, slot: usize) -> Result<u8, LedgerError> {
        Ok(self.uint(slot, 8)? as u8)
    }

    fn u64(&self, slot: usize) -> Result<u64, LedgerError> {
        Ok(self.uint(slot, 64)? as u64)
    }

    fn address(&self, slot: usize) -> Result<Address, LedgerError> {
        let word = self.word(slot)?;
        if word[..12].iter().any(|b| *b != 0) {
            return Err(LedgerError::Decode("address word has dirty high bytes".into()));
        }
        let mut raw = [0u8; 20];
        raw.copy_from_slice(&word[12..]);
        Ok(Address(raw))
    }

    fn string(&self, slot: usize) -> Result<String, LedgerError> {
        let offset = word_to_usize(self.word(slot)?)?;
        let len = word_to_usize(self.word_at(offset)?)?;
        let start = offset + WORD;
        let bytes = start
            .checked_add(len)
            .and_then(|end| self.data.get(start..end))
            .ok_or_else(|| LedgerError::Decode(format!("string of {len} bytes runs past data")))?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| LedgerError::Decode(format!("string is not utf-8: {e}")))
    }
}

fn word_to_uint(word: &[u8], bits: u32) -> Result<u128, LedgerError> {
    if word[..16].iter().any(|b| *b != 0) {
        return Err(LedgerError::Decode("integer exceeds 128 bits".into()));
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    let value = u128::from_be_bytes(low);
    if bits < 128 && value >> bits != 0 {
        return Err(LedgerError::Decode(format!("integer exceeds {bits} bits")));
    }
    Ok(value)
}

fn word_to_usize(word: &[u8]) -> Result<usize, LedgerError> {
    let value = word_to_uint(word, 64)?;
    usize::try_from(value).map_err(|_| LedgerError::Decode("offset does not fit in usize".into()))
}

/// Decode a single `uint256` return value.
pub fn decode_uint256(data: &[u8]) -> Result<u128, LedgerError> {
    Decoder::new(data).uint(0, 128)
}

/// Decode the `uint8[3]` returned by `getMyIndexes()`.
pub fn decode_indexes(data: &[u8]) -> Result<OracleIndexes, LedgerError> {
    let decoder = Decoder::new(data);
    Ok(OracleIndexes([decoder.u8(0)?, decoder.u8(1)?, decoder.u8(2)?]))
}

/// Decode the non-indexed data of a contract log emitted on `channel`.
pub fn decode_event(channel: EventChannel, data: &[u8]) -> Result<LedgerEvent, LedgerError> {
    let d = Decoder::new(data);
    let event = match channel {
        EventChannel::OracleRequest => LedgerEvent::OracleRequest(RequestEvent {
            index: d.u8(0)?,
            airline: d.address(1)?,
            flight: d.string(2)?,
            timestamp: d.u64(3)?,
        }),
        EventChannel::FlightStatusInfo => LedgerEvent::FlightStatusInfo(FlightStatusInfo {
            airline: d.address(0)?,
            flight: d.string(1)?,
            timestamp: d.u64(2)?,
            status: d.u8(3)?,
        }),
        EventChannel::OracleReport => LedgerEvent::OracleReport(OracleReport {
            airline: d.address(0)?,
            flight: d.string(1)?,
            timestamp: d.u64(2)?,
            status: d.u8(3)?,
        }),
    };
    Ok(event)
}

/// Decode a `0x`-prefixed hex string from the node.
pub fn decode_hex(raw: &str) -> Result<Vec<u8>, LedgerError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(digits).map_err(|e| LedgerError::Decode(format!("invalid hex: {e}")))
}

pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// JSON-RPC quantity encoding: `0x`-prefixed, no leading zeros.
pub fn quantity(value: u128) -> String {
    format!("{value:#x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StatusCode;

    fn airline() -> Address {
        "0x90cbf9c3888a3b16d73df2339ce9b8bb5675ca5f".parse().unwrap()
    }

    #[test]
    fn selectors_match_solidity() {
        assert_eq!(hex::encode(selector("transfer(address,uint256)")), "a9059cbb");
        assert_eq!(hex::encode(selector("balanceOf(address)")), "70a08231");
    }

    #[test]
    fn topics_resolve_back_to_channels() {
        for channel in EventChannel::ALL {
            assert_eq!(channel_for_topic(&event_topic(channel)), Some(channel));
        }
        assert_eq!(channel_for_topic(&[0u8; 32]), None);
    }

    #[test]
    fn submission_uses_head_tail_layout() {
        let submission = ResponseSubmission {
            index: 4,
            airline: airline(),
            flight: "ND1309".into(),
            timestamp: 1_600_000_000,
            status_code: StatusCode::LateAirline,
            oracle: airline(),
        };
        let encoded = encode_submission(&submission);
        let body = &encoded[4..];

        assert_eq!(&encoded[..4], &selector(SUBMIT_ORACLE_RESPONSE));
        // five head words, string length, one padded string word
        assert_eq!(body.len(), 7 * WORD);
        assert_eq!(body[WORD - 1], 4);
        assert_eq!(&body[WORD + 12..2 * WORD], airline().as_bytes());
        assert_eq!(body[3 * WORD - 1], 160);
        assert_eq!(body[5 * WORD - 1], 20);
        assert_eq!(body[6 * WORD - 1], 6);
        assert_eq!(&body[6 * WORD..6 * WORD + 6], b"ND1309");
    }

    #[test]
    fn decodes_oracle_request_log() {
        let data = encode(&[
            Token::Uint(7),
            Token::Address(airline()),
            Token::String("XT1237".into()),
            Token::Uint(1_700_000_000),
        ]);

        let event = decode_event(EventChannel::OracleRequest, &data).unwrap();
        assert_eq!(
            event,
            LedgerEvent::OracleRequest(RequestEvent {
                index: 7,
                airline: airline(),
                flight: "XT1237".into(),
                timestamp: 1_700_000_000,
            })
        );
    }

    #[test]
    fn decodes_flight_status_info_log() {
        let data = encode(&[
            Token::Address(airline()),
            Token::String("ND1309".into()),
            Token::Uint(42),
            Token::Uint(20),
        ]);

        match decode_event(EventChannel::FlightStatusInfo, &data).unwrap() {
            LedgerEvent::FlightStatusInfo(info) => {
                assert_eq!(info.flight, "ND1309");
                assert_eq!(info.status, 20);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn rejects_truncated_and_oversized_data() {
        let data = encode(&[Token::Uint(7), Token::Address(airline())]);
        assert!(matches!(
            decode_event(EventChannel::OracleRequest, &data),
            Err(LedgerError::Decode(_))
        ));

        let too_big = encode(&[Token::Uint(300), Token::Uint(1), Token::Uint(2)]);
        assert!(matches!(decode_indexes(&too_big), Err(LedgerError::Decode(_))));
    }

    #[test]
    fn decodes_indexes_and_fee() {
        let data = encode(&[Token::Uint(1), Token::Uint(9), Token::Uint(3)]);
        assert_eq!(decode_indexes(&data).unwrap(), OracleIndexes([1, 9, 3]));

        let one_ether = 1_000_000_000_000_000_000u128;
        assert_eq!(decode_uint256(&encode(&[Token::Uint(one_ether)])).unwrap(), one_ether);
    }

    #[test]
    fn quantities_have_no_leading_zeros() {
        assert_eq!(quantity(0), "0x0");
        assert_eq!(quantity(10_000_000), "0x989680");
    }
}
