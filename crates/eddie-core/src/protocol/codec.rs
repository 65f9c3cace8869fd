//! Frame encoding/decoding
//!
//! Request frame:
//! ```text
//! TOKEN[ <hex>[ <hex>]]\r
//! ```
//! Parameters are lowercase hex with no padding. Negative values are written
//! as the hex text of the 32-bit two's-complement value, so `-1` becomes
//! `ffffffff`; the firmware truncates on its side.
//!
//! Replies carry no type tag. The caller supplies the [`ReplyShape`] it
//! expects and the decoder classifies the bytes against it:
//! - `\r` alone is an acknowledgement
//! - anything of length <= 1 otherwise is an empty reply
//! - `ERROR...` (length >= 6) is the firmware's error text, kept verbatim
//! - otherwise fixed-width hex fields per the expected shape

use super::{ProtocolError, Command, ERROR_TOKEN, PACKET_TERMINATOR, PARAMETER_DELIMITER};

/// Reply layout a command expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    /// Bare terminator, no payload
    Ack,
    /// One unsigned hex field of any width
    Scalar,
    /// Two fixed-width signed hex fields separated by a delimiter
    Pair {
        /// Hex digits per field
        width: usize,
    },
    /// Back-to-back 3-digit hex words, each followed by a delimiter or the terminator
    Series,
}

/// Classified reply from the board
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedReply {
    /// Nothing useful came back
    Empty,
    /// The firmware's error reply, verbatim
    ErrorText(String),
    /// Command accepted
    Ack,
    /// Single unsigned field
    Scalar(u32),
    /// Two signed fields, left then right
    Pair(i32, i32),
    /// One value per 3-digit group
    Series(Vec<u16>),
}

/// Width of one series group on the wire: three hex digits plus a separator
const SERIES_GROUP_LEN: usize = 4;

/// Encode a command into its wire frame
pub fn encode(command: &Command) -> Vec<u8> {
    let token = command.opcode().token();
    let mut frame = Vec::with_capacity(token.len() + command.params().len() * 9 + 1);
    frame.extend_from_slice(token.as_bytes());
    for param in command.params() {
        frame.push(PARAMETER_DELIMITER);
        frame.extend_from_slice(format!("{:x}", param).as_bytes());
    }
    frame.push(PACKET_TERMINATOR);
    frame
}

/// Decode a raw reply against the shape the command expects
pub fn decode(raw: &[u8], shape: ReplyShape) -> Result<DecodedReply, ProtocolError> {
    if shape == ReplyShape::Ack && raw == [PACKET_TERMINATOR] {
        return Ok(DecodedReply::Ack);
    }
    if raw.len() <= 1 {
        return Ok(DecodedReply::Empty);
    }
    if raw.len() >= ERROR_TOKEN.len() + 1 && raw.starts_with(ERROR_TOKEN) {
        return Ok(DecodedReply::ErrorText(
            String::from_utf8_lossy(raw).into_owned(),
        ));
    }
    if raw.last() != Some(&PACKET_TERMINATOR) {
        return Err(ProtocolError::MalformedReply(format!(
            "unterminated reply {:?}",
            escape(raw)
        )));
    }

    match shape {
        ReplyShape::Ack => Err(ProtocolError::UnexpectedReply {
            expected: shape,
            reply: escape(raw),
        }),
        ReplyShape::Scalar => {
            let field = raw
                .split(|b| *b == PARAMETER_DELIMITER || *b == PACKET_TERMINATOR)
                .next()
                .unwrap_or_default();
            Ok(DecodedReply::Scalar(parse_hex(field)?))
        }
        ReplyShape::Pair { width } => decode_pair(raw, width),
        ReplyShape::Series => decode_series(raw),
    }
}

fn decode_pair(raw: &[u8], width: usize) -> Result<DecodedReply, ProtocolError> {
    if width == 0 || width > 8 {
        return Err(ProtocolError::MalformedReply(format!(
            "unsupported field width {}",
            width
        )));
    }
    if raw.len() < 2 * width + 2
        || raw[width] != PARAMETER_DELIMITER
        || raw[2 * width + 1] != PACKET_TERMINATOR
    {
        return Err(ProtocolError::UnexpectedReply {
            expected: ReplyShape::Pair { width },
            reply: escape(raw),
        });
    }
    let bits = (width * 4) as u32;
    let first = sign_extend(parse_hex(&raw[..width])?, bits);
    let second = sign_extend(parse_hex(&raw[width + 1..2 * width + 1])?, bits);
    Ok(DecodedReply::Pair(first, second))
}

fn decode_series(raw: &[u8]) -> Result<DecodedReply, ProtocolError> {
    let mut values = Vec::with_capacity(raw.len() / SERIES_GROUP_LEN);
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == PACKET_TERMINATOR {
            break;
        }
        let group = raw.get(i..i + 3).ok_or_else(|| {
            ProtocolError::MalformedReply(format!("truncated series word at byte {}", i))
        })?;
        match raw.get(i + 3) {
            Some(&PARAMETER_DELIMITER) | Some(&PACKET_TERMINATOR) => {}
            _ => {
                return Err(ProtocolError::MalformedReply(format!(
                    "missing separator after series word at byte {}",
                    i
                )))
            }
        }
        values.push(parse_hex(group)? as u16);
        i += SERIES_GROUP_LEN;
    }
    Ok(DecodedReply::Series(values))
}

/// Parse an unsigned hex field; the field must be 1 to 8 hex digits
fn parse_hex(field: &[u8]) -> Result<u32, ProtocolError> {
    if field.is_empty() || field.len() > 8 || !field.iter().all(u8::is_ascii_hexdigit) {
        return Err(ProtocolError::MalformedReply(format!(
            "invalid hex field {:?}",
            escape(field)
        )));
    }
    // All bytes are ASCII hex digits, so both conversions succeed.
    let text = std::str::from_utf8(field).map_err(|e| ProtocolError::MalformedReply(e.to_string()))?;
    u32::from_str_radix(text, 16).map_err(|e| ProtocolError::MalformedReply(e.to_string()))
}

/// Interpret the low `bits` of `value` as a two's-complement number
fn sign_extend(value: u32, bits: u32) -> i32 {
    if bits >= 32 {
        return value as i32;
    }
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

/// Printable form of raw bytes for logs and error messages
pub fn escape(raw: &[u8]) -> String {
    raw.iter()
        .flat_map(|b| std::ascii::escape_default(*b))
        .map(char::from)
        .collect()
}
