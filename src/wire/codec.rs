//! Encodes outbound NOTIFY queries and validates inbound NOTIFY responses.
//!
//! Check ordering in [`validate_response`] is load-bearing: tests rely on a
//! malformed packet producing the diagnostic documented there, not whichever
//! check happens to run first.

use bitstream_io::{BigEndian, BitReader, BitWriter};
use rand::Rng;

use super::common::{PacketComponent, ParseError};
use super::enums::RRClass;
use super::header::{DnsHeader, OPCODE_NOTIFY};
use super::question::DnsQuestion;

const HEADER_LEN: usize = 12;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValidationResult {
    ReplyOk,
    BadReplyPacket,
    BadQueryId,
    BadOpcode,
    BadQr,
    BadQueryName,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, ValidationResult::ReplyOk)
    }
}

/// Encodes a NOTIFY query for `zone_name`/`class`, returning the wire bytes
/// and the freshly chosen message id so the caller can record it for
/// response correlation.
pub fn encode_notify_query(zone_name: &str, class: RRClass) -> (Vec<u8>, u16) {
    let id: u16 = rand::rng().random();
    let header = DnsHeader {
        id,
        qr: false,
        opcode: OPCODE_NOTIFY,
        aa: true,
        tc: false,
        rd: false,
        ra: false,
        z: 0,
        rcode: 0,
        qdcount: 1,
        ancount: 0,
        nscount: 0,
        arcount: 0,
    };
    let question = DnsQuestion::for_zone(zone_name, class);

    let mut bytes = Vec::with_capacity(32);
    {
        let mut writer = BitWriter::endian(&mut bytes, BigEndian);
        // Unwraps below are infallible: writing to a Vec<u8> never hits I/O
        // errors, and a well-formed header/question always encodes cleanly.
        header.write(&mut writer).expect("header encodes");
        question.write(&mut writer).expect("question encodes");
    }

    (bytes, id)
}

fn parse_header_and_question(data: &[u8]) -> Result<(DnsHeader, DnsQuestion), ParseError> {
    if data.len() < HEADER_LEN {
        return Err(ParseError::Truncated);
    }

    let mut reader = BitReader::endian(data, BigEndian);
    let mut header = DnsHeader::default();
    header.read(&mut reader)?;

    if header.qdcount == 0 {
        return Err(ParseError::Truncated);
    }

    let mut question = DnsQuestion::default();
    question.read_with_buffer(&mut reader, data)?;

    Ok((header, question))
}

/// Validates a candidate NOTIFY response against the request it is supposed
/// to acknowledge. `expected_name_lower` must already be lowercased.
pub fn validate_response(
    expected_id: u16,
    expected_name_lower: &str,
    expected_class: RRClass,
    data: &[u8],
) -> ValidationResult {
    let (header, question) = match parse_header_and_question(data) {
        Ok(parsed) => parsed,
        Err(_) => return ValidationResult::BadReplyPacket,
    };

    if header.id != expected_id {
        return ValidationResult::BadQueryId;
    }

    if header.opcode != OPCODE_NOTIFY {
        return ValidationResult::BadOpcode;
    }

    if !header.qr {
        return ValidationResult::BadQr;
    }

    if question.name_lower() != expected_name_lower
        || question.qclass != expected_class
        || question.qtype != super::enums::RRType::SOA
    {
        return ValidationResult::BadQueryName;
    }

    ValidationResult::ReplyOk
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good_reply_bytes(id: u16, name: &str, class: RRClass) -> Vec<u8> {
        let header = DnsHeader {
            id,
            qr: true,
            opcode: OPCODE_NOTIFY,
            aa: false,
            tc: false,
            rd: false,
            ra: false,
            z: 0,
            rcode: 0,
            qdcount: 1,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        };
        let question = DnsQuestion::for_zone(name, class);

        let mut bytes = Vec::new();
        let mut writer = BitWriter::endian(&mut bytes, BigEndian);
        header.write(&mut writer).unwrap();
        question.write(&mut writer).unwrap();
        bytes
    }

    #[test]
    fn accepts_matching_reply() {
        let data = good_reply_bytes(0x2f18, "example.com.", RRClass::IN);
        assert_eq!(
            validate_response(0x2f18, "example.com", RRClass::IN, &data),
            ValidationResult::ReplyOk
        );
    }

    #[test]
    fn rejects_short_buffer() {
        assert_eq!(
            validate_response(1, "example.com", RRClass::IN, b"short"),
            ValidationResult::BadReplyPacket
        );
    }

    #[test]
    fn rejects_mismatched_id() {
        let data = good_reply_bytes(0x2f18, "example.com.", RRClass::IN);
        assert_eq!(
            validate_response(0x2e18, "example.com", RRClass::IN, &data),
            ValidationResult::BadQueryId
        );
    }

    #[test]
    fn rejects_wrong_opcode() {
        let mut data = good_reply_bytes(1, "example.com.", RRClass::IN);
        // opcode occupies bits 3..7 of byte 2; clear it to QUERY (0).
        data[2] &= 0b1000_0111;
        assert_eq!(
            validate_response(1, "example.com", RRClass::IN, &data),
            ValidationResult::BadOpcode
        );
    }

    #[test]
    fn rejects_qr_not_set() {
        let mut data = good_reply_bytes(1, "example.com.", RRClass::IN);
        data[2] &= 0b0111_1111; // clear QR bit
        assert_eq!(
            validate_response(1, "example.com", RRClass::IN, &data),
            ValidationResult::BadQr
        );
    }

    #[test]
    fn rejects_mismatched_name() {
        let data = good_reply_bytes(1, "example.net.", RRClass::IN);
        assert_eq!(
            validate_response(1, "example.com", RRClass::IN, &data),
            ValidationResult::BadQueryName
        );
    }

    #[test]
    fn name_comparison_is_case_insensitive() {
        let data = good_reply_bytes(1, "Example.COM.", RRClass::IN);
        assert_eq!(
            validate_response(1, "example.com", RRClass::IN, &data),
            ValidationResult::ReplyOk
        );
    }
}
