//! Wire-format seam over hickory-proto.
//!
//! The relay core never walks DNS wire bytes itself beyond the two
//! transaction-ID octets; everything else goes through the functions here.
//! Forwarded datagrams are patched in place and sent as received, so EDNS
//! options and unknown record types pass through untouched.

use crate::cache::CachedAnswer;
use dnsrelay_domain::{RecordType, RelayError};
use hickory_proto::op::{Message, MessageType, OpCode};
use hickory_proto::rr::rdata;
use hickory_proto::rr::{RData, Record};
use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};
use std::net::IpAddr;

/// Maximum UDP DNS payload with EDNS(0).
pub const MAX_DATAGRAM: usize = 4096;

/// Fixed DNS header length; anything shorter cannot carry an ID.
pub const HEADER_LEN: usize = 12;

pub fn parse(bytes: &[u8]) -> Result<Message, RelayError> {
    Message::from_vec(bytes)
        .map_err(|e| RelayError::Protocol(format!("Failed to parse DNS message: {}", e)))
}

/// The first (and in practice only) question as `(normalized name, qtype)`.
pub fn first_question(message: &Message) -> Option<(String, RecordType)> {
    let query = message.queries().first()?;
    let name = normalize_name(&query.name().to_utf8());
    let qtype = RecordType::from_code(u16::from(query.query_type()));
    Some((name, qtype))
}

/// Lowercase, without the trailing root dot.
pub fn normalize_name(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// Overwrite the transaction ID in raw wire bytes.
pub fn patch_id(datagram: &mut [u8], id: u16) {
    if datagram.len() >= 2 {
        datagram[..2].copy_from_slice(&id.to_be_bytes());
    }
}

/// Synthesize a response answering the request's question with a single
/// A/AAAA record. Used for override hits and block sentinels.
pub fn build_address_response(
    request: &Message,
    address: IpAddr,
    ttl: u32,
) -> Result<Vec<u8>, RelayError> {
    let query = request
        .queries()
        .first()
        .cloned()
        .ok_or_else(|| RelayError::Protocol("request has no question section".to_string()))?;

    let rdata = match address {
        IpAddr::V4(v4) => RData::A(rdata::A(v4)),
        IpAddr::V6(v6) => RData::AAAA(rdata::AAAA(v6)),
    };
    let record = Record::from_rdata(query.name().clone(), ttl, rdata);

    let mut response = Message::new();
    response.set_id(request.id());
    response.set_message_type(MessageType::Response);
    response.set_op_code(OpCode::Query);
    response.set_recursion_desired(request.recursion_desired());
    response.set_recursion_available(true);
    response.add_query(query);
    response.add_answer(record);

    serialize(&response)
}

/// Rebuild a response for a cached answer, echoing the client's own
/// question section and transaction ID.
pub fn build_cached_response(
    request: &Message,
    answer: &CachedAnswer,
) -> Result<Vec<u8>, RelayError> {
    let query = request
        .queries()
        .first()
        .cloned()
        .ok_or_else(|| RelayError::Protocol("request has no question section".to_string()))?;

    let mut response = Message::new();
    response.set_id(request.id());
    response.set_message_type(MessageType::Response);
    response.set_op_code(OpCode::Query);
    response.set_recursion_desired(request.recursion_desired());
    response.set_recursion_available(true);
    response.set_response_code(answer.response_code);
    response.add_query(query);
    for record in &answer.answers {
        response.add_answer(record.clone());
    }

    serialize(&response)
}

/// Clone the answer section out of an upstream reply for the cache.
pub fn extract_answer(message: &Message) -> CachedAnswer {
    CachedAnswer {
        answers: message.answers().to_vec(),
        response_code: message.response_code(),
    }
}

/// TTL of the first answer record; 0 when there are no answers, which the
/// cache substitutes with its default TTL.
pub fn first_answer_ttl(message: &Message) -> u32 {
    message.answers().first().map(|r| r.ttl()).unwrap_or(0)
}

fn serialize(message: &Message) -> Result<Vec<u8>, RelayError> {
    let mut buf = Vec::with_capacity(512);
    let mut encoder = BinEncoder::new(&mut buf);
    message
        .emit(&mut encoder)
        .map_err(|e| RelayError::Protocol(format!("Failed to serialize DNS message: {}", e)))?;
    Ok(buf)
}
