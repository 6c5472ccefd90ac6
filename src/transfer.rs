//! Zone transfer (AXFR/IXFR) handling.
//!
//! Upstream servers only ever see the proxy's address, so the proxy decides who may transfer
//! zones. Transfers are only served over TCP, and only to clients listed in
//! [`Config::allow_transfer`][crate::config::Config::allow_transfer]. Addresses are compared as
//! plain text: no network ranges, no IPv6 normalization.

use crate::config::Shared;
use trust_dns_proto::op::{Message, ResponseCode};
use trust_dns_proto::rr::{RData, Record, RecordType};

/// Returns true if any question of `query` asks for a full or incremental zone transfer.
#[must_use]
pub fn is_transfer_request(query: &Message) -> bool {
    query
        .queries()
        .iter()
        .any(|q| matches!(q.query_type(), RecordType::AXFR | RecordType::IXFR))
}

#[derive(Clone)]
pub struct TransferGuard {
    config: Shared,
}

impl TransferGuard {
    #[must_use]
    pub fn new(config: Shared) -> Self {
        TransferGuard { config }
    }

    /// Returns true if `client` may send `query`. Anything that isn't a zone transfer is always
    /// allowed.
    #[must_use]
    pub fn authorize(&self, query: &Message, client: &str) -> bool {
        !is_transfer_request(query) || self.config.allow_transfer.contains(client)
    }
}

/// Follows the messages of a zone transfer stream to find where it ends.
///
/// The first record must be the zone's SOA. An AXFR (or an IXFR answered with the full zone)
/// ends with a second copy of that SOA. An incremental IXFR, recognised by an SOA in second
/// position, repeats the SOA once more in front of the last batch of additions, so it ends on
/// the third copy. An IXFR answered with nothing but the SOA means the client is up to date.
#[derive(Debug)]
pub struct TransferTracker {
    incremental: bool,
    serial: Option<u32>,
    records: usize,
    serial_seen: usize,
    diffs: bool,
}

impl TransferTracker {
    #[must_use]
    pub fn new(query_type: RecordType) -> Self {
        Self {
            incremental: query_type == RecordType::IXFR,
            serial: None,
            records: 0,
            serial_seen: 0,
            diffs: false,
        }
    }

    /// Account for the next message of the stream. Returns `Ok(true)` once the transfer is
    /// complete.
    ///
    /// # Errors
    ///
    /// Returns the reason the stream can't be a valid transfer.
    pub fn observe(&mut self, message: &Message) -> Result<bool, String> {
        if message.response_code() != ResponseCode::NoError {
            return Err(format!("upstream answered {}", message.response_code()));
        }

        let answers = message.answers();
        if self.serial.is_none() && answers.is_empty() {
            return Err("first message has no records".to_string());
        }
        for record in answers {
            let serial = soa_serial(record);
            if self.serial.is_none() {
                self.serial = Some(serial.ok_or("first record is not an SOA")?);
            } else if self.incremental && self.records == 1 {
                self.diffs = serial.is_some();
            }
            if serial == self.serial {
                self.serial_seen += 1;
            }
            self.records += 1;
        }

        if self.incremental && self.records == 1 {
            return Ok(true);
        }
        Ok(self.serial_seen >= if self.diffs { 3 } else { 2 })
    }
}

fn soa_serial(record: &Record) -> Option<u32> {
    match record.data() {
        Some(RData::SOA(soa)) => Some(soa.serial()),
        _ => None,
    }
}
