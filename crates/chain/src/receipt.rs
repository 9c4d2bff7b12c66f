//! Execution receipts, event logs, and the per-block 2048-bit bloom
//! filter over log addresses and topics.

use crate::crypto::keccak256;
use crate::rlp::{self, RlpError};
use crate::types::{to_hex, Address};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
}

impl Log {
    pub fn from_item(item: &rlp::Item) -> Result<Self, RlpError> {
        let fields = item.as_list()?;
        if fields.len() < 3 {
            return Err(RlpError::ShortList {
                expected: 3,
                found: fields.len(),
            });
        }
        let addr_bytes = fields[0].as_bytes()?;
        let address = Address::from_slice(addr_bytes).map_err(|_| RlpError::ExpectedBytes)?;

        let mut topics = Vec::new();
        for t in fields[1].as_list()? {
            let bytes = t.as_bytes()?;
            if bytes.len() != 32 {
                return Err(RlpError::ExpectedBytes);
            }
            let mut topic = [0u8; 32];
            topic.copy_from_slice(bytes);
            topics.push(topic);
        }

        Ok(Log {
            address,
            topics,
            data: fields[2].as_bytes()?.to_vec(),
        })
    }

    pub fn rlp_encode(&self) -> Vec<u8> {
        let topic_items: Vec<Vec<u8>> = self
            .topics
            .iter()
            .map(|t| rlp::encode_bytes(t))
            .collect();
        rlp::encode_list(&[
            rlp::encode_bytes(self.address.as_bytes()),
            rlp::encode_list(&topic_items),
            rlp::encode_bytes(&self.data),
        ])
    }
}

/// Per-transaction outcome recorded in the block body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Receipt {
    pub status: bool,
    pub cumulative_gas_used: u64,
    pub logs: Vec<Log>,
}

impl Receipt {
    pub fn from_item(item: &rlp::Item) -> Result<Self, RlpError> {
        let fields = item.as_list()?;
        if fields.len() < 3 {
            return Err(RlpError::ShortList {
                expected: 3,
                found: fields.len(),
            });
        }
        let logs = fields[2]
            .as_list()?
            .iter()
            .map(Log::from_item)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Receipt {
            status: fields[0].as_uint()? != 0,
            cumulative_gas_used: fields[1].as_uint()?,
            logs,
        })
    }

    /// `[status, cumulativeGasUsed, logs]`.
    pub fn rlp_encode(&self) -> Vec<u8> {
        let log_items: Vec<Vec<u8>> = self.logs.iter().map(Log::rlp_encode).collect();
        rlp::encode_list(&[
            rlp::encode_uint(u64::from(self.status)),
            rlp::encode_uint(self.cumulative_gas_used),
            rlp::encode_list(&log_items),
        ])
    }
}

/// 2048-bit probabilistic index over a block's logs. Three bits per
/// element, chosen Ethereum-style from consecutive 11-bit slices of the
/// element's keccak digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bloom {
    pub bits: [u8; Bloom::BYTES],
}

impl Bloom {
    pub const BYTES: usize = 256; // 2048 bits

    pub fn add(&mut self, data: &[u8]) {
        let h = keccak256(data);
        for i in 0..3 {
            let v = ((u16::from(h[2 * i]) << 8) | u16::from(h[2 * i + 1])) & 2047;
            let byte_index = (v >> 3) as usize;
            let bit = 1u8 << (v & 7);
            self.bits[byte_index] |= bit;
        }
    }

    /// Fold a log's address and topics into the filter.
    pub fn accrue(&mut self, log: &Log) {
        self.add(log.address.as_bytes());
        for topic in &log.topics {
            self.add(topic);
        }
    }

    pub fn contains(&self, data: &[u8]) -> bool {
        let h = keccak256(data);
        (0..3).all(|i| {
            let v = ((u16::from(h[2 * i]) << 8) | u16::from(h[2 * i + 1])) & 2047;
            let byte_index = (v >> 3) as usize;
            let bit = 1u8 << (v & 7);
            self.bits[byte_index] & bit != 0
        })
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&b| b == 0)
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", to_hex(&self.bits))
    }
}

impl Default for Bloom {
    fn default() -> Self {
        Bloom {
            bits: [0u8; Bloom::BYTES],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_rlp_shape() {
        let rc = Receipt {
            status: true,
            cumulative_gas_used: 21_000,
            logs: vec![],
        };
        let encoded = rc.rlp_encode();
        let decoded = rlp::decode(&encoded).unwrap();
        let items = decoded.as_list().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_uint().unwrap(), 1);
        assert_eq!(items[1].as_uint().unwrap(), 21_000);
        assert!(items[2].as_list().unwrap().is_empty());
    }

    #[test]
    fn log_rlp_shape() {
        let log = Log {
            address: Address::from_bytes([0x11; 20]),
            topics: vec![[0xaa; 32], [0xbb; 32]],
            data: vec![1, 2, 3],
        };
        let decoded = rlp::decode(&log.rlp_encode()).unwrap();
        let items = decoded.as_list().unwrap();
        assert_eq!(items[0].as_bytes().unwrap().len(), 20);
        assert_eq!(items[1].as_list().unwrap().len(), 2);
        assert_eq!(items[2].as_bytes().unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn bloom_is_deterministic() {
        let mut a = Bloom::default();
        let mut b = Bloom::default();
        a.add(b"element");
        b.add(b"element");
        assert_eq!(a, b);
        assert!(a.contains(b"element"));
    }

    #[test]
    fn distinct_inputs_diverge() {
        let mut a = Bloom::default();
        let mut b = Bloom::default();
        a.add(b"first");
        b.add(b"second");
        assert_ne!(a.bits, b.bits);
        assert!(!a.contains(b"second"));
    }

    #[test]
    fn accrue_sets_address_and_topic_bits() {
        let log = Log {
            address: Address::from_bytes([0x42; 20]),
            topics: vec![[0x07; 32]],
            data: vec![],
        };
        let mut bloom = Bloom::default();
        assert!(bloom.is_empty());
        bloom.accrue(&log);
        assert!(bloom.contains(log.address.as_bytes()));
        assert!(bloom.contains(&log.topics[0]));
        assert!(!bloom.is_empty());
        assert_eq!(bloom.to_hex().len(), 2 + Bloom::BYTES * 2);
    }
}
