//! CRC-32 (IEEE 802.3) over the checksummed region of a datagram.
//!
//! The checksum covers header bytes `[0, 23)` followed by the point payload,
//! skipping the checksum field itself. The lookup table is built at compile
//! time.

use crc::{CRC_32_ISO_HDLC, Crc};

use super::wire::{HEADER_SIZE, offsets};

/// Reflected polynomial 0xEDB88320, initial value and final xor all ones
pub static CRC32_IEEE: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub fn crc32_ieee(data: &[u8]) -> u32 {
    CRC32_IEEE.checksum(data)
}

/// Checksum of a complete datagram as the sender computes it.
///
/// `datagram` must be at least a header long; shorter input is checksummed as
/// far as it goes.
pub fn datagram_checksum(datagram: &[u8]) -> u32 {
    let mut digest = CRC32_IEEE.digest();
    digest.update(datagram.get(..offsets::CHECKSUM).unwrap_or(datagram));
    if let Some(payload) = datagram.get(HEADER_SIZE..) {
        digest.update(payload);
    }
    digest.finalize()
}
