//! CRC-16 checksum for framed parameter data.
//!
//! Uses CRC-16/CCITT (polynomial 0x1021, initial value 0xFFFF, no
//! reflection) with a 256-entry lookup table. The `crc` crate catalogs
//! this algorithm as CRC-16/IBM-3740.

use crc::{Crc, CRC_16_IBM_3740};

/// CRC-16/CCITT calculator with a 256-entry lookup table.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Calculate the CRC-16 checksum of a byte slice.
#[inline]
#[must_use]
pub fn calculate_crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// CRC-16 digest for incremental calculation.
///
/// Use this when a frame is produced or consumed byte-by-byte and the
/// whole payload is never available as one slice.
pub struct Crc16Digest {
    digest: crc::Digest<'static, u16>,
}

impl Crc16Digest {
    /// Create a new CRC-16 digest.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            digest: CRC16.digest(),
        }
    }

    /// Update the digest with a single byte.
    #[inline]
    pub fn update(&mut self, byte: u8) {
        self.digest.update(&[byte]);
    }

    /// Update the digest with a byte slice.
    #[inline]
    pub fn update_slice(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    /// Finalize and return the checksum value.
    #[inline]
    #[must_use]
    pub fn finalize(self) -> u16 {
        self.digest.finalize()
    }
}

impl Default for Crc16Digest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_empty() {
        // No input leaves the register at its initial value.
        assert_eq!(calculate_crc16(&[]), 0xFFFF);
    }

    #[test]
    fn test_crc16_check_string() {
        // Standard check value for CRC-16/IBM-3740.
        assert_eq!(calculate_crc16(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_crc16_testing_vector() {
        assert_eq!(calculate_crc16(b"testing"), 0xE23E);
    }

    #[test]
    fn test_crc16_digest_matches_batch() {
        let data = b"/root<0>/param1<6>[0]/";
        let batch_crc = calculate_crc16(data);

        let mut digest = Crc16Digest::new();
        for &b in data {
            digest.update(b);
        }
        let incremental_crc = digest.finalize();

        assert_eq!(batch_crc, incremental_crc);
    }

    #[test]
    fn test_crc16_digest_slice() {
        let data = b"testing";
        let mut digest = Crc16Digest::new();
        digest.update_slice(data);
        assert_eq!(digest.finalize(), 0xE23E);
    }
}
