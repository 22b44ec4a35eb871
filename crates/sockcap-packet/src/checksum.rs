use std::net::Ipv4Addr;

/// Running RFC 1071 one's-complement sum over big-endian 16-bit words.
///
/// Bytes may be fed in arbitrary pieces; an odd trailing byte is carried over
/// and paired with the first byte of the next piece, so the result matches a
/// single pass over the concatenated input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InternetChecksum {
    sum: u32,
    pending: Option<u8>,
}

impl InternetChecksum {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sum: 0,
            pending: None,
        }
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        let mut rest = bytes;
        if let Some(high) = self.pending.take() {
            match rest.split_first() {
                Some((low, tail)) => {
                    self.add_word(u16::from_be_bytes([high, *low]));
                    rest = tail;
                }
                None => {
                    self.pending = Some(high);
                    return self;
                }
            }
        }

        let mut words = rest.chunks_exact(2);
        for word in &mut words {
            self.add_word(u16::from_be_bytes([word[0], word[1]]));
        }
        if let [last] = words.remainder() {
            self.pending = Some(*last);
        }
        self
    }

    pub fn add_word(&mut self, word: u16) -> &mut Self {
        let sum = self.sum + u32::from(word);
        // end-around carry keeps the accumulator within 16 bits
        self.sum = (sum & 0xFFFF) + (sum >> 16);
        self
    }

    /// Adds the TCP/UDP pseudo-header: source, destination, zero, protocol, length.
    pub fn add_pseudo_header(
        &mut self,
        source: Ipv4Addr,
        destination: Ipv4Addr,
        protocol: u8,
        length: u16,
    ) -> &mut Self {
        self.add_bytes(&source.octets())
            .add_bytes(&destination.octets())
            .add_word(u16::from(protocol))
            .add_word(length)
    }

    #[must_use]
    pub fn finish(&self) -> u16 {
        let mut sum = self.sum;
        if let Some(high) = self.pending {
            sum += u32::from(u16::from_be_bytes([high, 0]));
        }
        while sum >> 16 != 0 {
            sum = (sum & 0xFFFF) + (sum >> 16);
        }
        !(sum as u16)
    }
}

/// Checksum of a contiguous buffer, as used for the IPv4 header.
#[must_use]
pub fn checksum(bytes: &[u8]) -> u16 {
    InternetChecksum::new().add_bytes(bytes).finish()
}

/// Checksum of a transport segment (header followed by payload) under the IPv4
/// pseudo-header. The checksum field inside `header` must be zero when
/// computing, or hold the transmitted value when verifying.
#[must_use]
pub fn transport_checksum(
    source: Ipv4Addr,
    destination: Ipv4Addr,
    protocol: u8,
    header: &[u8],
    payload: &[u8],
) -> u16 {
    let length = (header.len() + payload.len()) as u16;
    InternetChecksum::new()
        .add_pseudo_header(source, destination, protocol, length)
        .add_bytes(header)
        .add_bytes(payload)
        .finish()
}
