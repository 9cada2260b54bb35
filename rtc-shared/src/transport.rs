use std::net::{Ipv4Addr, SocketAddr};
use std::time::Instant;

/// Explicit congestion notification codepoint (RFC 3168)
///
/// The fourth codepoint, Not-ECT (`0b00`), is represented by the absence of a
/// codepoint, i.e. `Option::<EcnCodepoint>::None`.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EcnCodepoint {
    #[doc(hidden)]
    Ect0 = 0b10,
    #[doc(hidden)]
    Ect1 = 0b01,
    #[doc(hidden)]
    Ce = 0b11,
}

impl EcnCodepoint {
    /// Create new object from the given bits
    pub fn from_bits(x: u8) -> Option<Self> {
        use self::EcnCodepoint::*;
        Some(match x & 0b11 {
            0b10 => Ect0,
            0b01 => Ect1,
            0b11 => Ce,
            _ => {
                return None;
            }
        })
    }

    /// The two-bit wire value of this codepoint
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// The two-bit wire value of an optional codepoint, Not-ECT being `0b00`
    pub fn to_bits(ecn: Option<Self>) -> u8 {
        ecn.map_or(0b00, Self::bits)
    }
}

/// Type of transport protocol, either UDP or TCP
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransportProtocol {
    /// UDP
    #[default]
    UDP,
    /// TCP
    TCP,
}

/// Transport Context with local address, peer address, ECN, protocol, etc.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportContext {
    /// Local socket address, either IPv4 or IPv6
    pub local_addr: SocketAddr,
    /// Peer socket address, either IPv4 or IPv6
    pub peer_addr: SocketAddr,
    /// Type of transport protocol, either UDP or TCP
    pub transport_protocol: TransportProtocol,
    /// Explicit congestion notification bits the packet was received with
    pub ecn: Option<EcnCodepoint>,
}

impl Default for TransportContext {
    fn default() -> Self {
        Self {
            local_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            peer_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            transport_protocol: TransportProtocol::UDP,
            ecn: None,
        }
    }
}

/// A generic transmit with [TransportContext]
#[derive(Debug, Clone, PartialEq)]
pub struct TransportMessage<T> {
    /// Received/Sent time
    pub now: Instant,
    /// A transport context with [local_addr](TransportContext::local_addr) and [peer_addr](TransportContext::peer_addr)
    pub transport: TransportContext,
    /// Message body with generic type
    pub message: T,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ecn_bits() {
        for bits in 0u8..4 {
            assert_eq!(EcnCodepoint::to_bits(EcnCodepoint::from_bits(bits)), bits);
        }
        assert_eq!(EcnCodepoint::from_bits(0b00), None);
        assert_eq!(EcnCodepoint::from_bits(0b11), Some(EcnCodepoint::Ce));
        assert_eq!(EcnCodepoint::Ect0.bits(), 0b10);
    }

    #[test]
    fn test_transport_context_default() {
        let ctx = TransportContext::default();
        assert_eq!(ctx.local_addr.port(), 0);
        assert!(ctx.peer_addr.ip().is_unspecified());
        assert_eq!(ctx.ecn, None);
    }
}
