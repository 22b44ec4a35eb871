use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};

use crate::ResolveError;

/// Host descriptor of a guest socket. Only used as an opaque key and as the
/// argument to metadata queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(pub i32);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<i32> for SocketId {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

#[cfg(unix)]
impl<T: std::os::fd::AsRawFd> From<&T> for SocketId {
    fn from(value: &T) -> Self {
        Self(value.as_raw_fd())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketKind {
    Stream,
    Datagram,
    Other(i32),
}

/// Read-only metadata queries against a live socket.
///
/// Implementations must never mutate the socket; every call reflects the
/// state at the moment of the call.
pub trait SocketResolver: Send + Sync {
    fn local_addr(&self, socket: SocketId) -> Result<SocketAddr, ResolveError>;

    fn peer_addr(&self, socket: SocketId) -> Result<SocketAddr, ResolveError>;

    fn socket_kind(&self, socket: SocketId) -> Result<SocketKind, ResolveError>;
}

impl<T: SocketResolver + ?Sized> SocketResolver for &T {
    fn local_addr(&self, socket: SocketId) -> Result<SocketAddr, ResolveError> {
        (**self).local_addr(socket)
    }

    fn peer_addr(&self, socket: SocketId) -> Result<SocketAddr, ResolveError> {
        (**self).peer_addr(socket)
    }

    fn socket_kind(&self, socket: SocketId) -> Result<SocketKind, ResolveError> {
        (**self).socket_kind(socket)
    }
}

impl<T: SocketResolver + ?Sized> SocketResolver for Arc<T> {
    fn local_addr(&self, socket: SocketId) -> Result<SocketAddr, ResolveError> {
        (**self).local_addr(socket)
    }

    fn peer_addr(&self, socket: SocketId) -> Result<SocketAddr, ResolveError> {
        (**self).peer_addr(socket)
    }

    fn socket_kind(&self, socket: SocketId) -> Result<SocketKind, ResolveError> {
        (**self).socket_kind(socket)
    }
}

impl<T: SocketResolver + ?Sized> SocketResolver for Box<T> {
    fn local_addr(&self, socket: SocketId) -> Result<SocketAddr, ResolveError> {
        (**self).local_addr(socket)
    }

    fn peer_addr(&self, socket: SocketId) -> Result<SocketAddr, ResolveError> {
        (**self).peer_addr(socket)
    }

    fn socket_kind(&self, socket: SocketId) -> Result<SocketKind, ResolveError> {
        (**self).socket_kind(socket)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticSocket {
    pub local: SocketAddr,
    pub peer: Option<SocketAddr>,
    pub kind: SocketKind,
}

impl StaticSocket {
    #[must_use]
    pub const fn stream(local: SocketAddr, peer: SocketAddr) -> Self {
        Self {
            local,
            peer: Some(peer),
            kind: SocketKind::Stream,
        }
    }

    #[must_use]
    pub const fn datagram(local: SocketAddr, peer: Option<SocketAddr>) -> Self {
        Self {
            local,
            peer,
            kind: SocketKind::Datagram,
        }
    }
}

/// Fixed socket table. Entries can be added or removed while a logger holds
/// the resolver, which lets callers model sockets opening and closing.
#[derive(Debug, Default)]
pub struct StaticSocketResolver {
    sockets: RwLock<HashMap<SocketId, StaticSocket>>,
}

impl StaticSocketResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_socket(self, socket: SocketId, entry: StaticSocket) -> Self {
        self.insert(socket, entry);
        self
    }

    pub fn insert(&self, socket: SocketId, entry: StaticSocket) -> Option<StaticSocket> {
        self.sockets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(socket, entry)
    }

    pub fn remove(&self, socket: SocketId) -> Option<StaticSocket> {
        self.sockets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&socket)
    }

    fn entry(&self, socket: SocketId) -> Result<StaticSocket, ResolveError> {
        self.sockets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&socket)
            .copied()
            .ok_or(ResolveError::UnknownSocket { socket })
    }
}

impl SocketResolver for StaticSocketResolver {
    fn local_addr(&self, socket: SocketId) -> Result<SocketAddr, ResolveError> {
        Ok(self.entry(socket)?.local)
    }

    fn peer_addr(&self, socket: SocketId) -> Result<SocketAddr, ResolveError> {
        self.entry(socket)?
            .peer
            .ok_or(ResolveError::NotConnected { socket })
    }

    fn socket_kind(&self, socket: SocketId) -> Result<SocketKind, ResolveError> {
        Ok(self.entry(socket)?.kind)
    }
}

/// Queries the operating system through `getsockname`, `getpeername` and
/// `getsockopt(SO_TYPE)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostSocketResolver;

#[cfg(unix)]
impl SocketResolver for HostSocketResolver {
    fn local_addr(&self, socket: SocketId) -> Result<SocketAddr, ResolveError> {
        host::query_addr(socket, "getsockname", libc::getsockname)
    }

    fn peer_addr(&self, socket: SocketId) -> Result<SocketAddr, ResolveError> {
        host::query_addr(socket, "getpeername", libc::getpeername)
    }

    fn socket_kind(&self, socket: SocketId) -> Result<SocketKind, ResolveError> {
        host::query_kind(socket)
    }
}

#[cfg(not(unix))]
impl SocketResolver for HostSocketResolver {
    fn local_addr(&self, socket: SocketId) -> Result<SocketAddr, ResolveError> {
        Err(ResolveError::Unsupported { socket })
    }

    fn peer_addr(&self, socket: SocketId) -> Result<SocketAddr, ResolveError> {
        Err(ResolveError::Unsupported { socket })
    }

    fn socket_kind(&self, socket: SocketId) -> Result<SocketKind, ResolveError> {
        Err(ResolveError::Unsupported { socket })
    }
}

#[cfg(unix)]
mod host {
    use std::mem;
    use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

    use super::{SocketId, SocketKind};
    use crate::ResolveError;

    type AddrQuery =
        unsafe extern "C" fn(libc::c_int, *mut libc::sockaddr, *mut libc::socklen_t) -> libc::c_int;

    pub(super) fn query_addr(
        socket: SocketId,
        operation: &'static str,
        query: AddrQuery,
    ) -> Result<SocketAddr, ResolveError> {
        // SAFETY: sockaddr_storage is plain data and valid when zeroed.
        let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

        // SAFETY: storage and len point to live locals sized for any address family.
        let result = unsafe {
            query(
                socket.0,
                (&mut storage as *mut libc::sockaddr_storage).cast::<libc::sockaddr>(),
                &mut len,
            )
        };
        if result != 0 {
            return Err(os_error(socket, operation));
        }

        let family = i32::from(storage.ss_family);
        match family {
            libc::AF_INET if len as usize >= mem::size_of::<libc::sockaddr_in>() => {
                // SAFETY: the kernel reported an AF_INET address of sufficient length.
                let address: libc::sockaddr_in = unsafe {
                    *(&storage as *const libc::sockaddr_storage).cast::<libc::sockaddr_in>()
                };
                let ip = Ipv4Addr::from(u32::from_be(address.sin_addr.s_addr));
                let port = u16::from_be(address.sin_port);
                Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
            }
            libc::AF_INET6 if len as usize >= mem::size_of::<libc::sockaddr_in6>() => {
                // SAFETY: the kernel reported an AF_INET6 address of sufficient length.
                let address: libc::sockaddr_in6 = unsafe {
                    *(&storage as *const libc::sockaddr_storage).cast::<libc::sockaddr_in6>()
                };
                let ip = Ipv6Addr::from(address.sin6_addr.s6_addr);
                let port = u16::from_be(address.sin6_port);
                Ok(SocketAddr::V6(SocketAddrV6::new(
                    ip,
                    port,
                    address.sin6_flowinfo,
                    address.sin6_scope_id,
                )))
            }
            _ => Err(ResolveError::UnsupportedFamily { socket, family }),
        }
    }

    pub(super) fn query_kind(socket: SocketId) -> Result<SocketKind, ResolveError> {
        let mut kind: libc::c_int = 0;
        let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;

        // SAFETY: kind and len are live locals of the size SO_TYPE reports.
        let result = unsafe {
            libc::getsockopt(
                socket.0,
                libc::SOL_SOCKET,
                libc::SO_TYPE,
                (&mut kind as *mut libc::c_int).cast::<libc::c_void>(),
                &mut len,
            )
        };
        if result != 0 {
            return Err(os_error(socket, "getsockopt(SO_TYPE)"));
        }

        Ok(match kind {
            libc::SOCK_STREAM => SocketKind::Stream,
            libc::SOCK_DGRAM => SocketKind::Datagram,
            other => SocketKind::Other(other),
        })
    }

    fn os_error(socket: SocketId, operation: &'static str) -> ResolveError {
        ResolveError::Os {
            socket,
            operation,
            errno: errno::errno().0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::{SocketId, SocketKind, SocketResolver, StaticSocket, StaticSocketResolver};
    use crate::ResolveError;

    fn addr(text: &str) -> SocketAddr {
        text.parse().expect("valid socket address")
    }

    #[test]
    fn static_resolver_tracks_inserts_and_removals() {
        let resolver = StaticSocketResolver::new().with_socket(
            SocketId(7),
            StaticSocket::stream(addr("10.0.0.2:5000"), addr("93.184.216.34:443")),
        );
        assert_eq!(
            resolver.local_addr(SocketId(7)),
            Ok(addr("10.0.0.2:5000"))
        );
        assert_eq!(resolver.socket_kind(SocketId(7)), Ok(SocketKind::Stream));

        resolver.remove(SocketId(7));
        assert_eq!(
            resolver.peer_addr(SocketId(7)),
            Err(ResolveError::UnknownSocket {
                socket: SocketId(7)
            })
        );
    }

    #[test]
    fn unconnected_datagram_socket_has_no_peer() {
        let resolver = StaticSocketResolver::new().with_socket(
            SocketId(3),
            StaticSocket::datagram(addr("10.0.0.2:5353"), None),
        );
        assert_eq!(
            resolver.peer_addr(SocketId(3)),
            Err(ResolveError::NotConnected {
                socket: SocketId(3)
            })
        );
    }

    #[cfg(unix)]
    #[test]
    fn host_resolver_reads_tcp_endpoints() {
        use std::net::{TcpListener, TcpStream};
        use std::os::fd::AsRawFd;

        use super::HostSocketResolver;

        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let client = TcpStream::connect(listener.local_addr().expect("addr")).expect("connect");
        let socket = SocketId(client.as_raw_fd());

        let resolver = HostSocketResolver;
        assert_eq!(
            resolver.local_addr(socket),
            Ok(client.local_addr().expect("local"))
        );
        assert_eq!(
            resolver.peer_addr(socket),
            Ok(listener.local_addr().expect("listener"))
        );
        assert_eq!(resolver.socket_kind(socket), Ok(SocketKind::Stream));
    }

    #[cfg(unix)]
    #[test]
    fn host_resolver_reports_datagram_kind() {
        use std::net::UdpSocket;
        use std::os::fd::AsRawFd;

        use super::HostSocketResolver;

        let socket = UdpSocket::bind("127.0.0.1:0").expect("bind");
        assert_eq!(
            HostSocketResolver.socket_kind(SocketId(socket.as_raw_fd())),
            Ok(SocketKind::Datagram)
        );
    }

    #[cfg(unix)]
    #[test]
    fn host_resolver_fails_on_closed_descriptor() {
        use super::HostSocketResolver;

        assert!(matches!(
            HostSocketResolver.local_addr(SocketId(-1)),
            Err(ResolveError::Os {
                operation: "getsockname",
                ..
            })
        ));
    }
}
