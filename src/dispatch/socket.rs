//! Socket-factory seam (§9): production code allocates real
//! `tokio::net::UdpSocket`s; tests substitute an in-memory transport so the
//! scenarios in the test plan run without touching the network.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub fn of(addr: &str) -> Option<Self> {
        if addr.parse::<std::net::Ipv4Addr>().is_ok() {
            Some(AddressFamily::V4)
        } else if addr.parse::<std::net::Ipv6Addr>().is_ok() {
            Some(AddressFamily::V6)
        } else {
            None
        }
    }

    pub fn as_metric_label(self) -> &'static str {
        match self {
            AddressFamily::V4 => "v4",
            AddressFamily::V6 => "v6",
        }
    }
}

#[async_trait]
pub trait AsyncUdpSocket: Send + Sync {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> std::io::Result<usize>;
    async fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)>;
}

#[async_trait]
impl AsyncUdpSocket for UdpSocket {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> std::io::Result<usize> {
        UdpSocket::send_to(self, buf, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }
}

#[async_trait]
pub trait SocketFactory: Send + Sync {
    async fn bind(&self, family: AddressFamily) -> std::io::Result<Arc<dyn AsyncUdpSocket>>;
}

/// Binds ephemeral UDP sockets via tokio, honoring an optional source port
/// range from configuration by trying each port in turn before falling back
/// to "any".
pub struct TokioSocketFactory {
    source_port_range: Option<(u16, u16)>,
}

impl TokioSocketFactory {
    pub fn new(source_port_range: Option<(u16, u16)>) -> Self {
        Self { source_port_range }
    }
}

#[async_trait]
impl SocketFactory for TokioSocketFactory {
    async fn bind(&self, family: AddressFamily) -> std::io::Result<Arc<dyn AsyncUdpSocket>> {
        let wildcard = match family {
            AddressFamily::V4 => "0.0.0.0",
            AddressFamily::V6 => "::",
        };

        if let Some((min, max)) = self.source_port_range {
            for port in min..=max {
                if let Ok(socket) = UdpSocket::bind((wildcard, port)).await {
                    return Ok(Arc::new(socket));
                }
            }
        }

        let socket = UdpSocket::bind((wildcard, 0)).await?;
        Ok(Arc::new(socket))
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use tokio::sync::Mutex as AsyncMutex;
    use tokio::sync::Notify;

    /// An in-memory stand-in for a UDP socket. `inject_response` plays the
    /// role of a secondary server's reply; `sent` records everything this
    /// socket transmitted so tests can assert on it.
    pub struct MockSocket {
        inbox: AsyncMutex<VecDeque<(Vec<u8>, SocketAddr)>>,
        notify: Notify,
        pub sent: AsyncMutex<Vec<(Vec<u8>, SocketAddr)>>,
        local_family: AddressFamily,
    }

    impl MockSocket {
        pub fn new(local_family: AddressFamily) -> Arc<Self> {
            Arc::new(Self {
                inbox: AsyncMutex::new(VecDeque::new()),
                notify: Notify::new(),
                sent: AsyncMutex::new(Vec::new()),
                local_family,
            })
        }

        pub async fn inject_response(&self, data: Vec<u8>, from: SocketAddr) {
            self.inbox.lock().await.push_back((data, from));
            self.notify.notify_one();
        }

        pub fn family(&self) -> AddressFamily {
            self.local_family
        }
    }

    #[async_trait]
    impl AsyncUdpSocket for MockSocket {
        async fn send_to(&self, buf: &[u8], target: SocketAddr) -> std::io::Result<usize> {
            self.sent.lock().await.push((buf.to_vec(), target));
            Ok(buf.len())
        }

        async fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
            loop {
                if let Some((data, from)) = self.inbox.lock().await.pop_front() {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    return Ok((n, from));
                }
                self.notify.notified().await;
            }
        }
    }

    pub struct MockSocketFactory {
        pub v4: Arc<MockSocket>,
        pub v6: Arc<MockSocket>,
    }

    impl MockSocketFactory {
        pub fn new() -> Self {
            Self {
                v4: MockSocket::new(AddressFamily::V4),
                v6: MockSocket::new(AddressFamily::V6),
            }
        }
    }

    #[async_trait]
    impl SocketFactory for MockSocketFactory {
        async fn bind(&self, family: AddressFamily) -> std::io::Result<Arc<dyn AsyncUdpSocket>> {
            Ok(match family {
                AddressFamily::V4 => self.v4.clone(),
                AddressFamily::V6 => self.v6.clone(),
            })
        }
    }

    #[tokio::test]
    async fn mock_socket_round_trips_injected_response() {
        let socket = MockSocket::new(AddressFamily::V4);
        let from: SocketAddr = "127.0.0.1:53".parse().unwrap();
        socket.inject_response(vec![1, 2, 3], from).await;

        let mut buf = [0u8; 16];
        let (n, got_from) = socket.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);
        assert_eq!(got_from, from);
    }
}
