use crate::config::BindConfig;
use crate::dispatcher::Dispatcher;
use crate::host::SessionHost;
use log::{error, info};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, ErrorKind};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Upper bound on how long the receiver waits before running idle checks.
pub const RECEIVE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Datagrams carry one message; anything past this is dropped by the socket.
pub const MAX_DATAGRAM: usize = 16;

pub struct UdpReceiver {
    socket: UdpSocket,
}

impl UdpReceiver {
    /// Binds the socket and joins the multicast group when asked to.
    ///
    /// The port may be shared with other recorders, and is reusable right
    /// after a restart.
    pub fn bind(config: &BindConfig) -> io::Result<Self> {
        let local = if config.multicast {
            // a group address is joined, not bound
            let any: IpAddr = match config.address {
                IpAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
                IpAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
            };
            SocketAddr::new(any, config.port)
        } else {
            config.socket_addr()
        };

        let socket = reusable_socket(local)?;
        if config.multicast {
            match config.address {
                IpAddr::V4(group) => socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?,
                IpAddr::V6(group) => socket.join_multicast_v6(&group, 0)?,
            }
            info!("Joined multicast group {}", config.address);
        }

        Self::from_socket(socket)
    }

    pub fn from_socket(socket: UdpSocket) -> io::Result<Self> {
        socket.set_read_timeout(Some(RECEIVE_POLL_INTERVAL))?;
        info!("Listening on {}", socket.local_addr()?);
        Ok(UdpReceiver { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Feeds datagrams to `dispatcher` until `shutdown` is raised, then
    /// finalizes every session.
    pub fn run<H: SessionHost>(&self, dispatcher: &mut Dispatcher<H>, shutdown: &AtomicBool) {
        let mut buffer = [0u8; MAX_DATAGRAM];

        while !shutdown.load(Ordering::SeqCst) {
            match self.socket.recv_from(&mut buffer) {
                Ok((len, address)) => {
                    dispatcher.on_datagram(address, &buffer[..len], Instant::now());
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => error!("Receive error: {}", e),
            }

            dispatcher.tick(Instant::now());
        }

        info!("Terminating receiver");
        dispatcher.shutdown_all(Instant::now());
    }
}

fn reusable_socket(local: SocketAddr) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(local), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&local.into())?;
    Ok(socket.into())
}
