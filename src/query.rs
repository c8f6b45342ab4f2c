use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use log::{debug, trace};
use tokio::net::{lookup_host, UdpSocket};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::{timeout_at, Instant};

use crate::error::SourceQueryError;
use crate::info::ServerInfo;
use crate::packet::{RequestPacket, NO_CHALLENGE, RECV_BUFFER_SIZE};
use crate::player::{PlayerList, Players};

/// Deadline used when a query is given no timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Who to query: a name to resolve, or addresses resolved already.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Host { host: String, port: u16 },
    /// One socket serves the whole query, so a list mixing IPv4 and IPv6
    /// is narrowed to its IPv4 addresses.
    Endpoints(Vec<SocketAddr>),
}

impl From<(&str, u16)> for Target {
    fn from((host, port): (&str, u16)) -> Self {
        Target::Host {
            host: host.to_owned(),
            port,
        }
    }
}

impl From<(String, u16)> for Target {
    fn from((host, port): (String, u16)) -> Self {
        Target::Host { host, port }
    }
}

impl From<SocketAddr> for Target {
    fn from(addr: SocketAddr) -> Self {
        Target::Endpoints(vec![addr])
    }
}

impl From<Vec<SocketAddr>> for Target {
    fn from(addrs: Vec<SocketAddr>) -> Self {
        Target::Endpoints(addrs)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Host { host, port } => write!(f, "{host}:{port}"),
            Target::Endpoints(addrs) => match addrs.as_slice() {
                [one] => write!(f, "{one}"),
                _ => write!(f, "{} endpoints", addrs.len()),
            },
        }
    }
}

/// Where a query currently is. Terminal states are the query's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Resolving,
    Sending,
    AwaitingReply,
    ChallengeReceived,
    SendingChallenge,
    AwaitingChallengeReply,
}

/// One in-flight query: a socket, the endpoints it talks to, and a deadline
/// shared by every round. Dropping it closes the socket.
struct Exchange {
    label: String,
    socket: UdpSocket,
    endpoints: Vec<SocketAddr>,
    /// Endpoints that have neither failed a send nor sent garbage.
    pending: Vec<SocketAddr>,
    deadline: Instant,
    timeout: Duration,
    phase: Phase,
    buf: Vec<u8>,
}

impl Exchange {
    /// Resolve `target` and open a socket for it. The deadline starts now.
    async fn open(target: Target, timeout: Duration) -> Result<Self, SourceQueryError> {
        let deadline = Instant::now() + timeout;
        let label = target.to_string();
        trace!("{label}: {:?}", Phase::Resolving);

        let resolved = match target {
            Target::Endpoints(addrs) => addrs,
            Target::Host { host, port } => {
                match timeout_at(deadline, lookup_host((host.as_str(), port))).await {
                    Err(_) => {
                        debug!("{label}: timed out while resolving");
                        return Err(SourceQueryError::TimedOut(timeout));
                    }
                    Ok(addrs) => addrs.map_err(SourceQueryError::Resolution)?.collect(),
                }
            }
        };

        let (bind_addr, endpoints, dropped) = select_family(resolved);
        if !dropped.is_empty() {
            debug!("{label}: skipping IPv6 endpoints {dropped:?}");
        }
        if endpoints.is_empty() {
            return Err(SourceQueryError::NoEndpoints(label));
        }
        trace!("{label}: resolved to {endpoints:?}");

        // just arbitrarily bind any port, doesn't matter really
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(SourceQueryError::FailedPortBind)?;

        Ok(Exchange {
            label,
            socket,
            pending: endpoints.clone(),
            endpoints,
            deadline,
            timeout,
            phase: Phase::Resolving,
            buf: vec![0u8; RECV_BUFFER_SIZE],
        })
    }

    fn enter(&mut self, phase: Phase) {
        trace!("{}: {:?} -> {:?}", self.label, self.phase, phase);
        self.phase = phase;
    }

    fn timed_out(&self) -> SourceQueryError {
        debug!(
            "{}: no valid reply within {:?} ({:?}), closing socket",
            self.label, self.timeout, self.phase
        );
        SourceQueryError::TimedOut(self.timeout)
    }

    /// Send `packet` to each of `to`. A failed send only ends that
    /// endpoint's branch; it is an error only if no branch is left.
    async fn fan_out(
        &mut self,
        packet: RequestPacket,
        to: &[SocketAddr],
    ) -> Result<(), SourceQueryError> {
        let payload = packet.pack();
        let mut last_error = None;

        for &addr in to {
            match timeout_at(self.deadline, self.socket.send_to(&payload, addr)).await {
                Err(_) => return Err(self.timed_out()),
                Ok(Ok(_)) => trace!("{}: sent {} bytes to {addr}", self.label, payload.len()),
                Ok(Err(e)) => {
                    debug!("{}: send to {addr} failed: {e}", self.label);
                    self.pending.retain(|a| *a != addr);
                    last_error = Some(SourceQueryError::SendError(e));
                }
            }
        }

        match last_error {
            Some(e) if !to.iter().any(|a| self.pending.contains(a)) => Err(e),
            _ => Ok(()),
        }
    }

    /// Wait for the first reply from one of our endpoints that `decode`
    /// accepts.
    ///
    /// A reply that fails to decode ends its endpoint's branch without
    /// disturbing the others. Once no branch is left the last decode error
    /// is returned.
    async fn next_reply<T>(
        &mut self,
        decode: impl Fn(&[u8], SocketAddr) -> Result<T, SourceQueryError>,
    ) -> Result<(T, SocketAddr), SourceQueryError> {
        loop {
            let (len, from) =
                match timeout_at(self.deadline, self.socket.recv_from(&mut self.buf)).await {
                    Err(_) => return Err(self.timed_out()),
                    Ok(Err(e)) if is_icmp_noise(&e) => {
                        debug!("{}: ignoring {e}", self.label);
                        continue;
                    }
                    Ok(Err(e)) => return Err(SourceQueryError::ReceiveError(e)),
                    Ok(Ok(received)) => received,
                };

            if !self.endpoints.contains(&from) {
                debug!("{}: ignoring datagram from stranger {from}", self.label);
                continue;
            }

            match decode(&self.buf[..len], from) {
                Ok(reply) => return Ok((reply, from)),
                Err(e) => {
                    debug!("{}: bad reply from {from}: {e}", self.label);
                    self.pending.retain(|a| *a != from);
                    if self.pending.is_empty() {
                        return Err(e);
                    }
                }
            }
        }
    }
}

/// Keep IPv4 endpoints when there are any, otherwise IPv6, and pick the
/// matching wildcard bind address. Also returns the endpoints left out.
fn select_family(resolved: Vec<SocketAddr>) -> (SocketAddr, Vec<SocketAddr>, Vec<SocketAddr>) {
    let mut v4: Vec<SocketAddr> = Vec::new();
    let mut v6: Vec<SocketAddr> = Vec::new();
    for addr in resolved {
        let bucket = if addr.is_ipv4() { &mut v4 } else { &mut v6 };
        if !bucket.contains(&addr) {
            bucket.push(addr);
        }
    }

    if v4.is_empty() {
        (SocketAddr::from(([0u16; 8], 0)), v6, Vec::new())
    } else {
        (SocketAddr::from(([0u8; 4], 0)), v4, v6)
    }
}

/// Errors some platforms surface on an unconnected socket when an ICMP
/// unreachable comes back for one of several destinations.
fn is_icmp_noise(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
    )
}

/// Query `target` with A2S_INFO.
///
/// The request goes to every address `target` resolves to and the first
/// reply that decodes wins. Runs on whatever runtime polls it; see
/// [SourceQuery] for running on a [QueryContext](crate::context::QueryContext).
///
/// Example usage:
/// ```no_run
/// # async fn demo() -> Result<(), sourcequery::error::SourceQueryError> {
/// use sourcequery::query::query_info;
///
/// let info = query_info(("nyc-1.us.uncletopia.com", 27015u16), None).await?;
/// println!("{} on {}", info.hostname, info.map);
/// # Ok(())
/// # }
/// ```
pub async fn query_info(
    target: impl Into<Target>,
    timeout: Option<Duration>,
) -> Result<ServerInfo, SourceQueryError> {
    let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
    let mut exchange = Exchange::open(target.into(), timeout).await?;

    exchange.enter(Phase::Sending);
    let endpoints = exchange.endpoints.clone();
    exchange.fan_out(RequestPacket::Info, &endpoints).await?;

    exchange.enter(Phase::AwaitingReply);
    let (info, from) = exchange.next_reply(ServerInfo::parse).await?;
    trace!("{}: completed by {from}", exchange.label);
    Ok(info)
}

/// Query `target` with A2S_PLAYER, answering the server's challenge.
///
/// Servers that skip the challenge are answered in one round. Otherwise
/// the challenge token is echoed back to the endpoint that issued it,
/// and the deadline covers both rounds.
pub async fn query_players(
    target: impl Into<Target>,
    timeout: Option<Duration>,
) -> Result<Players, SourceQueryError> {
    let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
    let mut exchange = Exchange::open(target.into(), timeout).await?;

    exchange.enter(Phase::Sending);
    let endpoints = exchange.endpoints.clone();
    exchange
        .fan_out(
            RequestPacket::Players {
                challenge: NO_CHALLENGE,
            },
            &endpoints,
        )
        .await?;

    exchange.enter(Phase::AwaitingReply);
    let (challenge, challenger) = match exchange.next_reply(PlayerList::parse).await? {
        (PlayerList::Players(players), from) => {
            trace!("{}: completed by {from} without a challenge", exchange.label);
            return Ok(players);
        }
        (PlayerList::Challenge(token), from) => (token, from),
    };

    exchange.enter(Phase::ChallengeReceived);
    trace!("{}: challenge {challenge:#010x} from {challenger}", exchange.label);

    exchange.enter(Phase::SendingChallenge);
    exchange.pending = vec![challenger];
    exchange
        .fan_out(RequestPacket::Players { challenge }, &[challenger])
        .await?;

    exchange.enter(Phase::AwaitingChallengeReply);
    loop {
        match exchange.next_reply(PlayerList::parse).await? {
            (PlayerList::Players(players), from) => {
                trace!("{}: completed by {from}", exchange.label);
                return Ok(players);
            }
            (PlayerList::Challenge(_), from) => {
                // one challenge round only
                debug!("{}: ignoring further challenge from {from}", exchange.label);
            }
        }
    }
}

/// Pending result of a query spawned by [SourceQuery].
///
/// Await it, or call [QueryHandle::wait] from a thread outside the runtime.
#[derive(Debug)]
pub struct QueryHandle<T> {
    rx: oneshot::Receiver<Result<T, SourceQueryError>>,
}

impl<T> QueryHandle<T> {
    /// Block the current thread until the query finishes.
    ///
    /// Panics if called from within an async runtime.
    pub fn wait(self) -> Result<T, SourceQueryError> {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(SourceQueryError::Cancelled))
    }
}

impl<T> Future for QueryHandle<T> {
    type Output = Result<T, SourceQueryError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(SourceQueryError::Cancelled)))
    }
}

/// Client that runs queries on a shared reactor.
#[derive(Debug, Clone)]
pub struct SourceQuery {
    handle: Handle,
}

impl SourceQuery {
    /// Run queries on `handle`, usually
    /// [QueryContext::handle](crate::context::QueryContext::handle).
    pub fn new(handle: Handle) -> Self {
        SourceQuery { handle }
    }

    /// Start an A2S_INFO query. See [query_info].
    pub fn info(
        &self,
        target: impl Into<Target>,
        timeout: Option<Duration>,
    ) -> QueryHandle<ServerInfo> {
        self.spawn(query_info(target.into(), timeout))
    }

    /// Start an A2S_PLAYER query. See [query_players].
    pub fn players(
        &self,
        target: impl Into<Target>,
        timeout: Option<Duration>,
    ) -> QueryHandle<Players> {
        self.spawn(query_players(target.into(), timeout))
    }

    fn spawn<T, F>(&self, query: F) -> QueryHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, SourceQueryError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.handle.spawn(async move {
            // the caller may have dropped the handle, that's fine
            let _ = tx.send(query.await);
        });
        QueryHandle { rx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_ipv4() {
        let resolved: Vec<SocketAddr> = vec![
            "[2001:db8::1]:27015".parse().unwrap(),
            "192.0.2.1:27015".parse().unwrap(),
            "192.0.2.1:27015".parse().unwrap(),
            "192.0.2.2:27015".parse().unwrap(),
        ];
        let (bind, endpoints, dropped) = select_family(resolved);
        assert_eq!(bind, "0.0.0.0:0".parse().unwrap());
        assert_eq!(
            endpoints,
            vec![
                "192.0.2.1:27015".parse::<SocketAddr>().unwrap(),
                "192.0.2.2:27015".parse().unwrap()
            ]
        );
        assert_eq!(dropped, vec!["[2001:db8::1]:27015".parse::<SocketAddr>().unwrap()]);
    }

    #[test]
    fn falls_back_to_ipv6() {
        let resolved: Vec<SocketAddr> = vec!["[2001:db8::1]:27015".parse().unwrap()];
        let (bind, endpoints, dropped) = select_family(resolved.clone());
        assert_eq!(bind, "[::]:0".parse().unwrap());
        assert_eq!(endpoints, resolved);
        assert!(dropped.is_empty());
    }

    #[test]
    fn target_display() {
        assert_eq!(Target::from(("example.com", 27015)).to_string(), "example.com:27015");
        let addr: SocketAddr = "192.0.2.1:27016".parse().unwrap();
        assert_eq!(Target::from(addr).to_string(), "192.0.2.1:27016");
        assert_eq!(Target::from(vec![addr, addr]).to_string(), "2 endpoints");
    }

    #[tokio::test]
    async fn empty_endpoint_list_fails_fast() {
        match query_info(Vec::<SocketAddr>::new(), None).await {
            Err(SourceQueryError::NoEndpoints(_)) => {}
            other => panic!("unexpected {other:?}"),
        }
    }
}
