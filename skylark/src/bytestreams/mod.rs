//! XEP-0065 SOCKS5 bytestreams, TCP mode.
//!
//! Outgoing transfers pick between a direct peer-to-peer path (we play
//! SOCKS5 server) and a mediated path through a proxy when every external
//! address of this machine sits behind NAT. Incoming transfers walk the
//! peer's advertised streamhosts. All failures stay local to the transfer;
//! the XMPP session is never poisoned by them.

use core::fmt;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::io;
use std::net::IpAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock, Weak};
use std::time::Duration;

use log::{debug, warn};
use minidom::Element;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::client::{Client, ClientInner};
use crate::config::Config;
use crate::connect::AsyncReadAndWrite;
use crate::error::Error;
use crate::jid::Jid;
use crate::ns;
use crate::stanza::bytestreams::{Query, QueryPayload, Streamhost};
use crate::stanza::disco;
use crate::stanza::stanza_error::{DefinedCondition, StanzaError};
use crate::stanza::{Iq, IqType};

pub mod addr;
pub mod socks5;
pub mod stun;

pub use self::addr::AddressProbe;
pub use self::socks5::Socks5Error;
pub use self::stun::StunProbe;

use self::addr::{behind_nat, local_ipv4_addresses};

/// How long the direct-transfer listener waits for the peer.
const ACCEPT_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// Transfer chunk size.
const CHUNK: usize = 8192;

/// A failure local to one transfer.
#[derive(Debug)]
pub enum TransferError {
    /// The transfer ended short, was cancelled, or its session was
    /// invalidated mid-flight.
    Aborted,
    /// SOCKS5 negotiation failed.
    Socks5(Socks5Error),
    /// Transport error on the side channel.
    Io(io::Error),
    /// No advertised streamhost was usable.
    NoStreamhost,
    /// The peer or proxy answered the negotiation IQ with an error.
    Rejected(String),
    /// The IQ plumbing over the XMPP session failed.
    Xmpp(Error),
    /// The SI session is unknown or already invalidated.
    Invalid,
}

impl fmt::Display for TransferError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransferError::Aborted => write!(fmt, "transfer aborted"),
            TransferError::Socks5(e) => write!(fmt, "SOCKS5 negotiation failed: {}", e),
            TransferError::Io(e) => write!(fmt, "transfer I/O error: {}", e),
            TransferError::NoStreamhost => write!(fmt, "no usable streamhost"),
            TransferError::Rejected(what) => write!(fmt, "peer rejected negotiation: {}", what),
            TransferError::Xmpp(e) => write!(fmt, "session error during negotiation: {}", e),
            TransferError::Invalid => write!(fmt, "unknown or invalidated SI session"),
        }
    }
}

impl StdError for TransferError {}

impl From<io::Error> for TransferError {
    fn from(e: io::Error) -> TransferError {
        TransferError::Io(e)
    }
}

impl From<Socks5Error> for TransferError {
    fn from(e: Socks5Error) -> TransferError {
        TransferError::Socks5(e)
    }
}

/// The destination "domain name" of XEP-0065 §5.3.2:
/// `SHA1(sid ‖ initiator-full-jid ‖ target-full-jid)` in lowercase hex.
pub fn dst_address(sid: &str, initiator: &Jid, target: &Jid) -> String {
    let mut hasher = Sha1::new();
    hasher.update(sid.as_bytes());
    hasher.update(initiator.to_string().as_bytes());
    hasher.update(target.to_string().as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// One negotiated stream-initiation session, agreed upon by a higher
/// layer (XEP-0095) before the bytestream runs.
pub struct SiSession {
    /// The session id.
    pub sid: String,
    /// The initiator's full JID.
    pub from: Jid,
    /// The target's full JID.
    pub to: Jid,
    /// Exact payload size in bytes.
    pub size: u64,
    count: AtomicU64,
    stream: StdMutex<Option<Box<dyn AsyncReadAndWrite>>>,
    valid: AtomicBool,
}

impl SiSession {
    /// Create a session around the payload byte stream: the source for an
    /// outgoing transfer, the sink for an incoming one.
    pub fn new(
        sid: impl Into<String>,
        from: Jid,
        to: Jid,
        size: u64,
        stream: Box<dyn AsyncReadAndWrite>,
    ) -> Arc<SiSession> {
        Arc::new(SiSession {
            sid: sid.into(),
            from,
            to,
            size,
            count: AtomicU64::new(0),
            stream: StdMutex::new(Some(stream)),
            valid: AtomicBool::new(true),
        })
    }

    /// Bytes moved so far. Monotone, never exceeds [`SiSession::size`].
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Whether the session is still usable.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    /// Invalidate the session. A running transfer loop notices on its next
    /// chunk and exits through the disposed fast path.
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    fn add_progress(&self, n: u64) {
        self.count.fetch_add(n, Ordering::SeqCst);
    }

    fn take_stream(&self) -> Option<Box<dyn AsyncReadAndWrite>> {
        if !self.is_valid() {
            return None;
        }
        self.stream.lock().unwrap().take()
    }
}

impl fmt::Debug for SiSession {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("SiSession")
            .field("sid", &self.sid)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("size", &self.size)
            .field("count", &self.count())
            .field("valid", &self.is_valid())
            .finish()
    }
}

type TransferSubscriber = Box<dyn Fn(&SiSession) + Send + Sync>;

/// The SOCKS5 bytestreams service.
///
/// Holds a non-owning handle to the client; [`Socks5Bytestreams::attach`]
/// hooks incoming `<query/>` sets off the client's IQ event.
pub struct Socks5Bytestreams {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    client: Weak<ClientInner>,
    sessions: StdMutex<HashMap<String, Arc<SiSession>>>,
    probes: StdMutex<Vec<Arc<dyn AddressProbe>>>,
    transferred: RwLock<Vec<TransferSubscriber>>,
    aborted: RwLock<Vec<TransferSubscriber>>,
}

impl Socks5Bytestreams {
    /// Build the service for `client`. A configured STUN server becomes
    /// the default external-address probe.
    pub fn new(client: &Client) -> Socks5Bytestreams {
        let config = client.config();
        let mut probes: Vec<Arc<dyn AddressProbe>> = Vec::new();
        if let Some((host, port)) = config.stun_server.clone() {
            probes.push(Arc::new(StunProbe::new(host, port)));
        }
        Socks5Bytestreams {
            inner: Arc::new(ServiceInner {
                client: client.downgrade(),
                sessions: StdMutex::new(HashMap::new()),
                probes: StdMutex::new(probes),
                transferred: RwLock::new(Vec::new()),
                aborted: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Register an additional external-address probe (server IP-check,
    /// UPnP, …). Probes run in registration order.
    pub fn add_probe(&self, probe: Arc<dyn AddressProbe>) {
        self.inner.probes.lock().unwrap().push(probe);
    }

    /// Start answering incoming bytestream queries on the client's IQ
    /// event. Without this, the service only ever initiates transfers.
    pub fn attach(&self) {
        let Some(client) = self.inner.upgrade() else {
            return;
        };
        let inner = self.inner.clone();
        client.on_iq(move |iq| {
            if let IqType::Set(ref payload) = iq.payload {
                if payload.is("query", ns::BYTESTREAMS) {
                    let inner = inner.clone();
                    let iq = iq.clone();
                    tokio::spawn(async move {
                        ServiceInner::handle_incoming(inner, iq).await;
                    });
                }
            }
        });
    }

    /// Make an SI session known so its incoming bytestream offer can be
    /// matched by sid and peer.
    pub fn register_session(&self, session: Arc<SiSession>) {
        self.inner
            .sessions
            .lock()
            .unwrap()
            .insert(session.sid.clone(), session);
    }

    /// Invalidate a session right now. A running transfer exits through
    /// the disposed fast path and raises the aborted event.
    pub fn cancel_transfer(&self, session: &Arc<SiSession>) {
        session.invalidate();
        self.inner.sessions.lock().unwrap().remove(&session.sid);
    }

    /// Subscribe to per-chunk progress.
    pub fn on_bytes_transferred<F: Fn(&SiSession) + Send + Sync + 'static>(&self, f: F) {
        self.inner.transferred.write().unwrap().push(Box::new(f));
    }

    /// Subscribe to aborted transfers.
    pub fn on_transfer_aborted<F: Fn(&SiSession) + Send + Sync + 'static>(&self, f: F) {
        self.inner.aborted.write().unwrap().push(Box::new(f));
    }

    /// Run an outgoing transfer for `session` to completion.
    ///
    /// Picks mediated or direct mode per the NAT test, moves exactly
    /// [`SiSession::size`] bytes, and raises progress events along the
    /// way. Any failure invalidates the session, raises the aborted event
    /// and is not retried.
    pub async fn send(&self, session: Arc<SiSession>) -> Result<(), TransferError> {
        if !session.is_valid() {
            self.inner.emit_aborted(&session);
            return Err(TransferError::Invalid);
        }
        self.register_session(session.clone());
        let result = self.inner.run_outgoing(&session).await;
        self.inner.sessions.lock().unwrap().remove(&session.sid);
        if result.is_err() {
            session.invalidate();
            self.inner.emit_aborted(&session);
        }
        result
    }
}

impl ServiceInner {
    fn upgrade(&self) -> Option<Client> {
        self.client.upgrade().map(Client::from_inner)
    }

    fn emit_transferred(&self, session: &SiSession) {
        for subscriber in self.transferred.read().unwrap().iter() {
            if catch_unwind(AssertUnwindSafe(|| subscriber(session))).is_err() {
                warn!("a bytes-transferred handler panicked; continuing");
            }
        }
    }

    fn emit_aborted(&self, session: &SiSession) {
        for subscriber in self.aborted.read().unwrap().iter() {
            if catch_unwind(AssertUnwindSafe(|| subscriber(session))).is_err() {
                warn!("a transfer-aborted handler panicked; continuing");
            }
        }
    }

    fn session_for(&self, sid: &str, peer: Option<&Jid>) -> Option<Arc<SiSession>> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .get(sid)
            .filter(|session| session.is_valid())
            .filter(|session| peer.map_or(false, |peer| session.from == *peer))
            .cloned()
    }

    async fn external_addresses(&self) -> Vec<IpAddr> {
        let probes: Vec<Arc<dyn AddressProbe>> = self.probes.lock().unwrap().clone();
        let mut out: Vec<IpAddr> = Vec::new();
        for probe in probes {
            match probe.external_addresses().await {
                Ok(addrs) => {
                    for addr in addrs {
                        if !out.contains(&addr) {
                            out.push(addr);
                        }
                    }
                }
                Err(e) => debug!("address probe failed: {}", e),
            }
        }
        out
    }

    async fn run_outgoing(&self, session: &Arc<SiSession>) -> Result<(), TransferError> {
        let client = self.upgrade().ok_or(TransferError::Invalid)?;
        let config = client.config();

        let external = self.external_addresses().await;
        let proxies = if config.proxy_allowed {
            let local = local_ipv4_addresses();
            if behind_nat(&external, &local) {
                self.gather_proxies(&client, &config).await
            } else {
                Vec::new()
            }
        } else {
            Vec::new()
        };

        if proxies.is_empty() {
            self.send_direct(&client, &config, session, &external).await
        } else {
            self.send_mediated(&client, session, proxies).await
        }
    }

    /// User-configured proxies first; otherwise walk the server's disco
    /// items for `category=proxy, type=bytestreams` entities. Each proxy
    /// is asked for its streamhost.
    async fn gather_proxies(&self, client: &Client, config: &Config) -> Vec<Streamhost> {
        let candidates: Vec<Jid> = if !config.user_proxies.is_empty() {
            config.user_proxies.clone()
        } else {
            self.discover_proxies(client, config).await
        };

        let mut streamhosts = Vec::new();
        for candidate in candidates {
            match iq_get(client, candidate.clone(), Query::discover().into()).await {
                Ok(payload) => match Query::try_from(payload) {
                    Ok(Query {
                        payload: QueryPayload::Streamhosts(hosts),
                        ..
                    }) => streamhosts.extend(hosts),
                    _ => debug!("proxy {} returned no streamhost", candidate),
                },
                Err(e) => debug!("querying proxy {} failed: {}", candidate, e),
            }
        }
        streamhosts
    }

    async fn discover_proxies(&self, client: &Client, config: &Config) -> Vec<Jid> {
        let server = Jid::from_domain(config.hostname.clone());
        let items = match iq_get(client, server, disco::items_query()).await {
            Ok(payload) => match disco::parse_items(&payload) {
                Ok(items) => items,
                Err(_) => return Vec::new(),
            },
            Err(e) => {
                debug!("disco#items on the server failed: {}", e);
                return Vec::new();
            }
        };

        let mut proxies = Vec::new();
        for item in items {
            match iq_get(client, item.jid.clone(), disco::info_query()).await {
                Ok(payload) => {
                    if let Ok(identities) = disco::parse_identities(&payload) {
                        if disco::is_bytestreams_proxy(&identities) {
                            proxies.push(item.jid);
                        }
                    }
                }
                Err(e) => debug!("disco#info on {} failed: {}", item.jid, e),
            }
        }
        proxies
    }

    /// Mediated mode: offer the proxies, connect to the one the peer
    /// picked, activate, then push the payload through the proxy.
    async fn send_mediated(
        &self,
        client: &Client,
        session: &Arc<SiSession>,
        proxies: Vec<Streamhost>,
    ) -> Result<(), TransferError> {
        let offer = Query::offer(session.sid.clone(), proxies.clone());
        let reply = iq_set(client, session.to.clone(), offer.into()).await?;
        let used = match reply.map(Query::try_from) {
            Some(Ok(Query {
                payload: QueryPayload::StreamhostUsed(jid),
                ..
            })) => jid,
            _ => return Err(TransferError::NoStreamhost),
        };
        let proxy = proxies
            .iter()
            .find(|proxy| proxy.jid == used)
            .ok_or(TransferError::NoStreamhost)?;

        debug!("mediating transfer {} through {}", session.sid, proxy.jid);
        let mut socket = TcpStream::connect((proxy.host.as_str(), proxy.port)).await?;
        let dst = dst_address(&session.sid, &session.from, &session.to);
        socks5::connect(&mut socket, &dst, 0).await?;

        let activate = Query::activate(session.sid.clone(), session.to.clone());
        iq_set(client, proxy.jid.clone(), activate.into()).await?;

        self.pump_out(session, &mut socket).await
    }

    /// Direct mode: listen in the configured port range, advertise every
    /// local IPv4 plus the known external addresses, and accept the peer
    /// while the offer IQ is still in flight (the peer connects before it
    /// replies).
    async fn send_direct(
        &self,
        client: &Client,
        config: &Config,
        session: &Arc<SiSession>,
        external: &[IpAddr],
    ) -> Result<(), TransferError> {
        let listener = bind_in_range(config.server_port_from, config.server_port_to).await?;
        let port = listener.local_addr()?.port();

        let mut streamhosts = Vec::new();
        let mut advertise = |host: String| {
            if !streamhosts
                .iter()
                .any(|sh: &Streamhost| sh.host == host)
            {
                streamhosts.push(Streamhost {
                    jid: session.from.clone(),
                    host,
                    port,
                });
            }
        };
        for ip in local_ipv4_addresses() {
            advertise(ip.to_string());
        }
        for ip in external {
            advertise(ip.to_string());
        }
        if streamhosts.is_empty() {
            return Err(TransferError::NoStreamhost);
        }

        let dst = dst_address(&session.sid, &session.from, &session.to);
        let expected = dst.clone();
        let accept_task = tokio::spawn(async move {
            let (mut socket, peer) = tokio::time::timeout(ACCEPT_TIMEOUT, listener.accept())
                .await
                .map_err(|_| {
                    TransferError::Io(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "peer did not connect within the accept window",
                    ))
                })??;
            debug!("direct transfer peer connected from {}", peer);
            socks5::accept(&mut socket, &expected).await?;
            Ok::<TcpStream, TransferError>(socket)
        });

        let offer = Query::offer(session.sid.clone(), streamhosts);
        iq_set(client, session.to.clone(), offer.into()).await?;

        let mut socket = accept_task.await.map_err(|e| {
            TransferError::Io(io::Error::new(io::ErrorKind::Other, e.to_string()))
        })??;
        self.pump_out(session, &mut socket).await
    }

    /// Answer one incoming `<query/>` set per §6.3 of XEP-0065: validate
    /// the session, refuse UDP, walk the streamhosts in order, then pull
    /// exactly `size` bytes.
    async fn handle_incoming(inner: Arc<ServiceInner>, iq: Iq) {
        let Some(client) = inner.upgrade() else { return };
        let payload = match &iq.payload {
            IqType::Set(payload) => payload.clone(),
            _ => return,
        };
        let query = match Query::try_from(payload) {
            Ok(query) => query,
            Err(_) => {
                respond_error(&client, &iq, DefinedCondition::NotAcceptable).await;
                return;
            }
        };

        let session = query
            .sid
            .as_deref()
            .and_then(|sid| inner.session_for(sid, iq.from.as_ref()));
        let Some(session) = session else {
            respond_error(&client, &iq, DefinedCondition::NotAcceptable).await;
            return;
        };

        if query.mode.as_deref() == Some("udp") {
            respond_error(&client, &iq, DefinedCondition::FeatureNotImplemented).await;
            return;
        }

        let streamhosts = match query.payload {
            QueryPayload::Streamhosts(streamhosts) => streamhosts,
            _ => {
                respond_error(&client, &iq, DefinedCondition::NotAcceptable).await;
                return;
            }
        };

        let dst = dst_address(&session.sid, &session.from, &session.to);
        let mut connected = None;
        for streamhost in streamhosts {
            debug!(
                "trying streamhost {} at {}:{}",
                streamhost.jid, streamhost.host, streamhost.port
            );
            match try_streamhost(&streamhost, &dst).await {
                Ok(socket) => {
                    connected = Some((streamhost, socket));
                    break;
                }
                Err(e) => debug!("streamhost {} unusable: {}", streamhost.jid, e),
            }
        }

        let Some((used, mut socket)) = connected else {
            respond_error(&client, &iq, DefinedCondition::ItemNotFound).await;
            return;
        };

        let reply = Iq::result_of(&iq, Some(Query::used(session.sid.clone(), used.jid).into()));
        if let Err(e) = client.iq_response(reply).await {
            warn!("answering bytestream offer failed: {}", e);
            return;
        }

        if let Err(e) = inner.pump_in(&session, &mut socket).await {
            debug!("incoming transfer {} failed: {}", session.sid, e);
            session.invalidate();
            inner.emit_aborted(&session);
        }
        inner.sessions.lock().unwrap().remove(&session.sid);
    }

    /// Push the session payload out to the socket.
    async fn pump_out(
        &self,
        session: &Arc<SiSession>,
        socket: &mut TcpStream,
    ) -> Result<(), TransferError> {
        let mut source = session.take_stream().ok_or(TransferError::Invalid)?;
        let mut buf = [0u8; CHUNK];
        while session.count() < session.size {
            // Disposed fast path: cancel_transfer invalidated us.
            if !session.is_valid() {
                return Err(TransferError::Aborted);
            }
            let want = (session.size - session.count()).min(CHUNK as u64) as usize;
            let n = source.read(&mut buf[..want]).await?;
            if n == 0 {
                break;
            }
            socket.write_all(&buf[..n]).await?;
            session.add_progress(n as u64);
            self.emit_transferred(session);
        }
        socket.flush().await?;
        if session.count() < session.size {
            return Err(TransferError::Aborted);
        }
        Ok(())
    }

    /// Pull exactly `session.size` bytes off the socket into the session
    /// stream.
    async fn pump_in(
        &self,
        session: &Arc<SiSession>,
        socket: &mut TcpStream,
    ) -> Result<(), TransferError> {
        let mut sink = session.take_stream().ok_or(TransferError::Invalid)?;
        let mut buf = [0u8; CHUNK];
        while session.count() < session.size {
            if !session.is_valid() {
                return Err(TransferError::Aborted);
            }
            let want = (session.size - session.count()).min(CHUNK as u64) as usize;
            let n = socket.read(&mut buf[..want]).await?;
            if n == 0 {
                break;
            }
            sink.write_all(&buf[..n]).await?;
            session.add_progress(n as u64);
            self.emit_transferred(session);
        }
        sink.flush().await?;
        if session.count() < session.size {
            return Err(TransferError::Aborted);
        }
        Ok(())
    }
}

async fn try_streamhost(
    streamhost: &Streamhost,
    dst: &str,
) -> Result<TcpStream, TransferError> {
    let mut socket =
        TcpStream::connect((streamhost.host.as_str(), streamhost.port)).await?;
    socks5::connect(&mut socket, dst, 0).await?;
    Ok(socket)
}

async fn bind_in_range(from: u16, to: u16) -> Result<TcpListener, TransferError> {
    for port in from..=to {
        if let Ok(listener) = TcpListener::bind(("0.0.0.0", port)).await {
            return Ok(listener);
        }
    }
    Err(TransferError::Io(io::Error::new(
        io::ErrorKind::AddrInUse,
        "no free port in the configured listener range",
    )))
}

async fn respond_error(client: &Client, request: &Iq, condition: DefinedCondition) {
    let reply = Iq::error_of(request, StanzaError::new(condition));
    if let Err(e) = client.iq_response(reply).await {
        warn!("sending bytestream error reply failed: {}", e);
    }
}

/// `get` expecting a payload-carrying result.
async fn iq_get(client: &Client, to: Jid, payload: Element) -> Result<Element, TransferError> {
    let iq = Iq::from_get("", payload).with_to(to);
    match client.iq_request(iq, None).await {
        Ok(Iq {
            payload: IqType::Result(Some(payload)),
            ..
        }) => Ok(payload),
        Ok(Iq {
            payload: IqType::Error(error),
            ..
        }) => Err(TransferError::Rejected(describe_error(&error))),
        Ok(_) => Err(TransferError::Rejected("empty result".to_owned())),
        Err(e) => Err(TransferError::Xmpp(e)),
    }
}

/// `set` whose result payload is optional.
async fn iq_set(
    client: &Client,
    to: Jid,
    payload: Element,
) -> Result<Option<Element>, TransferError> {
    let iq = Iq::from_set("", payload).with_to(to);
    match client.iq_request(iq, None).await {
        Ok(Iq {
            payload: IqType::Result(payload),
            ..
        }) => Ok(payload),
        Ok(Iq {
            payload: IqType::Error(error),
            ..
        }) => Err(TransferError::Rejected(describe_error(&error))),
        Ok(_) => Err(TransferError::Rejected("unexpected reply".to_owned())),
        Err(e) => Err(TransferError::Xmpp(e)),
    }
}

fn describe_error(error: &Element) -> String {
    error
        .children()
        .next()
        .map(|condition| condition.name().to_owned())
        .unwrap_or_else(|| "undefined-condition".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jid(s: &str) -> Jid {
        s.parse().unwrap()
    }

    #[test]
    fn dst_address_vector() {
        assert_eq!(
            dst_address("mySid", &jid("a@x/r1"), &jid("b@y/r2")),
            "0c2b681391a4a8df02343e1d93a93fb72dd3b226"
        );
        assert_eq!(
            dst_address(
                "vsid",
                &jid("romeo@montague.lit/orchard"),
                &jid("juliet@capulet.lit/balcony")
            ),
            "98016001916f55eda0cc3385077be808f323202c"
        );
    }

    #[tokio::test]
    async fn session_progress_and_cancel() {
        let (stream, _other) = tokio::io::duplex(64);
        let session = SiSession::new(
            "s1",
            jid("a@x/r1"),
            jid("b@y/r2"),
            10,
            Box::new(stream),
        );
        assert_eq!(session.count(), 0);
        session.add_progress(4);
        assert_eq!(session.count(), 4);
        assert!(session.is_valid());
        session.invalidate();
        assert!(!session.is_valid());
        assert!(session.take_stream().is_none());
    }

    #[tokio::test]
    async fn bind_in_range_scans() {
        let first = bind_in_range(52300, 52310).await.unwrap();
        let second = bind_in_range(52300, 52310).await.unwrap();
        let a = first.local_addr().unwrap().port();
        let b = second.local_addr().unwrap().port();
        assert!(a != b);
        assert!((52300..=52310).contains(&a));
        assert!((52300..=52310).contains(&b));
    }
}
