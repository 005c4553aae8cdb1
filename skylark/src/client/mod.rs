//! The XMPP client core: connection lifecycle and stanza exchange.

use std::net::IpAddr;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use log::debug;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::connect::dns::{HostCursor, SrvResolver, SystemSrvResolver};
use crate::error::Error;
use crate::event::Handlers;
use crate::jid::Jid;
use crate::proto::Packet;
use crate::stanza::{ping::Ping, Iq, Message, Presence, StreamFeatures};

mod login;
mod session;
mod worker;

use self::session::Session;
use self::worker::STANZA_QUEUE_DEPTH;

/// An XMPP client.
///
/// Cheap to clone; all clones share one session. `connect` runs the
/// handshake and spawns the two session loops (reader and dispatcher);
/// stanza events reach the callbacks registered through the `on_*`
/// methods.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    config: StdMutex<Config>,
    resolver: Arc<dyn SrvResolver>,
    pub(crate) handlers: Arc<Handlers>,
    session: StdMutex<Option<Arc<Session>>>,
    cursor: StdMutex<Option<HostCursor>>,
}

impl Client {
    /// A client using the system DNS resolver.
    pub fn new(config: Config) -> Client {
        Client::with_resolver(config, Arc::new(SystemSrvResolver))
    }

    /// A client with a custom SRV resolver.
    pub fn with_resolver(config: Config, resolver: Arc<dyn SrvResolver>) -> Client {
        Client {
            inner: Arc::new(ClientInner {
                config: StdMutex::new(config),
                resolver,
                handlers: Arc::new(Handlers::new()),
                session: StdMutex::new(None),
                cursor: StdMutex::new(None),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ClientInner>) -> Client {
        Client { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ClientInner> {
        Arc::downgrade(&self.inner)
    }

    /// A snapshot of the current configuration.
    pub fn config(&self) -> Config {
        self.inner.config.lock().unwrap().clone()
    }

    /// Resolve, connect, handshake, and start the session loops.
    ///
    /// Subsequent calls advance the SRV cursor so retries walk the answer
    /// in (priority, weight) order; retrying at all stays the caller's
    /// decision.
    pub async fn connect(&self) -> Result<(), Error> {
        self.close().await;
        let config = self.inner.config.lock().unwrap().clone();
        let (host, port) = self.next_host(&config).await?;
        let established = login::establish(&config, &host, port).await?;

        let (session, read_half) = Session::new(established.stream, established.jid);
        *self.inner.session.lock().unwrap() = Some(session.clone());

        let (queue_tx, queue_rx) = mpsc::channel(STANZA_QUEUE_DEPTH);
        tokio::spawn(worker::reader_loop(
            session.clone(),
            read_half,
            queue_tx,
            self.inner.handlers.clone(),
        ));
        tokio::spawn(worker::dispatcher_loop(
            session,
            queue_rx,
            self.inner.handlers.clone(),
        ));
        Ok(())
    }

    /// Swap credentials, tear the current connection down and re-run the
    /// whole handshake.
    pub async fn authenticate<U: Into<String>, P: Into<String>>(
        &self,
        username: U,
        password: P,
    ) -> Result<(), Error> {
        {
            let mut config = self.inner.config.lock().unwrap();
            config.username = Some(username.into());
            config.password = Some(password.into());
        }
        self.connect().await
    }

    /// Send `</stream:stream>` and tear the session down. Blocking waiters
    /// wake first, then the dispatcher stops.
    pub async fn close(&self) {
        let session = { self.inner.session.lock().unwrap().take() };
        let Some(session) = session else { return };
        let _ = session.send(Packet::StreamEnd).await;
        session.teardown();
        session.close_writer().await;
    }

    /// Serialize and send a message stanza.
    pub async fn send_message(&self, message: Message) -> Result<(), Error> {
        self.session()?.send_stanza(message.into()).await
    }

    /// Serialize and send a presence stanza.
    pub async fn send_presence(&self, presence: Presence) -> Result<(), Error> {
        self.session()?.send_stanza(presence.into()).await
    }

    /// Send an IQ request and block until its response, a timeout, or the
    /// death of the connection.
    ///
    /// `timeout` falls back to the configured default; a configured value
    /// of `-1` waits forever and anything below that is rejected. A timed
    /// out stream ping addressed at the bare server domain declares the
    /// whole session dead instead of returning [`Error::Timeout`].
    pub async fn iq_request(&self, mut iq: Iq, timeout: Option<Duration>) -> Result<Iq, Error> {
        if !iq.is_request() {
            return Err(Error::InvalidState);
        }
        let session = self.session()?;
        let timeout = self.effective_timeout(timeout)?;

        if iq.id.is_empty() {
            iq.id = session.next_id();
        }
        let id = iq.id.clone();
        let probe = session.is_liveness_probe(&iq);
        let mut rx = session.register_waiter(id.clone());
        if let Err(e) = session.send_stanza(iq.into()).await {
            session.take_pending(&id);
            return Err(e);
        }

        let timer = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(timer);

        tokio::select! {
            result = &mut rx => match result {
                Ok(response) => Ok(response),
                // The sender went away in a teardown.
                Err(_) => Err(Error::Disconnected),
            },
            _ = session.waiter_cancel.cancelled() => {
                session.take_pending(&id);
                Err(Error::Disconnected)
            }
            _ = &mut timer => {
                session.take_pending(&id);
                if probe {
                    debug!("liveness probe {} timed out, declaring the session dead", id);
                    if session.teardown() {
                        self.inner.handlers.emit_error(&Error::Disconnected);
                    }
                    Err(Error::Disconnected)
                } else {
                    Err(Error::Timeout)
                }
            }
        }
    }

    /// Send an IQ request and have `callback(id, response)` run once the
    /// response arrives. Returns the assigned id as soon as the request is
    /// written.
    pub async fn iq_request_with_callback<F>(
        &self,
        mut iq: Iq,
        callback: F,
    ) -> Result<String, Error>
    where
        F: FnOnce(String, Iq) + Send + 'static,
    {
        if !iq.is_request() {
            return Err(Error::InvalidState);
        }
        let session = self.session()?;
        if iq.id.is_empty() {
            iq.id = session.next_id();
        }
        let id = iq.id.clone();
        session.register_callback(id.clone(), Box::new(callback));
        if let Err(e) = session.send_stanza(iq.into()).await {
            session.take_pending(&id);
            return Err(e);
        }
        Ok(id)
    }

    /// Send a `result` or `error` answering a previously received request.
    /// Requests are rejected.
    pub async fn iq_response(&self, iq: Iq) -> Result<(), Error> {
        if !iq.is_response() {
            return Err(Error::InvalidState);
        }
        self.session()?.send_stanza(iq.into()).await
    }

    /// Issue a stream ping to the server itself.
    ///
    /// Note that by the preserved liveness heuristic a timeout here marks
    /// the session disconnected.
    pub async fn ping(&self, timeout: Option<Duration>) -> Result<(), Error> {
        let domain = self.session()?.domain.clone();
        let iq = Iq::from_get("", Ping.into()).with_to(Jid::from_domain(domain));
        self.iq_request(iq, timeout).await.map(|_| ())
    }

    /// The full JID the server bound this session to.
    pub fn bound_jid(&self) -> Option<Jid> {
        let guard = self.inner.session.lock().unwrap();
        guard
            .as_ref()
            .map(|session| session.jid.read().unwrap().clone())
    }

    /// The features of the current stream.
    pub fn stream_features(&self) -> Option<StreamFeatures> {
        let guard = self.inner.session.lock().unwrap();
        guard.as_ref().map(|session| session.features.clone())
    }

    /// The peer's default stream language.
    pub fn stream_lang(&self) -> Option<String> {
        let guard = self.inner.session.lock().unwrap();
        guard.as_ref().map(|session| session.lang.clone())
    }

    /// Whether a live session exists.
    pub fn is_connected(&self) -> bool {
        let guard = self.inner.session.lock().unwrap();
        guard
            .as_ref()
            .map(|session| session.is_connected())
            .unwrap_or(false)
    }

    /// Position of the SRV cursor, if SRV resolution ran.
    pub fn srv_cursor(&self) -> Option<usize> {
        let guard = self.inner.cursor.lock().unwrap();
        guard.as_ref().map(|cursor| cursor.position())
    }

    /// Subscribe to fatal session errors.
    pub fn on_error<F: Fn(&Error) + Send + Sync + 'static>(&self, f: F) {
        self.inner.handlers.subscribe_error(Box::new(f));
    }

    /// Subscribe to inbound IQ requests.
    pub fn on_iq<F: Fn(&Iq) + Send + Sync + 'static>(&self, f: F) {
        self.inner.handlers.subscribe_iq(Box::new(f));
    }

    /// Subscribe to inbound messages.
    pub fn on_message<F: Fn(&Message) + Send + Sync + 'static>(&self, f: F) {
        self.inner.handlers.subscribe_message(Box::new(f));
    }

    /// Subscribe to inbound presence.
    pub fn on_presence<F: Fn(&Presence) + Send + Sync + 'static>(&self, f: F) {
        self.inner.handlers.subscribe_presence(Box::new(f));
    }

    fn session(&self) -> Result<Arc<Session>, Error> {
        let guard = self.inner.session.lock().unwrap();
        match guard.as_ref() {
            Some(session) if session.is_connected() => Ok(session.clone()),
            _ => Err(Error::Disconnected),
        }
    }

    fn effective_timeout(&self, timeout: Option<Duration>) -> Result<Option<Duration>, Error> {
        if let Some(timeout) = timeout {
            return Ok(Some(timeout));
        }
        let ms = self.inner.config.lock().unwrap().default_iq_timeout_ms;
        match ms {
            -1 => Ok(None),
            ms if ms >= 0 => Ok(Some(Duration::from_millis(ms as u64))),
            _ => Err(Error::InvalidState),
        }
    }

    /// Resolve the SRV answer once, then hand out hosts cursor-wise.
    async fn next_host(&self, config: &Config) -> Result<(String, u16), Error> {
        if self.inner.cursor.lock().unwrap().is_none() {
            let records = if config.hostname.parse::<IpAddr>().is_ok() {
                Vec::new()
            } else {
                let service = format!(
                    "_xmpp-client._tcp.{}",
                    idna::domain_to_ascii(&config.hostname)?
                );
                match self.inner.resolver.resolve_srv(&service).await {
                    Ok(records) => records,
                    Err(e) => {
                        debug!("SRV resolution failed, using literal host: {}", e);
                        Vec::new()
                    }
                }
            };
            let mut guard = self.inner.cursor.lock().unwrap();
            if guard.is_none() {
                *guard = Some(HostCursor::new(
                    records,
                    (config.hostname.clone(), config.port),
                ));
            }
        }
        let mut guard = self.inner.cursor.lock().unwrap();
        Ok(guard.as_mut().expect("cursor was just installed").take())
    }
}
