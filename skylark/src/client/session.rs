//! Connected-session state shared between the public API and the loops.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex as StdMutex, RwLock};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use minidom::Element;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use tokio::sync::{oneshot, Mutex as TokioMutex};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::connect::Wire;
use crate::error::Error;
use crate::jid::Jid;
use crate::proto::{Packet, XmppCodec, XmppStream};
use crate::stanza::{ping, Iq, IqType, StreamFeatures};

/// One entry of the pending-IQ table. Each entry resolves exactly once.
pub(crate) enum PendingIq {
    /// A blocking caller parked on a oneshot.
    Waiter(oneshot::Sender<Iq>),
    /// A callback to run (off the reader) once the response arrives.
    Callback(Box<dyn FnOnce(String, Iq) + Send>),
}

type WriteHalf = SplitSink<Framed<Wire, XmppCodec>, Packet>;
pub(crate) type ReadHalf = SplitStream<Framed<Wire, XmppCodec>>;

/// Shared state of one established session.
///
/// The write half lives under a mutex so concurrent senders serialize at
/// the byte level; the pending-IQ table commutes under its own lock.
pub(crate) struct Session {
    pub(crate) domain: String,
    pub(crate) jid: RwLock<Jid>,
    pub(crate) lang: String,
    pub(crate) features: StreamFeatures,
    pub(crate) connected: AtomicBool,
    pub(crate) waiter_cancel: CancellationToken,
    pub(crate) dispatcher_cancel: CancellationToken,
    writer: TokioMutex<WriteHalf>,
    pending: StdMutex<HashMap<String, PendingIq>>,
    torn_down: AtomicBool,
    id_prefix: String,
    id_counter: AtomicU64,
}

impl Session {
    /// Split an established stream into the shared session and the read
    /// half for the reader loop.
    pub(crate) fn new(stream: XmppStream, jid: Jid) -> (std::sync::Arc<Session>, ReadHalf) {
        let domain = stream.domain;
        let features = stream.features;
        let lang = stream.lang;
        let (writer, reader) = stream.stream.split();
        let id_prefix: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        let session = std::sync::Arc::new(Session {
            domain,
            jid: RwLock::new(jid),
            lang,
            features,
            connected: AtomicBool::new(true),
            waiter_cancel: CancellationToken::new(),
            dispatcher_cancel: CancellationToken::new(),
            writer: TokioMutex::new(writer),
            pending: StdMutex::new(HashMap::new()),
            torn_down: AtomicBool::new(false),
            id_prefix,
            id_counter: AtomicU64::new(0),
        });
        (session, reader)
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// A fresh session-unique stanza id: a per-session random salt plus a
    /// monotone counter.
    pub(crate) fn next_id(&self) -> String {
        let n = self.id_counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.id_prefix, n)
    }

    /// Serialize one packet onto the wire.
    pub(crate) async fn send(&self, packet: Packet) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::Disconnected);
        }
        let mut writer = self.writer.lock().await;
        writer.send(packet).await
    }

    pub(crate) async fn send_stanza(&self, elem: Element) -> Result<(), Error> {
        self.send(Packet::Stanza(elem)).await
    }

    pub(crate) fn register_waiter(&self, id: String) -> oneshot::Receiver<Iq> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap()
            .insert(id, PendingIq::Waiter(tx));
        rx
    }

    pub(crate) fn register_callback(
        &self,
        id: String,
        callback: Box<dyn FnOnce(String, Iq) + Send>,
    ) {
        self.pending
            .lock()
            .unwrap()
            .insert(id, PendingIq::Callback(callback));
    }

    /// Remove and return the pending entry for `id`, if any.
    pub(crate) fn take_pending(&self, id: &str) -> Option<PendingIq> {
        self.pending.lock().unwrap().remove(id)
    }

    /// Whether a request matches the preserved ping-liveness heuristic: a
    /// `<ping xmlns='urn:xmpp:ping'/>` get addressed at the bare session
    /// domain. A timeout on such a request declares the session dead.
    pub(crate) fn is_liveness_probe(&self, iq: &Iq) -> bool {
        let payload = match &iq.payload {
            IqType::Get(payload) => payload,
            _ => return false,
        };
        let to = match &iq.to {
            Some(to) => to,
            None => return false,
        };
        to.node().is_none()
            && to.resource().is_none()
            && to.domain().eq_ignore_ascii_case(&self.domain)
            && ping::is_ping(payload)
    }

    /// Tear the session down: waiters first, then the dispatcher, then the
    /// connected flag. Idempotent; returns whether this call was first.
    pub(crate) fn teardown(&self) -> bool {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.waiter_cancel.cancel();
        self.pending.lock().unwrap().clear();
        self.dispatcher_cancel.cancel();
        self.connected.store(false, Ordering::SeqCst);
        true
    }

    /// Flush and shut the write half down; the peer answers with EOF which
    /// lets the reader loop finish.
    pub(crate) async fn close_writer(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.close().await;
    }
}
