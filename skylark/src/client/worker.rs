//! The two long-running loops of a connected session.

use std::sync::Arc;

use futures::StreamExt;
use log::{debug, trace, warn};
use tokio::sync::mpsc;

use crate::client::session::{PendingIq, ReadHalf, Session};
use crate::error::{Error, ProtocolError};
use crate::event::Handlers;
use crate::proto::Packet;
use crate::stanza::Stanza;

/// High-water mark of the reader → dispatcher queue. A slow dispatcher
/// backpressures the reader instead of growing memory without bound.
pub(crate) const STANZA_QUEUE_DEPTH: usize = 32;

/// Pull elements off the wire, route IQ responses to their pending entries
/// and push everything else onto the dispatcher queue in arrival order.
///
/// Exits on the first fatal condition, after waking every blocking waiter
/// and cancelling the dispatcher. I/O and XML-parser failures surface as
/// [`Error::Disconnected`].
pub(crate) async fn reader_loop(
    session: Arc<Session>,
    mut stream: ReadHalf,
    queue: mpsc::Sender<Stanza>,
    handlers: Arc<Handlers>,
) {
    let error = loop {
        match stream.next().await {
            Some(Ok(Packet::Stanza(elem))) => {
                let stanza = match Stanza::try_from(elem) {
                    Ok(stanza) => stanza,
                    Err(e) => break Error::Protocol(e),
                };
                match stanza {
                    Stanza::Iq(iq) if iq.is_response() => {
                        match session.take_pending(&iq.id) {
                            Some(PendingIq::Waiter(tx)) => {
                                trace!("IQ response {} wakes a blocking waiter", iq.id);
                                let _ = tx.send(iq);
                            }
                            Some(PendingIq::Callback(callback)) => {
                                trace!("IQ response {} dispatched to a callback", iq.id);
                                let id = iq.id.clone();
                                // Off the reader, so a slow callback cannot
                                // stall inbound processing.
                                tokio::spawn(async move { callback(id, iq) });
                            }
                            None => {
                                warn!("dropping orphan IQ response with id {:?}", iq.id);
                            }
                        }
                    }
                    stanza => {
                        if queue.send(stanza).await.is_err() {
                            break Error::Disconnected;
                        }
                    }
                }
            }
            Some(Ok(Packet::Text(_))) => {}
            Some(Ok(Packet::StreamStart(_))) => {
                break ProtocolError::InvalidStreamStart.into();
            }
            Some(Ok(Packet::StreamEnd)) | None => break Error::Disconnected,
            Some(Err(e)) => {
                break match e {
                    Error::Io(_)
                    | Error::Protocol(ProtocolError::Parser(_))
                    | Error::Protocol(ProtocolError::InvalidToken(_)) => Error::Disconnected,
                    other => other,
                }
            }
        }
    };
    debug!("reader loop exiting: {}", error);
    if session.teardown() {
        handlers.emit_error(&error);
    }
}

/// Take one stanza at a time off the queue and dispatch it synchronously
/// to the registered handlers, in exactly the order the reader produced
/// them. Handler panics are logged and swallowed by [`Handlers`].
pub(crate) async fn dispatcher_loop(
    session: Arc<Session>,
    mut queue: mpsc::Receiver<Stanza>,
    handlers: Arc<Handlers>,
) {
    loop {
        tokio::select! {
            _ = session.dispatcher_cancel.cancelled() => break,
            stanza = queue.recv() => match stanza {
                None => break,
                Some(Stanza::Iq(iq)) => handlers.emit_iq(&iq),
                Some(Stanza::Message(message)) => handlers.emit_message(&message),
                Some(Stanza::Presence(presence)) => handlers.emit_presence(&presence),
            },
        }
    }
    debug!("dispatcher loop exiting");
}
