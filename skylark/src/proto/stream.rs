//! `XmppStream` provides the header exchange on top of the codec.

use futures::{sink::SinkExt, stream::StreamExt};
use minidom::Element;
use tokio_util::codec::{Framed, FramedParts};

use crate::connect::Wire;
use crate::error::{Error, ProtocolError};
use crate::ns;
use crate::proto::{Packet, XmppCodec};
use crate::stanza::StreamFeatures;

/// Stream language when the peer does not declare one.
const DEFAULT_LANG: &str = "en";

/// An established XML stream: header exchanged, features consumed.
///
/// A new instance is produced for every stream (re)start; pending parser
/// state of the previous stream is discarded with its codec.
pub struct XmppStream {
    /// The peer domain this stream was opened to.
    pub domain: String,
    /// The framed transport.
    pub stream: Framed<Wire, XmppCodec>,
    /// The `<stream:features/>` the peer announced for this stream.
    pub features: StreamFeatures,
    /// The stream id chosen by the peer, empty if it sent none.
    pub id: String,
    /// The peer's default `xml:lang`, `en` if it declared none.
    pub lang: String,
    local_lang: String,
    debug_stanzas: bool,
}

impl XmppStream {
    /// Open a stream over a fresh wire: send our header, consume the peer
    /// header and its features.
    pub async fn start(
        wire: Wire,
        domain: &str,
        local_lang: &str,
        debug_stanzas: bool,
    ) -> Result<XmppStream, Error> {
        let stream = Framed::new(wire, XmppCodec::new(debug_stanzas));
        Self::start_framed(stream, domain, local_lang, debug_stanzas).await
    }

    async fn start_framed(
        mut stream: Framed<Wire, XmppCodec>,
        domain: &str,
        local_lang: &str,
        debug_stanzas: bool,
    ) -> Result<XmppStream, Error> {
        let attrs = [
            ("to".to_owned(), domain.to_owned()),
            ("version".to_owned(), "1.0".to_owned()),
            ("xml:lang".to_owned(), local_lang.to_owned()),
            ("xmlns".to_owned(), ns::CLIENT.to_owned()),
            ("xmlns:stream".to_owned(), ns::STREAM.to_owned()),
        ]
        .into_iter()
        .collect();
        stream.send(Packet::StreamStart(attrs)).await?;

        let header;
        loop {
            match stream.next().await {
                Some(Ok(Packet::StreamStart(attrs))) => {
                    header = attrs;
                    break;
                }
                Some(Ok(Packet::Text(_))) => {}
                Some(Ok(_)) => return Err(ProtocolError::InvalidStreamStart.into()),
                Some(Err(e)) => return Err(e),
                None => return Err(Error::Disconnected),
            }
        }

        if !header.contains_key("xmlns") {
            return Err(ProtocolError::NoStreamNamespace.into());
        }
        let id = header.get("id").cloned().unwrap_or_default();
        let lang = header
            .get("xml:lang")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LANG.to_owned());

        let features = if header.contains_key("version") {
            loop {
                match stream.next().await {
                    Some(Ok(Packet::Stanza(elem))) => {
                        break StreamFeatures::try_from(elem)?;
                    }
                    Some(Ok(Packet::Text(_))) => {}
                    Some(Ok(_)) => return Err(ProtocolError::InvalidStreamStart.into()),
                    Some(Err(e)) => return Err(e),
                    None => return Err(Error::Disconnected),
                }
            }
        } else {
            // Pre-RFC server without stream features.
            StreamFeatures::default()
        };

        Ok(XmppStream {
            domain: domain.to_owned(),
            stream,
            features,
            id,
            lang,
            local_lang: local_lang.to_owned(),
            debug_stanzas,
        })
    }

    /// Restart the stream on the same wire, e.g. after SASL success.
    ///
    /// Inbound bytes the old codec had already buffered belong to the new
    /// stream and are carried over.
    pub async fn restart(self) -> Result<XmppStream, Error> {
        let domain = self.domain;
        let local_lang = self.local_lang;
        let debug_stanzas = self.debug_stanzas;
        let old = self.stream.into_parts();
        let mut parts = FramedParts::new::<Packet>(old.io, XmppCodec::new(debug_stanzas));
        parts.read_buf = old.read_buf;
        let stream = Framed::from_parts(parts);
        Self::start_framed(stream, &domain, &local_lang, debug_stanzas).await
    }

    /// Unwrap the raw wire, e.g. to hand it to the TLS layer.
    pub fn into_inner(self) -> Wire {
        self.stream.into_inner()
    }

    /// Send a single element.
    pub async fn send_element(&mut self, elem: Element) -> Result<(), Error> {
        self.stream.send(Packet::Stanza(elem)).await
    }

    /// Read the next top-level element.
    ///
    /// With a non-empty `allowed` list, an element with any other name is a
    /// protocol error. Inter-stanza text is skipped; a stream footer or EOF
    /// surfaces as [`Error::Disconnected`].
    pub async fn read_element(&mut self, allowed: &[&str]) -> Result<Element, Error> {
        loop {
            match self.stream.next().await {
                Some(Ok(Packet::Stanza(elem))) => {
                    if !allowed.is_empty() && !allowed.contains(&elem.name()) {
                        return Err(
                            ProtocolError::UnexpectedElement(elem.name().to_owned()).into()
                        );
                    }
                    return Ok(elem);
                }
                Some(Ok(Packet::Text(_))) => {}
                Some(Ok(Packet::StreamStart(_))) => {
                    return Err(ProtocolError::InvalidStreamStart.into());
                }
                Some(Ok(Packet::StreamEnd)) | None => return Err(Error::Disconnected),
                Some(Err(e)) => return Err(e),
            }
        }
    }
}
