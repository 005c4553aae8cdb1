//! XML stream framing.
//!
//! The decoder cuts the inbound byte stream into complete top-level children
//! of `<stream:stream/>` and parses each one into a [`minidom::Element`]; it
//! never materializes the stream document itself. The encoder writes the
//! stream header (with XML prolog), serialized stanzas, and the stream
//! footer.

use std::collections::HashMap;

use bytes::{Buf, BytesMut};
use log::debug;
use minidom::Element;
use quick_xml::events::Event;
use quick_xml::Reader;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{Error, ProtocolError};
use crate::ns;

/// Anything the codec reads from or writes to the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// A `<stream:stream>` header with its attributes.
    StreamStart(HashMap<String, String>),
    /// A complete top-level child element.
    Stanza(Element),
    /// Text between stanzas; in practice whitespace keep-alives.
    Text(String),
    /// The `</stream:stream>` footer.
    StreamEnd,
}

/// Stream framing codec. A fresh instance is created for every XML stream,
/// including stream restarts after STARTTLS and SASL.
pub struct XmppCodec {
    debug_stanzas: bool,
}

impl XmppCodec {
    /// New codec; `debug_stanzas` additionally logs raw frames.
    pub fn new(debug_stanzas: bool) -> XmppCodec {
        XmppCodec { debug_stanzas }
    }

    fn log_rx(&self, frame: &str) {
        if self.debug_stanzas {
            debug!("<< {}", frame);
        }
    }

    fn log_tx(&self, frame: &str) {
        if self.debug_stanzas {
            debug!(">> {}", frame);
        }
    }
}

/// One complete frame cut out of the buffer, plus the bytes it consumed.
enum Frame {
    StreamStart(String),
    Child(String),
    StreamEnd,
    Text(String),
}

impl Decoder for XmppCodec {
    type Item = Packet;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Packet>, Error> {
        let (frame, consumed) = match extract_frame(buf)? {
            Some(hit) => hit,
            None => return Ok(None),
        };
        buf.advance(consumed);
        match frame {
            Frame::StreamStart(raw) => {
                self.log_rx(&raw);
                Ok(Some(Packet::StreamStart(parse_stream_header(&raw)?)))
            }
            Frame::Child(raw) => {
                self.log_rx(&raw);
                Ok(Some(Packet::Stanza(parse_child(&raw)?)))
            }
            Frame::StreamEnd => {
                self.log_rx("</stream:stream>");
                Ok(Some(Packet::StreamEnd))
            }
            Frame::Text(text) => Ok(Some(Packet::Text(text))),
        }
    }
}

impl Encoder<Packet> for XmppCodec {
    type Error = Error;

    fn encode(&mut self, item: Packet, buf: &mut BytesMut) -> Result<(), Error> {
        match item {
            Packet::StreamStart(attrs) => {
                let mut header = String::from("<?xml version='1.0'?><stream:stream");
                for (name, value) in &attrs {
                    header.push_str(&format!(" {}='{}'", name, escape_attr(value)));
                }
                header.push('>');
                self.log_tx(&header);
                buf.extend_from_slice(header.as_bytes());
            }
            Packet::Stanza(stanza) => {
                let mut bytes = Vec::new();
                stanza
                    .write_to(&mut bytes)
                    .map_err(ProtocolError::Parser)?;
                self.log_tx(&String::from_utf8_lossy(&bytes));
                buf.extend_from_slice(&bytes);
            }
            Packet::Text(text) => {
                buf.extend_from_slice(text.as_bytes());
            }
            Packet::StreamEnd => {
                self.log_tx("</stream:stream>");
                buf.extend_from_slice(b"</stream:stream>");
            }
        }
        Ok(())
    }
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn is_xml_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

/// Extract a single complete frame from the buffer.
///
/// Returns `None` while the buffer holds only part of a frame; the caller
/// keeps the bytes around and retries after the next read. Malformed XML is
/// a hard error.
fn extract_frame(buffer: &[u8]) -> Result<Option<(Frame, usize)>, Error> {
    if buffer.is_empty() {
        return Ok(None);
    }

    // Whitespace keep-alives between stanzas are surfaced as text so the
    // buffer cannot fill up with them.
    let start = match buffer.iter().position(|&b| !is_xml_whitespace(b)) {
        Some(start) => start,
        None => {
            let text = String::from_utf8_lossy(buffer).into_owned();
            return Ok(Some((Frame::Text(text), buffer.len())));
        }
    };

    // The stream footer has no matching opening tag in the buffer.
    if buffer[start..].starts_with(b"</stream:stream>") {
        return Ok(Some((Frame::StreamEnd, start + b"</stream:stream>".len())));
    }

    let mut reader = Reader::from_reader(buffer);
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = false;

    let mut depth: u32 = 0;
    let mut child_start: usize = 0;
    let mut in_child = false;

    loop {
        let pos = reader.buffer_position() as usize;
        match reader.read_event() {
            Ok(Event::Decl(_)) | Ok(Event::PI(_)) | Ok(Event::Comment(_))
            | Ok(Event::DocType(_)) => continue,
            Ok(Event::Start(e)) => {
                // The stream header opens and stays open; report it alone.
                if !in_child && e.name().as_ref() == b"stream:stream" {
                    let tag_end = reader.buffer_position() as usize;
                    let raw = String::from_utf8_lossy(&buffer[..tag_end]).into_owned();
                    return Ok(Some((Frame::StreamStart(raw), tag_end)));
                }
                depth += 1;
                if !in_child && depth == 1 {
                    in_child = true;
                    child_start = pos;
                }
            }
            Ok(Event::Empty(e)) => {
                if !in_child && e.name().as_ref() == b"stream:stream" {
                    let tag_end = reader.buffer_position() as usize;
                    let raw = String::from_utf8_lossy(&buffer[..tag_end]).into_owned();
                    return Ok(Some((Frame::StreamStart(raw), tag_end)));
                }
                if !in_child && depth == 0 {
                    let tag_end = reader.buffer_position() as usize;
                    let raw = String::from_utf8_lossy(&buffer[pos..tag_end]).into_owned();
                    return Ok(Some((Frame::Child(raw), tag_end)));
                }
            }
            Ok(Event::Text(_)) | Ok(Event::CData(_)) | Ok(Event::GeneralRef(_)) => {}
            Ok(Event::End(e)) => {
                if depth == 0 && e.name().as_ref() == b"stream:stream" {
                    let tag_end = reader.buffer_position() as usize;
                    return Ok(Some((Frame::StreamEnd, tag_end)));
                }
                depth = depth.saturating_sub(1);
                if in_child && depth == 0 {
                    let tag_end = reader.buffer_position() as usize;
                    let raw =
                        String::from_utf8_lossy(&buffer[child_start..tag_end]).into_owned();
                    return Ok(Some((Frame::Child(raw), tag_end)));
                }
            }
            Ok(Event::Eof) => return Ok(None),
            // A syntax error in the middle of a TCP stream usually means the
            // tag is split across reads; wait for more bytes.
            Err(quick_xml::Error::Syntax(_)) => return Ok(None),
            Err(e) => return Err(ProtocolError::InvalidToken(e).into()),
        }
    }
}

/// Pull the attribute map out of a raw `<stream:stream …>` header.
fn parse_stream_header(raw: &str) -> Result<HashMap<String, String>, Error> {
    let mut reader = Reader::from_str(raw);
    reader.config_mut().check_end_names = false;
    loop {
        match reader.read_event() {
            Ok(Event::Decl(_)) => continue,
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let mut attrs = HashMap::new();
                for attr in e.attributes().flatten() {
                    attrs.insert(
                        String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                        String::from_utf8_lossy(&attr.value).into_owned(),
                    );
                }
                return Ok(attrs);
            }
            _ => return Err(ProtocolError::InvalidStreamStart.into()),
        }
    }
}

/// Parse a top-level child. The fragment is wrapped into a synthetic stream
/// root so that the `stream` prefix and the default namespace declared on
/// the real stream header resolve.
fn parse_child(raw: &str) -> Result<Element, Error> {
    let wrapped = format!(
        "<stream:stream xmlns='{}' xmlns:stream='{}'>{}</stream:stream>",
        ns::CLIENT,
        ns::STREAM,
        raw
    );
    let root: Element = wrapped.parse().map_err(ProtocolError::Parser)?;
    root.children()
        .next()
        .cloned()
        .ok_or_else(|| ProtocolError::InvalidStanza("empty frame").into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Vec<Packet> {
        let mut codec = XmppCodec::new(false);
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(packet) = codec.decode(&mut buf).unwrap() {
            out.push(packet);
        }
        out
    }

    #[test]
    fn stream_header_with_prolog() {
        let packets = decode_all(
            b"<?xml version='1.0'?><stream:stream xmlns='jabber:client' \
              xmlns:stream='http://etherx.jabber.org/streams' from='example.net' \
              id='abc' version='1.0' xml:lang='de'>",
        );
        match &packets[..] {
            [Packet::StreamStart(attrs)] => {
                assert_eq!(attrs.get("id").map(String::as_str), Some("abc"));
                assert_eq!(attrs.get("xml:lang").map(String::as_str), Some("de"));
                assert_eq!(attrs.get("from").map(String::as_str), Some("example.net"));
            }
            other => panic!("unexpected packets: {:?}", other),
        }
    }

    #[test]
    fn features_after_header_in_one_buffer() {
        let packets = decode_all(
            b"<stream:stream xmlns='jabber:client' \
              xmlns:stream='http://etherx.jabber.org/streams' version='1.0'>\
              <stream:features><starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>\
              </stream:features>",
        );
        assert_eq!(packets.len(), 2);
        match &packets[1] {
            Packet::Stanza(elem) => {
                assert!(elem.is("features", ns::STREAM));
                assert!(elem.has_child("starttls", ns::TLS));
            }
            other => panic!("unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn incomplete_stanza_waits_for_more() {
        let mut codec = XmppCodec::new(false);
        let mut buf = BytesMut::from(&b"<iq type='get' id='1'><query xmlns='jabber:iq:ros"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"ter'/></iq>");
        match codec.decode(&mut buf).unwrap() {
            Some(Packet::Stanza(elem)) => assert!(elem.is("iq", ns::CLIENT)),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn several_stanzas_in_one_read() {
        let packets = decode_all(
            b"<presence/><message to='a@b'><body>Hi</body></message><iq type='result' id='1'/>",
        );
        assert_eq!(packets.len(), 3);
        match &packets[1] {
            Packet::Stanza(elem) => {
                assert!(elem.is("message", ns::CLIENT));
                assert_eq!(elem.get_child("body", ns::CLIENT).unwrap().text(), "Hi");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn default_namespace_is_inherited() {
        let packets = decode_all(b"<iq type='result' id='x'/>");
        match &packets[0] {
            Packet::Stanza(elem) => assert!(elem.is("iq", ns::CLIENT)),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn whitespace_keepalive() {
        let packets = decode_all(b"\n \n<presence/>");
        assert!(matches!(packets[0], Packet::Stanza(_)));

        let packets = decode_all(b"\n\n");
        assert!(matches!(&packets[0], Packet::Text(t) if t == "\n\n"));
    }

    #[test]
    fn stream_end() {
        let packets = decode_all(b"<presence/></stream:stream>");
        assert_eq!(packets.len(), 2);
        assert!(matches!(packets[1], Packet::StreamEnd));
    }

    #[test]
    fn entities_survive_the_round_trip() {
        let packets =
            decode_all(b"<message to='a@b'><body>a &amp; b &lt;c&gt;</body></message>");
        match &packets[0] {
            Packet::Stanza(elem) => {
                assert_eq!(
                    elem.get_child("body", ns::CLIENT).unwrap().text(),
                    "a & b <c>"
                );
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn encoder_emits_prolog_once() {
        let mut codec = XmppCodec::new(false);
        let mut buf = BytesMut::new();
        let attrs: HashMap<_, _> = [("to".to_owned(), "example.net".to_owned())]
            .into_iter()
            .collect();
        codec.encode(Packet::StreamStart(attrs), &mut buf).unwrap();
        let header = String::from_utf8(buf.to_vec()).unwrap();
        assert!(header.starts_with("<?xml version='1.0'?><stream:stream"));
        assert!(header.contains("to='example.net'"));
        assert!(header.ends_with('>'));

        buf.clear();
        codec
            .encode(
                Packet::Stanza(Element::builder("presence", ns::CLIENT).build()),
                &mut buf,
            )
            .unwrap();
        let stanza = String::from_utf8(buf.to_vec()).unwrap();
        assert!(!stanza.contains("<?xml"));
    }

    #[test]
    fn encode_decode_round_trip() {
        let stanza: Element = "<message xmlns='jabber:client' to='bob@example.net' id='m1'>\
                               <body xmlns='jabber:client'>hello</body></message>"
            .parse()
            .unwrap();
        let mut codec = XmppCodec::new(false);
        let mut buf = BytesMut::new();
        codec
            .encode(Packet::Stanza(stanza.clone()), &mut buf)
            .unwrap();
        match codec.decode(&mut buf).unwrap() {
            Some(Packet::Stanza(parsed)) => assert_eq!(parsed, stanza),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
