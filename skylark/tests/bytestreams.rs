//! SOCKS5 bytestream transfers against scripted peers on localhost.

mod common;

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use skylark::bytestreams::{dst_address, socks5, AddressProbe, SiSession, Socks5Bytestreams};
use skylark::minidom::Element;
use skylark::{Client, Config, Jid, TlsMode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use common::FakeServer;

const BYTESTREAMS_NS: &str = "http://jabber.org/protocol/bytestreams";

fn parse_stanza(raw: &str) -> Element {
    let start = raw.find("<iq").unwrap();
    let wrapped = format!(
        "<stream:stream xmlns='jabber:client' \
         xmlns:stream='http://etherx.jabber.org/streams'>{}</stream:stream>",
        &raw[start..]
    );
    let root: Element = wrapped.parse().unwrap();
    root.children().next().cloned().unwrap()
}

fn jid(s: &str) -> Jid {
    s.parse().unwrap()
}

fn payload_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn serve_anonymous(listener: TcpListener) -> FakeServer {
    let mut server = FakeServer::accept(&listener).await;
    server.read_stream_header().await;
    server.send_stream_header("bs-1").await;
    server.send("<stream:features/>").await;
    server
}

async fn connect_anonymous(config: Config) -> (Client, FakeServer) {
    let (listener, port) = common::listen().await;
    let server = tokio::spawn(serve_anonymous(listener));
    let client = Client::new(config.with_port(port).with_tls(TlsMode::None));
    client.connect().await.unwrap();
    (client, server.await.unwrap())
}

/// Claims this host is reachable as 127.0.0.1, so direct transfers have a
/// deterministic streamhost regardless of the machine's interfaces.
struct LoopbackProbe;

impl AddressProbe for LoopbackProbe {
    fn external_addresses<'x>(
        &'x self,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = std::io::Result<Vec<IpAddr>>> + Send + 'x>,
    > {
        Box::pin(async { Ok(vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]) })
    }
}

#[tokio::test]
async fn direct_transfer_pushes_the_whole_payload() {
    let payload = payload_bytes(20_000);
    let size = payload.len() as u64;
    let initiator = jid("a@x/r1");
    let target = jid("b@y/r2");
    let dst = dst_address("mySid", &initiator, &target);

    let mut config = Config::new("127.0.0.1");
    config.proxy_allowed = false;
    config.server_port_from = 52400;
    config.server_port_to = 52450;
    let (client, mut server) = connect_anonymous(config).await;

    let service = Socks5Bytestreams::new(&client);
    service.add_probe(Arc::new(LoopbackProbe));

    let progressed = Arc::new(AtomicU64::new(0));
    let progressed2 = progressed.clone();
    service.on_bytes_transferred(move |session| {
        progressed2.store(session.count(), Ordering::SeqCst);
    });

    let expected = payload.clone();
    let peer = tokio::spawn(async move {
        let offer = server.read_until("</iq>").await;
        let offer = parse_stanza(&offer);
        let iq_id = offer.attr("id").unwrap().to_owned();
        let query = offer.children().next().unwrap();
        assert!(query.is("query", BYTESTREAMS_NS));
        assert_eq!(query.attr("sid"), Some("mySid"));
        let port: u16 = query
            .children()
            .find(|child| {
                child.name() == "streamhost" && child.attr("host") == Some("127.0.0.1")
            })
            .expect("no loopback streamhost advertised")
            .attr("port")
            .unwrap()
            .parse()
            .unwrap();

        // Connect and negotiate before answering the offer, like a real
        // target does.
        let mut socket = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        socks5::connect(&mut socket, &dst, 0).await.unwrap();
        server
            .send(&format!(
                "<iq id='{}' type='result' from='b@y/r2'>\
                 <query xmlns='{}' sid='mySid'>\
                 <streamhost-used jid='a@x/r1'/></query></iq>",
                iq_id, BYTESTREAMS_NS
            ))
            .await;

        let mut received = Vec::new();
        socket.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, expected);
        server
    });

    let (source, mut feeder) = tokio::io::duplex(1 << 16);
    let session = SiSession::new("mySid", initiator, target, size, Box::new(source));
    let writer = tokio::spawn(async move {
        feeder.write_all(&payload).await.unwrap();
    });

    service.send(session.clone()).await.unwrap();
    assert_eq!(session.count(), size);
    assert_eq!(progressed.load(Ordering::SeqCst), size);

    writer.await.unwrap();
    peer.await.unwrap();
}

#[tokio::test]
async fn incoming_transfer_walks_streamhosts_in_order() {
    let payload = payload_bytes(4_096);
    let size = payload.len() as u64;
    // For an incoming transfer the peer is the initiator.
    let initiator = jid("b@y/r2");
    let target = jid("a@x/r1");
    let dst = dst_address("inSid", &initiator, &target);

    let (client, mut server) = connect_anonymous(Config::new("127.0.0.1")).await;
    let service = Socks5Bytestreams::new(&client);
    service.attach();

    let (sink, mut collector) = tokio::io::duplex(1 << 16);
    let session = SiSession::new("inSid", initiator, target, size, Box::new(sink));
    service.register_session(session.clone());

    // The initiator's SOCKS5 server.
    let socks_listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let socks_port = socks_listener.local_addr().unwrap().port();
    let sent = payload.clone();
    let socks_server = tokio::spawn(async move {
        let (mut socket, _) = socks_listener.accept().await.unwrap();
        socks5::accept(&mut socket, &dst).await.unwrap();
        socket.write_all(&sent).await.unwrap();
    });

    // First streamhost is dead; the service must fall through to the
    // second one.
    server
        .send(&format!(
            "<iq from='b@y/r2' id='offer-1' type='set'>\
             <query xmlns='{ns}' sid='inSid'>\
             <streamhost jid='dead@y/r9' host='127.0.0.1' port='1'/>\
             <streamhost jid='b@y/r2' host='127.0.0.1' port='{port}'/>\
             </query></iq>",
            ns = BYTESTREAMS_NS,
            port = socks_port
        ))
        .await;

    let reply = server.read_until("</iq>").await;
    let reply = parse_stanza(&reply);
    assert_eq!(reply.attr("id"), Some("offer-1"));
    assert_eq!(reply.attr("type"), Some("result"));
    let used = reply
        .children()
        .next()
        .unwrap()
        .get_child("streamhost-used", BYTESTREAMS_NS)
        .unwrap()
        .attr("jid")
        .unwrap()
        .to_owned();
    assert_eq!(used, "b@y/r2");

    let mut received = vec![0u8; payload.len()];
    collector.read_exact(&mut received).await.unwrap();
    assert_eq!(received, payload);
    assert_eq!(session.count(), size);
    socks_server.await.unwrap();
}

#[tokio::test]
async fn incoming_offers_are_validated() {
    let (client, mut server) = connect_anonymous(Config::new("127.0.0.1")).await;
    let service = Socks5Bytestreams::new(&client);
    service.attach();

    let (sink, _collector) = tokio::io::duplex(1024);
    let session = SiSession::new("okSid", jid("b@y/r2"), jid("a@x/r1"), 1, Box::new(sink));
    service.register_session(session);

    // Unknown sid: not-acceptable.
    server
        .send(&format!(
            "<iq from='b@y/r2' id='q1' type='set'><query xmlns='{}' sid='nope'>\
             <streamhost jid='b@y/r2' host='127.0.0.1' port='1'/></query></iq>",
            BYTESTREAMS_NS
        ))
        .await;
    let reply = parse_stanza(&server.read_until("</iq>").await);
    assert_eq!(reply.attr("type"), Some("error"));
    assert!(String::from(&reply).contains("not-acceptable"));

    // Right sid but wrong peer: also not-acceptable.
    server
        .send(&format!(
            "<iq from='mallory@y/r2' id='q2' type='set'><query xmlns='{}' sid='okSid'>\
             <streamhost jid='mallory@y/r2' host='127.0.0.1' port='1'/></query></iq>",
            BYTESTREAMS_NS
        ))
        .await;
    let reply = parse_stanza(&server.read_until("</iq>").await);
    assert_eq!(reply.attr("type"), Some("error"));
    assert!(String::from(&reply).contains("not-acceptable"));

    // UDP mode: feature-not-implemented.
    server
        .send(&format!(
            "<iq from='b@y/r2' id='q3' type='set'>\
             <query xmlns='{}' sid='okSid' mode='udp'>\
             <streamhost jid='b@y/r2' host='127.0.0.1' port='1'/></query></iq>",
            BYTESTREAMS_NS
        ))
        .await;
    let reply = parse_stanza(&server.read_until("</iq>").await);
    assert_eq!(reply.attr("type"), Some("error"));
    assert!(String::from(&reply).contains("feature-not-implemented"));

    // Unreachable streamhosts only: item-not-found.
    server
        .send(&format!(
            "<iq from='b@y/r2' id='q4' type='set'><query xmlns='{}' sid='okSid'>\
             <streamhost jid='b@y/r2' host='127.0.0.1' port='1'/></query></iq>",
            BYTESTREAMS_NS
        ))
        .await;
    let reply = parse_stanza(&server.read_until("</iq>").await);
    assert_eq!(reply.attr("type"), Some("error"));
    assert!(String::from(&reply).contains("item-not-found"));
}

#[tokio::test]
async fn mediated_transfer_activates_the_chosen_proxy() {
    let payload = payload_bytes(10_000);
    let size = payload.len() as u64;
    let initiator = jid("a@x/r1");
    let target = jid("b@y/r2");
    let dst = dst_address("medSid", &initiator, &target);

    // The proxy the peer will pick.
    let proxy_listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let proxy_port = proxy_listener.local_addr().unwrap().port();
    let expected = payload.clone();
    let proxy = tokio::spawn(async move {
        let (mut socket, _) = proxy_listener.accept().await.unwrap();
        socks5::accept(&mut socket, &dst).await.unwrap();
        let mut received = Vec::new();
        socket.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, expected);
    });

    let mut config = Config::new("127.0.0.1");
    config.user_proxies = vec![jid("p1.example"), jid("p2.example")];
    let (client, mut server) = connect_anonymous(config).await;
    let service = Socks5Bytestreams::new(&client);

    let server = tokio::spawn(async move {
        // Streamhost discovery on both configured proxies, in order.
        for (proxy_jid, port) in [("p1.example", 9), ("p2.example", proxy_port)] {
            let discovery = parse_stanza(&server.read_until("</iq>").await);
            assert_eq!(discovery.attr("type"), Some("get"));
            assert_eq!(discovery.attr("to"), Some(proxy_jid));
            let id = discovery.attr("id").unwrap();
            server
                .send(&format!(
                    "<iq id='{id}' type='result' from='{proxy_jid}'>\
                     <query xmlns='{ns}'>\
                     <streamhost jid='{proxy_jid}' host='127.0.0.1' port='{port}'/>\
                     </query></iq>",
                    id = id,
                    proxy_jid = proxy_jid,
                    ns = BYTESTREAMS_NS,
                    port = port
                ))
                .await;
        }

        // The offer to the target lists both proxies; the peer picks the
        // second one.
        let offer = parse_stanza(&server.read_until("</iq>").await);
        assert_eq!(offer.attr("to"), Some("b@y/r2"));
        let query = offer.children().next().unwrap();
        assert_eq!(query.attr("sid"), Some("medSid"));
        assert_eq!(query.children().count(), 2);
        let id = offer.attr("id").unwrap();
        server
            .send(&format!(
                "<iq id='{}' type='result' from='b@y/r2'><query xmlns='{}' sid='medSid'>\
                 <streamhost-used jid='p2.example'/></query></iq>",
                id, BYTESTREAMS_NS
            ))
            .await;

        // The activation request must come before any payload flows.
        let activate = parse_stanza(&server.read_until("</iq>").await);
        assert_eq!(activate.attr("to"), Some("p2.example"));
        let query = activate.children().next().unwrap();
        assert_eq!(query.attr("sid"), Some("medSid"));
        assert_eq!(
            query.get_child("activate", BYTESTREAMS_NS).unwrap().text(),
            "b@y/r2"
        );
        let id = activate.attr("id").unwrap();
        server
            .send(&format!("<iq id='{}' type='result' from='p2.example'/>", id))
            .await;
        server
    });

    let (source, mut feeder) = tokio::io::duplex(1 << 16);
    let session = SiSession::new("medSid", initiator, target, size, Box::new(source));
    let writer = tokio::spawn(async move {
        feeder.write_all(&payload).await.unwrap();
    });

    service.send(session.clone()).await.unwrap();
    assert_eq!(session.count(), size);

    writer.await.unwrap();
    proxy.await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn cancel_invalidates_and_aborts() {
    let (client, _server) = connect_anonymous(Config::new("127.0.0.1")).await;
    let service = Socks5Bytestreams::new(&client);

    let (sink, _collector) = tokio::io::duplex(1024);
    let session = SiSession::new("c1", jid("b@y/r2"), jid("a@x/r1"), 10, Box::new(sink));
    service.register_session(session.clone());

    service.cancel_transfer(&session);
    assert!(!session.is_valid());

    // A cancelled session no longer matches incoming offers and a new
    // transfer cannot start on it.
    let aborted = Arc::new(AtomicU64::new(0));
    let aborted2 = aborted.clone();
    service.on_transfer_aborted(move |_| {
        aborted2.fetch_add(1, Ordering::SeqCst);
    });
    assert!(service.send(session.clone()).await.is_err());
    assert_eq!(aborted.load(Ordering::SeqCst), 1);
}
