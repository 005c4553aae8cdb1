//! The handshake ladder: TCP, TLS, SASL, resource binding.

use log::debug;
use minidom::Element;
use skylark_sasl::{choose_mechanism, Credentials, Mechanism};

use crate::config::{Config, TlsMode};
use crate::connect::{tls, Tcp, Wire};
use crate::error::{AuthError, Error, ProtocolError};
use crate::jid::Jid;
use crate::ns;
use crate::proto::XmppStream;
use crate::stanza::bind::{BindQuery, BindResponse};
use crate::stanza::sasl::{Auth, Challenge, Failure, Response, Success};
use crate::stanza::{Iq, IqType};

/// The fixed id of the resource-binding request.
const BIND_REQ_ID: &str = "bind-0";

/// Outcome of a successful handshake.
pub(crate) struct Established {
    pub(crate) stream: XmppStream,
    pub(crate) jid: Jid,
}

/// Run the whole ladder against `host:port`. On any error the connection
/// is simply dropped; no partial session leaks out.
pub(crate) async fn establish(
    config: &Config,
    host: &str,
    port: u16,
) -> Result<Established, Error> {
    debug!("connecting to {}:{}", host, port);
    let tcp = Tcp::connect(host, port).await?;
    let mut wire: Wire = Box::new(tcp);

    if config.tls == TlsMode::Direct {
        wire = tls::wrap(wire, &config.hostname, config.certificate_validator.clone()).await?;
    }

    let mut stream =
        XmppStream::start(wire, &config.hostname, &config.lang, config.debug_stanzas).await?;

    if let Some(starttls) = stream.features.starttls {
        match config.tls {
            TlsMode::StartTls => {
                stream
                    .send_element(Element::builder("starttls", ns::TLS).build())
                    .await?;
                let reply = stream.read_element(&["proceed", "failure"]).await?;
                if !reply.is("proceed", ns::TLS) {
                    return Err(ProtocolError::NoTls.into());
                }
                let wire = tls::wrap(
                    stream.into_inner(),
                    &config.hostname,
                    config.certificate_validator.clone(),
                )
                .await?;
                stream =
                    XmppStream::start(wire, &config.hostname, &config.lang, config.debug_stanzas)
                        .await?;
            }
            TlsMode::None if starttls.required => {
                return Err(AuthError::TlsRequired.into());
            }
            TlsMode::None | TlsMode::Direct => {}
        }
    }

    let username = match &config.username {
        Some(username) => username.clone(),
        // Anonymous / deferred-auth mode: the handshake stops here.
        None => {
            let jid = Jid::from_domain(config.hostname.clone());
            return Ok(Established { stream, jid });
        }
    };
    let password = config.password.clone().unwrap_or_default();

    let creds = Credentials::new(username.clone(), password);
    let mechanism =
        choose_mechanism(&stream.features.mechanisms, creds).ok_or(AuthError::NoMechanism)?;
    debug!("authenticating via {}", mechanism.name());
    sasl(&mut stream, mechanism).await?;

    // Authentication restarts the stream.
    let mut stream = stream.restart().await?;

    let jid = if stream.features.can_bind() {
        bind(&mut stream, config.resource.clone()).await?
    } else {
        Jid::from_parts(Some(&username), &config.hostname, None)?
    };
    debug!("session established as {}", jid);
    Ok(Established { stream, jid })
}

/// Drive one SASL mechanism to completion over the stream.
async fn sasl(stream: &mut XmppStream, mut mechanism: Box<dyn Mechanism>) -> Result<(), Error> {
    let data = if mechanism.has_initial_response() {
        mechanism.initial()
    } else {
        Vec::new()
    };
    stream
        .send_element(
            Auth {
                mechanism: mechanism.name().to_owned(),
                data,
            }
            .into(),
        )
        .await?;

    loop {
        let elem = stream
            .read_element(&["challenge", "success", "failure"])
            .await?;
        if elem.is("challenge", ns::SASL) {
            let challenge = Challenge::try_from(elem)?;
            let data = mechanism
                .response(&challenge.data)
                .map_err(AuthError::from)?;
            stream.send_element(Response { data }.into()).await?;
        } else if elem.is("success", ns::SASL) {
            let success = Success::try_from(elem)?;
            mechanism.success(&success.data).map_err(AuthError::from)?;
            if !mechanism.is_complete() {
                return Err(ProtocolError::PrematureSaslSuccess.into());
            }
            return Ok(());
        } else {
            let failure = Failure::try_from(elem)?;
            return Err(AuthError::Fail(failure.condition).into());
        }
    }
}

/// Bind a resource and return the full JID picked by the server.
async fn bind(stream: &mut XmppStream, resource: Option<String>) -> Result<Jid, Error> {
    let iq = Iq::from_set(BIND_REQ_ID, BindQuery::new(resource).into());
    stream.send_element(iq.into()).await?;

    loop {
        let elem = stream.read_element(&["iq"]).await?;
        let iq = Iq::try_from(elem).map_err(Error::Protocol)?;
        if iq.id != BIND_REQ_ID {
            // Not ours; servers should not send anything else this early.
            continue;
        }
        return match iq.payload {
            IqType::Result(Some(payload)) => {
                let response = BindResponse::try_from(payload)
                    .map_err(|_| ProtocolError::InvalidBindResponse)?;
                Ok(response.into())
            }
            _ => Err(ProtocolError::InvalidBindResponse.into()),
        };
    }
}
