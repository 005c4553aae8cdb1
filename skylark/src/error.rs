//! Detailed error types.

use hickory_resolver::{
    error::ResolveError as DnsResolveError, proto::error::ProtoError as DnsProtoError,
};
use skylark_sasl::MechanismError;
use std::error::Error as StdError;
use std::fmt;
use std::io::Error as IoError;
use std::net::AddrParseError;
use tokio_rustls::rustls::pki_types::InvalidDnsNameError;
use tokio_rustls::rustls::Error as TlsError;

use crate::jid::JidParseError;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(IoError),
    /// Error parsing a Jabber-Id
    JidParse(JidParseError),
    /// Protocol-level error
    Protocol(ProtocolError),
    /// Authentication error
    Auth(AuthError),
    /// Connection closed
    Disconnected,
    /// A blocking IQ request ran out of time
    Timeout,
    /// Operation attempted in the wrong session state, e.g. sending while
    /// disconnected or configuring a timeout below -1
    InvalidState,
    /// TLS error
    Tls(TlsError),
    /// The configured hostname is not usable as a TLS server name
    DnsName(InvalidDnsNameError),
    /// DNS protocol error
    Dns(DnsProtoError),
    /// DNS resolution error
    Resolve(DnsResolveError),
    /// DNS label conversion error, no details available from module `idna`
    Idna,
    /// Invalid IP/Port address
    Addr(AddrParseError),
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(fmt, "IO error: {}", e),
            Error::JidParse(e) => write!(fmt, "jid parse error: {}", e),
            Error::Protocol(e) => write!(fmt, "protocol error: {}", e),
            Error::Auth(e) => write!(fmt, "authentication error: {}", e),
            Error::Disconnected => write!(fmt, "disconnected"),
            Error::Timeout => write!(fmt, "request timed out"),
            Error::InvalidState => write!(fmt, "invalid state"),
            Error::Tls(e) => write!(fmt, "TLS error: {}", e),
            Error::DnsName(e) => write!(fmt, "invalid TLS server name: {}", e),
            Error::Dns(e) => write!(fmt, "{:?}", e),
            Error::Resolve(e) => write!(fmt, "{:?}", e),
            Error::Idna => write!(fmt, "IDNA error"),
            Error::Addr(e) => write!(fmt, "wrong network address: {e}"),
        }
    }
}

impl StdError for Error {}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::Io(e)
    }
}

impl From<JidParseError> for Error {
    fn from(e: JidParseError) -> Self {
        Error::JidParse(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<AuthError> for Error {
    fn from(e: AuthError) -> Self {
        Error::Auth(e)
    }
}

impl From<TlsError> for Error {
    fn from(e: TlsError) -> Self {
        Error::Tls(e)
    }
}

impl From<InvalidDnsNameError> for Error {
    fn from(e: InvalidDnsNameError) -> Self {
        Error::DnsName(e)
    }
}

impl From<idna::Errors> for Error {
    fn from(_e: idna::Errors) -> Self {
        Error::Idna
    }
}

impl From<DnsResolveError> for Error {
    fn from(e: DnsResolveError) -> Error {
        Error::Resolve(e)
    }
}

impl From<DnsProtoError> for Error {
    fn from(e: DnsProtoError) -> Error {
        Error::Dns(e)
    }
}

impl From<AddrParseError> for Error {
    fn from(e: AddrParseError) -> Error {
        Error::Addr(e)
    }
}

impl From<minidom::Error> for Error {
    fn from(e: minidom::Error) -> Self {
        ProtocolError::Parser(e).into()
    }
}

/// XMPP protocol-level error
#[derive(Debug)]
pub enum ProtocolError {
    /// XML parser error
    Parser(minidom::Error),
    /// Encountered unparseable XML tokens in the stream
    InvalidToken(quick_xml::Error),
    /// An element arrived whose name is not acceptable in the current phase
    UnexpectedElement(String),
    /// A stanza was structurally invalid (missing or malformed attributes)
    InvalidStanza(&'static str),
    /// Invalid response to resource binding
    InvalidBindResponse,
    /// No xmlns attribute in `<stream:stream>`
    NoStreamNamespace,
    /// Unexpected `<stream:stream>` mid-stream
    InvalidStreamStart,
    /// STARTTLS was requested but the server did not proceed
    NoTls,
    /// The SASL mechanism was not finished when `<success/>` arrived
    PrematureSaslSuccess,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProtocolError::Parser(e) => write!(fmt, "XML parser error: {}", e),
            ProtocolError::InvalidToken(e) => write!(fmt, "invalid XML token: {}", e),
            ProtocolError::UnexpectedElement(name) => {
                write!(fmt, "unexpected element <{}>", name)
            }
            ProtocolError::InvalidStanza(what) => write!(fmt, "invalid stanza: {}", what),
            ProtocolError::InvalidBindResponse => {
                write!(fmt, "invalid response to resource binding")
            }
            ProtocolError::NoStreamNamespace => {
                write!(fmt, "no xmlns attribute in <stream:stream>")
            }
            ProtocolError::InvalidStreamStart => write!(fmt, "unexpected <stream:stream>"),
            ProtocolError::NoTls => write!(fmt, "server refused to proceed with TLS"),
            ProtocolError::PrematureSaslSuccess => {
                write!(fmt, "SASL success before the mechanism completed")
            }
        }
    }
}

impl StdError for ProtocolError {}

impl From<minidom::Error> for ProtocolError {
    fn from(e: minidom::Error) -> Self {
        ProtocolError::Parser(e)
    }
}

/// Authentication error
#[derive(Debug)]
pub enum AuthError {
    /// No matching SASL mechanism available
    NoMechanism,
    /// Local SASL implementation error
    Sasl(MechanismError),
    /// Failure reported by the server, with its defined condition
    Fail(String),
    /// The server requires TLS but the configuration disables it
    TlsRequired,
}

impl StdError for AuthError {}

impl fmt::Display for AuthError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AuthError::NoMechanism => write!(fmt, "no matching SASL mechanism available"),
            AuthError::Sasl(s) => write!(fmt, "local SASL implementation error: {}", s),
            AuthError::Fail(c) => write!(fmt, "failure from the server: {}", c),
            AuthError::TlsRequired => write!(fmt, "server requires TLS"),
        }
    }
}

impl From<MechanismError> for AuthError {
    fn from(e: MechanismError) -> Self {
        AuthError::Sasl(e)
    }
}
