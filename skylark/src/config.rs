//! Connection configuration.

use core::fmt;

use crate::connect::tls::CertValidator;
use crate::jid::Jid;

/// How the connection gets its TLS layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// Plaintext only. Refused by servers that mandate TLS.
    None,
    /// Plaintext TCP upgraded in-stream via STARTTLS.
    #[default]
    StartTls,
    /// TLS immediately after the TCP connect ("direct TLS").
    Direct,
}

/// Everything a [`Client`][crate::Client] needs to know up front.
#[derive(Clone)]
pub struct Config {
    /// The peer domain; also the default SRV lookup target.
    pub hostname: String,
    /// Fallback port when no SRV records exist.
    pub port: u16,
    /// Account name. Without it the handshake stops before SASL.
    pub username: Option<String>,
    /// Account password.
    pub password: Option<String>,
    /// Preferred resource; the server may override it at bind time.
    pub resource: Option<String>,
    /// TLS layering mode.
    pub tls: TlsMode,
    /// Custom certificate chain validator. Absent means strict WebPKI
    /// validation; invalid certificates are refused by default.
    pub certificate_validator: Option<CertValidator>,
    /// Default timeout for blocking IQ requests in milliseconds;
    /// `-1` waits forever. Values below `-1` are rejected at call time.
    pub default_iq_timeout_ms: i64,
    /// Log raw stanza text at debug level.
    pub debug_stanzas: bool,
    /// `xml:lang` sent on our stream header.
    pub lang: String,

    /// Whether mediated (proxied) bytestream transfers may be used at all.
    pub proxy_allowed: bool,
    /// Proxies to prefer over the ones discovered on the server.
    pub user_proxies: Vec<Jid>,
    /// Lowest local port the direct-transfer listener may bind.
    pub server_port_from: u16,
    /// Highest local port the direct-transfer listener may bind.
    pub server_port_to: u16,
    /// STUN server used to learn our external addresses.
    pub stun_server: Option<(String, u16)>,
    /// Ask an injected UPnP probe for port mappings. Off by default; this
    /// crate ships no UPnP implementation.
    pub use_upnp: bool,
}

impl Config {
    /// A configuration with the defaults of RFC 6120 clients: port 5222,
    /// STARTTLS, strict certificate validation, 30s IQ timeout.
    pub fn new<H: Into<String>>(hostname: H) -> Config {
        Config {
            hostname: hostname.into(),
            port: 5222,
            username: None,
            password: None,
            resource: None,
            tls: TlsMode::default(),
            certificate_validator: None,
            default_iq_timeout_ms: 30_000,
            debug_stanzas: false,
            lang: "en".to_owned(),
            proxy_allowed: true,
            user_proxies: Vec::new(),
            server_port_from: 52000,
            server_port_to: 52100,
            stun_server: None,
            use_upnp: false,
        }
    }

    /// Set the account credentials.
    pub fn with_credentials<U: Into<String>, P: Into<String>>(
        mut self,
        username: U,
        password: P,
    ) -> Config {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the preferred resource.
    pub fn with_resource<R: Into<String>>(mut self, resource: R) -> Config {
        self.resource = Some(resource.into());
        self
    }

    /// Set the TLS mode.
    pub fn with_tls(mut self, tls: TlsMode) -> Config {
        self.tls = tls;
        self
    }

    /// Set the fallback port.
    pub fn with_port(mut self, port: u16) -> Config {
        self.port = port;
        self
    }

    /// Install a certificate validator replacing WebPKI validation.
    pub fn with_certificate_validator(mut self, validator: CertValidator) -> Config {
        self.certificate_validator = Some(validator);
        self
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Config")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("resource", &self.resource)
            .field("tls", &self.tls)
            .field(
                "certificate_validator",
                &self.certificate_validator.as_ref().map(|_| "<fn>"),
            )
            .field("default_iq_timeout_ms", &self.default_iq_timeout_ms)
            .field("debug_stanzas", &self.debug_stanzas)
            .field("lang", &self.lang)
            .field("proxy_allowed", &self.proxy_allowed)
            .field("user_proxies", &self.user_proxies)
            .field("server_port_from", &self.server_port_from)
            .field("server_port_to", &self.server_port_to)
            .field("stun_server", &self.stun_server)
            .field("use_upnp", &self.use_upnp)
            .finish()
    }
}
