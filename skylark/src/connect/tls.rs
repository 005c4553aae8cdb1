//! TLS wrapping of the wire.
//!
//! Without a configured validator the peer certificate chain is verified
//! strictly against the bundled WebPKI roots; connections to servers with
//! invalid certificates are refused. A user-supplied validator replaces
//! chain validation entirely and decides over the presented DER chain.

use core::fmt;
use std::sync::Arc;

use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::{
    ring, verify_tls12_signature, verify_tls13_signature, CryptoProvider,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;

use crate::connect::Wire;
use crate::error::Error;

/// A caller-supplied predicate over the peer certificate chain (end entity
/// first, in DER). Returning `false` aborts the handshake.
pub type CertValidator = Arc<dyn Fn(&[CertificateDer<'static>]) -> bool + Send + Sync>;

/// Perform the TLS handshake over `wire` for `domain` and return the
/// encrypted wire.
pub async fn wrap(
    wire: Wire,
    domain: &str,
    validator: Option<CertValidator>,
) -> Result<Wire, Error> {
    let config = match validator {
        None => {
            let mut root_store = RootCertStore::empty();
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth()
        }
        Some(validator) => ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(PredicateVerifier::new(validator)))
            .with_no_client_auth(),
    };
    let server_name = ServerName::try_from(domain.to_owned())?;
    let tls_stream = TlsConnector::from(Arc::new(config))
        .connect(server_name, wire)
        .await?;
    Ok(Box::new(tls_stream))
}

/// Delegates the trust decision to the user predicate while keeping the
/// handshake signature checks of the default provider.
struct PredicateVerifier {
    predicate: CertValidator,
    provider: CryptoProvider,
}

impl PredicateVerifier {
    fn new(predicate: CertValidator) -> PredicateVerifier {
        PredicateVerifier {
            predicate,
            provider: ring::default_provider(),
        }
    }
}

impl fmt::Debug for PredicateVerifier {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("PredicateVerifier").finish_non_exhaustive()
    }
}

impl ServerCertVerifier for PredicateVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        let mut chain = Vec::with_capacity(intermediates.len() + 1);
        chain.push(end_entity.clone().into_owned());
        chain.extend(intermediates.iter().map(|cert| cert.clone().into_owned()));
        if (self.predicate)(&chain) {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(tokio_rustls::rustls::Error::General(
                "certificate rejected by the configured validator".to_owned(),
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
