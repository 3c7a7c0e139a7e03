//! TLS client configuration.
//!
//! By default connections verify servers against the webpki root
//! certificates. An outcall can opt in to trusting self-signed servers
//! instead, which is decided by [`trusts_self_signed`].

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{
    CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
};

/// The side of a TLS handshake whose certificate chain is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peer {
    /// A client presenting a certificate to a server.
    Client,
    /// A server presenting a certificate to a client.
    Server,
}

/// The self-signed trust policy.
///
/// Client chains are never trusted. A server chain is trusted when it consists
/// of exactly one certificate. Whether that certificate is actually signed by
/// itself is not checked, only that no chain was supplied.
pub fn trusts_self_signed(peer: Peer, chain_len: usize) -> bool {
    match peer {
        Peer::Client => false,
        Peer::Server => chain_len == 1,
    }
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Client config verifying servers against the webpki roots.
pub(crate) fn webpki_config() -> Result<Arc<ClientConfig>, rustls::Error> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(Arc::new(config))
}

/// Client config trusting self-signed servers only.
pub(crate) fn self_signed_config() -> Result<Arc<ClientConfig>, rustls::Error> {
    let provider = provider();
    let verifier = SelfSignedVerifier {
        provider: provider.clone(),
    };

    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();

    Ok(Arc::new(config))
}

#[derive(Debug)]
struct SelfSignedVerifier {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for SelfSignedVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let chain_len = 1 + intermediates.len();

        if trusts_self_signed(Peer::Server, chain_len) {
            Ok(ServerCertVerified::assertion())
        } else {
            debug!("Reject server chain of {} certificates", chain_len);
            Err(rustls::Error::InvalidCertificate(
                CertificateError::UnknownIssuer,
            ))
        }
    }

    // The handshake signatures are still checked, only the chain is relaxed.
    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
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
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_never_trusts_clients() {
        for len in 0..4 {
            assert!(!trusts_self_signed(Peer::Client, len));
        }
    }

    #[test]
    fn policy_trusts_single_server_certificate() {
        assert!(!trusts_self_signed(Peer::Server, 0));
        assert!(trusts_self_signed(Peer::Server, 1));
        assert!(!trusts_self_signed(Peer::Server, 2));
        assert!(!trusts_self_signed(Peer::Server, 3));
    }

    #[test]
    fn configs_build() {
        assert!(webpki_config().is_ok());
        assert!(self_signed_config().is_ok());
    }

    #[test]
    fn verifier_checks_chain_length() {
        let verifier = SelfSignedVerifier {
            provider: provider(),
        };
        let leaf = CertificateDer::from(vec![1, 2, 3]);
        let intermediate = CertificateDer::from(vec![4, 5, 6]);
        let name = ServerName::try_from("localhost").unwrap();

        let alone = verifier.verify_server_cert(&leaf, &[], &name, &[], UnixTime::now());
        assert!(alone.is_ok());

        let chained =
            verifier.verify_server_cert(&leaf, &[intermediate], &name, &[], UnixTime::now());
        assert!(matches!(
            chained,
            Err(rustls::Error::InvalidCertificate(
                CertificateError::UnknownIssuer
            ))
        ));
    }

    #[test]
    fn verifier_supports_schemes() {
        let verifier = SelfSignedVerifier {
            provider: provider(),
        };
        assert!(!verifier.supported_verify_schemes().is_empty());
    }
}
