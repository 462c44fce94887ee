//! TLS connector for STARTTLS and implicit-TLS sessions
//!
//! MX hosts routinely present self-signed or expired certificates, so
//! validation is off unless the strict toggle is set.

use std::sync::Arc;
use tokio_rustls::rustls::crypto::aws_lc_rs as provider;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::TlsConnector;

pub(crate) fn build_tls_connector(verify_certs: bool) -> TlsConnector {
    let provider = Arc::new(provider::default_provider());

    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(tokio_rustls::rustls::DEFAULT_VERSIONS)
        .expect("inconsistent cipher-suite/versions selected");

    let config = if verify_certs {
        config.dangerous().with_custom_certificate_verifier(Arc::new(
            rustls_platform_verifier::Verifier::new(provider)
                .expect("valid crypto provider for platform certificate verifier"),
        ))
    } else {
        config.dangerous().with_custom_certificate_verifier(Arc::new(
            danger::NoCertificateVerification::new(provider),
        ))
    };

    TlsConnector::from(Arc::new(config.with_no_client_auth()))
}

/// Server-side config with a fresh self-signed certificate, for tests that
/// accept the prober's handshake in process.
#[cfg(test)]
pub(crate) fn build_test_server_config() -> Arc<tokio_rustls::rustls::ServerConfig> {
    use tokio_rustls::rustls::pki_types::PrivatePkcs8KeyDer;

    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .expect("self-signed certificate generation");
    let cert_der = certified.cert.der().clone();
    let key_der = PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der());

    let config = tokio_rustls::rustls::ServerConfig::builder_with_provider(Arc::new(
        provider::default_provider(),
    ))
    .with_protocol_versions(tokio_rustls::rustls::DEFAULT_VERSIONS)
    .expect("inconsistent cipher-suite/versions selected")
    .with_no_client_auth()
    .with_single_cert(vec![cert_der], key_der.into())
    .expect("self-signed certificate is usable");

    Arc::new(config)
}

mod danger {
    use std::sync::Arc;
    use tokio_rustls::rustls::client::danger::{
        HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
    };
    use tokio_rustls::rustls::crypto::{
        verify_tls12_signature, verify_tls13_signature, CryptoProvider,
    };
    use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use tokio_rustls::rustls::DigitallySignedStruct;

    /// Accepts any certificate chain while still verifying handshake
    /// signatures against the negotiated scheme.
    #[derive(Debug)]
    pub struct NoCertificateVerification(Arc<CryptoProvider>);

    impl NoCertificateVerification {
        pub fn new(provider: Arc<CryptoProvider>) -> Self {
            Self(provider)
        }
    }

    impl ServerCertVerifier for NoCertificateVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, tokio_rustls::rustls::Error> {
            Ok(ServerCertVerified::assertion())
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
                &self.0.signature_verification_algorithms,
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
                &self.0.signature_verification_algorithms,
            )
        }

        fn supported_verify_schemes(&self) -> Vec<tokio_rustls::rustls::SignatureScheme> {
            self.0.signature_verification_algorithms.supported_schemes()
        }
    }
}
