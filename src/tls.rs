//! TLS context factory (spec.md §4.F).
//!
//! Grounded in `rama-tls-rustls`'s dependency set: `rustls` +
//! `rustls-native-certs` + `webpki-roots`, the same combination the wider
//! ecosystem reaches for to get a client config with a real root store
//! without pulling in OpenSSL.

use std::sync::Arc;

use rustls::{ClientConfig, RootCertStore};

/// ALPN protocol id this crate requires the peer to select.
pub const ALPN_H2: &[u8] = b"h2";

/// Builds the crate's default TLS client configuration: the platform's
/// native root store (falling back to the bundled Mozilla roots if none can
/// be loaded), TLS 1.2 as the floor (TLS 1.0/1.1 disabled), and ALPN `h2`
/// advertised.
///
/// Callers needing a pinned CA, a client certificate, or test fixtures can
/// build their own `rustls::ClientConfig` and pass it to
/// [`crate::Connection::create`] instead; `create` verifies ALPN `h2` is
/// negotiated regardless of who built the config (spec.md §4.E).
pub fn default_tls_config() -> Arc<ClientConfig> {
    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    if native.certs.is_empty() {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    } else {
        for cert in native.certs {
            // Skip certs the platform store can't parse rather than failing
            // construction outright; a handful of malformed entries are a
            // known quirk of some native stores.
            let _ = roots.add(cert);
        }
    }

    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    config.alpn_protocols = vec![ALPN_H2.to_vec()];
    Arc::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_advertises_h2_alpn() {
        let cfg = default_tls_config();
        assert_eq!(cfg.alpn_protocols, vec![ALPN_H2.to_vec()]);
    }
}
