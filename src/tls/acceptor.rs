//! TLS acceptor creation from in-memory PEM material

use std::pin::Pin;

use log::debug;
use openssl::pkey::PKey;
use openssl::ssl::{Ssl, SslAcceptor, SslMethod};
use openssl::x509::X509;
use tokio::net::TcpStream;
use tokio_openssl::SslStream;

use crate::common::{ProxyError, Result};

/// Create a TLS acceptor from a PEM certificate chain and private key
///
/// The first certificate of `cert_pem` is the leaf; any following ones are
/// sent as the chain.
///
/// # Example
///
/// ```no_run
/// # use caldera::tls::create_tls_acceptor;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let cert = std::fs::read("server.crt")?;
/// let key = std::fs::read("server.key")?;
/// let acceptor = create_tls_acceptor(&cert, &key)?;
/// # Ok(())
/// # }
/// ```
pub fn create_tls_acceptor(cert_pem: &[u8], key_pem: &[u8]) -> Result<SslAcceptor> {
    let mut chain = X509::stack_from_pem(cert_pem)?.into_iter();
    let leaf = chain
        .next()
        .ok_or_else(|| ProxyError::Config("certificate file contains no certificate".to_string()))?;
    let key = PKey::private_key_from_pem(key_pem)?;

    let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls())?;
    acceptor.set_certificate(&leaf)?;
    for cert in chain {
        acceptor.add_extra_chain_cert(cert)?;
    }
    acceptor.set_private_key(&key)?;
    acceptor.check_private_key()?;

    Ok(acceptor.build())
}

/// Run the server side of the TLS handshake on an accepted socket
pub async fn accept_tls(acceptor: &SslAcceptor, stream: TcpStream) -> Result<SslStream<TcpStream>> {
    let ssl = Ssl::new(acceptor.context())?;
    let mut stream = SslStream::new(ssl, stream)?;

    if let Err(e) = Pin::new(&mut stream).accept().await {
        // Peers vanishing mid-handshake surface as plain I/O errors
        return Err(match e.into_io_error() {
            Ok(io) => ProxyError::Io(io),
            Err(e) => ProxyError::TlsHandshake(e.to_string()),
        });
    }

    debug!("TLS handshake successful");
    Ok(stream)
}
