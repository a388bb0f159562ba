//! QUIC transport for the real-time channel.
//!
//! Provides [`ConnectedClient`] which handles QUIC I/O for frame transport.
//! This is a thin layer that only moves frames; connection lifecycle logic
//! stays in the sans-IO `ConnectionManager`.
//!
//! One bidirectional stream carries the whole connection, so frames arrive in
//! the order the server wrote them.

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use bytes::BytesMut;
use quinn::{ClientConfig, Endpoint};
use roomline_proto::{Frame, FrameHeader};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tracing::{debug, warn};

/// ALPN protocol identifier. Must match the server.
pub const ALPN: &[u8] = b"roomline";

const CHANNEL_CAPACITY: usize = 32;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Stream error.
    #[error("stream error: {0}")]
    Stream(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Channel to the connection task is gone.
    #[error("connection closed")]
    Closed,
}

/// Handle to a connected client with QUIC transport.
///
/// Frames are sent and received via the channels; an internal task handles
/// the QUIC I/O. `from_server` yields `None` once the connection is gone.
#[derive(Debug)]
pub struct ConnectedClient {
    /// Send frames to the server.
    pub to_server: mpsc::Sender<Frame>,
    /// Receive frames from the server.
    pub from_server: mpsc::Receiver<Frame>,
    abort_handle: tokio::task::AbortHandle,
}

impl ConnectedClient {
    /// Queue a frame for the server.
    ///
    /// # Errors
    ///
    /// - `TransportError::Closed` if the connection task has stopped
    pub async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        self.to_server.send(frame).await.map_err(|_| TransportError::Closed)
    }

    /// Stop the connection.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

impl Drop for ConnectedClient {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}

/// Connect to a Roomline server via QUIC.
///
/// Returns a [`ConnectedClient`] with channels for frame transport.
///
/// # Errors
///
/// - `TransportError::Connection` if the address is invalid or the QUIC
///   handshake fails
/// - `TransportError::Stream` if the frame stream cannot be opened
pub async fn connect(server_addr: &str) -> Result<ConnectedClient, TransportError> {
    let addr: SocketAddr = server_addr
        .parse()
        .map_err(|e| TransportError::Connection(format!("invalid address: {e}")))?;

    let mut endpoint = Endpoint::client(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
        .map_err(|e| TransportError::Connection(format!("endpoint creation failed: {e}")))?;
    endpoint.set_default_client_config(insecure_client_config()?);

    let connection = endpoint
        .connect(addr, "localhost")
        .map_err(|e| TransportError::Connection(format!("connect failed: {e}")))?
        .await
        .map_err(|e| TransportError::Connection(format!("connection failed: {e}")))?;

    let (send, recv) = connection
        .open_bi()
        .await
        .map_err(|e| TransportError::Stream(format!("open stream failed: {e}")))?;
    debug!(%addr, "transport connected");

    let (to_server_tx, to_server_rx) = mpsc::channel::<Frame>(CHANNEL_CAPACITY);
    let (from_server_tx, from_server_rx) = mpsc::channel::<Frame>(CHANNEL_CAPACITY);

    let handle = tokio::spawn(run_connection(connection, send, recv, to_server_rx, from_server_tx));

    Ok(ConnectedClient {
        to_server: to_server_tx,
        from_server: from_server_rx,
        abort_handle: handle.abort_handle(),
    })
}

/// Run the connection, bridging between channels and the QUIC stream.
async fn run_connection(
    connection: quinn::Connection,
    mut send: quinn::SendStream,
    mut recv: quinn::RecvStream,
    mut to_server: mpsc::Receiver<Frame>,
    from_server: mpsc::Sender<Frame>,
) {
    let reader = tokio::spawn(async move {
        loop {
            match read_frame(&mut recv).await {
                Ok(Some(frame)) => {
                    if from_server.send(frame).await.is_err() {
                        break;
                    }
                },
                Ok(None) => {
                    debug!("server closed the stream");
                    break;
                },
                Err(e) => {
                    warn!(error = %e, "inbound stream failed");
                    break;
                },
            }
        }
    });

    pump_frames(&mut send, &mut to_server).await;
    connection.close(0u32.into(), b"client closed");
    reader.abort();
}

/// Write queued frames until the channel closes or a write fails, then
/// finish the stream so the server reads a clean end of stream.
async fn pump_frames<W>(writer: &mut W, to_server: &mut mpsc::Receiver<Frame>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = to_server.recv().await {
        if let Err(e) = write_frame(writer, &frame).await {
            warn!(error = %e, "send failed");
            break;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "stream finish failed");
    }
}

/// Read one frame. `Ok(None)` at end of stream.
///
/// # Errors
///
/// - `TransportError::Stream` if the read fails mid-frame
/// - `TransportError::Protocol` if the header is invalid
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::zeroed(FrameHeader::SIZE);
    match reader.read_exact(&mut buf).await {
        Ok(_) => {},
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(TransportError::Stream(format!("header read failed: {e}"))),
    }

    let header = FrameHeader::from_bytes(&buf)
        .map_err(|e| TransportError::Protocol(format!("invalid header: {e}")))?;
    let payload_size = header.payload_size() as usize;

    if payload_size > 0 {
        buf.resize(FrameHeader::SIZE + payload_size, 0);
        reader
            .read_exact(&mut buf[FrameHeader::SIZE..])
            .await
            .map_err(|e| TransportError::Stream(format!("payload read failed: {e}")))?;
    }

    Frame::decode(&buf)
        .map(Some)
        .map_err(|e| TransportError::Protocol(format!("frame decode failed: {e}")))
}

/// Write one frame.
///
/// # Errors
///
/// - `TransportError::Protocol` if the frame does not encode
/// - `TransportError::Stream` if the write fails
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(frame.encoded_len());
    frame.encode(&mut buf).map_err(|e| TransportError::Protocol(format!("encode failed: {e}")))?;

    writer
        .write_all(&buf)
        .await
        .map_err(|e| TransportError::Stream(format!("write failed: {e}")))
}

/// Client config that accepts any server certificate.
///
/// WARNING: Development only. Production should verify certificates.
fn insecure_client_config() -> Result<ClientConfig, TransportError> {
    let mut crypto = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureCertVerifier))
        .with_no_client_auth();
    crypto.alpn_protocols = vec![ALPN.to_vec()];

    let quic = quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
        .map_err(|e| TransportError::Connection(format!("invalid TLS config: {e}")))?;
    let mut config = ClientConfig::new(Arc::new(quic));

    let mut transport = quinn::TransportConfig::default();
    transport.max_idle_timeout(Duration::from_secs(30).try_into().ok());
    config.transport_config(Arc::new(transport));

    Ok(config)
}

/// Certificate verifier that accepts any certificate.
#[derive(Debug)]
struct InsecureCertVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
