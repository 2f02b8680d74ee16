//! Secure channel client
//!
//! [`SecureClient::negotiate`] runs the handshake and publishes a new
//! [`SecureSession`]; [`SecureClient::send_secure`] encrypts a request body
//! under the session key and decrypts the response with a key pair minted
//! for that request alone.

use std::sync::Arc;

use channel_crypto::{CryptoError, Envelope, KeyPair};
use channel_protocol::{
    CLIENT_PUBLIC_KEY_HEADER, HandshakePayload, SERVER_PUBLIC_KEY_HEADER, decode_body,
};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::{
    ChannelError, ChannelResult, ClientConfig, HttpRequest, HttpResponse, HttpTransport,
    ReqwestTransport, SecureSession, SessionCell,
};

/// Client side of the ephemeral secure channel
pub struct SecureClient<T> {
    transport: T,
    config: ClientConfig,
    session: SessionCell,
}

impl SecureClient<ReqwestTransport> {
    /// Create a reqwest-backed client and complete the first handshake
    pub async fn connect_http(config: ClientConfig) -> ChannelResult<Self> {
        let transport = ReqwestTransport::from_config(&config)?;
        Self::connect(transport, config).await
    }
}

impl<T: HttpTransport> SecureClient<T> {
    /// Create a client with no session yet
    pub fn new(transport: T, config: ClientConfig) -> ChannelResult<Self> {
        config.validate()?;
        let session = SessionCell::new(config.handshake_endpoint.clone());

        Ok(Self {
            transport,
            config,
            session,
        })
    }

    /// Create a client and complete the first handshake
    pub async fn connect(transport: T, config: ClientConfig) -> ChannelResult<Self> {
        let client = Self::new(transport, config)?;
        client.negotiate().await?;
        Ok(client)
    }

    /// Current session snapshot
    pub fn session(&self) -> Arc<SecureSession> {
        self.session.snapshot()
    }

    pub fn is_established(&self) -> bool {
        self.session.is_established()
    }

    /// Run the handshake and replace the session
    ///
    /// Concurrent calls run one after another. The session is only touched
    /// after every check has passed, so a failed or abandoned handshake
    /// leaves the previous session in place.
    pub async fn negotiate(&self) -> ChannelResult<Arc<SecureSession>> {
        let _refresh = self.session.lock_refresh().await;
        let endpoint = self.config.handshake_endpoint.as_str();

        let keypair = generate_keypair(self.config.key_bits).await?;
        let request = HttpRequest::get(endpoint).with_header(
            CLIENT_PUBLIC_KEY_HEADER,
            keypair.encode_public_key(self.config.key_format)?,
        );

        debug!(endpoint, "Sending handshake");
        let response = self.transport.send(request).await?;
        ensure_success(&response)?;

        let server_public_key = response
            .header(SERVER_PUBLIC_KEY_HEADER)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                warn!(endpoint, "Handshake response without server public key");
                ChannelError::MissingServerKey
            })?
            .to_string();

        let ciphertext = decode_body(&response.body)?;
        let plaintext = Zeroizing::new(
            keypair
                .decrypt(&ciphertext)
                .map_err(|_| ChannelError::HandshakeDecryptionFailed)?,
        );
        drop(keypair);

        let secret = HandshakePayload::from_json(&plaintext)
            .map_err(ChannelError::MalformedPayload)?
            .into_secret()
            .ok_or(ChannelError::MissingSecret)?;

        let session = Arc::new(SecureSession::new(secret, server_public_key, endpoint));
        self.session.replace(session.clone());

        info!(endpoint, "Secure session established");
        Ok(session)
    }

    /// Same as [`Self::negotiate`]; replaces the secret and server key
    pub async fn refresh(&self) -> ChannelResult<Arc<SecureSession>> {
        self.negotiate().await
    }

    /// POST `plaintext` to `uri` and return the decrypted response
    pub async fn send_secure(&self, uri: &str, plaintext: &str) -> ChannelResult<String> {
        let session = self.session.snapshot();
        if !session.is_established() {
            return Err(ChannelError::SessionNotEstablished);
        }

        let body = session.seal(plaintext.as_bytes())?.to_body();
        drop(session);

        let keypair = generate_keypair(self.config.key_bits).await?;
        let request = HttpRequest::post(uri, body).with_header(
            CLIENT_PUBLIC_KEY_HEADER,
            keypair.encode_public_key(self.config.key_format)?,
        );

        debug!(uri, "Sending secure request");
        let response = self.transport.send(request).await?;
        ensure_success(&response)?;

        let ciphertext = decode_body(&response.body)?;
        let decrypted = keypair
            .decrypt(&ciphertext)
            .map_err(|_| ChannelError::SecureResponseDecryptionFailed)?;
        drop(keypair);

        String::from_utf8(decrypted).map_err(|_| ChannelError::InvalidUtf8)
    }

    /// Decrypt a body that was encrypted under the current session key
    pub fn open_envelope(&self, body: &str) -> ChannelResult<Vec<u8>> {
        let session = self.session.snapshot();
        if !session.is_established() {
            return Err(ChannelError::SessionNotEstablished);
        }
        session.open(&Envelope::from_body(body)?)
    }
}

/// Generate a key pair on the blocking pool, off the async workers
async fn generate_keypair(bits: usize) -> ChannelResult<KeyPair> {
    let keypair = tokio::task::spawn_blocking(move || KeyPair::generate_with_bits(bits))
        .await
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))??;
    Ok(keypair)
}

fn ensure_success(response: &HttpResponse) -> ChannelResult<()> {
    if response.is_success() {
        Ok(())
    } else {
        warn!(status = response.status, "Channel request rejected");
        Err(ChannelError::UnexpectedStatus(response.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Method, TransportResult};
    use async_trait::async_trait;
    use channel_crypto::{ChannelResponder, PublicKey, SymmetricKey};
    use channel_protocol::{PublicKeyFormat, encode_body};
    use parking_lot::{Mutex, RwLock};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    const ENDPOINT: &str = "http://server.test/handshake";
    const ECHO: &str = "http://server.test/echo";

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Behavior {
        Normal,
        NoServerKey,
        NoSecret,
        ArrayPayload,
        WrongHandshakeKey,
        WrongResponseKey,
        Status(u16),
    }

    /// In-process server answering with a [`ChannelResponder`]
    struct MockServer {
        responder: RwLock<Arc<ChannelResponder>>,
        behavior: Mutex<Behavior>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl MockServer {
        fn new(secret: &str) -> Arc<Self> {
            Arc::new(Self {
                responder: RwLock::new(Arc::new(
                    ChannelResponder::new(secret, PublicKeyFormat::Xml).unwrap(),
                )),
                behavior: Mutex::new(Behavior::Normal),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn set_behavior(&self, behavior: Behavior) {
            *self.behavior.lock() = behavior;
        }

        fn rotate(&self, secret: &str) {
            *self.responder.write() =
                Arc::new(ChannelResponder::new(secret, PublicKeyFormat::Xml).unwrap());
        }

        fn server_key(&self) -> String {
            self.responder.read().server_public_key().to_string()
        }

        fn request_count(&self) -> usize {
            self.requests.lock().len()
        }

        fn client_keys(&self) -> Vec<String> {
            self.requests
                .lock()
                .iter()
                .filter_map(|r| r.header(CLIENT_PUBLIC_KEY_HEADER).map(str::to_string))
                .collect()
        }

        fn handle(&self, request: &HttpRequest) -> Result<HttpResponse, CryptoError> {
            let behavior = *self.behavior.lock();
            if let Behavior::Status(status) = behavior {
                return Ok(HttpResponse::new(status, "rejected"));
            }

            let responder = self.responder.read().clone();
            let client_key = request.header(CLIENT_PUBLIC_KEY_HEADER).unwrap_or_default();

            match request.method {
                Method::Get => {
                    let body = if behavior == Behavior::NoSecret {
                        encode_body(&PublicKey::decode(client_key)?.encrypt(b"{\"other\":1}")?)
                    } else if behavior == Behavior::ArrayPayload {
                        encode_body(&PublicKey::decode(client_key)?.encrypt(br#"["pw"]"#)?)
                    } else if behavior == Behavior::WrongHandshakeKey {
                        let stranger = KeyPair::generate()?;
                        responder.answer_handshake(
                            &stranger.encode_public_key(PublicKeyFormat::SpkiDer)?,
                        )?
                    } else {
                        responder.answer_handshake(client_key)?
                    };
                    let response = HttpResponse::new(200, body);
                    if behavior == Behavior::NoServerKey {
                        Ok(response)
                    } else {
                        Ok(response
                            .with_header(SERVER_PUBLIC_KEY_HEADER, responder.server_public_key()))
                    }
                }
                Method::Post => {
                    let plaintext = responder.open_request(request.body.as_deref().unwrap_or(""))?;
                    let reply = format!("echo:{}", String::from_utf8_lossy(&plaintext));
                    let body = if behavior == Behavior::WrongResponseKey {
                        let stranger = KeyPair::generate()?;
                        encode_body(&stranger.public_key().encrypt(reply.as_bytes())?)
                    } else {
                        responder.seal_response(client_key, reply.as_bytes())?
                    };
                    Ok(HttpResponse::new(200, body))
                }
            }
        }
    }

    #[async_trait]
    impl HttpTransport for MockServer {
        async fn send(&self, request: HttpRequest) -> TransportResult<HttpResponse> {
            self.requests.lock().push(request.clone());
            Ok(self
                .handle(&request)
                .unwrap_or_else(|e| HttpResponse::new(400, e.to_string())))
        }
    }

    fn client(server: &Arc<MockServer>) -> SecureClient<Arc<MockServer>> {
        SecureClient::new(server.clone(), ClientConfig::new(ENDPOINT)).unwrap()
    }

    /// Forwards to a [`MockServer`], parking each request while `hold` is set
    struct GatedTransport {
        server: Arc<MockServer>,
        hold: AtomicBool,
        entered: Notify,
        release: Notify,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl GatedTransport {
        fn new(server: Arc<MockServer>) -> Arc<Self> {
            Arc::new(Self {
                server,
                hold: AtomicBool::new(false),
                entered: Notify::new(),
                release: Notify::new(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }

        fn hold(&self, hold: bool) {
            self.hold.store(hold, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl HttpTransport for GatedTransport {
        async fn send(&self, request: HttpRequest) -> TransportResult<HttpResponse> {
            let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

            if self.hold.load(Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }

            let response = self.server.send(request).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            response
        }
    }

    fn gated_client(gate: &Arc<GatedTransport>) -> Arc<SecureClient<Arc<GatedTransport>>> {
        Arc::new(SecureClient::new(gate.clone(), ClientConfig::new(ENDPOINT)).unwrap())
    }

    #[tokio::test]
    async fn test_negotiate_establishes_session() {
        let server = MockServer::new("password");
        let client = client(&server);
        assert!(!client.is_established());

        let session = client.negotiate().await.unwrap();
        assert_eq!(session.secret(), "password");
        assert_eq!(session.server_public_key(), server.server_key());
        assert_eq!(session.endpoint(), ENDPOINT);
        assert!(client.is_established());

        let requests = server.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Get);
        assert_eq!(requests[0].uri, ENDPOINT);
        assert!(
            requests[0]
                .header(CLIENT_PUBLIC_KEY_HEADER)
                .unwrap()
                .starts_with("<RSAKeyValue>")
        );
    }

    #[tokio::test]
    async fn test_missing_server_key_keeps_previous_session() {
        let server = MockServer::new("password");
        let client = client(&server);
        client.negotiate().await.unwrap();

        server.rotate("rotated");
        server.set_behavior(Behavior::NoServerKey);
        let err = client.refresh().await.unwrap_err();

        assert!(matches!(err, ChannelError::MissingServerKey));
        assert_eq!(client.session().secret(), "password");
    }

    #[tokio::test]
    async fn test_missing_server_key_on_first_handshake() {
        let server = MockServer::new("password");
        server.set_behavior(Behavior::NoServerKey);
        let client = client(&server);

        assert!(matches!(
            client.negotiate().await,
            Err(ChannelError::MissingServerKey)
        ));
        assert!(!client.is_established());
    }

    #[tokio::test]
    async fn test_missing_secret_keeps_previous_session() {
        let server = MockServer::new("password");
        let client = client(&server);
        let before = client.negotiate().await.unwrap();

        server.rotate("rotated");
        server.set_behavior(Behavior::NoSecret);
        let err = client.refresh().await.unwrap_err();

        assert!(matches!(err, ChannelError::MissingSecret));
        let after = client.session();
        assert_eq!(after.secret(), "password");
        assert_eq!(after.server_public_key(), before.server_public_key());
    }

    #[tokio::test]
    async fn test_array_payload_is_malformed() {
        let server = MockServer::new("password");
        let client = client(&server);
        client.negotiate().await.unwrap();

        server.set_behavior(Behavior::ArrayPayload);
        assert!(matches!(
            client.refresh().await,
            Err(ChannelError::MalformedPayload(_))
        ));
        assert_eq!(client.session().secret(), "password");
    }

    #[tokio::test]
    async fn test_handshake_sealed_to_another_key() {
        let server = MockServer::new("password");
        server.set_behavior(Behavior::WrongHandshakeKey);
        let client = client(&server);

        assert!(matches!(
            client.negotiate().await,
            Err(ChannelError::HandshakeDecryptionFailed)
        ));
        assert!(!client.is_established());
    }

    #[tokio::test]
    async fn test_send_before_handshake_makes_no_calls() {
        let server = MockServer::new("password");
        let client = client(&server);

        let err = client.send_secure(ECHO, "hello").await.unwrap_err();
        assert!(matches!(err, ChannelError::SessionNotEstablished));
        assert_eq!(server.request_count(), 0);
    }

    #[tokio::test]
    async fn test_send_secure_round_trip() {
        let server = MockServer::new("password");
        let client = SecureClient::connect(server.clone(), ClientConfig::new(ENDPOINT))
            .await
            .unwrap();

        let reply = client.send_secure(ECHO, "hello").await.unwrap();
        assert_eq!(reply, "echo:hello");

        let requests = server.requests.lock();
        let post = &requests[1];
        assert_eq!(post.method, Method::Post);
        assert_eq!(post.uri, ECHO);

        // Body is an envelope under SHA-256("password")
        let envelope = Envelope::from_body(post.body.as_deref().unwrap()).unwrap();
        assert_eq!(
            envelope.open(&SymmetricKey::derive("password")).unwrap(),
            b"hello"
        );
    }

    #[tokio::test]
    async fn test_each_request_uses_fresh_key_pair() {
        let server = MockServer::new("password");
        let client = client(&server);
        client.negotiate().await.unwrap();

        let key_before = client.session().symmetric_key();
        client.send_secure(ECHO, "one").await.unwrap();
        client.send_secure(ECHO, "two").await.unwrap();
        let key_after = client.session().symmetric_key();

        let keys = server.client_keys();
        assert_eq!(keys.len(), 3);
        assert_ne!(keys[0], keys[1]);
        assert_ne!(keys[1], keys[2]);
        assert_ne!(keys[0], keys[2]);
        assert_eq!(key_before, key_after);
    }

    #[tokio::test]
    async fn test_response_for_another_key_fails() {
        let server = MockServer::new("password");
        let client = client(&server);
        client.negotiate().await.unwrap();

        server.set_behavior(Behavior::WrongResponseKey);
        assert!(matches!(
            client.send_secure(ECHO, "hello").await,
            Err(ChannelError::SecureResponseDecryptionFailed)
        ));
    }

    #[tokio::test]
    async fn test_refresh_replaces_secret_and_server_key_together() {
        let server = MockServer::new("password");
        let client = client(&server);
        let first = client.negotiate().await.unwrap();

        server.rotate("rotated");
        let second = client.refresh().await.unwrap();

        assert_eq!(second.secret(), "rotated");
        assert_ne!(second.server_public_key(), first.server_public_key());
        assert_eq!(second.server_public_key(), server.server_key());

        // Old snapshot is untouched
        assert_eq!(first.secret(), "password");
        assert_eq!(client.send_secure(ECHO, "after").await.unwrap(), "echo:after");
    }

    #[tokio::test]
    async fn test_abandoned_refresh_keeps_previous_session() {
        let server = MockServer::new("password");
        let gate = GatedTransport::new(server.clone());
        let client = gated_client(&gate);
        let before = client.negotiate().await.unwrap();

        server.rotate("rotated");
        gate.hold(true);
        let task = tokio::spawn({
            let client = client.clone();
            async move { client.refresh().await }
        });

        // Drop the refresh while its handshake is on the wire
        gate.entered.notified().await;
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        let after = client.session();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.secret(), "password");
        assert_eq!(after.server_public_key(), before.server_public_key());

        // The refresh lock was released with the dropped future
        gate.hold(false);
        let refreshed = client.refresh().await.unwrap();
        assert_eq!(refreshed.secret(), "rotated");
        assert_eq!(refreshed.server_public_key(), server.server_key());
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_run_one_at_a_time() {
        let server = MockServer::new("first");
        let gate = GatedTransport::new(server.clone());
        gate.hold(true);
        let client = gated_client(&gate);

        let refresh = |client: &Arc<SecureClient<Arc<GatedTransport>>>| {
            let client = client.clone();
            tokio::spawn(async move { client.refresh().await })
        };

        let first = refresh(&client);
        gate.entered.notified().await;

        // The second refresh waits for the first to finish
        let second = refresh(&client);
        assert!(
            tokio::time::timeout(Duration::from_millis(200), gate.entered.notified())
                .await
                .is_err()
        );
        assert_eq!(gate.in_flight.load(Ordering::SeqCst), 1);

        gate.release.notify_one();
        assert_eq!(first.await.unwrap().unwrap().secret(), "first");

        server.rotate("second");
        gate.entered.notified().await;
        gate.release.notify_one();
        let second = second.await.unwrap().unwrap();

        assert_eq!(second.secret(), "second");
        assert_eq!(second.server_public_key(), server.server_key());
        assert!(Arc::ptr_eq(&client.session(), &second));
        assert_eq!(server.request_count(), 2);
        assert_eq!(gate.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_session() {
        let server = MockServer::new("password");
        let client = client(&server);
        client.negotiate().await.unwrap();

        let replies = futures::future::join_all(
            (0..4).map(|i| {
                let client = &client;
                async move { client.send_secure(ECHO, &format!("msg-{i}")).await }
            }),
        )
        .await;

        for (i, reply) in replies.into_iter().enumerate() {
            assert_eq!(reply.unwrap(), format!("echo:msg-{i}"));
        }
    }

    #[tokio::test]
    async fn test_error_status_is_surfaced() {
        let server = MockServer::new("password");
        let client = client(&server);

        server.set_behavior(Behavior::Status(503));
        assert!(matches!(
            client.negotiate().await,
            Err(ChannelError::UnexpectedStatus(503))
        ));
        assert!(!client.is_established());
    }

    #[tokio::test]
    async fn test_open_envelope_uses_session_key() {
        let server = MockServer::new("password");
        let client = client(&server);
        assert!(matches!(
            client.open_envelope(""),
            Err(ChannelError::SessionNotEstablished)
        ));

        client.negotiate().await.unwrap();
        let body = Envelope::seal(b"pushed", &SymmetricKey::derive("password"))
            .unwrap()
            .to_body();
        assert_eq!(client.open_envelope(&body).unwrap(), b"pushed");
    }

    #[test]
    fn test_rejects_invalid_config() {
        let server = MockServer::new("password");
        let config = ClientConfig {
            key_bits: 512,
            ..ClientConfig::new(ENDPOINT)
        };
        assert!(matches!(
            SecureClient::new(server, config),
            Err(ChannelError::InvalidConfig(_))
        ));
    }
}
