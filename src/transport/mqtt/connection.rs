//! Pure connection configuration for the MQTT client
//!
//! This module contains pure functions for broker addressing, reconnection
//! policy and building rumqttc options.

use super::status::ConnectionStatus;
use rumqttc::{MqttOptions, TlsConfiguration, Transport as RumqttcTransport};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Path used for websocket brokers when the URI names none
pub const DEFAULT_WS_PATH: &str = "/mqtt";

/// Wire transport selected by the broker URI scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerScheme {
    /// `mqtt://`, `tcp://`
    Tcp,
    /// `mqtts://`, `ssl://`
    Tls,
    /// `ws://`, `http://`
    Ws,
    /// `wss://`, `https://`
    Wss,
}

impl BrokerScheme {
    fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "mqtt" | "tcp" => Some(Self::Tcp),
            "mqtts" | "ssl" => Some(Self::Tls),
            "ws" | "http" => Some(Self::Ws),
            "wss" | "https" => Some(Self::Wss),
            _ => None,
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Self::Tcp => 1883,
            Self::Tls => 8883,
            Self::Ws => 80,
            Self::Wss => 443,
        }
    }

    pub fn is_websocket(self) -> bool {
        matches!(self, Self::Ws | Self::Wss)
    }

    pub fn is_secure(self) -> bool {
        matches!(self, Self::Tls | Self::Wss)
    }
}

/// Parsed broker address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub scheme: BrokerScheme,
    pub host: String,
    pub port: u16,
    /// Websocket path; empty for raw TCP/TLS
    pub path: String,
}

impl BrokerEndpoint {
    /// Parse a broker URI such as `ws://127.0.0.1:9001/mqtt` or `mqtt://host:1883`
    pub fn parse(uri: &str) -> Result<Self, MqttError> {
        let invalid = || MqttError::InvalidBrokerUrl(uri.to_string());

        let url = Url::parse(uri).map_err(|_| invalid())?;
        let scheme = BrokerScheme::from_scheme(url.scheme()).ok_or_else(invalid)?;
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(invalid)?
            .to_string();
        let port = url.port().unwrap_or(scheme.default_port());

        let path = if scheme.is_websocket() {
            match url.path() {
                "" | "/" => DEFAULT_WS_PATH.to_string(),
                path => path.to_string(),
            }
        } else {
            String::new()
        };

        Ok(Self {
            scheme,
            host,
            port,
            path,
        })
    }

    /// Full websocket URL handed to rumqttc in place of a host name
    pub fn websocket_url(&self) -> String {
        let scheme = if self.scheme.is_secure() { "wss" } else { "ws" };
        format!("{scheme}://{}:{}{}", self.host, self.port, self.path)
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            BrokerScheme::Tcp => write!(f, "mqtt://{}:{}", self.host, self.port),
            BrokerScheme::Tls => write!(f, "mqtts://{}:{}", self.host, self.port),
            BrokerScheme::Ws | BrokerScheme::Wss => f.write_str(&self.websocket_url()),
        }
    }
}

/// Per-connect options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Re-issue subscriptions after every reconnect; otherwise the broker
    /// keeps them in a persistent session
    pub resubscribe_on_reconnect: bool,
    /// Verify the broker certificate on secure transports
    pub verify_tls: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            resubscribe_on_reconnect: true,
            verify_tls: false,
        }
    }
}

/// Reconnection configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive reconnection attempts (None = unlimited)
    pub max_attempts: Option<u32>,
    /// Backoff pattern in milliseconds, indexed by attempt
    pub backoff_pattern: Vec<u64>,
    /// Delay to use after pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(20),
            backoff_pattern: vec![250, 500, 1000, 2000, 5000],
            sustained_delay: 5000,
        }
    }
}

impl ReconnectConfig {
    /// Backoff delay for the given 1-based attempt
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == Some(0) {
            return Err("max_attempts must be greater than 0 or None for unlimited".to_string());
        }

        if self.sustained_delay == 0 {
            return Err("sustained_delay must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Publishing failed: {0}")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Not connected - current status: {status}")]
    NotConnected { status: ConnectionStatus },
    #[error("Connection failed: {0}")]
    ConnectionFailedStr(String),
}

/// Connection-wide client settings that do not change between connects
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub client_id_prefix: String,
    pub credentials: Option<(String, String)>,
    pub keep_alive: Duration,
    pub max_packet_size: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            client_id_prefix: "fuzzmon".to_string(),
            credentials: None,
            keep_alive: Duration::from_secs(60),
            max_packet_size: 16 * 1024 * 1024,
        }
    }
}

/// Fresh client id so concurrent monitors never evict each other
pub fn generate_client_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

/// Pure function to configure MQTT options for one session
pub fn configure_mqtt_options(
    endpoint: &BrokerEndpoint,
    options: &ConnectOptions,
    settings: &ClientSettings,
) -> Result<MqttOptions, MqttError> {
    let client_id = generate_client_id(&settings.client_id_prefix);

    let mut mqtt_options = if endpoint.scheme.is_websocket() {
        MqttOptions::new(client_id, endpoint.websocket_url(), endpoint.port)
    } else {
        MqttOptions::new(client_id, endpoint.host.clone(), endpoint.port)
    };

    match endpoint.scheme {
        BrokerScheme::Tcp => {}
        BrokerScheme::Tls => {
            let transport = if options.verify_tls {
                RumqttcTransport::tls_with_default_config()
            } else {
                RumqttcTransport::tls_with_config(insecure_tls_configuration())
            };
            mqtt_options.set_transport(transport);
        }
        BrokerScheme::Ws => {
            mqtt_options.set_transport(RumqttcTransport::Ws);
        }
        BrokerScheme::Wss => {
            let transport = if options.verify_tls {
                RumqttcTransport::wss_with_default_config()
            } else {
                RumqttcTransport::wss_with_config(insecure_tls_configuration())
            };
            mqtt_options.set_transport(transport);
        }
    }

    if let Some((username, password)) = &settings.credentials {
        mqtt_options.set_credentials(username, password);
    }

    // A persistent session keeps subscriptions alive across reconnects
    mqtt_options.set_clean_session(options.resubscribe_on_reconnect);
    mqtt_options.set_keep_alive(settings.keep_alive);
    mqtt_options.set_max_packet_size(settings.max_packet_size, settings.max_packet_size);

    Ok(mqtt_options)
}

fn insecure_tls_configuration() -> TlsConfiguration {
    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoCertificateVerification))
        .with_no_client_auth();
    TlsConfiguration::Rustls(Arc::new(config))
}

/// Accepts any broker certificate; used when `verify_tls` is off
#[derive(Debug)]
struct NoCertificateVerification;

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_config_default() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_attempts, Some(20));
        assert_eq!(config.backoff_pattern, vec![250, 500, 1000, 2000, 5000]);
        assert_eq!(config.sustained_delay, 5000);
    }

    #[test]
    fn test_calculate_backoff_delay() {
        let config = ReconnectConfig::default();

        assert_eq!(config.calculate_backoff_delay(1), 250);
        assert_eq!(config.calculate_backoff_delay(2), 500);
        assert_eq!(config.calculate_backoff_delay(5), 5000);

        // Pattern exhausted
        assert_eq!(config.calculate_backoff_delay(6), 5000);
        assert_eq!(config.calculate_backoff_delay(100), 5000);
    }

    #[test]
    fn test_validate_reconnect_config() {
        assert!(ReconnectConfig::default().validate().is_ok());

        let zero_attempts = ReconnectConfig {
            max_attempts: Some(0),
            ..ReconnectConfig::default()
        };
        assert!(zero_attempts.validate().is_err());

        let zero_delay = ReconnectConfig {
            sustained_delay: 0,
            ..ReconnectConfig::default()
        };
        assert!(zero_delay.validate().is_err());
    }

    #[test]
    fn test_parse_websocket_endpoint() {
        let endpoint = BrokerEndpoint::parse("ws://127.0.0.1:9001/mqtt").unwrap();
        assert_eq!(endpoint.scheme, BrokerScheme::Ws);
        assert_eq!(endpoint.host, "127.0.0.1");
        assert_eq!(endpoint.port, 9001);
        assert_eq!(endpoint.websocket_url(), "ws://127.0.0.1:9001/mqtt");
    }

    #[test]
    fn test_parse_http_scheme_is_websocket() {
        let endpoint = BrokerEndpoint::parse("http://127.0.0.1:9001").unwrap();
        assert_eq!(endpoint.scheme, BrokerScheme::Ws);
        assert_eq!(endpoint.path, DEFAULT_WS_PATH);

        let secure = BrokerEndpoint::parse("https://broker.example").unwrap();
        assert_eq!(secure.scheme, BrokerScheme::Wss);
        assert_eq!(secure.port, 443);
    }

    #[test]
    fn test_parse_tcp_endpoints() {
        let plain = BrokerEndpoint::parse("mqtt://localhost").unwrap();
        assert_eq!(plain.scheme, BrokerScheme::Tcp);
        assert_eq!(plain.port, 1883);
        assert!(plain.path.is_empty());

        let tls = BrokerEndpoint::parse("mqtts://localhost").unwrap();
        assert_eq!(tls.scheme, BrokerScheme::Tls);
        assert_eq!(tls.port, 8883);
    }

    #[test]
    fn test_parse_rejects_bad_uris() {
        for uri in ["invalid-url", "ftp://host:21", "ws://", ""] {
            assert!(
                matches!(BrokerEndpoint::parse(uri), Err(MqttError::InvalidBrokerUrl(_))),
                "{uri} should be rejected"
            );
        }
    }

    #[test]
    fn test_configure_mqtt_options() {
        let endpoint = BrokerEndpoint::parse("mqtt://localhost:1883").unwrap();
        let settings = ClientSettings {
            credentials: Some(("user".to_string(), "secret".to_string())),
            ..ClientSettings::default()
        };

        let options =
            configure_mqtt_options(&endpoint, &ConnectOptions::default(), &settings).unwrap();
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
        assert!(options.client_id().starts_with("fuzzmon-"));
        assert!(options.clean_session());
    }

    #[test]
    fn test_persistent_session_without_resubscribe() {
        let endpoint = BrokerEndpoint::parse("ws://localhost:9001").unwrap();
        let options = ConnectOptions {
            resubscribe_on_reconnect: false,
            verify_tls: false,
        };

        let mqtt_options =
            configure_mqtt_options(&endpoint, &options, &ClientSettings::default()).unwrap();
        assert!(!mqtt_options.clean_session());
        assert_eq!(mqtt_options.broker_address().0, "ws://localhost:9001/mqtt");
    }

    #[test]
    fn test_client_ids_are_unique() {
        assert_ne!(generate_client_id("a"), generate_client_id("a"));
    }

    #[test]
    fn test_mqtt_error_display() {
        let errors = vec![
            MqttError::ConnectionFailed("test".to_string().into()),
            MqttError::PublishFailed("test".to_string().into()),
            MqttError::SubscriptionFailed("test".to_string().into()),
            MqttError::InvalidBrokerUrl("test".to_string()),
            MqttError::NotConnected {
                status: ConnectionStatus::Disconnected,
            },
            MqttError::ConnectionFailedStr("test".to_string()),
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
