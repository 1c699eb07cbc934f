use embassy_time::Duration;

use crate::constants::MAX_CHUNK_SIZE;

/// What to do when a publish fails part way through an image transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Enter the fatal blink loop until the device is restarted.
    Halt,
    /// Log the failure and return to scanning.
    Continue,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunkSize(u16),
    ConfidenceThreshold,
    JpegQuality(u8),
    EmptyField(&'static str),
    ZeroPort,
    ZeroTimeout(&'static str),
    ZeroProbeAttempts,
}

#[derive(Debug, Clone)]
pub struct Config {
    // Operator APN (the APN reported by the network is used when absent)
    pub apn: Option<&'static str>,

    // MQTT broker hostname
    pub mqtt_hostname: &'static str,

    // MQTT port (usually 8883 for TLS)
    pub mqtt_port: u16,

    // MQTT client identifier
    pub mqtt_client_id: &'static str,

    // MQTT topic every transfer frame is published to
    pub mqtt_topic: &'static str,

    // MQTT username for authentication (optional)
    pub mqtt_username: Option<&'static str>,

    // MQTT password for authentication (optional)
    pub mqtt_password: Option<&'static str>,

    // MQTT keep alive in seconds
    pub mqtt_keepalive_seconds: u16,

    // Root CA file name in modem storage
    pub tls_root_ca: &'static str,

    // Client certificate file name in modem storage
    pub tls_client_cert: &'static str,

    // Client private key file name in modem storage
    pub tls_client_key: &'static str,

    // Only bind the root CA (no client authentication)
    pub tls_root_only: bool,

    // Maximum bytes of compressed image per chunk frame
    pub chunk_size: u16,

    // JPEG quality used when compressing the captured frame
    pub jpeg_quality: u8,

    // Minimum classification score accepted as conclusive
    pub confidence_threshold: f32,

    // Give up classifying after this many seconds
    pub classification_timeout_seconds: u32,

    // Sleep after this many seconds without a barcode
    pub idle_timeout_seconds: u32,

    // Dwell time between barcode detection and classification
    pub cooldown_seconds: u32,

    // Default response timeout for modem commands
    pub command_timeout_seconds: u32,

    // Number of bare `AT` probes before the modem is declared dead
    pub modem_probe_attempts: u16,

    // Dump modem diagnostics at bring-up
    pub diagnostics: bool,

    // Behaviour on publish failure
    pub publish_failure_policy: FailurePolicy,
}

impl Config {
    pub fn validate(&self) -> Result<(), Error> {
        if self.chunk_size == 0 || self.chunk_size as usize > MAX_CHUNK_SIZE {
            return Err(Error::ChunkSize(self.chunk_size));
        }
        if !(self.confidence_threshold > 0.0 && self.confidence_threshold <= 1.0) {
            return Err(Error::ConfidenceThreshold);
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::JpegQuality(self.jpeg_quality));
        }
        if self.mqtt_port == 0 {
            return Err(Error::ZeroPort);
        }
        if self.modem_probe_attempts == 0 {
            return Err(Error::ZeroProbeAttempts);
        }

        for (name, value) in [
            ("mqtt_hostname", self.mqtt_hostname),
            ("mqtt_client_id", self.mqtt_client_id),
            ("mqtt_topic", self.mqtt_topic),
            ("tls_root_ca", self.tls_root_ca),
        ] {
            if value.is_empty() {
                return Err(Error::EmptyField(name));
            }
        }
        if !self.tls_root_only {
            if self.tls_client_cert.is_empty() {
                return Err(Error::EmptyField("tls_client_cert"));
            }
            if self.tls_client_key.is_empty() {
                return Err(Error::EmptyField("tls_client_key"));
            }
        }

        for (name, value) in [
            ("classification_timeout_seconds", self.classification_timeout_seconds),
            ("idle_timeout_seconds", self.idle_timeout_seconds),
            ("command_timeout_seconds", self.command_timeout_seconds),
        ] {
            if value == 0 {
                return Err(Error::ZeroTimeout(name));
            }
        }

        Ok(())
    }

    pub fn classification_timeout(&self) -> Duration {
        Duration::from_secs(self.classification_timeout_seconds.into())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds.into())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds.into())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds.into())
    }
}

// config values are generated at compile time
include!(concat!(env!("OUT_DIR"), "/config.rs"));

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        apn: None,
        mqtt_hostname: "broker.example.com",
        mqtt_port: 8883,
        mqtt_client_id: "node-1",
        mqtt_topic: "parcels/images",
        mqtt_username: None,
        mqtt_password: None,
        mqtt_keepalive_seconds: 60,
        tls_root_ca: "root.pem",
        tls_client_cert: "cert.pem",
        tls_client_key: "key.pem",
        tls_root_only: false,
        chunk_size: 512,
        jpeg_quality: 10,
        confidence_threshold: 0.95,
        classification_timeout_seconds: 60,
        idle_timeout_seconds: 30,
        cooldown_seconds: 5,
        command_timeout_seconds: 10,
        modem_probe_attempts: 3,
        diagnostics: false,
        publish_failure_policy: FailurePolicy::Halt,
    }
}
