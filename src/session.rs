use embassy_time::Duration;
use embedded_io_async::{Read, ReadReady, Write};
use heapless::String;

use crate::channel::{CommandResponse, Modem, ResponseLine};
use crate::clock::Clock;
use crate::command::{self, Command, CommandLine, CommandRequest, MqttParam};
use crate::constants::{
    CONNECT_TIMEOUT, PDP_DEACTIVATED, PUBLISH_FAILURE, PUBLISH_PROMPT, PUBLISH_SUCCESS,
};

/// Progress of the modem session. Setup only moves forward; a failed setup
/// step lands in `Error` until [`Session::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemSession {
    Uninitialized,
    PdpActive,
    TlsConfigured,
    MqttConnected,
    Error,
}

#[derive(Debug)]
pub enum Error {
    Command(command::Error),
    Timeout(CommandLine),
    Modem(ResponseLine),
    ModemUnresponsive,
    PdpUnavailable,
    InvalidState(ModemSession),
}

impl From<command::Error> for Error {
    fn from(e: command::Error) -> Self {
        Error::Command(e)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    Command(command::Error),
    NotConnected,
    Timeout,
    Modem(ResponseLine),
}

impl From<command::Error> for PublishError {
    fn from(e: command::Error) -> Self {
        PublishError::Command(e)
    }
}

/// Certificate and key file names already present in modem storage.
#[derive(Debug, Clone, Copy)]
pub struct TlsFiles<'a> {
    pub root_ca: &'a str,
    pub client_cert: &'a str,
    pub client_key: &'a str,
    pub root_only: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct MqttSettings<'a> {
    pub client_id: &'a str,
    pub host: &'a str,
    pub port: u16,
    pub keepalive_seconds: u16,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub topic: Option<&'a str>,
}

/// APN and IP address reported for the default PDP context.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub apn: String<64>,
    pub ip: String<64>,
}

impl NetworkInfo {
    /// Parse a `+CGCONTRDP: <cid>,<bearer>,"<apn>","<ip>",...` line. Missing
    /// fields are left empty.
    pub fn parse(line: &str) -> Self {
        let mut fields = line.split(',').skip(2);
        let mut info = NetworkInfo::default();
        if let Some(apn) = fields.next() {
            push_unquoted(&mut info.apn, apn);
        }
        if let Some(ip) = fields.next() {
            push_unquoted(&mut info.ip, ip);
        }
        info
    }
}

// Overlong fields keep their head
fn push_unquoted<const N: usize>(out: &mut String<N>, field: &str) {
    let value = field.trim().trim_matches('"');
    for c in value.chars() {
        if out.push(c).is_err() {
            log::warn!("Network info field truncated to {} bytes: {}", N, value);
            break;
        }
    }
}

/// Modem session manager: network attach, TLS binding and the MQTT session,
/// all driven through the command channel.
pub struct Session<S, C> {
    modem: Modem<S, C>,
    state: ModemSession,
    mqtt_configured: bool,
    command_timeout: Duration,
}

impl<S, C> Session<S, C>
where
    S: Read + Write + ReadReady,
    S::Error: core::fmt::Debug,
    C: Clock,
{
    pub fn new(modem: Modem<S, C>, command_timeout: Duration) -> Self {
        Self {
            modem,
            state: ModemSession::Uninitialized,
            mqtt_configured: false,
            command_timeout,
        }
    }

    pub fn state(&self) -> ModemSession {
        self.state
    }

    /// Forget all session progress, e.g. after the device restarted its
    /// bring-up.
    pub fn reset(&mut self) {
        self.state = ModemSession::Uninitialized;
        self.mqtt_configured = false;
    }

    fn request<'p>(&self, command: Command<'_>) -> Result<CommandRequest<'p>, command::Error> {
        CommandRequest::new(command, self.command_timeout)
    }

    async fn require(&mut self, request: CommandRequest<'_>) -> Result<ResponseLine, Error> {
        match self.modem.execute(&request).await {
            CommandResponse::Success(line) => Ok(line),
            CommandResponse::Failure(line) => Err(Error::Modem(line)),
            CommandResponse::Timeout => Err(Error::Timeout(request.command)),
        }
    }

    // Responses are logged by the channel, the outcome does not matter here
    async fn best_effort(&mut self, command: Command<'_>) -> Result<CommandResponse, Error> {
        let request = self.request(command)?;
        Ok(self.modem.execute(&request).await)
    }

    fn expect_state(&self, expected: ModemSession) -> Result<(), Error> {
        if self.state != expected {
            return Err(Error::InvalidState(self.state));
        }
        Ok(())
    }

    fn fail<T>(&mut self, error: Error) -> Result<T, Error> {
        log::error!("Modem session setup failed: {:?}", error);
        self.state = ModemSession::Error;
        Err(error)
    }

    /// Send bare `AT` until the modem answers `OK`.
    pub async fn probe(&mut self, attempts: u16) -> Result<(), Error> {
        for attempt in 1..=attempts {
            let request = self.request(Command::Attention)?;
            match self.modem.execute(&request).await {
                CommandResponse::Success(line) if line.contains("OK") => {
                    log::info!("Modem responding after {} probe(s)", attempt);
                    return Ok(());
                }
                _ => log::debug!("Modem probe {} unanswered", attempt),
            }
        }
        self.fail(Error::ModemUnresponsive)
    }

    /// Verbose errors and echo off, plus an optional diagnostic dump.
    pub async fn initialize(&mut self, diagnostics: bool) -> Result<(), Error> {
        for command in [Command::VerboseErrors, Command::Echo(false)] {
            let request = self.request(command)?;
            if let Err(e) = self.require(request).await {
                return self.fail(e);
            }
        }

        if diagnostics {
            for command in [
                Command::SimStatus,
                Command::ModelId,
                Command::FirmwareRevision,
                Command::SerialNumber,
                Command::ClockQuery,
                Command::Operator,
                Command::SignalQuality,
                Command::SystemInfo,
                Command::Band,
                Command::Registration,
                Command::PdpContextState,
                Command::PdpAddress,
            ] {
                if let CommandResponse::Success(line) = self.best_effort(command).await? {
                    log::info!("{}", line.as_str());
                }
            }
        }

        Ok(())
    }

    /// Query the APN and IP address of the default context. Fields the modem
    /// does not report come back empty.
    pub async fn network_info(&mut self) -> Result<NetworkInfo, Error> {
        match self.best_effort(Command::ContextParameters).await? {
            CommandResponse::Success(line) => {
                let info = NetworkInfo::parse(&line);
                log::info!("Network APN {:?}, IP {:?}", info.apn.as_str(), info.ip.as_str());
                Ok(info)
            }
            other => {
                log::warn!("Context parameters unavailable: {:?}", other);
                Ok(NetworkInfo::default())
            }
        }
    }

    /// Activate the PDP context, escalating through up to three attempts:
    /// as configured, with an empty APN, then with `apn` forced.
    pub async fn activate_pdp(&mut self, apn: &str) -> Result<ModemSession, Error> {
        self.expect_state(ModemSession::Uninitialized)?;

        self.best_effort(Command::Attach(true)).await?;

        for (attempt, forced_apn) in [None, Some(""), Some(apn)].into_iter().enumerate() {
            if let Some(forced_apn) = forced_apn {
                log::info!("Redefining PDP context with APN {:?}", forced_apn);
                self.best_effort(Command::Attach(false)).await?;
                self.best_effort(Command::DefineContext { apn: forced_apn })
                    .await?;
                self.best_effort(Command::Attach(true)).await?;
            }

            let request = self
                .request(Command::ActivateNetwork)?
                .with_failure(PDP_DEACTIVATED);
            match self.modem.execute(&request).await {
                CommandResponse::Success(_) => {
                    log::info!("PDP context active after {} attempt(s)", attempt + 1);
                    self.state = ModemSession::PdpActive;
                    return Ok(self.state);
                }
                CommandResponse::Failure(line) => {
                    log::warn!("PDP activation attempt {} failed: {}", attempt + 1, line.as_str())
                }
                CommandResponse::Timeout => {
                    log::warn!("PDP activation attempt {} timed out", attempt + 1)
                }
            }
        }

        self.fail(Error::PdpUnavailable)
    }

    /// Convert and bind the stored certificates for the MQTT session.
    pub async fn configure_tls(&mut self, files: &TlsFiles<'_>, expected_ip: &str) -> Result<(), Error> {
        self.expect_state(ModemSession::PdpActive)?;

        match self.tls_steps(files, expected_ip).await {
            Ok(()) => {
                log::info!("TLS configured");
                self.state = ModemSession::TlsConfigured;
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    async fn tls_steps(&mut self, files: &TlsFiles<'_>, expected_ip: &str) -> Result<(), Error> {
        let status = self
            .request(Command::NetworkStatus)?
            .with_success(expected_ip);
        let line = self.require(status).await?;
        if !expected_ip.is_empty() && !line.contains(expected_ip) {
            log::warn!("Network status {:?} does not mention {}", line.as_str(), expected_ip);
        }

        let client_files = [files.client_cert, files.client_key];
        let client_files: &[&str] = if files.root_only { &[] } else { &client_files };
        for file in core::iter::once(&files.root_ca).chain(client_files) {
            let request = self.request(Command::FileSize(file))?;
            self.require(request).await?;
        }

        let request = self.request(Command::ConvertRootCa(files.root_ca))?;
        self.require(request).await?;

        let bind = if files.root_only {
            Command::BindTls {
                root: files.root_ca,
                client: None,
            }
        } else {
            let request = self.request(Command::ConvertClientCert {
                cert: files.client_cert,
                key: files.client_key,
            })?;
            self.require(request).await?;
            Command::BindTls {
                root: files.root_ca,
                client: Some(files.client_cert),
            }
        };
        let request = self.request(bind)?;
        self.require(request).await?;

        let request = self.request(Command::TlsVersion)?;
        self.require(request).await?;
        Ok(())
    }

    /// Set the MQTT session parameters. Optional credentials and topic are
    /// only sent when present.
    pub async fn configure_mqtt(&mut self, settings: &MqttSettings<'_>) -> Result<(), Error> {
        self.expect_state(ModemSession::TlsConfigured)?;

        let params = [
            Some(MqttParam::ClientId(settings.client_id)),
            Some(MqttParam::Url {
                host: settings.host,
                port: settings.port,
            }),
            Some(MqttParam::KeepAlive(settings.keepalive_seconds)),
            settings.username.map(MqttParam::Username),
            settings.password.map(MqttParam::Password),
            settings.topic.map(MqttParam::Topic),
        ];

        for param in params.into_iter().flatten() {
            let result = match self.request(Command::MqttConfig(param)) {
                Ok(request) => self.require(request).await,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = result {
                return self.fail(e);
            }
        }

        log::info!("MQTT configured for {}:{}", settings.host, settings.port);
        self.mqtt_configured = true;
        Ok(())
    }

    /// Open the MQTT session, dropping any stale one first.
    pub async fn connect(&mut self) -> Result<(), Error> {
        self.expect_state(ModemSession::TlsConfigured)?;
        if !self.mqtt_configured {
            return Err(Error::InvalidState(self.state));
        }

        self.best_effort(Command::MqttDisconnect).await?;
        let request = self
            .request(Command::MqttConnect)?
            .with_timeout(CONNECT_TIMEOUT);
        self.require(request).await?;

        log::info!("MQTT connected");
        self.state = ModemSession::MqttConnected;
        Ok(())
    }

    pub async fn disconnect(&mut self) -> Result<(), Error> {
        if self.state != ModemSession::MqttConnected {
            return Ok(());
        }

        // The modem drops the session either way
        self.state = ModemSession::TlsConfigured;
        let request = self.request(Command::MqttDisconnect)?;
        self.require(request).await?;
        log::info!("MQTT disconnected");
        Ok(())
    }

    /// Publish one message: size declaration, body, then the final
    /// acknowledgement. A non-raw body is followed by a line break that is
    /// not part of the declared length.
    pub async fn publish(&mut self, topic: &str, payload: &[u8], raw: bool) -> Result<(), PublishError> {
        if self.state != ModemSession::MqttConnected {
            return Err(PublishError::NotConnected);
        }

        let declaration = self
            .request(Command::MqttPublish {
                topic,
                len: payload.len(),
            })?
            .with_success(PUBLISH_PROMPT);
        match self.modem.execute(&declaration).await {
            CommandResponse::Success(_) => {}
            CommandResponse::Failure(line) => return Err(PublishError::Modem(line)),
            CommandResponse::Timeout => return Err(PublishError::Timeout),
        }

        match self
            .modem
            .send_raw(
                payload,
                !raw,
                self.command_timeout,
                PUBLISH_SUCCESS,
                PUBLISH_FAILURE,
            )
            .await
        {
            CommandResponse::Success(_) => Ok(()),
            CommandResponse::Failure(line) => Err(PublishError::Modem(line)),
            CommandResponse::Timeout => Err(PublishError::Timeout),
        }
    }

    pub async fn subscribe(&mut self, topic: &str) -> Result<(), Error> {
        self.expect_state(ModemSession::MqttConnected)?;
        let request = self.request(Command::MqttSubscribe(topic))?;
        self.require(request).await?;
        Ok(())
    }

    pub async fn unsubscribe(&mut self, topic: &str) -> Result<(), Error> {
        self.expect_state(ModemSession::MqttConnected)?;
        let request = self.request(Command::MqttUnsubscribe(topic))?;
        self.require(request).await?;
        Ok(())
    }
}
