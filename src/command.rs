//! Typed AT commands.
//!
//! Every command the node sends to the modem is one variant of [`Command`].
//! Encoding validates the free-text parameters, so a value that would break
//! the quoting of the command line is rejected before anything reaches the
//! UART.

use core::fmt::Write;

use embassy_time::Duration;
use heapless::String;

use crate::constants::{COMMAND_CAPACITY, DEFAULT_FAILURE, DEFAULT_SUCCESS};

/// Encoded command text, without the `AT` prefix and line terminator.
pub type CommandLine = String<COMMAND_CAPACITY>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Parameter must not be empty
    Empty(&'static str),
    /// Parameter contains a quote, comma or line break
    InvalidCharacter(&'static str),
    /// Port 0 is not a valid broker port
    InvalidPort,
    /// Encoded command exceeds the command buffer
    TooLong,
}

/// MQTT session parameters set with `+SMCONF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MqttParam<'a> {
    ClientId(&'a str),
    Url { host: &'a str, port: u16 },
    KeepAlive(u16),
    Username(&'a str),
    Password(&'a str),
    Topic(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Bare `AT`, used to probe the modem
    Attention,
    /// `+CMEE=2`: verbose `+CME ERROR` reports
    VerboseErrors,
    /// `E0` / `E1`
    Echo(bool),

    SimStatus,
    ModelId,
    FirmwareRevision,
    SerialNumber,
    ClockQuery,
    Operator,
    SignalQuality,
    SystemInfo,
    Band,
    Registration,
    PdpContextState,
    PdpAddress,
    /// `+CGCONTRDP`: APN and IP address of the active context
    ContextParameters,

    /// `+CGATT=<0|1>`
    Attach(bool),
    /// `+CGDCONT=1,"IP","<apn>"`, the APN may be empty
    DefineContext { apn: &'a str },
    /// `+CNACT=1`
    ActivateNetwork,
    /// `+CNACT?`
    NetworkStatus,

    /// `+CFSGFIS=3,"<file>"`: size of a file in modem storage
    FileSize(&'a str),
    /// `+CSSLCFG="convert",2,<file>`
    ConvertRootCa(&'a str),
    /// `+CSSLCFG="convert",1,<cert>,<key>`
    ConvertClientCert { cert: &'a str, key: &'a str },
    /// `+SMSSL=1,<root>,<client>` or `+SMSSL=1,<root>,""`
    BindTls { root: &'a str, client: Option<&'a str> },
    /// `+CSSLCFG="sslversion",0,3`
    TlsVersion,

    /// `+SMCONF=...`
    MqttConfig(MqttParam<'a>),
    /// `+SMCONN`
    MqttConnect,
    /// `+SMDISC`
    MqttDisconnect,
    /// `+SMPUB="<topic>",<len>,1,0`
    MqttPublish { topic: &'a str, len: usize },
    /// `+SMSUB="<topic>",1`
    MqttSubscribe(&'a str),
    /// `+SMUNSUB="<topic>"`
    MqttUnsubscribe(&'a str),
}

impl Command<'_> {
    /// Render the command text, rejecting malformed parameters.
    pub fn encode(&self) -> Result<CommandLine, Error> {
        let mut line = CommandLine::new();
        self.write_to(&mut line)?;
        Ok(line)
    }

    fn write_to(&self, out: &mut CommandLine) -> Result<(), Error> {
        match *self {
            Command::Attention => Ok(()),
            Command::VerboseErrors => push(out, format_args!("+CMEE=2")),
            Command::Echo(on) => push(out, format_args!("E{}", on as u8)),
            Command::SimStatus => push(out, format_args!("+CPIN?")),
            Command::ModelId => push(out, format_args!("+CGMM")),
            Command::FirmwareRevision => push(out, format_args!("+CGMR")),
            Command::SerialNumber => push(out, format_args!("+GSN")),
            Command::ClockQuery => push(out, format_args!("+CCLK?")),
            Command::Operator => push(out, format_args!("+COPS?")),
            Command::SignalQuality => push(out, format_args!("+CSQ")),
            Command::SystemInfo => push(out, format_args!("+CPSI?")),
            Command::Band => push(out, format_args!("+CBAND?")),
            Command::Registration => push(out, format_args!("+CGREG?")),
            Command::PdpContextState => push(out, format_args!("+CGACT?")),
            Command::PdpAddress => push(out, format_args!("+CGPADDR")),
            Command::ContextParameters => push(out, format_args!("+CGCONTRDP")),
            Command::Attach(on) => push(out, format_args!("+CGATT={}", on as u8)),
            Command::DefineContext { apn } => {
                let apn = quoted("apn", apn)?;
                push(out, format_args!("+CGDCONT=1,\"IP\",\"{}\"", apn))
            }
            Command::ActivateNetwork => push(out, format_args!("+CNACT=1")),
            Command::NetworkStatus => push(out, format_args!("+CNACT?")),
            Command::FileSize(file) => {
                let file = file_name("file", file)?;
                push(out, format_args!("+CFSGFIS=3,\"{}\"", file))
            }
            Command::ConvertRootCa(file) => {
                let file = file_name("root_ca", file)?;
                push(out, format_args!("+CSSLCFG=\"convert\",2,{}", file))
            }
            Command::ConvertClientCert { cert, key } => {
                let cert = file_name("client_cert", cert)?;
                let key = file_name("client_key", key)?;
                push(out, format_args!("+CSSLCFG=\"convert\",1,{},{}", cert, key))
            }
            Command::BindTls { root, client } => {
                let root = file_name("root_ca", root)?;
                match client {
                    Some(client) => {
                        let client = file_name("client_cert", client)?;
                        push(out, format_args!("+SMSSL=1,{},{}", root, client))
                    }
                    None => push(out, format_args!("+SMSSL=1,{},\"\"", root)),
                }
            }
            Command::TlsVersion => push(out, format_args!("+CSSLCFG=\"sslversion\",0,3")),
            Command::MqttConfig(param) => write_mqtt_param(out, param),
            Command::MqttConnect => push(out, format_args!("+SMCONN")),
            Command::MqttDisconnect => push(out, format_args!("+SMDISC")),
            Command::MqttPublish { topic, len } => {
                let topic = non_empty("topic", quoted("topic", topic)?)?;
                push(out, format_args!("+SMPUB=\"{}\",{},1,0", topic, len))
            }
            Command::MqttSubscribe(topic) => {
                let topic = non_empty("topic", quoted("topic", topic)?)?;
                push(out, format_args!("+SMSUB=\"{}\",1", topic))
            }
            Command::MqttUnsubscribe(topic) => {
                let topic = non_empty("topic", quoted("topic", topic)?)?;
                push(out, format_args!("+SMUNSUB=\"{}\"", topic))
            }
        }
    }
}

fn write_mqtt_param(out: &mut CommandLine, param: MqttParam<'_>) -> Result<(), Error> {
    match param {
        MqttParam::ClientId(id) => {
            let id = non_empty("client_id", quoted("client_id", id)?)?;
            push(out, format_args!("+SMCONF=\"clientid\",\"{}\"", id))
        }
        MqttParam::Url { host, port } => {
            let host = non_empty("host", quoted("host", host)?)?;
            if port == 0 {
                return Err(Error::InvalidPort);
            }
            push(out, format_args!("+SMCONF=\"url\",\"{}\",\"{}\"", host, port))
        }
        MqttParam::KeepAlive(seconds) => push(out, format_args!("+SMCONF=\"KEEPTIME\",{}", seconds)),
        MqttParam::Username(name) => {
            let name = quoted("username", name)?;
            push(out, format_args!("+SMCONF=\"username\",\"{}\"", name))
        }
        MqttParam::Password(password) => {
            let password = quoted("password", password)?;
            push(out, format_args!("+SMCONF=\"password\",\"{}\"", password))
        }
        MqttParam::Topic(topic) => {
            let topic = non_empty("topic", quoted("topic", topic)?)?;
            push(out, format_args!("+SMCONF=\"topic\",\"{}\"", topic))
        }
    }
}

fn push(out: &mut CommandLine, args: core::fmt::Arguments<'_>) -> Result<(), Error> {
    out.write_fmt(args).map_err(|_| Error::TooLong)
}

// Text placed between double quotes
fn quoted<'a>(name: &'static str, value: &'a str) -> Result<&'a str, Error> {
    if value.contains(&['"', '\r', '\n'][..]) {
        return Err(Error::InvalidCharacter(name));
    }
    Ok(value)
}

// Unquoted file names are comma separated on the wire
fn file_name<'a>(name: &'static str, value: &'a str) -> Result<&'a str, Error> {
    let value = non_empty(name, quoted(name, value)?)?;
    if value.contains(',') {
        return Err(Error::InvalidCharacter(name));
    }
    Ok(value)
}

fn non_empty<'a>(name: &'static str, value: &'a str) -> Result<&'a str, Error> {
    if value.is_empty() {
        return Err(Error::Empty(name));
    }
    Ok(value)
}

/// One request/response exchange: the command plus how to wait for and
/// classify its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest<'a> {
    pub command: CommandLine,
    pub timeout: Duration,
    pub success: &'a str,
    pub failure: &'a str,
}

impl<'a> CommandRequest<'a> {
    pub fn new(command: Command<'_>, timeout: Duration) -> Result<Self, Error> {
        Ok(Self {
            command: command.encode()?,
            timeout,
            success: DEFAULT_SUCCESS,
            failure: DEFAULT_FAILURE,
        })
    }

    pub fn with_success(mut self, success: &'a str) -> Self {
        self.success = success;
        self
    }

    pub fn with_failure(mut self, failure: &'a str) -> Self {
        self.failure = failure;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
