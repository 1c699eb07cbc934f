use embassy_time::Duration;

/// Current firmware version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Size of the heap in DRAM (internal memory)
pub const HEAP_SIZE: usize = 96 * 1024;

/// Interval between checks for pending modem input
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Longest AT command line (without the `AT` prefix and terminator)
pub const COMMAND_CAPACITY: usize = 256;
/// Longest response line kept, longer lines are truncated
pub const RESPONSE_CAPACITY: usize = 256;

/// Upper bound accepted for the configured chunk size
pub const MAX_CHUNK_SIZE: usize = 1024;

/// Default response patterns for modem commands
pub const DEFAULT_SUCCESS: &str = "OK";
pub const DEFAULT_FAILURE: &str = "+CME ERROR";

/// Patterns of the final acknowledgement after a publish body
pub const PUBLISH_SUCCESS: &str = "OK";
pub const PUBLISH_FAILURE: &str = "ERROR";
/// Prompt the modem sends when it is ready for a publish body
pub const PUBLISH_PROMPT: &str = ">";

/// Failure pattern of the PDP activation command
pub const PDP_DEACTIVATED: &str = "DEACTIVE";

/// Timeout of the MQTT connect command
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Transfer protocol markers
pub const IMAGE_START: &str = "{Image Start";
pub const IMAGE_END: &str = "{Image End}";

/// Half period of the fatal error blink
pub const FATAL_BLINK_INTERVAL: Duration = Duration::from_millis(100);

/// UART baud rate of the cellular modem
pub const MODEM_BAUD_RATE: u32 = 9600;
