use embassy_time::{Duration, Instant};
use embedded_io_async::{Read, ReadReady, Write};
use heapless::String;

use crate::clock::Clock;
use crate::command::CommandRequest;
use crate::constants::{POLL_INTERVAL, PUBLISH_PROMPT, RESPONSE_CAPACITY};

/// One response line, trimmed of its terminator.
pub type ResponseLine = String<RESPONSE_CAPACITY>;

/// Outcome of one request/response exchange with the modem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResponse {
    Success(ResponseLine),
    Failure(ResponseLine),
    Timeout,
}

impl CommandResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandResponse::Success(_))
    }

    pub fn line(&self) -> Option<&str> {
        match self {
            CommandResponse::Success(line) | CommandResponse::Failure(line) => Some(line.as_str()),
            CommandResponse::Timeout => None,
        }
    }
}

/// Classify a response line against the expected patterns.
///
/// The failure pattern wins whenever it occurs anywhere in the line, even if
/// the success pattern is present too. A line matching neither pattern is
/// still reported as `Success`; callers that care inspect the line. An empty
/// failure pattern never matches.
pub fn classify(line: &str, success: &str, failure: &str) -> CommandResponse {
    let line = truncate(line);
    if !failure.is_empty() && line.contains(failure) {
        return CommandResponse::Failure(line);
    }
    if !line.contains(success) {
        log::debug!("response {:?} does not contain {:?}", line.as_str(), success);
    }
    CommandResponse::Success(line)
}

fn truncate(line: &str) -> ResponseLine {
    let mut out = ResponseLine::new();
    for c in line.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Command channel to the cellular modem.
///
/// Owns the serial link and the clock; exactly one exchange is in flight at a
/// time since every call takes `&mut self`.
pub struct Modem<S, C> {
    serial: S,
    clock: C,
}

impl<S, C> Modem<S, C>
where
    S: Read + Write + ReadReady,
    S::Error: core::fmt::Debug,
    C: Clock,
{
    pub fn new(serial: S, clock: C) -> Self {
        Self { serial, clock }
    }

    /// Send `AT<command>` and classify the first response line.
    pub async fn execute(&mut self, request: &CommandRequest<'_>) -> CommandResponse {
        self.discard_pending().await;

        log::debug!("---> AT{}", request.command.as_str());
        let framed = [b"AT".as_slice(), request.command.as_bytes(), b"\r\n".as_slice()];
        if let Err(e) = self.send(&framed).await {
            log::error!("Modem write failed: {:?}", e);
            return CommandResponse::Timeout;
        }

        self.listen(
            request.timeout,
            request.success,
            request.failure,
            Some(request.command.as_str()),
        )
        .await
    }

    /// Send bytes without command framing (publish bodies) and wait for the
    /// reply the same way [`Modem::execute`] does.
    pub async fn send_raw(
        &mut self,
        payload: &[u8],
        line_break: bool,
        timeout: Duration,
        success: &str,
        failure: &str,
    ) -> CommandResponse {
        log::debug!("---> {} raw bytes", payload.len());
        let terminator: &[u8] = if line_break { b"\r\n" } else { b"" };
        if let Err(e) = self.send(&[payload, terminator]).await {
            log::error!("Modem raw write failed: {:?}", e);
            return CommandResponse::Timeout;
        }

        self.listen(timeout, success, failure, None).await
    }

    async fn send(&mut self, parts: &[&[u8]]) -> Result<(), S::Error> {
        for part in parts {
            self.serial.write_all(part).await?;
        }
        self.serial.flush().await
    }

    // `echo` is the command just sent; with echo on the modem repeats it
    // before the response.
    async fn listen(
        &mut self,
        timeout: Duration,
        success: &str,
        failure: &str,
        echo: Option<&str>,
    ) -> CommandResponse {
        let deadline = self.clock.now() + timeout;

        loop {
            match self.serial.read_ready() {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    log::error!("Modem read failed: {:?}", e);
                    return CommandResponse::Timeout;
                }
            }
            if self.clock.now() >= deadline {
                log::warn!("<--- TIMEOUT after {} ms", timeout.as_millis());
                return CommandResponse::Timeout;
            }
            self.clock.sleep(POLL_INTERVAL).await;
        }

        match self.read_line(deadline, echo).await {
            Some(line) => {
                let response = classify(&line, success, failure);
                match &response {
                    CommandResponse::Failure(line) => log::warn!("<--- {}", line.as_str()),
                    _ => log::debug!("<--- {}", line.as_str()),
                }
                response
            }
            None => {
                log::warn!("<--- TIMEOUT waiting for end of line");
                CommandResponse::Timeout
            }
        }
    }

    // Assemble the first non-blank line. The publish prompt is not line
    // terminated, so a lone `>` with nothing else pending counts as a line.
    async fn read_line(&mut self, deadline: Instant, echo: Option<&str>) -> Option<ResponseLine> {
        let mut line = ResponseLine::new();
        let mut byte = [0u8; 1];

        loop {
            let ready = match self.serial.read_ready() {
                Ok(ready) => ready,
                Err(e) => {
                    log::error!("Modem read failed: {:?}", e);
                    false
                }
            };

            if !ready {
                if line.trim() == PUBLISH_PROMPT {
                    return Some(truncate(PUBLISH_PROMPT));
                }
                if self.clock.now() >= deadline {
                    let partial = line.trim();
                    return (!partial.is_empty()).then(|| truncate(partial));
                }
                self.clock.sleep(POLL_INTERVAL).await;
                continue;
            }

            match self.serial.read(&mut byte).await {
                Ok(1) => {}
                Ok(_) => continue,
                Err(e) => {
                    log::error!("Modem read failed: {:?}", e);
                    return None;
                }
            }

            match byte[0] {
                b'\n' => {
                    let trimmed = line.trim();
                    let echoed = echo.is_some() && trimmed.strip_prefix("AT") == echo;
                    if echoed {
                        log::debug!("<--- echo {}", trimmed);
                    } else if !trimmed.is_empty() {
                        return Some(truncate(trimmed));
                    }
                    line.clear();
                }
                b'\r' => {}
                b if b.is_ascii() => {
                    // Overlong lines keep their head
                    let _ = line.push(b as char);
                }
                _ => {
                    let _ = line.push(char::REPLACEMENT_CHARACTER);
                }
            }
        }
    }

    // Drop leftovers of a previous multi-line reply
    async fn discard_pending(&mut self) {
        let mut buf = [0u8; 32];
        let mut dropped = 0;
        while let Ok(true) = self.serial.read_ready() {
            match self.serial.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => dropped += n,
            }
        }
        if dropped > 0 {
            log::debug!("Discarded {} stale bytes", dropped);
        }
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;

    use super::*;
    use crate::command::Command;
    use crate::mock::{MockClock, MockModem, Reply};

    fn modem(replies: &[Reply]) -> (Modem<MockModem, MockClock>, MockModem, MockClock) {
        let clock = MockClock::new();
        let serial = MockModem::new(&clock, replies);
        (Modem::new(serial.clone(), clock.clone()), serial, clock)
    }

    fn request(command: Command<'_>, timeout: u64) -> CommandRequest<'static> {
        CommandRequest::new(command, Duration::from_secs(timeout)).unwrap()
    }

    #[test]
    fn failure_pattern_takes_precedence() {
        assert_eq!(
            classify("+CME ERROR: operation not allowed OK", "OK", "+CME ERROR"),
            CommandResponse::Failure(truncate("+CME ERROR: operation not allowed OK"))
        );
        assert_eq!(
            classify("+APP PDP: 0,DEACTIVE", "ACTIVE", "DEACTIVE"),
            CommandResponse::Failure(truncate("+APP PDP: 0,DEACTIVE"))
        );
    }

    #[test]
    fn unmatched_line_leans_to_success() {
        assert_eq!(
            classify("+CSQ: 17,99", "OK", "+CME ERROR"),
            CommandResponse::Success(truncate("+CSQ: 17,99"))
        );
    }

    #[test]
    fn empty_failure_pattern_never_matches() {
        assert!(classify("anything", "OK", "").is_success());
    }

    #[test]
    fn sends_prefixed_command_and_reads_first_line() {
        let (mut modem, serial, _) = modem(&[Reply::Line("OK")]);
        let response = block_on(modem.execute(&request(Command::Echo(false), 10)));

        assert_eq!(response, CommandResponse::Success(truncate("OK")));
        assert_eq!(serial.written(), ["ATE0"]);
    }

    #[test]
    fn command_echo_is_skipped() {
        let (mut modem, _, _) = modem(&[
            Reply::Raw("AT\r\r\nOK\r\n"),
            Reply::Raw("AT+SMPUB=\"t\",4,1,0\r\r\n>"),
        ]);

        let response = block_on(modem.execute(&request(Command::Attention, 5)));
        assert_eq!(response, CommandResponse::Success(truncate("OK")));

        let command = Command::MqttPublish { topic: "t", len: 4 };
        let response = block_on(modem.execute(&request(command, 5).with_success(">")));
        assert_eq!(response, CommandResponse::Success(truncate(">")));
    }

    #[test]
    fn raw_send_keeps_lines_looking_like_commands() {
        let (mut modem, _, _) = modem(&[Reply::Line("AT")]);
        let response = block_on(modem.send_raw(b"x", false, Duration::from_secs(1), "OK", "ERROR"));

        assert_eq!(response, CommandResponse::Success(truncate("AT")));
    }

    #[test]
    fn times_out_within_one_poll_interval() {
        let (mut modem, _, clock) = modem(&[Reply::Silent]);
        let response = block_on(modem.execute(&request(Command::Attention, 5)));

        assert_eq!(response, CommandResponse::Timeout);
        assert!(clock.elapsed() >= Duration::from_secs(5));
        assert!(clock.elapsed() < Duration::from_secs(5) + POLL_INTERVAL);
    }

    #[test]
    fn waits_for_delayed_reply() {
        let (mut modem, _, clock) = modem(&[Reply::Delayed(
            Duration::from_millis(2_500),
            "\r\n+CME ERROR: SIM not inserted\r\n",
        )]);
        let response = block_on(modem.execute(&request(Command::SimStatus, 5)));

        assert_eq!(
            response,
            CommandResponse::Failure(truncate("+CME ERROR: SIM not inserted"))
        );
        assert!(clock.elapsed() >= Duration::from_millis(2_500));
        assert!(clock.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn publish_prompt_is_a_complete_line() {
        let (mut modem, _, _) = modem(&[Reply::Raw("\r\n>")]);
        let command = Command::MqttPublish { topic: "t", len: 4 };
        let response = block_on(modem.execute(&request(command, 5).with_success(">")));

        assert_eq!(response, CommandResponse::Success(truncate(">")));
    }

    #[test]
    fn discards_stale_lines_before_next_command() {
        let (mut modem, _, _) = modem(&[
            Reply::Raw("\r\n+CGCONTRDP: 1,5,\"iot\",\"10.0.0.7\"\r\n\r\nOK\r\n"),
            Reply::Line("+CME ERROR: unknown"),
        ]);

        let first = block_on(modem.execute(&request(Command::ContextParameters, 5)));
        assert_eq!(first.line(), Some("+CGCONTRDP: 1,5,\"iot\",\"10.0.0.7\""));

        let second = block_on(modem.execute(&request(Command::SignalQuality, 5)));
        assert_eq!(
            second,
            CommandResponse::Failure(truncate("+CME ERROR: unknown"))
        );
    }

    #[test]
    fn raw_send_skips_command_framing() {
        let (mut modem, serial, _) = modem(&[Reply::Line("OK")]);
        let response = block_on(modem.send_raw(
            b"{Image End}",
            false,
            Duration::from_secs(10),
            "OK",
            "ERROR",
        ));

        assert!(response.is_success());
        assert_eq!(serial.written(), ["{Image End}"]);
    }

    #[test]
    fn partial_line_is_returned_at_deadline() {
        let (mut modem, _, _) = modem(&[Reply::Raw("+SMSTATE: 1")]);
        let response = block_on(modem.execute(&request(Command::Attention, 1)));

        assert_eq!(response, CommandResponse::Success(truncate("+SMSTATE: 1")));
    }
}
