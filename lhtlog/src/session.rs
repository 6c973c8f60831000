//! Interactive command session with one logger.
//!
//! A [`Session`] owns the channel for its whole lifetime. Every command goes
//! through the same exchange: stale input is discarded, the command line is
//! written, the reply is framed by inactivity timeout and pruned by
//! [`filter_response`].

use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::bulk::{BulkProgress, BulkRetriever};
use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::at::PASSWORD_TOKEN;
use crate::protocol::{AtCommand, compact_value, filter_response, frame};

/// Entries the firmware prints per second of inactivity allowance.
const ENTRIES_PER_SECOND: f64 = 400.0;

/// Lowest transmit power index (used while the logger sits on a desk).
const LOWEST_TX_POWER: u8 = 5;

/// Join mode for ABP.
const JOIN_MODE_ABP: u8 = 0;

/// Authentication state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No password has been accepted yet.
    Locked,
    /// The password handshake has completed.
    Unlocked,
}

/// Result of the password handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// The device confirmed the password with this line.
    Confirmed(String),
    /// The device stayed silent; it was already unlocked.
    AlreadyUnlocked,
}

/// Timing parameters of command exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    /// Inactivity timeout that ends a command response.
    pub command_timeout: Duration,
    /// Time to wait for the reply to a password.
    pub unlock_window: Duration,
    /// Pause after the password before any further command.
    pub unlock_settle: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_millis(100),
            unlock_window: Duration::from_millis(100),
            unlock_settle: Duration::from_millis(500),
        }
    }
}

/// Operator-facing output of a session.
///
/// All methods default to doing nothing; the CLI prints, tests record.
pub trait Echo {
    /// A command line is about to be sent.
    fn command_sent(&mut self, _command: &str) {}

    /// Filtered lines received for the last command.
    fn lines_received(&mut self, _lines: &[String]) {}

    /// The last command got no usable reply.
    fn no_response(&mut self) {}

    /// Compact value of a quiet exchange.
    fn inline_value(&mut self, _value: &str) {}

    /// The password handshake finished.
    fn unlocked(&mut self, _outcome: &UnlockOutcome) {}

    /// Diagnostic lines captured after a reboot.
    fn boot_banner(&mut self, _lines: &[String]) {}
}

/// Echo that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentEcho;

impl Echo for SilentEcho {}

/// Identity and configuration snapshot of a logger.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceStatus {
    /// Device address (`AT+DADDR`).
    pub address: String,
    /// Device EUI with spaces removed.
    pub eui: String,
    /// Report interval in milliseconds, when the answer was numeric.
    pub interval_ms: Option<u64>,
    /// Lines of one sensor reading.
    pub sensor_values: Vec<String>,
    /// Device clock as printed by the firmware.
    pub timestamp: String,
}

/// Command session over an exclusively owned channel.
pub struct Session<P: Port> {
    port: P,
    state: SessionState,
    timing: SessionTiming,
    echo: Box<dyn Echo>,
}

impl<P: Port> Session<P> {
    /// Start a locked session on an open channel.
    pub fn new(port: P) -> Self {
        Self {
            port,
            state: SessionState::Locked,
            timing: SessionTiming::default(),
            echo: Box::new(SilentEcho),
        }
    }

    /// Replace the timing parameters.
    #[must_use]
    pub fn with_timing(mut self, timing: SessionTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Replace the operator echo.
    #[must_use]
    pub fn with_echo(mut self, echo: Box<dyn Echo>) -> Self {
        self.echo = echo;
        self
    }

    /// Current authentication state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the password handshake has completed.
    pub fn is_unlocked(&self) -> bool {
        self.state == SessionState::Unlocked
    }

    pub(crate) fn mark_unlocked(&mut self) {
        self.state = SessionState::Unlocked;
    }

    /// Timing parameters in use.
    pub fn timing(&self) -> SessionTiming {
        self.timing
    }

    /// Borrow the channel.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Borrow the channel mutably.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub(crate) fn echo_mut(&mut self) -> &mut dyn Echo {
        self.echo.as_mut()
    }

    /// End the session and hand back the channel.
    pub fn into_port(self) -> P {
        self.port
    }

    /// End the session and close the channel.
    pub fn close(mut self) -> Result<()> {
        debug!("Closing session on {}", self.port.name());
        self.port.close()
    }

    fn transact(&mut self, command: &str, post_wait: Duration) -> Result<Vec<String>> {
        self.port.clear_input()?;
        self.port.write_line(command)?;
        debug!("Sent {command}");
        let lines = frame(&mut self.port, post_wait)?;
        Ok(filter_response(lines))
    }

    /// Send one command and collect its filtered reply.
    ///
    /// `post_wait` is the inactivity timeout ending the reply. In quiet mode
    /// the reply is echoed as one compact inline value instead of the
    /// command and its lines.
    pub fn exchange(
        &mut self,
        command: &AtCommand,
        post_wait: Duration,
        quiet: bool,
    ) -> Result<Vec<String>> {
        let text = command.to_string();
        if command.is_mutating() && !self.is_unlocked() {
            warn!("Sending {text} before the password handshake; the device may refuse it");
        }

        if !quiet {
            self.echo.command_sent(&text);
        }
        let lines = self.transact(&text, post_wait)?;

        if quiet {
            self.echo.inline_value(&compact_value(&lines));
        } else if lines.is_empty() {
            self.echo.no_response();
        } else {
            self.echo.lines_received(&lines);
        }
        Ok(lines)
    }

    /// Send a query and return its compact value without echoing.
    pub fn query(&mut self, command: &AtCommand, post_wait: Duration) -> Result<String> {
        let lines = self.transact(&command.to_string(), post_wait)?;
        Ok(compact_value(&lines))
    }

    /// Write one line without waiting for a reply.
    pub fn send_line(&mut self, line: &str) -> Result<()> {
        self.port.write_line(line)
    }

    /// Perform the password handshake.
    ///
    /// A reply containing the password token confirms the unlock; silence
    /// means the device was already unlocked. Either way the session waits
    /// the settle interval and ends up unlocked.
    pub fn unlock(&mut self, password: &str) -> Result<UnlockOutcome> {
        self.echo.command_sent(&"*".repeat(password.len()));
        self.port.clear_input()?;
        self.port.write_line(password)?;

        thread::sleep(self.timing.unlock_window);
        let lines = frame(&mut self.port, self.timing.unlock_window)?;
        let outcome = match lines.into_iter().find(|line| line.contains(PASSWORD_TOKEN)) {
            Some(line) => UnlockOutcome::Confirmed(line),
            None => UnlockOutcome::AlreadyUnlocked,
        };
        match &outcome {
            UnlockOutcome::Confirmed(line) => info!("Device unlocked: {line}"),
            UnlockOutcome::AlreadyUnlocked => info!("No password prompt, device already unlocked"),
        }
        self.echo.unlocked(&outcome);

        thread::sleep(self.timing.unlock_settle);
        self.state = SessionState::Unlocked;
        Ok(outcome)
    }

    /// Read the device address.
    pub fn device_address(&mut self) -> Result<String> {
        let address = self.query(&AtCommand::DeviceAddress, self.timing.command_timeout)?;
        let address = address.trim();
        if address.is_empty() {
            return Err(Error::Protocol("device did not report its address".to_string()));
        }
        Ok(address.to_string())
    }

    /// Read identity, report interval, one sensor reading and the clock.
    pub fn read_status(&mut self) -> Result<DeviceStatus> {
        let wait = self.timing.command_timeout;
        let address = self.device_address()?;
        let eui = self.query(&AtCommand::DeviceEui, wait)?.replace(' ', "");
        let interval = self.query(&AtCommand::ReportInterval, wait)?;
        let interval_ms = interval.trim().parse().ok();
        if interval_ms.is_none() {
            debug!("Non-numeric report interval: {interval:?}");
        }
        let sensor_values = self.transact(&AtCommand::SensorValue.to_string(), wait)?;
        let timestamp = self.query(&AtCommand::Timestamp, wait)?.trim().to_string();

        Ok(DeviceStatus {
            address,
            eui,
            interval_ms,
            sensor_values,
            timestamp,
        })
    }

    /// Sync the clock and set up the logger for desk use.
    ///
    /// Sets the clock to `now_unix`, the lowest transmit power, ABP join mode
    /// and a report interval of `interval_s` seconds.
    pub fn configure(&mut self, interval_s: u64, now_unix: u64) -> Result<()> {
        let wait = self.timing.command_timeout;
        for command in [
            AtCommand::SetTimestamp(now_unix),
            AtCommand::TransmitPower(LOWEST_TX_POWER),
            AtCommand::JoinMode(JOIN_MODE_ABP),
            AtCommand::SetReportInterval(interval_s.saturating_mul(1000)),
        ] {
            self.exchange(&command, wait, false)?;
        }
        Ok(())
    }

    /// Print the last `count` entries through a plain exchange.
    #[allow(clippy::cast_precision_loss)]
    pub fn show_entries(&mut self, count: usize) -> Result<Vec<String>> {
        let wait = Duration::from_secs_f64(count as f64 / ENTRIES_PER_SECOND)
            .max(self.timing.command_timeout);
        self.exchange(&AtCommand::PrintLastEntries(count), wait, false)
    }

    /// Print the first datalogger page and the last seven entries.
    pub fn overview(&mut self) -> Result<Vec<String>> {
        let wait = self.timing.command_timeout;
        let mut lines = self.exchange(&AtCommand::PrintPages(1, 1), wait, false)?;
        lines.extend(self.exchange(&AtCommand::PrintLastEntries(7), wait, false)?);
        Ok(lines)
    }

    /// Erase the datalogger.
    pub fn clear_datalogger(&mut self) -> Result<Vec<String>> {
        info!("Clearing datalogger");
        self.exchange(&AtCommand::ClearDatalogger, self.timing.command_timeout, false)
    }

    /// Bulk retriever borrowing this session's channel.
    pub fn bulk_retriever(&mut self) -> BulkRetriever<'_, P> {
        BulkRetriever::new(&mut self.port)
    }

    /// Stream the last `count` raw entries.
    pub fn retrieve_entries<F>(&mut self, count: usize, progress: F) -> Result<Vec<String>>
    where
        F: FnMut(BulkProgress),
    {
        self.bulk_retriever().retrieve(count, progress)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::port::mock::MockPort;

    const FAST: SessionTiming = SessionTiming {
        command_timeout: Duration::from_millis(30),
        unlock_window: Duration::from_millis(20),
        unlock_settle: Duration::from_millis(5),
    };

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }

        fn push(&self, event: String) {
            self.0.lock().unwrap().push(event);
        }
    }

    impl Echo for Recorder {
        fn command_sent(&mut self, command: &str) {
            self.push(format!("> {command}"));
        }

        fn lines_received(&mut self, lines: &[String]) {
            for line in lines {
                self.push(format!("< {line}"));
            }
        }

        fn no_response(&mut self) {
            self.push("no response".to_string());
        }

        fn inline_value(&mut self, value: &str) {
            self.push(format!("= {value}"));
        }

        fn unlocked(&mut self, outcome: &UnlockOutcome) {
            self.push(format!("{outcome:?}"));
        }
    }

    fn open_session(port: MockPort) -> (Session<MockPort>, Recorder) {
        let recorder = Recorder::default();
        let session = Session::new(port)
            .with_timing(FAST)
            .with_echo(Box::new(recorder.clone()));
        (session, recorder)
    }

    #[test]
    fn test_exchange_discards_stale_input_and_filters() {
        let port = MockPort::with_replies(&["1200000\r\nOK\r\n"]).with_stale("stale\r\nOK\r\n");
        let (mut session, echo) = open_session(port);

        let lines = session
            .exchange(&AtCommand::ReportInterval, FAST.command_timeout, false)
            .unwrap();

        assert_eq!(lines, vec!["1200000"]);
        assert_eq!(session.port().written_text(), "AT+TDC=?\r\n");
        assert_eq!(echo.events(), vec!["> AT+TDC=?", "< 1200000"]);
    }

    #[test]
    fn test_quiet_exchange_echoes_inline_value() {
        let port = MockPort::with_replies(&[" 70 B3 D5 7E\r\nOK\r\n"]);
        let (mut session, echo) = open_session(port);

        session
            .exchange(&AtCommand::DeviceEui, FAST.command_timeout, true)
            .unwrap();
        assert_eq!(echo.events(), vec!["= 70 B3 D5 7E"]);
    }

    #[test]
    fn test_exchange_without_reply_reports_no_response() {
        let (mut session, echo) = open_session(MockPort::silent());
        let lines = session
            .exchange(&AtCommand::from("AT+VER=?"), FAST.command_timeout, false)
            .unwrap();
        assert!(lines.is_empty());
        assert_eq!(echo.events(), vec!["> AT+VER=?", "no response"]);
    }

    #[test]
    fn test_exchange_returns_entry_line_for_parser() {
        let port = MockPort::with_replies(&[
            "0001 date=2024-01-01 time=10:00:00 var=1 bat=3.6 temp=21.5 hum=45 light=100\r\n",
        ]);
        let (mut session, _) = open_session(port);
        let lines = session
            .exchange(&AtCommand::PrintLastEntries(1), FAST.command_timeout, false)
            .unwrap();
        assert_eq!(lines.len(), 1);
        let entry = crate::entry::parse_entry(&lines[0]).unwrap();
        assert_eq!(
            entry.columns(),
            ["0001", "2024-01-01", "10:00:00", "1", "3.6", "21.5", "45", "100"]
        );
    }

    #[test]
    fn test_unlock_confirmed() {
        let port = MockPort::with_replies(&["Correct Password\r\n"]);
        let (mut session, echo) = open_session(port);
        assert_eq!(session.state(), SessionState::Locked);

        let outcome = session.unlock("123456").unwrap();

        assert_eq!(outcome, UnlockOutcome::Confirmed("Correct Password".to_string()));
        assert!(session.is_unlocked());
        assert_eq!(session.port().written_text(), "123456\r\n");
        assert_eq!(echo.events()[0], "> ******");
    }

    #[test]
    fn test_unlock_silence_means_already_unlocked() {
        let (mut session, _) = open_session(MockPort::silent());
        let outcome = session.unlock("123456").unwrap();
        assert_eq!(outcome, UnlockOutcome::AlreadyUnlocked);
        assert_eq!(session.state(), SessionState::Unlocked);
    }

    #[test]
    fn test_unlock_ignores_unrelated_reply() {
        let (mut session, _) = open_session(MockPort::with_replies(&["AT+ERROR\r\n"]));
        assert_eq!(session.unlock("000000").unwrap(), UnlockOutcome::AlreadyUnlocked);
    }

    #[test]
    fn test_device_address_trims_and_rejects_empty() {
        let (mut session, _) = open_session(MockPort::with_replies(&["26 0B 12 34\r\nOK\r\n"]));
        assert_eq!(session.device_address().unwrap(), "26 0B 12 34");

        let (mut session, _) = open_session(MockPort::silent());
        assert!(matches!(session.device_address(), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_read_status() {
        let port = MockPort::with_replies(&[
            "26 0B 12 34\r\nOK\r\n",
            " 70 B3 D5 7E D0 05 12 34\r\nOK\r\n",
            "1200000\r\nOK\r\n",
            "Bat:3.05 V\r\nTemp: 21.50\r\nOK\r\n",
            "1700000000\r\nOK\r\n",
        ]);
        let (mut session, _) = open_session(port);
        let status = session.read_status().unwrap();

        assert_eq!(status.address, "26 0B 12 34");
        assert_eq!(status.eui, "70B3D57ED0051234");
        assert_eq!(status.interval_ms, Some(1_200_000));
        assert_eq!(status.sensor_values, vec!["Bat:3.05 V", "Temp: 21.50"]);
        assert_eq!(status.timestamp, "1700000000");
    }

    #[test]
    fn test_configure_sends_commands_in_order() {
        let port = MockPort::with_replies(&["OK\r\n", "OK\r\n", "OK\r\n", "OK\r\n"]);
        let (mut session, echo) = open_session(port);
        session.mark_unlocked();
        session.configure(1200, 1_700_000_000).unwrap();

        assert_eq!(
            session.port().written_text(),
            "AT+TIMESTAMP=1700000000\r\nAT+TXP=5\r\nAT+NJM=0\r\nAT+TDC=1200000\r\n"
        );
        assert_eq!(echo.events().iter().filter(|e| *e == "< OK").count(), 4);
    }

    #[test]
    fn test_overview_sends_page_then_last_entries() {
        let port = MockPort::with_replies(&["page\r\n", "0001 x=1\r\n"]);
        let (mut session, _) = open_session(port);
        let lines = session.overview().unwrap();
        assert_eq!(lines, vec!["page", "0001 x=1"]);
        assert_eq!(session.port().written_text(), "AT+PDTA=1,1\r\nAT+PLDTA=7\r\n");
    }

    #[test]
    fn test_clear_and_show_entries() {
        let port = MockPort::with_replies(&["Clear all stored sensor data...\r\nOK\r\n", "0001 a=1\r\n"]);
        let (mut session, _) = open_session(port);
        session.mark_unlocked();
        assert_eq!(
            session.clear_datalogger().unwrap(),
            vec!["Clear all stored sensor data..."]
        );
        assert_eq!(session.show_entries(1).unwrap(), vec!["0001 a=1"]);
        assert_eq!(session.port().written_text(), "AT+CLRDTA\r\nAT+PLDTA=1\r\n");
    }

    #[test]
    fn test_retrieve_entries_through_session() {
        let port = MockPort::with_replies(&["0001 a=1\r\n0002 a=2\r\n"]);
        let (mut session, _) = open_session(port);
        let mut last = None;
        let lines = session.retrieve_entries(2, |p| last = Some(p)).unwrap();
        assert_eq!(lines, vec!["0001 a=1", "0002 a=2"]);
        assert_eq!(last.map(|p| p.captured), Some(2));
    }

    #[test]
    fn test_close_releases_channel() {
        let (session, _) = open_session(MockPort::silent());
        let port = {
            let mut port = session.into_port();
            port.close().unwrap();
            port
        };
        assert!(port.is_closed());
    }

    #[test]
    fn test_transport_error_propagates() {
        let (mut session, _) = open_session(MockPort::failing(std::io::ErrorKind::BrokenPipe));
        let err = session
            .exchange(&AtCommand::DeviceAddress, FAST.command_timeout, false)
            .unwrap_err();
        assert!(err.is_transport());
    }
}
