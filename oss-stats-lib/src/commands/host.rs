use chrono::{DateTime, Utc};
use std::io::Write;

/// The process environment a command runs in: its output streams, its exit and its clock.
pub trait Host: Send + Sync {
    /// Where command results go (stdout for a real process).
    fn output(&mut self) -> impl Write;

    /// Where diagnostics go (stderr for a real process).
    fn error(&mut self) -> impl Write;

    /// Terminate with `code`. A test host records the code and returns.
    fn exit(&mut self, code: i32);

    /// The instant freshness and staleness are judged against.
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Host that captures output in memory and can pin the clock
#[cfg(test)]
#[derive(Debug, Default)]
pub struct TestHost {
    pub output_buf: Vec<u8>,
    pub error_buf: Vec<u8>,
    pub exit_code: Option<i32>,
    pub pinned_now: Option<DateTime<Utc>>,
}

#[cfg(test)]
impl TestHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output_buf).into_owned()
    }

    pub fn error_text(&self) -> String {
        String::from_utf8_lossy(&self.error_buf).into_owned()
    }
}

#[cfg(test)]
impl Host for TestHost {
    fn output(&mut self) -> impl Write {
        &mut self.output_buf
    }

    fn error(&mut self) -> impl Write {
        &mut self.error_buf
    }

    fn exit(&mut self, code: i32) {
        self.exit_code = Some(code);
    }

    fn now(&self) -> DateTime<Utc> {
        self.pinned_now.unwrap_or_else(Utc::now)
    }
}
