//! Keep npm, GitHub and feed statistics for an open-source org fresh and cheap to serve.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use oss_stats_lib::{Host, run};
use std::io::{Write, stderr, stdout};
use std::process::ExitCode;

/// Host backed by the process's standard streams and wall clock.
#[derive(Debug, Clone, Copy, Default)]
struct ProcessHost;

#[cfg_attr(coverage_nightly, coverage(off))]
impl Host for ProcessHost {
    fn output(&mut self) -> impl Write {
        stdout().lock()
    }

    fn error(&mut self) -> impl Write {
        stderr().lock()
    }

    fn exit(&mut self, code: i32) {
        std::process::exit(code);
    }
}

#[tokio::main]
#[cfg_attr(coverage_nightly, coverage(off))]
async fn main() -> ExitCode {
    let mut host = ProcessHost;
    match run(&mut host, std::env::args_os()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let _ = writeln!(host.error(), "error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
