//! Command-line configuration (§6's CLI table), via `structopt` per the teacher.

use std::path::PathBuf;

use structopt::StructOpt;

use crate::constants::{DEFAULT_HTTP_PORT, DEFAULT_SDR_GAIN};

#[derive(StructOpt)]
#[structopt(name = "gps-l1ca-receiver", about = "software-defined GPS L1 C/A receiver")]
pub struct Options {
    /// Read baseband I/Q from this file instead of an SDR.
    #[structopt(short = "f", long = "file")]
    pub file: Option<PathBuf>,

    /// UNIX timestamp (UTC, float seconds) of the file's first sample.
    #[structopt(short = "t", long = "time")]
    pub time: Option<f64>,

    /// Read from an RTL-SDR dongle in real time instead of a file.
    #[structopt(long = "rtl-sdr")]
    pub rtl_sdr: bool,

    /// SDR analog gain.
    #[structopt(short = "g", long = "gain", default_value = "20")]
    pub gain: i32,

    /// Telemetry HTTP port; 0 disables the server.
    #[structopt(long = "http-port", default_value = "8080")]
    pub http_port: u16,

    /// Raise log verbosity; repeatable.
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    pub verbose: u8,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            file: None,
            time: None,
            rtl_sdr: false,
            gain: DEFAULT_SDR_GAIN,
            http_port: DEFAULT_HTTP_PORT,
            verbose: 0,
        }
    }
}
