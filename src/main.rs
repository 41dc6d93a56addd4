use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use colored::Colorize;
use structopt::StructOpt;

use gps_l1ca_receiver::acquirer::Acquirer;
use gps_l1ca_receiver::antenna::FileAntenna;
#[cfg(unix)]
use gps_l1ca_receiver::antenna::RtlSdrAntenna;
use gps_l1ca_receiver::config::Options;
use gps_l1ca_receiver::error::ReceiverError;
use gps_l1ca_receiver::receiver::Receiver;
use gps_l1ca_receiver::telemetry;

fn main() {
    let opt = Options::from_args();

    let log_level = match opt.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let exit_req = Arc::new(AtomicBool::new(false));
    let handler_exit_req = exit_req.clone();
    ctrlc::set_handler(move || {
        log::info!("ctrl-c received, shutting down");
        handler_exit_req.store(true, Ordering::SeqCst);
    })
    .expect("failed to install ctrl-c handler");

    coredump::register_panic_handler().ok();

    let telemetry_sender = telemetry::start(opt.http_port);
    let mut receiver = Receiver::new(Acquirer::new_background(), telemetry_sender);

    let result = if opt.rtl_sdr {
        run_with_rtl_sdr(&opt, &mut receiver)
    } else {
        run_with_file(&opt, &mut receiver)
    };

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            log::error!("{}", format!("fatal: {e}").red());
            std::process::exit(1);
        }
    }
}

fn run_with_file(opt: &Options, receiver: &mut Receiver) -> Result<(), ReceiverError> {
    let path = opt
        .file
        .as_ref()
        .expect("--file is required unless --rtl-sdr is given");
    let start_timestamp = start_timestamp(opt.time);

    let mut antenna = FileAntenna::open(path, start_timestamp)
        .map_err(|e| ReceiverError::InvariantViolation(format!("failed to open {}: {e}", path.display())))?;

    receiver.run(&mut antenna)
}

#[cfg(unix)]
fn run_with_rtl_sdr(opt: &Options, receiver: &mut Receiver) -> Result<(), ReceiverError> {
    let mut antenna = RtlSdrAntenna::open(opt.gain, Utc::now())?;
    receiver.run(&mut antenna)
}

#[cfg(not(unix))]
fn run_with_rtl_sdr(_opt: &Options, _receiver: &mut Receiver) -> Result<(), ReceiverError> {
    Err(ReceiverError::InvariantViolation(
        "--rtl-sdr is only supported on Unix (rtlsdr_mt is Unix-only)".to_string(),
    ))
}

fn start_timestamp(time: Option<f64>) -> DateTime<Utc> {
    match time {
        Some(seconds) => {
            let whole = seconds.floor() as i64;
            let nanos = ((seconds - seconds.floor()) * 1e9) as u32;
            DateTime::<Utc>::from_timestamp(whole, nanos).expect("valid start timestamp")
        }
        None => Utc::now(),
    }
}
