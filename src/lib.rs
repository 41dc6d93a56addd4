pub mod acquirer;
pub mod antenna;
pub mod bit_integrator;
pub mod config;
pub mod constants;
pub mod error;
pub mod gold_code;
pub mod pipeline;
pub mod pseudosymbol_integrator;
pub mod receiver;
pub mod ring;
pub mod subframe;
pub mod subframe_decoder;
pub mod telemetry;
pub mod tracker;
pub mod types;
pub mod util;
pub mod world;

#[cfg(unix)]
extern crate rtlsdr_mt;
