//! Physical constants and fixed tunables called out explicitly in the design doc.
//!
//! Physical/geometric constants (speed of light, WGS-84 ellipsoid, GPS signal
//! parameters) are kept separate from the tuning knobs of individual loops so that the
//! latter can be told apart from values fixed by the ICD.

pub const PI: f64 = std::f64::consts::PI;

/// Speed of light in vacuum, m/s.
pub const SPEED_OF_LIGHT: f64 = 2.99792458e8;

/// GPS L1 carrier frequency, Hz.
pub const L1_FREQUENCY_HZ: f64 = 1_575_420_000.0;

/// Sampling rate of the baseband I/Q stream, Hz.
pub const SAMPLE_RATE_HZ: f64 = 2_046_000.0;

/// Complex samples per 1 ms block at `SAMPLE_RATE_HZ`.
pub const SAMPLES_PER_MS: usize = 2046;

/// Chips in one C/A PRN code period.
pub const PRN_CODE_LEN: usize = 1023;

/// Highest legal satellite id.
pub const NUM_GPS_SATS: usize = 32;

/// WGS-84 semi-major axis, meters.
pub const WGS84_A: f64 = 6_378_137.0;

/// WGS-84 semi-minor axis, meters.
pub const WGS84_B: f64 = 6_356_752.314245;

/// Earth's rotation rate used in the ECEF rotation, rad/s (IS-GPS-200 `Omega_e_dot`).
pub const OMEGA_E_DOT: f64 = 7.2921151467e-5;

/// Earth's gravitational constant, m^3/s^2 (IS-GPS-200 `mu`).
pub const MU: f64 = 3.986005e14;

/// Relativistic clock-correction coefficient `F` (IS-GPS-200 §20.3.3.3.3.1).
pub const RELATIVISTIC_F: f64 = -4.442807633e-10;

/// Seconds in one GPS week; TOW arithmetic wraps modulo this.
pub const SECONDS_PER_WEEK: f64 = 604_800.0;

/// Hard-coded UTC-to-GPS leap-second offset. See SPEC_FULL.md §9: any use past 2035
/// needs a configuration knob instead of this constant.
pub const LEAP_SECONDS: f64 = 18.0;

/// PRN codes transmitted per subframe (§4.6: a subframe is 6 s of 1 ms PRN periods).
pub const PRN_CODES_PER_SUBFRAME: i64 = 6000;

/// Bits in one subframe (10 words * 30 bits).
pub const BITS_PER_SUBFRAME: usize = 300;

/// Data bits in one subframe after parity bits are stripped (10 words * 24 bits).
pub const DATA_BITS_PER_SUBFRAME: usize = 240;

/// Bits per transmitted word, including its 6 parity bits.
pub const BITS_PER_WORD: usize = 30;

/// Data bits per word, excluding parity.
pub const DATA_BITS_PER_WORD: usize = 24;

/// Fixed TLM preamble, MSB first, in the resolved `0`/`1` domain.
pub const TLM_PREAMBLE: [u8; 8] = [1, 0, 0, 0, 1, 0, 1, 1];

/// Preamble as seen by the bit integrator before the 0/1 mapping is resolved
/// (`+1`/`-1` domain, §4.4).
pub const TLM_PREAMBLE_BIPOLAR: [i8; 8] = [1, -1, -1, -1, 1, -1, 1, 1];

// --- Acquirer tunables (§4.1) ---

/// Size of the Acquirer's rolling window of 1 ms blocks.
pub const ACQUISITION_WINDOW_BLOCKS: usize = 10;

/// Minimum time between acquisition attempts for the same untracked satellite.
pub const ACQUISITION_INTERVAL_SECONDS: f64 = 10.0;

/// Initial Doppler half-range of the hierarchical search, Hz.
pub const DOPPLER_SEARCH_HALF_RANGE_HZ: f64 = 7168.0;

/// Number of linearly-spaced Doppler shifts evaluated at each search iteration.
pub const DOPPLER_SEARCH_GRID_POINTS: usize = 29;

/// The search halves its half-range each iteration until it falls below this value.
pub const DOPPLER_SEARCH_MIN_HALF_RANGE_HZ: f64 = 14.0;

/// Minimum peak/mean ratio to report an acquisition.
pub const ACQUISITION_STRENGTH_THRESHOLD: f64 = 3.0;

// --- Tracker tunables (§4.2) ---

/// Ring-buffer depth for the tracker's telemetry histories.
pub const TRACKER_HISTORY_LEN: usize = 1000;

/// DLL code-phase loop gain.
pub const DLL_CODE_GAIN: f64 = 0.002;

/// Costas loop frequency gain.
pub const COSTAS_FREQUENCY_GAIN: f64 = 20.0;

/// Costas loop phase gain.
pub const COSTAS_PHASE_GAIN: f64 = 500.0;

/// Tracker step period, seconds (one 1 ms block).
pub const TRACKER_DT_SECONDS: f64 = 0.001;

// --- PseudosymbolIntegrator tunables (§4.3) ---

/// Pseudosymbols per UnresolvedBit.
pub const PSEUDOSYMBOLS_PER_BIT: usize = 20;

/// Minimum pseudosymbols of *each* phase buffered before boundary detection runs.
pub const PSEUDOSYMBOL_BOUNDARY_MIN_PER_PHASE: usize = 200;

// --- BitIntegrator tunables (§4.4) ---

/// UnresolvedBits buffered before subframe-alignment search begins.
pub const BIT_INTEGRATOR_MIN_BUFFERED: usize = 4 * BITS_PER_SUBFRAME;

// --- Receiver orchestration tunables (§4.7) ---

/// Bounded history of recent position fixes kept by the Receiver.
pub const SOLUTION_HISTORY_LEN: usize = 10;

/// Telemetry snapshot cadence.
pub const HTTP_UPDATE_INTERVAL_MS: u64 = 1000;

/// Default SDR analog gain.
pub const DEFAULT_SDR_GAIN: i32 = 20;

/// Default telemetry HTTP port.
pub const DEFAULT_HTTP_PORT: u16 = 8080;
