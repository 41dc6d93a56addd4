//! Ephemeris assembly and the navigation solve (§4.6): turns decoded subframes plus
//! PRN-edge reports from the trackers into satellite ECEF positions, signal transit
//! times, and a Gauss–Newton position fix.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::constants::{
    MU, OMEGA_E_DOT, PI, PRN_CODES_PER_SUBFRAME, RELATIVISTIC_F, SECONDS_PER_WEEK,
    SPEED_OF_LIGHT, WGS84_A, WGS84_B,
};
use crate::subframe::Subframe;
use crate::tracker::PrnEdgeReport;
use crate::types::{SatelliteId, Side};
use crate::util::wrap_week_seconds;

/// Accumulates subframes 1-3 for a satellite that hasn't yet been fully assembled.
#[derive(Default)]
struct Pending {
    sf1: Option<Sf1Fields>,
    sf2: Option<Sf2Fields>,
    sf3: Option<Sf3Fields>,
    side: Option<Side>,
    trailing_edge_timestamp: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy)]
struct Sf1Fields {
    sv_health: u8,
    t_gd: f64,
    t_oc: f64,
    a_f0: f64,
    a_f1: f64,
    a_f2: f64,
}

#[derive(Clone, Copy)]
struct Sf2Fields {
    c_rs: f64,
    delta_n: f64,
    m_0: f64,
    c_uc: f64,
    e: f64,
    c_us: f64,
    sqrt_a: f64,
    t_oe: f64,
}

#[derive(Clone, Copy)]
struct Sf3Fields {
    c_ic: f64,
    omega_0: f64,
    c_is: f64,
    i_0: f64,
    c_rc: f64,
    omega: f64,
    omega_dot: f64,
    i_dot: f64,
}

/// A fully assembled satellite's broadcast ephemeris plus the receiver-local timing
/// state needed to compute its position and signal transit time (§4.6).
#[derive(Clone, Copy)]
pub struct SatelliteParameters {
    sv_health: u8,
    t_gd: f64,
    t_oc: f64,
    a_f0: f64,
    a_f1: f64,
    a_f2: f64,
    c_rs: f64,
    delta_n: f64,
    m_0: f64,
    c_uc: f64,
    e: f64,
    c_us: f64,
    sqrt_a: f64,
    t_oe: f64,
    c_ic: f64,
    omega_0: f64,
    c_is: f64,
    i_0: f64,
    c_rc: f64,
    omega: f64,
    omega_dot: f64,
    i_dot: f64,

    tow_count: i64,
    prn_count: i64,
    side: Side,
    trailing_edge_timestamp: DateTime<Utc>,
}

impl SatelliteParameters {
    /// `sv_health[0] == 0`: the MSB of the 6-bit health word clear means healthy.
    fn is_healthy(&self) -> bool {
        self.sv_health & 0b100000 == 0
    }
}

enum Entry {
    Pending(Pending),
    Promoted(SatelliteParameters),
}

/// One satellite's ECEF position and signal transit time, ready for the solver.
pub struct SatelliteObservation {
    pub satellite_id: SatelliteId,
    pub ecef: [f64; 3],
    pub transit_time_seconds: f64,
}

/// A resolved position fix before ECEF→geodetic conversion.
#[derive(Debug, Clone, Copy)]
pub struct Fix {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub clock_bias_seconds: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct GeodeticPosition {
    pub latitude_radians: f64,
    pub longitude_radians: f64,
    pub altitude_meters: f64,
}

#[derive(Default)]
pub struct World {
    satellites: HashMap<SatelliteId, Entry>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all state for a satellite whose pipeline was torn down (§4.7 step 2).
    pub fn remove(&mut self, satellite_id: SatelliteId) {
        self.satellites.remove(&satellite_id);
    }

    /// Whether `satellite_id` has received all of Sf1+Sf2+Sf3 and been promoted to a
    /// full `SatelliteParameters` (§4.6, §6 telemetry's `required_subframes_received`).
    pub fn is_promoted(&self, satellite_id: SatelliteId) -> bool {
        matches!(self.satellites.get(&satellite_id), Some(Entry::Promoted(_)))
    }

    /// Applies one ms's PRN-edge report from the Tracker (§4.2 step 4, §4.6).
    pub fn handle_edge(&mut self, report: &PrnEdgeReport) {
        let entry = self
            .satellites
            .entry(report.satellite_id)
            .or_insert_with(|| Entry::Pending(Pending::default()));
        match entry {
            Entry::Pending(pending) => {
                pending.side = Some(report.side);
                pending.trailing_edge_timestamp = Some(report.trailing_edge_timestamp);
            }
            Entry::Promoted(params) => {
                params.prn_count += report.prn_count_delta;
                params.side = report.side;
                params.trailing_edge_timestamp = report.trailing_edge_timestamp;
            }
        }
    }

    /// Applies a freshly decoded subframe (§4.5, §4.6).
    pub fn handle_subframe(&mut self, satellite_id: SatelliteId, subframe: &Subframe) {
        let entry = self
            .satellites
            .entry(satellite_id)
            .or_insert_with(|| Entry::Pending(Pending::default()));

        match entry {
            Entry::Pending(pending) => {
                match subframe {
                    Subframe::Sf1 {
                        sv_health,
                        t_gd,
                        t_oc,
                        a_f2,
                        a_f1,
                        a_f0,
                        ..
                    } => {
                        pending.sf1 = Some(Sf1Fields {
                            sv_health: *sv_health,
                            t_gd: *t_gd,
                            t_oc: *t_oc,
                            a_f0: *a_f0,
                            a_f1: *a_f1,
                            a_f2: *a_f2,
                        });
                    }
                    Subframe::Sf2 {
                        c_rs,
                        delta_n,
                        m_0,
                        c_uc,
                        e,
                        c_us,
                        sqrt_a,
                        t_oe,
                        ..
                    } => {
                        pending.sf2 = Some(Sf2Fields {
                            c_rs: *c_rs,
                            delta_n: *delta_n * PI,
                            m_0: *m_0 * PI,
                            c_uc: *c_uc,
                            e: *e,
                            c_us: *c_us,
                            sqrt_a: *sqrt_a,
                            t_oe: *t_oe,
                        });
                    }
                    Subframe::Sf3 {
                        c_ic,
                        omega_0,
                        c_is,
                        i_0,
                        c_rc,
                        omega,
                        omega_dot,
                        i_dot,
                        ..
                    } => {
                        pending.sf3 = Some(Sf3Fields {
                            c_ic: *c_ic,
                            omega_0: *omega_0 * PI,
                            c_is: *c_is,
                            i_0: *i_0 * PI,
                            c_rc: *c_rc,
                            omega: *omega * PI,
                            omega_dot: *omega_dot * PI,
                            i_dot: *i_dot * PI,
                        });
                    }
                    Subframe::Sf4 { .. } | Subframe::Sf5 { .. } => {}
                }

                let tow_count = tow_count_from_msbs(subframe.handover().tow_count_msbs);

                if let (Some(sf1), Some(sf2), Some(sf3), Some(side)) =
                    (pending.sf1, pending.sf2, pending.sf3, pending.side)
                {
                    let prn_count = match side {
                        Side::Right => -1,
                        Side::Left => 0,
                    };
                    let trailing_edge_timestamp = pending
                        .trailing_edge_timestamp
                        .expect("side observed implies a trailing-edge timestamp was recorded");
                    *entry = Entry::Promoted(SatelliteParameters {
                        sv_health: sf1.sv_health,
                        t_gd: sf1.t_gd,
                        t_oc: sf1.t_oc,
                        a_f0: sf1.a_f0,
                        a_f1: sf1.a_f1,
                        a_f2: sf1.a_f2,
                        c_rs: sf2.c_rs,
                        delta_n: sf2.delta_n,
                        m_0: sf2.m_0,
                        c_uc: sf2.c_uc,
                        e: sf2.e,
                        c_us: sf2.c_us,
                        sqrt_a: sf2.sqrt_a,
                        t_oe: sf2.t_oe,
                        c_ic: sf3.c_ic,
                        omega_0: sf3.omega_0,
                        c_is: sf3.c_is,
                        i_0: sf3.i_0,
                        c_rc: sf3.c_rc,
                        omega: sf3.omega,
                        omega_dot: sf3.omega_dot,
                        i_dot: sf3.i_dot,
                        tow_count,
                        prn_count,
                        side,
                        trailing_edge_timestamp,
                    });
                }
            }
            Entry::Promoted(params) => {
                params.tow_count = tow_count_from_msbs(subframe.handover().tow_count_msbs);
                params.prn_count -= PRN_CODES_PER_SUBFRAME;

                match subframe {
                    Subframe::Sf1 {
                        sv_health,
                        t_gd,
                        t_oc,
                        a_f2,
                        a_f1,
                        a_f0,
                        ..
                    } => {
                        params.sv_health = *sv_health;
                        params.t_gd = *t_gd;
                        params.t_oc = *t_oc;
                        params.a_f0 = *a_f0;
                        params.a_f1 = *a_f1;
                        params.a_f2 = *a_f2;
                    }
                    Subframe::Sf2 {
                        c_rs,
                        delta_n,
                        m_0,
                        c_uc,
                        e,
                        c_us,
                        sqrt_a,
                        t_oe,
                        ..
                    } => {
                        params.c_rs = *c_rs;
                        params.delta_n = *delta_n * PI;
                        params.m_0 = *m_0 * PI;
                        params.c_uc = *c_uc;
                        params.e = *e;
                        params.c_us = *c_us;
                        params.sqrt_a = *sqrt_a;
                        params.t_oe = *t_oe;
                    }
                    Subframe::Sf3 {
                        c_ic,
                        omega_0,
                        c_is,
                        i_0,
                        c_rc,
                        omega,
                        omega_dot,
                        i_dot,
                        ..
                    } => {
                        params.c_ic = *c_ic;
                        params.omega_0 = *omega_0 * PI;
                        params.c_is = *c_is;
                        params.i_0 = *i_0 * PI;
                        params.c_rc = *c_rc;
                        params.omega = *omega * PI;
                        params.omega_dot = *omega_dot * PI;
                        params.i_dot = *i_dot * PI;
                    }
                    Subframe::Sf4 { .. } | Subframe::Sf5 { .. } => {}
                }
            }
        }
    }

    /// Computes the ECEF position and signal transit time for every promoted,
    /// healthy satellite (§4.6).
    pub fn observations(&self) -> Vec<SatelliteObservation> {
        self.satellites
            .iter()
            .filter_map(|(&satellite_id, entry)| match entry {
                Entry::Promoted(params) if params.is_healthy() => {
                    Some(satellite_position(satellite_id, params))
                }
                _ => None,
            })
            .collect()
    }

    /// Runs the Gauss–Newton solve (§4.6). Returns `None` ("no fix") if fewer than 4
    /// healthy satellites are available.
    pub fn solve(&self) -> Option<Fix> {
        let observations = self.observations();
        gauss_newton_solve(&observations)
    }
}

fn tow_count_from_msbs(tow_count_msbs: u32) -> i64 {
    tow_count_msbs as i64
}

/// Eccentric-anomaly Kepler iteration, at least 3 steps (§4.6).
fn eccentric_anomaly(m_k: f64, e: f64) -> f64 {
    let mut ek = m_k;
    for _ in 0..8 {
        ek += (m_k - ek + e * ek.sin()) / (1.0 - e * ek.cos());
    }
    ek
}

/// Satellite ECEF position and signal transit time per IS-GPS-200 §20.3.3 /
/// §20.3.3.3.3 (§4.6).
fn satellite_position(satellite_id: SatelliteId, p: &SatelliteParameters) -> SatelliteObservation {
    let a = p.sqrt_a * p.sqrt_a;
    let t_sv = 6.0 * p.tow_count as f64 + 0.001 * p.prn_count as f64;

    let n0 = (MU / (a * a * a)).sqrt();
    let n = n0 + p.delta_n;
    let m_k = p.m_0 + n * wrap_week_seconds(t_sv - p.t_oe);
    let e_k = eccentric_anomaly(m_k, p.e);

    let delta_t = wrap_week_seconds(t_sv - p.t_oc);
    let clock_correction =
        p.a_f0 + p.a_f1 * delta_t + p.a_f2 * delta_t * delta_t + RELATIVISTIC_F * p.e * p.sqrt_a * e_k.sin()
            - p.t_gd;

    let t = t_sv - clock_correction;
    let t_k = wrap_week_seconds(t - p.t_oe);

    let nu_k = 2.0 * (((1.0 + p.e) / (1.0 - p.e)).sqrt() * (e_k / 2.0).tan()).atan();
    let phi_k = nu_k + p.omega;
    let sin_2phi = (2.0 * phi_k).sin();
    let cos_2phi = (2.0 * phi_k).cos();

    let delta_u = p.c_us * sin_2phi + p.c_uc * cos_2phi;
    let delta_r = p.c_rs * sin_2phi + p.c_rc * cos_2phi;
    let delta_i = p.c_is * sin_2phi + p.c_ic * cos_2phi;

    let u_k = phi_k + delta_u;
    let r_k = a * (1.0 - p.e * e_k.cos()) + delta_r;
    let i_k = p.i_0 + delta_i + p.i_dot * t_k;

    let x_prime = r_k * u_k.cos();
    let y_prime = r_k * u_k.sin();

    let omega_k = p.omega_0 + (p.omega_dot - OMEGA_E_DOT) * t_k - OMEGA_E_DOT * p.t_oe;

    let x = x_prime * omega_k.cos() - y_prime * i_k.cos() * omega_k.sin();
    let y = x_prime * omega_k.sin() + y_prime * i_k.cos() * omega_k.cos();
    let z = y_prime * i_k.sin();

    let gps_seconds_of_week = {
        let seconds_since_epoch = p.trailing_edge_timestamp.timestamp() as f64
            + p.trailing_edge_timestamp.timestamp_subsec_nanos() as f64 * 1e-9;
        (seconds_since_epoch + crate::constants::LEAP_SECONDS).rem_euclid(SECONDS_PER_WEEK)
    };
    let transit_time_seconds = wrap_week_seconds(gps_seconds_of_week - t);

    SatelliteObservation {
        satellite_id,
        ecef: [x, y, z],
        transit_time_seconds,
    }
}

/// Gauss–Newton position solve (§4.6): 10 fixed iterations, hand-rolled 4x4 linear
/// solve with partial pivoting rather than a general linear-algebra crate, since the
/// system size is fixed and the point of this system is the arithmetic itself.
fn gauss_newton_solve(observations: &[SatelliteObservation]) -> Option<Fix> {
    if observations.len() < 4 {
        return None;
    }

    let mut g = [0.0f64; 4]; // x, y, z, clock bias (seconds)

    for _ in 0..10 {
        let mut jt_j = [[0.0f64; 4]; 4];
        let mut jt_r = [0.0f64; 4];

        for obs in observations {
            let dx = obs.ecef[0] - g[0];
            let dy = obs.ecef[1] - g[1];
            let dz = obs.ecef[2] - g[2];
            let range = (dx * dx + dy * dy + dz * dz).sqrt();
            if range == 0.0 {
                continue;
            }

            let residual = range - SPEED_OF_LIGHT * (obs.transit_time_seconds - g[3]);
            let row = [-dx / range, -dy / range, -dz / range, SPEED_OF_LIGHT];

            for i in 0..4 {
                jt_r[i] += row[i] * residual;
                for j in 0..4 {
                    jt_j[i][j] += row[i] * row[j];
                }
            }
        }

        let delta = solve_4x4(jt_j, jt_r)?;
        for i in 0..4 {
            g[i] -= delta[i];
        }
    }

    Some(Fix {
        x: g[0],
        y: g[1],
        z: g[2],
        clock_bias_seconds: g[3],
    })
}

/// Gaussian elimination with partial pivoting for a 4x4 system.
fn solve_4x4(mut a: [[f64; 4]; 4], mut b: [f64; 4]) -> Option<[f64; 4]> {
    const N: usize = 4;

    for col in 0..N {
        let pivot_row = (col..N).max_by(|&i, &j| {
            a[i][col].abs().partial_cmp(&a[j][col].abs()).unwrap()
        })?;
        if a[pivot_row][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in (col + 1)..N {
            let factor = a[row][col] / a[col][col];
            for k in col..N {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0f64; N];
    for row in (0..N).rev() {
        let mut sum = b[row];
        for k in (row + 1)..N {
            sum -= a[row][k] * x[k];
        }
        x[row] = sum / a[row][row];
    }
    Some(x)
}

/// ECEF→geodetic (WGS-84) via Bowring's iterative method, 5 iterations (§4.6).
pub fn ecef_to_geodetic(x: f64, y: f64, z: f64) -> GeodeticPosition {
    let a = WGS84_A;
    let b = WGS84_B;
    let e2 = 1.0 - (b * b) / (a * a);
    let ep2 = (a * a) / (b * b) - 1.0;

    let p = (x * x + y * y).sqrt();
    let longitude = y.atan2(x);

    let mut beta = (z * a).atan2(p * b);
    let mut latitude = beta;
    for _ in 0..5 {
        let sin_beta = beta.sin();
        let cos_beta = beta.cos();
        latitude = (z + ep2 * b * sin_beta.powi(3)).atan2(p - e2 * a * cos_beta.powi(3));
        beta = (b * latitude.tan()).atan2(a);
    }

    let sin_lat = latitude.sin();
    let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let altitude = if latitude.cos().abs() > 1e-12 {
        p / latitude.cos() - n
    } else {
        z / sin_lat - n * (1.0 - e2)
    };

    GeodeticPosition {
        latitude_radians: latitude,
        longitude_radians: longitude,
        altitude_meters: altitude,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// A point on the WGS-84 ellipsoid at the equator, on the prime meridian.
    #[test]
    fn ecef_to_geodetic_round_trips_equatorial_point() {
        let pos = ecef_to_geodetic(WGS84_A, 0.0, 0.0);
        assert_relative_eq!(pos.latitude_radians, 0.0, epsilon = 1e-9);
        assert_relative_eq!(pos.longitude_radians, 0.0, epsilon = 1e-9);
        assert_relative_eq!(pos.altitude_meters, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn ecef_to_geodetic_round_trips_mid_latitude_point() {
        let lat = 45.0f64.to_radians();
        let lon = -122.0f64.to_radians();
        let alt = 150.0;

        let e2 = 1.0 - (WGS84_B * WGS84_B) / (WGS84_A * WGS84_A);
        let n = WGS84_A / (1.0 - e2 * lat.sin().powi(2)).sqrt();
        let x = (n + alt) * lat.cos() * lon.cos();
        let y = (n + alt) * lat.cos() * lon.sin();
        let z = (n * (1.0 - e2) + alt) * lat.sin();

        let pos = ecef_to_geodetic(x, y, z);
        assert_relative_eq!(pos.latitude_radians, lat, epsilon = 1e-6);
        assert_relative_eq!(pos.longitude_radians, lon, epsilon = 1e-6);
        assert_relative_eq!(pos.altitude_meters, alt, epsilon = 1e-3);
    }

    #[test]
    fn solver_returns_no_fix_with_fewer_than_four_satellites() {
        let observations = vec![
            SatelliteObservation {
                satellite_id: 1,
                ecef: [WGS84_A, 0.0, 0.0],
                transit_time_seconds: 0.07,
            },
            SatelliteObservation {
                satellite_id: 2,
                ecef: [0.0, WGS84_A, 0.0],
                transit_time_seconds: 0.07,
            },
            SatelliteObservation {
                satellite_id: 3,
                ecef: [0.0, 0.0, WGS84_A],
                transit_time_seconds: 0.07,
            },
        ];
        assert!(gauss_newton_solve(&observations).is_none());
    }

    #[test]
    fn solver_converges_on_synthetic_exact_ranges() {
        let truth = (1_000_000.0, 2_000_000.0, 3_000_000.0, 0.0003);
        let sat_positions = [
            [20_000_000.0, 0.0, 10_000_000.0],
            [0.0, 20_000_000.0, -10_000_000.0],
            [-20_000_000.0, 0.0, 10_000_000.0],
            [0.0, -20_000_000.0, -10_000_000.0],
            [15_000_000.0, 15_000_000.0, 15_000_000.0],
        ];
        let observations: Vec<SatelliteObservation> = sat_positions
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let dx = p[0] - truth.0;
                let dy = p[1] - truth.1;
                let dz = p[2] - truth.2;
                let range = (dx * dx + dy * dy + dz * dz).sqrt();
                let transit_time_seconds = range / SPEED_OF_LIGHT + truth.3;
                SatelliteObservation {
                    satellite_id: i as SatelliteId + 1,
                    ecef: p,
                    transit_time_seconds,
                }
            })
            .collect();

        let fix = gauss_newton_solve(&observations).expect("enough satellites for a fix");
        assert_relative_eq!(fix.x, truth.0, epsilon = 1.0);
        assert_relative_eq!(fix.y, truth.1, epsilon = 1.0);
        assert_relative_eq!(fix.z, truth.2, epsilon = 1.0);
        assert_relative_eq!(fix.clock_bias_seconds, truth.3, epsilon = 1e-6);
    }
}
