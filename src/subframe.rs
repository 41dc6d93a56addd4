//! Subframe data model (§3): a tagged sum with exhaustive matching, replacing the
//! runtime type-tests (and the "unexpected subframe" catch-all arm) that a dynamically
//! typed port of this system would otherwise need (§9).

/// `{tow_count_msbs: 17 bits, subframe_id: 1..5}`, present on every subframe.
#[derive(Debug, Clone, Copy)]
pub struct Handover {
    pub tow_count_msbs: u32,
    pub subframe_id: u8,
}

#[derive(Debug, Clone, Copy)]
pub enum Subframe {
    Sf1 {
        handover: Handover,
        sv_health: u8,
        t_gd: f64,
        t_oc: f64,
        a_f2: f64,
        a_f1: f64,
        a_f0: f64,
    },
    Sf2 {
        handover: Handover,
        c_rs: f64,
        delta_n: f64,
        m_0: f64,
        c_uc: f64,
        e: f64,
        c_us: f64,
        sqrt_a: f64,
        t_oe: f64,
    },
    Sf3 {
        handover: Handover,
        c_ic: f64,
        omega_0: f64,
        c_is: f64,
        i_0: f64,
        c_rc: f64,
        omega: f64,
        omega_dot: f64,
        i_dot: f64,
    },
    Sf4 {
        handover: Handover,
    },
    Sf5 {
        handover: Handover,
    },
}

impl Subframe {
    pub fn handover(&self) -> &Handover {
        match self {
            Subframe::Sf1 { handover, .. }
            | Subframe::Sf2 { handover, .. }
            | Subframe::Sf3 { handover, .. }
            | Subframe::Sf4 { handover }
            | Subframe::Sf5 { handover } => handover,
        }
    }
}
