//! Spectrum wire message.
//!
//! ```text
//! {"center":[<center>],"span":[<span>],"s":[<p0>,<p1>,...,<pN-1>]}
//! ```
//!
//! Each power value is truncated toward zero to an integer. Clients parse
//! this exact layout, so it is written by hand rather than through serde.

use std::fmt::Write as _;

/// Encode one spectrum message.
pub fn encode_spectrum(center: f64, span: f64, powers: &[f32]) -> String {
    // Most values are 3 to 4 characters with their comma.
    let mut out = String::with_capacity(48 + powers.len() * 5);
    let _ = write!(out, "{{\"center\":[{center}],\"span\":[{span}],\"s\":[");
    for (i, p) in powers.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{}", *p as i32);
    }
    out.push_str("]}");
    out
}
