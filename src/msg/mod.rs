//! Wire payloads. Field names are contractual: the browser spectator and
//! the agent SDKs read them as-is. Positions are rounded to two decimals
//! and angles (degrees on the wire) to one.

pub mod api;
pub mod events;

/// Round a world coordinate for broadcast.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Round a wire angle (degrees) for broadcast.
pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
