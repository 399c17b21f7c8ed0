// Copyright 2026 the Orogeny Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Easing curves for [`Transitionable`](crate::transition::Transitionable)
//! blending.
//!
//! Every curve maps `[0, 1]` onto `[0, 1]` with `f(0) == 0` and `f(1) == 1`.

/// An easing curve.
pub type Easing = fn(f64) -> f64;

/// No easing.
#[must_use]
pub fn linear(t: f64) -> f64 {
    t
}

/// Cubic ease-in.
#[must_use]
pub fn ease_in(t: f64) -> f64 {
    t * t * t
}

/// Cubic ease-out.
#[must_use]
pub fn ease_out(t: f64) -> f64 {
    let u = 1.0 - t;
    1.0 - u * u * u
}

/// Cubic ease-in-out.
#[must_use]
pub fn ease_in_out(t: f64) -> f64 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        let u = -2.0 * t + 2.0;
        1.0 - u * u * u / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curves_hit_their_endpoints() {
        for (name, f) in [
            ("linear", linear as Easing),
            ("ease_in", ease_in),
            ("ease_out", ease_out),
            ("ease_in_out", ease_in_out),
        ] {
            assert_eq!(f(0.0), 0.0, "{name}(0)");
            assert_eq!(f(1.0), 1.0, "{name}(1)");
        }
        assert_eq!(ease_in_out(0.5), 0.5, "symmetric midpoint");
    }
}
