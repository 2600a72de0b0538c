use crate::error::ModelError;
use crate::traits::{constant, DynamicalSystem, Scalar, Steppable};
use log::debug;
use serde::{Deserialize, Serialize};

/// Classical fourth-order Runge-Kutta stepper.
///
/// Every stage is built from the full state at the start of the step; stage
/// buffers are allocated once per stepper and reused.
pub struct RK4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            tmp: vec![z; dim],
        }
    }
}

/// `out = y + scale·k`, the input state of the next stage.
fn offset<T: Scalar>(out: &mut [T], y: &[T], k: &[T], scale: T) {
    for ((o, &yi), &ki) in out.iter_mut().zip(y).zip(k) {
        *o = yi + scale * ki;
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let half_dt = dt * constant::<T>(0.5);
        let two = constant::<T>(2.0);
        let weight = dt * constant::<T>(1.0 / 6.0);
        let t0 = *t;

        system.apply(t0, state, &mut self.k1);
        offset(&mut self.tmp, state, &self.k1, half_dt);
        system.apply(t0 + half_dt, &self.tmp, &mut self.k2);
        offset(&mut self.tmp, state, &self.k2, half_dt);
        system.apply(t0 + half_dt, &self.tmp, &mut self.k3);
        offset(&mut self.tmp, state, &self.k3, dt);
        system.apply(t0 + dt, &self.tmp, &mut self.k4);

        for (i, y) in state.iter_mut().enumerate() {
            *y = *y + weight * (self.k1[i] + two * (self.k2[i] + self.k3[i]) + self.k4[i]);
        }
        *t = t0 + dt;
    }
}

// Tsitouras (2011) 5(4) tableau.
const C2: f64 = 0.161;
const C3: f64 = 0.327;
const C4: f64 = 0.9;
const C5: f64 = 0.9800255409045097;

const A21: f64 = 0.161;
const A31: f64 = -0.008480655492356989;
const A32: f64 = 0.335480655492357;
const A41: f64 = 2.897153057105493;
const A42: f64 = -6.359448489975075;
const A43: f64 = 4.3622954328695815;
const A51: f64 = 5.325864828439257;
const A52: f64 = -11.748883564062828;
const A53: f64 = 7.4955393428898365;
const A54: f64 = -0.09249506636175525;
const A61: f64 = 5.86145544294642;
const A62: f64 = -12.92096931784711;
const A63: f64 = 8.159367898576159;
const A64: f64 = -0.071584973281401;
const A65: f64 = -0.028269050394068383;

// 5th-order weights (also the last row of A, so the method is FSAL).
const B1: f64 = 0.09646076681806523;
const B2: f64 = 0.01;
const B3: f64 = 0.4798896504144996;
const B4: f64 = 1.379008574103742;
const B5: f64 = -3.290069515436081;
const B6: f64 = 2.324710524099774;

// b − b̂: 5th-order weights minus the embedded 4th-order ones (b̂7 pairs with the FSAL stage).
const E1: f64 = -0.00178001105222577714;
const E2: f64 = -0.0008164344596567469;
const E3: f64 = 0.007880878010261995;
const E4: f64 = -0.1447110071732629;
const E5: f64 = 0.5823571654525552;
const E6: f64 = -0.45808210592918697;
const E7: f64 = 0.015151515151515152;

/// Stage storage for one Tsitouras 5(4) step with embedded error estimate.
///
/// Only driven through [`Tsit5::attempt`] by [`integrate_adaptive`].
pub struct Tsit5 {
    k1: Vec<f64>,
    k2: Vec<f64>,
    k3: Vec<f64>,
    k4: Vec<f64>,
    k5: Vec<f64>,
    k6: Vec<f64>,
    k7: Vec<f64>,
    tmp: Vec<f64>,
}

impl Tsit5 {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: vec![0.0; dim],
            k2: vec![0.0; dim],
            k3: vec![0.0; dim],
            k4: vec![0.0; dim],
            k5: vec![0.0; dim],
            k6: vec![0.0; dim],
            k7: vec![0.0; dim],
            tmp: vec![0.0; dim],
        }
    }

    /// Computes a candidate step from `(t, y)` into `y_next` and returns the
    /// scaled RMS error estimate (accept when `<= 1`).
    ///
    /// `self.k1` must already hold `f(t, y)`. On return `self.k7` holds
    /// `f(t + dt, y_next)`, which becomes the next `k1` if the step is accepted.
    #[allow(clippy::too_many_arguments)]
    pub fn attempt(
        &mut self,
        system: &impl DynamicalSystem<f64>,
        t: f64,
        y: &[f64],
        dt: f64,
        y_next: &mut [f64],
        rtol: f64,
        atol: f64,
    ) -> f64 {
        let n = y.len();

        for i in 0..n {
            self.tmp[i] = y[i] + dt * (A21 * self.k1[i]);
        }
        system.apply(t + C2 * dt, &self.tmp, &mut self.k2);

        for i in 0..n {
            self.tmp[i] = y[i] + dt * (A31 * self.k1[i] + A32 * self.k2[i]);
        }
        system.apply(t + C3 * dt, &self.tmp, &mut self.k3);

        for i in 0..n {
            self.tmp[i] = y[i] + dt * (A41 * self.k1[i] + A42 * self.k2[i] + A43 * self.k3[i]);
        }
        system.apply(t + C4 * dt, &self.tmp, &mut self.k4);

        for i in 0..n {
            self.tmp[i] = y[i]
                + dt * (A51 * self.k1[i] + A52 * self.k2[i] + A53 * self.k3[i] + A54 * self.k4[i]);
        }
        system.apply(t + C5 * dt, &self.tmp, &mut self.k5);

        for i in 0..n {
            self.tmp[i] = y[i]
                + dt * (A61 * self.k1[i]
                    + A62 * self.k2[i]
                    + A63 * self.k3[i]
                    + A64 * self.k4[i]
                    + A65 * self.k5[i]);
        }
        system.apply(t + dt, &self.tmp, &mut self.k6);

        for i in 0..n {
            y_next[i] = y[i]
                + dt * (B1 * self.k1[i]
                    + B2 * self.k2[i]
                    + B3 * self.k3[i]
                    + B4 * self.k4[i]
                    + B5 * self.k5[i]
                    + B6 * self.k6[i]);
        }
        system.apply(t + dt, y_next, &mut self.k7);

        let mut sum = 0.0;
        for i in 0..n {
            let err = dt
                * (E1 * self.k1[i]
                    + E2 * self.k2[i]
                    + E3 * self.k3[i]
                    + E4 * self.k4[i]
                    + E5 * self.k5[i]
                    + E6 * self.k6[i]
                    + E7 * self.k7[i]);
            let scale = atol + rtol * y[i].abs().max(y_next[i].abs());
            sum += (err / scale).powi(2);
        }
        (sum / n.max(1) as f64).sqrt()
    }
}

/// Tolerances and step bounds for [`integrate_adaptive`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveSettings {
    pub rtol: f64,
    pub atol: f64,
    /// First trial step; `None` uses a thousandth of the span.
    pub initial_step: Option<f64>,
    pub min_step: f64,
    pub max_step: f64,
    pub max_steps: usize,
}

impl Default for AdaptiveSettings {
    fn default() -> Self {
        Self {
            rtol: 1e-8,
            atol: 1e-6,
            initial_step: None,
            min_step: 1e-12,
            max_step: f64::INFINITY,
            max_steps: 10_000_000,
        }
    }
}

impl AdaptiveSettings {
    pub fn validate(&self) -> Result<(), ModelError> {
        if !self.rtol.is_finite() || self.rtol <= 0.0 {
            return Err(ModelError::InvalidSettings(
                "rtol must be finite and positive.".to_string(),
            ));
        }
        if !self.atol.is_finite() || self.atol <= 0.0 {
            return Err(ModelError::InvalidSettings(
                "atol must be finite and positive.".to_string(),
            ));
        }
        if let Some(h0) = self.initial_step {
            if !h0.is_finite() || h0 <= 0.0 {
                return Err(ModelError::InvalidSettings(
                    "initial_step must be finite and positive.".to_string(),
                ));
            }
        }
        if self.min_step.is_nan()
            || self.min_step <= 0.0
            || self.max_step.is_nan()
            || self.max_step < self.min_step
        {
            return Err(ModelError::InvalidSettings(
                "step bounds must satisfy 0 < min_step <= max_step.".to_string(),
            ));
        }
        if self.max_steps == 0 {
            return Err(ModelError::InvalidSettings(
                "max_steps must be greater than zero.".to_string(),
            ));
        }
        Ok(())
    }
}

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 5.0;

/// Integrates `system` from `initial` at `times[0]` and reports the state at
/// every entry of `times`.
///
/// Internal steps are chosen from the embedded error estimate and clipped so
/// that each requested time is hit exactly; no interpolation is involved.
/// `emit` receives `(t, state)` once per requested time, in order.
pub fn integrate_adaptive(
    system: &impl DynamicalSystem<f64>,
    initial: &[f64],
    times: &[f64],
    settings: &AdaptiveSettings,
    mut emit: impl FnMut(f64, &[f64]),
) -> Result<AdaptiveStats, ModelError> {
    settings.validate()?;
    let dim = system.dimension();
    if initial.len() != dim {
        return Err(ModelError::DimensionMismatch {
            expected: dim,
            actual: initial.len(),
        });
    }
    let Some(&t_start) = times.first() else {
        return Err(ModelError::InvalidTimeGrid(
            "at least one output time is required".to_string(),
        ));
    };

    let mut solver = Tsit5::new(dim);
    let mut y = initial.to_vec();
    let mut y_next = vec![0.0; dim];
    let mut t = t_start;
    let mut stats = AdaptiveStats::default();

    emit(t, &y);
    system.apply(t, &y, &mut solver.k1);

    let span = times[times.len() - 1] - t_start;
    let mut h = settings
        .initial_step
        .unwrap_or_else(|| (span * 1e-3).max(settings.min_step))
        .min(settings.max_step);

    for &target in &times[1..] {
        while t < target {
            if stats.accepted + stats.rejected >= settings.max_steps {
                return Err(ModelError::SolverFailure {
                    t,
                    reason: format!("exceeded {} steps", settings.max_steps),
                });
            }

            let remaining = target - t;
            let landing = h >= remaining;
            let dt = if landing { remaining } else { h };

            let err = solver.attempt(system, t, &y, dt, &mut y_next, settings.rtol, settings.atol);
            if !err.is_finite() {
                if dt <= settings.min_step {
                    return Err(ModelError::SolverFailure {
                        t,
                        reason: "non-finite state".to_string(),
                    });
                }
                stats.rejected += 1;
                h = (dt * MIN_FACTOR).max(settings.min_step);
                continue;
            }

            let factor = if err == 0.0 {
                MAX_FACTOR
            } else {
                (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
            };

            if err <= 1.0 || dt <= settings.min_step {
                if err > 1.0 {
                    return Err(ModelError::SolverFailure {
                        t,
                        reason: format!(
                            "step size fell below min_step = {} (error estimate {err:.3e})",
                            settings.min_step
                        ),
                    });
                }
                t = if landing { target } else { (t + dt).min(target) };
                std::mem::swap(&mut y, &mut y_next);
                std::mem::swap(&mut solver.k1, &mut solver.k7);
                stats.accepted += 1;
                // Clipping to land on a target says nothing about the step size
                // the error allows, so only grow from the proposed h.
                let base = if landing { h.max(dt) } else { dt };
                h = (base * factor).clamp(settings.min_step, settings.max_step);
            } else {
                stats.rejected += 1;
                h = (dt * factor).max(settings.min_step);
            }
        }
        emit(t, &y);
    }

    debug!(
        "adaptive integration finished: {} accepted, {} rejected steps, {} outputs",
        stats.accepted,
        stats.rejected,
        times.len()
    );
    Ok(stats)
}

/// Step counts reported by [`integrate_adaptive`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdaptiveStats {
    pub accepted: usize,
    pub rejected: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Decay {
        rate: f64,
    }

    impl DynamicalSystem<f64> for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = -self.rate * x[0];
        }
    }

    impl DynamicalSystem<f32> for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f32, x: &[f32], out: &mut [f32]) {
            out[0] = -(self.rate as f32) * x[0];
        }
    }

    struct Oscillator;

    impl DynamicalSystem<f64> for Oscillator {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = x[1];
            out[1] = -x[0];
        }
    }

    fn rk4_error(dt: f64) -> f64 {
        let system = Decay { rate: 1.0 };
        let mut solver = RK4::new(1);
        let mut t = 0.0;
        let mut state = [1.0];
        let steps = (1.0 / dt).round() as usize;
        for _ in 0..steps {
            solver.step(&system, &mut t, &mut state, dt);
        }
        (state[0] - (-1.0f64).exp()).abs()
    }

    #[test]
    fn rk4_single_step_matches_taylor_polynomial() {
        let system = Decay { rate: 1.0 };
        let mut solver = RK4::new(1);
        let mut t = 0.0;
        let mut state = [1.0];
        let h = 0.1f64;
        solver.step(&system, &mut t, &mut state, h);
        let expected = 1.0 - h + h * h / 2.0 - h.powi(3) / 6.0 + h.powi(4) / 24.0;
        assert!((state[0] - expected).abs() < 1e-14);
        assert!((t - 0.1).abs() < 1e-15);
    }

    #[test]
    fn rk4_global_error_is_fourth_order() {
        let coarse = rk4_error(0.1);
        let fine = rk4_error(0.05);
        let order = (coarse / fine).log2();
        assert!((order - 4.0).abs() < 0.15, "observed order {order}");
    }

    #[test]
    fn rk4_runs_in_single_precision() {
        let system = Decay { rate: 1.0 };
        let mut solver = RK4::<f32>::new(1);
        let mut t = 0.0f32;
        let mut state = [1.0f32];
        for _ in 0..10 {
            solver.step(&system, &mut t, &mut state, 0.1);
        }
        assert!((state[0] - (-1.0f32).exp()).abs() < 1e-5);
    }

    fn tsit5_error(dt: f64) -> f64 {
        let system = Decay { rate: 1.0 };
        let mut solver = Tsit5::new(1);
        let mut t = 0.0;
        let mut y = [1.0];
        let mut y_next = [0.0];
        let steps = (1.0 / dt).round() as usize;
        for _ in 0..steps {
            DynamicalSystem::<f64>::apply(&system, t, &y, &mut solver.k1);
            solver.attempt(&system, t, &y, dt, &mut y_next, 1.0, 1.0);
            y = y_next;
            t += dt;
        }
        (y[0] - (-1.0f64).exp()).abs()
    }

    #[test]
    fn tsit5_global_error_is_fifth_order() {
        let coarse = tsit5_error(0.1);
        let fine = tsit5_error(0.05);
        assert!(coarse < 1e-9, "h = 0.1 error {coarse}");
        let order = (coarse / fine).log2();
        assert!((order - 5.0).abs() < 0.6, "observed order {order}");
    }

    #[test]
    fn tsit5_error_estimate_shrinks_at_fifth_order() {
        let system = Decay { rate: 1.0 };
        let estimate = |dt: f64| {
            let mut solver = Tsit5::new(1);
            let mut y_next = [0.0];
            DynamicalSystem::<f64>::apply(&system, 0.0, &[1.0], &mut solver.k1);
            solver.attempt(&system, 0.0, &[1.0], dt, &mut y_next, 0.0, 1.0)
        };
        let order = (estimate(0.1) / estimate(0.05)).log2();
        assert!((order - 5.0).abs() < 0.3, "estimate order {order}");
    }

    #[test]
    fn adaptive_hits_requested_times_exactly() {
        let times = [0.0, 0.3, 1.7, 2.0, 10.0];
        let mut seen = Vec::new();
        let stats = integrate_adaptive(
            &Oscillator,
            &[1.0, 0.0],
            &times,
            &AdaptiveSettings {
                rtol: 1e-10,
                atol: 1e-12,
                ..AdaptiveSettings::default()
            },
            |t, y| seen.push((t, y.to_vec())),
        )
        .expect("integration should succeed");

        assert_eq!(seen.len(), times.len());
        for ((t, y), &expected_t) in seen.iter().zip(times.iter()) {
            assert_eq!(*t, expected_t);
            assert!((y[0] - expected_t.cos()).abs() < 1e-7);
            assert!((y[1] + expected_t.sin()).abs() < 1e-7);
        }
        assert!(stats.accepted >= times.len() - 1);
    }

    #[test]
    fn adaptive_takes_fewer_steps_with_looser_tolerance() {
        let run = |rtol: f64| {
            integrate_adaptive(
                &Decay { rate: 2.0 },
                &[1.0],
                &[0.0, 20.0],
                &AdaptiveSettings {
                    rtol,
                    atol: rtol * 1e-3,
                    ..AdaptiveSettings::default()
                },
                |_, _| {},
            )
            .expect("integration should succeed")
        };
        let tight = run(1e-10);
        let loose = run(1e-4);
        assert!(loose.accepted < tight.accepted);
    }

    #[test]
    fn adaptive_rejects_invalid_settings() {
        let bad = AdaptiveSettings {
            rtol: 0.0,
            ..AdaptiveSettings::default()
        };
        let err = integrate_adaptive(&Decay { rate: 1.0 }, &[1.0], &[0.0, 1.0], &bad, |_, _| {})
            .expect_err("rtol = 0 must be rejected");
        assert!(format!("{err}").contains("rtol"));

        let err = integrate_adaptive(
            &Decay { rate: 1.0 },
            &[1.0, 2.0],
            &[0.0, 1.0],
            &AdaptiveSettings::default(),
            |_, _| {},
        )
        .expect_err("dimension mismatch must be rejected");
        assert!(matches!(err, ModelError::DimensionMismatch { .. }));
    }

    #[test]
    fn adaptive_rejects_nan_step_bounds() {
        let nan_max = AdaptiveSettings {
            max_step: f64::NAN,
            ..AdaptiveSettings::default()
        };
        assert!(matches!(
            nan_max.validate(),
            Err(ModelError::InvalidSettings(_))
        ));
        let err = integrate_adaptive(&Decay { rate: 1.0 }, &[1.0], &[0.0, 1.0], &nan_max, |_, _| {})
            .expect_err("NaN max_step must be rejected before stepping");
        assert!(format!("{err}").contains("max_step"));

        let nan_min = AdaptiveSettings {
            min_step: f64::NAN,
            ..AdaptiveSettings::default()
        };
        assert!(nan_min.validate().is_err());
    }

    #[test]
    fn adaptive_never_overshoots_fractional_output_times() {
        let times: Vec<f64> = (0..=30).map(|k| k as f64 * 0.1).collect();
        let mut seen = Vec::new();
        integrate_adaptive(
            &Decay { rate: 1.0 },
            &[1.0],
            &times,
            &AdaptiveSettings {
                max_step: 0.0301,
                ..AdaptiveSettings::default()
            },
            |t, _| seen.push(t),
        )
        .expect("integration should succeed");
        assert_eq!(seen, times);
    }

    #[test]
    fn adaptive_reports_exhausted_step_budget() {
        let settings = AdaptiveSettings {
            max_steps: 3,
            max_step: 0.01,
            ..AdaptiveSettings::default()
        };
        let err = integrate_adaptive(&Decay { rate: 1.0 }, &[1.0], &[0.0, 1.0], &settings, |_, _| {})
            .expect_err("budget should run out");
        assert!(format!("{err}").contains("exceeded 3 steps"));
    }
}
