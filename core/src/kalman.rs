//! Linear-Gaussian Kalman filter for planar constant-acceleration kinematics
//!
//! This module contains the discrete-time linear Kalman filter at the heart of the
//! fusion core. The state is the 4-vector
//!
//! $$
//! x = [p_E, v_E, p_N, v_N]
//! $$
//!
//! (easting, easting-velocity, northing, northing-velocity, in the local UTM
//! frame), driven by a 2-vector control input of navigation-frame accelerations
//! $u = [a_E, a_N]$ produced by [`crate::rotate_to_nav`].
//!
//! ## Model matrices
//!
//! Constant-acceleration kinematics over an interval $t$:
//!
//! $$
//! F = \begin{bmatrix} 1 & t & 0 & 0 \\\\ 0 & 1 & 0 & 0 \\\\ 0 & 0 & 1 & t \\\\ 0 & 0 & 0 & 1 \end{bmatrix}, \qquad
//! G = \begin{bmatrix} t^2/2 & 0 \\\\ t & 0 \\\\ 0 & t^2/2 \\\\ 0 & t \end{bmatrix}
//! $$
//!
//! Process noise enters only through the control channel: $Q = G G^T$.
//! The measurement matrix $H$ selects the two position components, and the
//! measurement noise is $R = u I_2$ with $u$ the configured GPS position
//! uncertainty.
//!
//! ## Recurrences
//!
//! Predict: $x' = F x + G u$, $P' = F P F^T + Q$. Update: gain
//! $K = P' H^T (H P' H^T + R)^{-1}$, state $x = x' + K (z - H x')$, and the
//! symmetric Joseph-form covariance
//!
//! $$
//! P = (I - K H) P' (I - K H)^T + K R K^T
//! $$
//!
//! which preserves positive semi-definiteness under floating-point rounding,
//! unlike the short form $(I - K H) P'$.
//!
//! All shapes are statically sized nalgebra types, so dimension mismatches are
//! compile errors rather than runtime surprises.

use std::fmt::{self, Debug, Display};

use nalgebra::{Matrix2, Matrix2x4, Matrix4, Matrix4x2, Vector2, Vector4};

use crate::FusionError;

/// State-transition matrix $F(t)$ for constant-acceleration kinematics.
pub fn state_transition(dt: f64) -> Matrix4<f64> {
    Matrix4::new(
        1.0, dt, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, dt, //
        0.0, 0.0, 0.0, 1.0,
    )
}
/// Control matrix $G(t)$ mapping planar acceleration into the state.
pub fn control_matrix(dt: f64) -> Matrix4x2<f64> {
    let half_dt2 = 0.5 * dt * dt;
    Matrix4x2::new(
        half_dt2, 0.0, //
        dt, 0.0, //
        0.0, half_dt2, //
        0.0, dt,
    )
}
/// Process noise $Q = G G^T$: noise enters only through the control channel.
pub fn process_noise(control: &Matrix4x2<f64>) -> Matrix4<f64> {
    control * control.transpose()
}
/// Measurement matrix $H$ selecting the easting and northing position states.
pub fn measurement_matrix() -> Matrix2x4<f64> {
    Matrix2x4::new(
        1.0, 0.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0,
    )
}
/// Measurement noise $R = u I_2$, with $u$ the configured GPS position
/// uncertainty placed directly on the diagonal.
pub fn measurement_noise(position_uncertainty: f64) -> Matrix2<f64> {
    Matrix2::identity() * position_uncertainty
}

/// Symmetrize a covariance: $P \leftarrow \tfrac{1}{2}(P + P^T)$.
///
/// Kills the round-off asymmetry that accumulates over many predict/update
/// cycles.
#[inline]
fn symmetrize(p: &Matrix4<f64>) -> Matrix4<f64> {
    0.5 * (p + p.transpose())
}

/// Planar position/velocity Kalman filter.
///
/// Owns the persistent state vector and covariance; both are mutated in place by
/// every epoch and never reset after initialization. The covariance invariant —
/// symmetric, positive semi-definite — is maintained by the Joseph-form update
/// plus explicit symmetrization.
#[derive(Clone)]
pub struct PlanarKalmanFilter {
    state: Vector4<f64>,
    covariance: Matrix4<f64>,
    measurement_map: Matrix2x4<f64>,
    measurement_noise: Matrix2<f64>,
}
impl Debug for PlanarKalmanFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanarKalmanFilter")
            .field("state", &self.state)
            .field("covariance", &self.covariance)
            .finish()
    }
}
impl Display for PlanarKalmanFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PlanarKalmanFilter {{ E: {:.2} m, vE: {:.3} m/s, N: {:.2} m, vN: {:.3} m/s, tr(P): {:.3} }}",
            self.state[0],
            self.state[1],
            self.state[2],
            self.state[3],
            self.covariance.trace()
        )
    }
}
impl PlanarKalmanFilter {
    /// Create a filter from an initial state guess.
    ///
    /// # Arguments
    /// * `initial_state` - `[easting, easting_velocity, northing, northing_velocity]`
    /// * `initial_covariance_scale` - prior variance placed on every state component
    /// * `position_uncertainty` - GPS position noise scalar, the diagonal of $R$
    pub fn new(
        initial_state: Vector4<f64>,
        initial_covariance_scale: f64,
        position_uncertainty: f64,
    ) -> Self {
        PlanarKalmanFilter {
            state: initial_state,
            covariance: Matrix4::identity() * initial_covariance_scale,
            measurement_map: measurement_matrix(),
            measurement_noise: measurement_noise(position_uncertainty),
        }
    }
    /// Propagate state and covariance forward by `dt` seconds under the given
    /// navigation-frame acceleration.
    ///
    /// $x' = F x + G u$, $P' = F P F^T + G G^T$. Called exactly once per epoch,
    /// before any update. With `dt = 0` this is the identity on both state and
    /// covariance ($G(0) = 0 \Rightarrow Q = 0$).
    pub fn predict(&mut self, control_input: &Vector2<f64>, dt: f64) {
        let f = state_transition(dt);
        let g = control_matrix(dt);
        let q = process_noise(&g);
        self.state = f * self.state + g * control_input;
        self.covariance = symmetrize(&(f * self.covariance * f.transpose() + q));
    }
    /// Correct the predicted state with a planar position measurement
    /// `[easting, northing]`.
    ///
    /// Computes the Kalman gain from the innovation covariance
    /// $S = H P' H^T + R$ and applies the Joseph-form covariance update.
    ///
    /// # Errors
    /// [`FusionError::SingularInnovation`] when $S$ is not invertible. With a
    /// positive-definite $R$ this cannot happen; a zero `position_uncertainty`
    /// configuration would otherwise produce NaNs instead of a diagnosable
    /// failure.
    pub fn update(&mut self, measurement: &Vector2<f64>) -> Result<(), FusionError> {
        let h = self.measurement_map;
        let innovation_covariance = h * self.covariance * h.transpose() + self.measurement_noise;
        let inverse = innovation_covariance
            .try_inverse()
            .ok_or(FusionError::SingularInnovation)?;
        let gain: Matrix4x2<f64> = self.covariance * h.transpose() * inverse;
        let innovation = measurement - h * self.state;
        self.state += gain * innovation;
        // Joseph form: preserves symmetry and positive semi-definiteness.
        let i_kh = Matrix4::identity() - gain * h;
        self.covariance = symmetrize(
            &(i_kh * self.covariance * i_kh.transpose()
                + gain * self.measurement_noise * gain.transpose()),
        );
        Ok(())
    }
    /// Current state estimate `[easting, easting_velocity, northing, northing_velocity]`.
    pub fn get_estimate(&self) -> Vector4<f64> {
        self.state
    }
    /// Current covariance of the state estimate.
    pub fn get_certainty(&self) -> Matrix4<f64> {
        self.covariance
    }
    /// Planar position components `[easting, northing]` of the estimate.
    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.state[0], self.state[2])
    }
    /// Planar velocity components `[easting_velocity, northing_velocity]`.
    pub fn velocity(&self) -> Vector2<f64> {
        Vector2::new(self.state[1], self.state[3])
    }
}
