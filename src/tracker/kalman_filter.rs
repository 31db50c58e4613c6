//! Constant-velocity Kalman filter over `[cx, cy, aspect, height]` and their velocities.
//!
//! Process and measurement noise are proportional to the current box height,
//! so positional uncertainty scales with the apparent size of the object.

use nalgebra::{SMatrix, SVector};
use tracing::warn;

/// `[cx, cy, a, h, vx, vy, va, vh]`
pub type StateMean = SVector<f64, 8>;
pub type StateCovariance = SMatrix<f64, 8, 8>;
/// `[cx, cy, a, h]`
pub type Measurement = SVector<f64, 4>;
pub type MeasurementCovariance = SMatrix<f64, 4, 4>;

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    motion_mat: StateCovariance,
    update_mat: SMatrix<f64, 4, 8>,
    std_weight_position: f64,
    std_weight_velocity: f64,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

fn diag_squared<const N: usize>(std: [f64; N]) -> SMatrix<f64, N, N> {
    SMatrix::from_diagonal(&SVector::from(std.map(|s| s * s)))
}

impl KalmanFilter {
    pub fn new() -> Self {
        let ndim = 4;
        let dt = 1.0;
        let mut motion_mat = StateCovariance::identity();
        for i in 0..ndim {
            motion_mat[(i, ndim + i)] = dt;
        }

        Self {
            motion_mat,
            update_mat: SMatrix::<f64, 4, 8>::identity(),
            std_weight_position: 1.0 / 20.0,
            std_weight_velocity: 1.0 / 160.0,
        }
    }

    /// Create a track state from an unassociated measurement. Velocities start
    /// at zero with a large variance.
    pub fn initiate(&self, measurement: [f64; 4]) -> (StateMean, StateCovariance) {
        let mut mean = StateMean::zeros();
        mean.fixed_rows_mut::<4>(0).copy_from(&Measurement::from(measurement));

        let h = measurement[3];
        let std = [
            2.0 * self.std_weight_position * h,
            2.0 * self.std_weight_position * h,
            1e-2,
            2.0 * self.std_weight_position * h,
            10.0 * self.std_weight_velocity * h,
            10.0 * self.std_weight_velocity * h,
            1e-5,
            10.0 * self.std_weight_velocity * h,
        ];

        (mean, diag_squared(std))
    }

    /// Advance the state by one frame.
    pub fn predict(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
    ) -> (StateMean, StateCovariance) {
        let h = mean[3];
        let std = [
            self.std_weight_position * h,
            self.std_weight_position * h,
            1e-2,
            self.std_weight_position * h,
            self.std_weight_velocity * h,
            self.std_weight_velocity * h,
            1e-5,
            self.std_weight_velocity * h,
        ];
        let motion_cov = diag_squared(std);

        let new_mean = self.motion_mat * mean;
        let new_covariance =
            self.motion_mat * covariance * self.motion_mat.transpose() + motion_cov;

        (new_mean, new_covariance)
    }

    /// Project the state into measurement space.
    pub fn project(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
    ) -> (Measurement, MeasurementCovariance) {
        let h = mean[3];
        let std = [
            self.std_weight_position * h,
            self.std_weight_position * h,
            1e-1,
            self.std_weight_position * h,
        ];
        let innovation_cov = diag_squared(std);

        let mean_proj = self.update_mat * mean;
        let covariance_proj =
            self.update_mat * covariance * self.update_mat.transpose() + innovation_cov;

        (mean_proj, covariance_proj)
    }

    /// Correct the state with an associated measurement.
    ///
    /// If the innovation covariance cannot be inverted the prediction is
    /// returned unchanged.
    pub fn update(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
        measurement: [f64; 4],
    ) -> (StateMean, StateCovariance) {
        let (projected_mean, projected_cov) = self.project(mean, covariance);
        let innovation = Measurement::from(measurement) - projected_mean;

        let s_inv = match projected_cov.cholesky() {
            Some(chol) => chol.inverse(),
            None => match projected_cov.try_inverse() {
                Some(inv) => inv,
                None => {
                    warn!("singular innovation covariance, skipping measurement update");
                    return (*mean, *covariance);
                }
            },
        };

        // K = P * H^T * S^-1
        let kalman_gain = covariance * self.update_mat.transpose() * s_inv;

        let new_mean = mean + kalman_gain * innovation;
        let new_covariance = covariance - kalman_gain * projected_cov * kalman_gain.transpose();

        (new_mean, new_covariance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_initiate() {
        let kf = KalmanFilter::new();
        let (mean, cov) = kf.initiate([100.0, 200.0, 0.5, 50.0]);
        assert_eq!(mean[0], 100.0);
        assert_eq!(mean[3], 50.0);
        assert_eq!(mean[4], 0.0);
        // 2 * (1/20) * 50 = 5
        assert_relative_eq!(cov[(0, 0)], 25.0, epsilon = 1e-9);
        assert_relative_eq!(cov[(2, 2)], 1e-4, epsilon = 1e-12);
        assert_eq!(cov[(0, 1)], 0.0);
    }

    #[test]
    fn test_predict_moves_by_velocity() {
        let kf = KalmanFilter::new();
        let (mut mean, cov) = kf.initiate([100.0, 200.0, 0.5, 50.0]);
        mean[4] = 3.0;
        mean[5] = -2.0;

        let (predicted, predicted_cov) = kf.predict(&mean, &cov);
        assert_relative_eq!(predicted[0], 103.0, epsilon = 1e-9);
        assert_relative_eq!(predicted[1], 198.0, epsilon = 1e-9);
        assert_relative_eq!(predicted[3], 50.0, epsilon = 1e-9);
        assert!(predicted_cov[(0, 0)] > cov[(0, 0)]);
    }

    #[test]
    fn test_update_pulls_towards_measurement() {
        let kf = KalmanFilter::new();
        let (mean, cov) = kf.initiate([100.0, 100.0, 1.0, 40.0]);
        let (mean, cov) = kf.predict(&mean, &cov);

        let (updated, updated_cov) = kf.update(&mean, &cov, [110.0, 100.0, 1.0, 40.0]);
        assert!(updated[0] > 100.0 && updated[0] < 110.0);
        assert!(updated[4] > 0.0);
        assert!(updated_cov[(0, 0)] < cov[(0, 0)]);
    }

    #[test]
    fn test_update_with_exact_measurement_keeps_mean() {
        let kf = KalmanFilter::new();
        let (mean, cov) = kf.initiate([10.0, 20.0, 0.5, 30.0]);
        let (updated, _) = kf.update(&mean, &cov, [10.0, 20.0, 0.5, 30.0]);
        for i in 0..8 {
            assert_relative_eq!(updated[i], mean[i], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_covariance_stays_symmetric() {
        let kf = KalmanFilter::new();
        let (mut mean, mut cov) = kf.initiate([50.0, 60.0, 0.8, 25.0]);
        for step in 0..5 {
            (mean, cov) = kf.predict(&mean, &cov);
            (mean, cov) = kf.update(&mean, &cov, [50.0 + step as f64, 60.0, 0.8, 25.0]);
        }
        assert_relative_eq!(cov, cov.transpose(), epsilon = 1e-9);
    }
}
