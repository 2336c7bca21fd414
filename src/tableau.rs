//! Butcher tableau for the built-in RKF 7(8) reference backend.
//!
//! 13-stage embedded Runge-Kutta-Fehlberg pair: an 8th-order solution with a
//! 7th-order embedded estimate for error control. Coefficients from
//! Fehlberg, NASA TR R-287, Table X.

/// Number of stages
pub const STAGES: usize = 13;

/// Order of the advancing solution
pub const ORDER: u8 = 8;

/// Node coefficients c_i: stage i is evaluated at t_n + c[i]*h.
pub const C: [f64; STAGES] = [
    0.0,
    2.0 / 27.0,
    1.0 / 9.0,
    1.0 / 6.0,
    5.0 / 12.0,
    0.5,
    5.0 / 6.0,
    1.0 / 6.0,
    2.0 / 3.0,
    1.0 / 3.0,
    1.0,
    0.0,
    1.0,
];

/// Lower-triangular stage matrix a_ij:
/// k_i = f(t_n + c_i h, y_n + h Σ_{j<i} a_ij k_j).
#[rustfmt::skip]
pub const A: [[f64; 12]; 13] = [
    [0.0; 12],
    [2.0/27.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0/36.0, 1.0/12.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0/24.0, 0.0, 1.0/8.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [5.0/12.0, 0.0, -25.0/16.0, 25.0/16.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0/20.0, 0.0, 0.0, 1.0/4.0, 1.0/5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [-25.0/108.0, 0.0, 0.0, 125.0/108.0, -65.0/27.0, 125.0/54.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [31.0/300.0, 0.0, 0.0, 0.0, 61.0/225.0, -2.0/9.0, 13.0/900.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [2.0, 0.0, 0.0, -53.0/6.0, 704.0/45.0, -107.0/9.0, 67.0/90.0, 3.0, 0.0, 0.0, 0.0, 0.0],
    [-91.0/108.0, 0.0, 0.0, 23.0/108.0, -976.0/135.0, 311.0/54.0, -19.0/60.0, 17.0/6.0, -1.0/12.0, 0.0, 0.0, 0.0],
    [2383.0/4100.0, 0.0, 0.0, -341.0/164.0, 4496.0/1025.0, -301.0/82.0, 2133.0/4100.0, 45.0/82.0, 45.0/164.0, 18.0/41.0, 0.0, 0.0],
    [3.0/205.0, 0.0, 0.0, 0.0, 0.0, -6.0/41.0, -3.0/205.0, -3.0/41.0, 3.0/41.0, 6.0/41.0, 0.0, 0.0],
    [-1777.0/4100.0, 0.0, 0.0, -341.0/164.0, 4496.0/1025.0, -289.0/82.0, 2193.0/4100.0, 51.0/82.0, 33.0/164.0, 12.0/41.0, 0.0, 1.0],
];

/// Weights of the 8th-order advancing solution. Stages 11 and 12 contribute
/// only to the error estimate.
pub const B: [f64; STAGES] = [
    41.0 / 840.0,
    0.0,
    0.0,
    0.0,
    0.0,
    34.0 / 105.0,
    9.0 / 35.0,
    9.0 / 35.0,
    9.0 / 280.0,
    9.0 / 280.0,
    41.0 / 840.0,
    0.0,
    0.0,
];

/// Error weights b_i - b̂_i: the local truncation error estimate is
/// err ≈ h Σ_i (b_i - b̂_i) k_i = h (41/840)(k_0 + k_10 - k_11 - k_12).
pub const B_ERR: [f64; STAGES] = [
    41.0 / 840.0,
    0.0,
    0.0,
    0.0,
    0.0,
    0.0,
    0.0,
    0.0,
    0.0,
    0.0,
    41.0 / 840.0,
    -41.0 / 840.0,
    -41.0 / 840.0,
];
