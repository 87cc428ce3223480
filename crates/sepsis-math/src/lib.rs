//! Numerical kernels for sepsis cohort validation statistics.
//!
//! Everything here is a pure function of its arguments. Domain code lives in
//! `sepsis-core`; this crate only knows about distributions.

pub mod math;

pub use math::beta::{beta_cdf, students_t_two_sided};
pub use math::binomial::{
    clopper_pearson, tail_probability, Interval, IntervalError, BISECTION_TOLERANCE,
    DEFAULT_ALPHA,
};
pub use math::gamma::{chi_square_sf, gamma_p, gamma_q};
pub use math::normal::{erf, erfc, normal_cdf, normal_quantile, normal_sf, normal_two_sided};
pub use math::stable::{ln_beta, ln_gamma};
