// Normalization and unification stages: raw per-year -> canonical per-year -> unified

pub mod inspect;
pub mod normalize;
pub mod report;
pub mod unify;

pub use normalize::{normalize_all, normalize_all_with, normalize_year, YearTransform};
pub use report::{NormalizeReport, UnifyReport, YearOutcome, YearStatus};
pub use unify::unify;
