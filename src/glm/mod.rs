//! Generalized linear model fitting for negative binomial counts

mod design;
mod fitting;
mod negative_binomial;

pub use design::{Sym2, TwoGroupDesign};
pub use fitting::{fit_single_gene, GlmFitParams, GlmFitResult};
pub use negative_binomial::{nb_deviance, nb_log_density, nb_mean, nb_weight, MAX_LFC_BETA, MIN_MU};
