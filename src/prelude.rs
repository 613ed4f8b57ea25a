pub use crate::airpls::{AirPLS, BaselineFit};
pub use crate::correction::{BaselineCorrector, CorrectedSpectrum, CorrectionConfig};
pub use crate::solver::SparseSolver;
pub use crate::whittaker::WhittakerSmoother;
