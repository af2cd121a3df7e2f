use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    /// Inputs that cannot be turned into a valid probability or rating.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The optimizer ran out of iterations. `best` is the lowest objective value reached.
    #[error("optimizer did not converge after {iterations} iterations (best objective {best:.6})")]
    NotConverged { iterations: usize, best: f64 },

    #[error("data unavailable: {0}")]
    DataUnavailable(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
