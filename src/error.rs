use derive_more::Display;

/// Everything that can go wrong between reading the workbook and writing the results.
#[derive(Debug, Display)]
pub enum Error {
    /// The input source is missing or could not be read
    #[display(fmt = "unable to access {}: {}", path, reason)]
    DataAccess { path: String, reason: String },
    /// A sheet could not be interpreted as a rectangular numeric table
    #[display(fmt = "malformed sheet `{}`: {}", sheet, reason)]
    DataFormat { sheet: String, reason: String },
    /// Table dimensions disagree with each other
    #[display(
        fmt = "shape mismatch in `{}`: expected {}x{}, found {}x{}",
        table,
        expected_rows,
        expected_cols,
        rows,
        cols
    )]
    ShapeMismatch {
        table: String,
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },
    /// A configuration value is outside its documented range
    #[display(fmt = "invalid configuration `{}`: {}", key, reason)]
    Config { key: String, reason: String },
    /// The solver finished without an optimal assignment
    #[display(fmt = "no optimal schedule: {}", _0)]
    SolverFailure(crate::solver::Status),
    /// The solver itself failed (licensing, internal fault, ...)
    #[display(fmt = "solver error: {}", _0)]
    SolverRuntime(String),
    /// The results could not be written
    #[display(fmt = "unable to write results to {}: {}", path, reason)]
    Output { path: String, reason: String },
}

impl std::error::Error for Error {}

impl Error {
    pub fn format(sheet: &str, reason: impl Into<String>) -> Error {
        Error::DataFormat {
            sheet: sheet.to_string(),
            reason: reason.into(),
        }
    }

    pub fn access(path: &std::path::Path, reason: impl ToString) -> Error {
        Error::DataAccess {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn output(path: &std::path::Path, reason: impl ToString) -> Error {
        Error::Output {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Process exit code reported by the command line tool
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::DataAccess { .. }
            | Error::DataFormat { .. }
            | Error::ShapeMismatch { .. }
            | Error::Config { .. }
            | Error::Output { .. } => 1,
            Error::SolverFailure(_) => 2,
            Error::SolverRuntime(_) => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
