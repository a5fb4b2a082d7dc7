use thiserror::Error;

#[derive(Debug, Error)]
pub enum MostWantedError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Malformed input at line {line_number}: {reason}: '{line}'")]
    MalformedInput {
        line_number: usize,
        line: String,
        reason: String,
    },

    #[error("Cluster '{0}' was not found in the abundance table")]
    MissingCluster(String),

    #[error("No representative sequence found for cluster '{0}'")]
    MissingSequence(String),

    #[error("Alignment subject id '{0}' does not have the form gi|<num>|emb|<accession>|")]
    InvalidSubjectId(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error parsing tab-separated file {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("Error parsing FASTA file {path}: {message}")]
    Fasta { path: String, message: String },

    #[error("Failed to serialise plot data to {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl MostWantedError {
    pub fn io(path: &str, source: std::io::Error) -> MostWantedError {
        MostWantedError::Io {
            path: path.to_string(),
            source,
        }
    }

    pub fn malformed(line_number: usize, line: &str, reason: &str) -> MostWantedError {
        MostWantedError::MalformedInput {
            line_number,
            line: line.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MostWantedError>;
