//! Result and Error types for all rmem code.
use std::fmt;
use std::io;
use std::str;

#[allow(missing_docs)]
pub type RmemResult<T> = Result<T, RmemError>;

#[allow(missing_docs)]
#[derive(Debug)]
pub enum RmemError {
    Io(io::Error),
    InvalidHeader(String),
    InvalidInteger(String),
    MissingFile(String),
    EmptyReference,
    Serialize(bincode::Error),
    Utf8(str::Utf8Error),
    FastqReadError,
    Thread(String),
    AnyhowError(String),
}

impl fmt::Display for RmemError {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            &RmemError::Io(ref e) => write!(f, "I/O problem: {}", e),
            &RmemError::InvalidHeader(ref h) => {
                write!(f, "Incorrectly formatted FASTA header: {}", h)
            },
            &RmemError::InvalidInteger(ref s) => write!(f, "Unable to parse \"{}\" as integer", s),
            &RmemError::MissingFile(ref p) => write!(f, "Unable to find file {}", p),
            &RmemError::EmptyReference => write!(f, "Reference contains no sequence"),
            &RmemError::Serialize(ref e) => write!(f, "Unable to serialize/deserialize item: {}", e),
            &RmemError::Utf8(ref e) => write!(f, "Found invalid UTF8 input ({})", e),
            &RmemError::FastqReadError => write!(f, "Error reading FASTQ file"),
            &RmemError::Thread(ref s) => write!(f, "Worker thread failure: {}", s),
            &RmemError::AnyhowError(ref s) => write!(f, "Error: {}", s),
        }
    }
}

impl From<io::Error> for RmemError {
    fn from(e: io::Error) -> Self {
        RmemError::Io(e)
    }
}

impl From<bincode::Error> for RmemError {
    fn from(e: bincode::Error) -> Self {
        RmemError::Serialize(e)
    }
}

impl From<str::Utf8Error> for RmemError {
    fn from(e: str::Utf8Error) -> Self {
        RmemError::Utf8(e)
    }
}

impl From<anyhow::Error> for RmemError {
    fn from(e: anyhow::Error) -> Self {
        RmemError::AnyhowError(e.to_string())
    }
}

impl From<bio::io::fastq::Error> for RmemError {
    fn from(_e: bio::io::fastq::Error) -> Self {
        RmemError::FastqReadError
    }
}
