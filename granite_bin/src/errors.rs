#[derive(Debug)]
pub enum ExecutionError {
    Io(std::io::Error),
    TableNotFound(String),
    TableAlreadyExists(String),
    TupleDecode(String),
    GenericError(String),
}

impl From<std::io::Error> for ExecutionError {
    fn from(err: std::io::Error) -> Self {
        ExecutionError::Io(err)
    }
}
