//! The closed error taxonomy the pipeline raises. Local recovery is limited
//! to `InvalidEntry`; every other variant aborts the run.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// One entry was malformed. Non-fatal: the coordinator counts it and
    /// moves on to the next entry.
    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    /// An unrecoverable parse/transform error. Aborts the transform
    /// coordinator and cancels the run.
    #[error("transform failed: {0}")]
    TransformFailure(String),

    /// The database adapter failed to load a spool file.
    #[error("bulk ingest of table '{table}' failed: {detail}")]
    BulkIngestFailure { table: String, detail: String },

    /// A constraint (FK/PK) was violated during ingest or merge; treated as
    /// a `BulkIngestFailure` by the caller.
    #[error("constraint violation on table '{table}': {detail}")]
    ConstraintViolation { table: String, detail: String },

    /// The cutover rename transaction failed; production is untouched.
    #[error("cutover failed: {0}")]
    CutoverFailure(String),

    /// Could not reach the database before any state was mutated.
    #[error("database adapter unavailable: {0}")]
    AdapterUnavailable(String),

    #[error(transparent)]
    Parsing(#[from] ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("an error occurred with the database connection")]
    Database(#[from] diesel::result::Error),

    #[error("an error occurred getting a database connection")]
    Pool(#[from] diesel::r2d2::PoolError),
}

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("missing required field '{0}' on <{1}>")]
    MissingField(String, String),

    #[error("malformed XML: {0}")]
    Xml(String),

    #[error(transparent)]
    DateFormat(#[from] chrono::ParseError),

    #[error(transparent)]
    IntFormat(#[from] std::num::ParseIntError),
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Parsing(ParseError::Xml(err.to_string()))
    }
}

impl From<quick_xml::Error> for ParseError {
    fn from(err: quick_xml::Error) -> Self {
        ParseError::Xml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::Parsing(ParseError::Xml(err.to_string()))
    }
}

impl From<quick_xml::events::attributes::AttrError> for ParseError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        ParseError::Xml(err.to_string())
    }
}
