/// Series, episode, template and destination identifiers are database BIGSERIALs.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Byte size of a file on disk or on a remote destination.
pub type ByteSize = u64;
