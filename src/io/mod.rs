//! Byte-level I/O abstraction under the format readers.

pub mod byte_reader;
pub mod local_reader;
pub mod uri;

pub use byte_reader::ByteReader;
pub use local_reader::LocalFileByteReader;
pub use uri::SourceUri;
