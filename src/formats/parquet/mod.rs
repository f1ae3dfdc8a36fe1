//! Parquet support: decoding is delegated to the `parquet`/`arrow` crates;
//! this module adapts their interfaces to the pipeline's byte-reader seam,
//! schema model, and row-batch representation.

mod adapter;
mod conversion;
mod reader;

pub use reader::GenericParquetReader;
