/// Модуль предобработки данных

pub mod csv_io;
pub mod normalizer;

pub use csv_io::{read_csv, write_csv};
pub use normalizer::{NormalizedBatch, SchemaNormalizer};
