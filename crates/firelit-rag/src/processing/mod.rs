pub mod csv_loader;

pub use csv_loader::CsvLoader;
