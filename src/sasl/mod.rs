pub mod cram_md5;
pub mod plain;
pub mod sasl;

pub use cram_md5::*;
pub use plain::*;
pub use sasl::*;
