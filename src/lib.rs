pub mod backend;
pub mod capability;
pub mod conn;
pub mod registry;
pub mod sasl;
pub mod server;

mod auth;
mod data;
mod lengthlimit_reader;
mod parse;
mod stream;
mod textproto;

pub use auth::apop_digest;
pub use data::ResponseCode;
