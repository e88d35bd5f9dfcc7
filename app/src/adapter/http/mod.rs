mod connection;
mod digest;
pub mod multipart;
mod negotiate;

pub use connection::DeviceConnection;
pub use negotiate::negotiate;
