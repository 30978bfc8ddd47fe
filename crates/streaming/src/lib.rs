pub mod ack;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod subscription;
pub mod transport;

pub use ack::*;
pub use error::*;
pub use gateway::*;
pub use protocol::*;
pub use subscription::*;
pub use transport::*;
