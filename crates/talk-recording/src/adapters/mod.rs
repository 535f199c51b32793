mod gateway;

pub use gateway::BACKEND_HEADER;
pub use gateway::CHECKSUM_HEADER;
pub use gateway::CommandHeaders;
pub use gateway::GatewayError;
pub use gateway::GatewayErrorKind;
pub use gateway::NONCE_HEADER;
pub use gateway::RequestGateway;
