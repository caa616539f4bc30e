pub mod endpoint;
pub mod error;
pub mod handler;
pub mod info;
pub mod listener;
pub mod manager;
pub mod pipeline;

pub type Result<T> = std::result::Result<T, Error>;

pub use endpoint::GatewayEndpoint;
pub use error::Error;
pub use handler::RequestHandler;
pub use info::InfoService;
pub use listener::ServerListener;
pub use manager::ServerManager;
pub use pipeline::Pipeline;
