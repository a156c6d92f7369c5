mod dispatch;
mod error;
mod invoker;
mod logging;
mod message;
mod orchestrator;
mod prompt;
mod registry;
mod router;
mod state;
mod stream;
mod wire;


pub use dispatch::*;
pub use error::*;
pub use invoker::*;
pub use logging::*;
pub use message::*;
pub use orchestrator::*;
pub use prompt::*;
pub use registry::*;
pub use router::*;
pub use state::*;
pub use stream::*;
pub use wire::*;
