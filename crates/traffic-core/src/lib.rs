pub mod composer;
pub mod config;
pub mod coordinator;
pub mod counter;
pub mod driver;
pub mod endpoint;
pub mod error;
pub mod producer;
pub mod progress;
pub mod report;
pub mod sender;
pub mod signal;

pub use composer::*;
pub use config::*;
pub use coordinator::*;
pub use counter::*;
pub use driver::*;
pub use endpoint::*;
pub use error::*;
pub use producer::*;
pub use progress::*;
pub use report::*;
pub use sender::*;
pub use signal::*;
