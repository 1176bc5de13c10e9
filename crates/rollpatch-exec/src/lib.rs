//! rollpatch-exec: Remote execution abstraction
//!
//! Provides the `RemoteExecutor` trait with local (`tokio::process`) and
//! SSH (russh) implementations, plus an argument-list command builder so
//! callers never hand-assemble shell strings.

pub mod command;
pub mod error;
pub mod keys;
pub mod local;
pub mod result;
pub mod ssh;
pub mod traits;

pub use command::Cmd;
pub use error::ExecError;
pub use keys::KeySource;
pub use local::LocalExecutor;
pub use result::{CommandResult, ConnectionInfo};
pub use ssh::SshExecutor;
pub use traits::RemoteExecutor;
