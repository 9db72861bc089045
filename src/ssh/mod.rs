// SSH module entry
pub mod client;
pub mod remote;
pub mod session;

#[cfg(test)]
pub(crate) mod mock;

pub use client::SshClient;
pub use remote::RemoteHost;
pub use session::open_session;
