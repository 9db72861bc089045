// Transfer module entry
pub mod dirs;
pub mod naming;
pub mod policy;
pub mod progress;
pub mod upload;

pub use upload::Uploader;
