//! Collaborator services

pub mod file_scanner;

pub use file_scanner::{Discovery, DiscoveryError, FileDiscoverer, FileScanner, ScanError};
