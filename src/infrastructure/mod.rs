//! Adapters: everything that talks to a real database, the filesystem, or
//! layered configuration sources. The domain layer only sees the `ports`
//! traits these implement.

pub mod config;
pub mod db;
