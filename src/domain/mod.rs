//! Core domain: the engine-neutral schema model and the pure logic built on
//! top of it. Nothing here touches a socket or a filesystem — that's
//! `infrastructure`'s job.

pub mod error;
pub mod ports;
pub mod schema;
pub mod sorter;
pub mod value_objects;
