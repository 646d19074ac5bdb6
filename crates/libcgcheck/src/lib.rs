//! Verification of the cgroup v1 placement of a running container.
//!
//! Given a container's cgroup identifier and its sandbox process, the crate
//! resolves the container's control directory in every controller
//! hierarchy, compares control files against the limits the container was
//! started with and checks that the sandbox is attached to each hierarchy.
//! Nothing is ever written: the cgroups are created by an external runtime
//! and only observed here.
#[cfg(test)]
#[macro_use]
extern crate quickcheck;


pub mod attribute;
pub mod common;
pub mod controller_type;
pub mod error;
pub mod expectation;
pub mod membership;
pub mod mount;
pub mod path;
pub mod poll;
pub mod process;

pub use controller_type::{ControllerType, CONTROLLERS, MEMBERSHIP_CONTROLLERS};
pub use error::VerifyError;
pub use path::PathResolver;
