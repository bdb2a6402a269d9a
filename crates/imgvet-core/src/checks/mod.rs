//! Built-in policy implementations.
//!
//! - `approved`: commit reachability, signature, merged pull request and CI
//! - `diy`: image repository under a trusted registry prefix

pub mod approved;
pub mod diy;

pub use approved::{Approval, ApprovedCheck, APPROVED_CHECK};
pub use diy::{DiyCheck, DIY_CHECK};
