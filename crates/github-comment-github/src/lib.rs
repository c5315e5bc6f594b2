//! Comment gateway for the github-comment binaries.
//!
//! Defines the gateway contract the controllers depend on, the live GitHub
//! REST + GraphQL client, and the dry-run gateway that logs intended actions
//! instead of calling the network.

pub mod client;
pub mod dry_run;
pub mod gateway;
mod transport;

pub use client::{GithubClient, GithubClientParams};
pub use dry_run::DryRunGateway;
pub use gateway::{CommentGateway, GatewayError};
