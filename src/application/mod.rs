//! Application services: dispatch, remote cache and the services behind the
//! fixed HTTP routes.

pub mod content;
pub mod error;
pub mod pages;
pub mod pagination;
pub mod permalink;
pub mod remote;
pub mod repos;
pub mod syndication;
