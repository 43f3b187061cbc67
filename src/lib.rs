//! Core library for the multi-tenant social-media scheduling backend.
//!
//! A calendar-centric content pipeline: clients attach social accounts,
//! build content with media, schedule publications against a platform
//! driver, and optionally expose a calendar to outside collaborators
//! through a revocable, time-boxed share link with bounded public
//! commenting. The scheduling dispatcher claims due publications on a
//! fixed tick and drives each through the matching `Publisher`
//! implementation; everything else is request/response CRUD behind the
//! tenancy layer.
//!
//! External collaborators (relational store, identity provider,
//! object storage, platform APIs) are modeled as traits with a
//! production-shaped default implementation, the way the teacher keeps
//! Azure Table Storage and Azure AD behind narrow interfaces rather
//! than hard-wiring the SDK calls into handlers.

pub mod auth;
pub mod config;
pub mod context;
pub mod crypto;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod models;
pub mod objectstore;
pub mod public_share;
pub mod publisher;
pub mod rate_limit;
pub mod sharelink;
pub mod store;
pub mod tenancy;

pub use config::AppConfig;
pub use models::*;
