//! NMS Core - Shared domain types and service infrastructure
//!
//! This crate provides:
//! - Standard service trait all microservices implement
//! - Entity identifiers shared between billing and provisioning
//! - Error handling utilities
//! - Configuration management
//! - A small XML tree shared by the SEPA and provider encoders

pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod xml;

pub use config::ServiceConfig;
pub use domain::*;
pub use error::{NmsError, Result};
pub use service::{DependencyStatus, HealthStatus, MicroserviceRuntime, NmsService, ReadinessStatus};
pub use xml::{XmlError, XmlNode};
