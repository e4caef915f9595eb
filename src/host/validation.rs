//! Request validation for host create/update.
//!
//! # Design Decisions
//! - Returns all field errors, not just the first
//! - Pure functions; uniqueness checks need the store and live in the service

use std::net::IpAddr;
use thiserror::Error;

use crate::host::model::{CreateHostRequest, HostClass, UpdateHostRequest};

pub const MAX_NAME_LEN: usize = 30;

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("host name must not be empty")]
    EmptyName,
    #[error("host name exceeds {max} characters")]
    NameTooLong { max: usize },
    #[error("invalid {field} address: {value}")]
    InvalidIp { field: &'static str, value: String },
    #[error("{0} must be between 1 and 65535")]
    InvalidPort(&'static str),
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("password or private key must not be empty")]
    EmptySecret,
    #[error("test hosts require an application port")]
    MissingAppPort,
}

struct Fields<'a> {
    name: &'a str,
    host_ip: &'a str,
    ssh_port: u16,
    private_ip: Option<&'a str>,
    private_port: Option<u16>,
    username: &'a str,
    secret: &'a str,
    app_port: Option<u16>,
}

fn check(fields: Fields<'_>, class: HostClass) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    let name = fields.name.trim();
    if name.is_empty() {
        errors.push(FieldError::EmptyName);
    } else if name.chars().count() > MAX_NAME_LEN {
        errors.push(FieldError::NameTooLong { max: MAX_NAME_LEN });
    }

    if fields.host_ip.parse::<IpAddr>().is_err() {
        errors.push(FieldError::InvalidIp { field: "host", value: fields.host_ip.to_string() });
    }
    if fields.ssh_port == 0 {
        errors.push(FieldError::InvalidPort("ssh_port"));
    }

    if let Some(ip) = fields.private_ip.filter(|ip| !ip.is_empty()) {
        if ip.parse::<IpAddr>().is_err() {
            errors.push(FieldError::InvalidIp { field: "private", value: ip.to_string() });
        }
    }
    if fields.private_port == Some(0) {
        errors.push(FieldError::InvalidPort("private_port"));
    }

    if fields.username.trim().is_empty() {
        errors.push(FieldError::EmptyUsername);
    }
    if fields.secret.is_empty() {
        errors.push(FieldError::EmptySecret);
    }

    match (class, fields.app_port) {
        (HostClass::Test, None) => errors.push(FieldError::MissingAppPort),
        (_, Some(0)) => errors.push(FieldError::InvalidPort("app_port")),
        _ => {}
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn validate_create(req: &CreateHostRequest) -> Result<(), Vec<FieldError>> {
    check(
        Fields {
            name: &req.name,
            host_ip: &req.host_ip,
            ssh_port: req.ssh_port,
            private_ip: req.private_ip.as_deref(),
            private_port: req.private_port,
            username: &req.username,
            secret: &req.secret,
            app_port: req.app_port,
        },
        req.class,
    )
}

/// Updates keep the host's class, so the class comes from the stored record.
pub fn validate_update(req: &UpdateHostRequest, class: HostClass) -> Result<(), Vec<FieldError>> {
    check(
        Fields {
            name: &req.name,
            host_ip: &req.host_ip,
            ssh_port: req.ssh_port,
            private_ip: req.private_ip.as_deref(),
            private_port: req.private_port,
            username: &req.username,
            secret: &req.secret,
            app_port: req.app_port,
        },
        class,
    )
}
