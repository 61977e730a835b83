//! Centralized validation functions for jailctl.
//!
//! Everything a caller hands us is validated here before it reaches a
//! command line, a remote shell or a config file:
//! - jail and filter names
//! - IP addresses and CIDR ranges
//! - fail2ban time values (bantime, findtime)
//! - single-line config values
//! - log path globs

use ipnet::IpNet;
use std::net::IpAddr;

use crate::error::{JailctlError, Result};

/// Section names fail2ban reserves; they can never be jails.
pub const RESERVED_SECTIONS: &[&str] = &["DEFAULT", "INCLUDES"];

/// Maximum length of a jail or filter name
pub const MAX_NAME_LEN: usize = 128;

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// True if `name` is `DEFAULT` or `INCLUDES`, in any case.
pub fn is_reserved_section(name: &str) -> bool {
    RESERVED_SECTIONS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

/// Validate a jail name: `[A-Za-z0-9_-]{1,128}`, not a reserved section.
///
/// # Examples
/// ```
/// use jailctl::validation::validate_jail_name;
/// assert!(validate_jail_name("sshd").is_ok());
/// assert!(validate_jail_name("nginx-http-auth").is_ok());
/// assert!(validate_jail_name("default").is_err());
/// assert!(validate_jail_name("../etc").is_err());
/// ```
pub fn validate_jail_name(name: &str) -> Result<()> {
    validate_name("jail", name)?;
    if is_reserved_section(name) {
        return Err(JailctlError::validation(format!(
            "'{}' is a reserved section name and cannot be used as a jail",
            name
        )));
    }
    Ok(())
}

/// Validate a filter name. Filters share the jail character set but
/// `DEFAULT`/`INCLUDES` are not special for them.
///
/// # Examples
/// ```
/// use jailctl::validation::validate_filter_name;
/// assert!(validate_filter_name("nginx-botsearch").is_ok());
/// assert!(validate_filter_name("sshd.conf").is_err());
/// ```
pub fn validate_filter_name(name: &str) -> Result<()> {
    validate_name("filter", name)
}

fn validate_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(JailctlError::validation(format!(
            "{} name cannot be empty",
            what
        )));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(JailctlError::validation(format!(
            "{} name exceeds {} characters",
            what, MAX_NAME_LEN
        )));
    }
    if !name.chars().all(is_name_char) {
        return Err(JailctlError::validation(format!(
            "Invalid {} name '{}'. Only letters, digits, '_' and '-' are allowed",
            what, name
        )));
    }
    Ok(())
}

/// Validate an IP address string and return the parsed IpAddr.
///
/// # Examples
/// ```
/// use jailctl::validation::validate_ip;
/// assert!(validate_ip("192.168.1.1").is_ok());
/// assert!(validate_ip("::1").is_ok());
/// assert!(validate_ip("invalid").is_err());
/// ```
pub fn validate_ip(ip_str: &str) -> Result<IpAddr> {
    ip_str
        .parse()
        .map_err(|_| JailctlError::validation(format!("Invalid IP address: {}", ip_str)))
}

/// Validate an IP address or CIDR string and return the parsed IpNet.
///
/// If the input is a plain IP address (without /prefix), it will be converted
/// to a /32 (IPv4) or /128 (IPv6) network.
pub fn validate_ip_or_cidr(ip_str: &str) -> Result<IpNet> {
    if ip_str.contains('/') {
        ip_str
            .parse()
            .map_err(|_| JailctlError::validation(format!("Invalid CIDR: {}", ip_str)))
    } else {
        let ip = validate_ip(ip_str)?;
        Ok(IpNet::from(ip))
    }
}

/// Check a fail2ban time value: `-1`, plain seconds, or a number with one of
/// the suffixes `s`, `m`, `h`, `d`, `w`.
///
/// Requires ASCII-only input to prevent Unicode-related edge cases.
///
/// # Examples
/// ```
/// use jailctl::validation::is_valid_time_value;
/// assert!(is_valid_time_value("600"));
/// assert!(is_valid_time_value("10m"));
/// assert!(is_valid_time_value("-1"));
/// assert!(!is_valid_time_value("4x"));
/// assert!(!is_valid_time_value(""));
/// ```
pub fn is_valid_time_value(value: &str) -> bool {
    if !value.is_ascii() || value.is_empty() {
        return false;
    }
    if value == "-1" {
        return true;
    }

    let (num_part, suffix) = match value.chars().last() {
        Some(c) if c.is_ascii_digit() => (value, None),
        Some(c) => (&value[..value.len() - 1], Some(c)),
        None => return false,
    };

    let suffix_ok = matches!(suffix, None | Some('s' | 'm' | 'h' | 'd' | 'w'));
    suffix_ok && !num_part.is_empty() && num_part.parse::<u32>().is_ok()
}

/// Validate a fail2ban time value with a descriptive error.
pub fn validate_time_value(key: &str, value: &str) -> Result<()> {
    if is_valid_time_value(value) {
        Ok(())
    } else {
        Err(JailctlError::validation(format!(
            "Invalid {} '{}'. Use seconds or a value like '10m', '1h', '1d', or -1",
            key, value
        )))
    }
}

/// Validate a value destined for a single `key = value` config line.
pub fn validate_config_value(key: &str, value: &str) -> Result<()> {
    if value.contains('\n') || value.contains('\r') {
        return Err(JailctlError::validation(format!(
            "Value for '{}' must not contain newline characters",
            key
        )));
    }
    if value.chars().any(|c| c.is_control() && c != '\t') {
        return Err(JailctlError::validation(format!(
            "Value for '{}' contains control characters",
            key
        )));
    }
    Ok(())
}

/// Validate a log path pattern before it is globbed, possibly by a remote
/// shell. Only absolute paths made of a conservative character set are
/// accepted.
///
/// # Examples
/// ```
/// use jailctl::validation::validate_log_pattern;
/// assert!(validate_log_pattern("/var/log/nginx/*.log").is_ok());
/// assert!(validate_log_pattern("/var/log/$(id)").is_err());
/// assert!(validate_log_pattern("relative.log").is_err());
/// ```
pub fn validate_log_pattern(pattern: &str) -> Result<()> {
    if !pattern.starts_with('/') {
        return Err(JailctlError::validation(format!(
            "Log path '{}' must be absolute",
            pattern
        )));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || "/._-*?[]!+@%:,".contains(c);
    if !pattern.chars().all(allowed) {
        return Err(JailctlError::validation(format!(
            "Log path '{}' contains unsupported characters",
            pattern
        )));
    }
    Ok(())
}
