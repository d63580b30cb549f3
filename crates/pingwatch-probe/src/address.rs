use thiserror::Error;

const MAX_HOST_LEN: usize = 253;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("address {0:?} has no host")]
    MissingHost(String),
    #[error("host {0:?} must not start with '-'")]
    LeadingDash(String),
    #[error("address {0:?} has a non-numeric port")]
    InvalidPort(String),
    #[error("host {0:?} is longer than 253 bytes")]
    TooLong(String),
    #[error("host {host:?} contains invalid character {ch:?}")]
    InvalidCharacter { host: String, ch: char },
}

/// Reduce a target address to the bare host handed to `ping`.
///
/// Accepts plain hosts (`10.0.0.1`, `gw.example`, `fe80::1%eth0`) as well as
/// URL-shaped addresses (`https://user@host:8443/path`); scheme, user info,
/// port and path are dropped. The result never starts with `-`, so it cannot
/// be mistaken for a ping option.
pub fn probe_host(address: &str) -> Result<String, AddressError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(AddressError::Empty);
    }

    let rest = match trimmed.find("://") {
        Some(idx) => &trimmed[idx + 3..],
        None => trimmed,
    };
    let authority = rest
        .split(|c: char| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or_default();
    let authority = match authority.rfind('@') {
        Some(idx) => &authority[idx + 1..],
        None => authority,
    };

    let host = strip_port(authority, trimmed)?;
    if host.is_empty() {
        return Err(AddressError::MissingHost(trimmed.to_string()));
    }

    validate_host(host)?;
    Ok(host.to_string())
}

fn strip_port<'a>(authority: &'a str, address: &str) -> Result<&'a str, AddressError> {
    let is_port = |port: &str| port.chars().all(|c| c.is_ascii_digit());

    if let Some(inner) = authority.strip_prefix('[') {
        let end = inner
            .find(']')
            .ok_or_else(|| AddressError::MissingHost(address.to_string()))?;
        return match inner[end + 1..].strip_prefix(':') {
            Some(port) if !is_port(port) => Err(AddressError::InvalidPort(address.to_string())),
            _ => Ok(&inner[..end]),
        };
    }

    // A single colon separates a port; more than one means a bare IPv6 literal.
    match authority.split_once(':') {
        Some((_, port)) if port.contains(':') => Ok(authority),
        Some((host, port)) if is_port(port) => Ok(host),
        Some(_) => Err(AddressError::InvalidPort(address.to_string())),
        None => Ok(authority),
    }
}

fn validate_host(host: &str) -> Result<(), AddressError> {
    if host.starts_with('-') {
        return Err(AddressError::LeadingDash(host.to_string()));
    }
    if host.len() > MAX_HOST_LEN {
        return Err(AddressError::TooLong(host.to_string()));
    }
    if let Some(ch) = host
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '%')))
    {
        return Err(AddressError::InvalidCharacter {
            host: host.to_string(),
            ch,
        });
    }
    Ok(())
}
