use std::{fmt, str::FromStr};

use anyhow::{anyhow, bail, Result};

/// A proxy as entered by the user: `ip:port` or `ip:port:user:pass`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proxy {
    pub host: String,
    pub port: u16,
    pub credentials: Option<(String, String)>,
}

impl Proxy {
    pub fn to_rules(&self) -> String {
        match &self.credentials {
            Some((user, pass)) => format!("http://{user}:{pass}@{}:{}", self.host, self.port),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }
}

impl FromStr for Proxy {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<Self> {
        let parts: Vec<&str> = input.trim().split(':').collect();
        let (host, port, credentials) = match parts.as_slice() {
            [host, port] => (*host, *port, None),
            [host, port, user, pass] => (*host, *port, Some((user.to_string(), pass.to_string()))),
            _ => bail!("unsupported proxy format '{input}'"),
        };

        if host.is_empty() {
            bail!("proxy '{input}' has no host");
        }
        let port = port
            .parse::<u16>()
            .map_err(|err| anyhow!("proxy '{input}' has invalid port: {err}"))?;

        Ok(Self {
            host: host.to_string(),
            port,
            credentials,
        })
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.credentials {
            Some((user, pass)) => write!(f, "{}:{}:{user}:{pass}", self.host, self.port),
            None => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

/// Turns a stored proxy string into proxy rules.
///
/// Values that already look like rules (`http...`) and `localhost` pass
/// through untouched. Anything unparsable yields `None`, which callers treat
/// as a direct connection.
pub fn format_proxy(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with("http") || trimmed == "localhost" {
        return Some(trimmed.to_string());
    }
    trimmed.parse::<Proxy>().ok().map(|proxy| proxy.to_rules())
}
