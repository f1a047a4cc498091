// ── Radio identity ──
//
// Physical resources carry a `uniqueid` of the form
// `00:15:8d:00:01:02:03:04-01-0402`: the device's 64-bit radio address,
// then the endpoint, then (optionally) the cluster. Everything else
// (CLIP sensors, groups, malformed ids) is virtual.

use std::fmt;
use std::str::FromStr;

const ADDRESS_OCTETS: usize = 8;

/// Parsed `uniqueid` of a physical resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniqueId {
    address: String,
    endpoint: Option<String>,
    cluster: Option<String>,
}

impl UniqueId {
    /// Parse a `uniqueid`. Returns `None` unless it has the physical shape.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split('-');
        let address = parts.next()?;
        let endpoint = parts.next();
        let cluster = parts.next();
        if parts.next().is_some() {
            return None;
        }

        let octets: Vec<&str> = address.split(':').collect();
        if octets.len() != ADDRESS_OCTETS || !octets.iter().all(|o| is_hex(o, 2)) {
            return None;
        }
        if endpoint.is_some_and(|e| !is_hex(e, 2)) || cluster.is_some_and(|c| !is_hex(c, 4)) {
            return None;
        }

        Some(Self {
            address: address.to_owned(),
            endpoint: endpoint.map(str::to_ascii_lowercase),
            cluster: cluster.map(str::to_ascii_lowercase),
        })
    }

    /// Radio address exactly as the gateway reported it.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Device id: the radio address as bare uppercase hex.
    pub fn device_id(&self) -> String {
        self.address.replace(':', "").to_ascii_uppercase()
    }

    /// Subtype: `endpoint[-cluster]`, or `00` when the id has neither.
    pub fn subtype(&self) -> String {
        match (&self.endpoint, &self.cluster) {
            (Some(endpoint), Some(cluster)) => format!("{endpoint}-{cluster}"),
            (Some(endpoint), None) => endpoint.clone(),
            _ => "00".into(),
        }
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)?;
        if let Some(endpoint) = &self.endpoint {
            write!(f, "-{endpoint}")?;
        }
        if let Some(cluster) = &self.cluster {
            write!(f, "-{cluster}")?;
        }
        Ok(())
    }
}

impl FromStr for UniqueId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("{s}: not a physical uniqueid"))
    }
}

fn is_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}
