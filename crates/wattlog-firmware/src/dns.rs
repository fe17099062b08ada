use core::net::Ipv4Addr;

use embassy_net::dns::DnsQueryType;
use embassy_net::{IpAddress, Stack};
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    #[error("DNS query failed")]
    QueryFailed,
    #[error("No A record for host")]
    NoAddress,
}

/// Resolve `host` to an IPv4 address; dotted literals skip the lookup.
pub async fn resolve(stack: Stack<'_>, host: &str) -> Result<IpAddress, ResolveError> {
    if let Ok(address) = host.parse::<Ipv4Addr>() {
        return Ok(IpAddress::Ipv4(address));
    }

    let addresses = stack
        .dns_query(host, DnsQueryType::A)
        .await
        .map_err(|_| ResolveError::QueryFailed)?;

    addresses.first().copied().ok_or(ResolveError::NoAddress)
}
