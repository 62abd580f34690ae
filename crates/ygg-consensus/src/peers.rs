use ygg_types::{Location, Peer, YggError};

/// Renders peers as `host:port:0,host:port:0`, the raft location of each
/// replica followed by its replica index (always 0: one replica per store).
pub fn format_peers(peers: &[Peer]) -> String {
    peers
        .iter()
        .map(|p| format!("{}:{}:0", p.raft_location.host, p.raft_location.port))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parses the format produced by [`format_peers`]. The index component is
/// optional.
pub fn parse_peers(s: &str) -> Result<Vec<Location>, YggError> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            let mut parts = p.split(':');
            let host = parts.next().filter(|h| !h.is_empty());
            let port = parts.next().and_then(|port| port.parse::<u16>().ok());
            let index_ok = parts.next().map_or(true, |i| i.parse::<u32>().is_ok());
            match (host, port, index_ok, parts.next()) {
                (Some(host), Some(port), true, None) => Ok(Location::new(host, port)),
                _ => Err(YggError::InvalidArgument(format!("malformed peer '{p}'"))),
            }
        })
        .collect()
}
