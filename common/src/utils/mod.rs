// Parsed gRPC endpoint, as used for peers, orderers and event hubs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint<'a> {
    pub tls: bool,
    pub host: &'a str,
    pub port: u16,
}

// Parse an endpoint of the form grpc://host:port or grpcs://host:port
// A missing scheme is not accepted: TLS must be an explicit choice
pub fn parse_endpoint(url: &str) -> Option<Endpoint<'_>> {
    let (tls, rest) = if let Some(rest) = url.strip_prefix("grpcs://") {
        (true, rest)
    } else if let Some(rest) = url.strip_prefix("grpc://") {
        (false, rest)
    } else if let Some(rest) = url.strip_prefix("https://") {
        (true, rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        (false, rest)
    } else {
        return None;
    };

    let rest = rest.trim_end_matches('/');
    let (host, port) = rest.rsplit_once(':')?;
    if host.is_empty() {
        return None;
    }

    let port = port.parse().ok()?;
    Some(Endpoint { tls, host, port })
}

// Render a short preview of a payload for log lines
pub fn preview_payload(payload: &[u8], max: usize) -> String {
    match std::str::from_utf8(payload) {
        Ok(s) if s.len() <= max => s.to_owned(),
        Ok(s) => {
            let mut end = max;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... ({} bytes)", &s[..end], payload.len())
        }
        Err(_) => format!("<{} binary bytes>", payload.len()),
    }
}
