use std::{net::IpAddr, str::FromStr};

use actix_web::HttpRequest;
use log::trace;

/// Get the remote IP address for the request. Sources, in decreasing order of preference:
/// 1. The first element of the `X-Forwarded-For` header.
/// 2. The `X-Real-IP` header.
/// 3. The peer address of the connection.
///
/// The headers are client-controlled unless a trusted proxy sets them; rate limit keys derived
/// from this are best-effort, not a security boundary.
pub fn get_remote_ip(req: &HttpRequest) -> Option<IpAddr> {
    let forwarded_for = req
        .headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|s| IpAddr::from_str(s.trim()).ok());
    if let Some(ip) = forwarded_for {
        trace!("Using X-Forwarded-For header for remote address: {ip}");
        return Some(ip);
    }
    let real_ip = req
        .headers()
        .get("X-Real-IP")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| IpAddr::from_str(s.trim()).ok());
    if let Some(ip) = real_ip {
        trace!("Using X-Real-IP header for remote address: {ip}");
        return Some(ip);
    }
    // ConnectionInfo::peer_addr is the IP without the port.
    let peer = req.connection_info().peer_addr().and_then(|s| IpAddr::from_str(s).ok());
    trace!("Using peer address for remote address: {peer:?}");
    peer
}
