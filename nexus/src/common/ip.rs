//! IPアドレス解決ユーティリティ
//!
//! プロキシヘッダーと接続元アドレスからクライアントIPを求め、
//! IPv4-mapped IPv6アドレスをIPv4に正規化する

use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

/// IPアドレスを正規化する
///
/// IPv4-mapped IPv6（::ffff:x.x.x.x）をIPv4に変換。
/// それ以外はそのまま返す。
pub fn normalize_ip(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                IpAddr::V4(v4)
            } else {
                IpAddr::V6(v6)
            }
        }
        v4 => v4,
    }
}

/// SocketAddrからIPアドレスを抽出し正規化する
pub fn normalize_socket_ip(addr: &SocketAddr) -> IpAddr {
    normalize_ip(addr.ip())
}

/// クライアントIPを解決する
///
/// `X-Forwarded-For`（先頭ホップ）→ `X-Real-IP` → 接続元アドレスの順に参照する。
/// ヘッダー値がIPとして解釈できる場合は正規化し、できない場合は文字列のまま返す。
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<&SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim())
        .filter(|s| !s.is_empty());

    if let Some(raw) = forwarded {
        return Some(match raw.parse::<IpAddr>() {
            Ok(ip) => normalize_ip(ip).to_string(),
            Err(_) => raw.to_string(),
        });
    }

    peer.map(|addr| normalize_socket_ip(addr).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_normalize_ipv4_mapped() {
        let mapped: IpAddr = "::ffff:192.168.1.10".parse().unwrap();
        assert_eq!(normalize_ip(mapped).to_string(), "192.168.1.10");

        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        assert_eq!(normalize_ip(v6), v6);
    }

    #[test]
    fn test_resolve_prefers_forwarded_for_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();

        assert_eq!(
            resolve_client_ip(&headers, Some(&peer)).as_deref(),
            Some("203.0.113.7")
        );
    }

    #[test]
    fn test_resolve_falls_back_to_real_ip_then_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.5"));
        assert_eq!(
            resolve_client_ip(&headers, None).as_deref(),
            Some("10.0.0.5")
        );

        let peer: SocketAddr = "[::ffff:127.0.0.1]:5000".parse().unwrap();
        assert_eq!(
            resolve_client_ip(&HeaderMap::new(), Some(&peer)).as_deref(),
            Some("127.0.0.1")
        );
    }

    #[test]
    fn test_resolve_none_without_any_source() {
        assert!(resolve_client_ip(&HeaderMap::new(), None).is_none());
    }
}
