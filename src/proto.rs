// Copyright © 2024 The Johns Hopkins Applied Physics Laboratory LLC.
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Affero General Public License,
// version 3, as published by the Free Software Foundation.  If you
// would like to purchase a commercial license for this software, please
// contact APL’s Tech Transfer at 240-592-0817 or
// techtransfer@jhuapl.edu.
//
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

//! Low-level protocol encoding functions.
//!
//! Encoders write a complete message into a [Write] instance (in
//! practice the client's scratch buffer).  Decoders take exact-length
//! slices: the receive driver only hands off once the full message
//! has accumulated.
use std::io::Error;
use std::io::Write;
use std::net::IpAddr;
use std::net::SocketAddr;

#[cfg(feature = "log")]
use log::error;
#[cfg(feature = "log")]
use log::trace;

use crate::error::SOCKS5ClientError;
use crate::params::AuthNInfo;
use crate::params::AuthNMech;

pub(crate) const IPV4: u8 = 0x01;
pub(crate) const NAME: u8 = 0x03;
pub(crate) const IPV6: u8 = 0x04;

pub(crate) const VERSION: u8 = 0x05;
pub(crate) const AUTHN_VERSION: u8 = 0x01;

pub(crate) const CMD_CONNECT: u8 = 0x01;
pub(crate) const CMD_SUCCESS: u8 = 0x00;

pub(crate) const NO_AUTH: u8 = 0x00;
pub(crate) const PASSWORD: u8 = 0x02;
pub(crate) const NO_METHODS: u8 = 0xff;

/// Size of the fixed CONNECT reply prefix: VER, REP, RSV, ATYP, and
/// the first byte of the bound-address tail.
pub(crate) const REPLY_HEADER_LEN: usize = 5;

/// Upper bound on any single handshake message, in either direction.
///
/// Greeting ≤ 2 + 255; username/password request ≤ 3 + 2·255;
/// CONNECT request = 22 (IPv6); reply ≤ 4 + 256 + 2.
pub(crate) const MAX_MSG_LEN: usize = 515;

/// Derive the wire METHODS list from the caller's ordered
/// authentication descriptors.
///
/// Maps each descriptor to its method code and deduplicates while
/// preserving the caller's preference order.
pub(crate) fn method_codes(authn: &[AuthNInfo]) -> Vec<u8> {
    let mut codes: Vec<u8> = Vec::with_capacity(authn.len());

    for info in authn {
        let code = info.mech().code();

        if !codes.contains(&code) {
            codes.push(code)
        }
    }

    codes
}

/// Write the method-selection greeting.
///
/// This is the first client protocol message, stating the available
/// authentication methods in preference order.
pub(crate) fn write_greeting<S>(
    stream: &mut S,
    authn: &[AuthNInfo]
) -> Result<(), Error>
where
    S: Write {
    let codes = method_codes(authn);

    #[cfg(feature = "log")]
    trace!(target: "socks5-client",
           "sending greeting with {} method(s)",
           codes.len());

    stream.write_all(&[VERSION, codes.len() as u8])?;
    stream.write_all(&codes)
}

/// Parse the 2-byte method-selection reply.
///
/// The selected method must be one the client offered, and one this
/// implementation knows how to carry out.
pub(crate) fn parse_method_reply(
    buf: &[u8],
    offered: &[u8]
) -> Result<AuthNMech, SOCKS5ClientError> {
    debug_assert_eq!(buf.len(), 2);

    if buf[0] != VERSION {
        return Err(SOCKS5ClientError::BadVersion { version: buf[0] });
    }

    match buf[1] {
        NO_METHODS => {
            #[cfg(feature = "log")]
            error!(target: "socks5-client",
                   "proxy reported no acceptable authentication methods");

            Err(SOCKS5ClientError::NoAuthNMethods)
        }
        method if !offered.contains(&method) => {
            #[cfg(feature = "log")]
            error!(target: "socks5-client",
                   "proxy selected method {:#04x}, which was not offered",
                   method);

            Err(SOCKS5ClientError::UnknownAuthNMethod { method: method })
        }
        NO_AUTH => Ok(AuthNMech::None),
        PASSWORD => Ok(AuthNMech::Password),
        method => {
            Err(SOCKS5ClientError::UnknownAuthNMethod { method: method })
        }
    }
}

/// Write the RFC 1929 username/password subnegotiation request.
///
/// Length limits are enforced at parameter validation; this rechecks
/// them as the wire format cannot represent anything else.
pub(crate) fn write_password_authn<S>(
    stream: &mut S,
    username: &[u8],
    password: &[u8]
) -> Result<(), SOCKS5ClientError>
where
    S: Write {
    #[cfg(feature = "log")]
    trace!(target: "socks5-client",
           "sending username/password subnegotiation");

    if username.is_empty() || username.len() > 255 {
        return Err(SOCKS5ClientError::BadCredentialLen {
            len: username.len()
        });
    }

    if password.is_empty() || password.len() > 255 {
        return Err(SOCKS5ClientError::BadCredentialLen {
            len: password.len()
        });
    }

    let mut buf = Vec::with_capacity(3 + username.len() + password.len());

    buf.push(AUTHN_VERSION);
    buf.push(username.len() as u8);
    buf.extend(username);
    buf.push(password.len() as u8);
    buf.extend(password);

    stream
        .write_all(&buf)
        .map_err(|err| SOCKS5ClientError::IOError { error: err })
}

/// Parse the 2-byte username/password subnegotiation reply.
///
/// The reply version is `0x01`: the subnegotiation has its own
/// protocol version, distinct from the SOCKS version.
pub(crate) fn parse_password_authn_reply(
    buf: &[u8]
) -> Result<(), SOCKS5ClientError> {
    debug_assert_eq!(buf.len(), 2);

    if buf[0] != AUTHN_VERSION {
        return Err(SOCKS5ClientError::BadAuthNVersion { version: buf[0] });
    }

    // Zero indicates success.
    if buf[1] == 0 {
        Ok(())
    } else {
        #[cfg(feature = "log")]
        error!(target: "socks5-client",
               "proxy rejected credentials (status {})",
               buf[1]);

        Err(SOCKS5ClientError::AuthNFailed { status: buf[1] })
    }
}

/// Write the CONNECT request for a resolved destination address.
///
/// Only IPv4 and IPv6 destinations are encoded; callers resolve names
/// themselves in this design.
pub(crate) fn write_connect<S>(
    stream: &mut S,
    dest: &SocketAddr
) -> Result<(), Error>
where
    S: Write {
    #[cfg(feature = "log")]
    trace!(target: "socks5-client",
           "sending connect request for {}",
           dest);

    let port = dest.port();
    let port_hi = (port >> 8) as u8;
    let port_lo = (port & 0xff) as u8;

    match dest.ip() {
        IpAddr::V4(addr) => {
            let octets = addr.octets();
            let buf = [
                VERSION, CMD_CONNECT, 0x00, IPV4, octets[0], octets[1],
                octets[2], octets[3], port_hi, port_lo
            ];

            stream.write_all(&buf)
        }
        IpAddr::V6(addr) => {
            let octets = addr.octets();
            let mut buf = [0; 22];

            buf[0] = VERSION;
            buf[1] = CMD_CONNECT;
            buf[2] = 0x00;
            buf[3] = IPV6;
            buf[4..20].copy_from_slice(&octets);
            buf[20] = port_hi;
            buf[21] = port_lo;

            stream.write_all(&buf)
        }
    }
}

/// Parse the fixed 5-byte prefix of the CONNECT reply and compute the
/// length of the remaining bound-address tail.
///
/// The fifth byte belongs to the tail; for a domain-name reply it is
/// the name length, so reading it up front makes the remainder a
/// fixed-size read in every case.  Returns the number of tail bytes
/// still to be consumed: 5 for IPv4, 17 for IPv6, and name length + 2
/// for a domain name.
pub(crate) fn parse_reply_header(
    buf: &[u8]
) -> Result<usize, SOCKS5ClientError> {
    debug_assert_eq!(buf.len(), REPLY_HEADER_LEN);

    if buf[0] != VERSION {
        return Err(SOCKS5ClientError::BadVersion { version: buf[0] });
    }

    if buf[1] != CMD_SUCCESS {
        #[cfg(feature = "log")]
        error!(target: "socks5-client",
               "proxy rejected connect request (code {:#04x})",
               buf[1]);

        return Err(SOCKS5ClientError::from_cmd_reply(buf[1]));
    }

    if buf[2] != 0x00 {
        return Err(SOCKS5ClientError::BadReserved { reserved: buf[2] });
    }

    match buf[3] {
        IPV4 => Ok(3 + 2),
        IPV6 => Ok(15 + 2),
        NAME => Ok(buf[4] as usize + 2),
        ty => Err(SOCKS5ClientError::BadAddrType { ty: ty })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_codes_dedup() {
        let authn = [
            AuthNInfo::password("a", "b"),
            AuthNInfo::password("c", "d"),
            AuthNInfo::None,
        ];

        assert_eq!(method_codes(&authn), vec![PASSWORD, NO_AUTH]);
    }

    #[test]
    fn test_write_greeting_no_auth() {
        let mut buf = Vec::with_capacity(3);
        let expected = [0x05, 0x01, 0x00];

        write_greeting(&mut buf, &[AuthNInfo::None])
            .expect("Expected success");

        assert_eq!(&buf, &expected);
    }

    #[test]
    fn test_write_greeting_password_preferred() {
        let mut buf = Vec::with_capacity(4);
        let expected = [0x05, 0x02, 0x02, 0x00];

        write_greeting(
            &mut buf,
            &[AuthNInfo::password("user", "pass"), AuthNInfo::None]
        )
        .expect("Expected success");

        assert_eq!(&buf, &expected);
    }

    #[test]
    fn test_parse_method_reply_none() {
        let res = parse_method_reply(&[0x05, 0x00], &[0x00])
            .expect("Expected success");

        assert_eq!(res, AuthNMech::None);
    }

    #[test]
    fn test_parse_method_reply_password() {
        let res = parse_method_reply(&[0x05, 0x02], &[0x02, 0x00])
            .expect("Expected success");

        assert_eq!(res, AuthNMech::Password);
    }

    #[test]
    fn test_parse_method_reply_bad_version() {
        match parse_method_reply(&[0x04, 0x00], &[0x00]) {
            Err(SOCKS5ClientError::BadVersion { version: 0x04 }) => {}
            res => panic!("Expected bad version, got {:?}", res)
        }
    }

    #[test]
    fn test_parse_method_reply_no_methods() {
        match parse_method_reply(&[0x05, 0xff], &[0x00]) {
            Err(SOCKS5ClientError::NoAuthNMethods) => {}
            res => panic!("Expected no methods, got {:?}", res)
        }
    }

    #[test]
    fn test_parse_method_reply_not_offered() {
        // Password is a known method, but only no-auth was offered.
        match parse_method_reply(&[0x05, 0x02], &[0x00]) {
            Err(SOCKS5ClientError::UnknownAuthNMethod { method: 0x02 }) => {}
            res => panic!("Expected unknown method, got {:?}", res)
        }
    }

    #[test]
    fn test_parse_method_reply_unimplemented() {
        // GSSAPI is never offered, so it can never be accepted.
        match parse_method_reply(&[0x05, 0x01], &[0x00, 0x02]) {
            Err(SOCKS5ClientError::UnknownAuthNMethod { method: 0x01 }) => {}
            res => panic!("Expected unknown method, got {:?}", res)
        }
    }

    #[test]
    fn test_write_password_authn() {
        let mut buf = Vec::with_capacity(11);
        let expected = [
            0x01, 0x04, 0x75, 0x73, 0x65, 0x72, 0x04, 0x70, 0x61, 0x73, 0x73
        ];

        write_password_authn(&mut buf, b"user", b"pass")
            .expect("Expected success");

        assert_eq!(&buf, &expected);
    }

    #[test]
    fn test_write_password_authn_too_long() {
        let mut buf = Vec::new();
        let username = vec![0x61; 256];

        match write_password_authn(&mut buf, &username, b"pass") {
            Err(SOCKS5ClientError::BadCredentialLen { len: 256 }) => {}
            res => panic!("Expected bad credential len, got {:?}", res)
        }
    }

    #[test]
    fn test_parse_password_authn_reply_success() {
        parse_password_authn_reply(&[0x01, 0x00]).expect("Expected success");
    }

    #[test]
    fn test_parse_password_authn_reply_fail() {
        match parse_password_authn_reply(&[0x01, 0x01]) {
            Err(SOCKS5ClientError::AuthNFailed { status: 0x01 }) => {}
            res => panic!("Expected authn failed, got {:?}", res)
        }
    }

    #[test]
    fn test_parse_password_authn_reply_bad_version() {
        // The subnegotiation version is 0x01, not the SOCKS version.
        match parse_password_authn_reply(&[0x05, 0x00]) {
            Err(SOCKS5ClientError::BadAuthNVersion { version: 0x05 }) => {}
            res => panic!("Expected bad authn version, got {:?}", res)
        }
    }

    #[test]
    fn test_write_connect_ipv4() {
        let mut buf = Vec::with_capacity(10);
        let dest: SocketAddr = "203.0.113.5:443".parse().unwrap();
        let expected = [
            0x05, 0x01, 0x00, 0x01, 0xcb, 0x00, 0x71, 0x05, 0x01, 0xbb
        ];

        write_connect(&mut buf, &dest).expect("Expected success");

        assert_eq!(&buf, &expected);
    }

    #[test]
    fn test_write_connect_ipv6() {
        let mut buf = Vec::with_capacity(22);
        let dest: SocketAddr = "[::1]:80".parse().unwrap();
        let expected = [
            0x05, 0x01, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x50
        ];

        write_connect(&mut buf, &dest).expect("Expected success");

        assert_eq!(&buf, &expected);
    }

    #[test]
    fn test_parse_reply_header_ipv4() {
        let len = parse_reply_header(&[0x05, 0x00, 0x00, 0x01, 0x00])
            .expect("Expected success");

        assert_eq!(len, 5);
    }

    #[test]
    fn test_parse_reply_header_ipv6() {
        let len = parse_reply_header(&[0x05, 0x00, 0x00, 0x04, 0x00])
            .expect("Expected success");

        assert_eq!(len, 17);
    }

    #[test]
    fn test_parse_reply_header_name() {
        for len in [1usize, 10, 255] {
            let tail =
                parse_reply_header(&[0x05, 0x00, 0x00, 0x03, len as u8])
                    .expect("Expected success");

            assert_eq!(tail, len + 2);
        }
    }

    #[test]
    fn test_parse_reply_header_bad_version() {
        match parse_reply_header(&[0x04, 0x00, 0x00, 0x01, 0x00]) {
            Err(SOCKS5ClientError::BadVersion { version: 0x04 }) => {}
            res => panic!("Expected bad version, got {:?}", res)
        }
    }

    #[test]
    fn test_parse_reply_header_bad_reserved() {
        match parse_reply_header(&[0x05, 0x00, 0x01, 0x01, 0x00]) {
            Err(SOCKS5ClientError::BadReserved { reserved: 0x01 }) => {}
            res => panic!("Expected bad reserved, got {:?}", res)
        }
    }

    #[test]
    fn test_parse_reply_header_bad_addr_type() {
        match parse_reply_header(&[0x05, 0x00, 0x00, 0x06, 0x00]) {
            Err(SOCKS5ClientError::BadAddrType { ty: 0x06 }) => {}
            res => panic!("Expected bad address type, got {:?}", res)
        }
    }

    #[test]
    fn test_parse_reply_header_refused() {
        match parse_reply_header(&[0x05, 0x05, 0x00, 0x01, 0x00]) {
            Err(SOCKS5ClientError::ConnectionRefused) => {}
            res => panic!("Expected connection refused, got {:?}", res)
        }
    }

    #[test]
    fn test_parse_reply_header_rejections() {
        for kind in 0x01u8..=0x08 {
            let res = parse_reply_header(&[0x05, kind, 0x00, 0x01, 0x00]);

            assert!(res.is_err());
        }
    }
}
