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

//! Errors that can occur while negotiating a SOCKS5 connection.
use std::fmt::Display;
use std::fmt::Formatter;
use std::io::Error;

/// Coarse-grained events reported to the user of a
/// [SOCKS5Client](crate::state::SOCKS5Client).
///
/// At most one [Up](ClientEvent::Up) and at most one terminal event
/// ([Error](ClientEvent::Error) or
/// [ErrorClosed](ClientEvent::ErrorClosed)) are reported over the
/// lifetime of a client, and `Up` is only ever reported before a
/// terminal event.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ClientEvent {
    /// The handshake completed; the stream interfaces are usable.
    Up,
    /// A local failure occurred before any SOCKS5 bytes were
    /// exchanged.
    Error,
    /// The connection to the proxy was open and has been closed,
    /// either by a transport failure or a protocol violation.
    ErrorClosed
}

/// Errors that can occur in the SOCKS5 client negotiation.
#[derive(Debug)]
pub enum SOCKS5ClientError {
    /// A low-level IO error occurred on the proxy connection.
    IOError {
        /// The IO-level error.
        error: Error
    },
    /// The connector failed before the proxy connection was
    /// established.
    ConnectFailed {
        /// The connector's error.
        error: Error
    },
    /// The proxy closed the connection mid-handshake.
    ConnectionClosed,
    /// Wrong SOCKS protocol version.
    BadVersion {
        /// The protocol version.
        version: u8
    },
    /// Wrong username/password subnegotiation version.
    BadAuthNVersion {
        /// The subnegotiation version.
        version: u8
    },
    /// Wrong reserved value.
    BadReserved {
        /// The value in the reserved slot.
        reserved: u8
    },
    /// Unknown address type in the command reply.
    BadAddrType {
        /// Address type.
        ty: u8
    },
    /// Proxy selected a method the client did not offer, or one this
    /// implementation does not support.
    UnknownAuthNMethod {
        /// Authentication method code.
        method: u8
    },
    /// Proxy rejected all offered authentication methods.
    NoAuthNMethods,
    /// Username/password authentication failed.
    AuthNFailed {
        /// The nonzero subnegotiation status.
        status: u8
    },
    /// Internal proxy server failure.
    ServerFailure,
    /// Proxy reported permission denied.
    PermissionDenied,
    /// Proxy reported network unreachable.
    NetworkUnreachable,
    /// Proxy reported host unreachable.
    HostUnreachable,
    /// Proxy reported connection refused.
    ConnectionRefused,
    /// Proxy reported TTL expired.
    TTLExpired,
    /// Proxy reported command not supported.
    CmdNotSupported,
    /// Proxy reported address type not supported.
    AddrTypeNotSupported,
    /// Unknown command reply code.
    BadCmdReplyKind {
        /// The reply code.
        kind: u8
    },
    /// Username or password outside of 1..=255 bytes.
    BadCredentialLen {
        /// The offending length.
        len: usize
    },
    /// No authentication methods were supplied.
    NoAuthNInfo
}

impl SOCKS5ClientError {
    /// Decode a nonzero CONNECT reply code into an error.
    pub(crate) fn from_cmd_reply(kind: u8) -> SOCKS5ClientError {
        match kind {
            0x01 => SOCKS5ClientError::ServerFailure,
            0x02 => SOCKS5ClientError::PermissionDenied,
            0x03 => SOCKS5ClientError::NetworkUnreachable,
            0x04 => SOCKS5ClientError::HostUnreachable,
            0x05 => SOCKS5ClientError::ConnectionRefused,
            0x06 => SOCKS5ClientError::TTLExpired,
            0x07 => SOCKS5ClientError::CmdNotSupported,
            0x08 => SOCKS5ClientError::AddrTypeNotSupported,
            kind => SOCKS5ClientError::BadCmdReplyKind { kind: kind }
        }
    }

    /// Classify this error as the terminal event it dispatches.
    ///
    /// Local failures that happen before any SOCKS5 bytes are
    /// exchanged classify as [Error](ClientEvent::Error); transport
    /// and protocol failures on an open connection classify as
    /// [ErrorClosed](ClientEvent::ErrorClosed).  Finer diagnostic
    /// detail (the reply code, the subnegotiation status, the phase)
    /// travels through logs and
    /// [last_error](crate::state::SOCKS5Client::last_error), never
    /// through the event code.
    pub fn terminal_event(&self) -> ClientEvent {
        match self {
            // Failures before any bytes were exchanged.
            SOCKS5ClientError::ConnectFailed { .. } |
            SOCKS5ClientError::BadCredentialLen { .. } |
            SOCKS5ClientError::NoAuthNInfo => ClientEvent::Error,
            // Transport failures on the open connection.
            SOCKS5ClientError::IOError { .. } |
            SOCKS5ClientError::ConnectionClosed => ClientEvent::ErrorClosed,
            // Protocol violations and remote rejections.
            SOCKS5ClientError::BadVersion { .. } |
            SOCKS5ClientError::BadAuthNVersion { .. } |
            SOCKS5ClientError::BadReserved { .. } |
            SOCKS5ClientError::BadAddrType { .. } |
            SOCKS5ClientError::UnknownAuthNMethod { .. } |
            SOCKS5ClientError::NoAuthNMethods |
            SOCKS5ClientError::AuthNFailed { .. } |
            SOCKS5ClientError::ServerFailure |
            SOCKS5ClientError::PermissionDenied |
            SOCKS5ClientError::NetworkUnreachable |
            SOCKS5ClientError::HostUnreachable |
            SOCKS5ClientError::ConnectionRefused |
            SOCKS5ClientError::TTLExpired |
            SOCKS5ClientError::CmdNotSupported |
            SOCKS5ClientError::AddrTypeNotSupported |
            SOCKS5ClientError::BadCmdReplyKind { .. } => {
                ClientEvent::ErrorClosed
            }
        }
    }
}

impl Display for SOCKS5ClientError {
    fn fmt(
        &self,
        f: &mut Formatter
    ) -> Result<(), std::fmt::Error> {
        match self {
            SOCKS5ClientError::IOError { error } => write!(f, "{}", error),
            SOCKS5ClientError::ConnectFailed { error } => {
                write!(f, "connection to proxy failed ({})", error)
            }
            SOCKS5ClientError::ConnectionClosed => {
                write!(f, "proxy closed the connection")
            }
            SOCKS5ClientError::BadVersion { version } => {
                write!(f, "bad protocol version {}", version)
            }
            SOCKS5ClientError::BadAuthNVersion { version } => {
                write!(f, "bad subnegotiation version {}", version)
            }
            SOCKS5ClientError::BadReserved { reserved } => {
                write!(f, "bad reserved value ({})", reserved)
            }
            SOCKS5ClientError::BadAddrType { ty } => {
                write!(f, "bad address type ({})", ty)
            }
            SOCKS5ClientError::UnknownAuthNMethod { method } => {
                write!(f, "proxy selected unusable method ({})", method)
            }
            SOCKS5ClientError::NoAuthNMethods => {
                write!(f, "no acceptable authentication methods")
            }
            SOCKS5ClientError::AuthNFailed { status } => {
                write!(f, "authentication failed (status {})", status)
            }
            SOCKS5ClientError::ServerFailure => {
                write!(f, "internal proxy server failure")
            }
            SOCKS5ClientError::PermissionDenied => {
                write!(f, "permission denied")
            }
            SOCKS5ClientError::NetworkUnreachable => {
                write!(f, "network unreachable")
            }
            SOCKS5ClientError::HostUnreachable => {
                write!(f, "host unreachable")
            }
            SOCKS5ClientError::ConnectionRefused => {
                write!(f, "connection refused")
            }
            SOCKS5ClientError::TTLExpired => write!(f, "TTL expired"),
            SOCKS5ClientError::CmdNotSupported => {
                write!(f, "command not supported")
            }
            SOCKS5ClientError::AddrTypeNotSupported => {
                write!(f, "address type not supported")
            }
            SOCKS5ClientError::BadCmdReplyKind { kind } => {
                write!(f, "bad command reply kind ({})", kind)
            }
            SOCKS5ClientError::BadCredentialLen { len } => {
                write!(f, "credential length {} outside of 1..=255", len)
            }
            SOCKS5ClientError::NoAuthNInfo => {
                write!(f, "no authentication methods supplied")
            }
        }
    }
}

#[test]
fn test_cmd_reply_codes() {
    let cases: [(u8, ClientEvent); 9] = [
        (0x01, ClientEvent::ErrorClosed),
        (0x02, ClientEvent::ErrorClosed),
        (0x03, ClientEvent::ErrorClosed),
        (0x04, ClientEvent::ErrorClosed),
        (0x05, ClientEvent::ErrorClosed),
        (0x06, ClientEvent::ErrorClosed),
        (0x07, ClientEvent::ErrorClosed),
        (0x08, ClientEvent::ErrorClosed),
        (0xaa, ClientEvent::ErrorClosed)
    ];

    for (kind, event) in cases {
        let err = SOCKS5ClientError::from_cmd_reply(kind);

        assert_eq!(err.terminal_event(), event);
    }

    match SOCKS5ClientError::from_cmd_reply(0x05) {
        SOCKS5ClientError::ConnectionRefused => {}
        err => panic!("Expected connection refused, got {}", err)
    }

    match SOCKS5ClientError::from_cmd_reply(0xaa) {
        SOCKS5ClientError::BadCmdReplyKind { kind: 0xaa } => {}
        err => panic!("Expected bad reply kind, got {}", err)
    }
}

#[test]
fn test_pre_connect_classification() {
    let err = SOCKS5ClientError::ConnectFailed {
        error: Error::new(std::io::ErrorKind::ConnectionRefused, "refused")
    };

    assert_eq!(err.terminal_event(), ClientEvent::Error);
    assert_eq!(
        SOCKS5ClientError::NoAuthNInfo.terminal_event(),
        ClientEvent::Error
    );
    assert_eq!(
        SOCKS5ClientError::ConnectionClosed.terminal_event(),
        ClientEvent::ErrorClosed
    );
}
