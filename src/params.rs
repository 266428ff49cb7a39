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

//! Parameters for instantiating a SOCKS5 client.
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::net::SocketAddr;

use serde::Deserialize;
use serde::Serialize;

use crate::error::SOCKS5ClientError;

/// SOCKS5 authentication descriptor.
///
/// Each descriptor is one authentication exchange the caller is
/// willing to carry out.  The caller supplies an ordered list of
/// these, highest preference first; the proxy picks one.
///
/// Username and password are octet strings, not text: RFC 1929 places
/// no character set constraints on either, only a 1..=255 byte length
/// limit.
#[derive(Clone, Eq, PartialEq)]
pub enum AuthNInfo {
    /// No authentication.
    None,
    /// Username/password authentication (RFC 1929).
    Password {
        /// Username, 1..=255 bytes.
        username: Vec<u8>,
        /// Password, 1..=255 bytes.
        password: Vec<u8>
    }
}

/// SOCKS5 authentication mechanism, as selected by the proxy.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum AuthNMech {
    /// No authentication.
    None,
    /// Username/password authentication.
    Password
}

/// SOCKS5 client parameters.
///
/// These describe one CONNECT negotiation: where the proxy lives,
/// where the tunnel should go, and which authentication exchanges the
/// caller accepts.
#[derive(Clone)]
pub struct SOCKS5ClientParams {
    /// Address of the SOCKS5 proxy.
    proxy: SocketAddr,
    /// Destination to be tunneled.
    ///
    /// Always a resolved IPv4 or IPv6 address; proxy-side name
    /// resolution is not part of this design.
    dest: SocketAddr,
    /// Ordered authentication descriptors, highest preference first.
    authn: Vec<AuthNInfo>
}

/// Username/password credentials as they appear in configurations.
#[derive(Clone, Deserialize, Eq, PartialEq, Serialize)]
pub struct SOCKS5AuthNConfig {
    /// Username for password authentication.
    username: String,
    /// Password for password authentication.
    password: String
}

/// Configuration-file description of a SOCKS5 proxy.
///
/// This is the shape embedding applications deserialize from their
/// own configurations; combine it with a destination using
/// [params](SOCKS5ClientConfig::params).
#[derive(Clone, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SOCKS5ClientConfig {
    /// Address of the SOCKS5 proxy.
    proxy: SocketAddr,
    #[serde(default)]
    /// Optional username/password credentials.
    auth: Option<SOCKS5AuthNConfig>
}

impl AuthNInfo {
    /// Create a descriptor for no authentication.
    #[inline]
    pub fn none() -> AuthNInfo {
        AuthNInfo::None
    }

    /// Create a descriptor for username/password authentication.
    #[inline]
    pub fn password<U, P>(
        username: U,
        password: P
    ) -> AuthNInfo
    where
        U: Into<Vec<u8>>,
        P: Into<Vec<u8>> {
        AuthNInfo::Password {
            username: username.into(),
            password: password.into()
        }
    }

    /// Get the mechanism this descriptor carries out.
    #[inline]
    pub fn mech(&self) -> AuthNMech {
        match self {
            AuthNInfo::None => AuthNMech::None,
            AuthNInfo::Password { .. } => AuthNMech::Password
        }
    }

    /// Check the RFC 1929 length limits.
    fn validate(&self) -> Result<(), SOCKS5ClientError> {
        match self {
            AuthNInfo::None => Ok(()),
            AuthNInfo::Password { username, password } => {
                if username.is_empty() || username.len() > 255 {
                    Err(SOCKS5ClientError::BadCredentialLen {
                        len: username.len()
                    })
                } else if password.is_empty() || password.len() > 255 {
                    Err(SOCKS5ClientError::BadCredentialLen {
                        len: password.len()
                    })
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl AuthNMech {
    /// Get the RFC 1928 method code for this mechanism.
    #[inline]
    pub fn code(&self) -> u8 {
        match self {
            AuthNMech::None => 0x00,
            AuthNMech::Password => 0x02
        }
    }
}

impl SOCKS5ClientParams {
    /// Create parameters from an ordered authentication descriptor
    /// list.
    #[inline]
    pub fn new(
        proxy: SocketAddr,
        dest: SocketAddr,
        authn: Vec<AuthNInfo>
    ) -> SOCKS5ClientParams {
        SOCKS5ClientParams {
            proxy: proxy,
            dest: dest,
            authn: authn
        }
    }

    /// Create parameters offering only no-authentication.
    #[inline]
    pub fn connect_no_auth(
        proxy: SocketAddr,
        dest: SocketAddr
    ) -> SOCKS5ClientParams {
        SOCKS5ClientParams {
            proxy: proxy,
            dest: dest,
            authn: vec![AuthNInfo::None]
        }
    }

    /// Create parameters offering only username/password
    /// authentication.
    #[inline]
    pub fn connect_password_auth<U, P>(
        proxy: SocketAddr,
        dest: SocketAddr,
        username: U,
        password: P
    ) -> SOCKS5ClientParams
    where
        U: Into<Vec<u8>>,
        P: Into<Vec<u8>> {
        SOCKS5ClientParams {
            proxy: proxy,
            dest: dest,
            authn: vec![AuthNInfo::password(username, password)]
        }
    }

    /// Check that these parameters can begin a negotiation.
    ///
    /// This is the synchronous half of client initialization: a
    /// failure here means no I/O was scheduled.
    pub fn validate(&self) -> Result<(), SOCKS5ClientError> {
        if self.authn.is_empty() {
            return Err(SOCKS5ClientError::NoAuthNInfo);
        }

        for info in &self.authn {
            info.validate()?
        }

        Ok(())
    }

    /// Get the proxy address.
    #[inline]
    pub fn proxy(&self) -> &SocketAddr {
        &self.proxy
    }

    /// Get the destination address.
    #[inline]
    pub fn dest(&self) -> &SocketAddr {
        &self.dest
    }

    /// Get the ordered authentication descriptors.
    #[inline]
    pub fn authn(&self) -> &[AuthNInfo] {
        &self.authn
    }
}

impl SOCKS5ClientConfig {
    /// Create a configuration from its components.
    #[inline]
    pub fn new(
        proxy: SocketAddr,
        auth: Option<SOCKS5AuthNConfig>
    ) -> SOCKS5ClientConfig {
        SOCKS5ClientConfig {
            proxy: proxy,
            auth: auth
        }
    }

    /// Get the proxy address.
    #[inline]
    pub fn proxy(&self) -> &SocketAddr {
        &self.proxy
    }

    /// Combine with a destination to produce client parameters.
    ///
    /// Configured credentials are offered ahead of no-authentication,
    /// so an authenticating proxy will pick them, while one that does
    /// not require authentication can still select none.
    pub fn params(
        &self,
        dest: SocketAddr
    ) -> SOCKS5ClientParams {
        let authn = match &self.auth {
            Some(auth) => vec![
                AuthNInfo::password(
                    auth.username.as_bytes(),
                    auth.password.as_bytes()
                ),
                AuthNInfo::None,
            ],
            None => vec![AuthNInfo::None]
        };

        SOCKS5ClientParams {
            proxy: self.proxy,
            dest: dest,
            authn: authn
        }
    }
}

impl SOCKS5AuthNConfig {
    /// Create credentials from their components.
    #[inline]
    pub fn new(
        username: String,
        password: String
    ) -> SOCKS5AuthNConfig {
        SOCKS5AuthNConfig {
            username: username,
            password: password
        }
    }

    /// Get the username.
    #[inline]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Get the password.
    #[inline]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl Debug for AuthNInfo {
    fn fmt(
        &self,
        f: &mut Formatter
    ) -> Result<(), std::fmt::Error> {
        // Never print credentials.
        match self {
            AuthNInfo::None => write!(f, "AuthNInfo::None"),
            AuthNInfo::Password { .. } => write!(f, "AuthNInfo::Password")
        }
    }
}

impl Display for AuthNMech {
    fn fmt(
        &self,
        f: &mut Formatter
    ) -> Result<(), std::fmt::Error> {
        match self {
            AuthNMech::None => write!(f, "none"),
            AuthNMech::Password => write!(f, "username/password")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs() -> (SocketAddr, SocketAddr) {
        (
            "192.0.2.1:1080".parse().unwrap(),
            "203.0.113.5:443".parse().unwrap()
        )
    }

    #[test]
    fn test_validate_no_auth() {
        let (proxy, dest) = addrs();
        let params = SOCKS5ClientParams::connect_no_auth(proxy, dest);

        params.validate().expect("Expected success");
    }

    #[test]
    fn test_validate_empty_list() {
        let (proxy, dest) = addrs();
        let params = SOCKS5ClientParams::new(proxy, dest, vec![]);

        match params.validate() {
            Err(SOCKS5ClientError::NoAuthNInfo) => {}
            res => panic!("Expected no authn info, got {:?}", res.err())
        }
    }

    #[test]
    fn test_validate_empty_username() {
        let (proxy, dest) = addrs();
        let params =
            SOCKS5ClientParams::connect_password_auth(proxy, dest, "", "pass");

        match params.validate() {
            Err(SOCKS5ClientError::BadCredentialLen { len: 0 }) => {}
            res => panic!("Expected bad credential len, got {:?}", res.err())
        }
    }

    #[test]
    fn test_validate_oversize_password() {
        let (proxy, dest) = addrs();
        let password = vec![0x61; 256];
        let params = SOCKS5ClientParams::connect_password_auth(
            proxy, dest, "user", password
        );

        match params.validate() {
            Err(SOCKS5ClientError::BadCredentialLen { len: 256 }) => {}
            res => panic!("Expected bad credential len, got {:?}", res.err())
        }
    }

    #[test]
    fn test_config_round_trip() {
        let config = SOCKS5ClientConfig::new(
            "192.0.2.1:1080".parse().unwrap(),
            Some(SOCKS5AuthNConfig::new(
                String::from("user"),
                String::from("pass")
            ))
        );
        let text = serde_json::to_string(&config).expect("Expected success");
        let parsed: SOCKS5ClientConfig =
            serde_json::from_str(&text).expect("Expected success");

        assert!(parsed == config);
    }

    #[test]
    fn test_config_params_order() {
        let config = SOCKS5ClientConfig::new(
            "192.0.2.1:1080".parse().unwrap(),
            Some(SOCKS5AuthNConfig::new(
                String::from("user"),
                String::from("pass")
            ))
        );
        let params = config.params("203.0.113.5:443".parse().unwrap());

        assert_eq!(params.authn().len(), 2);
        assert_eq!(params.authn()[0].mech(), AuthNMech::Password);
        assert_eq!(params.authn()[1].mech(), AuthNMech::None);
    }

    #[test]
    fn test_config_no_auth() {
        let text = "{ \"proxy\": \"192.0.2.1:1080\" }";
        let config: SOCKS5ClientConfig =
            serde_json::from_str(text).expect("Expected success");
        let params = config.params("203.0.113.5:443".parse().unwrap());

        assert_eq!(params.authn(), &[AuthNInfo::None]);
    }
}
