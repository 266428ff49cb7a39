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

//! SOCKS5 client protocol core.
//!
//! This package implements the client side of the SOCKS5 protocol,
//! as defined in RFCs
//! [1928](https://www.rfc-editor.org/rfc/rfc1928) and
//! [1929](https://www.rfc-editor.org/rfc/rfc1929).  The following
//! functionality is provided:
//!
//! * Negotiation of SOCKS5 connections in connect mode, over a
//!   caller-supplied (possibly non-blocking) stream to the proxy.
//!
//! * Password authentication.
//!
//! * A transparent stream ([Read](std::io::Read),
//!   [Write](std::io::Write)) over negotiated connections.
//!
//! The following functionality is *not* implemented:
//!
//! * Bind and UDP associate modes
//!
//! * GSSAPI authentication
//!
//! * Proxy-side name resolution (destinations are always resolved
//!   IPv4 or IPv6 addresses)
//!
//! # Usage
//!
//! This package is designed as a protocol core: it performs no name
//! resolution and opens no sockets of its own.  The caller connects
//! to the proxy, hands the connection over, and pumps the negotiation
//! whenever its reactor reports the stream ready.
//!
//! ## Establishing SOCKS5 Connections
//!
//! To create and use a SOCKS5 connection, the following procedure is
//! used:
//!
//! 1. Create a [SOCKS5ClientParams](crate::params::SOCKS5ClientParams)
//!    instance to configure the negotiation.
//!
//! 1. Instantiate a [SOCKS5Client](crate::state::SOCKS5Client) using
//!    the `SOCKS5ClientParams`.
//!
//! 1. Dispatch a connection attempt toward the proxy, then deliver
//!    its outcome with
//!    [connection_ready](crate::state::SOCKS5Client::connection_ready)
//!    or
//!    [connection_failed](crate::state::SOCKS5Client::connection_failed).
//!
//! 1. Call [pump](crate::state::SOCKS5Client::pump) whenever the
//!    stream becomes ready, until it reports a
//!    [ClientEvent](crate::error::ClientEvent).
//!
//! ## Using SOCKS5 Connections
//!
//! Once `pump` reports [Up](crate::error::ClientEvent::Up), the
//! connection is a transparent tunnel to the destination.  It can be
//! used in place through the
//! [send_interface](crate::state::SOCKS5Client::send_interface) and
//! [recv_interface](crate::state::SOCKS5Client::recv_interface)
//! accessors, or detached as a
//! [SOCKS5Stream](crate::comm::SOCKS5Stream) with
//! [take_stream](crate::state::SOCKS5Client::take_stream).
#![allow(clippy::redundant_field_names)]
#![allow(clippy::upper_case_acronyms)]
mod driver;
mod proto;

pub mod comm;
pub mod error;
pub mod params;
pub mod state;

#[cfg(test)]
use std::sync::Once;

#[cfg(test)]
use log::LevelFilter;

#[cfg(test)]
static INIT: Once = Once::new();

#[cfg(test)]
fn init() {
    INIT.call_once(|| {
        env_logger::builder()
            .is_test(true)
            .filter_level(LevelFilter::Trace)
            .init()
    })
}
