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

//! Communications over a negotiated SOCKS5 connection.
//!
//! SOCKS5 CONNECT tunnels carry raw bytes once established, so the
//! stream type here is a transparent wrapper over the underlying
//! connection.
use std::io::Error;
use std::io::Read;
use std::io::Write;

/// Traffic stream over a negotiated SOCKS5 connection.
///
/// Everything passes straight through to the underlying connection;
/// the type marks that negotiation completed and the tunnel is live.
pub struct SOCKS5Stream<Stream> {
    stream: Stream
}

impl<Stream> SOCKS5Stream<Stream> {
    #[inline]
    pub(crate) fn new(stream: Stream) -> SOCKS5Stream<Stream> {
        SOCKS5Stream { stream: stream }
    }

    /// Get a reference to the underlying connection.
    #[inline]
    pub fn get_ref(&self) -> &Stream {
        &self.stream
    }

    /// Get a mutable reference to the underlying connection.
    #[inline]
    pub fn get_mut(&mut self) -> &mut Stream {
        &mut self.stream
    }

    /// Discard the wrapper and recover the underlying connection.
    #[inline]
    pub fn into_inner(self) -> Stream {
        self.stream
    }
}

impl<Stream> Read for SOCKS5Stream<Stream>
where
    Stream: Read {
    #[inline]
    fn read(
        &mut self,
        buf: &mut [u8]
    ) -> Result<usize, Error> {
        self.stream.read(buf)
    }
}

impl<Stream> Write for SOCKS5Stream<Stream>
where
    Stream: Write {
    #[inline]
    fn write(
        &mut self,
        buf: &[u8]
    ) -> Result<usize, Error> {
        self.stream.write(buf)
    }

    #[inline]
    fn flush(&mut self) -> Result<(), Error> {
        self.stream.flush()
    }
}
