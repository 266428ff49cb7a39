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

//! Byte-counted send and receive drivers.
//!
//! These carry one protocol message at a time across a possibly
//! non-blocking stream.  Each drives a cursor over a borrowed scratch
//! buffer, so a short or would-block transfer can be resumed later
//! from exactly where it stopped.
use std::io::ErrorKind;
use std::io::Read;
use std::io::Write;

#[cfg(feature = "log")]
use log::trace;

use crate::error::SOCKS5ClientError;

/// Outcome of one driver pump.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum IOProgress {
    /// The whole message has been transferred.
    Done,
    /// The stream would block; wait for readiness and pump again.
    Pending
}

/// Cursor for sending one message from the scratch buffer.
#[derive(Clone, Debug)]
pub(crate) struct SendDriver {
    pos: usize,
    end: usize
}

/// Cursor for receiving one message into the scratch buffer.
#[derive(Clone, Debug)]
pub(crate) struct RecvDriver {
    pos: usize,
    end: usize
}

impl SendDriver {
    #[inline]
    pub(crate) fn new() -> SendDriver {
        SendDriver { pos: 0, end: 0 }
    }

    /// Begin sending `len` bytes from the start of the scratch buffer.
    #[inline]
    pub(crate) fn start(
        &mut self,
        len: usize
    ) {
        self.pos = 0;
        self.end = len;
    }

    /// Push pending bytes until the message is out or the stream
    /// blocks.
    ///
    /// A zero-length write is treated as a transport error; sending
    /// has no analogue of end-of-stream.
    pub(crate) fn pump<S>(
        &mut self,
        stream: &mut S,
        buf: &[u8]
    ) -> Result<IOProgress, SOCKS5ClientError>
    where
        S: Write {
        while self.pos < self.end {
            match stream.write(&buf[self.pos..self.end]) {
                Ok(0) => {
                    return Err(SOCKS5ClientError::IOError {
                        error: ErrorKind::WriteZero.into()
                    })
                }
                Ok(n) => {
                    #[cfg(feature = "log")]
                    trace!(target: "socks5-client",
                           "wrote {} of {} remaining byte(s)",
                           n, self.end - self.pos);

                    self.pos += n
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    return Ok(IOProgress::Pending)
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    return Err(SOCKS5ClientError::IOError { error: err })
                }
            }
        }

        Ok(IOProgress::Done)
    }
}

impl RecvDriver {
    #[inline]
    pub(crate) fn new() -> RecvDriver {
        RecvDriver { pos: 0, end: 0 }
    }

    /// Begin receiving `len` bytes into the start of the scratch
    /// buffer.
    #[inline]
    pub(crate) fn start(
        &mut self,
        len: usize
    ) {
        self.pos = 0;
        self.end = len;
    }

    /// Pull bytes until the expected count arrives or the stream
    /// blocks.
    ///
    /// End-of-stream before the message completes is a protocol
    /// violation: the proxy must not close mid-handshake.
    pub(crate) fn pump<S>(
        &mut self,
        stream: &mut S,
        buf: &mut [u8]
    ) -> Result<IOProgress, SOCKS5ClientError>
    where
        S: Read {
        while self.pos < self.end {
            match stream.read(&mut buf[self.pos..self.end]) {
                Ok(0) => return Err(SOCKS5ClientError::ConnectionClosed),
                Ok(n) => {
                    #[cfg(feature = "log")]
                    trace!(target: "socks5-client",
                           "read {} of {} remaining byte(s)",
                           n, self.end - self.pos);

                    self.pos += n
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    return Ok(IOProgress::Pending)
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    return Err(SOCKS5ClientError::IOError { error: err })
                }
            }
        }

        Ok(IOProgress::Done)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::Error;

    use super::*;

    /// Stream that transfers at most one byte per call, returning
    /// WouldBlock between each and on empty reads.
    struct TrickleStream {
        incoming: VecDeque<u8>,
        outgoing: Vec<u8>,
        ready: bool
    }

    impl TrickleStream {
        fn new(incoming: &[u8]) -> TrickleStream {
            TrickleStream {
                incoming: incoming.iter().copied().collect(),
                outgoing: Vec::new(),
                ready: true
            }
        }
    }

    impl Read for TrickleStream {
        fn read(
            &mut self,
            buf: &mut [u8]
        ) -> Result<usize, Error> {
            if !self.ready {
                self.ready = true;

                return Err(ErrorKind::WouldBlock.into());
            }

            self.ready = false;

            match self.incoming.pop_front() {
                Some(byte) if !buf.is_empty() => {
                    buf[0] = byte;

                    Ok(1)
                }
                _ => Ok(0)
            }
        }
    }

    impl Write for TrickleStream {
        fn write(
            &mut self,
            buf: &[u8]
        ) -> Result<usize, Error> {
            if !self.ready {
                self.ready = true;

                return Err(ErrorKind::WouldBlock.into());
            }

            self.ready = false;

            match buf.first() {
                Some(byte) => {
                    self.outgoing.push(*byte);

                    Ok(1)
                }
                None => Ok(0)
            }
        }

        fn flush(&mut self) -> Result<(), Error> {
            Ok(())
        }
    }

    #[test]
    fn test_send_resumes_across_blocks() {
        let mut stream = TrickleStream::new(&[]);
        let mut driver = SendDriver::new();
        let msg = [0x05, 0x01, 0x00];

        driver.start(msg.len());

        let mut pumps = 0;

        loop {
            match driver.pump(&mut stream, &msg).expect("Expected success") {
                IOProgress::Done => break,
                IOProgress::Pending => pumps += 1
            }
        }

        assert_eq!(&stream.outgoing, &msg);
        assert!(pumps >= 2);
    }

    #[test]
    fn test_recv_resumes_across_blocks() {
        let msg = [0x05, 0x00];
        let mut stream = TrickleStream::new(&msg);
        let mut driver = RecvDriver::new();
        let mut buf = [0; 4];

        driver.start(msg.len());

        loop {
            match driver
                .pump(&mut stream, &mut buf)
                .expect("Expected success")
            {
                IOProgress::Done => break,
                IOProgress::Pending => continue
            }
        }

        assert_eq!(&buf[..msg.len()], &msg);
    }

    #[test]
    fn test_recv_eof_mid_message() {
        let mut stream = TrickleStream::new(&[0x05]);
        let mut driver = RecvDriver::new();
        let mut buf = [0; 4];

        driver.start(2);

        let res = loop {
            match driver.pump(&mut stream, &mut buf) {
                Ok(IOProgress::Pending) => continue,
                res => break res
            }
        };

        match res {
            Err(SOCKS5ClientError::ConnectionClosed) => {}
            res => panic!("Expected connection closed, got {:?}", res)
        }
    }

    #[test]
    fn test_send_interrupted_retries() {
        struct InterruptOnce {
            hit: bool,
            out: Vec<u8>
        }

        impl Write for InterruptOnce {
            fn write(
                &mut self,
                buf: &[u8]
            ) -> Result<usize, Error> {
                if !self.hit {
                    self.hit = true;

                    return Err(ErrorKind::Interrupted.into());
                }

                self.out.extend(buf);

                Ok(buf.len())
            }

            fn flush(&mut self) -> Result<(), Error> {
                Ok(())
            }
        }

        let mut stream = InterruptOnce {
            hit: false,
            out: Vec::new()
        };
        let mut driver = SendDriver::new();
        let msg = [0x05, 0x01, 0x00];

        driver.start(msg.len());

        let res = driver.pump(&mut stream, &msg).expect("Expected success");

        assert_eq!(res, IOProgress::Done);
        assert_eq!(&stream.out, &msg);
    }
}
