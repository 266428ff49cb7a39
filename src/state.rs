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

//! SOCKS5 client negotiation state machine.
//!
//! [SOCKS5Client] carries a CONNECT negotiation through its phases
//! over a caller-supplied stream, which may be non-blocking.  The
//! caller's reactor calls [pump](SOCKS5Client::pump) whenever the
//! stream becomes ready; each call advances as far as the stream
//! allows.  Completion is reported through at most one returned
//! [ClientEvent]: `Up` exactly once on success, or one terminal error
//! event, after which the client is inert and can only be dropped.
//!
//! Once up, the negotiated connection is a transparent byte stream,
//! reachable through the interface accessors or detachable with
//! [take_stream](SOCKS5Client::take_stream).
use std::fmt::Display;
use std::fmt::Formatter;
use std::io::Cursor;
use std::io::Error;
use std::io::Read;
use std::io::Write;

#[cfg(feature = "log")]
use log::debug;
#[cfg(feature = "log")]
use log::error;
#[cfg(feature = "log")]
use log::trace;

use crate::comm::SOCKS5Stream;
use crate::driver::IOProgress;
use crate::driver::RecvDriver;
use crate::driver::SendDriver;
use crate::error::ClientEvent;
use crate::error::SOCKS5ClientError;
use crate::params::AuthNInfo;
use crate::params::AuthNMech;
use crate::params::SOCKS5ClientParams;
use crate::proto;

/// Phases of the negotiation.
///
/// Phases advance strictly forward; every path ends in `Up` or `Dead`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ClientPhase {
    /// Created, connector not yet dispatched.
    Init,
    /// Waiting for the connector to deliver a connection.
    Connecting,
    /// Sending the method-selection greeting.
    SendHello,
    /// Waiting for the 2-byte method-selection reply.
    RecvHello,
    /// Sending the username/password subnegotiation request.
    SendAuthN,
    /// Waiting for the 2-byte subnegotiation reply.
    RecvAuthN,
    /// Sending the CONNECT request.
    SendRequest,
    /// Waiting for the fixed reply prefix.
    RecvReplyHeader,
    /// Consuming the variable bound-address tail.
    RecvReplyTail,
    /// Negotiation succeeded; the stream is the tunnel.
    Up,
    /// Terminal failure; only drop is left.
    Dead
}

/// Outcome of one state-machine step.
enum Step {
    /// Phase advanced; take another step.
    Continue,
    /// The stream would block; wait for readiness.
    Suspend,
    /// Negotiation complete.
    Up
}

/// SOCKS5 client negotiation instance.
///
/// One instance negotiates one tunnel.  The scratch buffer is sized
/// for the largest message in either direction and allocated once at
/// creation; both drivers index into it.
pub struct SOCKS5Client<Stream> {
    params: SOCKS5ClientParams,
    phase: ClientPhase,
    /// Method codes offered in the greeting, in preference order.
    offered: Vec<u8>,
    chosen: Option<AuthNMech>,
    scratch: Vec<u8>,
    send: SendDriver,
    recv: RecvDriver,
    stream: Option<Stream>,
    last_error: Option<SOCKS5ClientError>
}

impl<Stream> SOCKS5Client<Stream>
where
    Stream: Read + Write {
    /// Create a client for one negotiation.
    ///
    /// Parameters are checked synchronously; an error here means
    /// nothing was scheduled and there is nothing to tear down.
    pub fn new(
        params: SOCKS5ClientParams
    ) -> Result<SOCKS5Client<Stream>, SOCKS5ClientError> {
        params.validate()?;

        let offered = proto::method_codes(params.authn());

        Ok(SOCKS5Client {
            params: params,
            phase: ClientPhase::Init,
            offered: offered,
            chosen: None,
            scratch: vec![0; proto::MAX_MSG_LEN],
            send: SendDriver::new(),
            recv: RecvDriver::new(),
            stream: None,
            last_error: None
        })
    }

    /// Note that the connector has been dispatched toward the proxy.
    pub fn connector_dispatched(&mut self) {
        if self.phase == ClientPhase::Init {
            #[cfg(feature = "log")]
            trace!(target: "socks5-client",
                   "connecting to proxy at {}",
                   self.params.proxy());

            self.phase = ClientPhase::Connecting
        }
    }

    /// Deliver the established proxy connection and begin negotiating.
    ///
    /// Sends as much of the greeting as the stream accepts.  Ignored
    /// outside the `Connecting` phase.
    pub fn connection_ready(
        &mut self,
        stream: Stream
    ) -> Option<ClientEvent> {
        if self.phase != ClientPhase::Connecting {
            return None;
        }

        #[cfg(feature = "log")]
        debug!(target: "socks5-client",
               "connected to proxy at {}, beginning negotiation",
               self.params.proxy());

        self.stream = Some(stream);

        match self.encode_greeting() {
            Ok(()) => self.pump(),
            Err(err) => Some(self.fail(err))
        }
    }

    /// Report that the connector could not reach the proxy.
    ///
    /// This is the one terminal failure that happens before any
    /// protocol bytes are exchanged.  Ignored outside the `Connecting`
    /// phase.
    pub fn connection_failed(
        &mut self,
        error: Error
    ) -> Option<ClientEvent> {
        if self.phase != ClientPhase::Connecting {
            return None;
        }

        Some(self.fail(SOCKS5ClientError::ConnectFailed { error: error }))
    }

    /// Advance the negotiation as far as the stream allows.
    ///
    /// Call on stream readiness.  Returns `None` when suspended on
    /// the stream or when there is nothing to drive, `Some` with the
    /// single lifecycle event otherwise.
    pub fn pump(&mut self) -> Option<ClientEvent> {
        loop {
            match self.phase {
                ClientPhase::Init |
                ClientPhase::Connecting |
                ClientPhase::Up |
                ClientPhase::Dead => return None,
                _ => {}
            }

            match self.step() {
                Ok(Step::Continue) => continue,
                Ok(Step::Suspend) => return None,
                Ok(Step::Up) => {
                    #[cfg(feature = "log")]
                    debug!(target: "socks5-client",
                           "tunnel to {} established",
                           self.params.dest());

                    self.phase = ClientPhase::Up;

                    return Some(ClientEvent::Up);
                }
                Err(err) => return Some(self.fail(err))
            }
        }
    }

    /// Get the stream for sending, once the tunnel is up.
    #[inline]
    pub fn send_interface(&mut self) -> Option<&mut Stream> {
        if self.phase == ClientPhase::Up {
            self.stream.as_mut()
        } else {
            None
        }
    }

    /// Get the stream for receiving, once the tunnel is up.
    #[inline]
    pub fn recv_interface(&mut self) -> Option<&mut Stream> {
        if self.phase == ClientPhase::Up {
            self.stream.as_mut()
        } else {
            None
        }
    }

    /// Detach the negotiated connection, once the tunnel is up.
    pub fn take_stream(&mut self) -> Option<SOCKS5Stream<Stream>> {
        if self.phase == ClientPhase::Up {
            self.stream.take().map(SOCKS5Stream::new)
        } else {
            None
        }
    }

    /// Get the current phase.
    #[inline]
    pub fn phase(&self) -> ClientPhase {
        self.phase
    }

    /// Get the method the proxy selected, once known.
    #[inline]
    pub fn chosen_method(&self) -> Option<AuthNMech> {
        self.chosen
    }

    /// Get the error behind a terminal event.
    #[inline]
    pub fn last_error(&self) -> Option<&SOCKS5ClientError> {
        self.last_error.as_ref()
    }

    /// Record a terminal failure and report its event.
    fn fail(
        &mut self,
        err: SOCKS5ClientError
    ) -> ClientEvent {
        #[cfg(feature = "log")]
        error!(target: "socks5-client",
               "negotiation failed in phase {}: {}",
               self.phase, err);

        let event = err.terminal_event();

        self.last_error = Some(err);
        self.phase = ClientPhase::Dead;
        // Dropping the stream closes the connection.
        self.stream = None;

        event
    }

    /// Take one step: pump the current phase's driver and, on
    /// completion, decode or encode and advance.
    fn step(&mut self) -> Result<Step, SOCKS5ClientError> {
        match self.phase {
            ClientPhase::SendHello => match self.pump_send()? {
                IOProgress::Pending => Ok(Step::Suspend),
                IOProgress::Done => {
                    self.recv.start(2);
                    self.phase = ClientPhase::RecvHello;

                    Ok(Step::Continue)
                }
            },
            ClientPhase::RecvHello => match self.pump_recv()? {
                IOProgress::Pending => Ok(Step::Suspend),
                IOProgress::Done => {
                    let mech = proto::parse_method_reply(
                        &self.scratch[..2],
                        &self.offered
                    )?;

                    #[cfg(feature = "log")]
                    debug!(target: "socks5-client",
                           "proxy selected authentication method {}",
                           mech);

                    self.chosen = Some(mech);

                    match mech {
                        AuthNMech::None => self.encode_connect()?,
                        AuthNMech::Password => self.encode_authn()?
                    }

                    Ok(Step::Continue)
                }
            },
            ClientPhase::SendAuthN => match self.pump_send()? {
                IOProgress::Pending => Ok(Step::Suspend),
                IOProgress::Done => {
                    self.recv.start(2);
                    self.phase = ClientPhase::RecvAuthN;

                    Ok(Step::Continue)
                }
            },
            ClientPhase::RecvAuthN => match self.pump_recv()? {
                IOProgress::Pending => Ok(Step::Suspend),
                IOProgress::Done => {
                    proto::parse_password_authn_reply(&self.scratch[..2])?;
                    self.encode_connect()?;

                    Ok(Step::Continue)
                }
            },
            ClientPhase::SendRequest => match self.pump_send()? {
                IOProgress::Pending => Ok(Step::Suspend),
                IOProgress::Done => {
                    self.recv.start(proto::REPLY_HEADER_LEN);
                    self.phase = ClientPhase::RecvReplyHeader;

                    Ok(Step::Continue)
                }
            },
            ClientPhase::RecvReplyHeader => match self.pump_recv()? {
                IOProgress::Pending => Ok(Step::Suspend),
                IOProgress::Done => {
                    let tail = proto::parse_reply_header(
                        &self.scratch[..proto::REPLY_HEADER_LEN]
                    )?;

                    // The bound address is consumed and discarded.
                    self.recv.start(tail);
                    self.phase = ClientPhase::RecvReplyTail;

                    Ok(Step::Continue)
                }
            },
            ClientPhase::RecvReplyTail => match self.pump_recv()? {
                IOProgress::Pending => Ok(Step::Suspend),
                IOProgress::Done => Ok(Step::Up)
            },
            // Checked by pump before stepping.
            _ => Ok(Step::Suspend)
        }
    }

    fn pump_send(&mut self) -> Result<IOProgress, SOCKS5ClientError> {
        match &mut self.stream {
            Some(stream) => self.send.pump(stream, &self.scratch),
            None => Err(SOCKS5ClientError::ConnectionClosed)
        }
    }

    fn pump_recv(&mut self) -> Result<IOProgress, SOCKS5ClientError> {
        match &mut self.stream {
            Some(stream) => self.recv.pump(stream, &mut self.scratch),
            None => Err(SOCKS5ClientError::ConnectionClosed)
        }
    }

    /// Encode the greeting into the scratch buffer and enter
    /// `SendHello`.
    fn encode_greeting(&mut self) -> Result<(), SOCKS5ClientError> {
        let mut cursor = Cursor::new(&mut self.scratch[..]);

        proto::write_greeting(&mut cursor, self.params.authn())
            .map_err(|err| SOCKS5ClientError::IOError { error: err })?;
        self.send.start(cursor.position() as usize);
        self.phase = ClientPhase::SendHello;

        Ok(())
    }

    /// Encode the username/password request into the scratch buffer
    /// and enter `SendAuthN`.
    fn encode_authn(&mut self) -> Result<(), SOCKS5ClientError> {
        let info = self
            .params
            .authn()
            .iter()
            .find(|info| info.mech() == AuthNMech::Password);

        match info {
            Some(AuthNInfo::Password { username, password }) => {
                let mut cursor = Cursor::new(&mut self.scratch[..]);

                proto::write_password_authn(&mut cursor, username, password)?;
                self.send.start(cursor.position() as usize);
                self.phase = ClientPhase::SendAuthN;

                Ok(())
            }
            // Unreachable: the proxy can only select an offered
            // method, and password is offered only with a descriptor.
            _ => Err(SOCKS5ClientError::NoAuthNInfo)
        }
    }

    /// Encode the CONNECT request into the scratch buffer and enter
    /// `SendRequest`.
    fn encode_connect(&mut self) -> Result<(), SOCKS5ClientError> {
        let mut cursor = Cursor::new(&mut self.scratch[..]);

        proto::write_connect(&mut cursor, self.params.dest())
            .map_err(|err| SOCKS5ClientError::IOError { error: err })?;
        self.send.start(cursor.position() as usize);
        self.phase = ClientPhase::SendRequest;

        Ok(())
    }
}

impl Display for ClientPhase {
    fn fmt(
        &self,
        f: &mut Formatter
    ) -> Result<(), std::fmt::Error> {
        match self {
            ClientPhase::Init => write!(f, "init"),
            ClientPhase::Connecting => write!(f, "connecting"),
            ClientPhase::SendHello => write!(f, "send-hello"),
            ClientPhase::RecvHello => write!(f, "recv-hello"),
            ClientPhase::SendAuthN => write!(f, "send-authn"),
            ClientPhase::RecvAuthN => write!(f, "recv-authn"),
            ClientPhase::SendRequest => write!(f, "send-request"),
            ClientPhase::RecvReplyHeader => write!(f, "recv-reply-header"),
            ClientPhase::RecvReplyTail => write!(f, "recv-reply-tail"),
            ClientPhase::Up => write!(f, "up"),
            ClientPhase::Dead => write!(f, "dead")
        }
    }
}
