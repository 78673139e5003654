//! Client entry points.
//!
//! A [`BridgeHandle`] admits requests into the session's queues and answers
//! identity and statistics queries. It never talks to the transport; only
//! the worker does.

use crate::command::{PACKET_MAX_SIZE, PACKET_MTU};
use crate::link::GlobalStats;
use crate::queue::{Pending, RequestQueue};
use crate::request::{
    Command, DeviceQuery, EventMask, IoError, IoRequest, Reply, RequestId, WireError,
};
use crate::worker::Shared;
use daynalink_core::{Error, Result};
use smoltcp::wire::EthernetAddress;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Outcome of submitting a request.
#[derive(Debug)]
pub enum Submission {
    /// Finished without queuing; check `error`.
    Completed(IoRequest),
    Queued(Ticket),
}

impl Submission {
    /// Wait for the request, whichever way it went.
    pub async fn wait(self) -> Result<IoRequest> {
        match self {
            Submission::Completed(request) => Ok(request),
            Submission::Queued(ticket) => ticket.wait().await,
        }
    }
}

/// Claim on a queued request.
#[derive(Debug)]
pub struct Ticket {
    id: RequestId,
    reply: oneshot::Receiver<IoRequest>,
}

impl Ticket {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// The completed request, or `WorkerExited` if the session went away
    /// without completing it.
    pub async fn wait(self) -> Result<IoRequest> {
        self.reply.await.map_err(|_| Error::WorkerExited)
    }

    /// The completed request if it is already done.
    pub fn try_take(&mut self) -> Option<IoRequest> {
        self.reply.try_recv().ok()
    }
}

/// Cloneable handle onto a running bridge session.
#[derive(Clone)]
pub struct BridgeHandle {
    shared: Arc<Shared>,
}

impl BridgeHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn begin_io(&self, mut request: IoRequest) -> Submission {
        request.id = self.shared.next_id();
        request.error = None;
        request.wire_error = None;
        request.reply = None;

        match request.command {
            Command::Read => self.enqueue(&self.shared.queues.read, request),
            Command::ReadOrphan => self.enqueue(&self.shared.queues.orphan, request),
            Command::Broadcast => {
                request.dst_addr = EthernetAddress::BROADCAST;
                self.submit_write(request)
            }
            Command::Write => self.submit_write(request),
            Command::OnEvent => self.subscribe(request),
            Command::Online => {
                self.set_online(true);
                Submission::Completed(request)
            }
            Command::Offline => {
                self.set_online(false);
                Submission::Completed(request)
            }
            Command::GetGlobalStats => {
                request.reply = Some(Reply::GlobalStats(self.global_stats()));
                Submission::Completed(request)
            }
            Command::GetStationAddress => {
                let address = self.station_address();
                request.src_addr = address;
                request.dst_addr = address;
                request.reply = Some(Reply::StationAddress {
                    current: address,
                    default: address,
                });
                Submission::Completed(request)
            }
            Command::DeviceQuery => {
                request.reply = Some(Reply::DeviceQuery(self.device_query()));
                Submission::Completed(request)
            }
            Command::ConfigInterface => Submission::Completed(request),
            Command::GetSpecialStats => {
                request.reply = Some(Reply::SpecialStats { records: 0 });
                Submission::Completed(request)
            }
            Command::Other(code) => {
                debug!(code, "unsupported command");
                request.fail(IoError::NotSupported, WireError::Generic);
                Submission::Completed(request)
            }
        }
    }

    fn submit_write(&self, mut request: IoRequest) -> Submission {
        let limit = if request.is_raw() {
            PACKET_MAX_SIZE
        } else {
            PACKET_MTU
        };
        if request.data_length > limit {
            request.fail(IoError::BadArgument, WireError::MtuExceeded);
            return Submission::Completed(request);
        }

        let submission = self.enqueue(&self.shared.queues.write, request);
        if matches!(submission, Submission::Queued(_)) {
            self.shared.signals.notify_write();
        }
        submission
    }

    fn enqueue(&self, queue: &RequestQueue, mut request: IoRequest) -> Submission {
        if request.buffers.is_none() {
            request.fail(IoError::BadArgument, WireError::BufferError);
            return Submission::Completed(request);
        }

        let id = request.id;
        let (tx, rx) = oneshot::channel();
        match queue.push_if(Pending::new(request, tx), || self.shared.link.is_online()) {
            Ok(()) => Submission::Queued(Ticket { id, reply: rx }),
            Err(pending) => {
                let mut request = pending.into_request();
                request.fail(IoError::OutOfService, WireError::UnitOffline);
                Submission::Completed(request)
            }
        }
    }

    fn subscribe(&self, mut request: IoRequest) -> Submission {
        let online = self.shared.link.is_online();
        let wants = request.events;
        if (online && wants.contains(EventMask::ONLINE))
            || (!online && wants.contains(EventMask::OFFLINE))
        {
            request.events = wants & (EventMask::ONLINE | EventMask::OFFLINE);
            return Submission::Completed(request);
        }
        if !EventMask::all().contains(wants) {
            request.fail(IoError::NotSupported, WireError::BadEvent);
            return Submission::Completed(request);
        }

        let id = request.id;
        let (tx, rx) = oneshot::channel();
        let admit = || !self.shared.is_closed();
        match self.shared.queues.event.push_if(Pending::new(request, tx), admit) {
            Ok(()) => Submission::Queued(Ticket { id, reply: rx }),
            Err(pending) => {
                let mut request = pending.into_request();
                request.fail(IoError::OutOfService, WireError::UnitOffline);
                Submission::Completed(request)
            }
        }
    }

    /// Complete a queued request with `Aborted`. Returns false when no queue
    /// holds it, which includes requests that already completed.
    pub fn abort_io(&self, id: RequestId) -> bool {
        match self.shared.queues.remove(id) {
            Some(mut pending) => {
                trace!(id, "request aborted");
                pending.request_mut().abort();
                pending.complete();
                true
            }
            None => false,
        }
    }

    pub fn set_online(&self, online: bool) {
        debug!(online, "link state requested");
        self.shared.link.request_online(online);
    }

    pub fn is_online(&self) -> bool {
        self.shared.link.is_online()
    }

    pub fn global_stats(&self) -> GlobalStats {
        self.shared.stats.snapshot()
    }

    pub fn station_address(&self) -> EthernetAddress {
        self.shared.station_address
    }

    pub fn device_query(&self) -> DeviceQuery {
        DeviceQuery::default()
    }
}

impl std::fmt::Debug for BridgeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeHandle")
            .field("station_address", &self.shared.station_address)
            .field("online", &self.is_online())
            .finish()
    }
}
