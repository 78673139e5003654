//! Pending request queues.
//!
//! Each queue is an ordered container behind its own mutex. Every operation
//! takes the lock for the duration of one insert, scan or removal and never
//! across a transport call. A request leaves a queue as a [`Pending`], whose
//! `complete` consumes it, so a removed request is completed exactly once.

use crate::request::{IoError, IoRequest, RequestId, WireError};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// A queued request and the channel its submitter waits on.
pub(crate) struct Pending {
    request: IoRequest,
    reply: oneshot::Sender<IoRequest>,
}

impl Pending {
    pub fn new(request: IoRequest, reply: oneshot::Sender<IoRequest>) -> Self {
        Self { request, reply }
    }

    #[cfg(test)]
    pub fn request(&self) -> &IoRequest {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut IoRequest {
        &mut self.request
    }

    /// Give the request back without completing it.
    pub fn into_request(self) -> IoRequest {
        self.request
    }

    /// Hand the request back to its submitter.
    pub fn complete(self) {
        let id = self.request.id;
        if self.reply.send(self.request).is_err() {
            trace!(id, "submitter no longer waiting");
        }
    }

    pub fn fail(mut self, error: IoError, wire_error: WireError) {
        self.request.fail(error, wire_error);
        self.complete();
    }
}

pub(crate) struct RequestQueue {
    name: &'static str,
    entries: Mutex<VecDeque<Pending>>,
}

impl RequestQueue {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Pending>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `pending` if `admit` holds while the lock is held.
    ///
    /// Checking under the lock means a request can't slip in after a
    /// link-down flush has already emptied the queue.
    pub fn push_if(&self, pending: Pending, admit: impl FnOnce() -> bool) -> Result<(), Pending> {
        let mut entries = self.lock();
        if !admit() {
            return Err(pending);
        }
        entries.push_back(pending);
        trace!(queue = self.name, depth = entries.len(), "request queued");
        Ok(())
    }

    /// Remove the earliest entry matching `pred`.
    pub fn take_first(&self, pred: impl Fn(&IoRequest) -> bool) -> Option<Pending> {
        let mut entries = self.lock();
        let index = entries.iter().position(|p| pred(&p.request))?;
        entries.remove(index)
    }

    /// Remove every entry matching `pred`, oldest first.
    pub fn take_matching(&self, pred: impl Fn(&IoRequest) -> bool) -> Vec<Pending> {
        let mut entries = self.lock();
        let (matched, kept): (VecDeque<_>, VecDeque<_>) =
            entries.drain(..).partition(|p| pred(&p.request));
        *entries = kept;
        matched.into()
    }

    pub fn pop_front(&self) -> Option<Pending> {
        self.lock().pop_front()
    }

    /// Remove up to `max` entries from the front.
    pub fn drain_up_to(&self, max: usize) -> Vec<Pending> {
        let mut entries = self.lock();
        let n = entries.len().min(max);
        entries.drain(..n).collect()
    }

    pub fn drain(&self) -> Vec<Pending> {
        self.lock().drain(..).collect()
    }

    pub fn remove(&self, id: RequestId) -> Option<Pending> {
        self.take_first(|request| request.id == id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Complete every entry with `error`, oldest first.
    pub fn fail_all(&self, error: IoError, wire_error: WireError) -> usize {
        let drained = self.drain();
        let count = drained.len();
        for pending in drained {
            pending.fail(error, wire_error);
        }
        if count > 0 {
            debug!(queue = self.name, count, ?error, "flushed queue");
        }
        count
    }
}

/// The four request queues of a session.
pub(crate) struct Queues {
    pub read: RequestQueue,
    pub write: RequestQueue,
    pub orphan: RequestQueue,
    pub event: RequestQueue,
}

impl Queues {
    pub fn new() -> Self {
        Self {
            read: RequestQueue::new("read"),
            write: RequestQueue::new("write"),
            orphan: RequestQueue::new("orphan"),
            event: RequestQueue::new("event"),
        }
    }

    /// Fail everything waiting on the link. Event subscriptions stay.
    pub fn flush_offline(&self) -> usize {
        [&self.write, &self.read, &self.orphan]
            .into_iter()
            .map(|queue| queue.fail_all(IoError::OutOfService, WireError::UnitOffline))
            .sum()
    }

    /// Pull a request out of whichever queue holds it.
    pub fn remove(&self, id: RequestId) -> Option<Pending> {
        [&self.read, &self.write, &self.orphan, &self.event]
            .into_iter()
            .find_map(|queue| queue.remove(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Command, IoRequest};

    fn pending(id: RequestId, packet_type: u16) -> (Pending, oneshot::Receiver<IoRequest>) {
        let (tx, rx) = oneshot::channel();
        let mut request = IoRequest::new(Command::Read);
        request.id = id;
        request.packet_type = packet_type;
        (Pending::new(request, tx), rx)
    }

    #[test]
    fn earliest_match_wins() {
        let queue = RequestQueue::new("read");
        let (a, _ra) = pending(1, 0x0800);
        let (b, _rb) = pending(2, 0x0806);
        let (c, _rc) = pending(3, 0x0800);
        for p in [a, b, c] {
            queue.push_if(p, || true).ok().unwrap();
        }

        let taken = queue.take_first(|r| r.packet_type == 0x0800).unwrap();
        assert_eq!(taken.request().id, 1);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn refused_admission_returns_request() {
        let queue = RequestQueue::new("read");
        let (p, _rx) = pending(7, 0x0800);
        let back = queue.push_if(p, || false).err().unwrap();
        assert_eq!(back.request().id, 7);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_up_to_keeps_order_and_remainder() {
        let queue = RequestQueue::new("write");
        let mut receivers = Vec::new();
        for id in 0..9 {
            let (p, rx) = pending(id, 0);
            queue.push_if(p, || true).ok().unwrap();
            receivers.push(rx);
        }

        let batch = queue.drain_up_to(8);
        let ids: Vec<_> = batch.iter().map(|p| p.request().id).collect();
        assert_eq!(ids, (0..8).collect::<Vec<_>>());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn take_matching_preserves_rest() {
        let queue = RequestQueue::new("event");
        for (id, ty) in [(1, 1), (2, 2), (3, 1)] {
            let (p, _rx) = pending(id, ty);
            queue.push_if(p, || true).ok().unwrap();
        }
        let matched = queue.take_matching(|r| r.packet_type == 1);
        assert_eq!(matched.iter().map(|p| p.request().id).collect::<Vec<_>>(), [1, 3]);
        assert_eq!(queue.take_first(|_| true).unwrap().request().id, 2);
    }

    #[test]
    fn flush_completes_each_request_once() {
        let queues = Queues::new();
        let (r, mut read_rx) = pending(1, 0x0800);
        let (w, mut write_rx) = pending(2, 0x0800);
        let (e, mut event_rx) = pending(3, 0);
        queues.read.push_if(r, || true).ok().unwrap();
        queues.write.push_if(w, || true).ok().unwrap();
        queues.event.push_if(e, || true).ok().unwrap();

        assert_eq!(queues.flush_offline(), 2);
        assert_eq!(queues.flush_offline(), 0);

        let read = read_rx.try_recv().unwrap();
        assert_eq!(read.error, Some(IoError::OutOfService));
        assert_eq!(read.wire_error, Some(WireError::UnitOffline));
        assert!(write_rx.try_recv().is_ok());
        assert!(event_rx.try_recv().is_err());
        assert_eq!(queues.event.len(), 1);
    }

    #[test]
    fn remove_searches_every_queue() {
        let queues = Queues::new();
        let (p, _rx) = pending(42, 0);
        queues.orphan.push_if(p, || true).ok().unwrap();
        assert!(queues.remove(41).is_none());
        assert_eq!(queues.remove(42).unwrap().request().id, 42);
        assert!(queues.orphan.is_empty());
    }
}
