//! Request pool and the free / blocked / ready lists.
//!
//! Every request record lives in one pre-allocated vector. The three lists
//! are threaded through the records themselves with index links, so moving
//! a record between lists never allocates and never moves the record.
//!
//! ```text
//!   acquire ──► ready ◄──── mark_ready ────┐
//!                 │                         │
//!                 └── mark_blocked_on_* ──► blocked
//!   release ◄──── any list (socket closed first)
//! ```
//!
//! Blocking a record sets its descriptor in the read or write set; waking
//! it clears both. The sets are never rebuilt from scratch, and the
//! change log lets the reactor touch only the records that moved.

use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use anyhow::{bail, ensure};

use crate::http::request::{Request, RequestStatus};
use crate::server::readiness::{FdSet, Interest};

/// Index of a record in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(usize);

impl RequestId {
    pub fn index(self) -> usize {
        self.0
    }

    /// Encodes the id for use as reactor event data.
    pub fn token(self) -> u64 {
        self.0 as u64
    }

    pub fn from_token(token: u64) -> Self {
        Self(token as usize)
    }
}

/// The list a record currently belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Queue {
    #[default]
    Free,
    Blocked,
    Ready,
}

impl Queue {
    const fn slot(self) -> usize {
        match self {
            Queue::Free => 0,
            Queue::Blocked => 1,
            Queue::Ready => 2,
        }
    }
}

/// Intrusive list membership, embedded in every request record.
#[derive(Debug, Clone, Copy, Default)]
pub struct Links {
    queue: Queue,
    next: Option<RequestId>,
    prev: Option<RequestId>,
    interest: Interest,
}

/// The pool has no free record for a new connection.
///
/// Carries the socket back so the caller can drop it.
#[derive(Debug)]
pub struct PoolExhausted<S>(pub S);

/// A change of registered interest the reactor has not applied yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterestChange {
    pub id: RequestId,
    pub fd: RawFd,
    pub interest: Interest,
}

pub struct Scheduler<S> {
    slots: Vec<Request<S>>,
    heads: [Option<RequestId>; 3],
    counts: [usize; 3],
    read_set: FdSet,
    write_set: FdSet,
    changes: Vec<InterestChange>,
}

impl<S: AsRawFd> Scheduler<S> {
    /// Builds a pool of `capacity` records, all free.
    pub fn new(capacity: usize, buffer_size: usize, stream_size: usize) -> Self {
        let mut scheduler = Self {
            slots: (0..capacity).map(|_| Request::new(buffer_size, stream_size)).collect(),
            heads: [None; 3],
            counts: [0; 3],
            read_set: FdSet::new(),
            write_set: FdSet::new(),
            changes: Vec::new(),
        };
        // link in reverse so the free list hands out slot 0 first
        for index in (0..capacity).rev() {
            scheduler.push_front(RequestId(index), Queue::Free);
        }
        scheduler
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self, queue: Queue) -> usize {
        self.counts[queue.slot()]
    }

    /// Records outside the free list.
    pub fn active(&self) -> usize {
        self.slots.len() - self.len(Queue::Free)
    }

    pub fn queue_of(&self, id: RequestId) -> Queue {
        self.slots[id.0].links.queue
    }

    pub fn get(&self, id: RequestId) -> &Request<S> {
        &self.slots[id.0]
    }

    pub fn get_mut(&mut self, id: RequestId) -> &mut Request<S> {
        &mut self.slots[id.0]
    }

    pub fn head(&self, queue: Queue) -> Option<RequestId> {
        self.heads[queue.slot()]
    }

    pub fn ready_head(&self) -> Option<RequestId> {
        self.head(Queue::Ready)
    }

    /// Successor of `id` in whatever list it is in.
    ///
    /// Read this before relinking `id` when walking a list.
    pub fn next_in_queue(&self, id: RequestId) -> Option<RequestId> {
        self.slots[id.0].links.next
    }

    /// Ids of a list, head first.
    pub fn iter(&self, queue: Queue) -> impl Iterator<Item = RequestId> + '_ {
        std::iter::successors(self.head(queue), move |id| self.next_in_queue(*id))
    }

    /// Descriptors waiting for input.
    pub fn read_set(&self) -> &FdSet {
        &self.read_set
    }

    /// Descriptors waiting for output space.
    pub fn write_set(&self) -> &FdSet {
        &self.write_set
    }

    /// Takes a free record for a new connection and puts it on the ready
    /// list. Fails without blocking when the pool is exhausted.
    pub fn acquire(
        &mut self,
        socket: S,
        remote: Option<SocketAddr>,
        ka_max: u32,
    ) -> Result<RequestId, PoolExhausted<S>> {
        let Some(id) = self.head(Queue::Free) else {
            return Err(PoolExhausted(socket));
        };
        self.unlink(id);
        self.slots[id.0].attach(socket, remote, ka_max);
        self.push_front(id, Queue::Ready);
        Ok(id)
    }

    /// Closes the record's socket and returns it to the free list.
    ///
    /// Safe to call on a record in any list, including one already free.
    pub fn release(&mut self, id: RequestId) {
        if self.queue_of(id) == Queue::Free {
            self.slots[id.0].recycle();
            return;
        }

        self.set_interest(id, Interest::NONE);
        // the kernel forgets a descriptor when it is closed
        self.changes.retain(|c| c.id != id);

        let req = &mut self.slots[id.0];
        req.status = RequestStatus::Close;
        req.recycle();

        self.unlink(id);
        self.push_front(id, Queue::Free);
    }

    /// Parks the record until its socket is readable.
    ///
    /// Returns false if the record has no socket; it is released instead,
    /// since nothing would ever wake it.
    pub fn mark_blocked_on_read(&mut self, id: RequestId) -> bool {
        self.block(id, Interest::READABLE)
    }

    /// Parks the record until its socket is writable.
    pub fn mark_blocked_on_write(&mut self, id: RequestId) -> bool {
        self.block(id, Interest::WRITABLE)
    }

    fn block(&mut self, id: RequestId, interest: Interest) -> bool {
        if self.queue_of(id) == Queue::Free {
            return false;
        }
        if !self.slots[id.0].is_attached() {
            tracing::warn!(slot = id.0, "Blocking a request without a socket; releasing it");
            self.release(id);
            return false;
        }
        self.unlink(id);
        self.push_front(id, Queue::Blocked);
        self.set_interest(id, interest);
        true
    }

    /// Moves a record to the ready list and clears its readiness bits.
    ///
    /// Free records are left alone; a late event for a released record is
    /// not an error.
    pub fn mark_ready(&mut self, id: RequestId) {
        if self.queue_of(id) == Queue::Free {
            return;
        }
        self.unlink(id);
        self.push_front(id, Queue::Ready);
        self.set_interest(id, Interest::NONE);
    }

    /// Interest changes since the last drain, oldest first.
    pub fn drain_interest_changes(&mut self) -> std::vec::Drain<'_, InterestChange> {
        self.changes.drain(..)
    }

    /// Releases blocked records idle for longer than `timeout`.
    pub fn reap_idle(&mut self, now: Instant, timeout: Duration) -> usize {
        let expired: Vec<RequestId> = self
            .iter(Queue::Blocked)
            .filter(|id| now.saturating_duration_since(self.slots[id.0].time_last) > timeout)
            .collect();

        for &id in &expired {
            tracing::debug!(slot = id.0, remote = ?self.slots[id.0].remote, "Idle connection timed out");
            self.release(id);
        }
        expired.len()
    }

    /// Checks every structural invariant of the pool.
    pub fn verify(&self) -> anyhow::Result<()> {
        let mut seen = vec![false; self.slots.len()];

        for queue in [Queue::Free, Queue::Blocked, Queue::Ready] {
            let mut prev = None;
            let mut count = 0;
            for id in self.iter(queue) {
                ensure!(!seen[id.0], "slot {} linked twice", id.0);
                seen[id.0] = true;
                count += 1;

                let req = &self.slots[id.0];
                ensure!(req.links.queue == queue, "slot {} tagged {:?} but linked in {:?}", id.0, req.links.queue, queue);
                ensure!(req.links.prev == prev, "slot {} has a broken back link", id.0);
                prev = Some(id);

                let out = req.output();
                ensure!(
                    out.start() <= out.end() && out.end() <= out.capacity(),
                    "slot {} cursors out of bounds: {} {} {}",
                    id.0,
                    out.start(),
                    out.end(),
                    out.capacity()
                );

                match queue {
                    Queue::Free => {
                        ensure!(!req.is_attached(), "free slot {} still owns a socket", id.0);
                        ensure!(req.links.interest.is_none(), "free slot {} has interest", id.0);
                    }
                    Queue::Blocked => {
                        let Some(socket) = req.socket() else {
                            bail!("blocked slot {} has no socket", id.0);
                        };
                        let fd = socket.as_raw_fd();
                        let interest = req.links.interest;
                        ensure!(!interest.is_none(), "blocked slot {} waits for nothing", id.0);
                        ensure!(interest.is_readable() == self.read_set.contains(fd), "slot {} read bit out of sync", id.0);
                        ensure!(interest.is_writable() == self.write_set.contains(fd), "slot {} write bit out of sync", id.0);
                    }
                    Queue::Ready => {
                        ensure!(req.is_attached(), "ready slot {} has no socket", id.0);
                        ensure!(req.links.interest.is_none(), "ready slot {} still registered", id.0);
                    }
                }
            }
            ensure!(count == self.len(queue), "{:?} count is {} but {} are linked", queue, self.len(queue), count);
        }

        if let Some(orphan) = seen.iter().position(|s| !s) {
            bail!("slot {orphan} is in no list");
        }
        Ok(())
    }

    fn set_interest(&mut self, id: RequestId, interest: Interest) {
        let req = &mut self.slots[id.0];
        let old = req.links.interest;
        if old == interest {
            return;
        }
        req.links.interest = interest;

        let Some(fd) = req.socket().map(AsRawFd::as_raw_fd) else {
            return;
        };
        if interest.is_readable() {
            self.read_set.insert(fd);
        } else {
            self.read_set.remove(fd);
        }
        if interest.is_writable() {
            self.write_set.insert(fd);
        } else {
            self.write_set.remove(fd);
        }
        self.changes.push(InterestChange { id, fd, interest });
    }

    fn unlink(&mut self, id: RequestId) {
        let Links { queue, next, prev, .. } = self.slots[id.0].links;
        match prev {
            Some(p) => self.slots[p.0].links.next = next,
            None => self.heads[queue.slot()] = next,
        }
        if let Some(n) = next {
            self.slots[n.0].links.prev = prev;
        }
        self.counts[queue.slot()] -= 1;

        let links = &mut self.slots[id.0].links;
        links.next = None;
        links.prev = None;
    }

    fn push_front(&mut self, id: RequestId, queue: Queue) {
        let head = self.heads[queue.slot()];
        if let Some(h) = head {
            self.slots[h.0].links.prev = Some(id);
        }
        let links = &mut self.slots[id.0].links;
        links.queue = queue;
        links.next = head;
        links.prev = None;
        self.heads[queue.slot()] = Some(id);
        self.counts[queue.slot()] += 1;
    }
}
