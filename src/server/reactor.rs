//! Thin epoll wrapper.
//!
//! Request descriptors are registered one-shot: the kernel disarms a
//! registration when it reports the event, which is the only way a request
//! leaves the blocked list. Waking costs no syscall and blocking again is a
//! single `MOD` that re-arms the registration. Event data carries the
//! request's pool index, or [`LISTENER`] for the listening socket.

use std::io;
use std::os::fd::RawFd;

use epoll::{ControlOptions::*, Event, Events};

use crate::server::readiness::Interest;
use crate::server::scheduler::{InterestChange, RequestId};

/// Event data of the listening socket.
pub const LISTENER: u64 = u64::MAX;

/// Whose descriptor became ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Listener,
    Request(RequestId),
}

pub struct Reactor {
    epfd: RawFd,
    events: Vec<Event>,
}

impl Reactor {
    /// `max_events` bounds how many events one wait returns.
    pub fn new(max_events: usize) -> io::Result<Self> {
        let epfd = epoll::create(true)?;
        Ok(Self {
            epfd,
            events: vec![Event::new(Events::empty(), 0); max_events.max(1)],
        })
    }

    pub fn register_listener(&self, fd: RawFd) -> io::Result<()> {
        epoll::ctl(self.epfd, EPOLL_CTL_ADD, fd, Event::new(Events::EPOLLIN, LISTENER))
    }

    pub fn deregister_listener(&self, fd: RawFd) -> io::Result<()> {
        epoll::ctl(self.epfd, EPOLL_CTL_DEL, fd, Event::new(Events::empty(), 0))
    }

    /// Brings the kernel's registration for one request in line with its
    /// new interest.
    pub fn apply(&self, change: &InterestChange) -> io::Result<()> {
        if change.interest.is_none() {
            // disarmed by the event that woke it, or closed with its socket
            return Ok(());
        }

        let event = Event::new(events_for(change.interest), change.id.token());
        match epoll::ctl(self.epfd, EPOLL_CTL_MOD, change.fd, event) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                epoll::ctl(self.epfd, EPOLL_CTL_ADD, change.fd, event)
            }
            other => other,
        }
    }

    /// Waits up to `timeout_ms` (-1 for no limit) and returns what became
    /// ready. Errors and hangups are reported as readiness; the next read
    /// or write surfaces them.
    pub fn wait(&mut self, timeout_ms: i32) -> io::Result<Vec<Readiness>> {
        let n = match epoll::wait(self.epfd, timeout_ms, &mut self.events) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => 0,
            Err(e) => return Err(e),
        };

        Ok(self.events[..n]
            .iter()
            .map(|event| {
                let data = event.data;
                if data == LISTENER {
                    Readiness::Listener
                } else {
                    Readiness::Request(RequestId::from_token(data))
                }
            })
            .collect())
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        let _ = epoll::close(self.epfd);
    }
}

fn events_for(interest: Interest) -> Events {
    let mut events = Events::EPOLLRDHUP | Events::EPOLLONESHOT;
    if interest.is_readable() {
        events |= Events::EPOLLIN;
    }
    if interest.is_writable() {
        events |= Events::EPOLLOUT;
    }
    events
}
