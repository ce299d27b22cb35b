use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::http::cgi::CgiGateway;
use crate::http::connection::{ConnectionHandler, Progress};
use crate::server::reactor::{Reactor, Readiness};
use crate::server::scheduler::{PoolExhausted, Queue, RequestId, Scheduler};

/// Longest the loop sleeps with nothing ready, so idle reaping and signal
/// flags are looked at regularly.
const POLL_INTERVAL_MS: i32 = 1000;

/// Flags raised from signal handlers and polled by the event loop.
#[derive(Debug, Clone, Default)]
pub struct ControlFlags {
    /// Re-read the configuration.
    pub reload: Arc<AtomicBool>,
    /// Stop accepting; exit once every connection has finished.
    pub lame_duck: Arc<AtomicBool>,
    /// Exit now.
    pub exit: Arc<AtomicBool>,
}

impl ControlFlags {
    /// SIGHUP reloads, SIGTERM enters lame duck mode, SIGINT exits.
    pub fn register() -> io::Result<Self> {
        let flags = Self::default();
        signal_hook::flag::register(SIGHUP, Arc::clone(&flags.reload))?;
        signal_hook::flag::register(SIGTERM, Arc::clone(&flags.lame_duck))?;
        signal_hook::flag::register(SIGINT, Arc::clone(&flags.exit))?;
        Ok(flags)
    }
}

/// The single-threaded server: one listener, one request pool, one epoll
/// instance.
pub struct Server {
    listener: TcpListener,
    cfg: Config,
    handler: ConnectionHandler,
    scheduler: Scheduler<TcpStream>,
    reactor: Reactor,
    accepting: bool,
}

impl Server {
    pub fn bind(cfg: Config) -> anyhow::Result<Self> {
        cfg.validate()?;
        let listener = TcpListener::bind(&cfg.listen_addr)
            .with_context(|| format!("binding {}", cfg.listen_addr))?;
        listener.set_nonblocking(true)?;

        let reactor = Reactor::new(cfg.max_connections + 1).context("creating epoll instance")?;
        reactor.register_listener(listener.as_raw_fd())?;

        Ok(Self {
            handler: ConnectionHandler::new(&cfg),
            scheduler: Scheduler::new(cfg.max_connections, cfg.buffer_size, cfg.client_stream_size),
            listener,
            reactor,
            cfg,
            accepting: true,
        })
    }

    pub fn with_gateway(mut self, gateway: impl CgiGateway + 'static) -> Self {
        self.handler = self.handler.with_gateway(gateway);
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn scheduler(&self) -> &Scheduler<TcpStream> {
        &self.scheduler
    }

    pub fn run(&mut self, flags: &ControlFlags) -> anyhow::Result<()> {
        info!(addr = %self.local_addr()?, pool = self.scheduler.capacity(), "Listening");

        loop {
            if flags.exit.load(Ordering::Relaxed) {
                info!(active = self.scheduler.active(), "Shutdown signal received");
                break;
            }
            if flags.reload.swap(false, Ordering::Relaxed) {
                self.reload();
            }
            if self.accepting && flags.lame_duck.load(Ordering::Relaxed) {
                self.enter_lame_duck();
            }
            if !self.accepting && self.scheduler.active() == 0 {
                info!("All connections finished");
                break;
            }

            self.process_ready();
            self.apply_interest();

            let timeout = if self.scheduler.len(Queue::Ready) > 0 { 0 } else { POLL_INTERVAL_MS };
            for readiness in self.reactor.wait(timeout).context("waiting for events")? {
                match readiness {
                    Readiness::Listener => self.accept_all(),
                    Readiness::Request(id) if id.index() < self.scheduler.capacity() => {
                        self.scheduler.mark_ready(id);
                    }
                    Readiness::Request(id) => warn!(slot = id.index(), "Event for unknown slot"),
                }
            }

            let timeout = Duration::from_secs(u64::from(self.cfg.keep_alive.timeout));
            let reaped = self.scheduler.reap_idle(Instant::now(), timeout);
            if reaped > 0 {
                debug!(reaped, "Dropped idle connections");
            }
            self.apply_interest();

            #[cfg(debug_assertions)]
            if let Err(e) = self.scheduler.verify() {
                error!(error = %e, "Request pool is inconsistent");
            }
        }
        Ok(())
    }

    /// Gives every ready request one step, in list order.
    fn process_ready(&mut self) {
        let mut cursor = self.scheduler.ready_head();
        while let Some(id) = cursor {
            cursor = self.scheduler.next_in_queue(id);
            match self.handler.process(self.scheduler.get_mut(id)) {
                Progress::Continue => {}
                Progress::BlockRead => {
                    self.scheduler.mark_blocked_on_read(id);
                }
                Progress::BlockWrite => {
                    self.scheduler.mark_blocked_on_write(id);
                }
                Progress::Close => {
                    debug!(slot = id.index(), "Connection closed");
                    self.scheduler.release(id);
                }
            }
        }
    }

    fn accept_all(&mut self) {
        if !self.accepting {
            return;
        }
        loop {
            match self.listener.accept() {
                Ok((stream, remote)) => {
                    if let Err(e) = stream.set_nonblocking(true) {
                        warn!(%remote, error = %e, "Cannot make connection non-blocking");
                        continue;
                    }
                    match self.scheduler.acquire(stream, Some(remote), self.cfg.keep_alive.max) {
                        Ok(id) => debug!(slot = id.index(), %remote, "Accepted connection"),
                        Err(PoolExhausted(_stream)) => {
                            warn!(%remote, pool = self.scheduler.capacity(), "Request pool exhausted, dropping connection");
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    break;
                }
            }
        }
    }

    fn apply_interest(&mut self) {
        let mut failed: Vec<RequestId> = Vec::new();
        for change in self.scheduler.drain_interest_changes() {
            if let Err(e) = self.reactor.apply(&change) {
                warn!(slot = change.id.index(), fd = change.fd, error = %e, "Cannot register interest");
                failed.push(change.id);
            }
        }
        for id in failed {
            self.scheduler.release(id);
        }
    }

    fn enter_lame_duck(&mut self) {
        self.accepting = false;
        if let Err(e) = self.reactor.deregister_listener(self.listener.as_raw_fd()) {
            warn!(error = %e, "Cannot remove listener from epoll");
        }
        info!(active = self.scheduler.active(), "Lame duck mode, no longer accepting");
    }

    fn reload(&mut self) {
        match Config::load() {
            Ok(cfg) => {
                if cfg.listen_addr != self.cfg.listen_addr
                    || cfg.max_connections != self.cfg.max_connections
                {
                    warn!("Listen address and pool size changes take effect on restart");
                }
                self.handler.reconfigure(&cfg);
                self.cfg.keep_alive = cfg.keep_alive;
                info!("Configuration reloaded");
            }
            Err(e) => error!(error = %e, "Reload failed, keeping current configuration"),
        }
    }
}

/// Binds, installs signal handlers and serves until told to stop.
pub fn run(cfg: Config) -> anyhow::Result<()> {
    let flags = ControlFlags::register().context("installing signal handlers")?;
    Server::bind(cfg)?.run(&flags)
}
