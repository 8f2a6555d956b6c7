//! Background telemetry loop.
//!
//! [`TelemetryPump::tick`] does one round of work: on a worker it flushes
//! the reporter's latest values, on the root it polls inbound updates with a
//! bounded number of attempts and repaints dirty cells. [`TelemetryTask`]
//! runs the pump on its own thread at a fixed interval until shut down.

use super::display::{redraw, CellRenderer, GridLayout};
use super::Reporter;
use crate::config::TelemetryConfig;
use crate::error::Result;
use crate::group::TelemetryLink;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Longest single sleep while waiting for the next tick, so shutdown is
/// noticed promptly.
const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

/// One rank's telemetry worker.
pub struct TelemetryPump<L: TelemetryLink> {
    reporter: Reporter,
    link: L,
    config: TelemetryConfig,
    layout: GridLayout,
    renderer: Option<Box<dyn CellRenderer + Send>>,
    received: u64,
}

impl<L: TelemetryLink> TelemetryPump<L> {
    /// Create a pump without a display.
    pub fn new(reporter: Reporter, link: L, config: TelemetryConfig) -> Self {
        let layout = GridLayout::new(config.geometry, config.cell_width, config.cell_height);
        Self {
            reporter,
            link,
            config,
            layout,
            renderer: None,
            received: 0,
        }
    }

    /// Paint the status board with `renderer` (root only; ignored elsewhere).
    pub fn with_renderer(mut self, renderer: Box<dyn CellRenderer + Send>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Messages the root has received so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Run one round of telemetry work. Never blocks on a peer.
    pub fn tick(&mut self) {
        if self.reporter.is_root() {
            self.poll_inbound();
            self.repaint();
        } else {
            self.reporter.flush(&self.link);
        }
    }

    fn poll_inbound(&mut self) {
        let attempts = self.config.poll_attempts.max(1);
        for attempt in 0..attempts {
            // Each worker has at most one message in flight per slot, so
            // draining is bounded by twice the group size.
            loop {
                match self.link.poll() {
                    Ok(Some((rank, message))) => {
                        self.received += 1;
                        self.reporter.with_board(|board| board.apply(rank, message));
                    }
                    Ok(None) => break,
                    Err(err) => {
                        tracing::trace!(%err, "telemetry poll failed");
                        return;
                    }
                }
            }
            if attempt + 1 < attempts {
                thread::sleep(self.config.poll_sleep);
            }
        }
    }

    fn repaint(&mut self) {
        let renderer = match self.renderer.as_mut() {
            Some(renderer) => renderer,
            None => return,
        };
        let layout = self.layout;
        let drawn = self
            .reporter
            .with_board(|board| redraw(board, &layout, renderer.as_mut()));
        if let Some(Err(err)) = drawn {
            tracing::debug!(%err, "status display repaint failed");
        }
    }
}

/// A [`TelemetryPump`] running on a dedicated thread.
pub struct TelemetryTask {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TelemetryTask {
    /// Start ticking `pump` every `tick_interval`.
    ///
    /// # Errors
    /// Returns an I/O error if the thread cannot be spawned.
    pub fn spawn<L>(mut pump: TelemetryPump<L>) -> Result<Self>
    where
        L: TelemetryLink + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let interval = pump.config.tick_interval;
        let name = format!("telemetry-{}", pump.reporter.rank());

        let handle = thread::Builder::new().name(name).spawn(move || {
            while flag.load(Ordering::Acquire) {
                pump.tick();
                let next = Instant::now() + interval;
                while flag.load(Ordering::Acquire) {
                    let now = Instant::now();
                    if now >= next {
                        break;
                    }
                    thread::sleep((next - now).min(SHUTDOWN_POLL));
                }
            }
            // Last round so the final status makes it out.
            pump.tick();
        })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stop the loop and wait for the thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("telemetry thread panicked");
            }
        }
    }
}

impl Drop for TelemetryTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::{Group, LocalGroup, ROOT};
    use crate::telemetry::Progress;

    fn fast_config() -> TelemetryConfig {
        TelemetryConfig::default()
            .with_tick_interval(Duration::from_millis(5))
            .with_poll_budget(2, Duration::from_millis(1))
    }

    #[test]
    fn test_pump_round_trip() {
        let endpoints = LocalGroup::new(3).endpoints();
        let root_reporter = Reporter::new(ROOT, 3);
        let mut root = TelemetryPump::new(
            root_reporter.clone(),
            endpoints[0].telemetry_link().unwrap(),
            fast_config(),
        );
        let worker_reporter = Reporter::new(2, 3);
        let mut worker = TelemetryPump::new(
            worker_reporter.clone(),
            endpoints[2].telemetry_link().unwrap(),
            fast_config(),
        );

        worker_reporter.update_text("Waiting for tracks...");
        worker_reporter.update_progress(3, 9);
        worker.tick();
        root.tick();

        assert_eq!(root.received(), 2);
        let board = root_reporter.board_snapshot().unwrap();
        assert_eq!(board.message(2), Some("Waiting for tracks..."));
        assert_eq!(board.progress(2), Some(Progress::new(3, 9)));
    }

    #[test]
    fn test_task_shutdown_flushes() {
        let endpoints = LocalGroup::new(2).endpoints();
        let root_reporter = Reporter::new(ROOT, 2);
        let worker_reporter = Reporter::new(1, 2);

        let root_task = TelemetryTask::spawn(TelemetryPump::new(
            root_reporter.clone(),
            endpoints[0].telemetry_link().unwrap(),
            fast_config(),
        ))
        .unwrap();
        let worker_task = TelemetryTask::spawn(TelemetryPump::new(
            worker_reporter.clone(),
            endpoints[1].telemetry_link().unwrap(),
            fast_config(),
        ))
        .unwrap();

        worker_reporter.update_text("done");
        let deadline = Instant::now() + Duration::from_secs(5);
        while root_reporter.board_snapshot().unwrap().message(1) != Some("done") {
            assert!(Instant::now() < deadline, "status never reached the root");
            thread::sleep(Duration::from_millis(5));
        }

        worker_task.shutdown();
        root_task.shutdown();
    }
}
