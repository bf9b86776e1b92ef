/*!
    The muxer node.

    A [`Muxer`] owns one output container and serializes packets from any
    number of [`MuxerPacketHandler`]s into it. All container access happens
    on a single consumer thread fed by a [`WorkQueue`]:

    ```text
    producers -> handlers -> WorkQueue -> consumer thread -> Container
    ```

    Lifecycle: `Created -> HeaderPending -> HeaderWritten -> Draining -> Finalized`.
    The header is written exactly once by [`Muxer::start`]. [`Muxer::stop`]
    lets the consumer drain what was already queued, after which the
    [`Closer`] writes the trailer, closes the I/O and frees the container.
*/

use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::closer::Closer;
use crate::config::MuxerOptions;
use crate::container::{Container, ContainerFactory, OutputStream, StreamParams};
use crate::error::MuxError;
use crate::events::{Event, EventKind, EventSink};
use crate::handler::{MuxerPacketHandler, PacketPayload};
use crate::node::{NodeMetadata, PauseGate, next_muxer_id};
use crate::queue::WorkQueue;
use crate::restamp::Restamper;
use crate::stats::{CounterRateStat, DurationPercentageStat, GaugeStat, StatMetadata, Stater};

/**
    Lifecycle state of a [`Muxer`].
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MuxerState {
    /// Allocated; streams may be added and packets are buffered.
    Created,
    /// A start was requested and the header is being written.
    HeaderPending,
    /// The header is written; the trailer is registered for teardown.
    HeaderWritten,
    /// The consumer thread is writing packets.
    Draining,
    /// Nothing more will be written.
    Finalized,
}

pub(crate) struct Job {
    pub(crate) payload: PacketPayload,
    pub(crate) stream: OutputStream,
}

pub(crate) struct MuxerStats {
    pub(crate) incoming_rate: Arc<CounterRateStat>,
    pub(crate) work_ratio: Arc<DurationPercentageStat>,
    stater: Stater,
}

pub(crate) struct MuxerInner<C: Container> {
    metadata: NodeMetadata,
    url: String,
    header_options: Vec<(&'static str, String)>,
    state: Mutex<MuxerState>,
    // Only the consumer writes packets. The mutex lets add_stream reach the
    // container before start and the closer actions reach it at teardown.
    container: Arc<Mutex<Option<C>>>,
    restamper: Option<Arc<dyn Restamper>>,
    pub(crate) queue: Arc<WorkQueue<Job>>,
    closer: Closer,
    header: OnceLock<Result<(), MuxError>>,
    pub(crate) stats: MuxerStats,
    events: Arc<dyn EventSink>,
    pub(crate) pause: PauseGate,
    done: watch::Sender<bool>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

/**
    Muxes packets from any number of streams into a single output.
*/
pub struct Muxer<C: Container> {
    inner: Arc<MuxerInner<C>>,
}

impl<C: Container> Muxer<C> {
    /**
        Allocate the output and, if the format needs it, open it for writing.

        Every acquired resource is registered on the muxer's closer so that
        teardown releases them in reverse order. Nothing is written until
        [`Muxer::start`].
    */
    pub fn new<F>(
        options: MuxerOptions,
        factory: &F,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, MuxError>
    where
        F: ContainerFactory<Container = C>,
    {
        options.validate()?;

        let count = next_muxer_id();
        let metadata = options.node.clone().extend(
            format!("muxer_{count}"),
            format!("Muxer #{count}"),
            format!("Muxes to {}", options.url),
        );

        let closer = Closer::new();

        let container = factory
            .allocate(options.format.as_ref(), &options.url)
            .map_err(|source| MuxError::Allocate {
                url: options.url.clone(),
                source,
            })?;
        let needs_io = container.needs_io();
        let container = Arc::new(Mutex::new(Some(container)));

        // Free the container last
        {
            let container = Arc::clone(&container);
            closer.add(move || {
                drop(container.lock().take());
                Ok(())
            });
        }

        if needs_io {
            if let Some(c) = container.lock().as_mut() {
                c.open_io().map_err(|source| MuxError::OpenIo {
                    url: options.url.clone(),
                    source,
                })?;
            }

            let container = Arc::clone(&container);
            closer.add(move || match container.lock().as_mut() {
                Some(c) => c.close_io().map_err(MuxError::IoClose),
                None => Ok(()),
            });
        }

        let queue = Arc::new(WorkQueue::new(options.queue_capacity));
        let stats = MuxerStats::new(Arc::downgrade(&queue));
        let header_options = options
            .format
            .as_ref()
            .map(|format| format.muxer_options(options.fast_start))
            .unwrap_or_default();
        let (done, _) = watch::channel(false);

        tracing::info!(
            node = %metadata.name,
            url = %options.url,
            format = options.format.as_ref().map(|f| f.short_name()),
            "muxer opened"
        );

        Ok(Self {
            inner: Arc::new(MuxerInner {
                metadata,
                url: options.url,
                header_options,
                state: Mutex::new(MuxerState::Created),
                container,
                restamper: options.restamper,
                queue,
                closer,
                header: OnceLock::new(),
                stats,
                events,
                pause: PauseGate::default(),
                done,
                consumer: Mutex::new(None),
            }),
        })
    }

    pub fn metadata(&self) -> &NodeMetadata {
        &self.inner.metadata
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn state(&self) -> MuxerState {
        *self.inner.state.lock()
    }

    /**
        Stats exposed for external polling: incoming rate, work ratio and queue length.
    */
    pub fn stater(&self) -> &Stater {
        &self.inner.stats.stater
    }

    /**
        Number of packets waiting to be written.
    */
    pub fn queued(&self) -> usize {
        self.inner.queue.len()
    }

    /**
        Register an output stream. Only allowed before [`Muxer::start`].

        Rejects streams whose timebase is unusable or whose codec does not
        match the stream kind.
    */
    pub fn add_stream(&self, params: &StreamParams) -> Result<OutputStream, MuxError> {
        params.validate()?;

        let state = self.inner.state.lock();
        match *state {
            MuxerState::Created => {}
            MuxerState::Finalized => return Err(MuxError::Finalized),
            _ => return Err(MuxError::AlreadyStarted),
        }

        let mut container = self.inner.container.lock();
        let container = container.as_mut().ok_or(MuxError::Finalized)?;
        let index = container.add_stream(params).map_err(MuxError::AddStream)?;

        tracing::debug!(
            node = %self.inner.metadata.name,
            stream_index = index,
            time_base = %params.time_base(),
            "stream added"
        );

        Ok(OutputStream {
            index,
            time_base: params.time_base(),
        })
    }

    /**
        Create a submission endpoint for `stream`.
    */
    pub fn new_packet_handler(&self, stream: OutputStream) -> MuxerPacketHandler<C> {
        MuxerPacketHandler::new(Arc::downgrade(&self.inner), stream)
    }

    /**
        Write the header and start the consumer thread.

        Safe to call from several threads at once: the header is written by
        exactly one caller and every caller gets the same result. A header
        failure is also emitted as an event and finalizes the muxer without
        writing any packet or trailer.
    */
    pub fn start(&self) -> Result<(), MuxError> {
        {
            let mut state = self.inner.state.lock();
            if *state == MuxerState::Created {
                *state = MuxerState::HeaderPending;
            }
        }

        self.inner
            .header
            .get_or_init(|| MuxerInner::begin(&self.inner))
            .clone()
    }

    /**
        Stop accepting packets and finalize once everything queued is written.

        Before [`Muxer::start`] this finalizes immediately and discards
        buffered packets, since no header was written.
    */
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn pause(&self) {
        self.inner.pause.pause();
    }

    pub fn resume(&self) {
        self.inner.pause.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.inner.pause.is_paused()
    }

    /**
        Observe teardown: the value turns true once the closer has run.
    */
    pub fn done(&self) -> watch::Receiver<bool> {
        self.inner.done.subscribe()
    }

    pub fn is_done(&self) -> bool {
        *self.inner.done.borrow()
    }

    /**
        Block until the consumer thread has finished. Call [`Muxer::stop`] first.
    */
    pub fn wait(&self) {
        let handle = self.inner.consumer.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!(node = %self.inner.metadata.name, "muxer thread panicked");
            }
        }
    }
}

impl<C: Container> Drop for Muxer<C> {
    fn drop(&mut self) {
        self.inner.stop();
    }
}

impl<C: Container> std::fmt::Debug for Muxer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Muxer")
            .field("node", &self.inner.metadata.name)
            .field("url", &self.inner.url)
            .field("state", &self.state())
            .field("queued", &self.queued())
            .finish_non_exhaustive()
    }
}

impl<C: Container> MuxerInner<C> {
    fn begin(inner: &Arc<Self>) -> Result<(), MuxError> {
        if *inner.state.lock() != MuxerState::HeaderPending {
            return Err(MuxError::Finalized);
        }

        let written = match inner.container.lock().as_mut() {
            Some(container) => container
                .write_header(&inner.header_options)
                .map_err(MuxError::HeaderWrite),
            None => Err(MuxError::Finalized),
        };
        if let Err(e) = written {
            inner.emit_error("write_header", e.clone());
            inner.abort();
            return Err(e);
        }

        *inner.state.lock() = MuxerState::HeaderWritten;
        tracing::info!(node = %inner.metadata.name, url = %inner.url, "header written");

        {
            let container = Arc::clone(&inner.container);
            inner.closer.add(move || match container.lock().as_mut() {
                Some(c) => c.write_trailer().map_err(MuxError::TrailerWrite),
                None => Ok(()),
            });
        }

        inner.queue.start();
        *inner.state.lock() = MuxerState::Draining;
        inner.emit(EventKind::Started);

        let consumer = Arc::clone(inner);
        let spawned = thread::Builder::new()
            .name(inner.metadata.name.clone())
            .spawn(move || consumer.consume());

        match spawned {
            Ok(handle) => {
                *inner.consumer.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                let e = MuxError::Spawn(e.to_string());
                inner.emit_error("spawn", e.clone());
                inner.abort();
                Err(e)
            }
        }
    }

    fn consume(&self) {
        let _finalize = FinalizeOnExit(self);
        self.queue.run(|job| self.process(job));
    }

    fn process(&self, job: Job) {
        self.pause.wait();

        let Job { payload, stream } = job;
        let PacketPayload {
            mut packet,
            descriptor,
        } = payload;

        if !packet.rescale_ts(descriptor.time_base, stream.time_base) {
            self.emit_error(
                "rescale",
                MuxError::Rescale {
                    stream_index: stream.index,
                    from: descriptor.time_base,
                    to: stream.time_base,
                },
            );
            return;
        }

        packet.stream_index = stream.index;

        if let Some(restamper) = &self.restamper {
            if let Err(e) = restamper.restamp(&mut packet) {
                self.emit_error("restamp", e);
                return;
            }
        }

        let written = {
            let mut container = self.container.lock();
            let Some(container) = container.as_mut() else {
                return;
            };

            self.stats.work_ratio.begin();
            let written = container.write_interleaved(&packet);
            self.stats.work_ratio.end();
            written
        };

        if let Err(source) = written {
            self.emit_error(
                "write_interleaved",
                MuxError::PacketWrite {
                    stream_index: stream.index,
                    source,
                },
            );
        }
    }

    fn stop(&self) {
        let previous = {
            let mut state = self.state.lock();
            let previous = *state;
            if previous == MuxerState::Created {
                *state = MuxerState::Finalized;
            }
            previous
        };

        match previous {
            MuxerState::Finalized => {}
            MuxerState::Created => self.abort(),
            _ => {
                self.queue.stop();
                self.pause.close();
            }
        }
    }

    /**
        Finalize without draining: nothing queued will be written.
    */
    fn abort(&self) {
        *self.state.lock() = MuxerState::Finalized;
        self.queue.stop();
        self.pause.close();

        let discarded = self.queue.discard();
        if discarded > 0 {
            tracing::debug!(
                node = %self.metadata.name,
                discarded,
                "discarding buffered packets"
            );
        }

        self.teardown();
    }

    fn teardown(&self) {
        if let Err(e) = self.closer.close() {
            match e {
                MuxError::Cleanup(errors) => {
                    for error in errors {
                        self.emit_error(cleanup_operation(&error), error);
                    }
                }
                other => self.emit_error("close", other),
            }
        }

        self.done.send_replace(true);
        tracing::info!(node = %self.metadata.name, url = %self.url, "muxer finalized");
        self.emit(EventKind::Stopped);
    }

    fn emit(&self, kind: EventKind) {
        self.events.emit(Event {
            node: self.metadata.name.clone(),
            kind,
        });
    }

    fn emit_error(&self, operation: &'static str, error: MuxError) {
        self.emit(EventKind::Error { operation, error });
    }
}

/**
    Finalizes the node when the consumer loop exits, including by panic.

    After a panic nothing queued is written: the queue is stopped so blocked
    producers return, and the trailer is still written by teardown.
*/
struct FinalizeOnExit<'a, C: Container>(&'a MuxerInner<C>);

impl<C: Container> Drop for FinalizeOnExit<'_, C> {
    fn drop(&mut self) {
        let inner = self.0;

        if thread::panicking() {
            inner.queue.stop();
            inner.pause.close();
            let discarded = inner.queue.discard();
            tracing::error!(node = %inner.metadata.name, discarded, "muxer thread panicked");
            inner.emit_error(
                "consume",
                MuxError::Panicked(format!("{discarded} queued packet(s) discarded")),
            );
        }

        *inner.state.lock() = MuxerState::Finalized;
        inner.teardown();
    }
}

fn cleanup_operation(error: &MuxError) -> &'static str {
    match error {
        MuxError::TrailerWrite(_) => "write_trailer",
        MuxError::IoClose(_) => "close_io",
        _ => "close",
    }
}

impl MuxerStats {
    fn new(queue: Weak<WorkQueue<Job>>) -> Self {
        let incoming_rate = Arc::new(CounterRateStat::new());
        let work_ratio = Arc::new(DurationPercentageStat::new());
        let stater = Stater::new();

        stater.add_stat(
            StatMetadata {
                label: "Incoming rate",
                description: "Number of packets coming in per second",
                unit: "pps",
            },
            incoming_rate.clone(),
        );
        stater.add_stat(
            StatMetadata {
                label: "Work ratio",
                description: "Percentage of time spent doing some actual work",
                unit: "%",
            },
            work_ratio.clone(),
        );
        stater.add_stat(
            StatMetadata {
                label: "Queue length",
                description: "Number of packets waiting to be written",
                unit: "packets",
            },
            Arc::new(GaugeStat::new(move || {
                queue.upgrade().map_or(0.0, |queue| queue.len() as f64)
            })),
        );

        Self {
            incoming_rate,
            work_ratio,
            stater,
        }
    }
}
