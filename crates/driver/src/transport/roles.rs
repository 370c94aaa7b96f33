//! The three threads of an open session
//!
//! Each role loops until the shared cancellation flag is raised, waking at
//! least once per configured timeout to check it. Roles never return errors;
//! failures go to the event sink.

use crate::config::DriverConfig;
use crate::handoff::{HandoffReceiver, HandoffSender, TransmitBuffer};
use crate::link::LinkSession;
use common::{DriverStats, EventKind, EventSink, Severity};
use crossbeam::channel::{Receiver, RecvTimeoutError, TryRecvError};
use protocol::{EthernetPacketizer, MacAddress};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace, warn};

/// State shared by all roles of one session
#[derive(Clone)]
pub(crate) struct RoleContext {
    pub link: Arc<dyn LinkSession>,
    pub cancel: Arc<AtomicBool>,
    pub events: EventSink,
    pub stats: Arc<DriverStats>,
    pub config: DriverConfig,
    pub host_mac: MacAddress,
    pub device_mac: MacAddress,
}

impl RoleContext {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}

fn spawn_role<F>(name: &str, body: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .expect("Failed to spawn link driver thread")
}

/// Poll the link and queue de-framed bytes from our device
pub(crate) fn spawn_read_role(
    ctx: RoleContext,
    receive_tx: async_channel::Sender<Vec<u8>>,
) -> JoinHandle<()> {
    spawn_role("link-read", move || read_loop(ctx, receive_tx))
}

fn read_loop(ctx: RoleContext, receive_tx: async_channel::Sender<Vec<u8>>) {
    debug!("Read role started for {}", ctx.device_mac);
    let mut filter = EthernetPacketizer::new(ctx.host_mac, ctx.device_mac);
    let timeout = ctx.config.poll_timeout();

    while !ctx.cancelled() {
        let frame = match ctx.link.poll(timeout) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => {
                if !ctx.cancelled() {
                    error!("Polling {} failed: {}", ctx.device_mac, e);
                    ctx.events.report(EventKind::FailedToRead, Severity::Error);
                }
                break;
            }
        };

        if !filter.input_up(&frame) {
            continue;
        }
        let bytes = filter.output_up();
        ctx.stats.frame_received(bytes.len());

        match receive_tx.try_send(bytes) {
            Ok(()) => {}
            Err(async_channel::TrySendError::Full(dropped)) => {
                trace!("Dropping {} inbound bytes", dropped.len());
                ctx.stats.receive_overflow();
                ctx.events
                    .report(EventKind::ReceiveQueueOverflow, Severity::Warning);
            }
            Err(async_channel::TrySendError::Closed(_)) => break,
        }
    }
    debug!("Read role stopped for {}", ctx.device_mac);
}

/// Batch queued writes into link frames and hand buffers to the transmit role
pub(crate) fn spawn_write_role(
    ctx: RoleContext,
    write_rx: Receiver<Vec<u8>>,
    handoff: HandoffSender,
    active: TransmitBuffer,
) -> JoinHandle<()> {
    spawn_role("link-write", move || write_loop(ctx, write_rx, handoff, active))
}

fn write_loop(
    ctx: RoleContext,
    write_rx: Receiver<Vec<u8>>,
    handoff: HandoffSender,
    mut active: TransmitBuffer,
) {
    debug!("Write role started for {}", ctx.device_mac);
    let mut framer = EthernetPacketizer::new(ctx.host_mac, ctx.device_mac);
    let max_frame = ctx.config.max_frame_size;
    let wait = ctx.config.write_wait();

    while !ctx.cancelled() {
        let first = match write_rx.recv_timeout(wait) {
            Ok(bytes) => bytes,
            Err(RecvTimeoutError::Timeout) => {
                // Don't let a partly filled buffer sit until the next write
                hand_off(&ctx, &handoff, &mut active, false);
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        framer.input_down(&first);
        let budget = (active.remaining() / max_frame) / ctx.config.batch_divisor;
        let mut batched = 1;
        while batched < budget {
            match write_rx.try_recv() {
                Ok(bytes) => {
                    framer.input_down(&bytes);
                    batched += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        trace!("Batched {} writes", batched);

        for frame in framer.output_down() {
            if active.push_frame(&frame) {
                ctx.stats.frame_queued();
            } else {
                warn!(
                    "Link frame of {} bytes does not fit the transmit buffer",
                    frame.len()
                );
                ctx.stats.write_dropped();
                ctx.events.report(EventKind::FailedToWrite, Severity::Warning);
            }
        }

        let nearly_full = active.len() + 2 * max_frame >= active.capacity();
        hand_off(&ctx, &handoff, &mut active, nearly_full);
    }
    debug!("Write role stopped for {}", ctx.device_mac);
}

fn hand_off(
    ctx: &RoleContext,
    handoff: &HandoffSender,
    active: &mut TransmitBuffer,
    blocking: bool,
) {
    if active.is_empty() {
        return;
    }
    let frames = active.frame_count();
    let swapped = if blocking {
        handoff.swap_blocking(active, &ctx.cancel, ctx.config.write_wait())
    } else {
        handoff.try_swap(active)
    };
    if swapped {
        trace!("Handed off {} frames", frames);
    }
}

/// Send handed-off buffers with one bulk call each
pub(crate) fn spawn_transmit_role(ctx: RoleContext, handoff: HandoffReceiver) -> JoinHandle<()> {
    spawn_role("link-transmit", move || transmit_loop(ctx, handoff))
}

fn transmit_loop(ctx: RoleContext, handoff: HandoffReceiver) {
    debug!("Transmit role started for {}", ctx.device_mac);
    let wait = ctx.config.transmit_wait();

    while !ctx.cancelled() {
        let buffer = match handoff.recv_timeout(wait) {
            Ok(buffer) => buffer,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let bytes = buffer.len();
        match ctx.link.transmit(&buffer) {
            Ok(()) => ctx.stats.handoff_finished(bytes, true),
            Err(e) => {
                warn!("Bulk transmit of {} bytes failed: {}", bytes, e);
                ctx.stats.handoff_finished(bytes, false);
                ctx.events.report(EventKind::FailedToWrite, Severity::Warning);
            }
        }
        handoff.release(buffer);
    }
    debug!("Transmit role stopped for {}", ctx.device_mac);
}
