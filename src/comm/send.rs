// src/comm/send.rs

//! Exchange send and receive, each composed from child tasks so staging
//! copies and network progress overlap with unrelated compute.

use std::sync::Arc;

use tracing::debug;

use crate::comm::exchange::Exchange;
use crate::comm::transport::{SharedTransport, TransportError};
use crate::dag::TaskProperties;
use crate::device::{Buffer, Element, SharedStream, copy, from_bytes, to_bytes};
use crate::engine::{TaskContext, TaskScope};
use crate::errors::{Result, SchedError};
use crate::types::TaskId;

/// Declare the send side of `exchange`.
///
/// With a double buffer, the device to double copy is declared first as a
/// sibling task. The working device buffer is free again as soon as that
/// copy lands, while the rest of the send is still in flight.
///
/// Then one parent task is created whose children are, in declaration order:
/// 1. the staging copy into the host buffer (from the double buffer, or
///    straight from the device buffer)
/// 2. the transmit task (network queue) issuing the non-blocking send
/// 3. a wait task (network queue) that stays running until the send
///    completes
///
/// Returns the parent's id.
pub fn send<S, T>(
    scope: &S,
    exchange: &Arc<Exchange<T>>,
    transport: &SharedTransport,
    stream: &SharedStream,
) -> Result<TaskId>
where
    S: TaskScope + ?Sized,
    T: Element,
{
    let host = exchange.host_buffer();

    // Staging source of the parent: the double buffer once filled, else the
    // device buffer itself.
    let source = match exchange.double_buffer() {
        Some(double) => {
            copy(scope, stream, double, exchange.device_buffer())?;
            Arc::clone(double)
        }
        None => Arc::clone(exchange.device_buffer()),
    };

    let props = TaskProperties::builder()
        .label("exchange send")
        .read(source.data_resource())
        .read(source.size_resource())
        .write(host.data_resource())
        .write(host.size_resource())
        .write(exchange.request_resource())
        .build();

    let exchange = Arc::clone(exchange);
    let transport = Arc::clone(transport);
    let stream = Arc::clone(stream);

    scope.spawn(
        props,
        Box::new(move |ctx: &TaskContext<'_>| {
            let host = exchange.host_buffer();
            copy(ctx, &stream, host, &source)?;

            let transmit = TaskProperties::builder()
                .label("exchange transmit")
                .read(host.data_resource())
                .read(host.size_resource())
                .write(exchange.request_resource())
                .network_task()
                .build();
            let ex = Arc::clone(&exchange);
            ctx.create(transmit, move |ctx| {
                let payload = to_bytes(&valid_elements(ex.host_buffer())?);
                debug!(
                    task = %ctx.id(),
                    exchange = %ex.name(),
                    peer = ex.peer(),
                    tag = ex.tag(),
                    bytes = payload.len(),
                    "isend"
                );
                let request = transport.isend(ex.peer(), ex.tag(), payload)?;
                ex.store_request(request)
            })?;

            let ex = Arc::clone(&exchange);
            ctx.create(wait_props(&exchange), move |ctx| {
                ctx.complete_when(ex.take_request()?)
            })?;

            Ok(())
        }),
    )
}

/// Declare the receive side of `exchange`.
///
/// Children: post the receive and wait for it (both network queue), unpack
/// the payload into the host buffer, then copy host to device (through the
/// double buffer if there is one).
pub fn receive<S, T>(
    scope: &S,
    exchange: &Arc<Exchange<T>>,
    transport: &SharedTransport,
    stream: &SharedStream,
) -> Result<TaskId>
where
    S: TaskScope + ?Sized,
    T: Element,
{
    let device = exchange.device_buffer();
    let host = exchange.host_buffer();

    let mut props = TaskProperties::builder()
        .label("exchange receive")
        .write(exchange.request_resource())
        .write(host.data_resource())
        .write(host.size_resource())
        .write(device.data_resource())
        .write(device.size_resource());
    if let Some(double) = exchange.double_buffer() {
        props = props
            .write(double.data_resource())
            .write(double.size_resource());
    }

    let exchange = Arc::clone(exchange);
    let transport = Arc::clone(transport);
    let stream = Arc::clone(stream);

    scope.spawn(
        props.build(),
        Box::new(move |ctx: &TaskContext<'_>| {
            let post = TaskProperties::builder()
                .label("exchange post receive")
                .write(exchange.request_resource())
                .network_task()
                .build();
            let ex = Arc::clone(&exchange);
            ctx.create(post, move |ctx| {
                debug!(
                    task = %ctx.id(),
                    exchange = %ex.name(),
                    peer = ex.peer(),
                    tag = ex.tag(),
                    "irecv"
                );
                let request = transport.irecv(ex.peer(), ex.tag())?;
                ex.store_request(request)
            })?;

            let ex = Arc::clone(&exchange);
            ctx.create(wait_props(&exchange), move |ctx| {
                ctx.complete_when(ex.peek_request()?)
            })?;

            let host = exchange.host_buffer();
            let unpack_props = TaskProperties::builder()
                .label("exchange unpack")
                .write(exchange.request_resource())
                .write(host.data_resource())
                .write(host.size_resource())
                .build();
            let ex = Arc::clone(&exchange);
            ctx.create(unpack_props, move |_| {
                let payload = ex
                    .take_request()?
                    .take_payload()
                    .ok_or(TransportError::MissingPayload)?;
                let values = from_bytes::<T>(&payload).ok_or_else(|| {
                    SchedError::Invariant(format!(
                        "exchange '{}' received {} bytes, not a whole number of elements",
                        ex.name(),
                        payload.len()
                    ))
                })?;
                unpack(ex.host_buffer(), &values)
            })?;

            match exchange.double_buffer() {
                Some(double) => {
                    copy(ctx, &stream, double, host)?;
                    copy(ctx, &stream, exchange.device_buffer(), double)?;
                }
                None => {
                    copy(ctx, &stream, exchange.device_buffer(), host)?;
                }
            }
            Ok(())
        }),
    )
}

fn wait_props<T: Element>(exchange: &Exchange<T>) -> TaskProperties {
    TaskProperties::builder()
        .label("exchange wait")
        .write(exchange.request_resource())
        .network_task()
        .build()
}

/// Elements inside the buffer's current size. One-dimensional buffers may
/// be partially filled; others are sent whole.
fn valid_elements<T: Element>(buffer: &Buffer<T>) -> Result<Vec<T>> {
    let mut values = buffer.to_vec()?;
    if buffer.layout().dim() == 1 {
        let [n, _, _] = buffer.current_size()?;
        values.truncate(n);
    }
    Ok(values)
}

fn unpack<T: Element>(host: &Buffer<T>, values: &[T]) -> Result<()> {
    let layout = *host.layout();
    if layout.dim() == 1 && values.len() <= layout.extent()[0] {
        {
            let mut data = host.write()?;
            let start = layout.index(0, 0, 0);
            data[start..start + values.len()].copy_from_slice(values);
        }
        return host.set_current_size([values.len(), 1, 1]);
    }
    host.fill_from(values)?;
    host.set_current_size(layout.extent())
}
