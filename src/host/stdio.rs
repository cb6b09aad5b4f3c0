//! Stdin/stdout JSON bridge between a native shell and the service.
//!
//! Reads newline-delimited JSON `CommandEnvelope` messages, routes them
//! through [`ResidentService`], and writes `ResponseEnvelope` and
//! `EventEnvelope` messages as newline-delimited JSON.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use crate::error::{Result, ServiceError};
use crate::host::contract::{CommandEnvelope, EventEnvelope, ResponseEnvelope};
use crate::lifecycle::{LifecycleEntry, ResidentService};
use crate::service::{Command, ServiceEvent};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{Mutex, Notify, broadcast, oneshot};

type SharedWriter<W> = Arc<Mutex<BufWriter<W>>>;

/// Run the bridge on the process's stdin and stdout.
pub async fn run_stdio_bridge(service: ResidentService) -> Result<()> {
    run_bridge(
        service,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

/// Run the bridge until input closes or the service asks to stop itself.
///
/// Service hook events are forwarded from a separate task. Responses are
/// written by the reader loop, which waits for each command to be applied
/// before reading the next line. No further line is read once a stop has
/// taken the service to background, and hook events already raised are
/// written out before this returns.
pub async fn run_bridge<R, W>(service: ResidentService, reader: R, writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer = Arc::new(Mutex::new(BufWriter::new(writer)));
    let stop_requested = Arc::new(Notify::new());
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let event_handle = tokio::spawn(forward_events(
        service.client().subscribe_events(),
        Arc::clone(&writer),
        Arc::clone(&stop_requested),
        shutdown_rx,
    ));

    let reader_result = run_reader(&service, reader, &writer, &stop_requested).await;

    // Every command the reader waited on has already broadcast its events.
    let _ = shutdown_tx.send(());
    if let Err(e) = event_handle.await {
        tracing::warn!(error = %e, "event forwarder did not exit cleanly");
    }

    reader_result
}

async fn forward_events<W>(
    mut event_rx: broadcast::Receiver<ServiceEvent>,
    writer: SharedWriter<W>,
    stop_requested: Arc<Notify>,
    mut shutdown_rx: oneshot::Receiver<()>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let received = tokio::select! {
            biased;
            received = event_rx.recv() => received,
            _ = &mut shutdown_rx => {
                drain_events(&mut event_rx, &writer).await;
                return;
            }
        };
        match received {
            Ok(event) => {
                if !write_event(&writer, event).await {
                    return;
                }
                // Backstop for stops not issued through this bridge.
                if event == ServiceEvent::StopSelfRequested {
                    stop_requested.notify_one();
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(lagged = n, "event forwarder lagged; some events were dropped");
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::info!("service event channel closed; stopping event forwarder");
                return;
            }
        }
    }
}

async fn drain_events<W>(event_rx: &mut broadcast::Receiver<ServiceEvent>, writer: &SharedWriter<W>)
where
    W: AsyncWrite + Unpin,
{
    loop {
        match event_rx.try_recv() {
            Ok(event) => {
                if !write_event(writer, event).await {
                    return;
                }
            }
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                tracing::warn!(lagged = n, "events dropped while draining");
            }
            Err(_) => return,
        }
    }
}

/// Write one hook event. Returns `false` once output is unusable.
async fn write_event<W>(writer: &SharedWriter<W>, event: ServiceEvent) -> bool
where
    W: AsyncWrite + Unpin,
{
    let envelope = EventEnvelope::from_service_event(event);
    let json = match serde_json::to_string(&envelope) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize event envelope; skipping");
            return true;
        }
    };
    let mut w = writer.lock().await;
    if let Err(e) = write_line(&mut w, &json).await {
        tracing::warn!(error = %e, "failed to write event envelope; stopping event forwarder");
        return false;
    }
    true
}

async fn run_reader<R, W>(
    service: &ResidentService,
    mut reader: R,
    writer: &SharedWriter<W>,
    stop_requested: &Notify,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = tokio::select! {
            biased;
            () = stop_requested.notified() => {
                tracing::info!("service requested stop; shutting down bridge");
                break;
            }
            read = reader.read_line(&mut line) => read
                .map_err(|e| ServiceError::Channel(format!("failed to read trigger input: {e}")))?,
        };

        if bytes_read == 0 {
            tracing::info!("trigger input closed (EOF); shutting down bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let routed = match serde_json::from_str::<CommandEnvelope>(trimmed) {
            Ok(envelope) => route_envelope(service, envelope).await,
            Err(e) => {
                tracing::warn!(error = %e, raw_line = %trimmed, "failed to parse command envelope");
                Routed::reply(ResponseEnvelope::error(
                    "parse-error",
                    format!("failed to parse command envelope: {e}"),
                ))
            }
        };

        let json = serde_json::to_string(&routed.response).map_err(|e| {
            ServiceError::Channel(format!("failed to serialize response envelope: {e}"))
        })?;
        let mut w = writer.lock().await;
        write_line(&mut w, &json).await?;
        drop(w);

        if routed.stopped {
            tracing::info!("service stopped itself; shutting down bridge");
            break;
        }
    }

    Ok(())
}

struct Routed {
    response: ResponseEnvelope,
    /// A stop left foreground and the service asked to terminate.
    stopped: bool,
}

impl Routed {
    fn reply(response: ResponseEnvelope) -> Self {
        Self {
            response,
            stopped: false,
        }
    }
}

/// Route one envelope and wait for its outcome.
pub async fn handle_envelope(
    service: &ResidentService,
    envelope: CommandEnvelope,
) -> ResponseEnvelope {
    route_envelope(service, envelope).await.response
}

async fn route_envelope(service: &ResidentService, envelope: CommandEnvelope) -> Routed {
    if let Err(e) = envelope.validate() {
        return Routed::reply(ResponseEnvelope::error(
            envelope.request_id,
            ServiceError::from(e).to_string(),
        ));
    }

    if envelope.is_status_query() {
        return Routed::reply(ResponseEnvelope::ok(
            envelope.request_id,
            serde_json::json!({
                "mode": service.client().mode(),
                "enabled": service.settings().is_service_enabled(),
            }),
        ));
    }

    let pending = match service.on_trigger(envelope.action.as_deref()) {
        Ok(pending) => pending,
        Err(e) => return Routed::reply(ResponseEnvelope::error(envelope.request_id, e.to_string())),
    };

    let Some(pending) = pending else {
        return Routed::reply(ResponseEnvelope::ok(
            envelope.request_id,
            serde_json::json!({
                "dispatched": null,
                "mode": service.client().mode(),
                "changed": false,
            }),
        ));
    };

    let command = pending.command();
    match pending.wait().await {
        Ok(transition) => Routed {
            response: ResponseEnvelope::ok(
                envelope.request_id,
                serde_json::json!({
                    "dispatched": command,
                    "mode": transition.mode(),
                    "changed": transition.changed(),
                }),
            ),
            stopped: command == Command::Stop && transition.changed(),
        },
        Err(e) => Routed::reply(ResponseEnvelope::error(envelope.request_id, e.to_string())),
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut BufWriter<W>, json: &str) -> Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| ServiceError::Channel(format!("failed to write output: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| ServiceError::Channel(format!("failed to write newline: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| ServiceError::Channel(format!("failed to flush output: {e}")))?;
    Ok(())
}
