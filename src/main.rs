//! Coaching engine server: accepts pose producers over TCP, runs the session,
//! and streams score/feedback snapshots back to every connected client.

use anyhow::{Context, Result};
use futures::StreamExt;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dance_coach::config::Config;
use dance_coach::error::CoachResult;
use dance_coach::feedback::HttpFeedbackGenerator;
use dance_coach::pose::{LandmarkFrame, Registers, StreamId};
use dance_coach::protocol::{self, EngineMessage, ProducerMessage, SessionCommand};
use dance_coach::session::{Session, SessionOutputs};
use dance_coach::sync::{EngineClock, PlaybackControl};

const CONFIG_PATH: &str = "dance_coach.toml";

#[derive(Debug)]
struct ControlRequest {
    command: SessionCommand,
    reply: Option<oneshot::Sender<Result<(), String>>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _tracing = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .try_init();

    let config = Config::load_or_default(CONFIG_PATH);
    tracing::info!("Dance Coach ({})", env!("GIT_VERSION"));
    tracing::info!(
        scorer = ?config.scorer.kind,
        index_policy = ?config.engine.index_policy,
        clock = ?config.playback.mode,
        endpoint = %config.feedback.endpoint,
        "engine configured"
    );

    let generator = Arc::new(HttpFeedbackGenerator::from_config(&config.feedback)?);
    let clock = config.playback.build_clock();
    let listen_addr = config.server.listen_addr.clone();

    let mut session = Session::new(config, clock.reference(), generator);
    if let Err(e) = session.load_reference_data().await {
        tracing::error!("session start is blocked until reference data is fixed: {}", e);
    }
    let outputs = session.subscribe();
    let registers = session.subscribe_registers();

    let shutdown = CancellationToken::new();
    let (control_tx, control_rx) = mpsc::channel::<ControlRequest>(16);
    let control = tokio::spawn(run_control(session, control_rx, shutdown.clone()));
    spawn_console(control_tx.clone(), clock.clone(), shutdown.clone());

    let listener = TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", listen_addr))?;
    tracing::info!("Listening on {}", listen_addr);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, shutting down");
                shutdown.cancel();
                break;
            }
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(a) => a,
                    Err(e) => {
                        tracing::warn!("accept failed: {}", e);
                        continue;
                    }
                };
                stream.set_nodelay(true)?;
                tracing::info!(%addr, "producer connected");

                let clock = clock.clone();
                let registers = registers.clone();
                let outputs = outputs.clone();
                let control = control_tx.clone();
                tokio::spawn(async move {
                    match handle_connection(stream, clock, registers, outputs, control).await {
                        Ok(()) => tracing::info!(%addr, "producer disconnected"),
                        Err(e) => tracing::warn!(%addr, "connection error: {:#}", e),
                    }
                });
            }
        }
    }

    control.await.context("session controller panicked")?;
    Ok(())
}

/// Serializes every session command through one task that owns the session.
async fn run_control(
    mut session: Session,
    mut requests: mpsc::Receiver<ControlRequest>,
    shutdown: CancellationToken,
) {
    loop {
        let request = tokio::select! {
            _ = shutdown.cancelled() => break,
            request = requests.recv() => match request {
                Some(r) => r,
                None => break,
            },
        };

        let result = apply_command(&mut session, request.command).await;
        if let Err(e) = &result {
            tracing::warn!(command = ?request.command, "command rejected: {}", e);
        }
        if let Some(reply) = request.reply {
            let _ = reply.send(result.map_err(|e| e.to_string()));
        }
    }
    session.stop().await;
}

async fn apply_command(session: &mut Session, command: SessionCommand) -> CoachResult<()> {
    match command {
        SessionCommand::Start => session.start().map(drop),
        SessionCommand::Advance => session.advance().map(drop),
        SessionCommand::Stop => {
            session.stop().await;
            Ok(())
        }
        SessionCommand::Restart => session.restart().await.map(drop),
        SessionCommand::Reload => session.load_reference_data().await,
    }
}

/// Console input: session commands, local clock transport, q quit
fn spawn_console(
    control: mpsc::Sender<ControlRequest>,
    clock: EngineClock,
    shutdown: CancellationToken,
) {
    println!("Commands:");
    println!("  s - start at the first clip");
    println!("  n - advance to the next clip");
    println!("  x - stop");
    println!("  r - restart");
    println!("  l - reload reference data");
    if matches!(clock, EngineClock::Local(_)) {
        println!("  p - play, o - pause, + / - playback rate");
    }
    println!("  q - quit");

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let command = match line.trim() {
                "s" => SessionCommand::Start,
                "n" => SessionCommand::Advance,
                "x" => SessionCommand::Stop,
                "r" => SessionCommand::Restart,
                "l" => SessionCommand::Reload,
                key @ ("p" | "o" | "+" | "-") => {
                    let transport = match key {
                        "p" => PlaybackControl::Play,
                        "o" => PlaybackControl::Pause,
                        "+" => PlaybackControl::Faster,
                        _ => PlaybackControl::Slower,
                    };
                    if !clock.control(transport) {
                        println!("playback is driven by the external player");
                    }
                    continue;
                }
                "q" => {
                    shutdown.cancel();
                    break;
                }
                "" => continue,
                other => {
                    println!("unknown command: {}", other);
                    continue;
                }
            };
            if control.blocking_send(ControlRequest { command, reply: None }).is_err() {
                break;
            }
        }
    });
}

async fn handle_connection(
    stream: TcpStream,
    clock: EngineClock,
    registers: watch::Receiver<Option<Registers>>,
    mut outputs: watch::Receiver<SessionOutputs>,
    control: mpsc::Sender<ControlRequest>,
) -> Result<()> {
    let (mut sink, mut reader) = protocol::message_stream(stream).split();

    let snapshot = outputs.borrow_and_update().clone();
    protocol::send_to_sink(&mut sink, &EngineMessage::Snapshot(snapshot)).await?;

    loop {
        tokio::select! {
            result = reader.next() => {
                let bytes = match result {
                    Some(Ok(b)) => b,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(()),
                };
                let msg: ProducerMessage = match bincode::deserialize(&bytes) {
                    Ok(m) => m,
                    Err(e) => {
                        let message = format!("undecodable message: {}", e);
                        protocol::send_to_sink(&mut sink, &EngineMessage::Error { message }).await?;
                        continue;
                    }
                };
                match msg {
                    ProducerMessage::Landmarks { stream, frame } => {
                        write_frame(&registers, stream, Some(frame))
                    }
                    ProducerMessage::NoPose { stream } => write_frame(&registers, stream, None),
                    ProducerMessage::ReferenceTime { seconds } => clock.report_time(seconds),
                    ProducerMessage::Playback(transport) => {
                        if !clock.control(transport) {
                            let message = "playback is driven by the external player".to_string();
                            let error = EngineMessage::Error { message };
                            protocol::send_to_sink(&mut sink, &error).await?;
                        }
                    }
                    ProducerMessage::Command(command) => {
                        let (reply, response) = oneshot::channel();
                        control
                            .send(ControlRequest { command, reply: Some(reply) })
                            .await
                            .map_err(|_| anyhow::anyhow!("session controller stopped"))?;
                        if let Ok(Err(message)) = response.await {
                            let error = EngineMessage::Error { message };
                            protocol::send_to_sink(&mut sink, &error).await?;
                        }
                    }
                }
            }
            changed = outputs.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let snapshot = outputs.borrow_and_update().clone();
                protocol::send_to_sink(&mut sink, &EngineMessage::Snapshot(snapshot)).await?;
            }
        }
    }
}

/// Frames arriving while no session runs are dropped.
fn write_frame(
    registers: &watch::Receiver<Option<Registers>>,
    stream: StreamId,
    frame: Option<LandmarkFrame>,
) {
    if let Some(registers) = registers.borrow().as_ref() {
        registers.update(stream, frame);
    }
}
