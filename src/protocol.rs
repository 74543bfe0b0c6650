//! TCP protocol between pose producers and the coaching engine.
//!
//! Producers push landmark frames, the reference player's clock, and session
//! commands; the engine answers with output snapshots.

use bytes::Bytes;
use futures::{Sink, SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::pose::{LandmarkFrame, StreamId};
use crate::session::SessionOutputs;
use crate::sync::PlaybackControl;

pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Start,
    Advance,
    Stop,
    Restart,
    /// Retry loading reference data after a failed load
    Reload,
}

/// Producer → engine
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ProducerMessage {
    Landmarks { stream: StreamId, frame: LandmarkFrame },
    NoPose { stream: StreamId },
    /// Playback position of the reference video in seconds
    ReferenceTime { seconds: f64 },
    /// Transport control for the engine's local clock
    Playback(PlaybackControl),
    Command(SessionCommand),
}

/// Engine → producer
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum EngineMessage {
    Snapshot(SessionOutputs),
    Error { message: String },
}

// --- TCP codec helpers ---

pub type MessageStream<T = TcpStream> = Framed<T, LengthDelimitedCodec>;

/// Create a framed message stream with length-delimited framing.
pub fn message_stream<T: AsyncRead + AsyncWrite>(stream: T) -> MessageStream<T> {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec();
    Framed::new(stream, codec)
}

/// Send a serializable message (bincode + length prefix).
pub async fn send_message<T, M>(stream: &mut MessageStream<T>, msg: &M) -> anyhow::Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
    M: Serialize,
{
    let data = bincode::serialize(msg)?;
    stream.send(Bytes::from(data)).await?;
    Ok(())
}

/// Receive and deserialize a message. Returns None once the peer closed the connection.
pub async fn recv_message<T, M>(stream: &mut MessageStream<T>) -> anyhow::Result<Option<M>>
where
    T: AsyncRead + AsyncWrite + Unpin,
    M: DeserializeOwned,
{
    match stream.next().await {
        Some(Ok(bytes)) => Ok(Some(bincode::deserialize(&bytes)?)),
        Some(Err(e)) => Err(e.into()),
        None => Ok(None),
    }
}

/// Send on the write half of a split stream.
pub async fn send_to_sink<S, M>(sink: &mut S, msg: &M) -> anyhow::Result<()>
where
    S: Sink<Bytes, Error = std::io::Error> + Unpin,
    M: Serialize,
{
    let data = bincode::serialize(msg)?;
    sink.send(Bytes::from(data)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Landmark;
    use crate::session::SessionState;

    #[tokio::test]
    async fn test_producer_messages_over_duplex() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let mut client = message_stream(client);
        let mut server = message_stream(server);

        let frame = LandmarkFrame::new(vec![
            Landmark::new(0.1, 0.2, -0.3, 0.9),
            Landmark::planar(0.4, 0.5, 0.6),
        ]);
        let sent = vec![
            ProducerMessage::Landmarks { stream: StreamId::User, frame },
            ProducerMessage::NoPose { stream: StreamId::Reference },
            ProducerMessage::ReferenceTime { seconds: 2.0667 },
            ProducerMessage::Playback(PlaybackControl::Seek(12.5)),
            ProducerMessage::Command(SessionCommand::Advance),
            ProducerMessage::Command(SessionCommand::Reload),
        ];
        for msg in &sent {
            send_message(&mut client, msg).await.unwrap();
        }
        for expected in &sent {
            let got: ProducerMessage = recv_message(&mut server).await.unwrap().unwrap();
            assert_eq!(&got, expected);
        }

        drop(client);
        let closed: Option<ProducerMessage> = recv_message(&mut server).await.unwrap();
        assert!(closed.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_through_split_sink() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let mut client = message_stream(client);
        let (mut sink, _reader) = message_stream(server).split();

        let snapshot = EngineMessage::Snapshot(SessionOutputs {
            state: SessionState::Active { step: 2 },
            clip: Some("dance2".into()),
            score: 64,
            feedback: Some("Bend your right knee".into()),
            feedback_pending: false,
            can_advance: true,
        });
        send_to_sink(&mut sink, &snapshot).await.unwrap();
        let got: EngineMessage = recv_message(&mut client).await.unwrap().unwrap();
        assert_eq!(got, snapshot);
    }

    #[tokio::test]
    async fn test_garbage_frame_is_an_error() {
        let (client, server) = tokio::io::duplex(1024);
        let mut client = message_stream(client);
        let mut server = message_stream(server);
        client.send(Bytes::from_static(&[0xff, 0xff, 0xff, 0xff, 0xff])).await.unwrap();
        assert!(recv_message::<_, ProducerMessage>(&mut server).await.is_err());
    }
}
