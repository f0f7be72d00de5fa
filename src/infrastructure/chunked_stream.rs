// Chunked JSON streaming utilities
use crate::application::live_stream::StreamMessage;
use async_compression::tokio::bufread::BrotliEncoder;
use axum::body::Body;
use axum::http::{header, Response, StatusCode};
use axum::response::IntoResponse;
use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::Stream;
use futures::StreamExt;
use tokio::io::AsyncReadExt;

/// Create a chunked streaming response of length-prefixed JSON frames
pub async fn chunked_json_stream<S>(stream: S, compress: bool) -> Result<Response<Body>, StatusCode>
where
    S: Stream<Item = StreamMessage> + Send + 'static,
{
    let byte_stream = stream.then(move |msg| async move { serialize_chunk(&msg, compress).await });

    let body = Body::from_stream(byte_stream);

    // Frames are compressed one by one, so no Content-Encoding on the response.
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndframe+json")
        .header(header::TRANSFER_ENCODING, "chunked")
        .body(body)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Serialize one message into a frame: 4-byte big-endian length, then the payload.
pub async fn serialize_chunk(msg: &StreamMessage, compress: bool) -> Result<Bytes, std::io::Error> {
    let buffer = serde_json::to_vec(msg).map_err(std::io::Error::other)?;

    let payload = if compress {
        let mut encoder = BrotliEncoder::new(std::io::Cursor::new(buffer));
        let mut compressed = Vec::new();
        encoder.read_to_end(&mut compressed).await?;
        compressed
    } else {
        buffer
    };

    let length = u32::try_from(payload.len()).map_err(std::io::Error::other)?;
    let mut chunk = BytesMut::with_capacity(4 + payload.len());
    chunk.put_u32(length);
    chunk.put_slice(&payload);

    Ok(chunk.freeze())
}

/// Frame everything the live stream sends on `rx` into one chunked response.
/// The body ends when the sender side is dropped.
pub async fn framed_response(
    mut rx: tokio::sync::mpsc::Receiver<StreamMessage>,
    compress: bool,
) -> Response<Body> {
    let messages = async_stream::stream! {
        while let Some(message) = rx.recv().await {
            yield message;
        }
    };

    chunked_json_stream(messages, compress)
        .await
        .unwrap_or_else(|status| status.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> StreamMessage {
        StreamMessage::Error {
            message: "store unavailable".to_string(),
        }
    }

    #[tokio::test]
    async fn test_plain_frame_is_length_prefixed_json() {
        let chunk = serialize_chunk(&message(), false).await.unwrap();
        let length = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as usize;
        assert_eq!(length, chunk.len() - 4);

        let json: serde_json::Value = serde_json::from_slice(&chunk[4..]).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "store unavailable");
    }

    #[tokio::test]
    async fn test_compressed_frame_decodes() {
        use async_compression::tokio::bufread::BrotliDecoder;

        let chunk = serialize_chunk(&message(), true).await.unwrap();
        let length = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as usize;
        assert_eq!(length, chunk.len() - 4);

        let mut decoder = BrotliDecoder::new(std::io::Cursor::new(chunk[4..].to_vec()));
        let mut plain = Vec::new();
        decoder.read_to_end(&mut plain).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&plain).unwrap();
        assert_eq!(json["type"], "error");
    }

    #[tokio::test]
    async fn test_framed_response_ends_with_the_sender() {
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        tx.send(message()).await.unwrap();
        tx.send(message()).await.unwrap();
        drop(tx);

        let response = framed_response(rx, false).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/x-ndframe+json");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let frame = serialize_chunk(&message(), false).await.unwrap();
        assert_eq!(body.len(), 2 * frame.len());
        assert_eq!(&body[..frame.len()], &frame[..]);
    }
}
