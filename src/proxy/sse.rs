//! Server-sent events framing for streamed chat completions

use crate::adapter::{ChatChunkStream, ChunkFrame, ChunkFramer};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::stream::{self, Stream, StreamExt};

/// Terminal frame every OpenAI client waits for
pub const DONE: &str = "[DONE]";

fn frame_event(frame: &ChunkFrame) -> Result<Event, axum::Error> {
    match frame {
        ChunkFrame::Chunk(chunk) => Event::default().json_data(chunk),
        ChunkFrame::Error(envelope) => Event::default().json_data(envelope),
    }
}

/// One `data:` frame per chunk, then `data: [DONE]`
pub fn event_stream(stream: ChatChunkStream) -> impl Stream<Item = Result<Event, axum::Error>> {
    let ChatChunkStream { header, chunks } = stream;
    let mut framer = ChunkFramer::new(header);
    chunks
        .map(move |chunk| frame_event(&framer.frame(chunk)))
        .chain(stream::once(async { Ok(Event::default().data(DONE)) }))
}

pub fn stream_response(stream: ChatChunkStream) -> Response {
    Sse::new(event_stream(stream)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{ChunkHeader, StreamChunk};
    use crate::domain::FinishReason;
    use http_body_util::BodyExt;

    fn chunk_stream(chunks: Vec<StreamChunk>) -> ChatChunkStream {
        ChatChunkStream {
            header: ChunkHeader {
                id: "chatcmpl-1".to_string(),
                model: "claude".to_string(),
                created: 1,
            },
            chunks: stream::iter(chunks).boxed(),
        }
    }

    #[tokio::test]
    async fn frames_end_with_done() {
        let response = stream_response(chunk_stream(vec![
            StreamChunk::Content("Hel".to_string()),
            StreamChunk::Content("lo".to_string()),
            StreamChunk::Finish(FinishReason::Stop),
        ]));

        assert_eq!(
            response.headers().get(http::header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        let frames: Vec<&str> = text
            .split("\n\n")
            .filter(|frame| !frame.is_empty())
            .collect();

        assert_eq!(frames.len(), 4);
        assert!(frames.iter().all(|frame| frame.starts_with("data: ")));
        assert!(frames[0].contains("\"role\":\"assistant\""));
        assert!(frames[0].contains("\"content\":\"Hel\""));
        assert!(!frames[1].contains("\"role\""));
        assert!(frames[2].contains("\"finish_reason\":\"stop\""));
        assert_eq!(frames[3], "data: [DONE]");
    }
}
